use std::{fs::File, io::Cursor, path::Path, sync::Arc};

use arrow::{
    array::{ArrayRef, BinaryArray, Int64Array, StructArray},
    datatypes::{DataType, Field},
    ipc::writer::StreamWriter,
    record_batch::RecordBatch,
};
use dataset::SourceErr;
use image::{ImageFormat, RgbImage};
use machine_learning::{Device, DeviceErr};
use trainer::{Config, ConfigErr, TrainErr};

/// Writes a shard of small PNG images with the given labels.
fn write_shard(path: &Path, labels: &[i64]) {
    let images: Vec<Vec<u8>> = labels
        .iter()
        .map(|&label| {
            let img = RgbImage::from_fn(48, 36, |x, y| {
                image::Rgb([(x * 5) as u8, (y * 7) as u8, (label * 40) as u8])
            });
            let mut bytes = Vec::new();
            img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
            bytes
        })
        .collect();

    let bytes: Vec<Option<&[u8]>> = images.iter().map(|b| Some(b.as_slice())).collect();
    let image: ArrayRef = Arc::new(StructArray::from(vec![(
        Arc::new(Field::new("bytes", DataType::Binary, true)),
        Arc::new(BinaryArray::from(bytes)) as ArrayRef,
    )]));
    let label: ArrayRef = Arc::new(Int64Array::from(labels.to_vec()));
    let batch = RecordBatch::try_from_iter([("image", image), ("label", label)]).unwrap();

    let mut writer = StreamWriter::try_new(File::create(path).unwrap(), &batch.schema()).unwrap();
    writer.write(&batch).unwrap();
    writer.finish().unwrap();
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_shard(&dir.path().join("imagenet-1k-train-00000-of-00257.arrow"), &[0, 1]);
    write_shard(&dir.path().join("imagenet-1k-train-00001-of-00257.arrow"), &[2]);
    dir
}

fn config(dataroot: &Path, extra: &[&str]) -> Result<Config, ConfigErr> {
    let root = dataroot.to_string_lossy().into_owned();
    let base = [
        "train",
        "--dataroot",
        &root,
        "--arch",
        "resnet18",
        "--num-classes",
        "3",
        "--batch-size",
        "2",
        "--num-workers",
        "1",
        "--seed",
        "1",
    ];

    Config::try_parse_from(base.iter().chain(extra))
}

#[test]
fn prints_one_loss_line_per_epoch() {
    let dir = fixture();
    let config = config(dir.path(), &["--device", "cpu", "--num-epochs", "2"]).unwrap();

    let mut out = Vec::new();
    let losses = trainer::run(&config, &mut out).unwrap();

    let out = String::from_utf8(out).unwrap();
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(losses.len(), 2);
    assert!(losses.iter().all(|loss| loss.is_finite() && *loss > 0.));
    assert_eq!(lines, [
        format!("Epoch 1/2 Loss: {}", losses[0]),
        format!("Epoch 2/2 Loss: {}", losses[1]),
    ]);
}

#[test]
fn default_device_is_unavailable_on_this_build() {
    let dir = fixture();
    let config = config(dir.path(), &["--num-epochs", "1"]).unwrap();
    assert_eq!(config.device, Device::Cuda(0));

    let mut out = Vec::new();
    let err = trainer::run(&config, &mut out).unwrap_err();

    assert!(matches!(err, TrainErr::Device(DeviceErr::Unavailable { .. })));
    assert!(out.is_empty());
}

#[test]
fn missing_dataset_fails_before_training() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["--device", "cpu"]).unwrap();

    let err = trainer::run(&config, &mut Vec::new()).unwrap_err();
    assert!(matches!(err, TrainErr::Source(SourceErr::NoShards { .. })));
}

#[test]
fn invalid_batch_size_never_reaches_the_dataset() {
    // the root does not exist, so any access would fail with a different error
    let err = Config::try_parse_from(["train", "--dataroot", "/nonexistent", "--batch-size", "-1"])
        .unwrap_err();
    assert!(matches!(err, ConfigErr::Cli(_)));
}
