use std::{
    fs::File,
    path::{Path, PathBuf},
};

use arrow::{
    array::{Array, AsArray, BinaryArray, Int32Array, Int64Array, LargeBinaryArray},
    buffer::{Buffer, NullBuffer},
    datatypes::{DataType, Int32Type, Int64Type},
    ipc::reader::StreamDecoder,
    record_batch::RecordBatch,
};
use log::debug;
use memmap2::Mmap;
use rand::Rng;

use crate::{Labeled, LoadErr, SampleSource, SourceErr, source::check_bounds};

const IMAGE: &str = "image";
const IMAGE_BYTES: &str = "bytes";
const LABEL: &str = "label";

#[derive(Debug)]
enum ImageBytes {
    Binary(BinaryArray),
    LargeBinary(LargeBinaryArray),
}

impl ImageBytes {
    fn from_array(array: &dyn Array) -> Option<Self> {
        match array.data_type() {
            DataType::Binary => Some(Self::Binary(array.as_binary::<i32>().clone())),
            DataType::LargeBinary => Some(Self::LargeBinary(array.as_binary::<i64>().clone())),
            _ => None,
        }
    }

    fn value(&self, row: usize) -> Option<&[u8]> {
        match self {
            Self::Binary(a) => a.is_valid(row).then(|| a.value(row)),
            Self::LargeBinary(a) => a.is_valid(row).then(|| a.value(row)),
        }
    }
}

#[derive(Debug)]
enum Labels {
    Int64(Int64Array),
    Int32(Int32Array),
}

impl Labels {
    fn from_array(array: &dyn Array) -> Option<Self> {
        match array.data_type() {
            DataType::Int64 => Some(Self::Int64(array.as_primitive::<Int64Type>().clone())),
            DataType::Int32 => Some(Self::Int32(array.as_primitive::<Int32Type>().clone())),
            _ => None,
        }
    }

    fn value(&self, row: usize) -> Option<i64> {
        match self {
            Self::Int64(a) => a.is_valid(row).then(|| a.value(row)),
            Self::Int32(a) => a.is_valid(row).then(|| a.value(row) as i64),
        }
    }
}

/// The columns of one record batch, already resolved to their concrete types.
#[derive(Debug)]
struct Chunk {
    /// Validity of the `image` struct itself, when it is a struct.
    image_validity: Option<NullBuffer>,
    images: ImageBytes,
    labels: Labels,
}

impl Chunk {
    fn from_batch(batch: &RecordBatch) -> Result<Self, String> {
        let image = batch
            .column_by_name(IMAGE)
            .ok_or_else(|| format!("missing `{IMAGE}` column"))?;

        let (image_validity, images) = match image.data_type() {
            DataType::Struct(_) => {
                let image = image.as_struct();
                let bytes = image
                    .column_by_name(IMAGE_BYTES)
                    .ok_or_else(|| format!("`{IMAGE}` has no `{IMAGE_BYTES}` field"))?;
                (image.nulls().cloned(), ImageBytes::from_array(bytes.as_ref()))
            }
            _ => (None, ImageBytes::from_array(image.as_ref())),
        };

        let images = images.ok_or_else(|| {
            format!("`{IMAGE}` must hold binary data, found {}", image.data_type())
        })?;

        let label = batch
            .column_by_name(LABEL)
            .ok_or_else(|| format!("missing `{LABEL}` column"))?;
        let labels = Labels::from_array(label.as_ref()).ok_or_else(|| {
            format!("`{LABEL}` must be a 32 or 64 bit integer, found {}", label.data_type())
        })?;

        Ok(Self {
            image_validity,
            images,
            labels,
        })
    }

    fn sample(&self, row: usize) -> Result<Labeled<Vec<u8>>, LoadErr> {
        let null = |column| LoadErr::NullValue { column, row };

        if self
            .image_validity
            .as_ref()
            .is_some_and(|nulls| nulls.is_null(row))
        {
            return Err(null(IMAGE));
        }

        let bytes = self.images.value(row).ok_or_else(|| null(IMAGE))?;
        let label = self.labels.value(row).ok_or_else(|| null(LABEL))?;
        Ok(Labeled::new(bytes.to_vec(), label))
    }
}

/// One arrow IPC stream file, memory-mapped and decoded without copying the column data.
///
/// Every sample is the encoded bytes of an image together with its class label.
#[derive(Debug)]
pub struct ArrowShard {
    path: PathBuf,
    chunks: Vec<Chunk>,
    ends: Vec<usize>,
}

impl ArrowShard {
    /// Opens the shard at `path`, decoding every record batch and validating its columns.
    ///
    /// # Errors
    /// `SourceErr::Io` if the file can't be mapped, `SourceErr::Arrow` if it isn't a valid
    /// arrow stream and `SourceErr::Schema` if the columns are missing or of the wrong type.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceErr> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| SourceErr::Io {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(io_err)?;
        // SAFETY: shards are read-only inputs, nothing truncates them while training.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_err)?;

        let batches = decode_stream(Buffer::from(bytes::Bytes::from_owner(mmap))).map_err(
            |source| SourceErr::Arrow {
                path: path.clone(),
                source,
            },
        )?;

        let mut chunks = Vec::with_capacity(batches.len());
        let mut ends = Vec::with_capacity(batches.len());
        let mut rows = 0;

        for batch in &batches {
            let chunk = Chunk::from_batch(batch).map_err(|reason| SourceErr::Schema {
                path: path.clone(),
                reason,
            })?;

            rows += batch.num_rows();
            chunks.push(chunk);
            ends.push(rows);
        }

        debug!(rows = rows, batches = chunks.len(); "opened shard {}", path.display());
        Ok(Self { path, chunks, ends })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decodes every record batch of an arrow IPC stream held in `buffer`.
fn decode_stream(mut buffer: Buffer) -> Result<Vec<RecordBatch>, arrow::error::ArrowError> {
    let mut decoder = StreamDecoder::new();
    let mut batches = Vec::new();

    while !buffer.is_empty() {
        let before = buffer.len();

        if let Some(batch) = decoder.decode(&mut buffer)? {
            batches.push(batch);
        } else if buffer.len() == before {
            break;
        }
    }

    decoder.finish()?;
    Ok(batches)
}

impl SampleSource for ArrowShard {
    type Sample = Labeled<Vec<u8>>;

    fn len(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    fn get<R: Rng + ?Sized>(&self, index: usize, _: &mut R) -> Result<Self::Sample, LoadErr> {
        check_bounds(index, self.len())?;

        let chunk = self.ends.partition_point(|&end| end <= index);
        let start = if chunk == 0 { 0 } else { self.ends[chunk - 1] };
        self.chunks[chunk].sample(index - start)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{ArrayRef, StringArray, StructArray},
        datatypes::{Field, Fields, Schema},
        ipc::writer::StreamWriter,
    };
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn image_struct(bytes: Vec<Option<&[u8]>>) -> ArrayRef {
        let paths: Vec<Option<&str>> = bytes.iter().map(|_| Some("x.jpg")).collect();
        Arc::new(StructArray::from(vec![
            (
                Arc::new(Field::new("bytes", DataType::Binary, true)),
                Arc::new(BinaryArray::from(bytes)) as ArrayRef,
            ),
            (
                Arc::new(Field::new("path", DataType::Utf8, true)),
                Arc::new(StringArray::from(paths)) as ArrayRef,
            ),
        ]))
    }

    fn write_stream(path: &Path, batches: &[RecordBatch]) {
        let file = File::create(path).unwrap();
        let mut writer = StreamWriter::try_new(file, &batches[0].schema()).unwrap();
        for batch in batches {
            writer.write(batch).unwrap();
        }
        writer.finish().unwrap();
    }

    fn batch(images: ArrayRef, labels: ArrayRef) -> RecordBatch {
        RecordBatch::try_from_iter([("image", images), ("label", labels)]).unwrap()
    }

    #[test]
    fn reads_rows_across_record_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.arrow");

        let first = batch(
            image_struct(vec![Some(b"a".as_slice()), Some(b"bc".as_slice())]),
            Arc::new(Int64Array::from(vec![3, 7])),
        );
        let second = batch(
            image_struct(vec![Some(b"def".as_slice())]),
            Arc::new(Int64Array::from(vec![999])),
        );
        write_stream(&path, &[first, second]);

        let shard = ArrowShard::open(&path).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(shard.len(), 3);
        assert_eq!(shard.get(1, &mut rng).unwrap(), Labeled::new(b"bc".to_vec(), 7));
        assert_eq!(shard.get(2, &mut rng).unwrap(), Labeled::new(b"def".to_vec(), 999));
        assert!(matches!(
            shard.get(3, &mut rng),
            Err(LoadErr::OutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn plain_binary_images_and_int32_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.arrow");

        let images: ArrayRef = Arc::new(BinaryArray::from(vec![Some(b"xy".as_slice()), None]));
        write_stream(&path, &[batch(images, Arc::new(Int32Array::from(vec![1, 2])))]);

        let shard = ArrowShard::open(&path).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(shard.get(0, &mut rng).unwrap(), Labeled::new(b"xy".to_vec(), 1));
        assert!(matches!(
            shard.get(1, &mut rng),
            Err(LoadErr::NullValue { column: "image", row: 1 })
        ));
    }

    #[test]
    fn wrong_label_type_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.arrow");

        let labels: ArrayRef = Arc::new(StringArray::from(vec!["cat"]));
        write_stream(&path, &[batch(image_struct(vec![Some(b"a".as_slice())]), labels)]);

        assert!(matches!(
            ArrowShard::open(&path),
            Err(SourceErr::Schema { .. })
        ));
    }

    #[test]
    fn garbage_is_an_arrow_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.arrow");
        std::fs::write(&path, [0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0, 1, 2, 3]).unwrap();

        assert!(matches!(ArrowShard::open(&path), Err(SourceErr::Arrow { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArrowShard::open(dir.path().join("nope.arrow"));
        assert!(matches!(err, Err(SourceErr::Io { .. })));
    }

    #[test]
    fn empty_stream_has_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.arrow");

        let schema = Schema::new(Fields::from(vec![
            Field::new("image", DataType::Binary, true),
            Field::new("label", DataType::Int64, true),
        ]));
        let file = File::create(&path).unwrap();
        let mut writer = StreamWriter::try_new(file, &schema).unwrap();
        writer.finish().unwrap();

        assert!(ArrowShard::open(&path).unwrap().is_empty());
    }
}
