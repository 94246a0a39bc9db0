//! Trains small dense networks on the in-memory random sources, no dataset on disk needed.
//!
//! `cargo run -p trainer --example toy`

use std::{error::Error, num::NonZeroUsize, sync::Arc};

use dataset::{
    DataLoader, LoaderConfig,
    synthetic::{RandomCorpus, RandomDataset},
};
use log::info;
use machine_learning::{
    Device, Network,
    arch::{Sequential, layers::Layer},
    loss::CrossEntropy,
    optimization::Adam,
};
use ndarray::{Array1, Array2, Array4};
use rand::{SeedableRng, rngs::StdRng};

const FEATURES: usize = 16;
const CONTEXT: usize = 8;
const VOCAB: NonZeroUsize = NonZeroUsize::new(32).unwrap();
const BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(32).unwrap();
const EPOCHS: usize = 5;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut rng = StdRng::seed_from_u64(0);
    let config = LoaderConfig {
        batch_size: BATCH_SIZE,
        num_workers: 2,
        seed: 0,
        ..Default::default()
    };

    let points = Arc::new(RandomDataset::new(FEATURES, 1024, &mut rng));
    let loader = DataLoader::new(points, config.clone())?;
    let model = Sequential::new([
        Layer::dense((FEATURES, 32)),
        Layer::relu(),
        Layer::dense((32, 2)),
    ]);
    let mut net = Network::new(model, Device::Cpu, &mut rng)?;
    let mut adam = Adam::new(net.size(), 1e-2);

    // Classify the sign of sin(max(row)).
    for epoch in 0..EPOCHS {
        let mut last = 0.;

        for batch in loader.epoch(epoch)? {
            let batch = batch?;
            let (n, f) = batch.data.inputs.dim();
            let x = batch.data.inputs.into_shape_clone((n, f, 1, 1))?;
            let labels = batch.data.targets.mapv(|t| usize::from(t > 0.));

            last = net.train_step(x, labels.view(), batch.device, &CrossEntropy, &mut adam)?;
        }

        println!("points epoch {}/{EPOCHS} Loss: {last}", epoch + 1);
    }

    let corpus = Arc::new(RandomCorpus::new(512, CONTEXT, VOCAB, &mut rng));
    let loader = DataLoader::new(corpus, config)?;
    let vocab = VOCAB.get();
    let mut net = Network::new(Sequential::new([Layer::dense((vocab, vocab))]), Device::Cpu, &mut rng)?;
    let mut adam = Adam::new(net.size(), 1e-2);

    // A bigram model: predict every token from the one before it. The tokens are uniform, so the
    // loss can't go below ln(vocab).
    for epoch in 0..EPOCHS {
        let mut last = 0.;

        for batch in loader.epoch(epoch)? {
            let batch = batch?;
            let (x, labels) = bigrams(&batch.data, vocab);
            last = net.train_step(x, labels.view(), batch.device, &CrossEntropy, &mut adam)?;
        }

        println!("corpus epoch {}/{EPOCHS} Loss: {last}", epoch + 1);
    }

    info!(floor = (vocab as f32).ln(); "corpus loss floor");
    Ok(())
}

/// One-hot encodes every token but the last of each sentence, labeled with the token after it.
fn bigrams(tokens: &Array2<usize>, vocab: usize) -> (Array4<f32>, Array1<usize>) {
    let (n, context) = tokens.dim();
    let pairs = n * context.saturating_sub(1);
    let mut x = Array4::zeros((pairs, vocab, 1, 1));
    let mut labels = Array1::zeros(pairs);

    for (p, (s, t)) in (0..n).flat_map(|s| (1..context).map(move |t| (s, t))).enumerate() {
        x[[p, tokens[[s, t - 1]], 0, 0]] = 1.;
        labels[p] = tokens[[s, t]];
    }

    (x, labels)
}
