mod arrow_shard;
mod concat;
pub mod error;
pub mod imagenet;
pub mod loader;
mod shards;
mod source;
pub mod synthetic;
pub mod transform;

pub use arrow_shard::ArrowShard;
pub use concat::Concat;
pub use error::{LoadErr, SourceErr};
pub use loader::{Batch, Batches, Collate, DataLoader, ImageBatch, LoaderConfig};
pub use shards::discover_shards;
pub use source::{Labeled, SampleSource};
