pub mod bucket;
pub mod collator;
pub mod config;
pub mod dataset;
pub mod loader;
pub mod minibatch;
pub mod readers;
pub mod sample;
pub mod sampler;

pub use bucket::{Bucket, LengthBuckets};
pub use collator::{Collator, SpeechCollator};
pub use config::DataConfig;
pub use dataset::{Dataset, FeatureExtractor, InMemoryDataset, TextAudioDataset};
pub use loader::SpeechLoader;
pub use minibatch::SpeechBatch;
pub use sample::SpeechSample;
pub use sampler::{DistributedBucketSampler, DistributedConfig, Sampler};
