//! src/config.rs
//!
//! Audio and batching hyper-parameters.
//!
//! `DataConfig` mirrors the `data` section of a training hparams file. It can be
//! read from JSON or assembled in code:
//!
//! ```ignore
//! let config = DataConfig::builder()
//!     .sampling_rate(16_000)
//!     .hop_length(256)
//!     .batch_size(16)
//!     .boundaries(vec![32, 300, 400, 500, 600, 700, 800, 900, 1000])
//!     .build()?;
//! ```

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Configuration for fetching, bucketing and reconciling speech samples
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Expected sampling rate of every wav file. Mismatches are a hard error.
    pub sampling_rate: u32,
    /// Raw PCM values are divided by this to land in [-1, 1].
    pub max_wav_value: f64,
    pub filter_length: usize,
    /// Waveform samples per spectrogram frame (`samples_per_frame`).
    pub hop_length: usize,
    pub win_length: usize,
    /// Filelist entries with a shorter text field are skipped.
    pub min_text_len: usize,
    /// Filelist entries with a longer text field are skipped.
    pub max_text_len: usize,
    /// Largest tolerated difference between text length and spectrogram frames.
    /// Anything above is treated as corrupt data rather than truncated away.
    pub max_frame_mismatch: usize,
    /// Samples per batch on each replica
    pub batch_size: usize,
    /// Ascending length thresholds, in spectrogram frames
    pub boundaries: Vec<usize>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 16_000,
            max_wav_value: 32_768.0,
            filter_length: 1024,
            hop_length: 256,
            win_length: 1024,
            min_text_len: 1,
            max_text_len: 5000,
            max_frame_mismatch: 3,
            batch_size: 16,
            boundaries: vec![32, 300, 400, 500, 600, 700, 800, 900, 1000],
        }
    }
}

impl DataConfig {
    pub fn builder() -> DataConfigBuilder {
        DataConfigBuilder::default()
    }

    /// Parses a JSON hparams string and validates it.
    ///
    /// Accepts either a full hparams file, in which case only its `data` section is
    /// read, or the bare section itself.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut value: Value =
            serde_json::from_str(json).context("Failed to parse hparams JSON")?;
        let config: DataConfig = match value.get_mut("data") {
            Some(data) => serde_json::from_value(data.take())
                .context("Failed to parse the `data` section of the hparams")?,
            None => serde_json::from_value(value).context("Failed to parse hparams JSON")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON hparams file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read hparams file: {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid hparams file: {}", path.display()))
    }

    /// Rejects configurations that can never produce a valid batch.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.sampling_rate > 0, "sampling_rate must be > 0");
        ensure!(
            self.max_wav_value > 0.0 && self.max_wav_value.is_finite(),
            "max_wav_value must be positive and finite, but got {}",
            self.max_wav_value
        );
        ensure!(self.hop_length > 0, "hop_length must be > 0");
        ensure!(
            self.min_text_len <= self.max_text_len,
            "min_text_len ({}) exceeds max_text_len ({})",
            self.min_text_len,
            self.max_text_len
        );
        ensure!(
            self.batch_size > 0,
            "batch_size must be > 0, but got batch_size={}",
            self.batch_size
        );
        ensure!(
            self.boundaries.len() >= 2,
            "At least two boundaries are required, but got {}",
            self.boundaries.len()
        );
        ensure!(
            self.boundaries.windows(2).all(|w| w[0] < w[1]),
            "Boundaries must be strictly ascending: {:?}",
            self.boundaries
        );
        Ok(())
    }
}

/// Builder for DataConfig with method chaining
#[derive(Default)]
pub struct DataConfigBuilder {
    config: DataConfig,
}

impl DataConfigBuilder {
    pub fn sampling_rate(mut self, rate: u32) -> Self {
        self.config.sampling_rate = rate;
        self
    }

    pub fn max_wav_value(mut self, value: f64) -> Self {
        self.config.max_wav_value = value;
        self
    }

    pub fn filter_length(mut self, length: usize) -> Self {
        self.config.filter_length = length;
        self
    }

    /// Set the hop length, which is also the waveform/frame ratio used when truncating.
    pub fn hop_length(mut self, length: usize) -> Self {
        self.config.hop_length = length;
        self
    }

    pub fn win_length(mut self, length: usize) -> Self {
        self.config.win_length = length;
        self
    }

    /// Set the accepted text-length range of filelist entries (inclusive).
    pub fn text_len_range(mut self, min: usize, max: usize) -> Self {
        self.config.min_text_len = min;
        self.config.max_text_len = max;
        self
    }

    pub fn max_frame_mismatch(mut self, frames: usize) -> Self {
        self.config.max_frame_mismatch = frames;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn boundaries(mut self, boundaries: Vec<usize>) -> Self {
        self.config.boundaries = boundaries;
        self
    }

    /// Build and validate the final configuration.
    pub fn build(self) -> Result<DataConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
