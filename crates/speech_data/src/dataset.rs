use crate::config::DataConfig;
use crate::readers::{FilelistEntry, FilelistSource};
use crate::sample::SpeechSample;
use anyhow::{anyhow, ensure, Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tch::{Kind, Tensor};
use tracing::info;

/// A `Dataset` provides random access to speech samples plus the per-sample length
/// used for bucketing.
///
/// All implementations must be `Send + Sync` to allow for safe
/// sharing across threads.
pub trait Dataset: Send + Sync {
    /// Fetches the sample at `index`, already reconciled and ready for collation.
    fn fetch(&self, index: usize) -> Result<SpeechSample>;

    /// One bucketing length per sample, indexed like `fetch`.
    fn lengths(&self) -> &[usize];

    /// Returns total number of samples.
    fn len(&self) -> usize {
        self.lengths().len()
    }

    /// Checks if the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dataset that keeps every sample in memory (`Arc<[SpeechSample]>`).
///
/// Cloning only bumps the `Arc` counter. Bucketing lengths default to each sample's
/// spectrogram frame count.
///
/// Samples are stored as given, so every one must already have as many text symbols
/// as spectrogram frames. Run [`SpeechSample::reconcile`] on raw samples first.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    samples: Arc<[SpeechSample]>,
    lengths: Vec<usize>,
}

impl InMemoryDataset {
    pub fn new(samples: Vec<SpeechSample>) -> Result<Self> {
        let lengths = samples.iter().map(|s| s.spec_len() as usize).collect();
        Self::with_lengths(samples, lengths)
    }

    /// Uses externally computed bucketing lengths instead of spectrogram frames.
    pub fn with_lengths(samples: Vec<SpeechSample>, lengths: Vec<usize>) -> Result<Self> {
        ensure!(
            samples.len() == lengths.len(),
            "Got {} lengths for {} samples",
            lengths.len(),
            samples.len()
        );
        for (index, sample) in samples.iter().enumerate() {
            ensure!(
                sample.text_len() == sample.spec_len(),
                "Sample {} is not aligned: text has {} frames but spec has {}",
                index,
                sample.text_len(),
                sample.spec_len()
            );
        }
        Ok(Self {
            samples: samples.into(),
            lengths,
        })
    }
}

impl Dataset for InMemoryDataset {
    fn fetch(&self, index: usize) -> Result<SpeechSample> {
        self.samples.get(index).cloned().ok_or_else(|| {
            anyhow!(
                "Index {} out of bounds for dataset of size {}",
                index,
                self.samples.len()
            )
        })
    }

    fn lengths(&self) -> &[usize] {
        &self.lengths
    }
}

//=======================================================================================================
/// Decodes audio and computes acoustic features for [`TextAudioDataset`].
///
/// Implementations are free to cache results on disk; the dataset calls these once
/// per fetch and never inspects any cache.
pub trait FeatureExtractor: Send + Sync {
    /// Raw PCM values of a mono wav file, shape `[samples]`, and its sampling rate.
    fn load_wav(&self, path: &Path) -> Result<(Tensor, u32)>;

    /// Symbol ids (text or tone) stored at `path`, shape `[T]`.
    fn load_symbols(&self, path: &Path) -> Result<Tensor>;

    /// Linear spectrogram of the normalised `[1, samples]` waveform, shape
    /// `[feature_dim, frames]` (a leading unit axis is tolerated).
    fn spectrogram(&self, wav: &Tensor, config: &DataConfig) -> Result<Tensor>;

    /// Log pitch contour of the wav file, shape `[frames]`.
    fn pitch(&self, wav_path: &Path, config: &DataConfig) -> Result<Tensor>;
}

/// Filelist-backed dataset that fetches audio, text and tone from disk.
///
/// Construction only touches file metadata: entries whose text field falls outside
/// `[min_text_len, max_text_len]` are skipped, and each kept entry's bucketing length
/// is estimated from the wav size as `file_size / (2 * hop_length)` (16-bit mono PCM).
pub struct TextAudioDataset<E> {
    entries: Vec<FilelistEntry>,
    lengths: Vec<usize>,
    config: DataConfig,
    extractor: E,
}

impl<E: FeatureExtractor> TextAudioDataset<E> {
    /// Reads and filters a `wav|text|tone` filelist.
    pub fn from_filelist(
        path: impl AsRef<Path>,
        config: DataConfig,
        extractor: E,
    ) -> Result<Self> {
        let entries = FilelistSource::new(path.as_ref()).read_all()?;
        Self::new(entries, config, extractor)
    }

    pub fn new(entries: Vec<FilelistEntry>, config: DataConfig, extractor: E) -> Result<Self> {
        config.validate()?;
        let total = entries.len();
        let mut kept = Vec::with_capacity(total);
        let mut lengths = Vec::with_capacity(total);

        for entry in entries {
            let text_len = entry.text.chars().count();
            if text_len < config.min_text_len || text_len > config.max_text_len {
                continue;
            }
            let size = fs::metadata(&entry.wav)
                .with_context(|| format!("Failed to stat wav file: {}", entry.wav.display()))?
                .len() as usize;
            lengths.push(size / (2 * config.hop_length));
            kept.push(entry);
        }

        info!(kept = kept.len(), skipped = total - kept.len(), "loaded filelist");
        Ok(Self {
            entries: kept,
            lengths,
            config,
            extractor,
        })
    }

    pub fn entries(&self) -> &[FilelistEntry] {
        &self.entries
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    /// Loads the waveform, normalises it and adds a channel axis: `[1, samples]`.
    fn load_audio(&self, path: &Path) -> Result<Tensor> {
        let (audio, sampling_rate) = self.extractor.load_wav(path)?;
        ensure!(
            sampling_rate == self.config.sampling_rate,
            "{} has sampling rate {} but {} is required",
            path.display(),
            sampling_rate,
            self.config.sampling_rate
        );
        Ok((audio.to_kind(Kind::Float) / self.config.max_wav_value).unsqueeze(0))
    }
}

impl<E: FeatureExtractor> Dataset for TextAudioDataset<E> {
    fn fetch(&self, index: usize) -> Result<SpeechSample> {
        let entry = self.entries.get(index).ok_or_else(|| {
            anyhow!(
                "Index {} out of bounds for dataset of size {}",
                index,
                self.entries.len()
            )
        })?;

        let text = self.extractor.load_symbols(Path::new(&entry.text))?;
        let tone = self.extractor.load_symbols(Path::new(&entry.tone))?;
        let wav = self.load_audio(&entry.wav)?;

        let mut spec = self.extractor.spectrogram(&wav, &self.config)?;
        if spec.dim() == 3 {
            spec = spec.squeeze_dim(0);
        }
        let f0 = self.extractor.pitch(&entry.wav, &self.config)?;

        SpeechSample::new(text, tone, f0, spec, wav)
            .and_then(|s| s.reconcile(self.config.hop_length, self.config.max_frame_mismatch))
            .with_context(|| format!("Invalid sample {}", entry.wav.display()))
    }

    fn lengths(&self) -> &[usize] {
        &self.lengths
    }
}
