use anyhow::{anyhow, Result};
use speech_data::{DataConfig, FeatureExtractor, SpeechSample};
use std::fs;
use std::path::{Path, PathBuf};
use tch::{Device, Kind, Tensor};

/// Routes `tracing` output through the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Aligned in-memory sample with `frames` frames and `hop` wav samples per frame.
/// Float fields are filled with `value`.
pub fn make_sample(frames: i64, hop: i64, value: f64) -> Result<SpeechSample> {
    let opts = (Kind::Float, Device::Cpu);
    SpeechSample::new(
        Tensor::arange_start(1, frames + 1, (Kind::Int64, Device::Cpu)),
        Tensor::ones(&[frames], (Kind::Int64, Device::Cpu)),
        Tensor::full(&[frames], value, opts),
        Tensor::full(&[4, frames], value, opts),
        Tensor::full(&[1, frames * hop], value, opts),
    )
}

/// Writes a zero-filled fake 16-bit wav of `frames * hop` samples.
pub fn write_fake_wav(dir: &Path, name: &str, frames: usize, hop: usize) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, vec![0u8; frames * hop * 2])?;
    Ok(path)
}

/// Feature extractor that derives every shape from file sizes and names.
///
/// - wav: `file_size / 2` samples of value 1000 at `sampling_rate`
/// - symbols: a path ending in `_<n>` yields `[1, ..., n]`
/// - spectrogram: `samples / hop + extra_spec_frames` frames, 4 bins, with a leading unit axis
/// - pitch: one value per wav frame
pub struct FakeExtractor {
    pub sampling_rate: u32,
    pub extra_spec_frames: i64,
}

impl FakeExtractor {
    pub fn new(sampling_rate: u32) -> Self {
        Self {
            sampling_rate,
            extra_spec_frames: 0,
        }
    }
}

impl FeatureExtractor for FakeExtractor {
    fn load_wav(&self, path: &Path) -> Result<(Tensor, u32)> {
        let samples = fs::metadata(path)?.len() as i64 / 2;
        let audio = Tensor::full(&[samples], 1000.0, (Kind::Int16, Device::Cpu));
        Ok((audio, self.sampling_rate))
    }

    fn load_symbols(&self, path: &Path) -> Result<Tensor> {
        let name = path.to_string_lossy();
        let count: i64 = name
            .rsplit('_')
            .next()
            .ok_or_else(|| anyhow!("No symbol count in {}", name))?
            .parse()?;
        Ok(Tensor::arange_start(1, count + 1, (Kind::Int64, Device::Cpu)))
    }

    fn spectrogram(&self, wav: &Tensor, config: &DataConfig) -> Result<Tensor> {
        let frames = wav.size()[1] / config.hop_length as i64 + self.extra_spec_frames;
        Ok(Tensor::ones(&[1, 4, frames], (Kind::Float, Device::Cpu)))
    }

    fn pitch(&self, wav_path: &Path, config: &DataConfig) -> Result<Tensor> {
        let frames = fs::metadata(wav_path)?.len() as i64 / 2 / config.hop_length as i64;
        Ok(Tensor::zeros(&[frames], (Kind::Float, Device::Cpu)))
    }
}
