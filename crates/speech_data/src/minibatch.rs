use anyhow::{bail, Result};
use tch::{Device, Tensor};

/// Feature names exposed by [`SpeechBatch::get`], in output order.
pub const FEATURES: [&str; 10] = [
    "text",
    "text_lengths",
    "tone",
    "tone_lengths",
    "f0",
    "f0_lengths",
    "spec",
    "spec_lengths",
    "wav",
    "wav_lengths",
];

/// A zero-padded batch of speech samples, ready for the model.
///
/// Rows are ordered by descending spectrogram length. For a batch of `N` samples:
/// - `text`, `tone` -> `[N, max_text_len]` (int64)
/// - `f0` -> `[N, max_f0_len]` (float)
/// - `spec` -> `[N, feature_dim, max_spec_len]` (float)
/// - `wav` -> `[N, 1, max_wav_len]` (float)
///
/// Each `*_lengths` tensor is `[N]` (int64) and records the unpadded size of the
/// matching row, so the model can mask padding. `ids`, when requested from the
/// collator, maps row `i` back to its position in the input slice.
#[derive(Debug)]
pub struct SpeechBatch {
    pub text: Tensor,
    pub text_lengths: Tensor,
    pub tone: Tensor,
    pub tone_lengths: Tensor,
    pub f0: Tensor,
    pub f0_lengths: Tensor,
    pub spec: Tensor,
    pub spec_lengths: Tensor,
    pub wav: Tensor,
    pub wav_lengths: Tensor,
    pub ids: Option<Tensor>,
}

impl SpeechBatch {
    /// Returns the number of samples in the batch.
    pub fn batch_size(&self) -> i64 {
        self.spec_lengths.size()[0]
    }

    /// Returns a reference to the tensor for a given feature key.
    pub fn get(&self, feature: &str) -> Result<&Tensor> {
        Ok(match feature {
            "text" => &self.text,
            "text_lengths" => &self.text_lengths,
            "tone" => &self.tone,
            "tone_lengths" => &self.tone_lengths,
            "f0" => &self.f0,
            "f0_lengths" => &self.f0_lengths,
            "spec" => &self.spec,
            "spec_lengths" => &self.spec_lengths,
            "wav" => &self.wav,
            "wav_lengths" => &self.wav_lengths,
            "ids" => match &self.ids {
                Some(ids) => ids,
                None => bail!("Feature 'ids' was not requested from the collator"),
            },
            other => bail!("Feature '{}' not found in speech batch", other),
        })
    }

    /// Returns an iterator over all feature keys in the batch.
    pub fn features(&self) -> impl Iterator<Item = &'static str> + '_ {
        FEATURES
            .into_iter()
            .chain(self.ids.as_ref().map(|_| "ids"))
    }

    /// Transfers all tensors to the target device (CPU/GPU)
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            text: self.text.to_device(device),
            text_lengths: self.text_lengths.to_device(device),
            tone: self.tone.to_device(device),
            tone_lengths: self.tone_lengths.to_device(device),
            f0: self.f0.to_device(device),
            f0_lengths: self.f0_lengths.to_device(device),
            spec: self.spec.to_device(device),
            spec_lengths: self.spec_lengths.to_device(device),
            wav: self.wav.to_device(device),
            wav_lengths: self.wav_lengths.to_device(device),
            ids: self.ids.as_ref().map(|ids| ids.to_device(device)),
        }
    }
}
