use anyhow::{bail, ensure, Result};
use tch::Tensor;
use tracing::warn;

/// One fetched training example for the acoustic model.
///
/// The five fields are time-aligned:
/// - `text`: symbol ids, shape `[T]` (int64)
/// - `tone`: per-symbol tone labels, shape `[T]` (int64)
/// - `f0`: log pitch contour, shape `[T]` (float)
/// - `spec`: linear spectrogram, shape `[feature_dim, T]` (float)
/// - `wav`: normalised waveform, shape `[1, T * samples_per_frame]` (float)
///
/// Frame counts of `text` and `spec` can disagree by a frame or two because of
/// framing round-off upstream. [`reconcile`](Self::reconcile) fixes that before the
/// sample is handed to a collator.
///
/// Fields are read-only; [`new`](Self::new) is the only constructor, so every sample
/// has passed its shape checks.
#[derive(Debug)]
pub struct SpeechSample {
    text: Tensor,
    tone: Tensor,
    f0: Tensor,
    spec: Tensor,
    wav: Tensor,
}

/// Creates a shallow clone of the `SpeechSample`
impl Clone for SpeechSample {
    fn clone(&self) -> Self {
        Self {
            text: self.text.shallow_clone(),
            tone: self.tone.shallow_clone(),
            f0: self.f0.shallow_clone(),
            spec: self.spec.shallow_clone(),
            wav: self.wav.shallow_clone(),
        }
    }
}

/// Safety:
/// Every field is a `tch::Tensor`, which tch marks `Send` and `Sync`. The struct adds
/// no interior mutability of its own; mutation requires `&mut self`.
unsafe impl Send for SpeechSample {}
unsafe impl Sync for SpeechSample {}

impl SpeechSample {
    /// Creates a sample, checking field ranks and the text/tone invariant.
    pub fn new(text: Tensor, tone: Tensor, f0: Tensor, spec: Tensor, wav: Tensor) -> Result<Self> {
        ensure!(text.dim() == 1, "text must be 1-D, got shape {:?}", text.size());
        ensure!(tone.dim() == 1, "tone must be 1-D, got shape {:?}", tone.size());
        ensure!(f0.dim() == 1, "f0 must be 1-D, got shape {:?}", f0.size());
        ensure!(
            spec.dim() == 2,
            "spec must be [feature_dim, time], got shape {:?}",
            spec.size()
        );
        ensure!(
            wav.dim() == 2 && wav.size()[0] == 1,
            "wav must be [1, samples], got shape {:?}",
            wav.size()
        );
        let sample = Self {
            text,
            tone,
            f0,
            spec,
            wav,
        };
        ensure!(
            sample.text_len() == sample.tone_len(),
            "text length ({}) differs from tone length ({})",
            sample.text_len(),
            sample.tone_len()
        );
        Ok(sample)
    }

    pub fn text(&self) -> &Tensor {
        &self.text
    }

    pub fn tone(&self) -> &Tensor {
        &self.tone
    }

    pub fn f0(&self) -> &Tensor {
        &self.f0
    }

    pub fn spec(&self) -> &Tensor {
        &self.spec
    }

    pub fn wav(&self) -> &Tensor {
        &self.wav
    }

    /// Consumes the sample, returning `(text, tone, f0, spec, wav)`.
    pub fn into_parts(self) -> (Tensor, Tensor, Tensor, Tensor, Tensor) {
        (self.text, self.tone, self.f0, self.spec, self.wav)
    }

    pub fn text_len(&self) -> i64 {
        self.text.size()[0]
    }

    pub fn tone_len(&self) -> i64 {
        self.tone.size()[0]
    }

    pub fn f0_len(&self) -> i64 {
        self.f0.size()[0]
    }

    /// Spectrogram frames (time axis).
    pub fn spec_len(&self) -> i64 {
        self.spec.size()[1]
    }

    pub fn feature_dim(&self) -> i64 {
        self.spec.size()[0]
    }

    pub fn wav_len(&self) -> i64 {
        self.wav.size()[1]
    }

    /// Aligns `text` and `spec` lengths by truncating every field to the shorter one.
    ///
    /// With `m = min(text_len, spec_len)`, `text`, `tone`, `f0` and `spec` keep their
    /// first `m` frames and `wav` keeps its first `m * samples_per_frame` samples
    /// (fields already shorter than that are left as they are).
    ///
    /// # Errors
    /// - `text` and `tone` lengths differ
    /// - `|text_len - spec_len| > max_mismatch`
    pub fn reconcile(self, samples_per_frame: usize, max_mismatch: usize) -> Result<Self> {
        let text_len = self.text_len();
        let spec_len = self.spec_len();
        ensure!(
            text_len == self.tone_len(),
            "text length ({}) differs from tone length ({})",
            text_len,
            self.tone_len()
        );
        if text_len == spec_len {
            return Ok(self);
        }

        let mismatch = text_len.abs_diff(spec_len);
        if mismatch > max_mismatch as u64 {
            bail!(
                "text has {} frames but spec has {}: mismatch of {} exceeds the tolerated {}",
                text_len,
                spec_len,
                mismatch,
                max_mismatch
            );
        }

        let frames = text_len.min(spec_len);
        let samples = frames * samples_per_frame as i64;
        warn!(text_len, spec_len, frames, "truncating misaligned sample");

        Ok(Self {
            text: self.text.narrow(0, 0, frames),
            tone: self.tone.narrow(0, 0, frames),
            f0: self.f0.narrow(0, 0, frames.min(self.f0_len())),
            spec: self.spec.narrow(1, 0, frames),
            wav: self.wav.narrow(1, 0, samples.min(self.wav_len())),
        })
    }
}
