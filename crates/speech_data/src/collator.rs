use crate::minibatch::SpeechBatch;
use crate::sample::SpeechSample;
use anyhow::{bail, Result};
use tch::{Kind, Tensor};

/// A `Collator` defines how to pad and combine multiple [`SpeechSample`]s into a
/// [`SpeechBatch`].
pub trait Collator {
    fn collate(&self, samples: &[SpeechSample]) -> Result<SpeechBatch>;
}

/// A `Collator` that zero-pads every field to the longest sample in the batch.
///
/// Rows are reordered by descending spectrogram length (ties keep input order), which
/// is what packed recurrent layers downstream expect. Every field is padded on its
/// time axis only:
///
/// ```text
/// spec lengths [5, 3, 7]  ->  row order [2, 0, 1], spec_lengths [7, 5, 3]
///   spec[0] = sample 2             (7 frames)
///   spec[1] = sample 0 + 2 zeros   (5 frames)
///   spec[2] = sample 1 + 4 zeros   (3 frames)
/// ```
///
/// Nothing is truncated here; alignment between fields is settled per sample by
/// [`SpeechSample::reconcile`]. All samples must share the spectrogram's
/// `feature_dim`, taken from the first sample.
///
/// With `return_ids` set, the batch also carries the row order as `ids`.
#[derive(Debug, Clone, Default)]
pub struct SpeechCollator {
    return_ids: bool,
}

impl SpeechCollator {
    pub fn new() -> Self {
        Self { return_ids: false }
    }

    /// A collator that also returns the sort permutation.
    pub fn with_ids() -> Self {
        Self { return_ids: true }
    }

    pub fn return_ids(&self) -> bool {
        self.return_ids
    }
}

/// Positions of `samples` sorted by descending spectrogram length.
pub fn sort_by_spec_len(samples: &[SpeechSample]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(samples[i].spec_len()));
    order
}

/// Copies `src` into the leading `src.size()[time_dim]` positions of `dest`.
fn copy_prefix(dest: Tensor, src: &Tensor, time_dim: usize) {
    let len = src.size()[time_dim];
    dest.narrow(time_dim as i64, 0, len).copy_(src);
}

impl Collator for SpeechCollator {
    fn collate(&self, samples: &[SpeechSample]) -> Result<SpeechBatch> {
        if samples.is_empty() {
            bail!("Cannot collate empty sample list");
        }

        let feature_dim = samples[0].feature_dim();
        for (i, sample) in samples.iter().enumerate().skip(1) {
            if sample.feature_dim() != feature_dim {
                bail!(
                    "Sample #{} has spec feature_dim {}, expected {}",
                    i,
                    sample.feature_dim(),
                    feature_dim
                );
            }
        }

        let order = sort_by_spec_len(samples);
        let n = samples.len() as i64;
        let max_of = |len: fn(&SpeechSample) -> i64| samples.iter().map(len).max().unwrap_or(0);

        let device = samples[0].spec().device();
        let long = (Kind::Int64, device);
        let float = (Kind::Float, device);

        let text = Tensor::zeros(&[n, max_of(SpeechSample::text_len)], long);
        let tone = Tensor::zeros(&[n, max_of(SpeechSample::tone_len)], long);
        let f0 = Tensor::zeros(&[n, max_of(SpeechSample::f0_len)], float);
        let spec = Tensor::zeros(&[n, feature_dim, max_of(SpeechSample::spec_len)], float);
        let wav = Tensor::zeros(&[n, 1, max_of(SpeechSample::wav_len)], float);

        let mut text_lengths = Vec::with_capacity(samples.len());
        let mut tone_lengths = Vec::with_capacity(samples.len());
        let mut f0_lengths = Vec::with_capacity(samples.len());
        let mut spec_lengths = Vec::with_capacity(samples.len());
        let mut wav_lengths = Vec::with_capacity(samples.len());

        for (row, &source) in order.iter().enumerate() {
            let sample = &samples[source];
            let row = row as i64;

            copy_prefix(text.select(0, row), sample.text(), 0);
            text_lengths.push(sample.text_len());

            copy_prefix(tone.select(0, row), sample.tone(), 0);
            tone_lengths.push(sample.tone_len());

            copy_prefix(f0.select(0, row), sample.f0(), 0);
            f0_lengths.push(sample.f0_len());

            copy_prefix(spec.select(0, row), sample.spec(), 1);
            spec_lengths.push(sample.spec_len());

            copy_prefix(wav.select(0, row), sample.wav(), 1);
            wav_lengths.push(sample.wav_len());
        }

        let ids = self.return_ids.then(|| {
            let ids: Vec<i64> = order.iter().map(|&i| i as i64).collect();
            Tensor::from_slice(&ids).to_device(device)
        });
        let lengths = |values: Vec<i64>| Tensor::from_slice(&values).to_device(device);

        Ok(SpeechBatch {
            text,
            text_lengths: lengths(text_lengths),
            tone,
            tone_lengths: lengths(tone_lengths),
            f0,
            f0_lengths: lengths(f0_lengths),
            spec,
            spec_lengths: lengths(spec_lengths),
            wav,
            wav_lengths: lengths(wav_lengths),
            ids,
        })
    }
}
