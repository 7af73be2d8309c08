//! Audio normalization for inference: resampling and silence trimming.

/// Sample rate the transcription models expect.
pub const MODEL_SAMPLE_RATE: u32 = 16_000;

/// Amplitude below which a sample counts as silence when trimming.
pub const TRIM_THRESHOLD: f32 = 0.01;

/// Trimmed utterances shorter than this carry no transcribable speech.
pub const MIN_SPEECH_SECS: f32 = 0.2;

/// Resample mono f32 samples between rates via linear interpolation.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src = i as f64 * ratio;
        let idx0 = src.floor() as usize;
        let idx1 = (idx0 + 1).min(samples.len() - 1);
        let frac = (src - idx0 as f64) as f32;
        out.push(samples[idx0] * (1.0 - frac) + samples[idx1] * frac);
    }
    out
}

/// Strip leading and trailing silence, returning the speech subslice.
///
/// Idempotent: trimming a trimmed buffer returns it unchanged. A buffer
/// with no sample over the threshold trims to empty.
pub fn trim_silence(samples: &[f32]) -> &[f32] {
    let first = samples.iter().position(|s| s.abs() > TRIM_THRESHOLD);
    let Some(first) = first else {
        return &[];
    };
    // A first loud sample guarantees a last one.
    let last = samples
        .iter()
        .rposition(|s| s.abs() > TRIM_THRESHOLD)
        .unwrap_or(first);
    &samples[first..=last]
}

/// Whether a trimmed buffer is long enough to contain deliberate speech.
pub fn has_enough_speech(samples: &[f32], sample_rate: u32) -> bool {
    samples.len() as f32 / sample_rate as f32 >= MIN_SPEECH_SECS
}
