//! Decoded audio waiting to be played

use std::time::Duration;

use crate::errors::DomainError;

/// RMS below which a clip too short for one envelope block counts as silent
const SILENCE_RMS: f32 = 0.02;
/// Exponent that lifts quiet passages in the envelope
const ENVELOPE_GAMMA: f32 = 0.65;

/// Interleaved PCM samples plus their format
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackItem {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

/// Coarse loudness curve of a clip, one value per `step`
#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeEnvelope {
    /// Normalized levels in [0, 1]
    pub levels: Vec<f32>,
    /// Time covered by each level
    pub step: Duration,
}

impl PlaybackItem {
    /// Create a playback item
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidAudio` if the format is degenerate or the
    /// sample count is not a multiple of the channel count.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self, DomainError> {
        if channels == 0 {
            return Err(DomainError::InvalidAudio("zero channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(DomainError::InvalidAudio("zero sample rate".to_string()));
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(DomainError::InvalidAudio(format!(
                "{} samples do not divide into {channels} channels",
                samples.len()
            )));
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of interleaved channels
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Frames per second
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    /// Whether the item holds no audio
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playing time
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Multiply every sample by `gain`, clamped to [0, 1]
    pub fn apply_gain(&mut self, gain: f32) {
        let gain = if gain.is_finite() {
            gain.clamp(0.0, 1.0)
        } else {
            1.0
        };
        if (gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for sample in &mut self.samples {
            *sample *= gain;
        }
    }

    /// Compute a loudness envelope with about `per_second` values per second
    ///
    /// Channels are averaged to mono, each block's RMS is normalized by the
    /// 95th percentile, clipped to [0, 1] and compressed with a 0.65 power.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn amplitude_envelope(&self, per_second: u32) -> AmplitudeEnvelope {
        let block = (self.sample_rate / per_second.max(1)).max(1) as usize;
        let step = Duration::from_secs_f64(block as f64 / f64::from(self.sample_rate));

        let mono = self.mono();
        if mono.is_empty() {
            return AmplitudeEnvelope {
                levels: Vec::new(),
                step,
            };
        }

        if mono.len() < block {
            let level = if rms(&mono) > SILENCE_RMS { 1.0 } else { 0.0 };
            return AmplitudeEnvelope {
                levels: vec![level],
                step,
            };
        }

        let blocks: Vec<f32> = mono.chunks_exact(block).map(rms).collect();
        let denom = percentile(&blocks, 0.95) + 1e-6;
        let levels = blocks
            .iter()
            .map(|value| (value / denom).clamp(0.0, 1.0).powf(ENVELOPE_GAMMA))
            .collect();

        AmplitudeEnvelope { levels, step }
    }

    fn mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }
        let channels = f32::from(self.channels);
        self.samples
            .chunks_exact(usize::from(self.channels))
            .map(|frame| frame.iter().sum::<f32>() / channels)
            .collect()
    }
}

#[allow(clippy::cast_precision_loss)]
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum();
    (energy / samples.len() as f32).sqrt()
}

/// Linear-interpolated percentile, `q` in [0, 1]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percentile(values: &[f32], q: f32) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let rank = q * (sorted.len() - 1) as f32;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    let weight = rank - rank.floor();
    sorted[low] + (sorted[high] - sorted[low]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_formats() {
        assert!(PlaybackItem::new(vec![0.0; 4], 0, 16_000).is_err());
        assert!(PlaybackItem::new(vec![0.0; 4], 1, 0).is_err());
        assert!(PlaybackItem::new(vec![0.0; 3], 2, 16_000).is_err());
    }

    #[test]
    fn duration_uses_frames() {
        let item = PlaybackItem::new(vec![0.0; 32_000], 2, 16_000).unwrap();
        assert_eq!(item.frames(), 16_000);
        assert_eq!(item.duration(), Duration::from_secs(1));
    }

    #[test]
    fn gain_is_clamped() {
        let mut item = PlaybackItem::new(vec![0.5, -0.5], 1, 8_000).unwrap();
        item.apply_gain(0.5);
        assert_eq!(item.samples(), &[0.25, -0.25]);

        item.apply_gain(4.0);
        assert_eq!(item.samples(), &[0.25, -0.25]);

        item.apply_gain(-1.0);
        assert_eq!(item.samples(), &[0.0, 0.0]);
    }

    #[test]
    fn envelope_has_sixty_values_per_second() {
        let samples: Vec<f32> = (0..48_000)
            .map(|i| if (i / 4_800) % 2 == 0 { 0.8 } else { 0.1 })
            .collect();
        let item = PlaybackItem::new(samples, 1, 48_000).unwrap();
        let envelope = item.amplitude_envelope(60);

        assert_eq!(envelope.levels.len(), 60);
        assert_eq!(envelope.step, Duration::from_secs_f64(800.0 / 48_000.0));
        assert!(envelope.levels.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(envelope.levels[0] > envelope.levels[6]);
    }

    #[test]
    fn short_clip_yields_single_level() {
        let loud = PlaybackItem::new(vec![0.5; 10], 1, 48_000).unwrap();
        assert_eq!(loud.amplitude_envelope(60).levels, vec![1.0]);

        let quiet = PlaybackItem::new(vec![0.001; 10], 1, 48_000).unwrap();
        assert_eq!(quiet.amplitude_envelope(60).levels, vec![0.0]);
    }

    #[test]
    fn empty_clip_yields_no_levels() {
        let item = PlaybackItem::new(Vec::new(), 1, 48_000).unwrap();
        assert!(item.amplitude_envelope(60).levels.is_empty());
    }
}
