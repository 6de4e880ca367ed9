//! WAV decoding into playback items

use std::io::Cursor;

use domain::PlaybackItem;
use hound::{SampleFormat, WavReader};

use super::PlaybackError;

/// Decode a WAV file into interleaved f32 samples in [-1, 1]
///
/// Integer PCM of any bit depth and 32-bit float are supported.
#[allow(clippy::cast_precision_loss)]
pub fn decode_wav(bytes: &[u8]) -> Result<PlaybackItem, PlaybackError> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 * scale))
                .collect::<Result<Vec<_>, _>>()?
        },
    };

    Ok(PlaybackItem::new(samples, spec.channels, spec.sample_rate)?)
}
