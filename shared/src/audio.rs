//! Linear PCM decoding for synthesized speech.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sample rate of the voice model's output.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;
pub const SPEECH_CHANNELS: u16 = 1;

const I16_SCALE: f32 = 32_768.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("audio payload is empty")]
    Empty,
    #[error("payload length {len} is not a whole number of {channels}-channel 16-bit frames")]
    Misaligned { len: usize, channels: u16 },
    #[error("invalid channel count: {0}")]
    InvalidChannels(u16),
    #[error("invalid base64 audio payload: {0}")]
    Base64(String),
}

/// Interleaved samples normalized to [-1.0, 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl PcmBuffer {
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frame_count() as u64 * 1000) / u64::from(self.sample_rate)
    }

    /// Samples of one channel, de-interleaved.
    pub fn channel(&self, index: u16) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(usize::from(index))
            .step_by(usize::from(self.channels.max(1)))
            .copied()
    }
}

/// Decode little-endian signed 16-bit PCM.
pub fn decode_pcm16le(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<PcmBuffer, AudioError> {
    if channels == 0 {
        return Err(AudioError::InvalidChannels(channels));
    }
    if bytes.is_empty() {
        return Err(AudioError::Empty);
    }
    let frame_bytes = 2 * usize::from(channels);
    if bytes.len() % frame_bytes != 0 {
        return Err(AudioError::Misaligned {
            len: bytes.len(),
            channels,
        });
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / I16_SCALE)
        .collect();

    Ok(PcmBuffer {
        sample_rate,
        channels,
        samples,
    })
}

/// Decode the base64 payload returned by the voice model.
pub fn decode_speech_payload(b64: &str) -> Result<PcmBuffer, AudioError> {
    use base64::Engine as _;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| AudioError::Base64(e.to_string()))?;
    decode_pcm16le(&bytes, SPEECH_SAMPLE_RATE, SPEECH_CHANNELS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_known_samples() {
        let bytes = [0x00, 0x00, 0xFF, 0x7F, 0x00, 0x80, 0x00, 0x40];
        let buf = decode_pcm16le(&bytes, SPEECH_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buf.samples, vec![0.0, 32_767.0 / 32_768.0, -1.0, 0.5]);
        assert_eq!(buf.frame_count(), 4);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert_eq!(
            decode_pcm16le(&[0x01, 0x02, 0x03], SPEECH_SAMPLE_RATE, 1),
            Err(AudioError::Misaligned { len: 3, channels: 1 })
        );
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(decode_pcm16le(&[], SPEECH_SAMPLE_RATE, 1), Err(AudioError::Empty));
    }

    #[test]
    fn test_stereo_deinterleave() {
        let bytes = [0x00, 0x40, 0x00, 0xC0, 0x00, 0x20, 0x00, 0xE0];
        let buf = decode_pcm16le(&bytes, 48_000, 2).unwrap();
        assert_eq!(buf.frame_count(), 2);
        assert_eq!(buf.channel(0).collect::<Vec<_>>(), vec![0.5, 0.25]);
        assert_eq!(buf.channel(1).collect::<Vec<_>>(), vec![-0.5, -0.25]);
    }

    #[test]
    fn test_duration() {
        let bytes = vec![0u8; SPEECH_SAMPLE_RATE as usize * 2];
        let buf = decode_pcm16le(&bytes, SPEECH_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buf.duration_ms(), 1000);
    }

    #[test]
    fn test_decode_base64_payload() {
        // two samples: 0x4000, 0xC000
        let buf = decode_speech_payload("AEAAwA==").unwrap();
        assert_eq!(buf.sample_rate, 24_000);
        assert_eq!(buf.channels, 1);
        assert_eq!(buf.samples, vec![0.5, -0.5]);
    }

    #[test]
    fn test_bad_base64() {
        assert!(matches!(
            decode_speech_payload("not base64!"),
            Err(AudioError::Base64(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_samples_in_range(bytes in proptest::collection::vec(any::<u8>(), 1..512)) {
            match decode_pcm16le(&bytes, SPEECH_SAMPLE_RATE, 1) {
                Ok(buf) => {
                    prop_assert_eq!(buf.samples.len(), bytes.len() / 2);
                    prop_assert!(buf.samples.iter().all(|s| (-1.0..1.0).contains(s)));
                }
                Err(e) => prop_assert_eq!(e, AudioError::Misaligned { len: bytes.len(), channels: 1 }),
            }
        }
    }
}
