//! PCM wire codec for the capture ↔ dispatch boundary.
//!
//! Captured utterances cross the message boundary as mono 16-bit
//! little-endian PCM at the capture sample rate. The dispatcher decodes and
//! resamples to whatever the model expects.

/// Encode f32 samples in [-1.0, 1.0] as 16-bit little-endian PCM bytes.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode 16-bit little-endian PCM bytes into f32 samples in [-1.0, 1.0].
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0, -1.0];
        let decoded = decode_pcm16(&encode_pcm16(&samples));
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let bytes = encode_pcm16(&[2.0, -2.0]);
        let decoded = decode_pcm16(&bytes);
        assert!((decoded[0] - 1.0).abs() < 1e-3);
        assert!((decoded[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_ignores_trailing_byte() {
        let mut bytes = encode_pcm16(&[0.25]);
        bytes.push(0xFF);
        assert_eq!(decode_pcm16(&bytes).len(), 1);
    }

    #[test]
    fn test_empty() {
        assert!(encode_pcm16(&[]).is_empty());
        assert!(decode_pcm16(&[]).is_empty());
    }
}
