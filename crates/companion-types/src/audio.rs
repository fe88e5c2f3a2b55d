use base64::Engine;

/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Sample rate of the PCM16 audio the agent expects from the microphone.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of the PCM16 audio the agent streams back.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Encodes mono PCM16 samples as little-endian bytes in base64.
pub fn encode_pcm16(samples: &[i16]) -> Base64EncodedAudioBytes {
    let bytes: Vec<u8> = samples
        .iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes a base64 fragment into mono PCM16 samples.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16(fragment: &str) -> Result<Vec<i16>, base64::DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(fragment)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_is_little_endian() {
        // 1 -> [0x01, 0x00], -2 -> [0xFE, 0xFF]
        assert_eq!(encode_pcm16(&[1, -2]), "AQD+/w==");
        assert_eq!(decode_pcm16("AQD+/w==").unwrap(), vec![1, -2]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_pcm16("not base64!").is_err());
    }

    #[test]
    fn decode_drops_trailing_odd_byte() {
        // three bytes: 0x01 0x00 0x7F
        assert_eq!(decode_pcm16("AQB/").unwrap(), vec![1]);
    }
}
