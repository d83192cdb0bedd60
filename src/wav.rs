//! RIFF/WAVE container for raw 16-bit PCM.
//!
//! Speech comes back as bare little-endian samples; these functions wrap and
//! unwrap them without touching the filesystem.

pub const HEADER_LEN: usize = 44;
pub const BITS_PER_SAMPLE: u16 = 16;
const FORMAT_PCM: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

impl WavInfo {
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.channels) * u32::from(self.bits_per_sample / 8)
    }

    pub fn duration_secs(&self) -> f64 {
        let byte_rate = self.byte_rate();
        if byte_rate == 0 {
            return 0.0;
        }
        f64::from(self.data_len) / f64::from(byte_rate)
    }
}

/// 44-byte canonical header for `data_len` bytes of 16-bit PCM.
pub fn header(data_len: u32, sample_rate: u32, channels: u16) -> [u8; HEADER_LEN] {
    let bytes_per_sample = BITS_PER_SAMPLE / 8;
    let block_align = channels * bytes_per_sample;
    let byte_rate = sample_rate * u32::from(block_align);

    let mut out = [0u8; HEADER_LEN];
    out[0..4].copy_from_slice(b"RIFF");
    out[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    out[8..12].copy_from_slice(b"WAVE");
    out[12..16].copy_from_slice(b"fmt ");
    out[16..20].copy_from_slice(&16u32.to_le_bytes());
    out[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
    out[22..24].copy_from_slice(&channels.to_le_bytes());
    out[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    out[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    out[32..34].copy_from_slice(&block_align.to_le_bytes());
    out[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    out[36..40].copy_from_slice(b"data");
    out[40..44].copy_from_slice(&data_len.to_le_bytes());
    out
}

/// Header plus payload as one playable file.
pub fn encode(pcm: &[u8], sample_rate: u32, channels: u16) -> anyhow::Result<Vec<u8>> {
    if sample_rate == 0 || channels == 0 {
        anyhow::bail!("sample rate and channel count must be > 0");
    }
    let block_align = usize::from(channels) * usize::from(BITS_PER_SAMPLE / 8);
    if pcm.len() % block_align != 0 {
        anyhow::bail!(
            "pcm payload of {} bytes is not a whole number of {block_align}-byte frames",
            pcm.len()
        );
    }
    let data_len = u32::try_from(pcm.len())
        .ok()
        .filter(|len| len.checked_add(36).is_some())
        .ok_or_else(|| anyhow::anyhow!("pcm payload too large for a WAVE file"))?;

    let mut out = Vec::with_capacity(HEADER_LEN + pcm.len());
    out.extend_from_slice(&header(data_len, sample_rate, channels));
    out.extend_from_slice(pcm);
    Ok(out)
}

/// Reads the format and data chunk sizes of a WAVE file. Unknown chunks
/// between `fmt ` and `data` are skipped.
pub fn parse(bytes: &[u8]) -> anyhow::Result<WavInfo> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        anyhow::bail!("not a RIFF/WAVE file");
    }

    let mut format: Option<(u16, u32, u16)> = None;
    let mut offset = 12usize;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]);
        let body = offset + 8;
        match id {
            b"fmt " => {
                if body + 16 > bytes.len() {
                    anyhow::bail!("truncated fmt chunk");
                }
                let channels = u16::from_le_bytes([bytes[body + 2], bytes[body + 3]]);
                let sample_rate = u32::from_le_bytes([
                    bytes[body + 4],
                    bytes[body + 5],
                    bytes[body + 6],
                    bytes[body + 7],
                ]);
                let bits = u16::from_le_bytes([bytes[body + 14], bytes[body + 15]]);
                format = Some((channels, sample_rate, bits));
            }
            b"data" => {
                let (channels, sample_rate, bits_per_sample) =
                    format.ok_or_else(|| anyhow::anyhow!("data chunk before fmt chunk"))?;
                let available = (bytes.len() - body) as u64;
                let data_len = u64::from(size).min(available) as u32;
                return Ok(WavInfo {
                    sample_rate,
                    channels,
                    bits_per_sample,
                    data_len,
                });
            }
            _ => {}
        }
        // Chunks are padded to even sizes.
        offset = body + size as usize + (size as usize & 1);
    }
    anyhow::bail!("missing data chunk")
}

/// Extracts `rate=NNNN` from an `audio/L16;codec=pcm;rate=24000` style mime type.
pub fn sample_rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .filter(|rate| *rate > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_matches_known_bytes() {
        let h = header(4, 24_000, 1);
        let expected: [u8; 44] = [
            b'R', b'I', b'F', b'F', 40, 0, 0, 0, b'W', b'A', b'V', b'E', b'f', b'm', b't', b' ',
            16, 0, 0, 0, 1, 0, 1, 0, 0xC0, 0x5D, 0, 0, 0x80, 0xBB, 0, 0, 2, 0, 16, 0, b'd', b'a',
            b't', b'a', 4, 0, 0, 0,
        ];
        assert_eq!(h, expected);
    }

    #[test]
    fn size_fields_track_payload_for_any_layout() {
        for (rate, channels) in [(8_000, 1), (22_050, 2), (24_000, 1), (44_100, 2), (48_000, 6)] {
            let frame = usize::from(channels) * 2;
            let pcm = vec![7u8; frame * 101];
            let file = encode(&pcm, rate, channels).unwrap();
            let riff = u32::from_le_bytes(file[4..8].try_into().unwrap());
            let data = u32::from_le_bytes(file[40..44].try_into().unwrap());
            let byte_rate = u32::from_le_bytes(file[28..32].try_into().unwrap());
            assert_eq!(data as usize, pcm.len());
            assert_eq!(riff, 36 + data);
            assert_eq!(file.len(), HEADER_LEN + pcm.len());
            assert_eq!(byte_rate, rate * u32::from(channels) * 2);
            assert_eq!(&file[HEADER_LEN..], &pcm[..]);
        }
    }

    #[test]
    fn empty_payload_is_a_valid_container() {
        let file = encode(&[], 24_000, 1).unwrap();
        assert_eq!(file.len(), HEADER_LEN);
        assert_eq!(u32::from_le_bytes(file[4..8].try_into().unwrap()), 36);
    }

    #[test]
    fn partial_frames_are_rejected() {
        assert!(encode(&[1, 2, 3], 24_000, 1).is_err());
        assert!(encode(&[0; 6], 24_000, 2).is_err());
        assert!(encode(&[0; 4], 0, 1).is_err());
    }

    #[test]
    fn parse_reads_back_duration() {
        let pcm = vec![0u8; 24_000 * 2 * 3];
        let info = parse(&encode(&pcm, 24_000, 1).unwrap()).unwrap();
        assert_eq!(info.sample_rate, 24_000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.bits_per_sample, 16);
        assert!((info.duration_secs() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn parse_skips_unknown_chunks() {
        let mut file = Vec::new();
        file.extend_from_slice(b"RIFF\0\0\0\0WAVE");
        file.extend_from_slice(&header(2, 16_000, 1)[12..36]);
        file.extend_from_slice(b"LIST\x03\0\0\0abc\0");
        file.extend_from_slice(b"data\x02\0\0\0\x01\x02");
        let info = parse(&file).unwrap();
        assert_eq!(info.data_len, 2);
        assert_eq!(info.sample_rate, 16_000);
        assert!(parse(b"not a wave file").is_err());
    }

    #[test]
    fn sample_rate_from_mime_params() {
        assert_eq!(sample_rate_from_mime("audio/L16;codec=pcm;rate=24000"), Some(24_000));
        assert_eq!(sample_rate_from_mime("audio/L16; rate=16000"), Some(16_000));
        assert_eq!(sample_rate_from_mime("audio/pcm"), None);
        assert_eq!(sample_rate_from_mime("audio/L16;rate=abc"), None);
    }
}
