// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! G.711 mu-law codec and the transcoder that sits between the telephony
//! leg and the realtime AI leg.
//!
//! The telephony side always carries 8 kHz mono mu-law. The realtime side
//! carries whatever the session negotiated: either the same mu-law stream
//! (no sample conversion, the payload is only validated) or 24 kHz PCM16.

use crate::protocol::realtime::AudioFormat;

/// Sample rate of the telephony leg.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Sample rate the realtime API uses for `pcm16` audio.
pub const REALTIME_PCM16_SAMPLE_RATE: u32 = 24000;

/// Bias added before companding (ITU-T G.711).
const MULAW_BIAS: i32 = 0x84;
/// Largest magnitude that survives companding without clipping.
const MULAW_CLIP: i32 = 32635;

/// Compand one 16-bit linear sample into a mu-law byte.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let sign = if sample < 0 { 0x80 } else { 0x00 };
    let magnitude = (sample as i32).abs().min(MULAW_CLIP) + MULAW_BIAS;

    // Segment = position of the highest set bit above bit 7.
    let exponent = (7..=14)
        .rev()
        .find(|bit| magnitude & (1 << bit) != 0)
        .map(|bit| bit - 7)
        .unwrap_or(0);
    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Expand one mu-law byte into a 16-bit linear sample.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let inverted = !byte as i32;
    let exponent = (inverted >> 4) & 0x07;
    let mantissa = inverted & 0x0F;
    let magnitude = (((mantissa << 1) | 0x21) << (exponent + 2)) - MULAW_BIAS;

    if inverted & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Decode mu-law bytes into little-endian PCM16 bytes.
pub fn mulaw_to_pcm(mulaw: &[u8]) -> Vec<u8> {
    mulaw
        .iter()
        .flat_map(|&b| mulaw_to_linear(b).to_le_bytes())
        .collect()
}

/// Encode little-endian PCM16 bytes into mu-law. A trailing odd byte is dropped.
pub fn pcm_to_mulaw(pcm: &[u8]) -> Vec<u8> {
    if pcm.len() % 2 != 0 {
        tracing::warn!(bytes = pcm.len(), "pcm_to_mulaw: odd-length input, trailing byte ignored");
    }
    pcm.chunks_exact(2)
        .map(|c| linear_to_mulaw(i16::from_le_bytes([c[0], c[1]])))
        .collect()
}

/// Linear-interpolation resampler over little-endian PCM16 bytes.
pub fn resample_linear(pcm: &[u8], from_rate: u32, to_rate: u32) -> Vec<u8> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return pcm.to_vec();
    }

    let input: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    match input.len() {
        0 => return Vec::new(),
        1 => return pcm[..2].to_vec(),
        _ => {}
    }

    let step = from_rate as f64 / to_rate as f64;
    let out_len = (input.len() as f64 / step).ceil() as usize;
    let last = input.len() - 1;

    let mut out = Vec::with_capacity(out_len * 2);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = pos.floor() as usize;
        let sample = if idx < last {
            let frac = pos - idx as f64;
            let (a, b) = (input[idx] as f64, input[idx + 1] as f64);
            (a + frac * (b - a)) as i16
        } else {
            input[last]
        };
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Converts raw audio between the telephony wire format and the format the
/// realtime session was configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transcoder {
    format: AudioFormat,
}

impl Transcoder {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Caller audio (mu-law 8 kHz) into realtime input audio.
    pub fn to_realtime(&self, mulaw: &[u8]) -> Vec<u8> {
        match self.format {
            AudioFormat::G711Ulaw => mulaw.to_vec(),
            AudioFormat::Pcm16 => resample_linear(
                &mulaw_to_pcm(mulaw),
                TELEPHONY_SAMPLE_RATE,
                REALTIME_PCM16_SAMPLE_RATE,
            ),
        }
    }

    /// Realtime output audio into telephony playback audio (mu-law 8 kHz).
    pub fn to_telephony(&self, audio: &[u8]) -> Vec<u8> {
        match self.format {
            AudioFormat::G711Ulaw => audio.to_vec(),
            AudioFormat::Pcm16 => pcm_to_mulaw(&resample_linear(
                audio,
                REALTIME_PCM16_SAMPLE_RATE,
                TELEPHONY_SAMPLE_RATE,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_mulaw_silence_is_0xff() {
        assert_eq!(linear_to_mulaw(0), 0xFF);
        assert!(mulaw_to_linear(0xFF).abs() < 10);
    }

    #[test]
    fn test_mulaw_is_close_for_speech_levels() {
        for sample in [-32000i16, -5000, -1000, -100, 100, 1000, 5000, 32000] {
            let decoded = mulaw_to_linear(linear_to_mulaw(sample));
            let error = (sample as i32 - decoded as i32).unsigned_abs();
            assert!(
                error < 1000 || (error as f64 / sample.unsigned_abs() as f64) < 0.05,
                "sample={sample}, decoded={decoded}"
            );
        }
    }

    #[test]
    fn test_mulaw_sign_symmetry() {
        let pos = mulaw_to_linear(linear_to_mulaw(5000));
        let neg = mulaw_to_linear(linear_to_mulaw(-5000));
        assert_eq!(pos, -neg);
    }

    #[test]
    fn test_pcm_to_mulaw_drops_trailing_byte() {
        let mut data = pcm(&[0, 0]);
        data.push(0x12);
        assert_eq!(pcm_to_mulaw(&data), vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_resample_ratios() {
        let two = pcm(&[100, 200]);
        assert_eq!(resample_linear(&two, 8000, 24000).len() / 2, 6);

        let six = pcm(&[100, 200, 300, 400, 500, 600]);
        assert_eq!(resample_linear(&six, 24000, 8000).len() / 2, 2);

        assert_eq!(resample_linear(&six, 8000, 8000), six);
        assert!(resample_linear(&[], 8000, 24000).is_empty());
    }

    #[test]
    fn test_transcoder_ulaw_is_passthrough() {
        let t = Transcoder::new(AudioFormat::G711Ulaw);
        let payload = vec![0x7F, 0xFF, 0x00, 0x80];
        assert_eq!(t.to_realtime(&payload), payload);
        assert_eq!(t.to_telephony(&payload), payload);
    }

    #[test]
    fn test_transcoder_pcm16_rates() {
        let t = Transcoder::new(AudioFormat::Pcm16);

        // 160 mu-law bytes = 20 ms at 8 kHz -> 480 samples at 24 kHz.
        let inbound = t.to_realtime(&[0xFF; 160]);
        assert_eq!(inbound.len(), 480 * 2);

        // 480 PCM16 samples at 24 kHz -> 160 mu-law bytes.
        let outbound = t.to_telephony(&vec![0u8; 480 * 2]);
        assert_eq!(outbound.len(), 160);
        assert!(outbound.iter().all(|&b| b == 0xFF));
    }
}
