//! Symphonia Decoder - 基于 symphonia 的音频解码器
//!
//! 支持：
//! - WAV → 单声道 f32 PCM（多声道取平均）
//! - 裸 PCM16 小端 → f32 PCM（除以 32767）

use async_trait::async_trait;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::application::ports::{AudioDecoderPort, AudioPayload, DecodeError};
use crate::domain::DecodedSegment;

/// 音频解码器
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }

    /// PCM16 小端 → f32
    fn decode_pcm16(data: &[u8], sample_rate: u32) -> Result<DecodedSegment, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::EmptyInput);
        }
        if data.len() % 2 != 0 {
            return Err(DecodeError::InvalidInput(format!(
                "PCM16 payload has odd length: {}",
                data.len()
            )));
        }
        if sample_rate == 0 {
            return Err(DecodeError::InvalidInput("sample rate is 0".to_string()));
        }

        let samples = data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32767.0)
            .collect();

        Ok(DecodedSegment::new(samples, sample_rate))
    }

    /// WAV → 单声道 f32
    fn decode_wav(data: Vec<u8>) -> Result<DecodedSegment, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::EmptyInput);
        }

        let cursor = Cursor::new(data);
        let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

        let mut hint = Hint::new();
        hint.with_extension("wav");

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::DecodingError(format!("Probe failed: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| DecodeError::DecodingError("No audio track found".to_string()))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::DecodingError("Unknown sample rate".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::DecodingError(format!("Decoder creation failed: {}", e)))?;

        let track_id = track.id;
        let mut mono: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    return Err(DecodeError::DecodingError(format!("Packet read error: {}", e)));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Decode error (skipping packet): {}", e);
                    continue;
                }
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();
            let channels = spec.channels.count().max(1);
            let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            let interleaved = &sample_buf.samples()[..num_frames * channels];
            if channels == 1 {
                mono.extend_from_slice(interleaved);
            } else {
                mono.extend(
                    interleaved
                        .chunks_exact(channels)
                        .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                );
            }
        }

        Ok(DecodedSegment::new(mono, sample_rate))
    }
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioDecoderPort for SymphoniaDecoder {
    async fn decode(&self, audio: &AudioPayload) -> Result<DecodedSegment, DecodeError> {
        match audio {
            AudioPayload::Pcm16 { data, sample_rate } => Self::decode_pcm16(data, *sample_rate),
            AudioPayload::Wav(data) => {
                let data = data.clone();
                tokio::task::spawn_blocking(move || Self::decode_wav(data))
                    .await
                    .map_err(|e| DecodeError::DecodingError(format!("Decode task failed: {}", e)))?
            }
        }
    }
}

/// 将单声道 f32 样本编码为 16-bit WAV
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let num_channels: u16 = 1;
    let byte_rate = sample_rate * num_channels as u32 * (bits_per_sample / 8) as u32;
    let block_align = num_channels * (bits_per_sample / 8);

    let data_size = samples.len() * 2;
    let file_size = 36 + data_size;

    let mut wav = Vec::with_capacity(44 + data_size);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(file_size as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&num_channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_size as u32).to_le_bytes());
    for &s in samples {
        let value = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
        wav.extend_from_slice(&value.to_le_bytes());
    }

    wav
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decode_pcm16() {
        let decoder = SymphoniaDecoder::new();
        let mut data = Vec::new();
        for v in [0i16, 32767, -32767, 16384] {
            data.extend_from_slice(&v.to_le_bytes());
        }

        let segment = decoder
            .decode(&AudioPayload::Pcm16 { data, sample_rate: 24_000 })
            .await
            .unwrap();

        assert_eq!(segment.samples().len(), 4);
        assert_eq!(segment.sample_rate(), 24_000);
        assert_eq!(segment.samples()[1], 1.0);
        assert_eq!(segment.samples()[2], -1.0);
    }

    #[tokio::test]
    async fn test_decode_pcm16_rejects_bad_input() {
        let decoder = SymphoniaDecoder::new();
        let empty = decoder
            .decode(&AudioPayload::Pcm16 { data: vec![], sample_rate: 24_000 })
            .await;
        assert!(matches!(empty, Err(DecodeError::EmptyInput)));

        let odd = decoder
            .decode(&AudioPayload::Pcm16 { data: vec![1, 2, 3], sample_rate: 24_000 })
            .await;
        assert!(matches!(odd, Err(DecodeError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_decode_wav_duration() {
        let decoder = SymphoniaDecoder::new();
        let samples: Vec<f32> = (0..12_000).map(|i| ((i as f32) * 0.05).sin() * 0.5).collect();
        let wav = encode_wav(&samples, 24_000);

        let segment = decoder.decode(&AudioPayload::Wav(wav)).await.unwrap();
        assert_eq!(segment.sample_rate(), 24_000);
        assert_eq!(segment.samples().len(), 12_000);
        assert!((segment.duration_secs() - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_decode_garbage_wav_fails() {
        let decoder = SymphoniaDecoder::new();
        let result = decoder.decode(&AudioPayload::Wav(b"not a wav file".to_vec())).await;
        assert!(matches!(result, Err(DecodeError::DecodingError(_))));
    }
}
