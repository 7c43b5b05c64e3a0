//! Speech requester: narration text → WAV file.
//!
//! Gemini TTS models return raw 16-bit little-endian mono PCM as inline data
//! with a MIME type such as `audio/L16;codec=pcm;rate=24000`. The samples are
//! wrapped in a WAV container with `hound` so the clip encoder (and any media
//! player) can read the file directly.

use super::{write_atomic, SpeechSynthesizer};
use crate::error::GenerationError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use gemini_rest::{
    Content, GeminiClient, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    Modality, Part, SpeechConfig,
};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sample rate assumed when the MIME type does not state one.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// [`SpeechSynthesizer`] backed by a Gemini TTS model.
#[derive(Debug, Clone)]
pub struct GeminiSpeechSynthesizer {
    client: GeminiClient,
    model: String,
    voice: String,
}

impl GeminiSpeechSynthesizer {
    pub fn new(client: GeminiClient, model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            voice: voice.into(),
        }
    }

    fn build_request(&self, text: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(text)])],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec![Modality::Audio]),
                speech_config: Some(SpeechConfig::prebuilt(self.voice.as_str())),
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeechSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        output: &Path,
    ) -> Result<Option<PathBuf>, GenerationError> {
        let request = self.build_request(text);
        let response = self.client.generate_content(&self.model, &request).await?;

        save_audio(&response, output, &self.model).await
    }
}

/// Write the first audio blob of `response` to `output` as WAV.
///
/// Returns `None` when the response carries no audio.
pub(crate) async fn save_audio(
    response: &GenerateContentResponse,
    output: &Path,
    model: &str,
) -> Result<Option<PathBuf>, GenerationError> {
    let Some(blob) = response
        .first_parts()
        .iter()
        .filter_map(|p| p.inline_data.as_ref())
        .find(|b| b.mime_type.starts_with("audio/") && !b.data.is_empty())
    else {
        return Ok(None);
    };

    let raw = STANDARD.decode(&blob.data).map_err(|e| {
        GenerationError::InvalidResponse(format!("audio data is not base64: {e}"))
    })?;
    debug!("{}: {} bytes of {}", model, raw.len(), blob.mime_type);

    let wav = if is_wav(&blob.mime_type) {
        raw
    } else {
        pcm_to_wav(&raw, sample_rate(&blob.mime_type))?
    };
    write_atomic(output, &wav).await?;
    info!("Audio saved to {}", output.display());
    Ok(Some(output.to_path_buf()))
}

fn is_wav(mime_type: &str) -> bool {
    let m = mime_type.to_ascii_lowercase();
    m.starts_with("audio/wav") || m.starts_with("audio/x-wav") || m.starts_with("audio/wave")
}

/// `rate=` parameter of a PCM MIME type, or [`DEFAULT_SAMPLE_RATE`].
pub fn sample_rate(mime_type: &str) -> u32 {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(DEFAULT_SAMPLE_RATE)
}

/// Wrap 16-bit LE mono PCM in a WAV container.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, GenerationError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_err =
        |e: hound::Error| GenerationError::InvalidResponse(format!("WAV encoding failed: {e}"));

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_err)?;
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(wav_err)?;
        }
        writer.finalize().map_err(wav_err)?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_parsed_from_mime() {
        assert_eq!(sample_rate("audio/L16;codec=pcm;rate=24000"), 24_000);
        assert_eq!(sample_rate("audio/L16; rate=16000"), 16_000);
        assert_eq!(sample_rate("audio/L16"), DEFAULT_SAMPLE_RATE);
        assert_eq!(sample_rate("audio/L16;rate=abc"), DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn pcm_wrapped_as_readable_wav() {
        let samples: Vec<i16> = (0..2400).map(|i| (i % 100) as i16).collect();
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let wav = pcm_to_wav(&pcm, 24_000).unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.duration(), 2400);
    }

    #[test]
    fn request_uses_voice_and_audio_modality() {
        let s = GeminiSpeechSynthesizer::new(GeminiClient::new("k").unwrap(), "tts", "Puck");
        let v = serde_json::to_value(s.build_request("hello")).unwrap();
        assert_eq!(v["generationConfig"]["responseModalities"][0], "AUDIO");
        let voice = &v["generationConfig"]["speechConfig"]["voiceConfig"];
        assert_eq!(voice["prebuiltVoiceConfig"]["voiceName"], "Puck");
    }

    #[test]
    fn wav_mime_detection() {
        assert!(is_wav("audio/wav"));
        assert!(is_wav("audio/x-wav"));
        assert!(!is_wav("audio/L16;rate=24000"));
    }

    fn response(parts: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": parts}}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn response_without_audio_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("section_0.wav");

        let text_only = response(serde_json::json!([{"text": "no audio today"}]));
        assert!(save_audio(&text_only, &out, "tts").await.unwrap().is_none());

        let no_candidates = GenerateContentResponse::default();
        assert!(save_audio(&no_candidates, &out, "tts").await.unwrap().is_none());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn pcm_response_written_as_wav() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("section_0.wav");
        let pcm: Vec<u8> = (0..1600i16).flat_map(|s| s.to_le_bytes()).collect();
        let resp = response(serde_json::json!([
            {"text": "narration follows"},
            {"inlineData": {
                "mimeType": "audio/L16;codec=pcm;rate=16000",
                "data": STANDARD.encode(&pcm)
            }}
        ]));

        let saved = save_audio(&resp, &out, "tts").await.unwrap();
        assert_eq!(saved.as_deref(), Some(out.as_path()));
        let reader = hound::WavReader::open(&out).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.duration(), 1600);
    }
}
