//! Inbound voice handling: base64 audio to transcribed text.
//!
//! Voice input arrives as a base64-encoded audio blob over the realtime
//! channel. It is decoded and transcribed here; the transcribed text then
//! takes the ordinary text-turn path. Replies are text-only; there is no
//! speech synthesis.

use anyhow::Result;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{AudioInput, CreateTranscriptionRequestArgs},
};
use async_trait::async_trait;
use base64::Engine;

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("Audio payload was not valid base64: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
    #[error("Transcription produced no text")]
    EmptyTranscription,
    #[error("Transcription failed: {0}")]
    Upstream(#[from] anyhow::Error),
}

/// Decodes the wire-format audio payload into raw bytes.
pub fn decode_audio(audio_base64: &str) -> Result<Vec<u8>, VoiceError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(audio_base64)?)
}

/// A hosted speech-to-text capability.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes an audio blob. An `Ok` result may still be empty; the
    /// caller decides how to surface that.
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String>;
}

/// A `Transcriber` for any OpenAI-compatible audio transcription endpoint.
pub struct OpenAITranscriber {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAITranscriber {
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl Transcriber for OpenAITranscriber {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8("voice-message.webm".to_string(), audio))
            .model(&self.model)
            .build()?;
        let response = self.client.audio().transcribe(request).await?;
        Ok(response.text)
    }
}

/// Runs the decode + transcribe half of the voice pipeline. The caller
/// emits the transcription event and hands the text to the orchestrator.
pub async fn transcribe_payload(
    transcriber: &dyn Transcriber,
    audio_base64: &str,
) -> Result<String, VoiceError> {
    let audio = decode_audio(audio_base64)?;
    let text = transcriber
        .transcribe(audio)
        .await
        .map_err(VoiceError::Upstream)?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(VoiceError::EmptyTranscription);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedTranscriber(String);

    #[async_trait]
    impl Transcriber for CannedTranscriber {
        async fn transcribe(&self, _audio: Vec<u8>) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(matches!(
            decode_audio("%%% not base64 %%%"),
            Err(VoiceError::InvalidAudio(_))
        ));
    }

    #[tokio::test]
    async fn empty_transcription_is_an_error() {
        let transcriber = CannedTranscriber("   ".into());
        let payload = base64::engine::general_purpose::STANDARD.encode(b"audio");
        let err = transcribe_payload(&transcriber, &payload).await.unwrap_err();
        assert!(matches!(err, VoiceError::EmptyTranscription));
    }

    #[tokio::test]
    async fn transcription_text_is_trimmed() {
        let transcriber = CannedTranscriber("  what is middleware?  ".into());
        let payload = base64::engine::general_purpose::STANDARD.encode(b"audio");
        let text = transcribe_payload(&transcriber, &payload).await.unwrap();
        assert_eq!(text, "what is middleware?");
    }
}
