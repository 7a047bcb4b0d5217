//! OpenAI Whisper transcription collaborator over `reqwest::multipart`.

use async_trait::async_trait;
use meter_core::SpeechToText;

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_key: String,
}

impl WhisperTranscriber {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api_key: api_key.into() }
    }
}

#[async_trait]
impl SpeechToText for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> anyhow::Result<String> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio")
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new().part("file", part).text("model", "whisper-1");

        let response = self
            .client
            .post(WHISPER_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let parsed: serde_json::Value = response.json().await?;
        let text = parsed["text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Whisper response missing text"))?;
        Ok(text.trim().to_string())
    }
}
