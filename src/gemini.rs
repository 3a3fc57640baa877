//! Client for Google's Gemini streaming API with search grounding.
//!
//! The API itself is stateless, so each [`ChatSession`] keeps the running
//! `contents` history client-side and replays it on every turn. Responses
//! stream back as SSE `data:` lines which are decoded into typed structs at
//! this boundary; nothing downstream touches raw JSON.

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::config::{API_KEY_ENV, Config, GenerationParams};
use crate::consultation::{Attachment, Source};
use crate::prompts::SYSTEM_PROMPT;
use crate::stream::{ResponseChunk, StreamEvent};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// One part of a turn: plain text or inline file data.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// The inline-data form of an attachment: its base64 payload without the
    /// data-URL prefix. Returns `None` for a malformed data URL.
    pub fn from_attachment(attachment: &Attachment) -> Option<Self> {
        let payload = attachment.payload()?;
        Some(Part::InlineData {
            inline_data: InlineData {
                mime_type: attachment.mime_type.clone(),
                data: payload.to_string(),
            },
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: SystemInstruction,
    generation_config: GenerationConfig,
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

impl From<GenerationParams> for GenerationConfig {
    fn from(params: GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            top_k: params.top_k,
            top_p: params.top_p,
        }
    }
}

#[derive(Serialize, Default)]
struct Tool {
    google_search: GoogleSearchConfig,
}

#[derive(Serialize, Default)]
struct GoogleSearchConfig {}

// Response shapes. Every field is optional so an evolving API surfaces as a
// decode error or an empty chunk, never a panic.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GroundingMetadata {
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

impl GenerateContentResponse {
    /// Collapses one SSE payload into a chunk: concatenated text parts plus
    /// any grounding citations carrying both a URI and a title.
    fn into_chunk(self) -> Option<ResponseChunk> {
        let mut text = String::new();
        let mut citations = Vec::new();
        for candidate in self.candidates {
            if let Some(content) = candidate.content {
                for part in content.parts {
                    if let Some(t) = part.text {
                        text.push_str(&t);
                    }
                }
            }
            if let Some(metadata) = candidate.grounding_metadata {
                for chunk in metadata.grounding_chunks {
                    let Some(web) = chunk.web else { continue };
                    if let (Some(uri), Some(title)) = (web.uri, web.title) {
                        citations.push(Source { title, uri });
                    }
                }
            }
        }
        if text.is_empty() && citations.is_empty() {
            return None;
        }
        Some(ResponseChunk {
            text: (!text.is_empty()).then_some(text),
            citations,
        })
    }
}

/// Factory for chat sessions, holding shared HTTP state and configuration.
#[derive(Clone)]
pub struct GeminiClient {
    config: Config,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config, client })
    }

    /// Opens a chat session bound to the configured model and persona.
    /// Fails when no service credential is available.
    pub fn create_session(&self) -> Result<ChatSession> {
        let api_key = self
            .config
            .api_key()
            .ok_or_else(|| anyhow!("{API_KEY_ENV} is not set"))?;
        Ok(ChatSession {
            client: self.client.clone(),
            api_key,
            model: self.config.model.clone(),
            generation: self.config.generation,
            history: Vec::new(),
        })
    }
}

/// One conversation's live session: its turn history and request settings.
pub struct ChatSession {
    client: reqwest::Client,
    api_key: String,
    model: String,
    generation: GenerationParams,
    history: Vec<Content>,
}

impl ChatSession {
    /// Sends a user turn and returns the receiving end of its response
    /// stream. Network and decode failures arrive as [`StreamEvent::Failed`].
    pub fn send_message_stream(&mut self, parts: Vec<Part>) -> mpsc::Receiver<StreamEvent> {
        self.history.push(Content {
            role: "user".to_string(),
            parts,
        });
        let request = GenerateContentRequest {
            contents: self.history.clone(),
            system_instruction: SystemInstruction {
                parts: vec![Part::text(SYSTEM_PROMPT)],
            },
            generation_config: self.generation.into(),
            tools: vec![Tool::default()],
        };
        let url = format!(
            "{BASE_URL}/{model}:streamGenerateContent?alt=sse&key={key}",
            model = self.model,
            key = self.api_key,
        );

        let (tx, rx) = mpsc::channel(256);
        let client = self.client.clone();
        let tx_err = tx.clone();
        tokio::spawn(async move {
            if let Err(err) = run_stream(client, url, request, tx).await {
                tracing::error!("response stream failed: {err:#}");
                let _ = tx_err.send(StreamEvent::Failed(err.to_string())).await;
            }
        });
        rx
    }

    /// Records the completed model reply so the next turn carries it.
    pub fn push_model_turn(&mut self, text: &str) {
        self.history.push(Content {
            role: "model".to_string(),
            parts: vec![Part::text(text)],
        });
    }

    /// Drops the last turn, used when its response stream failed and the
    /// exchange should not poison future requests.
    pub fn discard_last_turn(&mut self) {
        self.history.pop();
    }
}

async fn run_stream(
    client: reqwest::Client,
    url: String,
    request: GenerateContentRequest,
    tx: mpsc::Sender<StreamEvent>,
) -> Result<()> {
    let response = client.post(&url).json(&request).send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Gemini API error ({status}): {}", api_error(&body)));
    }

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    while let Some(bytes) = stream.next().await {
        let bytes = bytes?;
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        // Process complete lines.
        while let Some(newline_pos) = buffer.find('\n') {
            let line = buffer[..newline_pos].trim().to_string();
            buffer = buffer[newline_pos + 1..].to_string();
            forward_sse_line(&line, &tx).await?;
        }
    }

    // Flush any remaining buffer line without a trailing newline.
    let line = buffer.trim().to_string();
    forward_sse_line(&line, &tx).await?;

    let _ = tx.send(StreamEvent::Completed).await;
    Ok(())
}

async fn forward_sse_line(line: &str, tx: &mpsc::Sender<StreamEvent>) -> Result<()> {
    let Some(data) = line.strip_prefix("data: ") else {
        return Ok(());
    };
    if data == "[DONE]" {
        return Ok(());
    }
    let response: GenerateContentResponse =
        serde_json::from_str(data).context("Malformed stream chunk")?;
    if let Some(chunk) = response.into_chunk() {
        let _ = tx.send(StreamEvent::Chunk(chunk)).await;
    }
    Ok(())
}

/// Pulls `error.message` out of an API error body, falling back to the body.
fn api_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_payload_decodes_into_text_and_citations() {
        let data = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "최신 판례에 따르면"}]},
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "http://x", "title": "판례A"}},
                    {"web": {"uri": "http://no-title"}}
                ]}
            }]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(data).unwrap();
        let chunk = response.into_chunk().unwrap();
        assert_eq!(chunk.text.as_deref(), Some("최신 판례에 따르면"));
        assert_eq!(chunk.citations.len(), 1);
        assert_eq!(chunk.citations[0].uri, "http://x");
    }

    #[test]
    fn payload_with_nothing_usable_yields_no_chunk() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{}]}"#).unwrap();
        assert!(response.into_chunk().is_none());
    }

    #[test]
    fn attachment_part_uses_the_raw_base64_payload() {
        let attachment = Attachment {
            name: "계약서.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            data: "data:application/pdf;base64,QUJD".to_string(),
        };
        let part = Part::from_attachment(&attachment).unwrap();
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(json["inlineData"]["data"], "QUJD");
    }

    #[test]
    fn api_error_prefers_the_structured_message() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid"}}"#;
        assert_eq!(api_error(body), "API key not valid");
        assert_eq!(api_error("plain failure"), "plain failure");
    }

    #[test]
    fn generation_config_serializes_camel_case() {
        let config: GenerationConfig = GenerationParams::default().into();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["topK"], 40);
        assert!(json.get("top_k").is_none());
    }
}
