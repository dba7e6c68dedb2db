use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

use crate::credential::Credential;
use crate::error::ProviderError;
use crate::job::{ImageMime, OperationHandle, OperationStatus};
use crate::provider::{MediaProviderClient, VideoRequest};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Max size of a JSON response body (edited images arrive inline, base64).
pub const MAX_RESPONSE_BYTES: usize = 32 * 1024 * 1024;

/// Max size of a downloaded video.
pub const MAX_DOWNLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Error bodies are only read far enough to extract a message.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Per-request timeout for JSON calls (downloads are streamed and capped).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A download fails once the server sends nothing for this long.
pub const DOWNLOAD_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Model ids for each remote operation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GeminiModels {
    pub video: String,
    pub image: String,
    pub text: String,
}

impl Default for GeminiModels {
    fn default() -> Self {
        Self {
            video: "veo-3.1-fast-generate-preview".to_string(),
            image: "gemini-2.5-flash-image".to_string(),
            text: "gemini-3-flash-preview".to_string(),
        }
    }
}

/// Image returned by an edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl EditedImage {
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.data))
    }
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    models: GeminiModels,
    download_read_timeout: Duration,
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, GeminiModels::default())
    }
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, models: GeminiModels) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("failed to build Gemini HTTP client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            models,
            download_read_timeout: DOWNLOAD_READ_TIMEOUT,
        }
    }

    /// Override how long a result download may go without receiving data.
    pub fn with_download_read_timeout(mut self, idle: Duration) -> Self {
        self.download_read_timeout = idle;
        self
    }

    pub fn models(&self) -> &GeminiModels {
        &self.models
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    fn authed(
        &self,
        req: RequestBuilder,
        credential: &Credential,
    ) -> Result<RequestBuilder, ProviderError> {
        let key = credential.api_key().ok_or(ProviderError::MissingCredential)?;
        Ok(req.header("x-goog-api-key", key.expose()))
    }

    async fn send_json(
        &self,
        req: RequestBuilder,
        credential: &Credential,
    ) -> Result<Vec<u8>, ProviderError> {
        let resp = self
            .authed(req, credential)?
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        read_capped(resp, MAX_RESPONSE_BYTES, REQUEST_TIMEOUT).await
    }

    /// Single-turn text generation.
    pub async fn generate_text(
        &self,
        prompt: &str,
        credential: &Credential,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });
        let req = self
            .client
            .post(self.model_url(&self.models.text, "generateContent"))
            .json(&body);
        let bytes = self.send_json(req, credential).await?;
        parse_text_response(&bytes)
    }

    /// Three-sentence marketing copy for a template listing.
    pub async fn describe_template(
        &self,
        title: &str,
        category: &str,
        tech: &[String],
        credential: &Credential,
    ) -> Result<String, ProviderError> {
        self.generate_text(&template_description_prompt(title, category, tech), credential)
            .await
    }

    pub async fn project_roadmap(&self, credential: &Credential) -> Result<String, ProviderError> {
        self.generate_text(ROADMAP_PROMPT, credential).await
    }

    /// Edit an image according to a text instruction.
    pub async fn edit_image(
        &self,
        image: &[u8],
        mime_type: ImageMime,
        prompt: &str,
        credential: &Credential,
    ) -> Result<EditedImage, ProviderError> {
        let body = build_edit_body(image, mime_type, prompt);
        let req = self
            .client
            .post(self.model_url(&self.models.image, "generateContent"))
            .json(&body);
        let bytes = self.send_json(req, credential).await?;
        parse_edit_response(&bytes, mime_type)
    }
}

#[async_trait]
impl MediaProviderClient for GeminiClient {
    async fn create_video_operation(
        &self,
        req: &VideoRequest<'_>,
        credential: &Credential,
    ) -> Result<OperationHandle, ProviderError> {
        let body = build_video_body(req);
        let http = self
            .client
            .post(self.model_url(&self.models.video, "predictLongRunning"))
            .json(&body);
        let bytes = self.send_json(http, credential).await?;
        parse_operation_name(&bytes)
    }

    async fn refresh_operation(
        &self,
        handle: &OperationHandle,
        credential: &Credential,
    ) -> Result<OperationStatus, ProviderError> {
        let url = format!("{}/{}", self.base_url, handle.as_str().trim_start_matches('/'));
        let bytes = self.send_json(self.client.get(url), credential).await?;
        parse_operation_status(&bytes)
    }

    async fn fetch_result(
        &self,
        uri: &str,
        credential: &Credential,
    ) -> Result<Vec<u8>, ProviderError> {
        let req = self.authed(self.client.get(uri), credential)?;
        let resp = tokio::time::timeout(self.download_read_timeout, req.send())
            .await
            .map_err(|_| stalled(self.download_read_timeout))??;
        let resp = check_status(resp).await?;
        read_capped(resp, MAX_DOWNLOAD_BYTES, self.download_read_timeout).await
    }
}

const ROADMAP_PROMPT: &str = "Create a step-by-step development roadmap for building a Premium \
Template Marketplace using Next.js, Tailwind, and Supabase. Keep it concise with 5 major phases.";

pub fn template_description_prompt(title: &str, category: &str, tech: &[String]) -> String {
    format!(
        "Generate a compelling, high-converting marketing description (about 3 sentences) for a \
         website template named \"{title}\". It is in the {category} category and uses {}. Focus \
         on clean design, performance, and modern aesthetics.",
        tech.join(", ")
    )
}

pub fn build_video_body(req: &VideoRequest<'_>) -> serde_json::Value {
    serde_json::json!({
        "instances": [{
            "prompt": req.prompt,
            "image": {
                "bytesBase64Encoded": BASE64.encode(req.image),
                "mimeType": req.mime_type.as_str(),
            },
        }],
        "parameters": {
            "aspectRatio": req.aspect_ratio.as_str(),
            "resolution": req.resolution,
            "sampleCount": 1,
        },
    })
}

pub fn build_edit_body(image: &[u8], mime_type: ImageMime, prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "parts": [
                {"inlineData": {"mimeType": mime_type.as_str(), "data": BASE64.encode(image)}},
                {"text": prompt},
            ],
        }],
    })
}

pub fn parse_operation_name(body: &[u8]) -> Result<OperationHandle, ProviderError> {
    let v: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ProviderError::SchemaParse(format!("operation create response: {e}")))?;
    v["name"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(OperationHandle::new)
        .ok_or_else(|| ProviderError::SchemaParse("operation create response missing 'name'".into()))
}

pub fn parse_operation_status(body: &[u8]) -> Result<OperationStatus, ProviderError> {
    let v: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ProviderError::SchemaParse(format!("operation status response: {e}")))?;

    let done = v["done"].as_bool().unwrap_or(false);
    let response = &v["response"];

    let result_uri = response["generateVideoResponse"]["generatedSamples"]
        .as_array()
        .or_else(|| response["generatedVideos"].as_array())
        .and_then(|arr| arr.first())
        .and_then(|sample| sample["video"]["uri"].as_str())
        .map(|s| s.to_string());

    let error = match v["error"]["message"].as_str() {
        Some(msg) => Some(msg.to_string()),
        None if v["error"].is_object() => Some(format!("operation error: {}", v["error"])),
        // Safety filters drop samples and say why.
        None => response["generateVideoResponse"]["raiMediaFilteredReasons"]
            .as_array()
            .map(|reasons| {
                reasons
                    .iter()
                    .filter_map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|s| !s.is_empty()),
    };

    Ok(OperationStatus {
        done,
        result_uri,
        error,
    })
}

pub fn parse_text_response(body: &[u8]) -> Result<String, ProviderError> {
    let v: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ProviderError::SchemaParse(format!("generateContent response: {e}")))?;
    let parts = v["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| ProviderError::SchemaParse("generateContent response missing parts".into()))?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        return Err(ProviderError::SchemaParse("generateContent response has no text".into()));
    }
    Ok(text)
}

/// First inline image among the candidate's parts.
pub fn parse_edit_response(body: &[u8], requested: ImageMime) -> Result<EditedImage, ProviderError> {
    let v: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ProviderError::SchemaParse(format!("image edit response: {e}")))?;
    let Some(parts) = v["candidates"][0]["content"]["parts"].as_array() else {
        return Err(ProviderError::NoImage);
    };

    let inline = parts
        .iter()
        .map(|p| &p["inlineData"])
        .find(|d| d["data"].is_string())
        .ok_or(ProviderError::NoImage)?;

    let data = BASE64
        .decode(inline["data"].as_str().unwrap_or_default())
        .map_err(|e| ProviderError::SchemaParse(format!("image edit data: {e}")))?;
    let mime_type = inline["mimeType"]
        .as_str()
        .unwrap_or(requested.as_str())
        .to_string();
    Ok(EditedImage { mime_type, data })
}

/// Map non-success statuses to typed errors, keeping the provider's message.
async fn check_status(resp: Response) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = read_capped(resp, MAX_ERROR_BODY_BYTES, REQUEST_TIMEOUT)
        .await
        .unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| status.to_string());

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::AuthFailed(message));
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited);
    }
    Err(ProviderError::Upstream {
        status: Some(status.as_u16()),
        message,
    })
}

/// `error.message` from a Google API error body, or the raw text.
fn error_message(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_slice::<serde_json::Value>(body)
        && let Some(msg) = v["error"]["message"].as_str()
    {
        return Some(msg.to_string());
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn stalled(idle: Duration) -> ProviderError {
    ProviderError::Stalled(format!("no data received for {}ms", idle.as_millis()))
}

/// Read a body, failing once it grows past `limit` or goes quiet for `idle`.
async fn read_capped(
    resp: Response,
    limit: usize,
    idle: Duration,
) -> Result<Vec<u8>, ProviderError> {
    if let Some(len) = resp.content_length()
        && len as usize > limit
    {
        return Err(ProviderError::Upstream {
            status: None,
            message: format!("response too large: {len} bytes (max {limit})"),
        });
    }

    let mut buf = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = tokio::time::timeout(idle, stream.next())
        .await
        .map_err(|_| stalled(idle))?
    {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            return Err(ProviderError::Upstream {
                status: None,
                message: format!("response too large: over {limit} bytes"),
            });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
