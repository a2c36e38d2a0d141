use super::{sse, CompletionRequest, CompletionTransport, Result, TextStream, UpstreamError};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

/// Direct client for OpenAI-compatible `/chat/completions` endpoints
pub struct OpenAICompatibleTransport {
    client: reqwest::Client,
}

impl OpenAICompatibleTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::from_reqwest)?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn completions_url(endpoint_base: &str) -> String {
        format!("{}/chat/completions", endpoint_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionTransport for OpenAICompatibleTransport {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, request: &CompletionRequest) -> Result<TextStream> {
        let url = Self::completions_url(&request.endpoint_base);

        let payload = json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "stream": request.stream,
        });

        tracing::debug!(
            "Completion request: model={}, stream={}, prompt_chars={}",
            request.model,
            request.stream,
            request.prompt.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", request.credential))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::rejected(status, text));
        }

        if request.stream {
            let body = response
                .bytes_stream()
                .map(|chunk| {
                    chunk
                        .map(|bytes| bytes.to_vec())
                        .map_err(UpstreamError::from_reqwest)
                })
                .boxed();
            return Ok(sse::content_stream(body));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| UpstreamError::Parse("No message content in response".to_string()))?
            .to_string();

        Ok(futures::stream::once(async move { Ok(content.into_bytes()) }).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_joins_cleanly() {
        assert_eq!(
            OpenAICompatibleTransport::completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            OpenAICompatibleTransport::completions_url("http://localhost:8080/v1"),
            "http://localhost:8080/v1/chat/completions"
        );
    }
}
