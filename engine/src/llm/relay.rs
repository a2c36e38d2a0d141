use super::{CompletionRequest, CompletionTransport, Result, TextStream, UpstreamError};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;

/// Client for an analysis relay exposing `POST /api/analyze`
///
/// The relay holds the upstream connection and always answers with a raw
/// UTF-8 text stream, so the body is passed through untouched.
pub struct RelayTransport {
    relay_url: String,
    client: reqwest::Client,
}

/// Wire body expected by the relay
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayBody<'a> {
    prompt: &'a str,
    api_key: &'a str,
    base_url: &'a str,
    model: &'a str,
}

impl RelayTransport {
    pub fn new(relay_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::from_reqwest)?;
        Ok(Self {
            relay_url: relay_url.into(),
            client,
        })
    }

    fn analyze_url(&self) -> String {
        format!("{}/api/analyze", self.relay_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionTransport for RelayTransport {
    fn name(&self) -> &str {
        "relay"
    }

    async fn send(&self, request: &CompletionRequest) -> Result<TextStream> {
        let body = RelayBody {
            prompt: &request.prompt,
            api_key: &request.credential,
            base_url: &request.endpoint_base,
            model: &request.model,
        };

        let response = self
            .client
            .post(self.analyze_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    UpstreamError::Network(format!(
                        "Cannot connect to analysis relay at {}",
                        self.relay_url
                    ))
                } else {
                    UpstreamError::from_reqwest(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::rejected(status, text));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(UpstreamError::from_reqwest)
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_body_uses_camel_case() {
        let body = RelayBody {
            prompt: "p",
            api_key: "k",
            base_url: "b",
            model: "m",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["apiKey"], "k");
        assert_eq!(value["baseUrl"], "b");
    }

    #[test]
    fn test_analyze_url() {
        let transport = RelayTransport::new("http://localhost:3000/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.analyze_url(), "http://localhost:3000/api/analyze");
    }
}
