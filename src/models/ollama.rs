//! reqwest client for a local Ollama server.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use reqwest::{Client, Response};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::backend::{
    BackendError, GenerateRequest, GenerateResponse, ModelBackend, ProgressFn, PullProgress, RemoteModel,
    TagsResponse, VersionResponse,
};

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    connect_timeout: Duration,
}

impl OllamaClient {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            connect_timeout: Self::CONNECT_TIMEOUT,
        })
    }

    fn endpoint(base: &Url, path: &str) -> Result<Url, BackendError> {
        base.join(path)
            .map_err(|e| BackendError::InvalidUrl(format!("{}{}: {}", base, path, e)))
    }

    fn transport(&self, err: reqwest::Error) -> BackendError {
        BackendError::from_reqwest(err, self.connect_timeout)
    }

    async fn check(&self, response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(BackendError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

/// Drains complete NDJSON lines from `buffer`, leaving any partial tail.
fn drain_lines(buffer: &mut BytesMut, progress: ProgressFn<'_>) -> Result<(), BackendError> {
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line = buffer.split_to(pos);
        buffer.advance(1);
        handle_line(&line, progress)?;
    }
    Ok(())
}

fn handle_line(line: &[u8], progress: ProgressFn<'_>) -> Result<(), BackendError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<PullProgress>(text) {
        Ok(update) => {
            if let Some(error) = update.error.clone() {
                return Err(BackendError::Remote(error));
            }
            progress(&update);
        }
        Err(e) => debug!(error = %e, "Ignoring non-JSON pull line"),
    }
    Ok(())
}

#[async_trait]
impl ModelBackend for OllamaClient {
    #[instrument(skip(self))]
    async fn list_models(&self, base: &Url) -> Result<Vec<RemoteModel>, BackendError> {
        let response = self
            .client
            .get(Self::endpoint(base, "api/tags")?)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let tags: TagsResponse = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(tags.models)
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, base: &Url, request: &GenerateRequest) -> Result<GenerateResponse, BackendError> {
        let response = self
            .client
            .post(Self::endpoint(base, "api/generate")?)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.check(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    #[instrument(skip(self, progress))]
    async fn pull(&self, base: &Url, name: &str, progress: ProgressFn<'_>) -> Result<(), BackendError> {
        let response = self
            .client
            .post(Self::endpoint(base, "api/pull")?)
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let mut response = self.check(response).await?;

        let mut buffer = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.transport(e))? {
            buffer.extend_from_slice(&chunk);
            drain_lines(&mut buffer, progress)?;
        }
        if !buffer.is_empty() {
            handle_line(&buffer, progress)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, base: &Url, name: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(Self::endpoint(base, "api/delete")?)
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.check(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn version(&self, base: &Url) -> Result<String, BackendError> {
        let response = self
            .client
            .get(Self::endpoint(base, "api/version")?)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let body: VersionResponse = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(body.version.unwrap_or_else(|| {
            warn!("Version endpoint returned no version");
            "unknown".to_string()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn pull_stream_lines_are_split_across_chunks() {
        let seen = Mutex::new(Vec::new());
        let record = |p: &PullProgress| seen.lock().unwrap().push(p.status.clone().unwrap_or_default());

        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(b"{\"status\":\"pulling manifest\"}\n{\"sta");
        drain_lines(&mut buffer, &record).unwrap();
        buffer.extend_from_slice(b"tus\":\"success\"}\nnot json\n");
        drain_lines(&mut buffer, &record).unwrap();

        assert!(buffer.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["pulling manifest", "success"]);
    }

    #[test]
    fn pull_stream_error_line_fails() {
        let mut buffer = BytesMut::from(&b"{\"error\":\"pull model manifest: file does not exist\"}\n"[..]);
        let err = drain_lines(&mut buffer, &|_: &PullProgress| {}).unwrap_err();
        assert!(matches!(err, BackendError::Remote(_)));
    }

    #[test]
    fn endpoints_join_onto_server_root() {
        let base = Url::parse("http://localhost:11434").unwrap();
        assert_eq!(
            OllamaClient::endpoint(&base, "api/tags").unwrap().as_str(),
            "http://localhost:11434/api/tags"
        );
    }
}
