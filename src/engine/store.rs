use super::ArtifactSource;
use crate::config::{ClientConfig, Endpoints};
use crate::error::ArtifactFetchError;
use crate::model::{ArtifactContent, ArtifactKind, Decoding, RunId};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use tracing::{debug, instrument};

/// HTTP client for the object store that serves run artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl ArtifactStore {
    pub fn new(cfg: &ClientConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoints: cfg.endpoints.clone(),
        })
    }

    pub fn url(&self, run_id: &RunId, kind: ArtifactKind) -> Result<Url, ArtifactFetchError> {
        self.endpoints
            .artifact_url(run_id.as_str(), kind.file_name())
            .map_err(|e| ArtifactFetchError::Location {
                kind,
                message: e.to_string(),
            })
    }

    async fn get(&self, url: Url, kind: ArtifactKind) -> Result<reqwest::Response, ArtifactFetchError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport(kind, e))?;
        check_status(kind, resp)
    }
}

fn transport(kind: ArtifactKind, e: reqwest::Error) -> ArtifactFetchError {
    ArtifactFetchError::Transport {
        kind,
        message: e.to_string(),
    }
}

fn check_status(
    kind: ArtifactKind,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ArtifactFetchError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(ArtifactFetchError::Status {
            kind,
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl ArtifactSource for ArtifactStore {
    #[instrument(skip(self, run_id), fields(run_id = %run_id))]
    async fn fetch(
        &self,
        run_id: &RunId,
        kind: ArtifactKind,
    ) -> Result<ArtifactContent, ArtifactFetchError> {
        let url = self.url(run_id, kind)?;
        let content = match kind.decoding() {
            Decoding::Structured => {
                let value = self
                    .get(url, kind)
                    .await?
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| ArtifactFetchError::Decode {
                        kind,
                        message: e.to_string(),
                    })?;
                ArtifactContent::Structured(value)
            }
            Decoding::Text => {
                let text = self
                    .get(url, kind)
                    .await?
                    .text()
                    .await
                    .map_err(|e| transport(kind, e))?;
                ArtifactContent::Text(text)
            }
            // Only confirm the object exists; consumers load it from the URL.
            Decoding::Reference => {
                let resp = self
                    .http
                    .head(url.clone())
                    .send()
                    .await
                    .map_err(|e| transport(kind, e))?;
                check_status(kind, resp)?;
                ArtifactContent::Reference(url.into())
            }
        };
        debug!(%kind, "artifact fetched");
        Ok(content)
    }

    #[instrument(skip(self, run_id), fields(run_id = %run_id))]
    async fn download(
        &self,
        run_id: &RunId,
        kind: ArtifactKind,
    ) -> Result<Bytes, ArtifactFetchError> {
        let url = self.url(run_id, kind)?;
        self.get(url, kind)
            .await?
            .bytes()
            .await
            .map_err(|e| transport(kind, e))
    }
}
