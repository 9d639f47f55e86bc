use super::share::backend_message;
use super::RunBackend;
use crate::config::{ClientConfig, Endpoints};
use crate::error::{QueryError, ShareError, SubmissionError};
use crate::model::{RunId, RunRecord, RunStatus, ShareReply, ShareRequest, Submission};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

const SUBMIT_PATH: &str = "/api/runs/create";
const STATUS_PATH: &str = "/api/runs/run";
const SHARE_PATH: &str = "/api/runs/share";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Backend responses wrap their payload in `{ "data": ... }`.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct SubmitData {
    #[serde(rename = "runID", alias = "runId", alias = "id")]
    run_id: String,
    #[serde(default = "initial_status")]
    status: RunStatus,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Deserialize)]
struct StatusData {
    status: RunStatus,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

fn initial_status() -> RunStatus {
    RunStatus::Running
}

/// HTTP client for the execution backend.
#[derive(Debug, Clone)]
pub struct RunClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl RunClient {
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

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

#[async_trait]
impl RunBackend for RunClient {
    #[instrument(skip(self, submission), fields(key = %submission.idempotency_key))]
    async fn submit(&self, submission: &Submission) -> Result<RunRecord, SubmissionError> {
        submission.config.validate()?;

        let resp = self
            .http
            .post(self.endpoints.backend_url(SUBMIT_PATH))
            .header(IDEMPOTENCY_HEADER, &submission.idempotency_key)
            .json(&submission.config)
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = backend_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "request failed".to_string());
            warn!(status = status.as_u16(), %message, "submission rejected");
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: Envelope<SubmitData> = resp
            .json()
            .await
            .map_err(|e| SubmissionError::Decode(e.to_string()))?;
        let data = body.data;
        if data.run_id.trim().is_empty() {
            return Err(SubmissionError::Decode(
                "backend returned an empty run identifier".into(),
            ));
        }

        let record = RunRecord {
            id: RunId::new(data.run_id),
            status: data.status,
            detail: Value::Object(data.rest),
        };
        info!(run_id = %record.id, status = %record.status, "run submitted");
        Ok(record)
    }

    #[instrument(skip(self, run_id), fields(run_id = %run_id))]
    async fn query_status(&self, run_id: &RunId) -> Result<RunRecord, QueryError> {
        let resp = self
            .http
            .post(self.endpoints.backend_url(STATUS_PATH))
            .json(&serde_json::json!({ "runID": run_id }))
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(QueryError::Status {
                status: status.as_u16(),
            });
        }

        let body: Envelope<StatusData> = resp
            .json()
            .await
            .map_err(|e| QueryError::Decode(e.to_string()))?;
        debug!(status = %body.data.status, "status observed");

        // The identifier is ours; whatever the payload says, it is not replaced.
        Ok(RunRecord {
            id: run_id.clone(),
            status: body.data.status,
            detail: Value::Object(body.data.rest),
        })
    }

    #[instrument(skip(self, request), fields(run_id = %request.run_id, recipients = request.recipients.len()))]
    async fn share(&self, request: &ShareRequest) -> Result<ShareReply, ShareError> {
        let resp = self
            .http
            .post(self.endpoints.backend_url(SHARE_PATH))
            .json(request)
            .send()
            .await
            .map_err(|e| ShareError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| ShareError::Transport(e.to_string()))?;
        debug!(status, "share response received");
        Ok(ShareReply { status, body })
    }
}
