use super::RunBackend;
use crate::error::ShareError;
use crate::model::{RunId, ShareReceipt, ShareReply, ShareRequest};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Split a comma-separated recipient list into trimmed entries.
///
/// Order and duplicates are kept and nothing is checked for email syntax;
/// only empty segments are dropped.
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The `message` field of a JSON error body, if there is one.
pub(crate) fn backend_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// Grants other users visibility into an existing run.
#[derive(Clone)]
pub struct ShareService {
    backend: Arc<dyn RunBackend>,
}

impl ShareService {
    pub fn new(backend: Arc<dyn RunBackend>) -> Self {
        Self { backend }
    }

    /// Build the request for a raw recipient string without sending it.
    pub fn request(run_id: &RunId, raw_recipients: &str) -> Result<ShareRequest, ShareError> {
        let recipients = split_recipients(raw_recipients);
        if recipients.is_empty() {
            return Err(ShareError::NoRecipients);
        }
        Ok(ShareRequest {
            run_id: run_id.clone(),
            recipients,
        })
    }

    /// Split `raw_recipients`, send the request and map the response.
    pub async fn share(
        &self,
        run_id: &RunId,
        raw_recipients: &str,
    ) -> Result<ShareReceipt, ShareError> {
        let request = Self::request(run_id, raw_recipients)?;
        self.send(request).await
    }

    #[instrument(skip(self, request), fields(run_id = %request.run_id))]
    pub async fn send(&self, request: ShareRequest) -> Result<ShareReceipt, ShareError> {
        let reply = self.backend.share(&request).await?;
        let outcome = interpret(reply);
        match &outcome {
            Ok(_) => info!(recipients = request.recipients.len(), "run shared"),
            Err(e) => warn!(error = %e, "share failed"),
        }
        outcome.map(|()| ShareReceipt {
            run_id: request.run_id,
            recipients: request.recipients,
        })
    }
}

fn interpret(reply: ShareReply) -> Result<(), ShareError> {
    match reply.status {
        200 => Ok(()),
        401 => Err(ShareError::Unauthorized),
        400 => Err(ShareError::Rejected {
            message: backend_message(&reply.body).unwrap_or(reply.body),
        }),
        status => Err(ShareError::Unexpected { status }),
    }
}
