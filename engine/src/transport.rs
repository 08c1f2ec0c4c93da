//! The remote sync endpoint seam and its HTTP implementation.
//!
//! The push payload is incremental: dirty records plus tombstone id
//! lists, per kind. The remote applies the whole batch as one
//! transaction, upserting only where the optimistic-concurrency
//! predicate holds (incoming version strictly greater, or equal version
//! with newer `updatedAt`) and deleting the tombstoned ids.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::record::{JournalEntry, Task};
use crate::{Error, RecordId, Result, Timestamp};

/// One push batch: everything the remote does not have yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBatch {
    pub tasks: Vec<Task>,
    pub journals: Vec<JournalEntry>,
    pub deleted_task_ids: Vec<RecordId>,
    pub deleted_journal_ids: Vec<RecordId>,
}

impl PushBatch {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
            && self.journals.is_empty()
            && self.deleted_task_ids.is_empty()
            && self.deleted_journal_ids.is_empty()
    }
}

/// The remote's full live record set for one identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSet {
    pub tasks: Vec<Task>,
    pub journals: Vec<JournalEntry>,
}

/// Freshness scalar returned by the cheap poll query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCheck {
    /// Maximum modification timestamp across the identity's records.
    pub timestamp: Timestamp,
}

/// Transport to the remote store of record, scoped to the caller's
/// authenticated identity.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Ship one batch; the remote applies it atomically.
    async fn push(&self, batch: &PushBatch) -> Result<()>;

    /// Fetch the full live record set.
    async fn fetch(&self) -> Result<RemoteSet>;

    /// Fetch the freshness scalar only.
    async fn latest_change(&self) -> Result<Timestamp>;
}

/// HTTP transport against the sync server's `/sync` routes.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpRemote {
    /// `base_url` without a trailing slash, e.g. `https://api.example.com`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    fn check_status(response: &reqwest::Response) -> Result<()> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::AuthExpired);
        }
        if !status.is_success() {
            return Err(Error::NetworkUnreachable(format!(
                "server answered {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTransport for HttpRemote {
    async fn push(&self, batch: &PushBatch) -> Result<()> {
        let response = self
            .client
            .post(self.url("/sync"))
            .bearer_auth(&self.token)
            .json(batch)
            .send()
            .await
            .map_err(|e| Error::NetworkUnreachable(e.to_string()))?;
        Self::check_status(&response)
    }

    async fn fetch(&self) -> Result<RemoteSet> {
        let response = self
            .client
            .get(self.url("/sync"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::NetworkUnreachable(e.to_string()))?;
        Self::check_status(&response)?;
        response
            .json()
            .await
            .map_err(|e| Error::NetworkUnreachable(format!("malformed response: {e}")))
    }

    async fn latest_change(&self) -> Result<Timestamp> {
        let response = self
            .client
            .get(self.url("/sync?check=true"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::NetworkUnreachable(e.to_string()))?;
        Self::check_status(&response)?;
        let check: RemoteCheck = response
            .json()
            .await
            .map_err(|e| Error::NetworkUnreachable(format!("malformed response: {e}")))?;
        Ok(check.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Quadrant;

    #[test]
    fn empty_batch_detection() {
        let mut batch = PushBatch::default();
        assert!(batch.is_empty());

        batch.deleted_journal_ids.push("j-1".into());
        assert!(!batch.is_empty());
    }

    #[test]
    fn batch_wire_format() {
        let batch = PushBatch {
            tasks: vec![Task::new("user-1", "ship it", Quadrant::Q1, "2024-03-01", 1000.0, 500)],
            journals: vec![],
            deleted_task_ids: vec!["t-9".into()],
            deleted_journal_ids: vec![],
        };

        let json = serde_json::to_string(&batch).unwrap();
        assert!(json.contains("\"deletedTaskIds\":[\"t-9\"]"));
        assert!(json.contains("\"ownerId\":\"user-1\""));

        let parsed: PushBatch = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, batch);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let remote = HttpRemote::new("https://api.example.com/", "token");
        assert_eq!(remote.url("/sync"), "https://api.example.com/sync");
    }
}
