//! Push handler - applies an incremental batch from a client.

use crate::db;
use crate::error::Result;
use quadrant_engine::PushBatch;
use serde::Serialize;
use sqlx::PgPool;

/// Response for push sync.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Records the batch actually updated (stale copies are dropped by
    /// the concurrency predicate, which is an outcome, not an error).
    pub upserted: usize,
    /// Tombstoned ids removed.
    pub deleted: usize,
}

/// Process a push request. The whole batch lands in one database
/// transaction; the caller's identity scopes every row.
pub async fn handle_push(
    pool: &PgPool,
    user_id: &str,
    batch: PushBatch,
) -> Result<PushResponse> {
    if batch.is_empty() {
        return Ok(PushResponse {
            upserted: 0,
            deleted: 0,
        });
    }

    let summary = db::apply_push(pool, user_id, &batch).await?;

    tracing::info!(
        user = user_id,
        tasks = batch.tasks.len(),
        journals = batch.journals.len(),
        upserted = summary.upserted,
        deleted = summary.deleted,
        "applied push batch"
    );

    Ok(PushResponse {
        upserted: summary.upserted,
        deleted: summary.deleted,
    })
}
