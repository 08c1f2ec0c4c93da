//! Pull handler - serves an identity's live record set, and the cheap
//! freshness scalar the poll loop asks for.

use crate::db;
use crate::error::Result;
use quadrant_engine::{RemoteCheck, RemoteSet};
use sqlx::PgPool;

/// Full live record set for the caller.
pub async fn handle_pull(pool: &PgPool, user_id: &str) -> Result<RemoteSet> {
    let task_rows = db::get_tasks(pool, user_id).await?;
    let journal_rows = db::get_journals(pool, user_id).await?;

    let mut tasks = Vec::with_capacity(task_rows.len());
    for row in task_rows {
        match row.into_task() {
            Ok(task) => tasks.push(task),
            Err(e) => {
                // Skip rows that no longer decode; they cannot be served.
                tracing::warn!(user = user_id, error = %e, "skipping undecodable task row");
            }
        }
    }

    let mut journals = Vec::with_capacity(journal_rows.len());
    for row in journal_rows {
        match row.into_journal() {
            Ok(journal) => journals.push(journal),
            Err(e) => {
                tracing::warn!(user = user_id, error = %e, "skipping undecodable journal row");
            }
        }
    }

    tracing::debug!(
        user = user_id,
        tasks = tasks.len(),
        journals = journals.len(),
        "serving live set"
    );

    Ok(RemoteSet { tasks, journals })
}

/// Freshness scalar: the max `updated_at` across the caller's records.
pub async fn handle_check(pool: &PgPool, user_id: &str) -> Result<RemoteCheck> {
    let latest = db::latest_change(pool, user_id).await?;
    Ok(RemoteCheck {
        timestamp: latest.max(0) as u64,
    })
}
