//! Sync queries: batch upserts under the optimistic-concurrency
//! predicate, tombstone deletion, live-set reads, and the freshness
//! scalar. One push batch is always applied inside a single transaction.

use quadrant_engine::{JournalEntry, PushBatch, Task};
use sqlx::{PgPool, Postgres, Transaction};

use super::records::{priority_as_str, status_as_str, JournalRow, TaskRow};

/// Counts reported back to the client after a push.
#[derive(Debug, Default)]
pub struct PushSummary {
    pub upserted: usize,
    pub deleted: usize,
}

/// Apply one push batch atomically: upsert dirty records where the
/// incoming copy is newer (strictly greater version, or equal version
/// with a newer `updated_at`) and delete the tombstoned ids.
pub async fn apply_push(
    pool: &PgPool,
    owner: &str,
    batch: &PushBatch,
) -> Result<PushSummary, sqlx::Error> {
    let mut summary = PushSummary::default();
    let mut tx = pool.begin().await?;

    for task in &batch.tasks {
        summary.upserted += upsert_task(&mut tx, owner, task).await?;
    }
    for journal in &batch.journals {
        summary.upserted += upsert_journal(&mut tx, owner, journal).await?;
    }

    if !batch.deleted_task_ids.is_empty() {
        let result = sqlx::query("DELETE FROM tasks WHERE owner_id = $1 AND id = ANY($2)")
            .bind(owner)
            .bind(&batch.deleted_task_ids)
            .execute(&mut *tx)
            .await?;
        summary.deleted += result.rows_affected() as usize;
    }
    if !batch.deleted_journal_ids.is_empty() {
        let result = sqlx::query("DELETE FROM journals WHERE owner_id = $1 AND id = ANY($2)")
            .bind(owner)
            .bind(&batch.deleted_journal_ids)
            .execute(&mut *tx)
            .await?;
        summary.deleted += result.rows_affected() as usize;
    }

    tx.commit().await?;
    Ok(summary)
}

async fn upsert_task(
    tx: &mut Transaction<'_, Postgres>,
    owner: &str,
    task: &Task,
) -> Result<usize, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO tasks (
            id, owner_id, title, description, quadrant, date, completed, task_order,
            status, priority, due_date, tags, subtasks, progress,
            created_at, updated_at, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            description = EXCLUDED.description,
            quadrant = EXCLUDED.quadrant,
            date = EXCLUDED.date,
            completed = EXCLUDED.completed,
            task_order = EXCLUDED.task_order,
            status = EXCLUDED.status,
            priority = EXCLUDED.priority,
            due_date = EXCLUDED.due_date,
            tags = EXCLUDED.tags,
            subtasks = EXCLUDED.subtasks,
            progress = EXCLUDED.progress,
            updated_at = EXCLUDED.updated_at,
            version = EXCLUDED.version
        WHERE tasks.owner_id = EXCLUDED.owner_id
          AND (tasks.version < EXCLUDED.version
               OR (tasks.version = EXCLUDED.version
                   AND tasks.updated_at < EXCLUDED.updated_at))
        "#,
    )
    .bind(&task.id)
    .bind(owner)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.quadrant.as_u8() as i16)
    .bind(&task.date)
    .bind(task.completed)
    .bind(task.order)
    .bind(task.status.map(status_as_str))
    .bind(task.priority.map(priority_as_str))
    .bind(&task.due_date)
    .bind(sqlx::types::Json(&task.tags))
    .bind(sqlx::types::Json(&task.subtasks))
    .bind(task.progress.map(|p| p as i16))
    .bind(task.created_at as i64)
    .bind(task.updated_at as i64)
    .bind(task.version as i64)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() as usize)
}

async fn upsert_journal(
    tx: &mut Transaction<'_, Postgres>,
    owner: &str,
    journal: &JournalEntry,
) -> Result<usize, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO journals (
            id, owner_id, content, date, tags, created_at, updated_at, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE SET
            content = EXCLUDED.content,
            date = EXCLUDED.date,
            tags = EXCLUDED.tags,
            updated_at = EXCLUDED.updated_at,
            version = EXCLUDED.version
        WHERE journals.owner_id = EXCLUDED.owner_id
          AND (journals.version < EXCLUDED.version
               OR (journals.version = EXCLUDED.version
                   AND journals.updated_at < EXCLUDED.updated_at))
        "#,
    )
    .bind(&journal.id)
    .bind(owner)
    .bind(&journal.content)
    .bind(&journal.date)
    .bind(sqlx::types::Json(&journal.tags))
    .bind(journal.created_at as i64)
    .bind(journal.updated_at as i64)
    .bind(journal.version as i64)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() as usize)
}

/// All task rows for one identity.
pub async fn get_tasks(pool: &PgPool, owner: &str) -> Result<Vec<TaskRow>, sqlx::Error> {
    sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, owner_id, title, description, quadrant, date, completed, task_order,
               status, priority, due_date, tags, subtasks, progress,
               created_at, updated_at, version
        FROM tasks
        WHERE owner_id = $1
        "#,
    )
    .bind(owner)
    .fetch_all(pool)
    .await
}

/// All journal rows for one identity.
pub async fn get_journals(pool: &PgPool, owner: &str) -> Result<Vec<JournalRow>, sqlx::Error> {
    sqlx::query_as::<_, JournalRow>(
        r#"
        SELECT id, owner_id, content, date, tags, created_at, updated_at, version
        FROM journals
        WHERE owner_id = $1
        "#,
    )
    .bind(owner)
    .fetch_all(pool)
    .await
}

/// Maximum modification timestamp across one identity's records, for the
/// poll loop's cheap freshness check.
pub async fn latest_change(pool: &PgPool, owner: &str) -> Result<i64, sqlx::Error> {
    let result: (i64,) = sqlx::query_as(
        r#"
        SELECT GREATEST(
            COALESCE((SELECT MAX(updated_at) FROM tasks WHERE owner_id = $1), 0),
            COALESCE((SELECT MAX(updated_at) FROM journals WHERE owner_id = $1), 0)
        )
        "#,
    )
    .bind(owner)
    .fetch_one(pool)
    .await?;

    Ok(result.0)
}
