//! Row types for the record tables and their wire conversions.

use quadrant_engine::{JournalEntry, Quadrant, SubTask, SyncState, Task, TaskPriority, TaskStatus};
use sqlx::Row;

/// A stored task row from the database.
#[derive(Debug)]
pub struct TaskRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub quadrant: i16,
    pub date: String,
    pub completed: bool,
    pub task_order: f64,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub tags: serde_json::Value,
    pub subtasks: serde_json::Value,
    pub progress: Option<i16>,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for TaskRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(TaskRow {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            quadrant: row.try_get("quadrant")?,
            date: row.try_get("date")?,
            completed: row.try_get("completed")?,
            task_order: row.try_get("task_order")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            due_date: row.try_get("due_date")?,
            tags: row.try_get("tags")?,
            subtasks: row.try_get("subtasks")?,
            progress: row.try_get("progress")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl TaskRow {
    /// Convert a database row to an engine Task. The server's copy is by
    /// definition the synced copy.
    pub fn into_task(self) -> Result<Task, String> {
        let quadrant = u8::try_from(self.quadrant)
            .map_err(|_| format!("quadrant out of range: {}", self.quadrant))
            .and_then(Quadrant::try_from)?;
        let tags: Vec<String> =
            serde_json::from_value(self.tags).map_err(|e| format!("bad tags column: {e}"))?;
        let subtasks: Vec<SubTask> = serde_json::from_value(self.subtasks)
            .map_err(|e| format!("bad subtasks column: {e}"))?;

        Ok(Task {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            quadrant,
            date: self.date,
            completed: self.completed,
            order: self.task_order,
            status: self.status.as_deref().and_then(parse_status),
            priority: self.priority.as_deref().and_then(parse_priority),
            due_date: self.due_date,
            tags,
            subtasks,
            progress: self.progress.and_then(|p| u8::try_from(p).ok()),
            created_at: self.created_at as u64,
            updated_at: self.updated_at as u64,
            version: self.version as u64,
            sync_state: SyncState::Synced,
        })
    }
}

/// A stored journal row from the database.
#[derive(Debug)]
pub struct JournalRow {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    pub date: String,
    pub tags: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for JournalRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(JournalRow {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            content: row.try_get("content")?,
            date: row.try_get("date")?,
            tags: row.try_get("tags")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl JournalRow {
    /// Convert a database row to an engine JournalEntry.
    pub fn into_journal(self) -> Result<JournalEntry, String> {
        let tags: Vec<String> =
            serde_json::from_value(self.tags).map_err(|e| format!("bad tags column: {e}"))?;

        Ok(JournalEntry {
            id: self.id,
            owner_id: self.owner_id,
            content: self.content,
            date: self.date,
            tags,
            created_at: self.created_at as u64,
            updated_at: self.updated_at as u64,
            version: self.version as u64,
            sync_state: SyncState::Synced,
        })
    }
}

/// Column encoding of [`TaskStatus`], mirroring the wire names.
pub fn status_as_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "todo",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Blocked => "blocked",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn parse_status(value: &str) -> Option<TaskStatus> {
    match value {
        "todo" => Some(TaskStatus::Todo),
        "in_progress" => Some(TaskStatus::InProgress),
        "blocked" => Some(TaskStatus::Blocked),
        "cancelled" => Some(TaskStatus::Cancelled),
        _ => None,
    }
}

/// Column encoding of [`TaskPriority`], mirroring the wire names.
pub fn priority_as_str(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::High => "high",
        TaskPriority::Medium => "medium",
        TaskPriority::Low => "low",
    }
}

fn parse_priority(value: &str) -> Option<TaskPriority> {
    match value {
        "high" => Some(TaskPriority::High),
        "medium" => Some(TaskPriority::Medium),
        "low" => Some(TaskPriority::Low),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_encoding_matches_wire_names() {
        for status in [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Cancelled,
        ] {
            let column = status_as_str(status);
            assert_eq!(parse_status(column), Some(status));
            // The column value equals the serde wire name.
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, serde_json::Value::String(column.to_string()));
        }
        assert_eq!(parse_status("nonsense"), None);
    }

    #[test]
    fn priority_encoding_matches_wire_names() {
        for priority in [TaskPriority::High, TaskPriority::Medium, TaskPriority::Low] {
            let column = priority_as_str(priority);
            assert_eq!(parse_priority(column), Some(priority));
            let wire = serde_json::to_value(priority).unwrap();
            assert_eq!(wire, serde_json::Value::String(column.to_string()));
        }
    }

    #[test]
    fn row_conversion_rejects_bad_quadrant() {
        let row = TaskRow {
            id: "t-1".into(),
            owner_id: "user-1".into(),
            title: "x".into(),
            description: None,
            quadrant: 9,
            date: "2024-03-01".into(),
            completed: false,
            task_order: 1000.0,
            status: None,
            priority: None,
            due_date: None,
            tags: serde_json::json!([]),
            subtasks: serde_json::json!([]),
            progress: None,
            created_at: 0,
            updated_at: 0,
            version: 1,
        };
        assert!(row.into_task().is_err());
    }
}
