//! Task data structures.
//!
//! A `Task` is loaded together with the subtasks and comments it owns; the
//! backend deletes those rows when the task goes away.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::fields::*;

/// The primary unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Id,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dept_id: Option<Id>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub recurrence: Recurrence,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub subtasks: Vec<Subtask>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub comments: Vec<Comment>,
}

impl Task {
    /// Number of finished subtasks and total subtasks.
    pub fn subtask_progress(&self) -> (usize, usize) {
        let done = self.subtasks.iter().filter(|s| s.done).count();
        (done, self.subtasks.len())
    }

    pub fn subtask(&self, id: &Id) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| &s.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Id,
    #[serde(default)]
    pub task_id: Option<Id>,
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Id,
    #[serde(default)]
    pub task_id: Option<Id>,
    pub text: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_row_with_nested_children() {
        let raw = r#"{
            "id": "t1",
            "title": "Ship onboarding",
            "description": null,
            "dept_id": 3,
            "status": "Review",
            "priority": "High",
            "assignee": "Ada Lovelace",
            "due_date": "2024-05-01",
            "recurrence": "Weekly",
            "tags": ["design", "urgent"],
            "created_at": "2024-04-01T10:00:00.123456+00:00",
            "updated_at": null,
            "subtasks": [
                {"id": "s1", "task_id": "t1", "title": "Copy", "done": true},
                {"id": "s2", "task_id": "t1", "title": "Screens", "done": false}
            ],
            "comments": [
                {"id": "c1", "task_id": "t1", "text": "Looks good", "author": "Team Member",
                 "created_at": "2024-04-02T09:00:00+00:00"}
            ]
        }"#;
        let task: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(task.dept_id, Some(Id::new("3")));
        assert_eq!(task.status, Status::Review);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(task.subtask_progress(), (1, 2));
        assert_eq!(task.comments[0].author.as_deref(), Some("Team Member"));
        assert!(task.created_at.is_some());
    }

    #[test]
    fn test_sparse_task_row_uses_defaults() {
        let task: Task = serde_json::from_str(r#"{"id": 9, "title": "Bare", "tags": null}"#).unwrap();
        assert_eq!(task.status, Status::NotStarted);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.recurrence, Recurrence::None);
        assert!(task.tags.is_empty());
        assert!(task.subtasks.is_empty());
    }
}
