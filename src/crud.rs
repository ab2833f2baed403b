//! CRUD orchestration.
//!
//! `Dashboard` owns the store together with the state the forms and the
//! detail panel edit. Every operation validates its input, updates local
//! state where the user should see the change at once, and returns the
//! `WriteOp` to send. Nothing here talks to the network; the caller hands
//! the op to the `Synchronizer`.

use chrono::{Local, Utc};
use serde_json::{json, Value};

use crate::backend::{Table, WriteOp};
use crate::db::{format_tags, parse_due_input, parse_tags, FetchOutcome, Snapshot, Store};
use crate::department;
use crate::error::{Error, Result};
use crate::fields::*;
use crate::task::{Subtask, Task};
use crate::views::TaskFilter;

/// Editable mirror of a task. Optional text fields use `""` for "unset".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub dept_id: Option<Id>,
    pub status: Status,
    pub priority: Priority,
    pub assignee: String,
    /// Raw due date input, `YYYY-MM-DD` or a shortcut such as `tomorrow`.
    pub due_date: String,
    pub recurrence: Recurrence,
    /// Comma-separated tags.
    pub tags: String,
}

impl TaskDraft {
    pub fn from_task(task: &Task) -> Self {
        TaskDraft {
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
            dept_id: task.dept_id.clone(),
            status: task.status,
            priority: task.priority,
            assignee: task.assignee.clone().unwrap_or_default(),
            due_date: task
                .due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            recurrence: task.recurrence,
            tags: format_tags(&task.tags),
        }
    }

    /// Row payload. Blank optional fields become `null`.
    pub fn payload(&self) -> Result<Value> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::validation("Title"));
        }
        let due_input = self.due_date.trim();
        let due_date = if due_input.is_empty() {
            None
        } else {
            Some(parse_due_input(due_input).ok_or_else(|| Error::Invalid {
                field: "Due date",
                value: due_input.to_string(),
            })?)
        };

        Ok(json!({
            "title": title,
            "description": non_empty(&self.description),
            "dept_id": self.dept_id,
            "status": self.status,
            "priority": self.priority,
            "assignee": non_empty(&self.assignee),
            "due_date": due_date,
            "recurrence": self.recurrence,
            "tags": parse_tags(&self.tags),
        }))
    }
}

/// Editable mirror of a department.
#[derive(Debug, Clone, PartialEq)]
pub struct DeptDraft {
    pub name: String,
    pub color: String,
    pub icon: String,
    /// Set for sub-departments; fixed for the life of the form.
    pub parent_id: Option<Id>,
}

impl Default for DeptDraft {
    fn default() -> Self {
        DeptDraft {
            name: String::new(),
            color: PALETTE[0].to_string(),
            icon: DEFAULT_DEPT_ICON.to_string(),
            parent_id: None,
        }
    }
}

impl DeptDraft {
    pub fn is_sub_department(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn payload(&self) -> Result<Value> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::validation("Name"));
        }
        let icon = match self.icon.trim() {
            "" => DEFAULT_DEPT_ICON,
            icon => icon,
        };
        Ok(json!({
            "name": name,
            "color": self.color,
            "icon": icon,
            "parent_id": self.parent_id,
        }))
    }
}

/// The task shown in the detail panel, plus any optimistic local edits.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailPanel {
    pub task_id: Id,
    /// Locally patched copy, dropped by the next successful fetch.
    pub patch: Option<Task>,
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

fn required<'a>(input: &'a str, field: &'static str) -> Result<&'a str> {
    non_empty(input).ok_or(Error::validation(field))
}

#[derive(Debug, Default)]
pub struct Dashboard {
    pub store: Store,
    pub filter: TaskFilter,
    pub task_draft: TaskDraft,
    pub editing_task: Option<Id>,
    pub dept_draft: DeptDraft,
    pub editing_dept: Option<Id>,
    pub member_name: String,
    pub detail: Option<DetailPanel>,
}

impl Dashboard {
    pub fn apply_fetch(&mut self, seq: u64, result: Result<Snapshot>) -> FetchOutcome {
        let outcome = self.store.apply_fetch(seq, result);
        if outcome == FetchOutcome::Applied {
            if let Some(panel) = &mut self.detail {
                panel.patch = None;
            }
            // The open task may have been deleted elsewhere.
            if let Some(panel) = &self.detail {
                if self.store.get(&panel.task_id).is_none() {
                    self.detail = None;
                }
            }
        }
        outcome
    }

    // Detail panel

    pub fn open_detail(&mut self, task_id: &Id) -> Result<()> {
        if self.store.get(task_id).is_none() {
            return Err(Error::NotFound(format!("task {} not found", task_id)));
        }
        self.detail = Some(DetailPanel { task_id: task_id.clone(), patch: None });
        Ok(())
    }

    pub fn close_detail(&mut self) {
        self.detail = None;
    }

    /// The task as the detail panel shows it: the local patch if any, else the stored row.
    pub fn detail_task(&self) -> Option<&Task> {
        let panel = self.detail.as_ref()?;
        panel.patch.as_ref().or_else(|| self.store.get(&panel.task_id))
    }

    /// Apply `edit` to the detail panel's copy of `task_id`, if that task is open.
    fn patch_detail(&mut self, task_id: &Id, edit: impl FnOnce(&mut Task)) {
        let base = match self.detail_task() {
            Some(task) if &task.id == task_id => task.clone(),
            _ => return,
        };
        if let Some(panel) = &mut self.detail {
            let mut patched = base;
            edit(&mut patched);
            panel.patch = Some(patched);
        }
    }

    // Tasks

    pub fn open_new_task(&mut self) {
        self.editing_task = None;
        let dept_id = self
            .filter
            .dept
            .clone()
            .or_else(|| self.store.departments.first().map(|d| d.id.clone()));
        self.task_draft = TaskDraft { dept_id, ..TaskDraft::default() };
    }

    pub fn open_edit_task(&mut self, id: &Id) -> Result<()> {
        let task = self
            .store
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("task {} not found", id)))?;
        self.task_draft = TaskDraft::from_task(task);
        self.editing_task = Some(id.clone());
        Ok(())
    }

    pub fn save_task(&mut self) -> Result<WriteOp> {
        let payload = self.task_draft.payload()?;
        Ok(match &self.editing_task {
            Some(id) => WriteOp::Update { table: Table::Tasks, id: id.clone(), payload },
            None => WriteOp::Insert { table: Table::Tasks, payload },
        })
    }

    pub fn delete_task(&mut self, id: &Id) -> WriteOp {
        if self.detail.as_ref().is_some_and(|p| &p.task_id == id) {
            self.detail = None;
        }
        WriteOp::Delete { table: Table::Tasks, id: id.clone() }
    }

    pub fn update_task_status(&mut self, id: &Id, status: Status) -> WriteOp {
        self.patch_detail(id, |t| t.status = status);
        WriteOp::Update {
            table: Table::Tasks,
            id: id.clone(),
            payload: json!({ "status": status }),
        }
    }

    // Departments

    pub fn open_new_dept(&mut self, parent: Option<Id>) {
        self.editing_dept = None;
        self.dept_draft = DeptDraft {
            color: department::next_color(&self.store.departments).to_string(),
            parent_id: parent,
            ..DeptDraft::default()
        };
    }

    pub fn open_edit_dept(&mut self, id: &Id) -> Result<()> {
        let dept = self
            .store
            .department(id)
            .ok_or_else(|| Error::NotFound(format!("department {} not found", id)))?;
        self.dept_draft = DeptDraft {
            name: dept.name.clone(),
            color: dept.color.clone(),
            icon: dept.icon().to_string(),
            parent_id: dept.parent_id.clone(),
        };
        self.editing_dept = Some(id.clone());
        Ok(())
    }

    pub fn save_dept(&mut self) -> Result<WriteOp> {
        let payload = self.dept_draft.payload()?;
        Ok(match &self.editing_dept {
            Some(id) => WriteOp::Update { table: Table::Departments, id: id.clone(), payload },
            None => WriteOp::Insert { table: Table::Departments, payload },
        })
    }

    /// Tasks of the deleted department keep their now dangling `dept_id`.
    pub fn delete_dept(&mut self, id: &Id) -> WriteOp {
        if self.filter.dept.as_ref() == Some(id) {
            self.filter.dept = None;
        }
        WriteOp::Delete { table: Table::Departments, id: id.clone() }
    }

    // Subtasks and comments

    pub fn add_subtask(&mut self, task_id: &Id, title: &str) -> Result<WriteOp> {
        let title = required(title, "Subtask")?.to_string();
        let temp = Subtask {
            id: Id::new(format!("tmp-{}", Utc::now().timestamp_millis())),
            task_id: Some(task_id.clone()),
            title: title.clone(),
            done: false,
        };
        self.patch_detail(task_id, |t| t.subtasks.push(temp));
        Ok(WriteOp::Insert {
            table: Table::Subtasks,
            payload: json!({ "task_id": task_id, "title": title }),
        })
    }

    pub fn toggle_subtask(&mut self, task_id: &Id, subtask_id: &Id) -> Result<WriteOp> {
        let current = self
            .detail_task()
            .filter(|t| &t.id == task_id)
            .or_else(|| self.store.get(task_id))
            .and_then(|t| t.subtask(subtask_id))
            .ok_or_else(|| Error::NotFound(format!("subtask {} not found", subtask_id)))?;
        let done = !current.done;

        self.patch_detail(task_id, |t| {
            if let Some(sub) = t.subtasks.iter_mut().find(|s| &s.id == subtask_id) {
                sub.done = done;
            }
        });
        Ok(WriteOp::Update {
            table: Table::Subtasks,
            id: subtask_id.clone(),
            payload: json!({ "done": done }),
        })
    }

    pub fn add_comment(&mut self, task_id: &Id, text: &str) -> Result<WriteOp> {
        let text = required(text, "Comment")?;
        Ok(WriteOp::Insert {
            table: Table::Comments,
            payload: json!({ "task_id": task_id, "text": text, "author": COMMENT_AUTHOR }),
        })
    }

    // Members

    pub fn add_member(&mut self) -> Result<WriteOp> {
        let name = required(&self.member_name, "Name")?.to_string();
        self.member_name.clear();
        Ok(WriteOp::Insert {
            table: Table::Members,
            payload: json!({ "name": name }),
        })
    }

    pub fn delete_member(&mut self, id: &Id) -> WriteOp {
        WriteOp::Delete { table: Table::Members, id: id.clone() }
    }

    /// Today in local time; due dates and overdue flags are relative to it.
    pub fn today(&self) -> chrono::NaiveDate {
        Local::now().date_naive()
    }
}
