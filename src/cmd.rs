//! Command implementations for the CLI interface.
//!
//! Every command except `ui` and `completions` performs one full fetch,
//! prints or writes, and exits. Failures propagate to `main`, which reports
//! them and exits non-zero.

use std::sync::Arc;

use chrono::Local;
use clap::Subcommand;
use clap_complete::{generate, Shell};
use tracing::info;

use crate::backend::{Backend, Table, WriteOp};
use crate::crud::{Dashboard, TaskDraft};
use crate::db::*;
use crate::department::{self, resolve_department};
use crate::error::{Error, Result};
use crate::fields::*;
use crate::task::Task;
use crate::tui::run::run_tui;
use crate::tui::utils::percent_offset;
use crate::views::{filtered_tasks, progress, scoped_tasks, timeline_layout, TaskFilter};

/// Columns used for the timeline track when printing.
const TIMELINE_COLUMNS: u16 = 60;

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the interactive dashboard (default).
    Ui,

    /// List tasks with optional filters.
    List {
        /// Department id or name. Sub-departments are not included.
        #[arg(long)]
        dept: Option<String>,
        /// Case-insensitive match on title or assignee.
        #[arg(long)]
        search: Option<String>,
        /// Filter by status.
        #[arg(long, value_enum)]
        status: Option<Status>,
        /// Filter by priority.
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Show dated tasks on a timeline instead of a table.
        #[arg(long)]
        timeline: bool,
    },

    /// Show the department tree with completion progress.
    Depts,

    /// List team members.
    Members,

    /// Add a new task.
    Add {
        /// Short title for the task.
        title: String,
        /// Optional longer description.
        #[arg(long)]
        desc: Option<String>,
        /// Department id or name.
        #[arg(long)]
        dept: Option<String>,
        #[arg(long, value_enum, default_value_t = Status::NotStarted)]
        status: Status,
        #[arg(long, value_enum, default_value_t = Priority::Medium)]
        priority: Priority,
        /// Free-text assignee.
        #[arg(long)]
        assignee: Option<String>,
        /// Due date: YYYY-MM-DD, "today", "tomorrow", "in Nd", "next fri", ...
        #[arg(long)]
        due: Option<String>,
        #[arg(long, value_enum, default_value_t = Recurrence::None)]
        recurrence: Recurrence,
        /// Comma-separated tags. May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Set the status of a task.
    Status {
        /// Task id.
        id: String,
        #[arg(value_enum)]
        status: Status,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// One full fetch into a fresh store.
async fn load(backend: &dyn Backend) -> Result<Store> {
    let snapshot = backend.fetch_all().await?;
    let mut store = Store::default();
    store.fetch_started(1);
    store.apply_fetch(1, Ok(snapshot));
    Ok(store)
}

/// Launch the terminal user interface.
pub fn cmd_ui(backend: Arc<dyn Backend>) -> Result<()> {
    run_tui(backend)?;
    Ok(())
}

/// Tasks matching the given CLI filters, in backend order.
fn list_tasks<'a>(
    store: &'a Store,
    dept: Option<&str>,
    search: Option<String>,
    status: Option<Status>,
    priority: Option<Priority>,
) -> Result<Vec<&'a Task>> {
    let dept = dept
        .map(|d| resolve_department(d, &store.departments))
        .transpose()?;
    let filter = TaskFilter {
        dept,
        search: search.unwrap_or_default(),
        status,
        priority,
    };
    Ok(filtered_tasks(&store.tasks, &filter))
}

/// List tasks as a table or a timeline.
pub async fn cmd_list(
    backend: &dyn Backend,
    dept: Option<String>,
    search: Option<String>,
    status: Option<Status>,
    priority: Option<Priority>,
    timeline: bool,
) -> Result<()> {
    let store = load(backend).await?;
    let tasks = list_tasks(&store, dept.as_deref(), search, status, priority)?;
    if tasks.is_empty() {
        println!("No tasks match.");
        return Ok(());
    }
    if timeline {
        for line in timeline_lines(&tasks, &store) {
            println!("{}", line);
        }
    } else {
        print_table(&tasks, &store);
    }
    Ok(())
}

fn timeline_lines(tasks: &[&Task], store: &Store) -> Vec<String> {
    let layout = timeline_layout(tasks, Local::now().date_naive());
    let mut lines = Vec::new();
    if layout.rows.is_empty() {
        lines.push("No tasks with due dates".to_string());
    } else {
        lines.push(format!("Timeline ({} day span)", layout.span_days));
    }
    for row in &layout.rows {
        let offset = percent_offset(row.position, TIMELINE_COLUMNS) as usize;
        let marker = if row.overdue { "!" } else { "■" };
        lines.push(format!(
            "{}  {}{} {}  ({})",
            row.due,
            " ".repeat(offset),
            marker,
            row.task.title,
            store.dept_name(row.task.dept_id.as_ref())
        ));
    }
    if layout.undated > 0 {
        lines.push(format!("{} task(s) without a due date", layout.undated));
    }
    lines
}

fn dept_line(store: &Store, dept: &department::Department, indent: &str) -> String {
    let tasks = scoped_tasks(&store.tasks, Some(&dept.id));
    let (done, total, pct) = progress(&tasks);
    format!(
        "{:<8} {}{} {:<28} {:>3}/{:<3} {:>3}%  {}",
        truncate(dept.id.as_str(), 8),
        indent,
        dept.icon(),
        truncate(&dept.name, 28),
        done,
        total,
        pct,
        dept.color
    )
}

fn dept_tree_lines(store: &Store) -> Vec<String> {
    let depts = &store.departments;
    let mut lines = Vec::new();
    for top in department::top_level(depts) {
        lines.push(dept_line(store, top, ""));
        for sub in department::children(depts, &top.id) {
            lines.push(dept_line(store, sub, "  └ "));
        }
    }
    let all: Vec<&Task> = store.tasks.iter().collect();
    let (done, total, pct) = progress(&all);
    lines.push(format!("All tasks: {}/{} completed ({}%)", done, total, pct));
    lines
}

/// Print the department tree.
pub async fn cmd_depts(backend: &dyn Backend) -> Result<()> {
    let store = load(backend).await?;
    if store.departments.is_empty() {
        println!("No departments yet.");
    }
    for line in dept_tree_lines(&store) {
        println!("{}", line);
    }
    Ok(())
}

/// Print team members.
pub async fn cmd_members(backend: &dyn Backend) -> Result<()> {
    let store = load(backend).await?;
    if store.members.is_empty() {
        println!("No members yet.");
        return Ok(());
    }
    println!("{:<10} {:<4} {}", "ID", "", "Name");
    for m in &store.members {
        println!(
            "{:<10} {:<4} {}",
            truncate(m.id.as_str(), 10),
            crate::member::initials(&m.name),
            m.name
        );
    }
    Ok(())
}

/// Build the insert for a new task, validating it the way the form does.
#[allow(clippy::too_many_arguments)]
fn add_op(
    store: &Store,
    title: String,
    desc: Option<String>,
    dept: Option<String>,
    status: Status,
    priority: Priority,
    assignee: Option<String>,
    due: Option<String>,
    recurrence: Recurrence,
    tags: Vec<String>,
) -> Result<WriteOp> {
    let dept_id = dept
        .map(|d| resolve_department(&d, &store.departments))
        .transpose()?;
    let draft = TaskDraft {
        title,
        description: desc.unwrap_or_default(),
        dept_id,
        status,
        priority,
        assignee: assignee.unwrap_or_default(),
        due_date: due.unwrap_or_default(),
        recurrence,
        tags: tags.join(","),
    };
    Ok(WriteOp::Insert {
        table: Table::Tasks,
        payload: draft.payload()?,
    })
}

/// Add a new task.
#[allow(clippy::too_many_arguments)]
pub async fn cmd_add(
    backend: &dyn Backend,
    title: String,
    desc: Option<String>,
    dept: Option<String>,
    status: Status,
    priority: Priority,
    assignee: Option<String>,
    due: Option<String>,
    recurrence: Recurrence,
    tags: Vec<String>,
) -> Result<()> {
    let store = load(backend).await?;
    let op = add_op(&store, title, desc, dept, status, priority, assignee, due, recurrence, tags)?;
    backend.apply(&op).await?;
    info!(op = %op.describe(), "task added");
    println!("Added task");
    Ok(())
}

/// Set the status of a task.
pub async fn cmd_status(backend: &dyn Backend, id: String, status: Status) -> Result<()> {
    let mut dash = Dashboard {
        store: load(backend).await?,
        ..Dashboard::default()
    };
    let id = Id::new(id);
    let title = dash
        .store
        .get(&id)
        .map(|t| t.title.clone())
        .ok_or_else(|| Error::NotFound(format!("No task found with id '{}'", id)))?;
    let op = dash.update_task_status(&id, status);
    backend.apply(&op).await?;
    println!("{} → {}", title, format_status(status));
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use crate::cli::Cli;
    use clap::CommandFactory;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::db::tests::{snapshot, task};
    use crate::sync::tests::FakeBackend;

    fn fake() -> FakeBackend {
        let fake = FakeBackend::default();
        *fake.snapshot.lock().unwrap() = snapshot();
        fake
    }

    fn store() -> Store {
        let mut store = Store::default();
        store.apply_fetch(1, Ok(snapshot()));
        store
    }

    #[test]
    fn test_list_filters_by_department_name() {
        let store = store();
        let tasks = list_tasks(&store, Some("engineering › backend"), None, None, None).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, Id::new("t1"));

        let tasks = list_tasks(&store, None, Some("HIRE".into()), None, None).unwrap();
        assert_eq!(tasks[0].id, Id::new("t2"));

        let err = list_tasks(&store, Some("Sales"), None, None, None).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_dept_tree_shows_children_indented() {
        let lines = dept_tree_lines(&store());
        assert!(lines[0].contains("Engineering"));
        assert!(lines[1].contains("└ ") && lines[1].contains("Backend"));
        assert!(lines.last().unwrap().starts_with("All tasks: 0/2"));
    }

    #[test]
    fn test_timeline_lists_undated_count() {
        let store = store();
        let mut dated = task("t9", "Launch");
        dated.due_date = Some(Local::now().date_naive());
        let undated = task("t10", "Someday");
        let lines = timeline_lines(&[&dated, &undated], &store);
        assert!(lines[1].contains("Launch"));
        assert_eq!(lines.last().unwrap(), "1 task(s) without a due date");
    }

    #[tokio::test]
    async fn test_add_resolves_department_and_writes() {
        let fake = fake();
        cmd_add(
            &fake,
            "  Ship it ".into(),
            None,
            Some("Backend".into()),
            Status::Review,
            Priority::High,
            Some("Ada Lovelace".into()),
            Some("2030-01-02".into()),
            Recurrence::Weekly,
            vec!["a,b".into(), "b".into()],
        )
        .await
        .unwrap();

        let writes = fake.writes.lock().unwrap();
        match &writes[0] {
            WriteOp::Insert { table, payload } => {
                assert_eq!(*table, Table::Tasks);
                assert_eq!(payload["title"], "Ship it");
                assert_eq!(payload["dept_id"], "2");
                assert_eq!(payload["status"], "Review");
                assert_eq!(payload["due_date"], "2030-01-02");
                assert_eq!(payload["tags"], serde_json::json!(["a", "b"]));
            }
            other => panic!("unexpected write: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_rejects_blank_title_without_writing() {
        let fake = fake();
        let err = cmd_add(
            &fake,
            "   ".into(),
            None,
            None,
            Status::NotStarted,
            Priority::Medium,
            None,
            None,
            Recurrence::None,
            vec![],
        )
        .await
        .unwrap_err();
        assert!(err.is_validation());
        assert!(fake.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_updates_known_task_only() {
        let fake = fake();
        cmd_status(&fake, "t2".into(), Status::Completed).await.unwrap();
        assert_eq!(
            fake.writes.lock().unwrap()[0],
            WriteOp::Update {
                table: Table::Tasks,
                id: Id::new("t2"),
                payload: serde_json::json!({ "status": "Completed" }),
            }
        );

        let err = cmd_status(&fake, "nope".into(), Status::Completed).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(fake.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_a_connection_error() {
        let fake = fake();
        fake.fail_fetch.store(true, Ordering::SeqCst);
        let err = cmd_members(&fake).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
