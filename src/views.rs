//! Derived views over the store: filtering, progress, board and timeline.
//!
//! Everything here is a pure function of the loaded data and the filter
//! state, recomputed on every frame.

use chrono::NaiveDate;

use crate::fields::{Id, Priority, Status};
use crate::task::Task;

/// Horizontal extent of the timeline track, in percent.
pub const TIMELINE_WIDTH: f64 = 90.0;
/// Minimum span of the timeline, in days.
pub const TIMELINE_MIN_SPAN: i64 = 7;

/// Current dashboard filter. `None` fields mean "All".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub dept: Option<Id>,
    pub search: String,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        let dept_ok = self.dept.is_none() || task.dept_id == self.dept;

        let needle = self.search.to_lowercase();
        let search_ok = needle.is_empty()
            || task.title.to_lowercase().contains(&needle)
            || task
                .assignee
                .as_deref()
                .unwrap_or("")
                .to_lowercase()
                .contains(&needle);

        let status_ok = self.status.map_or(true, |s| task.status == s);
        let priority_ok = self.priority.map_or(true, |p| task.priority == p);

        dept_ok && search_ok && status_ok && priority_ok
    }

    /// True when no filter narrows the task list.
    pub fn is_empty(&self) -> bool {
        self.dept.is_none() && self.search.is_empty() && self.status.is_none() && self.priority.is_none()
    }
}

pub fn filtered_tasks<'a>(tasks: &'a [Task], filter: &TaskFilter) -> Vec<&'a Task> {
    tasks.iter().filter(|t| filter.matches(t)).collect()
}

/// Tasks in the selected scope, ignoring search/status/priority.
pub fn scoped_tasks<'a>(tasks: &'a [Task], dept: Option<&Id>) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|t| dept.is_none() || t.dept_id.as_ref() == dept)
        .collect()
}

/// Completed count, total and rounded completion percentage (0 when empty).
pub fn progress(tasks: &[&Task]) -> (usize, usize, u8) {
    let total = tasks.len();
    let done = tasks.iter().filter(|t| t.status == Status::Completed).count();
    if total == 0 {
        return (0, 0, 0);
    }
    let pct = (100.0 * done as f64 / total as f64).round() as u8;
    (done, total, pct)
}

/// One column per status, in workflow order.
pub fn board_columns<'a>(tasks: &[&'a Task]) -> Vec<(Status, Vec<&'a Task>)> {
    Status::ALL
        .iter()
        .map(|&status| {
            let column = tasks.iter().copied().filter(|t| t.status == status).collect();
            (status, column)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineRow<'a> {
    pub task: &'a Task,
    pub due: NaiveDate,
    /// Offset from the start of the track, 0 to `TIMELINE_WIDTH` percent.
    pub position: f64,
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineLayout<'a> {
    pub rows: Vec<TimelineRow<'a>>,
    pub undated: usize,
    pub span_days: i64,
}

/// Lay out dated tasks on a track scaled to their date range.
pub fn timeline_layout<'a>(tasks: &[&'a Task], today: NaiveDate) -> TimelineLayout<'a> {
    let mut dated: Vec<(&Task, NaiveDate)> = tasks
        .iter()
        .filter_map(|t| t.due_date.map(|d| (*t, d)))
        .collect();
    let undated = tasks.len() - dated.len();
    dated.sort_by_key(|(_, d)| *d);

    let (Some(first), Some(last)) = (dated.first(), dated.last()) else {
        return TimelineLayout { rows: Vec::new(), undated, span_days: TIMELINE_MIN_SPAN };
    };
    let earliest = first.1;
    let span_days = (last.1 - earliest).num_days().max(TIMELINE_MIN_SPAN);

    let rows = dated
        .into_iter()
        .map(|(task, due)| {
            let offset = (due - earliest).num_days() as f64;
            TimelineRow {
                task,
                due,
                position: offset / span_days as f64 * TIMELINE_WIDTH,
                overdue: due < today && task.status != Status::Completed,
            }
        })
        .collect();

    TimelineLayout { rows, undated, span_days }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::task;

    fn sample() -> Vec<Task> {
        let mut a = task("a", "Design landing page");
        a.dept_id = Some(Id::new("1"));
        a.status = Status::Completed;
        a.priority = Priority::High;
        a.assignee = Some("Ada Lovelace".into());

        let mut b = task("b", "Fix login bug");
        b.dept_id = Some(Id::new("1"));
        b.status = Status::InProgress;
        b.priority = Priority::Critical;

        let mut c = task("c", "Quarterly report");
        c.dept_id = Some(Id::new("2"));
        c.priority = Priority::High;
        c.assignee = Some("Grace Hopper".into());

        vec![a, b, c]
    }

    fn ids(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.id.to_string()).collect()
    }

    #[test]
    fn test_filter_is_conjunction() {
        let tasks = sample();
        let all = TaskFilter::default();
        assert_eq!(filtered_tasks(&tasks, &all).len(), 3);
        assert!(all.is_empty());
        assert!(!TaskFilter { search: "x".into(), ..Default::default() }.is_empty());

        let by_dept = TaskFilter { dept: Some(Id::new("1")), ..Default::default() };
        assert_eq!(ids(&filtered_tasks(&tasks, &by_dept)), vec!["a", "b"]);

        let narrowed = TaskFilter { priority: Some(Priority::High), ..by_dept.clone() };
        assert_eq!(ids(&filtered_tasks(&tasks, &narrowed)), vec!["a"]);

        let none = TaskFilter { status: Some(Status::Blocked), ..narrowed };
        assert!(filtered_tasks(&tasks, &none).is_empty());
    }

    #[test]
    fn test_search_covers_title_and_assignee() {
        let tasks = sample();
        let by_title = TaskFilter { search: "LOGIN".into(), ..Default::default() };
        assert_eq!(ids(&filtered_tasks(&tasks, &by_title)), vec!["b"]);
        let by_assignee = TaskFilter { search: "hopper".into(), ..Default::default() };
        assert_eq!(ids(&filtered_tasks(&tasks, &by_assignee)), vec!["c"]);
    }

    #[test]
    fn test_progress_rounds_and_handles_empty() {
        let tasks = sample();
        assert_eq!(progress(&scoped_tasks(&tasks, None)), (1, 3, 33));
        assert_eq!(progress(&scoped_tasks(&tasks, Some(&Id::new("1")))), (1, 2, 50));
        assert_eq!(progress(&scoped_tasks(&tasks, Some(&Id::new("9")))), (0, 0, 0));

        let mut two_of_three = sample();
        two_of_three[1].status = Status::Completed;
        assert_eq!(progress(&scoped_tasks(&two_of_three, None)).2, 67);
    }

    #[test]
    fn test_board_has_a_column_per_status() {
        let tasks = sample();
        let refs: Vec<&Task> = tasks.iter().collect();
        let columns = board_columns(&refs);
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[0].0, Status::NotStarted);
        assert_eq!(ids(&columns[0].1), vec!["c"]);
        assert_eq!(ids(&columns[3].1), vec!["a"]);
        assert!(columns[4].1.is_empty());
    }

    #[test]
    fn test_timeline_positions() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut tasks = sample();
        tasks[0].due_date = Some(start + chrono::Duration::days(10));
        tasks[1].due_date = Some(start);
        tasks[2].due_date = Some(start + chrono::Duration::days(3));
        tasks.push(task("d", "Someday"));
        let refs: Vec<&Task> = tasks.iter().collect();

        let layout = timeline_layout(&refs, start + chrono::Duration::days(5));
        assert_eq!(layout.undated, 1);
        assert_eq!(layout.span_days, 10);
        let order: Vec<&str> = layout.rows.iter().map(|r| r.task.id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(layout.rows[0].position, 0.0);
        assert!((layout.rows[1].position - 27.0).abs() < 1e-9);
        assert_eq!(layout.rows[2].position, 90.0);

        // b is in progress and past due; a is completed
        assert!(layout.rows[0].overdue);
        assert!(layout.rows[1].overdue);
        assert!(!layout.rows[2].overdue);
    }

    #[test]
    fn test_timeline_uses_minimum_span() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut tasks = sample();
        tasks[0].due_date = Some(start);
        tasks[1].due_date = Some(start + chrono::Duration::days(2));
        let refs: Vec<&Task> = tasks.iter().take(2).collect();

        let layout = timeline_layout(&refs, start);
        assert_eq!(layout.span_days, 7);
        assert!((layout.rows[1].position - 2.0 / 7.0 * 90.0).abs() < 1e-9);

        assert!(timeline_layout(&[], start).rows.is_empty());
    }
}
