//! Client-side data store and display helpers.
//!
//! `Store` holds the full set of departments, tasks and members as last read
//! from the backend. It is only ever replaced wholesale by a full fetch; the
//! helpers below format and parse the fields shown in both front ends.

use chrono::{Datelike, Duration, Local, NaiveDate};
use tracing::{debug, warn};

use crate::department::{self, Department};
use crate::error::Error;
use crate::fields::*;
use crate::member::Member;
use crate::task::Task;

/// Result of one full read of the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub departments: Vec<Department>,
    pub tasks: Vec<Task>,
    pub members: Vec<Member>,
}

/// What happened to a fetch result handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    Failed,
    /// A newer fetch was already applied; the result was dropped.
    Stale,
}

/// In-memory cache of the backend, the single source of truth for rendering.
#[derive(Debug, Default)]
pub struct Store {
    pub departments: Vec<Department>,
    pub tasks: Vec<Task>,
    pub members: Vec<Member>,
    pub loading: bool,
    pub error: Option<String>,
    in_flight: usize,
    applied_seq: u64,
    loaded: bool,
}

impl Store {
    /// Record that fetch `seq` has been issued.
    pub fn fetch_started(&mut self, seq: u64) {
        self.in_flight += 1;
        self.loading = true;
        debug!(seq, in_flight = self.in_flight, "fetch started");
    }

    /// Apply the result of fetch `seq`.
    ///
    /// Results older than the newest applied one are discarded, so the most
    /// recently issued fetch decides the final state regardless of the order
    /// in which responses arrive. A failure keeps the loaded collections.
    pub fn apply_fetch(&mut self, seq: u64, result: Result<Snapshot, Error>) -> FetchOutcome {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.loading = self.in_flight > 0;

        if seq <= self.applied_seq {
            debug!(seq, applied = self.applied_seq, "dropping stale fetch result");
            return FetchOutcome::Stale;
        }
        self.applied_seq = seq;

        match result {
            Ok(snapshot) => {
                self.replace(snapshot);
                self.error = None;
                self.loaded = true;
                FetchOutcome::Applied
            }
            Err(e) => {
                warn!(seq, error = %e, "full fetch failed");
                self.error = Some(format!(
                    "Could not connect to the database. Check FLOWDESK_URL and FLOWDESK_KEY. ({e})"
                ));
                FetchOutcome::Failed
            }
        }
    }

    fn replace(&mut self, snapshot: Snapshot) {
        let Snapshot { departments, tasks, members } = snapshot;
        self.departments = departments;
        self.tasks = tasks;
        self.members = members;
    }

    /// True once any fetch has succeeded.
    pub fn has_loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self, id: &Id) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn department(&self, id: &Id) -> Option<&Department> {
        department::find(&self.departments, id)
    }

    pub fn dept_name(&self, id: Option<&Id>) -> String {
        department::display_name_opt(&self.departments, id)
    }

    pub fn dept_color(&self, id: Option<&Id>) -> &str {
        department::color_of(&self.departments, id)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            departments: self.departments.clone(),
            tasks: self.tasks.clone(),
            members: self.members.clone(),
        }
    }
}

/// Split a comma-separated tag input: trimmed, empties dropped, first occurrence kept.
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for part in input.split(',') {
        let tag = part.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Render tags back into the editable comma-separated form.
pub fn format_tags(tags: &[String]) -> String {
    tags.join(", ")
}

/// Parse human-readable due date input.
///
/// Supports:
/// - "today", "tomorrow", "yesterday"
/// - "monday", "next monday", "this friday", ...
/// - "end of week", "end of month", "this weekend"
/// - "in 3d", "in 2w", "in 1m"
/// - "YYYY-MM-DD" format
pub fn parse_due_input(s: &str) -> Option<NaiveDate> {
    parse_due_input_from(s, Local::now().date_naive())
}

pub fn parse_due_input_from(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        "end of week" | "eow" => return Some(start_end_of_this_week(today).1),
        "end of month" | "eom" => {
            let (year, month) = if today.month() == 12 {
                (today.year() + 1, 1)
            } else {
                (today.year(), today.month() + 1)
            };
            let first_of_next = NaiveDate::from_ymd_opt(year, month, 1)?;
            return Some(first_of_next - Duration::days(1));
        }
        "this weekend" | "weekend" => {
            let days_until_saturday = (5 + 7 - today.weekday().num_days_from_monday()) % 7;
            return Some(today + Duration::days(days_until_saturday as i64));
        }
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        let rest = rest.trim();
        let (at, unit) = rest.char_indices().last()?;
        let n = rest[..at].trim().parse::<i64>().ok()?;
        let offset = match unit {
            'd' => Duration::try_days(n),
            'w' => Duration::try_weeks(n),
            // Approximate: 30 days per month
            'm' => n.checked_mul(30).and_then(Duration::try_days),
            _ => None,
        }?;
        return today.checked_add_signed(offset);
    }

    let weekdays = [
        ("monday", 0), ("tuesday", 1), ("wednesday", 2), ("thursday", 3),
        ("friday", 4), ("saturday", 5), ("sunday", 6),
        ("mon", 0), ("tue", 1), ("wed", 2), ("thu", 3),
        ("fri", 4), ("sat", 5), ("sun", 6),
    ];
    let current = today.weekday().num_days_from_monday() as i64;
    for (name, target) in weekdays {
        let days_ahead = (target + 7 - current) % 7;
        if s == name || s == format!("this {}", name) {
            return Some(today + Duration::days(days_ahead));
        }
        if s == format!("next {}", name) {
            let days = if days_ahead == 0 { 7 } else { days_ahead + 7 };
            return Some(today + Duration::days(days));
        }
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Start and end of the ISO week (Monday to Sunday) containing `today`.
pub fn start_end_of_this_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let weekday = today.weekday().num_days_from_monday() as i64;
    let start = today - Duration::days(weekday);
    (start, start + Duration::days(6))
}

/// Format a due date relative to today ("today", "tomorrow", "in 3d", "2d late").
pub fn format_due_relative(due: Option<NaiveDate>, today: NaiveDate) -> String {
    match due {
        None => "-".into(),
        Some(d) => {
            let days = (d - today).num_days();
            match days {
                0 => "today".into(),
                1 => "tomorrow".into(),
                n if n > 1 => format!("in {}d", n),
                n => format!("{}d late", -n),
            }
        }
    }
}

pub fn format_status(s: Status) -> &'static str {
    match s {
        Status::NotStarted => "Not Started",
        Status::InProgress => "In Progress",
        Status::Review => "Review",
        Status::Completed => "Completed",
        Status::Blocked => "Blocked",
    }
}

pub fn format_priority(p: Priority) -> &'static str {
    match p {
        Priority::Critical => "Critical",
        Priority::High => "High",
        Priority::Medium => "Medium",
        Priority::Low => "Low",
    }
}

pub fn format_recurrence(r: Recurrence) -> &'static str {
    match r {
        Recurrence::None => "None",
        Recurrence::Daily => "Daily",
        Recurrence::Weekly => "Weekly",
        Recurrence::BiWeekly => "Bi-Weekly",
        Recurrence::Monthly => "Monthly",
        Recurrence::Quarterly => "Quarterly",
        Recurrence::Yearly => "Yearly",
    }
}

/// Truncate a string to a maximum width, adding an ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Print tasks as a plain-text table.
pub fn print_table(tasks: &[&Task], store: &Store) {
    println!(
        "{:<10} {:<12} {:<9} {:<10} {:<24} {:<16} {}",
        "ID", "Status", "Priority", "Due", "Department", "Assignee", "Title [tags]"
    );
    let today = Local::now().date_naive();
    for t in tasks {
        let tags = if t.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", t.tags.join(","))
        };
        let (done, total) = t.subtask_progress();
        let subtasks = if total > 0 {
            format!(" ✓ {}/{}", done, total)
        } else {
            String::new()
        };
        println!(
            "{:<10} {:<12} {:<9} {:<10} {:<24} {:<16} {}{}{}",
            truncate(t.id.as_str(), 10),
            format_status(t.status),
            format_priority(t.priority),
            format_due_relative(t.due_date, today),
            truncate(&store.dept_name(t.dept_id.as_ref()), 24),
            truncate(t.assignee.as_deref().unwrap_or("-"), 16),
            t.title,
            tags,
            subtasks
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::department::tests::dept;
    use crate::task::Subtask;

    pub(crate) fn task(id: &str, title: &str) -> Task {
        Task {
            id: Id::new(id),
            title: title.to_string(),
            description: None,
            dept_id: None,
            status: Status::NotStarted,
            priority: Priority::Medium,
            assignee: None,
            due_date: None,
            recurrence: Recurrence::None,
            tags: Vec::new(),
            created_at: None,
            updated_at: None,
            subtasks: Vec::new(),
            comments: Vec::new(),
        }
    }

    pub(crate) fn snapshot() -> Snapshot {
        let mut t1 = task("t1", "Write spec");
        t1.dept_id = Some(Id::new("2"));
        t1.subtasks.push(Subtask {
            id: Id::new("s1"),
            task_id: Some(Id::new("t1")),
            title: "Outline".into(),
            done: false,
        });
        Snapshot {
            departments: vec![dept("1", "Engineering", None), dept("2", "Backend", Some("1"))],
            tasks: vec![t1, task("t2", "Hire designer")],
            members: vec![Member { id: Id::new("m1"), name: "Ada Lovelace".into() }],
        }
    }

    #[test]
    fn test_tag_round_trip() {
        let tags = parse_tags("design, urgent,  review");
        assert_eq!(tags, vec!["design", "urgent", "review"]);
        assert_eq!(format_tags(&tags), "design, urgent, review");
    }

    #[test]
    fn test_parse_tags_drops_empties_and_repeats() {
        assert_eq!(parse_tags(" , a,,b , a ,"), vec!["a", "b"]);
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn test_fetch_is_idempotent() {
        let mut store = Store::default();
        store.fetch_started(1);
        store.apply_fetch(1, Ok(snapshot()));
        let first = store.snapshot();
        store.fetch_started(2);
        store.apply_fetch(2, Ok(snapshot()));
        assert_eq!(store.snapshot(), first);
        assert!(!store.loading);
        assert!(store.error.is_none());
    }

    #[test]
    fn test_failure_keeps_data_and_sets_error() {
        let mut store = Store::default();
        store.fetch_started(1);
        assert!(store.loading);
        store.apply_fetch(1, Ok(snapshot()));
        store.fetch_started(2);
        let outcome = store.apply_fetch(2, Err(Error::Connection("HTTP 503".into())));
        assert_eq!(outcome, FetchOutcome::Failed);
        assert_eq!(store.tasks.len(), 2);
        assert!(store.error.as_deref().unwrap().contains("Could not connect"));

        store.fetch_started(3);
        store.apply_fetch(3, Ok(snapshot()));
        assert!(store.error.is_none());
    }

    #[test]
    fn test_newest_issued_fetch_wins() {
        let mut store = Store::default();
        store.fetch_started(1);
        store.fetch_started(2);

        let mut newer = snapshot();
        newer.tasks.truncate(1);
        assert_eq!(store.apply_fetch(2, Ok(newer)), FetchOutcome::Applied);
        assert!(store.loading, "fetch 1 is still in flight");

        assert_eq!(store.apply_fetch(1, Ok(snapshot())), FetchOutcome::Stale);
        assert_eq!(store.tasks.len(), 1);
        assert!(!store.loading);
    }

    #[test]
    fn test_store_lookups() {
        let mut store = Store::default();
        store.fetch_started(1);
        store.apply_fetch(1, Ok(snapshot()));
        let t1 = store.get(&Id::new("t1")).unwrap();
        assert_eq!(store.dept_name(t1.dept_id.as_ref()), "Engineering › Backend");
        assert_eq!(store.dept_name(None), "Unknown");
        assert!(store.has_loaded());
    }

    #[test]
    fn test_parse_due_input() {
        // 2024-05-15 is a Wednesday
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
        assert_eq!(parse_due_input_from("today", today), d(2024, 5, 15));
        assert_eq!(parse_due_input_from("tomorrow", today), d(2024, 5, 16));
        assert_eq!(parse_due_input_from("in 3d", today), d(2024, 5, 18));
        assert_eq!(parse_due_input_from("in 2w", today), d(2024, 5, 29));
        assert_eq!(parse_due_input_from("friday", today), d(2024, 5, 17));
        assert_eq!(parse_due_input_from("next wednesday", today), d(2024, 5, 22));
        assert_eq!(parse_due_input_from("weekend", today), d(2024, 5, 18));
        assert_eq!(parse_due_input_from("eom", today), d(2024, 5, 31));
        assert_eq!(parse_due_input_from("eow", today), d(2024, 5, 19));
        assert_eq!(parse_due_input_from("2024-12-01", today), d(2024, 12, 1));
        assert_eq!(parse_due_input_from("someday", today), None);
        assert_eq!(parse_due_input_from("in 1m", today), d(2024, 6, 14));
    }

    #[test]
    fn test_parse_due_input_rejects_bad_offsets() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        assert_eq!(parse_due_input_from("in 3é", today), None);
        assert_eq!(parse_due_input_from("in 999999999d", today), None);
        assert_eq!(parse_due_input_from("in 999999999999999999m", today), None);
        assert_eq!(parse_due_input_from("in d", today), None);
        assert_eq!(parse_due_input_from("in ", today), None);
    }

    #[test]
    fn test_format_due_relative() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        assert_eq!(format_due_relative(None, today), "-");
        assert_eq!(format_due_relative(Some(today), today), "today");
        assert_eq!(format_due_relative(today.succ_opt(), today), "tomorrow");
        assert_eq!(format_due_relative(Some(today + Duration::days(4)), today), "in 4d");
        assert_eq!(format_due_relative(Some(today - Duration::days(2)), today), "2d late");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Engineering", 20), "Engineering");
        assert_eq!(truncate("Engineering", 6), "Engin…");
    }
}
