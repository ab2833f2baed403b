//! Main application logic for the terminal user interface.
//!
//! This module contains the `App` struct which owns the dashboard state,
//! drains background sync results, handles user input, renders the
//! interface, and coordinates between screens (dashboard, detail panel,
//! forms, dialogs).

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend as TerminalBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, TableState, Tabs, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::debug;

use crate::{
    backend::{Backend, WriteOp},
    crud::Dashboard,
    db::{format_due_relative, format_priority, format_recurrence, format_status, FetchOutcome},
    department,
    fields::*,
    member::{avatar_hue, initials},
    sync::{SyncEvent, Synchronizer},
    task::Task,
    tui::{
        colors::{avatar_color, hex, priority_color, status_color, ACCENT, DARK_RED, MUTED, OVERDUE},
        dept_form::{DeptForm, COLOR_GLOBAL_ORDER, ICON_GLOBAL_ORDER, NAME_GLOBAL_ORDER},
        enums::{AppState, ConfirmAction, DetailTab, Focus, InputMode, ViewMode},
        input::InputField,
        task_form::{
            TaskForm, ASSIGNEE_SELECTOR_GLOBAL_ORDER, DEPT_SELECTOR_GLOBAL_ORDER,
            DESCRIPTION_GLOBAL_ORDER, DUE_GLOBAL_ORDER, PRIORITY_GLOBAL_ORDER,
            RECURRENCE_GLOBAL_ORDER, STATUS_GLOBAL_ORDER, TAGS_GLOBAL_ORDER, TITLE_GLOBAL_ORDER,
        },
        task_views::{self, ViewContext},
        utils::centered_rect,
    },
    views::{filtered_tasks, progress, scoped_tasks, TaskFilter},
};

/// Members shown in the sidebar before "+N more".
const SIDEBAR_MEMBERS: usize = 8;

fn cycle_filter<T: Copy + PartialEq>(current: Option<T>, all: &[T]) -> Option<T> {
    match current {
        None => all.first().copied(),
        Some(value) => {
            let at = all.iter().position(|v| *v == value).unwrap_or(all.len());
            all.get(at + 1).copied()
        }
    }
}

fn step_status(status: Status, forward: bool) -> Status {
    let len = Status::ALL.len();
    let at = Status::ALL.iter().position(|&s| s == status).unwrap_or(0);
    let next = if forward { (at + 1) % len } else { (at + len - 1) % len };
    Status::ALL[next]
}

/// Main application state for the terminal user interface.
pub struct App {
    state: AppState,
    dash: Dashboard,
    sync: Synchronizer,
    events: UnboundedReceiver<SyncEvent>,
    view: ViewMode,
    focus: Focus,
    task_table: TableState,
    filtered: Vec<Id>,
    sidebar_index: usize,
    task_form: TaskForm,
    form_return: AppState,
    dept_form: DeptForm,
    member_input: InputField,
    member_index: usize,
    detail_tab: DetailTab,
    detail_input: InputField,
    subtask_index: usize,
    input_mode: InputMode,
    search_active: bool,
    status_message: String,
    confirm_action: Option<ConfirmAction>,
    confirm_return: AppState,
}

impl App {
    /// Create the app and start syncing with `backend`. Must run inside a tokio runtime.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let mut sync = Synchronizer::new(backend, tx);
        sync.start();

        let dash = Dashboard::default();
        App {
            state: AppState::Dashboard,
            task_form: TaskForm::from_draft(&dash.task_draft, &[], &[]),
            dept_form: DeptForm::from_draft(&dash.dept_draft),
            dash,
            sync,
            events,
            view: ViewMode::default(),
            focus: Focus::Tasks,
            task_table: TableState::default(),
            filtered: Vec::new(),
            sidebar_index: 0,
            form_return: AppState::Dashboard,
            member_input: InputField::new(),
            member_index: 0,
            detail_tab: DetailTab::default(),
            detail_input: InputField::new(),
            subtask_index: 0,
            input_mode: InputMode::None,
            search_active: false,
            status_message: String::new(),
            confirm_action: None,
            confirm_return: AppState::Dashboard,
        }
    }

    fn set_status_message(&mut self, msg: String) {
        self.status_message = msg;
    }

    fn clear_status_message(&mut self) {
        self.status_message.clear();
    }

    /// Apply every sync result that has arrived since the last frame.
    fn drain_sync_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SyncEvent::FetchStarted { seq } => self.dash.store.fetch_started(seq),
                SyncEvent::Fetched { seq, result } => {
                    if self.dash.apply_fetch(seq, result) == FetchOutcome::Applied {
                        self.update_filtered_tasks();
                        if self.state == AppState::TaskDetail && self.dash.detail.is_none() {
                            self.state = AppState::Dashboard;
                            self.set_status_message("The open task was deleted".to_string());
                        }
                    }
                }
                SyncEvent::Written { op, result } => {
                    if let Err(e) = result {
                        debug!(op = %op.describe(), "reporting failed write");
                        self.set_status_message(format!("Error: {}", e));
                    }
                }
            }
        }
    }

    fn submit(&mut self, op: WriteOp, message: &str) {
        self.sync.submit(op);
        self.set_status_message(message.to_string());
    }

    /// Recompute the filtered task list, keeping the selection where possible.
    fn update_filtered_tasks(&mut self) {
        let old_selected = self.selected_task_id();
        self.filtered = filtered_tasks(&self.dash.store.tasks, &self.dash.filter)
            .into_iter()
            .map(|t| t.id.clone())
            .collect();

        let index = old_selected
            .and_then(|id| self.filtered.iter().position(|t| *t == id))
            .or_else(|| (!self.filtered.is_empty()).then_some(0));
        self.task_table.select(index);

        let entries = self.sidebar_entries().len();
        if self.sidebar_index >= entries {
            self.sidebar_index = entries.saturating_sub(1);
        }
    }

    fn selected_task_id(&self) -> Option<Id> {
        self.task_table
            .selected()
            .and_then(|i| self.filtered.get(i))
            .cloned()
    }

    fn selected_task(&self) -> Option<&Task> {
        self.selected_task_id().and_then(|id| self.dash.store.get(&id))
    }

    /// "All tasks" followed by the department tree.
    fn sidebar_entries(&self) -> Vec<Option<Id>> {
        let depts = &self.dash.store.departments;
        let mut entries = vec![None];
        for top in department::top_level(depts) {
            entries.push(Some(top.id.clone()));
            for sub in department::children(depts, &top.id) {
                entries.push(Some(sub.id.clone()));
            }
        }
        entries
    }

    fn sidebar_selection(&self) -> Option<Id> {
        self.sidebar_entries().get(self.sidebar_index).cloned().flatten()
    }

    fn move_selection(&mut self, down: bool) {
        match self.focus {
            Focus::Sidebar => {
                let len = self.sidebar_entries().len();
                if down && self.sidebar_index + 1 < len {
                    self.sidebar_index += 1;
                } else if !down && self.sidebar_index > 0 {
                    self.sidebar_index -= 1;
                }
            }
            Focus::Tasks => {
                let len = self.filtered.len();
                let next = match self.task_table.selected() {
                    Some(i) if down && i + 1 < len => Some(i + 1),
                    Some(i) if !down && i > 0 => Some(i - 1),
                    Some(i) => Some(i),
                    None if len > 0 => Some(0),
                    None => None,
                };
                self.task_table.select(next);
            }
        }
    }

    // Screen transitions

    fn open_new_task(&mut self, from: AppState) {
        self.dash.open_new_task();
        self.task_form = TaskForm::from_draft(
            &self.dash.task_draft,
            &self.dash.store.departments,
            &self.dash.store.members,
        );
        self.form_return = from;
        self.state = AppState::TaskForm;
        self.input_mode = InputMode::Text;
    }

    fn open_edit_task(&mut self, id: &Id, from: AppState) {
        match self.dash.open_edit_task(id) {
            Ok(()) => {
                self.task_form = TaskForm::from_draft(
                    &self.dash.task_draft,
                    &self.dash.store.departments,
                    &self.dash.store.members,
                );
                self.form_return = from;
                self.state = AppState::TaskForm;
                self.input_mode = InputMode::Text;
            }
            Err(e) => self.set_status_message(format!("Error: {}", e)),
        }
    }

    fn open_new_dept(&mut self, parent: Option<Id>) {
        self.dash.open_new_dept(parent);
        self.dept_form = DeptForm::from_draft(&self.dash.dept_draft);
        self.state = AppState::DeptForm;
        self.input_mode = InputMode::Text;
    }

    fn open_edit_dept(&mut self, id: &Id) {
        match self.dash.open_edit_dept(id) {
            Ok(()) => {
                self.dept_form = DeptForm::from_draft(&self.dash.dept_draft);
                self.state = AppState::DeptForm;
                self.input_mode = InputMode::Text;
            }
            Err(e) => self.set_status_message(format!("Error: {}", e)),
        }
    }

    fn open_detail(&mut self, id: &Id) {
        match self.dash.open_detail(id) {
            Ok(()) => {
                self.detail_tab = DetailTab::Details;
                self.subtask_index = 0;
                self.detail_input.clear();
                self.state = AppState::TaskDetail;
            }
            Err(e) => self.set_status_message(format!("Error: {}", e)),
        }
    }

    fn ask_confirm(&mut self, action: ConfirmAction) {
        self.confirm_return = self.state;
        self.confirm_action = Some(action);
        self.state = AppState::Confirm;
    }

    fn change_status(&mut self, id: &Id, forward: bool) {
        let Some(task) = self.dash.store.get(id) else { return };
        let status = step_status(task.status, forward);
        let op = self.dash.update_task_status(id, status);
        self.submit(op, &format!("Status set to {}", format_status(status)));
    }

    // Input handling

    fn handle_dashboard_input(&mut self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        if self.search_active {
            match key {
                KeyCode::Esc => {
                    self.search_active = false;
                    self.input_mode = InputMode::None;
                    self.dash.filter.search.clear();
                }
                KeyCode::Enter => {
                    self.search_active = false;
                    self.input_mode = InputMode::None;
                }
                KeyCode::Backspace => {
                    self.dash.filter.search.pop();
                }
                KeyCode::Char(c) => self.dash.filter.search.push(c),
                _ => {}
            }
            self.update_filtered_tasks();
            return false;
        }

        match key {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Char('q') => return true,
            KeyCode::Esc => {
                let filter = &mut self.dash.filter;
                // The department scope is not a filter Esc clears.
                if (TaskFilter { dept: None, ..filter.clone() }).is_empty() {
                    return true;
                }
                filter.search.clear();
                filter.status = None;
                filter.priority = None;
                self.update_filtered_tasks();
                self.set_status_message("Filters cleared".to_string());
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Sidebar => Focus::Tasks,
                    Focus::Tasks => Focus::Sidebar,
                };
            }
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(false),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(true),
            KeyCode::Char('v') => self.view = self.view.next(),
            KeyCode::Char('1') => self.view = ViewMode::List,
            KeyCode::Char('2') => self.view = ViewMode::Board,
            KeyCode::Char('3') => self.view = ViewMode::Timeline,
            KeyCode::Char('/') => {
                self.search_active = true;
                self.input_mode = InputMode::Text;
            }
            KeyCode::Char('s') => {
                self.dash.filter.status = cycle_filter(self.dash.filter.status, &Status::ALL);
                self.update_filtered_tasks();
            }
            KeyCode::Char('p') => {
                self.dash.filter.priority = cycle_filter(self.dash.filter.priority, &Priority::ALL);
                self.update_filtered_tasks();
            }
            KeyCode::Char('r') => {
                self.sync.refresh();
                self.set_status_message("Refreshing...".to_string());
            }
            KeyCode::Char('a') | KeyCode::Char('n') => self.open_new_task(AppState::Dashboard),
            KeyCode::Char('D') => self.open_new_dept(None),
            KeyCode::Char('m') => {
                self.member_input.clear();
                self.member_index = 0;
                self.state = AppState::Members;
                self.input_mode = InputMode::Text;
            }
            KeyCode::Char('h') | KeyCode::Char('?') | KeyCode::F(1) => {
                self.state = AppState::Help;
            }
            _ => match self.focus {
                Focus::Sidebar => self.handle_sidebar_key(key),
                Focus::Tasks => self.handle_task_key(key),
            },
        }
        false
    }

    fn handle_sidebar_key(&mut self, key: KeyCode) {
        let selection = self.sidebar_selection();
        match key {
            KeyCode::Enter | KeyCode::Char(' ') => {
                self.dash.filter.dept = selection;
                self.update_filtered_tasks();
                self.focus = Focus::Tasks;
            }
            KeyCode::Char('e') => {
                if let Some(id) = selection {
                    self.open_edit_dept(&id);
                }
            }
            KeyCode::Char('S') => match selection {
                Some(id) => {
                    let top_level = self.dash.store.department(&id).is_some_and(|d| d.is_top_level());
                    if top_level {
                        self.open_new_dept(Some(id));
                    } else {
                        self.set_status_message("Sub-departments cannot be nested".to_string());
                    }
                }
                None => self.set_status_message("Select a department first".to_string()),
            },
            KeyCode::Char('d') => {
                if let Some(dept) = selection.as_ref().and_then(|id| self.dash.store.department(id)) {
                    let action = ConfirmAction::DeleteDept { id: dept.id.clone(), name: dept.name.clone() };
                    self.ask_confirm(action);
                }
            }
            _ => {}
        }
    }

    fn handle_task_key(&mut self, key: KeyCode) {
        let Some(id) = self.selected_task_id() else { return };
        match key {
            KeyCode::Enter | KeyCode::Char(' ') => self.open_detail(&id),
            KeyCode::Char('e') => self.open_edit_task(&id, AppState::Dashboard),
            KeyCode::Char('d') => {
                if let Some(task) = self.dash.store.get(&id) {
                    let action = ConfirmAction::DeleteTask { id: id.clone(), title: task.title.clone() };
                    self.ask_confirm(action);
                }
            }
            KeyCode::Char('>') | KeyCode::Char('.') => self.change_status(&id, true),
            KeyCode::Char('<') | KeyCode::Char(',') => self.change_status(&id, false),
            _ => {}
        }
    }

    fn handle_detail_input(&mut self, key: KeyCode, _modifiers: KeyModifiers) -> bool {
        let Some(task_id) = self.dash.detail.as_ref().map(|p| p.task_id.clone()) else {
            self.state = AppState::Dashboard;
            return false;
        };

        if self.input_mode == InputMode::Text {
            match key {
                KeyCode::Esc => {
                    self.detail_input.clear();
                    self.input_mode = InputMode::None;
                }
                KeyCode::Enter => {
                    let text = self.detail_input.value.clone();
                    let result = match self.detail_tab {
                        DetailTab::Comments => self.dash.add_comment(&task_id, &text),
                        _ => self.dash.add_subtask(&task_id, &text),
                    };
                    match result {
                        Ok(op) => {
                            self.detail_input.clear();
                            self.submit(op, "Added");
                        }
                        Err(e) => self.set_status_message(format!("Error: {}", e)),
                    }
                }
                KeyCode::Backspace => self.detail_input.handle_backspace(),
                KeyCode::Delete => self.detail_input.handle_delete(),
                KeyCode::Left => self.detail_input.move_cursor_left(),
                KeyCode::Right => self.detail_input.move_cursor_right(),
                KeyCode::Home => self.detail_input.home(),
                KeyCode::End => self.detail_input.end(),
                KeyCode::Char(c) => self.detail_input.handle_char(c),
                _ => {}
            }
            return false;
        }

        match key {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.dash.close_detail();
                self.state = AppState::Dashboard;
            }
            KeyCode::Tab => self.detail_tab = self.detail_tab.next(),
            KeyCode::Char('1') => self.detail_tab = DetailTab::Details,
            KeyCode::Char('2') => self.detail_tab = DetailTab::Subtasks,
            KeyCode::Char('3') => self.detail_tab = DetailTab::Comments,
            KeyCode::Char('e') => self.open_edit_task(&task_id, AppState::TaskDetail),
            KeyCode::Char('d') => {
                if let Some(task) = self.dash.detail_task() {
                    let action = ConfirmAction::DeleteTask { id: task_id.clone(), title: task.title.clone() };
                    self.ask_confirm(action);
                }
            }
            KeyCode::Char('a') | KeyCode::Char('i')
                if matches!(self.detail_tab, DetailTab::Subtasks | DetailTab::Comments) =>
            {
                self.input_mode = InputMode::Text;
            }
            KeyCode::Left | KeyCode::Right if self.detail_tab == DetailTab::Details => {
                if let Some(task) = self.dash.detail_task() {
                    let status = step_status(task.status, key == KeyCode::Right);
                    let op = self.dash.update_task_status(&task_id, status);
                    self.submit(op, &format!("Status set to {}", format_status(status)));
                }
            }
            KeyCode::Up | KeyCode::Char('k') if self.detail_tab == DetailTab::Subtasks => {
                self.subtask_index = self.subtask_index.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') if self.detail_tab == DetailTab::Subtasks => {
                let len = self.dash.detail_task().map_or(0, |t| t.subtasks.len());
                if self.subtask_index + 1 < len {
                    self.subtask_index += 1;
                }
            }
            KeyCode::Char(' ') | KeyCode::Enter if self.detail_tab == DetailTab::Subtasks => {
                let subtask_id = self
                    .dash
                    .detail_task()
                    .and_then(|t| t.subtasks.get(self.subtask_index))
                    .map(|s| s.id.clone());
                if let Some(subtask_id) = subtask_id {
                    match self.dash.toggle_subtask(&task_id, &subtask_id) {
                        Ok(op) => self.submit(op, "Subtask updated"),
                        Err(e) => self.set_status_message(format!("Error: {}", e)),
                    }
                }
            }
            _ => {}
        }
        false
    }

    fn handle_task_form_input(&mut self, key: KeyCode, _modifiers: KeyModifiers) -> bool {
        match key {
            KeyCode::Esc => {
                self.state = self.form_return;
                self.input_mode = InputMode::None;
            }
            KeyCode::Tab | KeyCode::Down => self.task_form.next_field(),
            KeyCode::BackTab | KeyCode::Up => self.task_form.prev_field(),
            KeyCode::Left => self.task_form.handle_left_right(false),
            KeyCode::Right => self.task_form.handle_left_right(true),
            KeyCode::Backspace => self.task_form.handle_backspace(),
            KeyCode::Delete => self.task_form.handle_delete(),
            KeyCode::Enter => {
                self.dash.task_draft = self.task_form.to_draft();
                let is_edit = self.dash.editing_task.is_some();
                match self.dash.save_task() {
                    Ok(op) => {
                        self.state = self.form_return;
                        self.input_mode = InputMode::None;
                        self.submit(op, if is_edit { "Task updated" } else { "Task created" });
                    }
                    Err(e) => self.set_status_message(format!("Error: {}", e)),
                }
            }
            KeyCode::Char(c) => self.task_form.handle_char(c),
            _ => {}
        }
        false
    }

    fn handle_dept_form_input(&mut self, key: KeyCode, _modifiers: KeyModifiers) -> bool {
        match key {
            KeyCode::Esc => {
                self.state = AppState::Dashboard;
                self.input_mode = InputMode::None;
            }
            KeyCode::Tab | KeyCode::Down => self.dept_form.next_field(),
            KeyCode::BackTab | KeyCode::Up => self.dept_form.prev_field(),
            KeyCode::Left => self.dept_form.handle_left_right(false),
            KeyCode::Right => self.dept_form.handle_left_right(true),
            KeyCode::Backspace => {
                if let Some(field) = self.dept_form.active_input() {
                    field.handle_backspace();
                }
            }
            KeyCode::Delete => {
                if let Some(field) = self.dept_form.active_input() {
                    field.handle_delete();
                }
            }
            KeyCode::Enter => {
                self.dash.dept_draft = self.dept_form.to_draft();
                let is_edit = self.dash.editing_dept.is_some();
                match self.dash.save_dept() {
                    Ok(op) => {
                        self.state = AppState::Dashboard;
                        self.input_mode = InputMode::None;
                        self.submit(op, if is_edit { "Department updated" } else { "Department created" });
                    }
                    Err(e) => self.set_status_message(format!("Error: {}", e)),
                }
            }
            KeyCode::Char(c) => {
                if let Some(field) = self.dept_form.active_input() {
                    field.handle_char(c);
                }
            }
            _ => {}
        }
        false
    }

    fn handle_members_input(&mut self, key: KeyCode, _modifiers: KeyModifiers) -> bool {
        match key {
            KeyCode::Esc => {
                self.state = AppState::Dashboard;
                self.input_mode = InputMode::None;
            }
            KeyCode::Up => self.member_index = self.member_index.saturating_sub(1),
            KeyCode::Down => {
                if self.member_index + 1 < self.dash.store.members.len() {
                    self.member_index += 1;
                }
            }
            KeyCode::Delete => {
                if let Some(member) = self.dash.store.members.get(self.member_index) {
                    let action = ConfirmAction::DeleteMember { id: member.id.clone(), name: member.name.clone() };
                    self.ask_confirm(action);
                }
            }
            KeyCode::Enter => {
                self.dash.member_name = self.member_input.value.clone();
                match self.dash.add_member() {
                    Ok(op) => {
                        self.member_input.clear();
                        self.submit(op, "Member added");
                    }
                    Err(e) => self.set_status_message(format!("Error: {}", e)),
                }
            }
            KeyCode::Backspace => self.member_input.handle_backspace(),
            KeyCode::Left => self.member_input.move_cursor_left(),
            KeyCode::Right => self.member_input.move_cursor_right(),
            KeyCode::Char(c) => self.member_input.handle_char(c),
            _ => {}
        }
        false
    }

    fn handle_confirm_input(&mut self, key: KeyCode, _modifiers: KeyModifiers) -> bool {
        match key {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.state = self.confirm_return;
                match self.confirm_action.take() {
                    Some(ConfirmAction::DeleteTask { id, .. }) => {
                        let op = self.dash.delete_task(&id);
                        if self.state == AppState::TaskDetail {
                            self.state = AppState::Dashboard;
                        }
                        self.submit(op, "Task deleted");
                    }
                    Some(ConfirmAction::DeleteDept { id, .. }) => {
                        let op = self.dash.delete_dept(&id);
                        self.update_filtered_tasks();
                        self.submit(op, "Department deleted");
                    }
                    Some(ConfirmAction::DeleteMember { id, .. }) => {
                        let op = self.dash.delete_member(&id);
                        self.member_index = self.member_index.saturating_sub(1);
                        self.submit(op, "Member removed");
                    }
                    None => {}
                }
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.confirm_action = None;
                self.state = self.confirm_return;
                self.set_status_message("Cancelled".to_string());
            }
            _ => {}
        }
        false
    }

    /// The connection error screen blocks every other screen: only retry and quit.
    fn handle_error_input(&mut self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        match key {
            KeyCode::Char('r') => {
                self.sync.refresh();
                self.set_status_message("Retrying...".to_string());
            }
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return true,
            _ => {}
        }
        false
    }

    /// Dispatch a key press to the current screen. Returns true to quit.
    fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        self.clear_status_message();
        if self.dash.store.error.is_some() {
            return self.handle_error_input(key, modifiers);
        }
        match self.state {
            AppState::Dashboard => self.handle_dashboard_input(key, modifiers),
            AppState::TaskDetail => self.handle_detail_input(key, modifiers),
            AppState::TaskForm => self.handle_task_form_input(key, modifiers),
            AppState::DeptForm => self.handle_dept_form_input(key, modifiers),
            AppState::Members => self.handle_members_input(key, modifiers),
            AppState::Help => {
                self.state = AppState::Dashboard;
                false
            }
            AppState::Confirm => self.handle_confirm_input(key, modifiers),
        }
    }

    /// Poll for and handle keyboard events based on current application state.
    ///
    /// Returns true if the application should quit.
    fn handle_input(&mut self) -> io::Result<bool> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(self.handle_key(key.code, key.modifiers));
                }
            }
        }
        Ok(false)
    }

    // Rendering

    fn scope_name(&self) -> String {
        match &self.dash.filter.dept {
            Some(id) => self.dash.store.dept_name(Some(id)),
            None => "All tasks".to_string(),
        }
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let mut spans = vec![
            Span::styled("FLOWDESK", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(self.scope_name(), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("    "),
        ];
        for mode in ViewMode::ALL {
            let style = if mode == self.view {
                Style::default().bg(ACCENT).fg(Color::White).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(MUTED)
            };
            spans.push(Span::styled(format!(" {} ", mode.label()), style));
            spans.push(Span::raw(" "));
        }
        if self.dash.store.loading {
            spans.push(Span::styled("  ⟳ syncing", Style::default().fg(Color::Yellow)));
        }
        let header = Paragraph::new(Line::from(spans))
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Left);
        f.render_widget(header, area);
    }

    fn render_sidebar(&mut self, f: &mut Frame, area: Rect) {
        let store = &self.dash.store;
        let members_height = (store.members.len().min(SIDEBAR_MEMBERS) as u16 + 3).max(4);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),
                Constraint::Length(3),
                Constraint::Length(members_height),
            ])
            .split(area);

        let items: Vec<ListItem> = self
            .sidebar_entries()
            .iter()
            .map(|entry| {
                let in_scope = *entry == self.dash.filter.dept;
                let marker = if in_scope { "▶ " } else { "  " };
                let count = scoped_tasks(&store.tasks, entry.as_ref()).len();
                let line = match entry.as_ref().and_then(|id| store.department(id)) {
                    None => Line::from(vec![
                        Span::raw(marker),
                        Span::styled("All tasks", Style::default().add_modifier(Modifier::BOLD)),
                        Span::styled(format!(" ({})", store.tasks.len()), Style::default().fg(MUTED)),
                    ]),
                    Some(dept) if dept.is_top_level() => Line::from(vec![
                        Span::raw(marker),
                        Span::styled("● ", Style::default().fg(hex(&dept.color))),
                        Span::raw(format!("{} {}", dept.icon(), dept.name)),
                        Span::styled(format!(" ({})", count), Style::default().fg(MUTED)),
                    ]),
                    Some(dept) => Line::from(vec![
                        Span::raw(marker),
                        Span::raw("  └ "),
                        Span::styled("● ", Style::default().fg(hex(&dept.color))),
                        Span::raw(dept.name.clone()),
                        Span::styled(format!(" ({})", count), Style::default().fg(MUTED)),
                    ]),
                };
                ListItem::new(line)
            })
            .collect();

        let focused = self.focus == Focus::Sidebar && self.state == AppState::Dashboard;
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Departments")
                    .border_style(if focused { Style::default().fg(ACCENT) } else { Style::default() }),
            )
            .highlight_style(Style::default().bg(Color::Gray).fg(Color::Black));
        let mut list_state = ListState::default();
        if focused {
            list_state.select(Some(self.sidebar_index));
        }
        f.render_stateful_widget(list, chunks[0], &mut list_state);

        let scoped = scoped_tasks(&store.tasks, self.dash.filter.dept.as_ref());
        let (done, total, pct) = progress(&scoped);
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Rgb(34, 197, 94)))
            .percent(u16::from(pct))
            .label(format!("{}/{} completed · {}%", done, total, pct));
        f.render_widget(gauge, chunks[1]);

        let mut lines: Vec<Line> = store
            .members
            .iter()
            .take(SIDEBAR_MEMBERS)
            .map(|m| {
                Line::from(vec![
                    Span::styled(
                        format!(" {:<2} ", initials(&m.name)),
                        Style::default()
                            .bg(avatar_color(avatar_hue(&m.name)))
                            .fg(Color::White)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!(" {}", m.name)),
                ])
            })
            .collect();
        if store.members.len() > SIDEBAR_MEMBERS {
            lines.push(Line::from(Span::styled(
                format!("+{} more", store.members.len() - SIDEBAR_MEMBERS),
                Style::default().fg(MUTED),
            )));
        }
        let members = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(format!("Team ({})", store.members.len())));
        f.render_widget(members, chunks[2]);
    }

    fn render_filter_bar(&self, f: &mut Frame, area: Rect) {
        let filter = &self.dash.filter;
        let search_style = if self.search_active {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let status = filter.status.map_or("All", format_status);
        let priority = filter.priority.map_or("All", format_priority);
        let line = Line::from(vec![
            Span::styled(format!("🔍 {}", filter.search), search_style),
            Span::styled("   Status: ", Style::default().fg(MUTED)),
            Span::raw(status),
            Span::styled("   Priority: ", Style::default().fg(MUTED)),
            Span::raw(priority),
            Span::styled(format!("   {} tasks", self.filtered.len()), Style::default().fg(MUTED)),
        ]);
        let bar = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Filter"));
        f.render_widget(bar, area);

        if self.search_active {
            let x = area.x + 1 + 3 + filter.search.chars().count() as u16;
            f.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
        }
    }

    fn render_dashboard(&mut self, f: &mut Frame, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);
        self.render_header(f, rows[0]);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(32), Constraint::Min(0)])
            .split(rows[1]);
        self.render_sidebar(f, columns[0]);

        let main = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(columns[1]);
        self.render_filter_bar(f, main[0]);

        let store = &self.dash.store;
        if store.loading && !store.has_loaded() {
            let loading = Paragraph::new("Loading…")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL));
            f.render_widget(loading, main[1]);
            return;
        }

        let tasks: Vec<&Task> = self.filtered.iter().filter_map(|id| store.get(id)).collect();
        let selected = self.task_table.selected().and_then(|i| self.filtered.get(i));
        let ctx = ViewContext {
            tasks: &tasks,
            store,
            selected,
            focused: self.focus == Focus::Tasks && self.state == AppState::Dashboard,
            today: self.dash.today(),
        };
        task_views::render(f, main[1], self.view, &ctx, &mut self.task_table);
    }

    fn render_error(&self, f: &mut Frame, area: Rect) {
        let message = self.dash.store.error.as_deref().unwrap_or("Unknown error");
        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                "⚠ Connection Error",
                Style::default().fg(OVERDUE).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(message),
            Line::from(""),
            Line::from("Press 'r' to retry, 'q' to quit"),
        ];
        let paragraph = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("FlowDesk"))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, centered_rect(70, 50, area));
    }

    fn detail_lines(&self, task: &Task) -> Vec<Line<'static>> {
        let store = &self.dash.store;
        let today = self.dash.today();
        let label = |s: &str| Span::styled(format!("{:<12}", s), Style::default().fg(MUTED));

        let mut status_spans = vec![label("Status")];
        for status in Status::ALL {
            let style = if status == task.status {
                Style::default().bg(status_color(status)).fg(Color::White).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(status_color(status))
            };
            status_spans.push(Span::styled(format!(" {} ", format_status(status)), style));
            status_spans.push(Span::raw(" "));
        }

        let due = match task.due_date {
            Some(d) => format!("{} ({})", d, format_due_relative(Some(d), today)),
            None => "-".to_string(),
        };
        let tags = if task.tags.is_empty() { "-".to_string() } else { task.tags.join(", ") };
        let (done, total) = task.subtask_progress();

        let mut lines = vec![
            Line::from(status_spans),
            Line::from(Span::styled("            ←/→ to change", Style::default().fg(MUTED))),
            Line::from(""),
            Line::from(vec![
                label("Priority"),
                Span::styled(format_priority(task.priority), Style::default().fg(priority_color(task.priority))),
            ]),
            Line::from(vec![
                label("Department"),
                Span::styled("● ", Style::default().fg(hex(store.dept_color(task.dept_id.as_ref())))),
                Span::raw(store.dept_name(task.dept_id.as_ref())),
            ]),
            Line::from(vec![label("Assignee"), Span::raw(task.assignee.clone().unwrap_or_else(|| "-".into()))]),
            Line::from(vec![label("Due"), Span::raw(due)]),
            Line::from(vec![label("Recurrence"), Span::raw(format_recurrence(task.recurrence))]),
            Line::from(vec![label("Tags"), Span::raw(tags)]),
            Line::from(vec![label("Subtasks"), Span::raw(format!("{}/{}", done, total))]),
        ];
        if let Some(created) = task.created_at {
            lines.push(Line::from(vec![
                label("Created"),
                Span::raw(created.format("%Y-%m-%d %H:%M").to_string()),
            ]));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Description", Style::default().add_modifier(Modifier::BOLD))));
        for text in task.description.as_deref().unwrap_or("-").lines() {
            lines.push(Line::from(text.to_string()));
        }
        lines
    }

    fn render_detail(&mut self, f: &mut Frame, area: Rect) {
        let Some(task) = self.dash.detail_task().cloned() else { return };
        let area = centered_rect(80, 85, area);
        f.render_widget(Clear, area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(ACCENT))
            .title(Span::styled(format!(" {} ", task.title), Style::default().add_modifier(Modifier::BOLD)));
        let inner = block.inner(area);
        f.render_widget(block, area);

        let with_input = self.detail_tab != DetailTab::Details;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(if with_input { 3 } else { 0 }),
            ])
            .split(inner);

        let (done, total) = task.subtask_progress();
        let tabs = Tabs::new(vec![
            "Details".to_string(),
            format!("Subtasks ({}/{})", done, total),
            format!("Comments ({})", task.comments.len()),
        ])
        .select(self.detail_tab.index())
        .highlight_style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD | Modifier::UNDERLINED));
        f.render_widget(tabs, chunks[0]);

        match self.detail_tab {
            DetailTab::Details => {
                let details = Paragraph::new(self.detail_lines(&task)).wrap(Wrap { trim: false });
                f.render_widget(details, chunks[1]);
            }
            DetailTab::Subtasks => {
                let items: Vec<ListItem> = task
                    .subtasks
                    .iter()
                    .map(|s| {
                        let (mark, style) = if s.done {
                            ("[x]", Style::default().fg(MUTED).add_modifier(Modifier::CROSSED_OUT))
                        } else {
                            ("[ ]", Style::default())
                        };
                        ListItem::new(Line::from(vec![Span::raw(format!("{} ", mark)), Span::styled(s.title.clone(), style)]))
                    })
                    .collect();
                let list = if items.is_empty() {
                    List::new(vec![ListItem::new(Span::styled("No subtasks yet", Style::default().fg(MUTED)))])
                } else {
                    List::new(items)
                }
                .highlight_style(Style::default().bg(Color::Gray).fg(Color::Black));
                let mut state = ListState::default();
                if !task.subtasks.is_empty() {
                    state.select(Some(self.subtask_index.min(task.subtasks.len() - 1)));
                }
                f.render_stateful_widget(list, chunks[1], &mut state);
            }
            DetailTab::Comments => {
                let mut lines: Vec<Line> = Vec::new();
                for comment in &task.comments {
                    let when = comment
                        .created_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    let author = comment.author.clone().unwrap_or_else(|| COMMENT_AUTHOR.to_string());
                    lines.push(Line::from(vec![
                        Span::styled(
                            format!(" {} ", initials(&author)),
                            Style::default().bg(avatar_color(avatar_hue(&author))).fg(Color::White),
                        ),
                        Span::styled(format!(" {}", author), Style::default().add_modifier(Modifier::BOLD)),
                        Span::styled(format!("  {}", when), Style::default().fg(MUTED)),
                    ]));
                    lines.push(Line::from(format!("    {}", comment.text)));
                    lines.push(Line::from(""));
                }
                if lines.is_empty() {
                    lines.push(Line::from(Span::styled("No comments yet", Style::default().fg(MUTED))));
                }
                f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), chunks[1]);
            }
        }

        if with_input {
            let typing = self.input_mode == InputMode::Text;
            let title = match (self.detail_tab, typing) {
                (DetailTab::Comments, true) => "Comment (Enter to post, Esc to cancel)",
                (DetailTab::Comments, false) => "Press 'a' to write a comment",
                (_, true) => "New subtask (Enter to add, Esc to cancel)",
                (_, false) => "Press 'a' to add a subtask, Space to toggle",
            };
            let input = Paragraph::new(self.detail_input.value.as_str()).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .border_style(if typing { Style::default().fg(ACCENT) } else { Style::default() }),
            );
            f.render_widget(input, chunks[2]);
            if typing {
                f.set_cursor_position((chunks[2].x + 1 + self.detail_input.cursor as u16, chunks[2].y + 1));
            }
        }
    }

    fn field_block(title: &str, focused: bool) -> Block<'_> {
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(if focused { Style::default().fg(ACCENT) } else { Style::default() })
    }

    fn render_task_form(&mut self, f: &mut Frame, area: Rect) {
        let is_edit = self.dash.editing_task.is_some();
        let area = centered_rect(70, 95, area);
        f.render_widget(Clear, area);
        let outer = Block::default()
            .borders(Borders::ALL)
            .title(if is_edit { "Edit Task" } else { "New Task" })
            .border_style(Style::default().fg(ACCENT));
        let inner = outer.inner(area);
        f.render_widget(outer, area);

        let mut constraints = vec![Constraint::Length(3); 9];
        constraints.push(Constraint::Min(1));
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(inner);

        let form = &self.task_form;
        let current = form.current_field;
        let text_fields = [
            (TITLE_GLOBAL_ORDER, "Title *", &form.title),
            (DESCRIPTION_GLOBAL_ORDER, "Description", &form.description),
            (DUE_GLOBAL_ORDER, "Due date (YYYY-MM-DD, today, in 3d, next fri...)", &form.due),
            (TAGS_GLOBAL_ORDER, "Tags (comma separated)", &form.tags),
        ];
        for (order, title, field) in text_fields {
            let widget = Paragraph::new(field.value.as_str()).block(Self::field_block(title, current == order));
            f.render_widget(widget, chunks[order]);
        }

        let status = Status::ALL[form.status];
        let priority = Priority::ALL[form.priority];
        let selectors = [
            (DEPT_SELECTOR_GLOBAL_ORDER, "Department", form.department_label().to_string(), Style::default()),
            (STATUS_GLOBAL_ORDER, "Status", format_status(status).to_string(), Style::default().fg(status_color(status))),
            (PRIORITY_GLOBAL_ORDER, "Priority", format_priority(priority).to_string(), Style::default().fg(priority_color(priority))),
            (ASSIGNEE_SELECTOR_GLOBAL_ORDER, "Assignee", form.assignee_label().to_string(), Style::default()),
            (RECURRENCE_GLOBAL_ORDER, "Recurrence", format_recurrence(Recurrence::ALL[form.recurrence]).to_string(), Style::default()),
        ];
        for (order, title, value, style) in selectors {
            let widget = Paragraph::new(Line::from(vec![
                Span::raw("< "),
                Span::styled(value, style),
                Span::raw(" >"),
            ]))
            .block(Self::field_block(title, current == order));
            f.render_widget(widget, chunks[order]);
        }

        let help = Paragraph::new("Tab/↑↓ move  ←/→ change selection  Enter save  Esc cancel")
            .style(Style::default().fg(MUTED))
            .alignment(Alignment::Center);
        f.render_widget(help, chunks[9]);

        let cursor = match current {
            TITLE_GLOBAL_ORDER => Some(form.title.cursor),
            DESCRIPTION_GLOBAL_ORDER => Some(form.description.cursor),
            DUE_GLOBAL_ORDER => Some(form.due.cursor),
            TAGS_GLOBAL_ORDER => Some(form.tags.cursor),
            _ => None,
        };
        if let Some(cursor) = cursor {
            let chunk = chunks[current];
            f.set_cursor_position((chunk.x + 1 + cursor as u16, chunk.y + 1));
        }
    }

    fn render_dept_form(&mut self, f: &mut Frame, area: Rect) {
        let form = &self.dept_form;
        let title = match (self.dash.editing_dept.is_some(), form.is_sub_department()) {
            (true, _) => "Edit Department".to_string(),
            (false, true) => {
                let parent = form
                    .parent_id
                    .as_ref()
                    .and_then(|id| self.dash.store.department(id))
                    .map(|d| d.name.clone())
                    .unwrap_or_default();
                format!("New Sub-department of {}", parent)
            }
            (false, false) => "New Department".to_string(),
        };
        let area = centered_rect(50, 50, area);
        f.render_widget(Clear, area);
        let outer = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(ACCENT));
        let inner = outer.inner(area);
        f.render_widget(outer, area);

        let icon_height = if form.is_sub_department() { 0 } else { 3 };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(icon_height),
                Constraint::Length(3),
                Constraint::Min(1),
            ])
            .split(inner);

        let current = form.current_field;
        f.render_widget(
            Paragraph::new(form.name.value.as_str()).block(Self::field_block("Name *", current == NAME_GLOBAL_ORDER)),
            chunks[0],
        );
        if !form.is_sub_department() {
            f.render_widget(
                Paragraph::new(form.icon.value.as_str()).block(Self::field_block("Icon", current == ICON_GLOBAL_ORDER)),
                chunks[1],
            );
        }

        let mut swatches: Vec<Span> = Vec::new();
        for (i, color) in PALETTE.iter().enumerate() {
            let picked = form.custom_color.is_none() && i == form.color;
            let symbol = if picked { "[■]" } else { " ■ " };
            swatches.push(Span::styled(symbol, Style::default().fg(hex(color))));
        }
        if let Some(custom) = &form.custom_color {
            swatches.push(Span::styled(" [■]", Style::default().fg(hex(custom))));
        }
        f.render_widget(
            Paragraph::new(Line::from(swatches)).block(Self::field_block("Colour", current == COLOR_GLOBAL_ORDER)),
            chunks[2],
        );

        let help = Paragraph::new("Tab move  ←/→ pick colour  Enter save  Esc cancel")
            .style(Style::default().fg(MUTED))
            .alignment(Alignment::Center);
        f.render_widget(help, chunks[3]);

        let cursor = match current {
            NAME_GLOBAL_ORDER => Some((chunks[0], form.name.cursor)),
            ICON_GLOBAL_ORDER => Some((chunks[1], form.icon.cursor)),
            _ => None,
        };
        if let Some((chunk, cursor)) = cursor {
            f.set_cursor_position((chunk.x + 1 + cursor as u16, chunk.y + 1));
        }
    }

    fn render_members(&mut self, f: &mut Frame, area: Rect) {
        let area = centered_rect(50, 60, area);
        f.render_widget(Clear, area);
        let outer = Block::default()
            .borders(Borders::ALL)
            .title("Team Members")
            .border_style(Style::default().fg(ACCENT));
        let inner = outer.inner(area);
        f.render_widget(outer, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3), Constraint::Length(1)])
            .split(inner);

        let members = &self.dash.store.members;
        let items: Vec<ListItem> = members
            .iter()
            .map(|m| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!(" {:<2} ", initials(&m.name)),
                        Style::default().bg(avatar_color(avatar_hue(&m.name))).fg(Color::White),
                    ),
                    Span::raw(format!(" {}", m.name)),
                ]))
            })
            .collect();
        let list = List::new(items).highlight_style(Style::default().bg(Color::Gray).fg(Color::Black));
        let mut state = ListState::default();
        if !members.is_empty() {
            state.select(Some(self.member_index.min(members.len() - 1)));
        }
        f.render_stateful_widget(list, chunks[0], &mut state);

        f.render_widget(
            Paragraph::new(self.member_input.value.as_str()).block(Self::field_block("Add member (Enter)", true)),
            chunks[1],
        );
        f.set_cursor_position((chunks[1].x + 1 + self.member_input.cursor as u16, chunks[1].y + 1));

        let help = Paragraph::new("↑↓ select  Del remove  Esc close").style(Style::default().fg(MUTED));
        f.render_widget(help, chunks[2]);
    }

    fn render_help(&mut self, f: &mut Frame, area: Rect) {
        let heading = |s: &'static str| Line::from(Span::styled(s, Style::default().add_modifier(Modifier::BOLD)));
        let help_text = vec![
            heading("FlowDesk Help"),
            Line::from(""),
            heading("Dashboard:"),
            Line::from("  ↑/k, ↓/j     Move selection"),
            Line::from("  Tab          Switch between departments and tasks"),
            Line::from("  v, 1/2/3     Cycle view / List, Board, Timeline"),
            Line::from("  /            Search title and assignee"),
            Line::from("  s / p        Cycle status / priority filter"),
            Line::from("  Esc          Clear filters (quit when none)"),
            Line::from("  a            Add new task"),
            Line::from("  Enter        Open task detail / select department"),
            Line::from("  e / d        Edit / delete selected task or department"),
            Line::from("  < / >        Move selected task to previous / next status"),
            Line::from("  D            Add department"),
            Line::from("  S            Add sub-department to selected department"),
            Line::from("  m            Manage team members"),
            Line::from("  r            Reload from the backend"),
            Line::from("  h/?/F1       Show this help"),
            Line::from("  q/Ctrl+C     Quit"),
            Line::from(""),
            heading("Task Detail:"),
            Line::from("  Tab, 1/2/3   Switch tabs"),
            Line::from("  ←/→          Change status (details tab)"),
            Line::from("  a            Add subtask or comment"),
            Line::from("  Space        Toggle selected subtask"),
            Line::from("  e / d        Edit / delete task"),
            Line::from("  Esc/q        Close"),
            Line::from(""),
            heading("Due Date Formats:"),
            Line::from("  YYYY-MM-DD   Specific date (e.g., 2024-12-25)"),
            Line::from("  today, tomorrow, friday, next monday, in 3d, in 2w, eow, eom"),
        ];

        let paragraph = Paragraph::new(help_text)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Help - Press any key to return"),
            )
            .wrap(Wrap { trim: true });

        f.render_widget(paragraph, area);
    }

    /// Render a confirmation dialog for destructive actions.
    fn render_confirm(&mut self, f: &mut Frame, area: Rect) {
        let block = Block::default()
            .title("Confirm Action")
            .borders(Borders::ALL)
            .style(Style::default().bg(DARK_RED));

        let area = centered_rect(50, 30, area);
        f.render_widget(Clear, area);

        let action = self.confirm_action.as_ref().map(ConfirmAction::describe).unwrap_or_default();
        let text = vec![
            Line::from(""),
            Line::from(vec![Span::styled(
                "Are you sure you want to:",
                Style::default().add_modifier(Modifier::BOLD),
            )]),
            Line::from(action),
            Line::from(""),
            Line::from("This action cannot be undone."),
            Line::from(""),
            Line::from("Press 'y' to confirm, 'n' to cancel"),
        ];

        let paragraph = Paragraph::new(text)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });

        f.render_widget(paragraph, area);
    }

    /// Render the status bar at the bottom of the screen.
    fn render_status_bar(&mut self, f: &mut Frame, area: Rect) {
        let status_text = if !self.status_message.is_empty() {
            self.status_message.clone()
        } else if self.dash.store.error.is_some() {
            "Connection error".to_string()
        } else if self.search_active {
            format!("Search: {} (Esc to clear, Enter to confirm)", self.dash.filter.search)
        } else {
            match self.state {
                AppState::Dashboard => format!(
                    "{} | {} tasks | Press 'h' for help",
                    self.scope_name(),
                    self.filtered.len()
                ),
                AppState::TaskDetail => "Task Details".to_string(),
                AppState::TaskForm => "Task Form".to_string(),
                AppState::DeptForm => "Department Form".to_string(),
                AppState::Members => "Team Members".to_string(),
                AppState::Help => "Help".to_string(),
                AppState::Confirm => "Confirm Action".to_string(),
            }
        };

        let status = Paragraph::new(status_text)
            .style(Style::default().bg(ACCENT).fg(Color::White))
            .alignment(Alignment::Left);
        f.render_widget(status, area);
    }

    fn render_screen(&mut self, f: &mut Frame, area: Rect, state: AppState) {
        match state {
            AppState::Dashboard => self.render_dashboard(f, area),
            AppState::TaskDetail => {
                self.render_dashboard(f, area);
                self.render_detail(f, area);
            }
            AppState::TaskForm => {
                self.render_screen(f, area, self.form_return);
                self.render_task_form(f, area);
            }
            AppState::DeptForm => {
                self.render_dashboard(f, area);
                self.render_dept_form(f, area);
            }
            AppState::Members => {
                self.render_dashboard(f, area);
                self.render_members(f, area);
            }
            AppState::Help => self.render_help(f, area),
            AppState::Confirm => {
                self.render_screen(f, area, self.confirm_return);
                self.render_confirm(f, area);
            }
        }
    }

    /// Main render function that dispatches to appropriate view renderers.
    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
            .split(f.area());

        if self.dash.store.error.is_some() {
            self.render_error(f, chunks[0]);
        } else {
            self.render_screen(f, chunks[0], self.state);
        }
        self.render_status_bar(f, chunks[1]);
    }

    /// Main event loop for the TUI application.
    ///
    /// Applies sync results, renders, and processes input until the user
    /// exits, then tears down the change feed.
    pub fn run<B: TerminalBackend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        let result = loop {
            self.drain_sync_events();
            if let Err(e) = terminal.draw(|f| self.render(f)) {
                break Err(e);
            }
            match self.handle_input() {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            }
        };
        self.sync.shutdown();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use ratatui::backend::TestBackend;

    use crate::backend::Table;
    use crate::db::tests::snapshot;
    use crate::sync::tests::FakeBackend;

    async fn loaded_app() -> (Arc<FakeBackend>, App) {
        let fake = Arc::new(FakeBackend::default());
        *fake.snapshot.lock().unwrap() = snapshot();
        let mut app = App::new(fake.clone());
        for _ in 0..50 {
            app.drain_sync_events();
            if app.dash.store.has_loaded() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(app.dash.store.has_loaded());
        (fake, app)
    }

    fn press(app: &mut App, key: KeyCode) -> bool {
        app.handle_key(key, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    async fn wait_for_writes(fake: &FakeBackend, n: usize) -> Vec<WriteOp> {
        for _ in 0..50 {
            if fake.writes.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        fake.writes.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_create_task_from_form() {
        let (fake, mut app) = loaded_app().await;
        press(&mut app, KeyCode::Char('a'));
        assert_eq!(app.state, AppState::TaskForm);

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state, AppState::TaskForm, "empty title keeps the form open");
        assert!(app.status_message.contains("Title is required"));

        type_text(&mut app, "Write docs");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state, AppState::Dashboard);

        let writes = wait_for_writes(&fake, 1).await;
        match &writes[0] {
            WriteOp::Insert { table, payload } => {
                assert_eq!(*table, Table::Tasks);
                assert_eq!(payload["title"], "Write docs");
                assert_eq!(payload["dept_id"], "1");
            }
            other => panic!("unexpected write: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_filters_and_scope() {
        let (_fake, mut app) = loaded_app().await;
        assert_eq!(app.filtered.len(), 2);

        press(&mut app, KeyCode::Char('/'));
        type_text(&mut app, "hire");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.filtered, vec![Id::new("t2")]);

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.filtered.len(), 2);

        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.dash.filter.dept, Some(Id::new("2")));
        assert_eq!(app.filtered, vec![Id::new("t1")]);
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let (fake, mut app) = loaded_app().await;
        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.state, AppState::Confirm);
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.state, AppState::Dashboard);
        assert!(fake.writes.lock().unwrap().is_empty());

        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('y'));
        let writes = wait_for_writes(&fake, 1).await;
        assert_eq!(writes, vec![WriteOp::Delete { table: Table::Tasks, id: Id::new("t1") }]);
    }

    #[tokio::test]
    async fn test_detail_toggle_and_status_change() {
        let (fake, mut app) = loaded_app().await;
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state, AppState::TaskDetail);

        press(&mut app, KeyCode::Right);
        assert_eq!(app.dash.detail_task().unwrap().status, Status::InProgress);

        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char(' '));
        assert!(app.dash.detail_task().unwrap().subtasks[0].done);

        let writes = wait_for_writes(&fake, 2).await;
        assert_eq!(writes.len(), 2);
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.state, AppState::Dashboard);
        assert!(app.dash.detail.is_none());
    }

    #[tokio::test]
    async fn test_error_screen_and_retry() {
        let fake = Arc::new(FakeBackend::default());
        fake.fail_fetch.store(true, Ordering::SeqCst);
        let mut app = App::new(fake.clone());
        for _ in 0..50 {
            app.drain_sync_events();
            if app.dash.store.error.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(app.dash.store.error.is_some());

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(screen.contains("Connection Error"));

        // Only retry and quit are live on the error screen.
        assert!(!press(&mut app, KeyCode::Char('a')));
        assert_eq!(app.state, AppState::Dashboard);
        press(&mut app, KeyCode::Char('r'));
        assert!(fake.fetches.load(Ordering::SeqCst) >= 1);
        assert!(press(&mut app, KeyCode::Char('q')));
    }

    #[tokio::test]
    async fn test_failed_refetch_blocks_open_detail() {
        let (fake, mut app) = loaded_app().await;
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state, AppState::TaskDetail);

        fake.fail_fetch.store(true, Ordering::SeqCst);
        app.sync.refresh();
        for _ in 0..50 {
            app.drain_sync_events();
            if app.dash.store.error.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(app.dash.store.error.is_some());

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(screen.contains("Connection Error"));

        // Detail keys are inert while the error screen is up.
        press(&mut app, KeyCode::Char('e'));
        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.state, AppState::TaskDetail);
        assert!(fake.writes.lock().unwrap().is_empty());
        assert!(press(&mut app, KeyCode::Char('q')));
    }

    #[tokio::test]
    async fn test_every_screen_renders() {
        let (_fake, mut app) = loaded_app().await;
        let mut terminal = Terminal::new(TestBackend::new(140, 45)).unwrap();
        for key in [KeyCode::Char('2'), KeyCode::Char('3'), KeyCode::Char('1')] {
            press(&mut app, key);
            terminal.draw(|f| app.render(f)).unwrap();
        }
        press(&mut app, KeyCode::Enter);
        for _ in 0..3 {
            terminal.draw(|f| app.render(f)).unwrap();
            press(&mut app, KeyCode::Tab);
        }
        press(&mut app, KeyCode::Esc);
        for key in [KeyCode::Char('a'), KeyCode::Char('D'), KeyCode::Char('m'), KeyCode::Char('h')] {
            press(&mut app, key);
            terminal.draw(|f| app.render(f)).unwrap();
            press(&mut app, KeyCode::Esc);
        }
        assert_eq!(app.state, AppState::Dashboard);
    }
}
