//! Enumerations for TUI state management.

use crate::fields::Id;

/// Application state for the terminal user interface.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AppState {
    Dashboard,
    TaskDetail,
    TaskForm,
    DeptForm,
    Members,
    Help,
    Confirm,
}

/// Input mode for text entry fields.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum InputMode {
    None,
    Text,
}

/// Which dashboard pane receives navigation keys.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Focus {
    Sidebar,
    Tasks,
}

/// How the filtered tasks are laid out.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ViewMode {
    #[default]
    List,
    Board,
    Timeline,
}

impl ViewMode {
    pub const ALL: [ViewMode; 3] = [ViewMode::List, ViewMode::Board, ViewMode::Timeline];

    pub fn next(self) -> Self {
        match self {
            ViewMode::List => ViewMode::Board,
            ViewMode::Board => ViewMode::Timeline,
            ViewMode::Timeline => ViewMode::List,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewMode::List => "List",
            ViewMode::Board => "Board",
            ViewMode::Timeline => "Timeline",
        }
    }
}

/// Tabs of the task detail panel.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DetailTab {
    #[default]
    Details,
    Subtasks,
    Comments,
}

impl DetailTab {
    pub fn next(self) -> Self {
        match self {
            DetailTab::Details => DetailTab::Subtasks,
            DetailTab::Subtasks => DetailTab::Comments,
            DetailTab::Comments => DetailTab::Details,
        }
    }

    pub fn index(self) -> usize {
        match self {
            DetailTab::Details => 0,
            DetailTab::Subtasks => 1,
            DetailTab::Comments => 2,
        }
    }
}

/// Destructive action waiting for confirmation.
#[derive(Clone, PartialEq, Debug)]
pub enum ConfirmAction {
    DeleteTask { id: Id, title: String },
    DeleteDept { id: Id, name: String },
    DeleteMember { id: Id, name: String },
}

impl ConfirmAction {
    pub fn describe(&self) -> String {
        match self {
            ConfirmAction::DeleteTask { title, .. } => format!("Delete task '{}'", title),
            ConfirmAction::DeleteDept { name, .. } => format!("Delete department '{}'", name),
            ConfirmAction::DeleteMember { name, .. } => format!("Remove member '{}'", name),
        }
    }
}
