//! Task form handling for the terminal user interface.
//!
//! The form mirrors a `TaskDraft`: text fields are `InputField`s, closed
//! choices are selectors cycled with Left/Right.

use crate::{
    crud::TaskDraft,
    department::{department_options, Department},
    fields::{Id, Priority, Recurrence, Status},
    member::Member,
    tui::input::InputField,
};

/// Global order constants for the task form fields.
pub const TITLE_GLOBAL_ORDER: usize = 0;
pub const DESCRIPTION_GLOBAL_ORDER: usize = 1;
pub const DEPT_SELECTOR_GLOBAL_ORDER: usize = 2;
pub const STATUS_GLOBAL_ORDER: usize = 3;
pub const PRIORITY_GLOBAL_ORDER: usize = 4;
pub const ASSIGNEE_SELECTOR_GLOBAL_ORDER: usize = 5;
pub const DUE_GLOBAL_ORDER: usize = 6;
pub const RECURRENCE_GLOBAL_ORDER: usize = 7;
pub const TAGS_GLOBAL_ORDER: usize = 8;

const FIELD_COUNT: usize = 9;

fn cycle(index: usize, len: usize, right: bool) -> usize {
    if len == 0 {
        0
    } else if right {
        (index + 1) % len
    } else if index == 0 {
        len - 1
    } else {
        index - 1
    }
}

/// Task form for editing fields
#[derive(Clone, Debug)]
pub struct TaskForm {
    pub title: InputField,
    pub description: InputField,
    pub due: InputField,
    pub tags: InputField,
    /// `(None, "No department")` followed by the department tree.
    pub departments: Vec<(Option<Id>, String)>,
    pub department: usize,
    /// `""` is "Unassigned".
    pub assignees: Vec<String>,
    pub assignee: usize,
    pub status: usize,
    pub priority: usize,
    pub recurrence: usize,
    pub current_field: usize,
}

impl TaskForm {
    /// Build the form from a draft. Selector options come from the loaded
    /// departments and members; a deleted department or an assignee who is
    /// not a member stays selectable.
    pub fn from_draft(draft: &TaskDraft, depts: &[Department], members: &[Member]) -> Self {
        let mut departments: Vec<(Option<Id>, String)> = vec![(None, "No department".to_string())];
        departments.extend(
            department_options(depts)
                .into_iter()
                .map(|(id, label)| (Some(id), label)),
        );
        if draft.dept_id.is_some() && !departments.iter().any(|(id, _)| *id == draft.dept_id) {
            departments.push((draft.dept_id.clone(), "Unknown".to_string()));
        }
        let department = departments
            .iter()
            .position(|(id, _)| *id == draft.dept_id)
            .unwrap_or(0);

        let mut assignees: Vec<String> = vec![String::new()];
        assignees.extend(members.iter().map(|m| m.name.clone()));
        let current = draft.assignee.trim();
        if !current.is_empty() && !assignees.iter().any(|a| a == current) {
            assignees.push(current.to_string());
        }
        let assignee = assignees.iter().position(|a| a == current).unwrap_or(0);

        let mut form = TaskForm {
            title: InputField::with_value(&draft.title),
            description: InputField::with_value(&draft.description),
            due: InputField::with_value(&draft.due_date),
            tags: InputField::with_value(&draft.tags),
            departments,
            department,
            assignees,
            assignee,
            status: Status::ALL.iter().position(|&s| s == draft.status).unwrap_or(0),
            priority: Priority::ALL.iter().position(|&p| p == draft.priority).unwrap_or(2),
            recurrence: Recurrence::ALL
                .iter()
                .position(|&r| r == draft.recurrence)
                .unwrap_or(0),
            current_field: TITLE_GLOBAL_ORDER,
        };
        form.update_active_field();
        form
    }

    /// Read the form back into a draft.
    pub fn to_draft(&self) -> TaskDraft {
        TaskDraft {
            title: self.title.value.clone(),
            description: self.description.value.clone(),
            dept_id: self.departments.get(self.department).and_then(|(id, _)| id.clone()),
            status: Status::ALL[self.status % Status::ALL.len()],
            priority: Priority::ALL[self.priority % Priority::ALL.len()],
            assignee: self.assignees.get(self.assignee).cloned().unwrap_or_default(),
            due_date: self.due.value.clone(),
            recurrence: Recurrence::ALL[self.recurrence % Recurrence::ALL.len()],
            tags: self.tags.value.clone(),
        }
    }

    pub fn department_label(&self) -> &str {
        self.departments
            .get(self.department)
            .map(|(_, label)| label.trim_start())
            .unwrap_or("No department")
    }

    pub fn assignee_label(&self) -> &str {
        match self.assignees.get(self.assignee).map(String::as_str) {
            None | Some("") => "Unassigned",
            Some(name) => name,
        }
    }

    /// The text field under the cursor, if the current field is one.
    pub fn active_input(&mut self) -> Option<&mut InputField> {
        match self.current_field {
            TITLE_GLOBAL_ORDER => Some(&mut self.title),
            DESCRIPTION_GLOBAL_ORDER => Some(&mut self.description),
            DUE_GLOBAL_ORDER => Some(&mut self.due),
            TAGS_GLOBAL_ORDER => Some(&mut self.tags),
            _ => None,
        }
    }

    pub fn next_field(&mut self) {
        self.current_field = (self.current_field + 1) % FIELD_COUNT;
        self.update_active_field();
    }

    pub fn prev_field(&mut self) {
        self.current_field = cycle(self.current_field, FIELD_COUNT, false);
        self.update_active_field();
    }

    /// Update which field is currently active for editing.
    pub fn update_active_field(&mut self) {
        for field in [&mut self.title, &mut self.description, &mut self.due, &mut self.tags] {
            field.active = false;
        }
        if let Some(field) = self.active_input() {
            field.active = true;
        }
    }

    pub fn handle_char(&mut self, c: char) {
        if let Some(field) = self.active_input() {
            field.handle_char(c);
        }
    }

    pub fn handle_backspace(&mut self) {
        if let Some(field) = self.active_input() {
            field.handle_backspace();
        }
    }

    pub fn handle_delete(&mut self) {
        if let Some(field) = self.active_input() {
            field.handle_delete();
        }
    }

    /// Move the cursor of a text field, or cycle a selector.
    pub fn handle_left_right(&mut self, right: bool) {
        match self.current_field {
            DEPT_SELECTOR_GLOBAL_ORDER => {
                self.department = cycle(self.department, self.departments.len(), right)
            }
            STATUS_GLOBAL_ORDER => self.status = cycle(self.status, Status::ALL.len(), right),
            PRIORITY_GLOBAL_ORDER => {
                self.priority = cycle(self.priority, Priority::ALL.len(), right)
            }
            ASSIGNEE_SELECTOR_GLOBAL_ORDER => {
                self.assignee = cycle(self.assignee, self.assignees.len(), right)
            }
            RECURRENCE_GLOBAL_ORDER => {
                self.recurrence = cycle(self.recurrence, Recurrence::ALL.len(), right)
            }
            _ => {
                if let Some(field) = self.active_input() {
                    if right {
                        field.move_cursor_right()
                    } else {
                        field.move_cursor_left()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::department::tests::dept;

    fn members() -> Vec<Member> {
        vec![
            Member { id: Id::new("m1"), name: "Ada Lovelace".into() },
            Member { id: Id::new("m2"), name: "Grace Hopper".into() },
        ]
    }

    #[test]
    fn test_form_round_trips_draft() {
        let depts = vec![dept("1", "Engineering", None), dept("2", "Backend", Some("1"))];
        let draft = TaskDraft {
            title: "Ship".into(),
            dept_id: Some(Id::new("2")),
            status: Status::Review,
            priority: Priority::Low,
            assignee: "Grace Hopper".into(),
            recurrence: Recurrence::Monthly,
            tags: "a, b".into(),
            ..TaskDraft::default()
        };
        let form = TaskForm::from_draft(&draft, &depts, &members());
        assert_eq!(form.department_label(), "└ Backend");
        assert_eq!(form.assignee_label(), "Grace Hopper");
        assert_eq!(form.to_draft(), draft);
    }

    #[test]
    fn test_selectors_cycle_and_unknown_assignee_is_kept() {
        let draft = TaskDraft { assignee: "Contractor".into(), ..TaskDraft::default() };
        let mut form = TaskForm::from_draft(&draft, &[], &members());
        assert_eq!(form.assignees.len(), 4);
        assert_eq!(form.assignee_label(), "Contractor");

        form.current_field = ASSIGNEE_SELECTOR_GLOBAL_ORDER;
        form.handle_left_right(true);
        assert_eq!(form.assignee_label(), "Unassigned");
        assert_eq!(form.to_draft().assignee, "");

        form.current_field = STATUS_GLOBAL_ORDER;
        form.handle_left_right(false);
        assert_eq!(form.to_draft().status, Status::Blocked);
    }

    #[test]
    fn test_deleted_department_is_kept_on_save() {
        let depts = vec![dept("1", "Engineering", None)];
        let draft = TaskDraft {
            title: "Old".into(),
            dept_id: Some(Id::new("99")),
            ..TaskDraft::default()
        };
        let mut form = TaskForm::from_draft(&draft, &depts, &[]);
        assert_eq!(form.department_label(), "Unknown");
        form.handle_char('!');

        let payload = form.to_draft().payload().unwrap();
        assert_eq!(payload["title"], "Old!");
        assert_eq!(payload["dept_id"], "99");
    }

    #[test]
    fn test_typing_goes_to_active_text_field() {
        let mut form = TaskForm::from_draft(&TaskDraft::default(), &[], &[]);
        assert!(form.title.active);
        form.handle_char('x');
        form.prev_field();
        assert_eq!(form.current_field, TAGS_GLOBAL_ORDER);
        assert!(form.tags.active && !form.title.active);
        form.handle_char('t');
        form.next_field();
        form.next_field();
        form.next_field();
        // On the department selector typing does nothing
        form.handle_char('z');
        let draft = form.to_draft();
        assert_eq!(draft.title, "x");
        assert_eq!(draft.tags, "t");
        assert_eq!(draft.description, "");
    }
}
