//! Department form.
//!
//! Sub-departments show no icon, so their form skips that field and
//! carries the stored one through unchanged.

use crate::{
    crud::DeptDraft,
    fields::{Id, PALETTE},
    tui::input::InputField,
};

pub const NAME_GLOBAL_ORDER: usize = 0;
pub const ICON_GLOBAL_ORDER: usize = 1;
pub const COLOR_GLOBAL_ORDER: usize = 2;

#[derive(Clone, Debug)]
pub struct DeptForm {
    pub name: InputField,
    pub icon: InputField,
    /// Index into `PALETTE`.
    pub color: usize,
    /// Colour outside the palette, kept until the user picks another.
    pub custom_color: Option<String>,
    pub parent_id: Option<Id>,
    pub current_field: usize,
}

impl DeptForm {
    pub fn from_draft(draft: &DeptDraft) -> Self {
        let position = PALETTE.iter().position(|c| c.eq_ignore_ascii_case(&draft.color));
        let mut form = DeptForm {
            name: InputField::with_value(&draft.name),
            icon: InputField::with_value(&draft.icon),
            color: position.unwrap_or(0),
            custom_color: position.is_none().then(|| draft.color.clone()),
            parent_id: draft.parent_id.clone(),
            current_field: NAME_GLOBAL_ORDER,
        };
        form.update_active_field();
        form
    }

    pub fn to_draft(&self) -> DeptDraft {
        DeptDraft {
            name: self.name.value.clone(),
            color: self.color_value().to_string(),
            icon: self.icon.value.clone(),
            parent_id: self.parent_id.clone(),
        }
    }

    pub fn is_sub_department(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn color_value(&self) -> &str {
        match &self.custom_color {
            Some(custom) => custom,
            None => PALETTE[self.color % PALETTE.len()],
        }
    }

    fn fields(&self) -> &'static [usize] {
        if self.is_sub_department() {
            &[NAME_GLOBAL_ORDER, COLOR_GLOBAL_ORDER]
        } else {
            &[NAME_GLOBAL_ORDER, ICON_GLOBAL_ORDER, COLOR_GLOBAL_ORDER]
        }
    }

    fn step(&mut self, forward: bool) {
        let fields = self.fields();
        let at = fields.iter().position(|&f| f == self.current_field).unwrap_or(0);
        let next = if forward {
            (at + 1) % fields.len()
        } else {
            (at + fields.len() - 1) % fields.len()
        };
        self.current_field = fields[next];
        self.update_active_field();
    }

    pub fn next_field(&mut self) {
        self.step(true);
    }

    pub fn prev_field(&mut self) {
        self.step(false);
    }

    pub fn update_active_field(&mut self) {
        self.name.active = self.current_field == NAME_GLOBAL_ORDER;
        self.icon.active = self.current_field == ICON_GLOBAL_ORDER;
    }

    pub fn active_input(&mut self) -> Option<&mut InputField> {
        match self.current_field {
            NAME_GLOBAL_ORDER => Some(&mut self.name),
            ICON_GLOBAL_ORDER => Some(&mut self.icon),
            _ => None,
        }
    }

    pub fn handle_left_right(&mut self, right: bool) {
        if self.current_field == COLOR_GLOBAL_ORDER {
            self.custom_color = None;
            let len = PALETTE.len();
            self.color = if right { (self.color + 1) % len } else { (self.color + len - 1) % len };
        } else if let Some(field) = self.active_input() {
            if right {
                field.move_cursor_right();
            } else {
                field.move_cursor_left();
            }
        }
    }
}
