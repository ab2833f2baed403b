//! Departments and their one-level hierarchy.
//!
//! Top-level departments may own sub-departments; sub-departments never own
//! anything. Tasks point at a department by id only, so every lookup here
//! must cope with ids that no longer resolve.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fields::{Id, DEFAULT_DEPT_ICON, FALLBACK_COLOR, PALETTE};

/// A named grouping of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: Id,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Id>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_color() -> String {
    PALETTE[0].to_string()
}

impl Department {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn icon(&self) -> &str {
        self.icon
            .as_deref()
            .filter(|i| !i.trim().is_empty())
            .unwrap_or(DEFAULT_DEPT_ICON)
    }
}

pub fn find<'a>(depts: &'a [Department], id: &Id) -> Option<&'a Department> {
    depts.iter().find(|d| &d.id == id)
}

/// Departments without a parent, in backend order.
pub fn top_level(depts: &[Department]) -> Vec<&Department> {
    depts.iter().filter(|d| d.is_top_level()).collect()
}

/// Direct sub-departments of `parent`.
pub fn children<'a>(depts: &'a [Department], parent: &Id) -> Vec<&'a Department> {
    depts
        .iter()
        .filter(|d| d.parent_id.as_ref() == Some(parent))
        .collect()
}

/// `"Parent › Child"` for sub-departments, the plain name for top-level ones,
/// `"Unknown"` when the id does not resolve.
pub fn display_name(depts: &[Department], id: &Id) -> String {
    let Some(dept) = find(depts, id) else {
        return "Unknown".to_string();
    };
    match dept.parent_id.as_ref().and_then(|pid| find(depts, pid)) {
        Some(parent) => format!("{} › {}", parent.name, dept.name),
        None => dept.name.clone(),
    }
}

/// Display name for an optional department reference.
pub fn display_name_opt(depts: &[Department], id: Option<&Id>) -> String {
    match id {
        Some(id) => display_name(depts, id),
        None => "Unknown".to_string(),
    }
}

/// Colour of the department, or the neutral fallback.
pub fn color_of<'a>(depts: &'a [Department], id: Option<&Id>) -> &'a str {
    id.and_then(|id| find(depts, id))
        .map(|d| d.color.as_str())
        .unwrap_or(FALLBACK_COLOR)
}

/// Colour offered to a new department: the palette, cycled by department count.
pub fn next_color(depts: &[Department]) -> &'static str {
    PALETTE[depts.len() % PALETTE.len()]
}

/// Selector entries: each top-level department followed by its sub-departments.
pub fn department_options(depts: &[Department]) -> Vec<(Id, String)> {
    let mut options = Vec::new();
    for top in top_level(depts) {
        options.push((top.id.clone(), top.name.clone()));
        for sub in children(depts, &top.id) {
            options.push((sub.id.clone(), format!("  └ {}", sub.name)));
        }
    }
    options
}

/// Resolve a department given by id, name or `"Parent › Child"` display name.
pub fn resolve_department(identifier: &str, depts: &[Department]) -> Result<Id> {
    let wanted = identifier.trim();
    if let Some(dept) = depts.iter().find(|d| d.id.as_str() == wanted) {
        return Ok(dept.id.clone());
    }

    let lowered = wanted.to_lowercase();
    let matches: Vec<&Department> = depts
        .iter()
        .filter(|d| {
            d.name.to_lowercase() == lowered
                || display_name(depts, &d.id).to_lowercase() == lowered
        })
        .collect();

    match matches.len() {
        0 => Err(Error::NotFound(format!("No department found with name '{}'", wanted))),
        1 => Ok(matches[0].id.clone()),
        _ => {
            let mut msg = format!("Multiple departments named '{}':\n", wanted);
            for d in matches {
                msg.push_str(&format!("  {}: {}\n", d.id, display_name(depts, &d.id)));
            }
            msg.push_str("Please use the id or the full 'Parent › Child' name instead.");
            Err(Error::NotFound(msg))
        }
    }
}
