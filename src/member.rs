//! Team members and their avatars.

use serde::{Deserialize, Serialize};

use crate::fields::Id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: Id,
    pub name: String,
}

/// Up to two upper-case initials, `"?"` for an empty name.
pub fn initials(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .filter_map(|part| part.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect();
    if initials.is_empty() {
        "?".to_string()
    } else {
        initials
    }
}

/// Avatar hue in degrees, derived from the first character.
pub fn avatar_hue(name: &str) -> u16 {
    match name.chars().next() {
        Some(c) => ((c as u32 * 37) % 360) as u16,
        None => 200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initials() {
        assert_eq!(initials("Ada Lovelace"), "AL");
        assert_eq!(initials("grace brewster murray hopper"), "GB");
        assert_eq!(initials("Linus"), "L");
        assert_eq!(initials("   "), "?");
    }

    #[test]
    fn test_avatar_hue() {
        // 'A' is 65: 65 * 37 = 2405, 2405 % 360 = 245
        assert_eq!(avatar_hue("Ada"), 245);
        assert_eq!(avatar_hue(""), 200);
    }
}
