//! Color constants and conversions for the terminal user interface.

use ratatui::style::Color;

use crate::fields::{Priority, Status, FALLBACK_COLOR};

/// Accent used for focus borders and the header.
pub const ACCENT: Color = Color::Rgb(99, 102, 241);
/// Overdue markers on the timeline.
pub const OVERDUE: Color = Color::Rgb(244, 63, 94);
/// Background of the confirm dialog.
pub const DARK_RED: Color = Color::Rgb(114, 0, 0);
pub const MUTED: Color = Color::Rgb(100, 116, 139);

/// Parse `#rrggbb`; anything else maps to the neutral fallback.
pub fn hex(color: &str) -> Color {
    parse_hex(color)
        .or_else(|| parse_hex(FALLBACK_COLOR))
        .unwrap_or(Color::Gray)
}

fn parse_hex(color: &str) -> Option<Color> {
    let digits = color.trim().strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
}

pub fn status_color(status: Status) -> Color {
    match status {
        Status::NotStarted => Color::Rgb(100, 116, 139),
        Status::InProgress => Color::Rgb(59, 130, 246),
        Status::Review => Color::Rgb(168, 85, 247),
        Status::Completed => Color::Rgb(34, 197, 94),
        Status::Blocked => Color::Rgb(244, 63, 94),
    }
}

pub fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::Critical => Color::Rgb(244, 63, 94),
        Priority::High => Color::Rgb(249, 115, 22),
        Priority::Medium => Color::Rgb(234, 179, 8),
        Priority::Low => Color::Rgb(99, 102, 241),
    }
}

/// Avatar background for a hue, at 60% saturation and 50% lightness.
pub fn avatar_color(hue: u16) -> Color {
    let (s, l) = (0.6_f64, 0.5_f64);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let h = f64::from(hue % 360) / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u16 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_u8 = |v: f64| ((v + m) * 255.0).round() as u8;
    Color::Rgb(to_u8(r), to_u8(g), to_u8(b))
}
