//! Layout helpers.

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// A rectangle of `percent_x` by `percent_y` centred in `r`.
pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Column offset of a position given in percent of `width`.
pub fn percent_offset(percent: f64, width: u16) -> u16 {
    let offset = (percent.clamp(0.0, 100.0) / 100.0 * f64::from(width)).floor() as u16;
    offset.min(width.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_rect_is_inside() {
        let outer = Rect::new(0, 0, 100, 50);
        let inner = centered_rect(50, 50, outer);
        assert_eq!(inner.width, 50);
        assert_eq!(inner.x, 25);
        assert!(inner.y >= 12 && inner.bottom() <= 38);
    }

    #[test]
    fn test_percent_offset() {
        assert_eq!(percent_offset(0.0, 80), 0);
        assert_eq!(percent_offset(27.0, 100), 27);
        assert_eq!(percent_offset(100.0, 80), 79);
    }
}
