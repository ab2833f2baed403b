//! Renderers for the three task views.

use chrono::NaiveDate;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use crate::{
    db::{format_due_relative, format_priority, format_status, truncate, Store},
    fields::Id,
    member::initials,
    task::Task,
    tui::{
        colors::{hex, priority_color, status_color, ACCENT, MUTED, OVERDUE},
        enums::ViewMode,
        utils::percent_offset,
    },
    views::{board_columns, timeline_layout},
};

/// Everything a view needs to draw the filtered tasks.
pub struct ViewContext<'a> {
    pub tasks: &'a [&'a Task],
    pub store: &'a Store,
    pub selected: Option<&'a Id>,
    pub focused: bool,
    pub today: NaiveDate,
}

pub fn render(f: &mut Frame, area: Rect, view: ViewMode, ctx: &ViewContext, table_state: &mut TableState) {
    match view {
        ViewMode::List => render_list(f, area, ctx, table_state),
        ViewMode::Board => render_board(f, area, ctx),
        ViewMode::Timeline => render_timeline(f, area, ctx),
    }
}

fn border_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(ACCENT)
    } else {
        Style::default()
    }
}

fn tag_preview(task: &Task) -> String {
    let shown: Vec<&str> = task.tags.iter().take(2).map(String::as_str).collect();
    if shown.is_empty() {
        String::new()
    } else {
        format!(" [{}]", shown.join(","))
    }
}

fn subtask_summary(task: &Task) -> String {
    match task.subtask_progress() {
        (_, 0) => String::new(),
        (done, total) => format!(" ✓{}/{}", done, total),
    }
}

fn render_list(f: &mut Frame, area: Rect, ctx: &ViewContext, table_state: &mut TableState) {
    let header_cells = ["Task", "Department", "Status", "Priority", "Assignee", "Due"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells)
        .style(Style::default().bg(ACCENT).fg(Color::White))
        .height(1);

    let rows: Vec<Row> = ctx
        .tasks
        .iter()
        .map(|task| {
            let dept_color = hex(ctx.store.dept_color(task.dept_id.as_ref()));
            let title = Line::from(vec![
                Span::styled("● ", Style::default().fg(dept_color)),
                Span::raw(task.title.clone()),
                Span::styled(tag_preview(task), Style::default().fg(MUTED)),
                Span::styled(subtask_summary(task), Style::default().fg(MUTED)),
            ]);
            let assignee = match task.assignee.as_deref() {
                Some(name) if !name.is_empty() => format!("{} {}", initials(name), name),
                _ => "-".to_string(),
            };
            let overdue = task.due_date.is_some_and(|d| d < ctx.today)
                && task.status != crate::fields::Status::Completed;
            let due_style = if overdue { Style::default().fg(OVERDUE) } else { Style::default() };

            Row::new(vec![
                Cell::from(title),
                Cell::from(ctx.store.dept_name(task.dept_id.as_ref())),
                Cell::from(format_status(task.status)).style(Style::default().fg(status_color(task.status))),
                Cell::from(format_priority(task.priority))
                    .style(Style::default().fg(priority_color(task.priority))),
                Cell::from(assignee),
                Cell::from(format_due_relative(task.due_date, ctx.today)).style(due_style),
            ])
        })
        .collect();

    let widths = [
        Constraint::Min(30),    // Task
        Constraint::Length(22), // Department
        Constraint::Length(12), // Status
        Constraint::Length(9),  // Priority
        Constraint::Length(20), // Assignee
        Constraint::Length(10), // Due
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style(ctx.focused))
                .title(format!("Tasks ({})", ctx.tasks.len())),
        )
        .row_highlight_style(Style::default().bg(Color::Gray).fg(Color::Black))
        .highlight_symbol(">> ");

    f.render_stateful_widget(table, area, table_state);
}

fn render_board(f: &mut Frame, area: Rect, ctx: &ViewContext) {
    let columns = board_columns(ctx.tasks);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Ratio(1, columns.len() as u32); columns.len()])
        .split(area);

    for ((status, tasks), chunk) in columns.into_iter().zip(chunks.iter()) {
        let color = status_color(status);
        let mut lines: Vec<Line> = Vec::new();
        for task in &tasks {
            let selected = ctx.selected == Some(&task.id);
            let title_style = if selected {
                Style::default().bg(Color::Gray).fg(Color::Black).add_modifier(Modifier::BOLD)
            } else {
                Style::default().add_modifier(Modifier::BOLD)
            };
            let width = chunk.width.saturating_sub(4) as usize;
            lines.push(Line::from(vec![
                Span::styled("● ", Style::default().fg(hex(ctx.store.dept_color(task.dept_id.as_ref())))),
                Span::styled(truncate(&task.title, width.saturating_sub(2)), title_style),
            ]));
            let mut meta = vec![Span::styled(
                format_priority(task.priority),
                Style::default().fg(priority_color(task.priority)),
            )];
            if let Some(name) = task.assignee.as_deref().filter(|n| !n.is_empty()) {
                meta.push(Span::raw(format!("  {}", initials(name))));
            }
            if let Some(due) = task.due_date {
                meta.push(Span::styled(format!("  {}", due), Style::default().fg(MUTED)));
            }
            meta.push(Span::styled(subtask_summary(task), Style::default().fg(MUTED)));
            lines.push(Line::from(meta));
            lines.push(Line::from(""));
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(if ctx.focused { Style::default().fg(color) } else { Style::default() })
            .title(Span::styled(
                format!("{} ({})", format_status(status), tasks.len()),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ));
        f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), *chunk);
    }
}

fn render_timeline(f: &mut Frame, area: Rect, ctx: &ViewContext) {
    let layout = timeline_layout(ctx.tasks, ctx.today);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(ctx.focused))
        .title(format!("Timeline ({} day span)", layout.span_days));

    if layout.rows.is_empty() {
        let empty = Paragraph::new(vec![Line::from(""), Line::from("📅 No tasks with due dates")])
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    let inner_width = area.width.saturating_sub(2);
    let label_width: u16 = 12;
    let track_width = inner_width.saturating_sub(label_width);

    let mut lines: Vec<Line> = layout
        .rows
        .iter()
        .map(|row| {
            let color = if row.overdue {
                OVERDUE
            } else {
                hex(ctx.store.dept_color(row.task.dept_id.as_ref()))
            };
            let offset = percent_offset(row.position, track_width);
            let room = track_width.saturating_sub(offset).max(4) as usize;
            let mut bar_style = Style::default().bg(color).fg(Color::White);
            if ctx.selected == Some(&row.task.id) {
                bar_style = bar_style.add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
            }
            Line::from(vec![
                Span::styled(format!("{:>10}  ", row.due), Style::default().fg(MUTED)),
                Span::raw(" ".repeat(offset as usize)),
                Span::styled(format!(" {} ", truncate(&row.task.title, room.saturating_sub(2))), bar_style),
            ])
        })
        .collect();

    if layout.undated > 0 {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("{} task(s) without a due date", layout.undated),
            Style::default().fg(MUTED),
        )));
    }

    f.render_widget(Paragraph::new(lines).block(block), area);
}
