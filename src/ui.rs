//! Frame rendering: status line, ranked process table, footer/prompt line.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Cell, Paragraph, Row, Table},
};

use crate::app::{App, InputMode};
use crate::proc::CounterSource;

const NAME_WIDTH: usize = 20;

pub fn ui<S: CounterSource>(f: &mut Frame, app: &App<S>) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    let status_line = format!(
        "ptop - refresh every {}s - sort by {} - [s] toggle sort  [k] kill PID  [q] quit",
        app.interval.as_secs(),
        app.sort_key.label(),
    );
    f.render_widget(
        Paragraph::new(status_line).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        root[0],
    );

    let header = Row::new(
        ["PID", "NAME", "CPU%", "MEM(MB)"]
            .into_iter()
            .map(Cell::from),
    )
    .style(
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );
    let rows = app.top_rows().iter().map(|p| {
        Row::new(vec![
            Cell::from(format!("{:<6}", p.pid)),
            Cell::from(format!("{:<NAME_WIDTH$}", trim_text(&p.name, NAME_WIDTH))),
            Cell::from(format!("{:>7.2}", p.cpu_percent)),
            Cell::from(format!("{:<8.1}", p.mem_mb)),
        ])
        .style(Style::default().fg(Color::Gray))
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(NAME_WIDTH as u16),
            Constraint::Length(8),
            Constraint::Length(8),
        ],
    )
    .header(header);
    f.render_widget(table, root[1]);

    let footer = match app.input_mode {
        InputMode::KillPrompt => format!("Enter PID to kill (SIGTERM): {}◄", app.kill_input),
        InputMode::Normal => app
            .status
            .clone()
            .unwrap_or_else(|| format!("{} processes", app.samples.len())),
    };
    f.render_widget(
        Paragraph::new(footer).style(Style::default().fg(Color::DarkGray)),
        root[2],
    );
}

fn trim_text(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars();
    let out: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        let mut truncated: String = out.chars().take(max_chars.saturating_sub(2)).collect();
        truncated.push_str("..");
        truncated
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_keeps_short_names_intact() {
        assert_eq!(trim_text("bash", 20), "bash");
    }

    #[test]
    fn trim_caps_long_names_at_the_column_width() {
        let trimmed = trim_text("a-very-long-process-name-indeed", 20);
        assert_eq!(trimmed.chars().count(), 20);
        assert!(trimmed.ends_with(".."));
    }
}
