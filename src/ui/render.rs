use super::state::{DetailTab, Mode, StatusLevel, UiState};
use crate::manager::agents::AgentActivity;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use ratatui::Frame;

pub fn agent_label(state: &UiState, item: &crate::manager::Worktree) -> (&'static str, Color) {
    if item.agent_state == "n/a" {
        return ("n/a", Color::DarkGray);
    }
    match state.agent_states.get(&item.path) {
        Some(AgentActivity::Ready) => ("ready", Color::Green),
        Some(AgentActivity::Busy) => ("busy", Color::Yellow),
        Some(AgentActivity::Running) => ("run", Color::Cyan),
        Some(AgentActivity::Offline) | None => {
            if item.agent_state == "yes" {
                ("run", Color::Cyan)
            } else {
                ("no", Color::DarkGray)
            }
        }
    }
}

pub fn draw(frame: &mut Frame, state: &UiState, repo_name: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Percentage(40),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_header(frame, rows[0], state, repo_name);
    draw_table(frame, rows[1], state);
    draw_detail(frame, rows[2], state);
    draw_footer(frame, rows[3], state);

    if state.mode == Mode::ConfirmRemove {
        draw_confirm_remove(frame, state);
    }
}

fn draw_header(frame: &mut Frame, area: Rect, state: &UiState, repo_name: &str) {
    let header = Line::from(vec![
        Span::styled(
            format!(" sprout · {repo_name} "),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("({} worktrees)", state.items.len()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(header), area);
}

fn draw_table(frame: &mut Frame, area: Rect, state: &UiState) {
    let header = Row::new(vec!["CUR", "BRANCH", "STATUS", "TMUX", "AGENT", "PATH"]).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );

    let rows: Vec<Row> = state
        .items
        .iter()
        .map(|item| {
            let cur = if item.current { "*" } else { "" };
            let branch = if item.branch.is_empty() {
                "detached".to_string()
            } else {
                item.branch.clone()
            };
            let (status, status_color) = if item.dirty {
                ("dirty", Color::Yellow)
            } else {
                ("clean", Color::Green)
            };
            let (agent, agent_color) = agent_label(state, item);
            Row::new(vec![
                Cell::from(cur),
                Cell::from(branch),
                Cell::from(Span::styled(status, Style::default().fg(status_color))),
                Cell::from(item.tmux_state.clone()),
                Cell::from(Span::styled(agent, Style::default().fg(agent_color))),
                Cell::from(item.path.display().to_string()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Length(30),
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Min(20),
        ],
    )
    .header(header)
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
    .block(Block::default().borders(Borders::ALL).title(" worktrees "));

    let mut table_state = TableState::default();
    if !state.items.is_empty() {
        table_state.select(Some(state.selected));
    }
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn draw_detail(frame: &mut Frame, area: Rect, state: &UiState) {
    let title = match state.detail_tab {
        DetailTab::Agent => " agent │ diff  (tab to switch) ",
        DetailTab::Diff => " agent │ DIFF  (tab to switch) ",
    };

    match state.detail_tab {
        DetailTab::Agent => {
            let paragraph = Paragraph::new(state.detail_text.clone())
                .wrap(Wrap { trim: false })
                .block(Block::default().borders(Borders::ALL).title(title));
            frame.render_widget(paragraph, area);
        }
        DetailTab::Diff => {
            let halves = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Length(40), Constraint::Min(20)])
                .split(area);

            let file_lines: Vec<Line> = state
                .diff_files
                .iter()
                .enumerate()
                .map(|(idx, file)| {
                    let style = if idx == state.diff_selected {
                        Style::default().add_modifier(Modifier::REVERSED)
                    } else {
                        Style::default()
                    };
                    Line::from(Span::styled(
                        format!("{} {}", file.status, file.path),
                        style,
                    ))
                })
                .collect();
            let files = Paragraph::new(file_lines)
                .block(Block::default().borders(Borders::ALL).title(" files "));
            frame.render_widget(files, halves[0]);

            let patch = Paragraph::new(state.diff_patch.clone())
                .wrap(Wrap { trim: false })
                .block(Block::default().borders(Borders::ALL).title(title));
            frame.render_widget(patch, halves[1]);
        }
    }
}

fn draw_footer(frame: &mut Frame, area: Rect, state: &UiState) {
    let line = match &state.mode {
        Mode::NewBranchType => Line::from(format!(
            " new worktree type (feat|fix|chore|docs|refactor|test): {}_",
            state.new_branch_type
        )),
        Mode::NewBranchName => Line::from(format!(
            " new worktree name for {}/: {}_",
            state.new_branch_type, state.new_branch_name
        )),
        _ => {
            if let Some(label) = &state.busy_label {
                Line::from(Span::styled(
                    format!(" {label}"),
                    Style::default().fg(Color::Cyan),
                ))
            } else if let Some(status) = &state.status {
                let color = match status.level {
                    StatusLevel::Info => Color::Green,
                    StatusLevel::Warn => Color::Yellow,
                    StatusLevel::Error => Color::Red,
                };
                Line::from(Span::styled(
                    format!(" {}", status.message),
                    Style::default().fg(color),
                ))
            } else {
                Line::from(Span::styled(
                    " j/k move · enter go · l launch · a agent · s stop · d detach · n new · x remove · r refresh · q quit",
                    Style::default().fg(Color::DarkGray),
                ))
            }
        }
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_confirm_remove(frame: &mut Frame, state: &UiState) {
    let Some(item) = state.selected_item() else {
        return;
    };
    let area = centered_rect(60, 7, frame.area());
    frame.render_widget(Clear, area);

    let branch = item.branch_or_name();
    let dirty_note = if item.dirty {
        "\n(worktree is dirty; removal will be forced)"
    } else {
        ""
    };
    let text = format!(
        "Remove worktree {branch}?\n{}{dirty_note}\n\ny remove · n cancel",
        item.path.display()
    );
    let modal = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" remove "));
    frame.render_widget(modal, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width.saturating_sub(w)) / 2,
        y: area.y + (area.height.saturating_sub(h)) / 2,
        width: w,
        height: h,
    }
}
