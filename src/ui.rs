use crate::{
    app::{Action, App, AppView, Interaction, LogLevel},
    config::{ConfigStore, PathConfig, PathPrompt},
    game,
    progress::ProgressSink,
};
use anyhow::Result;
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{
        Block, BorderType, Borders, Clear, Gauge, List, ListItem, ListState, Padding, Paragraph,
        Wrap,
    },
};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

const MENU_WIDTH: u16 = 28;

#[derive(Clone)]
struct Theme {
    accent: Color,
    accent_soft: Color,
    border: Color,
    text: Color,
    muted: Color,
    success: Color,
    warning: Color,
    error: Color,
    header_bg: Color,
    log_bg: Color,
}

impl Theme {
    fn new() -> Self {
        Self {
            accent: Color::Rgb(255, 150, 200),
            accent_soft: Color::Rgb(150, 95, 170),
            border: Color::Rgb(70, 70, 95),
            text: Color::Rgb(225, 225, 240),
            muted: Color::Rgb(140, 140, 160),
            success: Color::Rgb(120, 220, 140),
            warning: Color::Rgb(230, 200, 120),
            error: Color::Rgb(235, 100, 95),
            header_bg: Color::Rgb(26, 22, 36),
            log_bg: Color::Rgb(18, 16, 26),
        }
    }

    fn block(&self, title: &'static str) -> Block<'static> {
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.border))
            .title(Span::styled(
                title,
                Style::default()
                    .fg(self.accent)
                    .add_modifier(Modifier::BOLD),
            ))
    }

    fn panel(&self, title: &'static str) -> Block<'static> {
        self.block(title).padding(Padding {
            left: 1,
            right: 1,
            top: 0,
            bottom: 0,
        })
    }
}

#[derive(Debug, Clone)]
struct PromptState {
    title: String,
    buffer: String,
}

/// Terminal-backed prompts and progress. Long operations run on the UI
/// thread, so every progress report repaints the screen inline.
struct Session<'a, B: Backend> {
    terminal: &'a mut Terminal<B>,
    view: AppView,
    prompt: Option<PromptState>,
}

impl<'a, B: Backend> Session<'a, B> {
    fn new(terminal: &'a mut Terminal<B>) -> Self {
        Self {
            terminal,
            view: AppView {
                status: "Select the game folder to continue.".to_string(),
                ..AppView::default()
            },
            prompt: None,
        }
    }

    fn draw(&mut self) -> io::Result<()> {
        let view = &self.view;
        let prompt = self.prompt.as_ref();
        self.terminal.draw(|frame| draw(frame, view, prompt))?;
        Ok(())
    }

    fn redraw(&mut self) {
        if let Err(err) = self.draw() {
            log::debug!("redraw failed: {err}");
        }
    }

    /// Blocks on a modal text prompt. `None` when cancelled or left empty.
    fn ask(&mut self, title: &str) -> io::Result<Option<String>> {
        self.prompt = Some(PromptState {
            title: title.to_string(),
            buffer: String::new(),
        });
        let answer = self.prompt_loop();
        self.prompt = None;
        self.redraw();
        answer
    }

    fn prompt_loop(&mut self) -> io::Result<Option<String>> {
        loop {
            self.draw()?;
            let Some(prompt) = self.prompt.as_mut() else {
                return Ok(None);
            };
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Esc => return Ok(None),
                    KeyCode::Enter => {
                        let value = prompt.buffer.trim().to_string();
                        return Ok((!value.is_empty()).then_some(value));
                    }
                    KeyCode::Backspace => {
                        prompt.buffer.pop();
                    }
                    KeyCode::Char(c) => {
                        if key.modifiers.contains(KeyModifiers::CONTROL)
                            || key.modifiers.contains(KeyModifiers::ALT)
                        {
                            continue;
                        }
                        prompt.buffer.push(c);
                    }
                    _ => {}
                },
                Event::Paste(text) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        if !prompt.buffer.is_empty() {
                            prompt.buffer.push(' ');
                        }
                        prompt.buffer.push_str(trimmed);
                    }
                }
                _ => {}
            }
        }
    }

    fn ask_path(&mut self, title: &str) -> io::Result<Option<PathBuf>> {
        let Some(answer) = self.ask(title)? else {
            return Ok(None);
        };
        Ok(parse_drop_paths(&answer).into_iter().next().map(PathBuf::from))
    }
}

impl<B: Backend> PathPrompt for Session<'_, B> {
    fn select_directory(&mut self, title: &str) -> io::Result<Option<PathBuf>> {
        self.ask_path(title)
    }
}

impl<B: Backend> ProgressSink for Session<'_, B> {
    fn report(&mut self, status: &str, percent: f32) {
        self.view.status = status.to_string();
        self.view.progress = percent;
        self.redraw();
    }
}

impl<B: Backend> Interaction for Session<'_, B> {
    fn select_file(&mut self, title: &str) -> io::Result<Option<PathBuf>> {
        self.ask_path(title)
    }

    fn select_files(&mut self, title: &str) -> io::Result<Option<Vec<PathBuf>>> {
        let title = format!("{title} (space separated, quote paths with spaces)");
        let Some(answer) = self.ask(&title)? else {
            return Ok(None);
        };
        let paths: Vec<PathBuf> = parse_drop_paths(&answer)
            .into_iter()
            .map(PathBuf::from)
            .collect();
        Ok((!paths.is_empty()).then_some(paths))
    }

    fn refresh(&mut self, view: AppView) {
        self.view = view;
        self.redraw();
    }
}

pub fn run(
    paths: PathConfig<Box<dyn ConfigStore>>,
    log_path: Option<PathBuf>,
    startup_file: Option<PathBuf>,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_session(&mut terminal, paths, log_path, startup_file);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableBracketedPaste, LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_session(
    terminal: &mut Terminal<impl Backend>,
    paths: PathConfig<Box<dyn ConfigStore>>,
    log_path: Option<PathBuf>,
    startup_file: Option<PathBuf>,
) -> Result<()> {
    let mut session = Session::new(terminal);
    let mut app = App::initialize(paths, &mut session, log_path)?;
    if let Some(path) = startup_file {
        app.log_info(format!("Auto-applying {}", path.display()));
        app.apply_file(path, &mut session);
    }
    run_loop(&mut session, &mut app)
}

fn run_loop<B: Backend>(session: &mut Session<'_, B>, app: &mut App) -> Result<()> {
    loop {
        session.view = app.view();
        session.draw()?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(200))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    handle_key(session, app, key);
                }
                Event::Paste(text) => handle_paste(session, app, &text),
                _ => {}
            }
        }
    }

    Ok(())
}

fn handle_key<B: Backend>(session: &mut Session<'_, B>, app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }
    match key.code {
        KeyCode::Up => app.move_selection(-1),
        KeyCode::Down | KeyCode::Tab => app.move_selection(1),
        KeyCode::Home => app.selected = 0,
        KeyCode::End => app.selected = Action::ALL.len() - 1,
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Enter => {
            let action = app.selected_action();
            app.run_action(action, session);
        }
        KeyCode::Char(c) => {
            if let Some(action) = Action::from_hotkey(c) {
                app.select(action);
                app.run_action(action, session);
            }
        }
        _ => {}
    }
}

/// A mod or modpack dropped onto the main screen is applied right away.
fn handle_paste<B: Backend>(session: &mut Session<'_, B>, app: &mut App, text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    app.log_info(format!("Drop received: {}", preview_drop(trimmed)));

    let paths = parse_drop_paths(trimmed);
    let mut applied = false;
    for path in paths.into_iter().map(PathBuf::from) {
        if game::is_mod_archive_path(&path) || game::is_modpack_path(&path) {
            app.apply_file(path, session);
            applied = true;
        } else {
            app.log_warn(format!("Ignored drop: {}", path.display()));
        }
    }
    if !applied {
        app.status = "Drop contained no mod files".to_string();
    }
}

fn preview_drop(text: &str) -> String {
    let mut preview = text.replace(['\n', '\r'], " ");
    preview = preview.trim().to_string();
    if preview.chars().count() > 120 {
        preview = preview.chars().take(120).collect();
        preview.push_str("...");
    }
    preview
}

fn parse_drop_paths(text: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(path) = normalize_line_path(line) {
            paths.push(path);
            continue;
        }
        for part in split_shell_like(line) {
            let normalized = normalize_drop_path(&strip_quotes(&part));
            if !normalized.is_empty() {
                paths.push(normalized);
            }
        }
    }
    paths
}

/// A whole line that already names an existing path wins over splitting it
/// on whitespace.
fn normalize_line_path(line: &str) -> Option<String> {
    let normalized = normalize_drop_path(&strip_quotes(line));
    if normalized.is_empty() || !Path::new(&normalized).exists() {
        return None;
    }
    Some(normalized)
}

fn split_shell_like(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if !in_single => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            c if c.is_whitespace() && !in_single && !in_double => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn strip_quotes(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}

fn normalize_drop_path(value: &str) -> String {
    let trimmed = value.trim();
    let path = match trimmed.strip_prefix("file://") {
        Some(rest) => rest.trim_start_matches("localhost").to_string(),
        None => trimmed.to_string(),
    };
    if path.contains('%') {
        percent_decode(&path)
    } else {
        path
    }
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            let pair = (from_hex(bytes[index + 1]), from_hex(bytes[index + 2]));
            if let (Some(hi), Some(lo)) = pair {
                out.push(hi << 4 | lo);
                index += 3;
                continue;
            }
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn from_hex(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn draw(frame: &mut Frame<'_>, view: &AppView, prompt: Option<&PromptState>) {
    let area = frame.size();
    let theme = Theme::new();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(9),
            Constraint::Length(8),
        ])
        .split(area);

    frame.render_widget(header(view, &theme), chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(MENU_WIDTH), Constraint::Min(20)])
        .split(chunks[1]);
    draw_menu(frame, view, &theme, body[0]);
    draw_activity(frame, view, &theme, body[1]);

    let log_block = theme.panel("Log").style(Style::default().bg(theme.log_bg));
    let log_inner = log_block.inner(chunks[2]);
    let log = Paragraph::new(build_log_lines(view, &theme, log_inner.height as usize))
        .style(Style::default().fg(theme.text).bg(theme.log_bg))
        .block(log_block);
    frame.render_widget(log, chunks[2]);

    if let Some(prompt) = prompt {
        draw_prompt(frame, prompt, &theme);
    }
}

fn header(view: &AppView, theme: &Theme) -> Paragraph<'static> {
    let game_root = if view.game_root.is_empty() {
        "(not set)".to_string()
    } else {
        view.game_root.clone()
    };
    let (backup_label, backup_color) = if view.backup_present {
        ("present", theme.success)
    } else {
        ("none yet", theme.muted)
    };
    Paragraph::new(vec![
        Line::from(vec![
            Span::styled(
                "Rainbow Modloader",
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(game::GAME_NAME, Style::default().fg(theme.text)),
        ]),
        Line::from(vec![
            Span::styled("Game: ", Style::default().fg(theme.muted)),
            Span::styled(game_root, Style::default().fg(theme.text)),
            Span::raw("   "),
            Span::styled("Backup: ", Style::default().fg(theme.muted)),
            Span::styled(backup_label, Style::default().fg(backup_color)),
        ]),
    ])
    .style(Style::default().bg(theme.header_bg))
    .alignment(Alignment::Center)
}

fn draw_menu(frame: &mut Frame<'_>, view: &AppView, theme: &Theme, area: Rect) {
    let item_style = if view.busy {
        Style::default().fg(theme.muted).add_modifier(Modifier::DIM)
    } else {
        Style::default().fg(theme.text)
    };
    let items: Vec<ListItem> = Action::ALL
        .iter()
        .map(|action| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("[{}] ", action.hotkey()),
                    Style::default().fg(theme.muted),
                ),
                Span::styled(action.label(), item_style),
            ]))
        })
        .collect();
    let highlight = if view.busy {
        Style::default().fg(theme.muted)
    } else {
        Style::default()
            .bg(theme.accent_soft)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    };
    let menu = List::new(items)
        .block(theme.panel(if view.busy { "Working..." } else { "Actions" }))
        .highlight_style(highlight)
        .highlight_symbol(if view.busy { " " } else { ">" });
    let mut state = ListState::default();
    state.select(Some(view.selected.min(Action::ALL.len() - 1)));
    frame.render_stateful_widget(menu, area, &mut state);
}

fn draw_activity(frame: &mut Frame<'_>, view: &AppView, theme: &Theme, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let status_color = if view.status.starts_with("Error:") {
        theme.error
    } else if view.busy {
        theme.warning
    } else {
        theme.text
    };
    let mut lines = vec![Line::from(Span::styled(
        view.status.clone(),
        Style::default()
            .fg(status_color)
            .add_modifier(Modifier::BOLD),
    ))];
    if let Some(path) = &view.log_path {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Log file: ", Style::default().fg(theme.muted)),
            Span::styled(path.clone(), Style::default().fg(theme.muted)),
        ]));
    }
    let status = Paragraph::new(lines)
        .block(theme.panel("Status"))
        .wrap(Wrap { trim: false });
    frame.render_widget(status, rows[0]);

    let percent = view.progress.clamp(0.0, 100.0);
    let gauge = Gauge::default()
        .block(theme.block("Progress"))
        .gauge_style(Style::default().fg(theme.accent).bg(theme.log_bg))
        .ratio(f64::from(percent) / 100.0)
        .label(format!("{percent:.0}%"));
    frame.render_widget(gauge, rows[1]);
}

fn build_log_lines(view: &AppView, theme: &Theme, height: usize) -> Vec<Line<'static>> {
    if height == 0 {
        return Vec::new();
    }
    if view.logs.is_empty() {
        return vec![Line::from(Span::styled(
            "No recent events.",
            Style::default().fg(theme.muted),
        ))];
    }

    let start = view.logs.len().saturating_sub(height);
    view.logs[start..]
        .iter()
        .map(|entry| {
            let (label, color) = match entry.level {
                LogLevel::Info => ("[i]", theme.accent),
                LogLevel::Warn => ("[!]", theme.warning),
                LogLevel::Error => ("[x]", theme.error),
            };
            Line::from(vec![
                Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(" "),
                Span::styled(entry.message.clone(), Style::default().fg(theme.text)),
            ])
        })
        .collect()
}

fn draw_prompt(frame: &mut Frame<'_>, prompt: &PromptState, theme: &Theme) {
    let area = frame.size();
    let width = (area.width.saturating_mul(3) / 4).clamp(20, area.width.max(20));
    let width = width.min(area.width);
    let height = 7.min(area.height);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let dialog_area = Rect::new(x, y, width, height);

    let lines = vec![
        Line::from(Span::styled(
            prompt.title.clone(),
            Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("> ", Style::default().fg(theme.muted)),
            Span::styled(prompt.buffer.clone(), Style::default().fg(theme.text)),
            Span::styled("_", Style::default().fg(theme.accent)),
        ]),
        Line::from(Span::styled(
            "Enter confirm | Esc cancel | paste or drop paths",
            Style::default().fg(theme.muted),
        )),
    ];

    frame.render_widget(Clear, dialog_area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.accent_soft))
        .style(Style::default().bg(theme.header_bg));
    let dialog = Paragraph::new(lines)
        .block(block)
        .style(Style::default().fg(theme.text))
        .wrap(Wrap { trim: false });
    frame.render_widget(dialog, dialog_area);
}
