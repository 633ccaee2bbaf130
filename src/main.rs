use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyModifiers, MouseButton, MouseEventKind};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, terminal};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Paragraph;
use ratatui::{Frame, Terminal};

use glk_wm::cancel::GlkResult;
use glk_wm::event_queue::EventKind;
use glk_wm::glk::Glk;
use glk_wm::session::{GlkSession, SessionConfig, WindowSnapshot};
use glk_wm::window::{FontMetrics, Split, SplitDirection, SplitMode, WindowId, WindowKind};

fn main() -> io::Result<()> {
    // Terminal cells are the device units for this host.
    let config = SessionConfig {
        spacing: 1,
        metrics: FontMetrics {
            char_width: 1,
            char_height: 1,
        },
        ..SessionConfig::default()
    };
    let session = GlkSession::new(config).map_err(io::Error::other)?;
    session.run(demo_story);

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, event::EnableMouseCapture)?;
    terminal::enable_raw_mode()?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_host(&mut terminal, &session);

    terminal::disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        event::DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    session.stop();
    session.wait();
    result
}

fn run_host(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: &GlkSession,
) -> io::Result<()> {
    let size = terminal.size()?;
    session.arrange(Rect {
        x: 0,
        y: 0,
        width: size.width,
        height: size.height,
    });

    while session.running() {
        if session.needs_arrange() {
            let size = terminal.size()?;
            session.arrange(Rect {
                x: 0,
                y: 0,
                width: size.width,
                height: size.height,
            });
        }
        let windows = session.snapshot();
        terminal.draw(|frame| draw_windows(frame, &windows))?;

        if !event::poll(Duration::from_millis(16))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    session.stop();
                    break;
                }
                if let Some(target) = focus_window(&windows) {
                    session.key_press(target, key);
                } else if let Some(first) = windows.first() {
                    // Nothing is asking for input; still offer the key so
                    // the end-of-program prompt can take it.
                    session.key_press(first.id, key);
                }
            }
            Event::Mouse(mouse) => {
                if mouse.kind == MouseEventKind::Down(MouseButton::Left) {
                    forward_click(session, &windows, mouse.column, mouse.row);
                }
            }
            Event::Resize(width, height) => {
                session.arrange(Rect {
                    x: 0,
                    y: 0,
                    width,
                    height,
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// The window that should receive key presses: the first one asking.
fn focus_window(windows: &[WindowSnapshot]) -> Option<WindowId> {
    windows
        .iter()
        .find(|win| win.char_request || win.line_request)
        .map(|win| win.id)
}

fn forward_click(session: &GlkSession, windows: &[WindowSnapshot], column: u16, row: u16) {
    for win in windows {
        if win.kind == WindowKind::Pair {
            continue;
        }
        if win.rect.contains(Position {
            x: column,
            y: row,
        }) {
            session.mouse_press(win.id, column - win.rect.x, row - win.rect.y);
            return;
        }
    }
}

fn draw_windows(frame: &mut Frame, windows: &[WindowSnapshot]) {
    for win in windows {
        let area = win.rect.intersection(frame.area());
        if area.width == 0 || area.height == 0 {
            continue;
        }
        match win.kind {
            WindowKind::TextGrid => {
                let rows = win.grid_rows.clone().unwrap_or_default();
                frame.render_widget(
                    Paragraph::new(rows.join("\n"))
                        .style(Style::default().add_modifier(Modifier::REVERSED)),
                    area,
                );
            }
            WindowKind::TextBuffer => {
                let text = win.buffer_text.as_deref().unwrap_or("");
                let lines: Vec<&str> = text.lines().collect();
                let reserve = usize::from(win.line_request);
                let keep = (area.height as usize).saturating_sub(reserve);
                let start = lines.len().saturating_sub(keep);
                let mut shown: Vec<String> =
                    lines[start..].iter().map(|line| line.to_string()).collect();
                if win.line_request {
                    let composed = win.line_input.as_deref().unwrap_or("");
                    shown.push(format!("> {composed}"));
                }
                frame.render_widget(Paragraph::new(shown.join("\n")), area);
            }
            WindowKind::Graphics => {
                let color = win.background.unwrap_or(0x00FF_FFFF);
                frame.render_widget(
                    Paragraph::new("").style(Style::default().bg(rgb(color))),
                    area,
                );
            }
            WindowKind::Blank | WindowKind::Pair => {}
        }
    }
}

fn rgb(color: u32) -> Color {
    Color::Rgb(
        ((color >> 16) & 0xFF) as u8,
        ((color >> 8) & 0xFF) as u8,
        (color & 0xFF) as u8,
    )
}

/// A short tour of the engine: a status line, a scrolling console, and a
/// clickable color pane. Type "quit" to end with the usual send-off.
fn demo_story(glk: &Glk) -> GlkResult<()> {
    let Ok(console) = glk.window_open(
        None,
        Split::new(SplitDirection::Above, SplitMode::Proportional, 100),
        WindowKind::TextBuffer,
        1,
    ) else {
        return Ok(());
    };
    let status = glk
        .window_open(
            Some(console),
            Split::new(SplitDirection::Above, SplitMode::Fixed, 1),
            WindowKind::TextGrid,
            2,
        )
        .ok();
    let canvas = glk
        .window_open(
            Some(console),
            Split::new(SplitDirection::Below, SplitMode::Fixed, 4),
            WindowKind::Graphics,
            3,
        )
        .ok();

    let _ = glk.put_string(
        console,
        "Type something and press enter. Click the bottom pane to recolor it.\n\
         \"clear\" wipes the console; \"quit\" finishes.\n\n",
    );
    if let Some(canvas) = canvas {
        let _ = glk.request_mouse_event(canvas);
    }

    let mut turns: u32 = 0;
    refresh_status(glk, status, turns)?;
    let _ = glk.request_line_event(console, 200, "");
    loop {
        let event = glk.select()?;
        match event.kind {
            EventKind::LineInput => {
                let Some(win) = event.win else {
                    continue;
                };
                let text = match glk.take_line_input(win) {
                    Ok(Some(text)) => text,
                    _ => String::new(),
                };
                turns = turns.wrapping_add(1);
                match text.trim() {
                    "quit" => return Ok(()),
                    "clear" => {
                        let _ = glk.window_clear(win);
                    }
                    _ => {
                        let _ = glk.put_string(win, &format!("You typed: {text}\n"));
                    }
                }
                refresh_status(glk, status, turns)?;
                let _ = glk.request_line_event(win, 200, "");
            }
            EventKind::MouseInput => {
                if let (Some(canvas), Some(win)) = (canvas, event.win) {
                    if win == canvas {
                        let color = ((event.val1.wrapping_mul(37) % 256) << 16)
                            | ((event.val2.wrapping_mul(67) % 256) << 8)
                            | 0x90;
                        let _ = glk.window_set_background_color(canvas, color);
                        let _ = glk.window_clear(canvas);
                        let _ = glk.request_mouse_event(canvas);
                    }
                }
            }
            EventKind::Arrange => refresh_status(glk, status, turns)?,
            _ => {}
        }
    }
}

fn refresh_status(glk: &Glk, status: Option<WindowId>, turns: u32) -> GlkResult<()> {
    let Some(grid) = status else {
        return Ok(());
    };
    let (width, height) = glk.window_get_size(grid)?;
    let _ = glk.window_clear(grid);
    let _ = glk.put_string(
        grid,
        &format!(" glk-wm demo | status {width}x{height} | turns {turns}"),
    );
    Ok(())
}
