//! Keyboard input: request state, line composition, history recall, and
//! translation from crossterm key codes to Glk key codes.

use crossterm::event::{KeyCode, KeyEvent};

use crate::window::{Window, WindowBody};

pub const KEYCODE_UNKNOWN: u32 = 0xffff_ffff;
pub const KEYCODE_LEFT: u32 = 0xffff_fffe;
pub const KEYCODE_RIGHT: u32 = 0xffff_fffd;
pub const KEYCODE_UP: u32 = 0xffff_fffc;
pub const KEYCODE_DOWN: u32 = 0xffff_fffb;
pub const KEYCODE_RETURN: u32 = 0xffff_fffa;
pub const KEYCODE_DELETE: u32 = 0xffff_fff9;
pub const KEYCODE_ESCAPE: u32 = 0xffff_fff8;
pub const KEYCODE_TAB: u32 = 0xffff_fff7;
pub const KEYCODE_PAGE_UP: u32 = 0xffff_fff6;
pub const KEYCODE_PAGE_DOWN: u32 = 0xffff_fff5;
pub const KEYCODE_HOME: u32 = 0xffff_fff4;
pub const KEYCODE_END: u32 = 0xffff_fff3;
pub const KEYCODE_FUNC1: u32 = 0xffff_ffef;
pub const KEYCODE_FUNC2: u32 = 0xffff_ffee;
pub const KEYCODE_FUNC3: u32 = 0xffff_ffed;
pub const KEYCODE_FUNC4: u32 = 0xffff_ffec;
pub const KEYCODE_FUNC5: u32 = 0xffff_ffeb;
pub const KEYCODE_FUNC6: u32 = 0xffff_ffea;
pub const KEYCODE_FUNC7: u32 = 0xffff_ffe9;
pub const KEYCODE_FUNC8: u32 = 0xffff_ffe8;
pub const KEYCODE_FUNC9: u32 = 0xffff_ffe7;
pub const KEYCODE_FUNC10: u32 = 0xffff_ffe6;
pub const KEYCODE_FUNC11: u32 = 0xffff_ffe5;
pub const KEYCODE_FUNC12: u32 = 0xffff_ffe4;

/// Translates a terminal key to its Glk key code. Printable characters map
/// to their Unicode scalar value, special keys to the `KEYCODE_` constants,
/// anything else to [`KEYCODE_UNKNOWN`].
pub fn keycode_from_key(key: &KeyEvent) -> u32 {
    match key.code {
        KeyCode::Char(c) => c as u32,
        KeyCode::Left => KEYCODE_LEFT,
        KeyCode::Right => KEYCODE_RIGHT,
        KeyCode::Up => KEYCODE_UP,
        KeyCode::Down => KEYCODE_DOWN,
        KeyCode::Enter => KEYCODE_RETURN,
        KeyCode::Backspace | KeyCode::Delete => KEYCODE_DELETE,
        KeyCode::Esc => KEYCODE_ESCAPE,
        KeyCode::Tab | KeyCode::BackTab => KEYCODE_TAB,
        KeyCode::PageUp => KEYCODE_PAGE_UP,
        KeyCode::PageDown => KEYCODE_PAGE_DOWN,
        KeyCode::Home => KEYCODE_HOME,
        KeyCode::End => KEYCODE_END,
        KeyCode::F(n) if (1..=12).contains(&n) => KEYCODE_FUNC1 - u32::from(n - 1),
        _ => KEYCODE_UNKNOWN,
    }
}

/// Key code reported by a character-input event. A Latin-1 request cannot
/// represent characters above U+00FF, so those collapse to
/// [`KEYCODE_UNKNOWN`]; the special key codes pass through unchanged.
pub(crate) fn char_event_code(key: &KeyEvent, unicode: bool) -> u32 {
    let code = keycode_from_key(key);
    if !unicode && (0x100..=char::MAX as u32).contains(&code) {
        KEYCODE_UNKNOWN
    } else {
        code
    }
}

/// The input request pending on a window, if any.
#[derive(Debug)]
pub(crate) enum InputRequest {
    Char { unicode: bool },
    Line(LineComposition),
}

/// Line input being composed by the player. The engine owns this text until
/// the request completes; the program retrieves it afterwards.
#[derive(Debug)]
pub(crate) struct LineComposition {
    unicode: bool,
    /// Character cap, already reduced to the room left on a grid row.
    maxlen: u32,
    text: String,
    /// Index into the window history while recalling. The draft line is
    /// saved at index 0 for the duration of a recall session.
    history_pos: Option<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct InputState {
    request: Option<InputRequest>,
    /// Completed line text not yet retrieved by the program.
    finished: Option<String>,
}

impl InputState {
    pub(crate) fn has_request(&self) -> bool {
        self.request.is_some()
    }

    pub(crate) fn char_pending(&self) -> bool {
        matches!(self.request, Some(InputRequest::Char { .. }))
    }

    pub(crate) fn line_pending(&self) -> bool {
        matches!(self.request, Some(InputRequest::Line(_)))
    }

    /// In-progress line text, if a line request is composing.
    pub(crate) fn composition(&self) -> Option<&str> {
        match &self.request {
            Some(InputRequest::Line(line)) => Some(&line.text),
            _ => None,
        }
    }

    /// Drops the pending request without delivering anything. Composition
    /// text is lost; callers log the condition.
    pub(crate) fn force_cancel(&mut self) {
        self.request = None;
    }
}

/// What a key press did to the window's pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyOutcome {
    /// Completed a character request; the value is the translated key code.
    CharInput(u32),
    /// Completed a line request; the value is the number of characters read.
    LineInput(u32),
    /// Consumed into the line composition without finishing it.
    Composing,
    /// No pending request wanted this key.
    Ignored,
}

pub(crate) fn request_char(win: &mut Window, unicode: bool) {
    if win.input.has_request() {
        win.input.force_cancel();
    }
    win.input.request = Some(InputRequest::Char { unicode });
}

/// Legal no-op when no character request is pending.
pub(crate) fn cancel_char(win: &mut Window) {
    if win.input.char_pending() {
        win.input.force_cancel();
    }
}

pub(crate) fn request_line(win: &mut Window, unicode: bool, maxlen: u32, initial: &str) {
    if win.input.has_request() {
        win.input.force_cancel();
    }
    // Grid line input cannot run past the end of the cursor row.
    let maxlen = match win.grid() {
        Some(g) => maxlen.min(g.cells_left_on_row()),
        None => maxlen,
    };
    let text = sanitize(initial, unicode, maxlen);
    win.input.request = Some(InputRequest::Line(LineComposition {
        unicode,
        maxlen,
        text,
        history_pos: None,
    }));
}

/// Cancels pending line input. Text composed so far is delivered exactly as
/// if the player had pressed Enter; with nothing composed the request is
/// dropped and `None` returned.
pub(crate) fn cancel_line(win: &mut Window) -> Option<u32> {
    let (composed, recalling) = match &win.input.request {
        Some(InputRequest::Line(comp)) => (!comp.text.is_empty(), comp.history_pos.is_some()),
        _ => return None,
    };
    if composed {
        return Some(finish_line(win));
    }
    win.input.request = None;
    if recalling && !win.history.is_empty() {
        win.history.remove(0);
    }
    None
}

/// Releases the text of the most recently completed line input.
pub(crate) fn take_line_input(win: &mut Window) -> Option<String> {
    win.input.finished.take()
}

/// Feeds one key press into the window's pending request.
pub(crate) fn key_press(win: &mut Window, key: &KeyEvent) -> KeyOutcome {
    match &win.input.request {
        Some(InputRequest::Char { unicode }) => {
            let code = char_event_code(key, *unicode);
            win.input.request = None;
            win.read_count = win.read_count.saturating_add(1);
            KeyOutcome::CharInput(code)
        }
        Some(InputRequest::Line(_)) => line_key(win, key),
        None => KeyOutcome::Ignored,
    }
}

/// Completes pending line input as if the given text had been typed and
/// Enter pressed. Used for host-fed line input.
pub(crate) fn finish_line_with(win: &mut Window, text: &str) -> Option<u32> {
    let Some(InputRequest::Line(comp)) = &mut win.input.request else {
        return None;
    };
    comp.text = sanitize(text, comp.unicode, comp.maxlen);
    Some(finish_line(win))
}

fn line_key(win: &mut Window, key: &KeyEvent) -> KeyOutcome {
    match key.code {
        KeyCode::Enter => KeyOutcome::LineInput(finish_line(win)),
        KeyCode::Backspace => {
            if let Some(InputRequest::Line(comp)) = &mut win.input.request {
                comp.text.pop();
            }
            KeyOutcome::Composing
        }
        KeyCode::Up => {
            recall_history(&mut win.input, &mut win.history, true);
            KeyOutcome::Composing
        }
        KeyCode::Down => {
            recall_history(&mut win.input, &mut win.history, false);
            KeyOutcome::Composing
        }
        KeyCode::Char(c) => {
            if let Some(InputRequest::Line(comp)) = &mut win.input.request {
                if (comp.text.chars().count() as u32) < comp.maxlen {
                    comp.text.push(filter_char(c, comp.unicode));
                }
            }
            KeyOutcome::Composing
        }
        // Other keys are swallowed while a line is being edited.
        _ => KeyOutcome::Composing,
    }
}

fn finish_line(win: &mut Window) -> u32 {
    let Some(InputRequest::Line(comp)) = win.input.request.take() else {
        return 0;
    };
    // A completed recall session discards the saved draft.
    if comp.history_pos.is_some() && !win.history.is_empty() {
        win.history.remove(0);
    }
    let text = comp.text;
    let chars_written = text.chars().count() as u32;
    win.read_count = win.read_count.saturating_add(chars_written);
    if !text.is_empty() {
        win.history.insert(0, text.clone());
    }
    echo_line(win, &text);
    win.input.finished = Some(text);
    chars_written
}

/// Writes the completed line back into the window, the way the player saw
/// it while typing: buffers get the line plus a newline, grids keep the
/// text at the row it was entered on.
fn echo_line(win: &mut Window, text: &str) {
    match &mut win.body {
        WindowBody::TextBuffer(b) => {
            b.pending.push_str(text);
            b.pending.push('\n');
            let n = text.chars().count() as u32 + 1;
            win.write_count = win.write_count.saturating_add(n);
        }
        WindowBody::TextGrid(g) => {
            let n = g.put_str(text);
            win.write_count = win.write_count.saturating_add(n);
        }
        _ => {}
    }
}

/// Up/Down history navigation. The draft being edited is parked at the
/// front of the history while recalling and removed again at completion.
fn recall_history(input: &mut InputState, history: &mut Vec<String>, older: bool) {
    let Some(InputRequest::Line(comp)) = &mut input.request else {
        return;
    };
    let pos = if older {
        match comp.history_pos {
            None => {
                if history.is_empty() {
                    return;
                }
                history.insert(0, comp.text.clone());
                1
            }
            Some(pos) => {
                if pos + 1 >= history.len() {
                    return;
                }
                pos + 1
            }
        }
    } else {
        match comp.history_pos {
            // Already at the draft, or not recalling at all.
            None | Some(0) => return,
            Some(pos) => pos - 1,
        }
    };
    comp.history_pos = Some(pos);
    comp.text = sanitize(&history[pos], comp.unicode, comp.maxlen);
}

fn filter_char(c: char, unicode: bool) -> char {
    if !unicode && c as u32 > 0xFF { '?' } else { c }
}

fn sanitize(text: &str, unicode: bool, maxlen: u32) -> String {
    text.chars()
        .take(maxlen as usize)
        .map(|c| filter_char(c, unicode))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{FontMetrics, WindowKind};
    use crossterm::event::{KeyEventKind, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        let mut ev = KeyEvent::new(code, KeyModifiers::NONE);
        ev.kind = KeyEventKind::Press;
        ev
    }

    fn buffer_window() -> Window {
        Window::new_leaf(WindowKind::TextBuffer, 0, FontMetrics::default())
    }

    fn type_line(win: &mut Window, s: &str) {
        for c in s.chars() {
            assert_eq!(key_press(win, &key(KeyCode::Char(c))), KeyOutcome::Composing);
        }
    }

    #[test]
    fn special_keys_translate_to_glk_codes() {
        assert_eq!(keycode_from_key(&key(KeyCode::Left)), KEYCODE_LEFT);
        assert_eq!(keycode_from_key(&key(KeyCode::Enter)), KEYCODE_RETURN);
        assert_eq!(keycode_from_key(&key(KeyCode::Backspace)), KEYCODE_DELETE);
        assert_eq!(keycode_from_key(&key(KeyCode::F(1))), KEYCODE_FUNC1);
        assert_eq!(keycode_from_key(&key(KeyCode::F(12))), KEYCODE_FUNC12);
        assert_eq!(keycode_from_key(&key(KeyCode::Char('a'))), u32::from('a'));
        assert_eq!(keycode_from_key(&key(KeyCode::CapsLock)), KEYCODE_UNKNOWN);
    }

    #[test]
    fn char_request_completes_with_translated_code() {
        let mut win = buffer_window();
        request_char(&mut win, false);
        assert!(win.input.char_pending());

        let outcome = key_press(&mut win, &key(KeyCode::Char('x')));
        assert_eq!(outcome, KeyOutcome::CharInput(u32::from('x')));
        assert!(!win.input.has_request());
        assert_eq!(win.read_count, 1);
    }

    #[test]
    fn latin1_char_request_cannot_report_wide_characters() {
        let mut win = buffer_window();
        request_char(&mut win, false);
        let outcome = key_press(&mut win, &key(KeyCode::Char('素')));
        assert_eq!(outcome, KeyOutcome::CharInput(KEYCODE_UNKNOWN));

        request_char(&mut win, true);
        let outcome = key_press(&mut win, &key(KeyCode::Char('素')));
        assert_eq!(outcome, KeyOutcome::CharInput(u32::from('素')));

        // Latin-1 still covers the accented range.
        request_char(&mut win, false);
        let outcome = key_press(&mut win, &key(KeyCode::Char('é')));
        assert_eq!(outcome, KeyOutcome::CharInput(u32::from('é')));
    }

    #[test]
    fn keys_without_a_request_are_ignored() {
        let mut win = buffer_window();
        assert_eq!(key_press(&mut win, &key(KeyCode::Char('x'))), KeyOutcome::Ignored);
    }

    #[test]
    fn line_composition_types_edits_and_completes() {
        let mut win = buffer_window();
        request_line(&mut win, true, 80, "");
        type_line(&mut win, "hellp");
        key_press(&mut win, &key(KeyCode::Backspace));
        type_line(&mut win, "o");

        let outcome = key_press(&mut win, &key(KeyCode::Enter));
        assert_eq!(outcome, KeyOutcome::LineInput(5));
        assert_eq!(take_line_input(&mut win).as_deref(), Some("hello"));
        assert_eq!(take_line_input(&mut win), None);
        assert_eq!(win.read_count, 5);
        assert_eq!(win.history, vec!["hello".to_string()]);
    }

    #[test]
    fn line_length_is_capped_at_maxlen() {
        let mut win = buffer_window();
        request_line(&mut win, true, 3, "");
        type_line(&mut win, "abcdef");
        let outcome = key_press(&mut win, &key(KeyCode::Enter));
        assert_eq!(outcome, KeyOutcome::LineInput(3));
        assert_eq!(take_line_input(&mut win).as_deref(), Some("abc"));
    }

    #[test]
    fn initial_text_seeds_the_composition() {
        let mut win = buffer_window();
        request_line(&mut win, true, 80, "go ");
        type_line(&mut win, "north");
        key_press(&mut win, &key(KeyCode::Enter));
        assert_eq!(take_line_input(&mut win).as_deref(), Some("go north"));
    }

    #[test]
    fn latin1_line_input_replaces_wide_characters() {
        let mut win = buffer_window();
        request_line(&mut win, false, 80, "");
        type_line(&mut win, "caf");
        key_press(&mut win, &key(KeyCode::Char('é')));
        key_press(&mut win, &key(KeyCode::Char('素')));
        key_press(&mut win, &key(KeyCode::Enter));
        assert_eq!(take_line_input(&mut win).as_deref(), Some("café?"));
    }

    #[test]
    fn completed_line_is_echoed_into_a_buffer() {
        let mut win = buffer_window();
        request_line(&mut win, true, 80, "");
        type_line(&mut win, "look");
        key_press(&mut win, &key(KeyCode::Enter));
        let chunk = win.buffer_mut().unwrap().flush().unwrap();
        assert_eq!(chunk, "look\n");
        assert_eq!(win.write_count, 5);
    }

    #[test]
    fn grid_line_input_is_capped_by_the_cursor_row() {
        let mut win = Window::new_leaf(WindowKind::TextGrid, 0, FontMetrics::default());
        win.grid_mut().unwrap().resize(10, 3);
        win.grid_mut().unwrap().move_cursor(6, 0);
        request_line(&mut win, true, 80, "");
        type_line(&mut win, "abcdefgh");
        let outcome = key_press(&mut win, &key(KeyCode::Enter));
        // Only four cells were left on the row.
        assert_eq!(outcome, KeyOutcome::LineInput(4));
        let grid = win.grid_mut().unwrap();
        assert_eq!(grid.row(0).unwrap(), "      abcd");
    }

    #[test]
    fn history_recall_walks_older_and_restores_the_draft() {
        let mut win = buffer_window();
        for line in ["first", "second"] {
            request_line(&mut win, true, 80, "");
            type_line(&mut win, line);
            key_press(&mut win, &key(KeyCode::Enter));
        }
        assert_eq!(win.history, vec!["second".to_string(), "first".to_string()]);

        request_line(&mut win, true, 80, "");
        type_line(&mut win, "dra");
        key_press(&mut win, &key(KeyCode::Up));
        key_press(&mut win, &key(KeyCode::Up));
        // Walked back to the oldest entry; further Up presses stay put.
        key_press(&mut win, &key(KeyCode::Up));
        key_press(&mut win, &key(KeyCode::Down));
        key_press(&mut win, &key(KeyCode::Down));

        let outcome = key_press(&mut win, &key(KeyCode::Enter));
        assert_eq!(outcome, KeyOutcome::LineInput(3));
        assert_eq!(take_line_input(&mut win).as_deref(), Some("dra"));
        // The parked draft was removed again; the completed line is newest.
        assert_eq!(
            win.history,
            vec!["dra".to_string(), "second".to_string(), "first".to_string()]
        );
    }

    #[test]
    fn recalled_history_line_can_be_resubmitted() {
        let mut win = buffer_window();
        request_line(&mut win, true, 80, "");
        type_line(&mut win, "again");
        key_press(&mut win, &key(KeyCode::Enter));

        request_line(&mut win, true, 80, "");
        key_press(&mut win, &key(KeyCode::Up));
        let outcome = key_press(&mut win, &key(KeyCode::Enter));
        assert_eq!(outcome, KeyOutcome::LineInput(5));
        assert_eq!(take_line_input(&mut win).as_deref(), Some("again"));
        assert_eq!(win.history.len(), 2);
    }

    #[test]
    fn cancel_line_delivers_partial_text() {
        let mut win = buffer_window();
        request_line(&mut win, true, 80, "");
        type_line(&mut win, "par");
        assert_eq!(cancel_line(&mut win), Some(3));
        assert!(!win.input.has_request());
        assert_eq!(take_line_input(&mut win).as_deref(), Some("par"));
    }

    #[test]
    fn cancel_line_with_nothing_composed_returns_none() {
        let mut win = buffer_window();
        request_line(&mut win, true, 80, "");
        assert_eq!(cancel_line(&mut win), None);
        assert!(!win.input.has_request());
        assert_eq!(take_line_input(&mut win), None);
        // Cancelling again is a no-op.
        assert_eq!(cancel_line(&mut win), None);
    }

    #[test]
    fn new_request_replaces_a_pending_one() {
        let mut win = buffer_window();
        request_line(&mut win, true, 80, "");
        type_line(&mut win, "lost");
        request_char(&mut win, false);
        assert!(win.input.char_pending());
        assert!(!win.input.line_pending());
        // The replaced composition is gone.
        assert_eq!(take_line_input(&mut win), None);
    }

    #[test]
    fn forced_line_input_completes_like_typed_text() {
        let mut win = buffer_window();
        request_line(&mut win, false, 5, "");
        let n = finish_line_with(&mut win, "go 漢 east");
        assert_eq!(n, Some(5));
        assert_eq!(take_line_input(&mut win).as_deref(), Some("go ? "));
        assert!(!win.input.has_request());
    }

    #[test]
    fn forced_line_input_without_a_request_is_rejected() {
        let mut win = buffer_window();
        assert_eq!(finish_line_with(&mut win, "text"), None);
    }
}
