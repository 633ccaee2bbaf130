//! How programs end: the normal send-off with its final keypress, the
//! explicit exit call, a host stop, and timer cleanup on the way out.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::Rect;

use glk_wm::constants::DEFAULT_FINAL_MESSAGE;
use glk_wm::event_queue::EventKind;
use glk_wm::session::{GlkSession, SessionConfig, WindowSnapshot};
use glk_wm::window::{FontMetrics, Split, SplitDirection, SplitMode, WindowId, WindowKind};

const AREA: Rect = Rect {
    x: 0,
    y: 0,
    width: 100,
    height: 50,
};
const WAIT: Duration = Duration::from_secs(5);

fn cell_session() -> GlkSession {
    GlkSession::new(SessionConfig {
        metrics: FontMetrics {
            char_width: 1,
            char_height: 1,
        },
        ..SessionConfig::default()
    })
    .unwrap()
}

fn press(code: KeyCode) -> KeyEvent {
    let mut key = KeyEvent::new(code, KeyModifiers::NONE);
    key.kind = KeyEventKind::Press;
    key
}

fn pump_until(
    session: &GlkSession,
    area: Rect,
    what: &str,
    mut done: impl FnMut(&[WindowSnapshot]) -> bool,
) -> Vec<WindowSnapshot> {
    let deadline = Instant::now() + WAIT;
    loop {
        if session.needs_arrange() {
            session.arrange(area);
        }
        let shot = session.snapshot();
        if done(&shot) {
            return shot;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

fn finish_with_a_key(session: &GlkSession, win: WindowId) {
    let deadline = Instant::now() + WAIT;
    while !session.key_press(win, press(KeyCode::Enter)) {
        if session.needs_arrange() {
            session.arrange(AREA);
        }
        assert!(
            Instant::now() < deadline,
            "the end-of-program prompt never armed"
        );
        thread::sleep(Duration::from_millis(2));
    }
    session.wait();
    assert!(!session.running());
}

#[test]
fn send_off_goes_to_the_largest_buffer() {
    let session = GlkSession::new(SessionConfig {
        metrics: FontMetrics {
            char_width: 1,
            char_height: 1,
        },
        final_message: String::from("That's all, folks."),
        ..SessionConfig::default()
    })
    .unwrap();

    session.run(move |glk| {
        let story = glk
            .window_open(
                None,
                Split::new(SplitDirection::Above, SplitMode::Proportional, 100),
                WindowKind::TextBuffer,
                1,
            )
            .unwrap();
        let log = glk
            .window_open(
                Some(story),
                Split::new(SplitDirection::Below, SplitMode::Proportional, 30),
                WindowKind::TextBuffer,
                2,
            )
            .unwrap();
        let _ = glk.put_string(log, "log line\n");
        Ok(())
    });

    let shot = pump_until(&session, AREA, "the send-off", |shot| {
        shot.iter()
            .any(|w| w.buffer_text.as_deref().unwrap_or("").contains("That's all"))
    });
    let story = shot.iter().find(|w| w.rock == 1).unwrap();
    let log = shot.iter().find(|w| w.rock == 2).unwrap();
    // The story window won the 70/30 split, so it gets the farewell; the
    // log keeps only its own output.
    assert!(
        story
            .buffer_text
            .as_deref()
            .unwrap_or("")
            .contains("\nThat's all, folks.\n")
    );
    assert!(!log.buffer_text.as_deref().unwrap_or("").contains("That's all"));
    assert!(log.buffer_text.as_deref().unwrap_or("").contains("log line"));

    finish_with_a_key(&session, story.id);
}

#[test]
fn stop_unwinds_a_blocked_select_without_the_send_off() {
    let session = cell_session();
    let (tx, rx) = mpsc::channel::<()>();

    session.run(move |glk| {
        let _console = glk
            .window_open(
                None,
                Split::new(SplitDirection::Above, SplitMode::Proportional, 100),
                WindowKind::TextBuffer,
                1,
            )
            .unwrap();
        tx.send(()).unwrap();
        let err = loop {
            match glk.select() {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        tx.send(()).unwrap();
        Err(err)
    });

    rx.recv_timeout(WAIT).unwrap();
    session.stop();
    // The program observed the interruption and unwound on its own.
    rx.recv_timeout(WAIT).unwrap();
    session.wait();
    assert!(!session.running());
    assert!(session.snapshot().is_empty());
}

#[test]
fn exit_prints_and_parks_before_the_thread_ends() {
    let session = cell_session();

    session.run(move |glk| {
        let console = glk
            .window_open(
                None,
                Split::new(SplitDirection::Above, SplitMode::Proportional, 100),
                WindowKind::TextBuffer,
                3,
            )
            .unwrap();
        let _ = glk.put_string(console, "goodbye\n");
        Err(glk.exit())
    });

    let shot = pump_until(&session, AREA, "the send-off", |shot| {
        shot.iter()
            .any(|w| w.buffer_text.as_deref().unwrap_or("").contains(DEFAULT_FINAL_MESSAGE))
    });
    assert!(session.running(), "exit parks until the host reports a key");
    let console = shot.iter().find(|w| w.rock == 3).unwrap();
    let text = console.buffer_text.clone().unwrap_or_default();
    assert!(text.contains("goodbye\n"));
    // The unwind value flowing back through run() must not trigger a
    // second farewell.
    assert_eq!(text.matches(DEFAULT_FINAL_MESSAGE).count(), 1);

    finish_with_a_key(&session, console.id);
}

#[test]
fn timers_tick_until_cancelled() {
    let session = cell_session();
    let (tx, rx) = mpsc::channel::<u32>();
    let (host_tx, host_rx) = mpsc::channel::<()>();

    session.run(move |glk| {
        let _console = glk
            .window_open(
                None,
                Split::new(SplitDirection::Above, SplitMode::Proportional, 100),
                WindowKind::TextBuffer,
                1,
            )
            .unwrap();
        glk.request_timer_events(10);
        let mut seen = 0u32;
        while seen < 3 {
            if glk.select()?.kind == EventKind::Timer {
                seen += 1;
            }
        }
        glk.request_timer_events(0);
        tx.send(seen).unwrap();

        // One settling lap for any tick that was already in flight when
        // the timer stopped, then a clean window that must stay silent.
        host_rx.recv().unwrap();
        while glk.select_poll()?.is_some() {}
        tx.send(0).unwrap();
        host_rx.recv().unwrap();
        let mut late = 0u32;
        while glk.select_poll()?.is_some() {
            late += 1;
        }
        tx.send(late).unwrap();
        Ok(())
    });

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 3);
    thread::sleep(Duration::from_millis(60));
    host_tx.send(()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 0);
    thread::sleep(Duration::from_millis(60));
    host_tx.send(()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 0, "a stopped timer kept ticking");

    let console = session.snapshot()[0].id;
    finish_with_a_key(&session, console);
}
