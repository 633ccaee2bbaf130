//! A window-tree layout and event-dispatch engine for Glk-style text
//! interfaces.
//!
//! The engine keeps a binary tree of windows — status grids, scrolling
//! text buffers, graphics panes — and carries events between a host (the
//! thread that owns the display and the real input) and a story program
//! running on its own thread.
//!
//! Hosts construct a [`session::GlkSession`], hand the program half a
//! closure over [`glk::Glk`], and forward key presses, clicks, and
//! display-area changes as they happen. The program opens windows,
//! prints, and blocks in [`glk::Glk::select`] for the next event.

pub mod cancel;
pub mod constants;
pub mod event_queue;
pub mod glk;
pub mod input;
mod layout;
pub mod session;
mod timer;
pub mod tracing_sub;
pub mod window;
