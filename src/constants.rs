//! Shared crate-wide constants.

use std::time::Duration;

/// Maximum number of events the dispatch queue will hold.
///
/// Producers pushing into a full queue wait up to [`EVENT_PUSH_TIMEOUT`] for
/// the consumer to drain, then drop the event. The queue never grows past
/// this bound.
pub const EVENT_QUEUE_MAX_LENGTH: usize = 100;

/// How long a producer blocks on a full event queue before its event is
/// discarded.
///
/// The timeout keeps callback sources responsive when the program thread has
/// stopped draining (for example, stuck in a long computation without a
/// select call). Dropped events are logged at `warn`.
pub const EVENT_PUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound for a proportional split size, which is a percentage.
pub const PROPORTION_MAX: u32 = 100;

/// Default width of one character cell, in device units, used to size
/// text-grid and text-buffer windows when the host supplies no font metrics.
pub const DEFAULT_CHAR_WIDTH: u16 = 8;

/// Default height of one character cell, in device units.
pub const DEFAULT_CHAR_HEIGHT: u16 = 16;

/// Message printed to the largest text-buffer window when the program ends,
/// before the engine waits for the host to report a final keypress.
pub const DEFAULT_FINAL_MESSAGE: &str = "[ The program has finished ]";
