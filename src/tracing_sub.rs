use tracing::Level;

/// Initialize a tracing subscriber that writes to stderr. Safe to call
/// multiple times; subsequent calls are no-ops for the global subscriber.
///
/// Hosts that already install their own subscriber can skip this; every
/// diagnostic in the crate goes through `tracing` regardless.
pub fn init_default() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(false)
        .try_init();
}
