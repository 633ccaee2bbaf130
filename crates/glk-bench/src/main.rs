use std::io;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use ratatui::layout::Rect;

use glk_wm::cancel::GlkResult;
use glk_wm::event_queue::EventKind;
use glk_wm::glk::Glk;
use glk_wm::session::{GlkSession, SessionConfig};
use glk_wm::window::{Split, SplitDirection, SplitMode, WindowKind};

#[derive(Parser, Debug)]
#[command(
    name = "glk-bench",
    version = env!("CARGO_PKG_VERSION"),
    about = "Arrange-heavy benchmark for checking window-tree layout throughput"
)]
struct BenchCli {
    /// How long to run the benchmark.
    #[arg(
        short = 'd',
        long = "duration",
        value_name = "SECONDS",
        default_value_t = 5.0
    )]
    duration_seconds: f64,

    /// How many leaf windows the benchmark program opens.
    #[arg(
        short = 'w',
        long = "windows",
        value_name = "COUNT",
        default_value_t = 32
    )]
    windows: u16,

    /// Feed a forced input line every N arrange passes.
    #[arg(long = "feed-every", value_name = "PASSES", default_value_t = 8)]
    feed_every: u64,
}

impl BenchCli {
    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds)
    }
}

struct BenchConfig {
    duration: Duration,
    leaves: u16,
    feed_every: u64,
}

impl TryFrom<&BenchCli> for BenchConfig {
    type Error = String;

    fn try_from(cli: &BenchCli) -> Result<Self, Self::Error> {
        if !(0.5..=600.0).contains(&cli.duration_seconds) {
            return Err("duration must be between 0.5 and 600 seconds".to_string());
        }
        if !(2..=512).contains(&cli.windows) {
            return Err("windows must be between 2 and 512".to_string());
        }
        if !(1..=10_000).contains(&cli.feed_every) {
            return Err("feed-every must be between 1 and 10000".to_string());
        }
        Ok(Self {
            duration: cli.duration(),
            leaves: cli.windows,
            feed_every: cli.feed_every,
        })
    }
}

fn main() -> io::Result<()> {
    let args = BenchCli::parse();
    let config = BenchConfig::try_from(&args)
        .map_err(|msg| io::Error::new(io::ErrorKind::InvalidInput, msg))?;

    let session = GlkSession::new(SessionConfig::default())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
    let leaves = config.leaves;
    session.run(move |glk| story(glk, leaves));

    let stats = run_benchmark(&session, &config);

    session.stop();
    session.wait();
    println!("{}", stats.final_report(&config));

    Ok(())
}

/// The program half of the benchmark: builds a deep split tree, then
/// echoes every fed line and keeps the status grid current. Runs until
/// the host stops the session.
fn story(glk: &Glk, leaves: u16) -> GlkResult<()> {
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
    let mut target = console;
    for rock in 3..=u32::from(leaves) {
        let direction = if rock % 2 == 0 {
            SplitDirection::Left
        } else {
            SplitDirection::Above
        };
        let split = Split::new(direction, SplitMode::Proportional, 50);
        match glk.window_open(Some(target), split, WindowKind::TextBuffer, rock) {
            Ok(win) => target = win,
            Err(_) => break,
        }
    }

    let _ = glk.request_line_event(console, 120, "");
    let mut lines: u64 = 0;
    loop {
        let event = glk.select()?;
        match event.kind {
            EventKind::LineInput => {
                let Some(win) = event.win else {
                    continue;
                };
                if let Ok(Some(text)) = glk.take_line_input(win) {
                    lines = lines.wrapping_add(1);
                    let _ = glk.put_string(win, &format!("{lines:>6}: {text}\n"));
                }
                let _ = glk.request_line_event(win, 120, "");
            }
            EventKind::Arrange => {
                if let Some(grid) = status {
                    let (width, height) = glk.window_get_size(grid)?;
                    let _ = glk.window_move_cursor(grid, 0, 0);
                    let _ = glk.put_string(grid, &format!("{width}x{height} cells"));
                }
            }
            _ => {}
        }
    }
}

fn run_benchmark(session: &GlkSession, config: &BenchConfig) -> BenchStats {
    let mut stats = BenchStats::new();
    let mut sweep = AreaSweep::seeded_from_clock();
    let mut tick: u64 = 0;

    while stats.elapsed() < config.duration {
        let area = sweep.next_area();
        let arrange_start = Instant::now();
        session.arrange(area);
        stats.record_arrange(arrange_start.elapsed());

        if tick % config.feed_every == 0 {
            session.feed_line_input("the quick brown fox jumps over the lazy dog");
            stats.record_feed();
        }

        let snapshot_start = Instant::now();
        let windows = session.snapshot();
        stats.record_snapshot(windows.len(), snapshot_start.elapsed());

        tick = tick.wrapping_add(1);
    }

    stats.mark_completed();
    stats
}

struct BenchStats {
    start: Instant,
    completed_at: Option<Instant>,
    arrange_passes: u64,
    total_arrange_time: Duration,
    fastest_arrange: Duration,
    slowest_arrange: Duration,
    snapshots: u64,
    total_snapshot_time: Duration,
    peak_windows: usize,
    lines_fed: u64,
}

impl BenchStats {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            completed_at: None,
            arrange_passes: 0,
            total_arrange_time: Duration::ZERO,
            fastest_arrange: Duration::MAX,
            slowest_arrange: Duration::ZERO,
            snapshots: 0,
            total_snapshot_time: Duration::ZERO,
            peak_windows: 0,
            lines_fed: 0,
        }
    }

    fn elapsed(&self) -> Duration {
        match self.completed_at {
            Some(done) => done.duration_since(self.start),
            None => self.start.elapsed(),
        }
    }

    fn mark_completed(&mut self) {
        self.completed_at = Some(Instant::now());
    }

    fn record_arrange(&mut self, took: Duration) {
        self.arrange_passes = self.arrange_passes.saturating_add(1);
        self.total_arrange_time += took;
        if took < self.fastest_arrange {
            self.fastest_arrange = took;
        }
        if took > self.slowest_arrange {
            self.slowest_arrange = took;
        }
    }

    fn record_snapshot(&mut self, windows: usize, took: Duration) {
        self.snapshots = self.snapshots.saturating_add(1);
        self.total_snapshot_time += took;
        if windows > self.peak_windows {
            self.peak_windows = windows;
        }
    }

    fn record_feed(&mut self) {
        self.lines_fed = self.lines_fed.saturating_add(1);
    }

    fn average_arrange_us(&self) -> f64 {
        if self.arrange_passes == 0 {
            return 0.0;
        }
        (self.total_arrange_time.as_secs_f64() / self.arrange_passes as f64) * 1_000_000.0
    }

    fn fastest_arrange_us(&self) -> f64 {
        if self.arrange_passes == 0 {
            return 0.0;
        }
        self.fastest_arrange.as_secs_f64() * 1_000_000.0
    }

    fn slowest_arrange_us(&self) -> f64 {
        if self.arrange_passes == 0 {
            return 0.0;
        }
        self.slowest_arrange.as_secs_f64() * 1_000_000.0
    }

    fn average_snapshot_us(&self) -> f64 {
        if self.snapshots == 0 {
            return 0.0;
        }
        (self.total_snapshot_time.as_secs_f64() / self.snapshots as f64) * 1_000_000.0
    }

    fn final_report(&self, config: &BenchConfig) -> String {
        let elapsed = self.elapsed().as_secs_f64();
        let passes_per_second = if elapsed > 0.0 {
            self.arrange_passes as f64 / elapsed
        } else {
            0.0
        };

        indoc::formatdoc!(
            r#"
            Layout bench completed.
            Duration: {elapsed:.2}s (target {target:.2}s)
            Windows: {peak} live ({leaves} leaves requested)
            Arrange passes: {passes} (~{per_sec:.0}/s)
            Arrange µs avg {avg:.2} | best {best:.2} | worst {worst:.2}
            Snapshots: {snapshots} | avg {snapshot_avg:.2} µs
            Lines fed: {fed}
            "#,
            elapsed = elapsed,
            target = config.duration.as_secs_f64(),
            peak = self.peak_windows,
            leaves = config.leaves,
            passes = self.arrange_passes,
            per_sec = passes_per_second,
            avg = self.average_arrange_us(),
            best = self.fastest_arrange_us(),
            worst = self.slowest_arrange_us(),
            snapshots = self.snapshots,
            snapshot_avg = self.average_snapshot_us(),
            fed = self.lines_fed,
        )
    }
}

/// Wobbles the display area between passes so every arrange actually
/// moves windows. A multiplicative congruential generator keeps the
/// sweep cheap and free of extra dependencies.
struct AreaSweep {
    state: u64,
}

impl AreaSweep {
    fn seeded_from_clock() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
            ^ 0xA5A5_A5A5_1234_5678;
        Self { state: seed }
    }

    fn next(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    /// Areas are in device units; with the default 8x16 cell this spans
    /// roughly 40 to 160 columns and 10 to 30 rows.
    fn next_area(&mut self) -> Rect {
        let width = 320 + (self.next() % 960) as u16;
        let height = 160 + (self.next() % 320) as u16;
        Rect {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}
