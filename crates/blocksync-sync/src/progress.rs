//! Progress bookkeeping for a driver session.

use std::time::{Duration, Instant};

use serde::Serialize;

const MIB: f64 = 1024.0 * 1024.0;

/// Running counters of one driver session.
#[derive(Debug, Clone)]
pub struct Progress {
    total_blocks: u64,
    interval: Duration,
    started: Instant,
    last_report: Instant,
    last_bytes: u64,
    same_blocks: u64,
    diff_blocks: u64,
    bytes: u64,
}

/// A point-in-time view of a session's progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub same_blocks: u64,
    pub diff_blocks: u64,
    pub done_blocks: u64,
    pub total_blocks: u64,
    /// MiB/s since the previous snapshot.
    pub rate_mib_s: f64,
    /// Estimated time left, from the average rate so far.
    pub remaining: Option<Duration>,
}

impl Progress {
    /// Start tracking `total_blocks` blocks, reporting every `interval`.
    pub fn new(total_blocks: u64, interval: Duration) -> Self {
        Self::starting_at(total_blocks, interval, Instant::now())
    }

    /// Like [`new`](Self::new) with an explicit start time.
    pub fn starting_at(total_blocks: u64, interval: Duration, now: Instant) -> Self {
        Self {
            total_blocks,
            interval,
            started: now,
            last_report: now,
            last_bytes: 0,
            same_blocks: 0,
            diff_blocks: 0,
            bytes: 0,
        }
    }

    /// Count a block that matched.
    pub fn record_same(&mut self, len: usize) {
        self.same_blocks += 1;
        self.bytes += len as u64;
    }

    /// Count a block that differed.
    pub fn record_diff(&mut self, len: usize) {
        self.diff_blocks += 1;
        self.bytes += len as u64;
    }

    pub fn same_blocks(&self) -> u64 {
        self.same_blocks
    }

    pub fn diff_blocks(&self) -> u64 {
        self.diff_blocks
    }

    /// Blocks processed so far.
    pub fn done_blocks(&self) -> u64 {
        self.same_blocks + self.diff_blocks
    }

    /// Bytes processed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Whether every assigned block has been processed.
    pub fn is_complete(&self) -> bool {
        self.done_blocks() >= self.total_blocks
    }

    /// Time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// A snapshot if the report interval has passed since the last one.
    pub fn tick(&mut self) -> Option<ProgressSnapshot> {
        self.tick_at(Instant::now())
    }

    /// [`tick`](Self::tick) with an explicit clock.
    pub fn tick_at(&mut self, now: Instant) -> Option<ProgressSnapshot> {
        let since_last = now.saturating_duration_since(self.last_report);
        if self.interval.is_zero() || since_last < self.interval {
            return None;
        }

        let delta = self.bytes - self.last_bytes;
        let done = self.done_blocks();
        let elapsed = now.saturating_duration_since(self.started);
        let remaining = (done > 0).then(|| {
            let left = self.total_blocks.saturating_sub(done) as f64;
            Duration::from_secs_f64((left * elapsed.as_secs_f64() / done as f64).ceil())
        });

        self.last_report = now;
        self.last_bytes = self.bytes;

        Some(ProgressSnapshot {
            same_blocks: self.same_blocks,
            diff_blocks: self.diff_blocks,
            done_blocks: done,
            total_blocks: self.total_blocks,
            rate_mib_s: mib_per_sec(delta, since_last),
            remaining,
        })
    }
}

/// Throughput in MiB/s; zero when no time has passed.
pub fn mib_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / MIB / secs
    } else {
        0.0
    }
}

/// Render a duration as `H:MM:SS`, rounding up to whole seconds.
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs += 1;
    }
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut progress = Progress::new(3, Duration::from_secs(1));
        progress.record_same(4);
        progress.record_diff(4);
        assert_eq!(progress.done_blocks(), 2);
        assert_eq!(progress.bytes(), 8);
        assert!(!progress.is_complete());
        progress.record_same(2);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_tick_respects_interval() {
        let start = Instant::now();
        let mut progress = Progress::starting_at(10, Duration::from_secs(1), start);
        progress.record_same(1024 * 1024);

        assert!(progress.tick_at(start + Duration::from_millis(500)).is_none());

        let snap = progress.tick_at(start + Duration::from_secs(1)).unwrap();
        assert_eq!(snap.done_blocks, 1);
        assert_eq!(snap.total_blocks, 10);
        assert!((snap.rate_mib_s - 1.0).abs() < 1e-9);
        assert_eq!(snap.remaining, Some(Duration::from_secs(9)));

        // The next report measures only the new interval.
        assert!(progress.tick_at(start + Duration::from_millis(1500)).is_none());
        let snap = progress.tick_at(start + Duration::from_secs(3)).unwrap();
        assert_eq!(snap.rate_mib_s, 0.0);
    }

    #[test]
    fn test_zero_interval_never_reports() {
        let start = Instant::now();
        let mut progress = Progress::starting_at(1, Duration::ZERO, start);
        assert!(progress.tick_at(start + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_duration(Duration::from_millis(1500)), "0:00:02");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_rate() {
        assert_eq!(mib_per_sec(1024 * 1024, Duration::ZERO), 0.0);
        assert!((mib_per_sec(3 * 1024 * 1024, Duration::from_secs(2)) - 1.5).abs() < 1e-9);
    }
}
