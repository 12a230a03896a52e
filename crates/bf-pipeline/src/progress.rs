//! Parser for ffmpeg's `-progress` output.
//!
//! With `-progress pipe:2 -nostats`, ffmpeg writes blocks of `key=value`
//! lines to stderr, each block closed by `progress=continue` or
//! `progress=end`:
//!
//! ```text
//! frame=1200
//! out_time_us=50050000
//! speed=1.25x
//! progress=continue
//! ```

use std::time::{Duration, Instant};

/// A snapshot of encode progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub processed: Duration,
    pub total: Duration,
    /// Remaining wall-clock time at the current speed.
    pub eta: Option<Duration>,
    /// Encode speed relative to real time.
    pub speed: Option<f64>,
    /// Set on the final block.
    pub finished: bool,
}

/// Accumulates `key=value` lines and yields throttled [`ProgressUpdate`]s.
#[derive(Debug)]
pub struct ProgressParser {
    total: Duration,
    interval: Duration,
    out_time: Option<Duration>,
    speed: Option<f64>,
    last_emit: Option<Instant>,
}

impl ProgressParser {
    pub fn new(total: Duration, interval: Duration) -> Self {
        Self {
            total,
            interval,
            out_time: None,
            speed: None,
            last_emit: None,
        }
    }

    /// Whether `line` belongs to the progress protocol rather than ffmpeg's
    /// human-readable diagnostics.
    pub fn is_progress_line(line: &str) -> bool {
        line.split_once('=').is_some_and(|(key, _)| {
            !key.is_empty()
                && key
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        })
    }

    /// Feed one line. Returns an update when a block closes and the throttle
    /// interval has elapsed, or always for the final block.
    pub fn feed(&mut self, line: &str) -> Option<ProgressUpdate> {
        self.feed_at(line, Instant::now())
    }

    pub(crate) fn feed_at(&mut self, line: &str, now: Instant) -> Option<ProgressUpdate> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key {
            // ffmpeg reports microseconds under out_time_ms too.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    if us >= 0 {
                        self.out_time = Some(Duration::from_micros(us as u64));
                    }
                }
                None
            }
            "speed" => {
                self.speed = value
                    .trim_end_matches('x')
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|s| s.is_finite() && *s > 0.0);
                None
            }
            "progress" => {
                let finished = value == "end";
                let due = self
                    .last_emit
                    .map_or(true, |last| now.duration_since(last) >= self.interval);
                if !(finished || due) {
                    return None;
                }
                self.last_emit = Some(now);
                Some(self.snapshot(finished))
            }
            _ => None,
        }
    }

    fn snapshot(&self, finished: bool) -> ProgressUpdate {
        let mut processed = self.out_time.unwrap_or_default();
        if !self.total.is_zero() {
            processed = processed.min(self.total);
        }
        if finished && !self.total.is_zero() {
            processed = self.total;
        }

        let eta = match self.speed {
            Some(speed) if !finished && !self.total.is_zero() => {
                let remaining = self.total.saturating_sub(processed).as_secs_f64();
                Some(Duration::from_secs_f64(remaining / speed))
            }
            _ if finished => Some(Duration::ZERO),
            _ => None,
        };

        ProgressUpdate {
            processed,
            total: self.total,
            eta,
            speed: self.speed,
            finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ProgressParser {
        ProgressParser::new(Duration::from_secs(100), Duration::from_secs(1))
    }

    #[test]
    fn block_yields_update_with_eta() {
        let mut p = parser();
        let now = Instant::now();
        assert!(p.feed_at("frame=100", now).is_none());
        assert!(p.feed_at("out_time_us=40000000", now).is_none());
        assert!(p.feed_at("speed=2.0x", now).is_none());
        let update = p.feed_at("progress=continue", now).unwrap();

        assert_eq!(update.processed, Duration::from_secs(40));
        assert_eq!(update.eta, Some(Duration::from_secs(30)));
        assert_eq!(update.speed, Some(2.0));
        assert_eq!(update.total, Duration::from_secs(100));
        assert!(!update.finished);
    }

    #[test]
    fn updates_are_throttled() {
        let mut p = parser();
        let t0 = Instant::now();
        p.feed_at("out_time_us=1000000", t0);
        assert!(p.feed_at("progress=continue", t0).is_some());
        p.feed_at("out_time_us=2000000", t0);
        assert!(p.feed_at("progress=continue", t0 + Duration::from_millis(500)).is_none());
        p.feed_at("out_time_us=3000000", t0);
        let update = p
            .feed_at("progress=continue", t0 + Duration::from_millis(1500))
            .unwrap();
        assert_eq!(update.processed, Duration::from_secs(3));
    }

    #[test]
    fn end_block_is_always_emitted_and_complete() {
        let mut p = parser();
        let t0 = Instant::now();
        p.feed_at("out_time_us=99000000", t0);
        p.feed_at("progress=continue", t0);
        let update = p.feed_at("progress=end", t0).unwrap();
        assert!(update.finished);
        assert_eq!(update.processed, Duration::from_secs(100));
        assert_eq!(update.eta, Some(Duration::ZERO));
    }

    #[test]
    fn unknown_speed_and_negative_time_are_ignored() {
        let mut p = parser();
        let now = Instant::now();
        p.feed_at("out_time_us=-9223372036854775807", now);
        p.feed_at("speed=N/A", now);
        let update = p.feed_at("progress=continue", now).unwrap();
        assert_eq!(update.processed, Duration::ZERO);
        assert_eq!(update.speed, None);
        assert_eq!(update.eta, None);
    }

    #[test]
    fn out_time_ms_is_microseconds() {
        let mut p = parser();
        let now = Instant::now();
        p.feed_at("out_time_ms=5000000", now);
        assert_eq!(
            p.feed_at("progress=continue", now).unwrap().processed,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn classifies_progress_lines() {
        assert!(ProgressParser::is_progress_line("out_time_us=100"));
        assert!(ProgressParser::is_progress_line("stream_0_0_q=28.0"));
        assert!(ProgressParser::is_progress_line("progress=end"));
        assert!(!ProgressParser::is_progress_line(
            "[matroska @ 0x55] Invalid data found when processing input"
        ));
        assert!(!ProgressParser::is_progress_line("Error: x=1"));
        assert!(!ProgressParser::is_progress_line("no equals here"));
    }
}
