//! Adaptive silence analysis.
//!
//! [`SilenceTracker`] decides when a spoken utterance is complete from a
//! stream of per-tick signal levels. The noise floor is an exponential
//! moving average with a ceiling; the speech and silence thresholds ride a
//! fixed margin above it. The tracker is pure state fed with explicit
//! timestamps, so all timing scenarios are testable without a runtime.

use std::time::{Duration, Instant};

/// Analysis tick period.
pub const TICK_INTERVAL: Duration = Duration::from_millis(120);

/// Utterances shorter than this are discarded as noise.
pub const MIN_UTTERANCE: Duration = Duration::from_millis(300);

/// Noise floor before any signal has been observed.
pub const INITIAL_NOISE_FLOOR_DB: f32 = -60.0;

/// Ceiling for the adaptive noise floor; loud environments cannot push the
/// speech threshold out of reach.
pub const NOISE_FLOOR_CEILING_DB: f32 = -30.0;

/// Margin above the noise floor at which a tick counts as speech.
pub const SPEECH_MARGIN_DB: f32 = 12.0;

/// Margin above the noise floor under which a tick counts as silence.
pub const SILENCE_MARGIN_DB: f32 = 4.0;

/// Level reported for a tick that observed no samples at all.
pub const SILENT_LEVEL_DB: f32 = -90.0;

/// RMS level of a sample window in dBFS.
pub fn level_dbfs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return SILENT_LEVEL_DB;
    }
    let mean_sq = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = mean_sq.sqrt().max(1e-10);
    20.0 * rms.log10()
}

/// Decision produced by one analysis tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickVerdict {
    /// Keep recording.
    Continue,
    /// No speech was ever detected within the grace window; there is
    /// nothing to transcribe.
    NoSpeech,
    /// Speech was heard and has been followed by enough silence.
    UtteranceComplete,
    /// The unconditional duration ceiling was hit mid-speech.
    HardCap,
}

/// Per-session silence detection state.
#[derive(Debug)]
pub struct SilenceTracker {
    started_at: Instant,
    noise_floor: f32,
    ever_heard: bool,
    last_heard_at: Instant,
    silence_timeout: Duration,
    no_speech_wait: Duration,
    hard_cap: Option<Duration>,
}

impl SilenceTracker {
    /// `no_speech_grace` is a floor: the actual give-up point for sessions
    /// that never contain speech is `max(grace, 2.5 * silence_timeout)`.
    pub fn new(
        silence_timeout: Duration,
        no_speech_grace: Duration,
        hard_cap: Option<Duration>,
        now: Instant,
    ) -> Self {
        let no_speech_wait = no_speech_grace.max(silence_timeout * 5 / 2);
        Self {
            started_at: now,
            noise_floor: INITIAL_NOISE_FLOOR_DB,
            ever_heard: false,
            last_heard_at: now,
            silence_timeout,
            no_speech_wait,
            hard_cap,
        }
    }

    /// Feed one tick of signal level and decide whether to keep going.
    pub fn tick(&mut self, level_db: f32, now: Instant) -> TickVerdict {
        self.noise_floor =
            (self.noise_floor * 0.97 + level_db * 0.03).min(NOISE_FLOOR_CEILING_DB);

        let speech_threshold = self.noise_floor + SPEECH_MARGIN_DB;
        let silence_threshold = self.noise_floor + SILENCE_MARGIN_DB;

        if level_db > speech_threshold {
            self.ever_heard = true;
            self.last_heard_at = now;
        }

        if !self.ever_heard {
            if now.duration_since(self.started_at) >= self.no_speech_wait {
                return TickVerdict::NoSpeech;
            }
        } else if level_db < silence_threshold
            && now.duration_since(self.last_heard_at) >= self.silence_timeout
        {
            return TickVerdict::UtteranceComplete;
        }

        if let Some(cap) = self.hard_cap {
            if now.duration_since(self.started_at) >= cap {
                return TickVerdict::HardCap;
            }
        }

        TickVerdict::Continue
    }

    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    pub fn ever_heard(&self) -> bool {
        self.ever_heard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOUD: f32 = -10.0;
    const QUIET: f32 = -70.0;

    /// Drive the tracker on a 120 ms grid until it stops or `limit_ms`.
    /// `level` maps elapsed milliseconds to a signal level.
    fn run(tracker: &mut SilenceTracker, start: Instant, limit_ms: u64, level: impl Fn(u64) -> f32)
        -> Option<(u64, TickVerdict)>
    {
        let mut t = 120;
        while t <= limit_ms {
            let verdict = tracker.tick(level(t), start + Duration::from_millis(t));
            if verdict != TickVerdict::Continue {
                return Some((t, verdict));
            }
            t += 120;
        }
        None
    }

    #[test]
    fn test_level_dbfs() {
        assert_eq!(level_dbfs(&[]), SILENT_LEVEL_DB);
        // Full-scale square wave is 0 dBFS.
        assert!(level_dbfs(&[1.0; 64]).abs() < 0.01);
        // Half amplitude is about -6 dBFS.
        assert!((level_dbfs(&[0.5; 64]) + 6.02).abs() < 0.1);
    }

    #[test]
    fn test_speech_then_silence_stops_after_timeout() {
        // 400 ms of loud input, then silence, with a 1500 ms timeout:
        // stop fires around 2000 ms via the utterance branch, not the cap.
        let start = Instant::now();
        let mut tracker = SilenceTracker::new(
            Duration::from_millis(1500),
            Duration::from_millis(2500),
            Some(Duration::from_millis(5000)),
            start,
        );

        let stop = run(&mut tracker, start, 6000, |t| if t <= 400 { LOUD } else { QUIET });
        let (at, verdict) = stop.expect("tracker never stopped");
        assert_eq!(verdict, TickVerdict::UtteranceComplete);
        assert!((1860..=2040).contains(&at), "stopped at {} ms", at);
    }

    #[test]
    fn test_never_heard_stops_at_grace_window() {
        // Never exceeds the speech threshold; timeout 1500 ms means the
        // give-up point is max(2500, 1500 * 2.5) = 3750 ms.
        let start = Instant::now();
        let mut tracker = SilenceTracker::new(
            Duration::from_millis(1500),
            Duration::from_millis(2500),
            None,
            start,
        );

        let stop = run(&mut tracker, start, 6000, |_| QUIET);
        let (at, verdict) = stop.expect("tracker never stopped");
        assert_eq!(verdict, TickVerdict::NoSpeech);
        assert!((3750..=3870).contains(&at), "stopped at {} ms", at);
    }

    #[test]
    fn test_short_grace_still_floors_at_2500() {
        let start = Instant::now();
        let mut tracker = SilenceTracker::new(
            Duration::from_millis(400),
            Duration::from_millis(2500),
            None,
            start,
        );

        let stop = run(&mut tracker, start, 4000, |_| QUIET);
        let (at, verdict) = stop.expect("tracker never stopped");
        assert_eq!(verdict, TickVerdict::NoSpeech);
        // max(2500, 400 * 2.5 = 1000) = 2500.
        assert!((2500..=2640).contains(&at), "stopped at {} ms", at);
    }

    #[test]
    fn test_hard_cap_stops_ongoing_speech() {
        let start = Instant::now();
        let mut tracker = SilenceTracker::new(
            Duration::from_millis(1500),
            Duration::from_millis(2500),
            Some(Duration::from_millis(5000)),
            start,
        );

        let stop = run(&mut tracker, start, 8000, |_| LOUD);
        let (at, verdict) = stop.expect("tracker never stopped");
        assert_eq!(verdict, TickVerdict::HardCap);
        assert!((5000..=5160).contains(&at), "stopped at {} ms", at);
    }

    #[test]
    fn test_no_hard_cap_keeps_recording_through_speech() {
        let start = Instant::now();
        let mut tracker = SilenceTracker::new(
            Duration::from_millis(1500),
            Duration::from_millis(2500),
            None,
            start,
        );

        assert!(run(&mut tracker, start, 20_000, |_| LOUD).is_none());
        assert!(tracker.ever_heard());
    }

    #[test]
    fn test_intermittent_speech_resets_silence_clock() {
        // Speech at 120-360 ms and again at 1200 ms: the silence timeout
        // counts from the last heard tick.
        let start = Instant::now();
        let mut tracker = SilenceTracker::new(
            Duration::from_millis(1500),
            Duration::from_millis(2500),
            None,
            start,
        );

        let stop = run(&mut tracker, start, 6000, |t| {
            if t <= 360 || t == 1200 { LOUD } else { QUIET }
        });
        let (at, verdict) = stop.expect("tracker never stopped");
        assert_eq!(verdict, TickVerdict::UtteranceComplete);
        // 1200 + 1500 = 2700, next tick on the grid is 2760.
        assert!((2700..=2880).contains(&at), "stopped at {} ms", at);
    }

    #[test]
    fn test_noise_floor_is_capped() {
        let start = Instant::now();
        let mut tracker = SilenceTracker::new(
            Duration::from_millis(1500),
            Duration::from_millis(2500),
            None,
            start,
        );

        // Sustained loud input drags the floor upward, but never past the cap.
        for i in 1..=200 {
            tracker.tick(-5.0, start + Duration::from_millis(i * 120));
        }
        assert!(tracker.noise_floor() <= NOISE_FLOOR_CEILING_DB);
    }

    #[test]
    fn test_noise_floor_adapts_downward() {
        let start = Instant::now();
        let mut tracker = SilenceTracker::new(
            Duration::from_millis(1500),
            Duration::from_millis(60_000),
            None,
            start,
        );

        let before = tracker.noise_floor();
        for i in 1..=50 {
            tracker.tick(-80.0, start + Duration::from_millis(i * 120));
        }
        assert!(tracker.noise_floor() < before);
    }
}
