//! Rally state machine with hysteresis: Idle/Arming/Active/Cooling, driven by
//! sliding-window evidence ratios over bounded ring buffers.

use std::collections::VecDeque;

use crate::config::RallyDeciderConfig;
use crate::time::Time;

/// One frame's worth of rally evidence.
#[derive(Debug, Clone, Copy)]
pub struct RallySignal {
    pub time: Time,
    pub any_projectile: bool,
    pub any_active_track: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RallyState {
    Idle,
    Arming { since: Time },
    Active,
    Cooling { since: Time },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RallyEvent {
    Start(Time),
    End(Time),
}

/// Bounded ring buffer of timestamped booleans backing the sliding-window
/// ratio checks, evicted lazily so the ratio stays O(1) amortized.
struct RingBuffer {
    window_secs: f64,
    entries: VecDeque<(Time, bool)>,
    true_count: usize,
}

impl RingBuffer {
    fn new(window_secs: f64) -> Self {
        RingBuffer {
            window_secs,
            entries: VecDeque::new(),
            true_count: 0,
        }
    }

    fn push(&mut self, time: Time, value: bool) {
        self.entries.push_back((time, value));
        if value {
            self.true_count += 1;
        }
        self.evict_before(time);
    }

    fn evict_before(&mut self, now: Time) {
        while let Some(&(t, v)) = self.entries.front() {
            if now - t > self.window_secs {
                if v {
                    self.true_count -= 1;
                }
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn ratio(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.true_count as f64 / self.entries.len() as f64
    }
}

pub struct RallyDecider {
    config: RallyDeciderConfig,
    state: RallyState,
    start_window: RingBuffer,
    end_window: RingBuffer,
    last_evidence_time: Option<Time>,
}

impl RallyDecider {
    pub fn new(config: RallyDeciderConfig) -> Self {
        RallyDecider {
            start_window: RingBuffer::new(config.w_start),
            end_window: RingBuffer::new(config.w_end),
            config,
            state: RallyState::Idle,
            last_evidence_time: None,
        }
    }

    pub fn state(&self) -> RallyState {
        self.state
    }

    /// Advances the state machine by one frame. At most one event is emitted
    /// per frame; events come out in increasing timestamp order as long as
    /// frames are fed in increasing timestamp order.
    pub fn step(&mut self, signal: RallySignal) -> Option<RallyEvent> {
        self.start_window.push(signal.time, signal.any_projectile);
        self.end_window
            .push(signal.time, signal.any_projectile || signal.any_active_track);

        if signal.any_projectile {
            self.last_evidence_time = Some(signal.time);
        }

        match self.state {
            RallyState::Idle => {
                if signal.any_projectile {
                    self.state = RallyState::Arming { since: signal.time };
                }
                None
            }
            RallyState::Arming { since } => {
                if self.start_window.ratio() >= self.config.start_ratio {
                    self.state = RallyState::Active;
                    return Some(RallyEvent::Start(since));
                }
                let idle_for = self
                    .last_evidence_time
                    .map(|t| signal.time - t)
                    .unwrap_or(f64::INFINITY);
                if idle_for >= self.config.cooldown_idle {
                    self.state = RallyState::Idle;
                }
                None
            }
            RallyState::Active => {
                if self.end_window.ratio() < self.config.end_ratio {
                    self.state = RallyState::Cooling { since: signal.time };
                }
                None
            }
            RallyState::Cooling { since } => {
                if signal.any_projectile || signal.any_active_track {
                    self.state = RallyState::Active;
                    return None;
                }
                let cooling_for = signal.time - since;
                if cooling_for >= self.config.w_rejoin {
                    self.state = RallyState::Idle;
                    return Some(RallyEvent::End(since));
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(t: f64, projectile: bool, active: bool) -> RallySignal {
        RallySignal {
            time: Time::from_secs_f64(t),
            any_projectile: projectile,
            any_active_track: active,
        }
    }

    #[test]
    fn stays_idle_without_evidence() {
        let config = RallyDeciderConfig::default();
        let mut decider = RallyDecider::new(config);
        for i in 0..30 {
            let event = decider.step(signal(i as f64 * 0.1, false, false));
            assert!(event.is_none());
        }
        assert_eq!(decider.state(), RallyState::Idle);
    }

    #[test]
    fn starts_rally_after_sustained_evidence() {
        let config = RallyDeciderConfig::default();
        let mut decider = RallyDecider::new(config);
        let mut started = false;
        for i in 0..30 {
            let t = i as f64 * 0.05;
            if let Some(RallyEvent::Start(_)) = decider.step(signal(t, true, true)) {
                started = true;
                break;
            }
        }
        assert!(started);
        assert_eq!(decider.state(), RallyState::Active);
    }

    #[test]
    fn ends_rally_after_sustained_absence() {
        let config = RallyDeciderConfig::default();
        let mut decider = RallyDecider::new(config);
        let mut t = 0.0;
        for _ in 0..30 {
            decider.step(signal(t, true, true));
            t += 0.05;
        }
        assert_eq!(decider.state(), RallyState::Active);

        let mut ended = false;
        for _ in 0..60 {
            if let Some(RallyEvent::End(_)) = decider.step(signal(t, false, false)) {
                ended = true;
                break;
            }
            t += 0.05;
        }
        assert!(ended);
        assert_eq!(decider.state(), RallyState::Idle);
    }

    #[test]
    fn cooling_rejoins_active_on_evidence_return() {
        let config = RallyDeciderConfig::default();
        let mut decider = RallyDecider::new(config);
        let mut t = 0.0;
        for _ in 0..30 {
            decider.step(signal(t, true, true));
            t += 0.05;
        }
        // drop evidence briefly, but less than w_rejoin
        decider.step(signal(t, false, false));
        t += 0.05;
        decider.step(signal(t, false, false));
        t += 0.05;
        let event = decider.step(signal(t, true, true));
        assert!(event.is_none());
        assert_eq!(decider.state(), RallyState::Active);
    }
}
