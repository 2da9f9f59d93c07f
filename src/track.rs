//! Track entity and bounded history. Ids are allocated by the owning
//! `Tracker` (one counter per tracker, not process-global) so that two
//! `run()` calls in the same process produce identical id assignments for
//! identical inputs.

use std::collections::VecDeque;

use crate::kalman::KalmanState;
use crate::time::Time;

/// A `VecDeque` that silently drops its oldest element once `capacity` is
/// reached, rather than growing unbounded.
#[derive(Debug, Clone)]
pub struct BoundedDeque<T> {
    capacity: usize,
    inner: VecDeque<T>,
}

impl<T> BoundedDeque<T> {
    pub fn new(capacity: usize) -> Self {
        BoundedDeque {
            capacity,
            inner: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.inner.len() >= self.capacity {
            self.inner.pop_front();
        }
        self.inner.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }

    pub fn as_slices_vec(&self) -> Vec<&T> {
        self.inner.iter().collect()
    }

    pub fn back(&self) -> Option<&T> {
        self.inner.back()
    }
}

/// One association (or birth) point recorded on a track's history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub center: (f32, f32),
    pub timestamp: Time,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u64,
    pub state: KalmanState,
    pub history: BoundedDeque<TrackPoint>,
    pub age: u32,
    pub misses: u32,
    pub last_update: Time,
    pub confirmed: bool,
}

impl Track {
    pub fn new(
        id: u64,
        center: (f32, f32),
        timestamp: Time,
        history_cap: usize,
        initial_p: f64,
        initial_p_vel: f64,
    ) -> Self {
        let mut history = BoundedDeque::new(history_cap);
        history.push(TrackPoint { center, timestamp });
        Track {
            id,
            state: KalmanState::new(center, initial_p, initial_p_vel),
            history,
            age: 0,
            misses: 0,
            last_update: timestamp,
            confirmed: false,
        }
    }

    pub fn is_alive(&self, max_misses: u32) -> bool {
        self.misses < max_misses
    }

    pub fn recent_window(&self, n: usize) -> Vec<TrackPoint> {
        let all = self.history.as_slices_vec();
        let start = all.len().saturating_sub(n);
        all[start..].iter().map(|p| **p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_deque_drops_oldest_on_overflow() {
        let mut d = BoundedDeque::new(2);
        d.push(1);
        d.push(2);
        d.push(3);
        assert_eq!(d.len(), 2);
        assert_eq!(d.as_slices_vec(), vec![&2, &3]);
    }

    #[test]
    fn history_len_never_exceeds_cap() {
        let mut track = Track::new(0, (0.0, 0.0), Time::zero(), 3, 0.1, 1.0);
        for i in 0..10 {
            track.history.push(TrackPoint {
                center: (i as f32, 0.0),
                timestamp: Time::from_secs_f64(i as f64),
            });
        }
        assert!(track.history.len() <= 3);
    }
}
