//! Multi-object tracker: predict, gate, assign, update, coast, birth, one
//! frame at a time, over a 4-state constant-velocity point filter with
//! Mahalanobis-gated optimal assignment.

use std::collections::HashSet;

use itertools::{Either, Itertools};
use pathfinding::prelude::{Matrix, kuhn_munkres_min};
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::detection::Detection;
use crate::error::RallyError;
use crate::kalman::{build_f, build_q, build_r, mahalanobis_sq, observation_matrix, Meas2};
use crate::time::Time;
use crate::track::{Track, TrackPoint};

/// Cost entries are scaled to integers for `kuhn_munkres_min`, which only
/// accepts integer weights.
const COST_MULTIPLIER: f64 = 1000.0;
/// Stand-in for "+infinity" in the integer cost matrix: large enough that
/// `kuhn_munkres_min` will never prefer it over a real assignment, but finite
/// so the algorithm still terminates.
const GATED_SENTINEL: i64 = i64::MAX / 4;

pub struct TrackerStepOutput {
    pub active_track_ids: Vec<u64>,
    pub confirmed_track_ids: Vec<u64>,
    pub scene_discontinuity: bool,
}

pub struct Tracker {
    config: TrackerConfig,
    pub tracks: Vec<Track>,
    last_timestamp: Option<Time>,
    next_id: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Tracker {
            config,
            tracks: Vec::new(),
            last_timestamp: None,
            next_id: 0,
        }
    }

    /// Allocates the next track id from this tracker's own counter (not a
    /// process-global one), so identical inputs to two separate `run()`
    /// calls assign identical ids.
    fn next_track_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Runs one frame of the predict/gate/assign/update/coast/birth protocol.
    /// `Err` is returned only for `NonMonotonicTime`; `SceneDiscontinuity` is
    /// reported via the output struct since it does not abort the run.
    pub fn step(
        &mut self,
        detections: &[Detection],
        timestamp: Time,
    ) -> Result<TrackerStepOutput, RallyError> {
        let dt = match self.last_timestamp {
            None => 0.0,
            Some(prev) => {
                let dt = timestamp - prev;
                if dt <= 0.0 {
                    return Err(RallyError::NonMonotonicTime {
                        previous: prev,
                        got: timestamp,
                    });
                }
                dt
            }
        };

        let mut scene_discontinuity = false;
        if dt > self.config.max_dt {
            warn!(dt, max_dt = self.config.max_dt, "scene discontinuity, dropping all tracks");
            self.tracks.clear();
            scene_discontinuity = true;
        } else if self.last_timestamp.is_some() {
            self.predict_all(dt);
        }

        self.last_timestamp = Some(timestamp);

        if !scene_discontinuity {
            self.associate_and_update(detections, timestamp);
        } else {
            // A scene cut still births fresh tracks for this frame's
            // detections, same as if the tracker had been empty.
            self.birth_unmatched(detections, timestamp, &(0..detections.len()).collect::<Vec<_>>());
        }

        self.tracks.retain(|t| t.is_alive(self.config.max_misses));
        self.drop_stale_unconfirmed();

        let active_track_ids = self.tracks.iter().map(|t| t.id).collect();
        let confirmed_track_ids = self
            .tracks
            .iter()
            .filter(|t| t.confirmed)
            .map(|t| t.id)
            .collect();

        Ok(TrackerStepOutput {
            active_track_ids,
            confirmed_track_ids,
            scene_discontinuity,
        })
    }

    /// Marks a track confirmed once it has accumulated enough history and at
    /// least one passing `PhysicsVerdict`. Called by the pipeline
    /// orchestrator, which owns the sibling `PhysicsGate`.
    /// Returns `true` iff this call is what flipped the track to confirmed.
    pub fn mark_confirmed_if_eligible(&mut self, track_id: u64, physics_passed: bool) -> bool {
        let Some(track) = self.tracks.iter_mut().find(|t| t.id == track_id) else {
            return false;
        };
        if !track.confirmed && track.history.len() >= self.config.min_confirm && physics_passed {
            track.confirmed = true;
            return true;
        }
        false
    }

    fn predict_all(&mut self, dt: f64) {
        let f = build_f(dt);
        let q = build_q(self.config.q_pos, self.config.q_vel);
        for track in &mut self.tracks {
            track.state.predict(&f, &q);
            track.age += 1;
        }
    }

    fn associate_and_update(&mut self, detections: &[Detection], timestamp: Time) {
        if self.tracks.is_empty() {
            self.birth_unmatched(detections, timestamp, &(0..detections.len()).collect::<Vec<_>>());
            return;
        }
        if detections.is_empty() {
            for track in &mut self.tracks {
                track.misses += 1;
            }
            return;
        }

        let h = observation_matrix();
        let r = build_r(self.config.r_meas);

        let n_tracks = self.tracks.len();
        let n_dets = detections.len();
        let mut cost = Matrix::new(n_tracks, n_dets, 0i64);
        let mut gated = Matrix::new(n_tracks, n_dets, true);

        for i in 0..n_tracks {
            let s = self.tracks[i].state.innovation_covariance(&h, &r);
            for (j, det) in detections.iter().enumerate() {
                let z = Meas2::new(det.bbox.center().0 as f64, det.bbox.center().1 as f64);
                let residual = z - h * self.tracks[i].state.x;
                let d2 = mahalanobis_sq(&residual, &s);
                if d2 < self.config.gate_threshold {
                    gated[(i, j)] = false;
                    cost[(i, j)] = (d2 * COST_MULTIPLIER) as i64;
                } else {
                    cost[(i, j)] = GATED_SENTINEL;
                }
            }
        }

        let (matched, unmatched_tracks, unmatched_dets) =
            solve_assignment(&cost, &gated, n_tracks, n_dets);

        for (track_idx, det_idx) in &matched {
            let det = &detections[*det_idx];
            let z = Meas2::new(det.bbox.center().0 as f64, det.bbox.center().1 as f64);
            let track = &mut self.tracks[*track_idx];
            track.state.update(z, &h, &r);
            track.history.push(TrackPoint {
                center: det.bbox.center(),
                timestamp,
            });
            track.misses = 0;
            track.last_update = timestamp;
        }

        for &track_idx in &unmatched_tracks {
            self.tracks[track_idx].misses += 1;
        }

        self.birth_unmatched(detections, timestamp, &unmatched_dets);
    }

    fn birth_unmatched(&mut self, detections: &[Detection], timestamp: Time, indices: &[usize]) {
        for &idx in indices {
            let det = &detections[idx];
            if det.confidence >= self.config.birth_conf {
                let id = self.next_track_id();
                debug!(class = det.class_id, track_id = id, "birthing new track");
                self.tracks.push(Track::new(
                    id,
                    det.bbox.center(),
                    timestamp,
                    self.config.history_cap,
                    self.config.initial_p,
                    self.config.initial_p_vel,
                ));
            }
        }
    }

    fn drop_stale_unconfirmed(&mut self) {
        let max_age = self.config.max_age_without_projectile;
        self.tracks
            .retain(|t| t.confirmed || t.age <= max_age);
    }
}

/// Runs `kuhn_munkres_min` over the (possibly rectangular) cost matrix and
/// rejects matches that were gated out.
fn solve_assignment(
    cost: &Matrix<i64>,
    gated: &Matrix<bool>,
    n_tracks: usize,
    n_dets: usize,
) -> (Vec<(usize, usize)>, Vec<usize>, Vec<usize>) {
    let transpose = cost.rows > cost.columns;
    let weights = if transpose { cost.transposed() } else { cost.clone() };

    let (_, assignment) = kuhn_munkres_min(&weights);

    let mut matched = Vec::new();
    let mut matched_tracks: HashSet<usize> = HashSet::new();
    let mut matched_dets: HashSet<usize> = HashSet::new();

    for (i, &j) in assignment.iter().enumerate() {
        let (track_idx, det_idx) = if transpose { (j, i) } else { (i, j) };
        if gated[(track_idx, det_idx)] {
            continue;
        }
        matched.push((track_idx, det_idx));
        matched_tracks.insert(track_idx);
        matched_dets.insert(det_idx);
    }

    let (unmatched_tracks, _): (Vec<usize>, Vec<usize>) =
        (0..n_tracks).partition_map(|i| {
            if matched_tracks.contains(&i) {
                Either::Right(i)
            } else {
                Either::Left(i)
            }
        });
    let (unmatched_dets, _): (Vec<usize>, Vec<usize>) =
        (0..n_dets).partition_map(|j| {
            if matched_dets.contains(&j) {
                Either::Right(j)
            } else {
                Either::Left(j)
            }
        });

    (matched, unmatched_tracks, unmatched_dets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::detection::Detection;
    use crate::geometry::Rect;

    fn det(cx: f32, cy: f32, t: Time) -> Detection {
        Detection {
            bbox: Rect::new(cx - 0.01, cy - 0.01, cx + 0.01, cy + 0.01),
            confidence: 0.9,
            class_id: 0,
            timestamp: t,
        }
    }

    #[test]
    fn birth_happens_for_confident_unmatched_detection() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let t0 = Time::from_secs_f64(0.0);
        let out = tracker.step(&[det(0.5, 0.5, t0)], t0).unwrap();
        assert_eq!(out.active_track_ids.len(), 1);
    }

    #[test]
    fn ids_are_per_tracker_and_restart_at_zero() {
        // Two separate trackers fed the same inputs must assign the same
        // ids, since id allocation is a field on `Tracker`, not a
        // process-global counter.
        let t0 = Time::from_secs_f64(0.0);

        let mut tracker_a = Tracker::new(TrackerConfig::default());
        let out_a = tracker_a.step(&[det(0.5, 0.5, t0)], t0).unwrap();

        let mut tracker_b = Tracker::new(TrackerConfig::default());
        let out_b = tracker_b.step(&[det(0.5, 0.5, t0)], t0).unwrap();

        assert_eq!(out_a.active_track_ids, out_b.active_track_ids);
        assert_eq!(tracker_a.tracks[0].id, 0);
    }

    /// Builds the tracker's own innovation covariance `S` for the single
    /// live track after one predict with the given `dt`, so a test can place
    /// a detection at a hand-computed Mahalanobis distance from it.
    fn innovation_covariance_for(tracker: &Tracker, dt: f64) -> crate::kalman::MeasCov2 {
        let mut state = tracker.tracks[0].state;
        let f = build_f(dt);
        let q = build_q(tracker.config.q_pos, tracker.config.q_vel);
        state.predict(&f, &q);
        let h = observation_matrix();
        let r = build_r(tracker.config.r_meas);
        state.innovation_covariance(&h, &r)
    }

    #[test]
    fn detection_at_gate_threshold_boundary_is_rejected_strictly() {
        // Mahalanobis distance is computed in f64 but a `Detection`'s bbox
        // (and hence its center) is stored as f32, so a displacement aimed
        // at landing bit-exactly on `gate_threshold` can round either side
        // of it once it round-trips through the bbox. Nudge the target
        // distance a relative 1e-4 past the threshold — many orders of
        // magnitude past the f32 rounding noise (~1e-7 relative) — so the
        // boundary is still exercised deterministically: this distance must
        // be rejected (gate is strict `<`), while a detection placed just
        // inside the threshold must associate.
        let config = TrackerConfig::default();
        let gate_threshold = config.gate_threshold;
        let mut tracker = Tracker::new(config);
        let t0 = Time::from_secs_f64(0.0);
        tracker.step(&[det(0.5, 0.5, t0)], t0).unwrap();

        let t1 = Time::from_secs_f64(0.033);
        let dt = t1 - t0; // same subtraction `Tracker::step` performs internally
        let s = innovation_covariance_for(&tracker, dt);
        let (px, py) = tracker.tracks[0].state.position();

        // Just past the boundary: rejected, births a second track.
        let dx_over = (gate_threshold * 1.0001 * s[(0, 0)]).sqrt();
        let out = tracker
            .step(&[det((px + dx_over) as f32, py as f32, t1)], t1)
            .unwrap();
        assert_eq!(
            out.active_track_ids.len(),
            2,
            "distance just past gate_threshold must be rejected"
        );
    }

    #[test]
    fn detection_just_inside_gate_threshold_associates() {
        let config = TrackerConfig::default();
        let gate_threshold = config.gate_threshold;
        let mut tracker = Tracker::new(config);
        let t0 = Time::from_secs_f64(0.0);
        tracker.step(&[det(0.5, 0.5, t0)], t0).unwrap();

        let t1 = Time::from_secs_f64(0.033);
        let dt = t1 - t0;
        let s = innovation_covariance_for(&tracker, dt);
        let (px, py) = tracker.tracks[0].state.position();

        // Just inside the boundary: accepted, updates the existing track.
        let dx_under = (gate_threshold * 0.9999 * s[(0, 0)]).sqrt();
        let out = tracker
            .step(&[det((px + dx_under) as f32, py as f32, t1)], t1)
            .unwrap();
        assert_eq!(
            out.active_track_ids.len(),
            1,
            "distance just inside gate_threshold must associate"
        );
    }

    #[test]
    fn non_monotonic_time_is_rejected() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let t0 = Time::from_secs_f64(1.0);
        tracker.step(&[det(0.5, 0.5, t0)], t0).unwrap();
        let t1 = Time::from_secs_f64(0.5);
        let result = tracker.step(&[], t1);
        assert!(matches!(result, Err(RallyError::NonMonotonicTime { .. })));
    }

    #[test]
    fn scene_cut_drops_all_tracks() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let t0 = Time::from_secs_f64(0.0);
        tracker.step(&[det(0.5, 0.5, t0)], t0).unwrap();
        let t1 = Time::from_secs_f64(100.0);
        let out = tracker.step(&[], t1).unwrap();
        assert!(out.scene_discontinuity);
        assert!(tracker.tracks.is_empty());
    }

    #[test]
    fn history_stays_within_cap() {
        let config = TrackerConfig {
            history_cap: 5,
            ..TrackerConfig::default()
        };
        let mut tracker = Tracker::new(config);
        let mut t = 0.0;
        for i in 0..20 {
            let time = Time::from_secs_f64(t);
            tracker.step(&[det(0.3 + 0.01 * i as f32, 0.5, time)], time).unwrap();
            t += 0.033;
        }
        for track in &tracker.tracks {
            assert!(track.history.len() <= 5);
        }
    }

    #[test]
    fn tracker_reassociates_across_a_miss() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let mut t = 0.0;
        let time = Time::from_secs_f64(t);
        tracker.step(&[det(0.5, 0.5, time)], time).unwrap();
        t += 0.033;
        let time = Time::from_secs_f64(t);
        tracker.step(&[], time).unwrap(); // miss
        t += 0.033;
        let time = Time::from_secs_f64(t);
        let out = tracker.step(&[det(0.51, 0.5, time)], time).unwrap();
        assert_eq!(out.active_track_ids.len(), 1, "should reassociate, not birth a second track");
    }
}
