//! Pipeline orchestrator: drives detect -> filter -> track -> physics ->
//! classify -> rally -> segment for every decoded frame, accumulating a
//! metadata stream and run statistics.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::classifier::MovementClassifier;
use crate::config::RallyConfig;
use crate::detection::DetectionFilter;
use crate::error::RallyError;
use crate::interfaces::{Decoder, Detector};
use crate::metadata::{MetadataRecord, ProcessingStats, TrackMetadata};
use crate::physics::PhysicsGate;
use crate::rally::{RallyDecider, RallyEvent, RallySignal};
use crate::segment::{Segment, SegmentBuilder};
use crate::time::Time;
use crate::tracker::Tracker;

pub struct RunOutput {
    pub segments: Vec<Segment>,
    pub metadata_stream: Vec<MetadataRecord>,
    pub stats: ProcessingStats,
}

/// Drives the pipeline to completion or cancellation. `cancel` is polled at
/// every frame boundary; it never aborts mid-frame.
pub fn run<D: Decoder, Dt: Detector>(
    config: RallyConfig,
    decoder: &mut D,
    detector: &Dt,
    cancel: &dyn Fn() -> bool,
) -> Result<RunOutput, RallyError> {
    let started = Instant::now();

    let mut detection_filter = DetectionFilter::new(config.detection);
    let mut tracker = Tracker::new(config.tracker);
    let physics_gate = PhysicsGate::new(config.physics);
    let classifier = MovementClassifier::new(config.classifier);
    let mut rally_decider = RallyDecider::new(config.rally);
    let mut segment_builder = SegmentBuilder::new(config.segment);

    let mut stats = ProcessingStats::default();
    let mut metadata_stream = Vec::new();
    let mut last_time: Option<Time> = None;
    let mut rally_active = false;

    loop {
        if cancel() {
            info!("cancellation observed at frame boundary");
            stats.cancelled = true;
            if rally_active {
                if let Some(t) = last_time {
                    segment_builder.force_close(t);
                }
            }
            break;
        }

        let Some((timestamp, image)) = decoder.next_frame() else {
            break;
        };

        let frame_started = Instant::now();
        stats.frames_in += 1;

        let raw_detections = detector.detect(&image);
        stats.detections_total += raw_detections.len() as u64;

        let detections = detection_filter.filter(raw_detections, timestamp);
        stats.invalid_detections_dropped = detection_filter.invalid_dropped;

        let step_result = tracker.step(&detections, timestamp);
        let tracker_out = match step_result {
            Ok(out) => out,
            Err(RallyError::NonMonotonicTime { previous, got }) => {
                stats.non_monotonic_dropped += 1;
                warn!(?previous, ?got, "dropping frame with non-monotonic timestamp");
                continue;
            }
            Err(other) => return Err(other),
        };

        if tracker_out.scene_discontinuity {
            stats.scene_discontinuities += 1;
            if rally_active {
                if let Some(t) = last_time {
                    segment_builder.force_close(t);
                }
                rally_decider = RallyDecider::new(config.rally);
                rally_active = false;
            }
        }

        let mut track_metadata = Vec::with_capacity(tracker.tracks.len());
        // (id, is_projectile this frame), used below to raise `any_projectile`
        // only for tracks that are confirmed — the glossary's "projectile
        // evidence" is a *confirmed* track whose window passes PhysicsGate,
        // not any track that happens to pass it once.
        let mut track_evidence = Vec::with_capacity(tracker.tracks.len());

        for track in &tracker.tracks {
            let window = track.recent_window(config.physics.window);
            if window.len() < 3 {
                stats.fit_degenerate_count += 1;
                debug!(track_id = track.id, "physics fit degenerate, treated as non-projectile");
            }
            let verdict = physics_gate.evaluate(&window);

            let (class, _confidence) = classifier.classify(&window, &verdict);

            track_evidence.push((track.id, verdict.is_projectile));

            track_metadata.push(TrackMetadata {
                id: track.id,
                recent_history: window
                    .iter()
                    .map(|p| (p.center.0, p.center.1, p.timestamp))
                    .collect(),
                class,
                physics: verdict,
            });
        }

        for &(id, is_projectile) in &track_evidence {
            if tracker.mark_confirmed_if_eligible(id, is_projectile) {
                stats.tracks_confirmed += 1;
            }
        }

        // A track's confirmation can flip on this very frame (the pass that
        // confirms it is itself a passing window), so `any_projectile` reads
        // `confirmed` after the update above, not before it.
        let any_projectile = track_evidence.iter().any(|&(id, is_projectile)| {
            is_projectile
                && tracker
                    .tracks
                    .iter()
                    .find(|t| t.id == id)
                    .map(|t| t.confirmed)
                    .unwrap_or(false)
        });

        let any_active_track = !tracker.tracks.is_empty();
        let signal = RallySignal {
            time: timestamp,
            any_projectile,
            any_active_track,
        };
        if let Some(event) = rally_decider.step(signal) {
            match event {
                RallyEvent::Start(_) => {
                    rally_active = true;
                }
                RallyEvent::End(_) => {
                    rally_active = false;
                    stats.rallies += 1;
                }
            }
            segment_builder.on_event(event);
        }

        metadata_stream.push(MetadataRecord {
            t: timestamp,
            detections,
            tracks: track_metadata,
            rally_state: rally_decider.state().into(),
        });
        stats.frames_out += 1;
        last_time = Some(timestamp);

        let frame_elapsed = frame_started.elapsed();
        if frame_elapsed.as_secs_f64() > config.max_frame_time {
            debug!(
                elapsed_ms = frame_elapsed.as_secs_f64() * 1000.0,
                budget_ms = config.max_frame_time * 1000.0,
                "frame exceeded advisory time budget"
            );
        }
    }

    let duration = decoder.duration();
    let segments = segment_builder.finish(duration);
    stats.finalize_timing(started.elapsed());

    Ok(RunOutput {
        segments,
        metadata_stream,
        stats,
    })
}
