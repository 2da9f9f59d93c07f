//! Segment accumulation and shaping: open/close on rally events, pad, merge
//! adjacent segments within a gap, then clamp and filter by duration.

use serde::{Deserialize, Serialize};

use crate::config::SegmentConfig;
use crate::rally::RallyEvent;
use crate::time::Time;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Time,
    pub end: Time,
}

pub struct SegmentBuilder {
    config: SegmentConfig,
    open_start: Option<Time>,
    output: Vec<Segment>,
}

impl SegmentBuilder {
    pub fn new(config: SegmentConfig) -> Self {
        SegmentBuilder {
            config,
            open_start: None,
            output: Vec::new(),
        }
    }

    /// Opens, closes, pads and merges the output for one rally event.
    pub fn on_event(&mut self, event: RallyEvent) {
        match event {
            RallyEvent::Start(t) => {
                let padded = Time::from_secs_f64((t.as_secs_f64() - self.config.pre_pad).max(0.0));
                self.open_start = Some(padded);
            }
            RallyEvent::End(u) => {
                let Some(start) = self.open_start.take() else {
                    return;
                };
                let end = Time::from_secs_f64(u.as_secs_f64() + self.config.post_pad);
                let segment = Segment { start, end };
                self.append_and_merge(segment);
            }
        }
    }

    fn append_and_merge(&mut self, segment: Segment) {
        if let Some(prev) = self.output.last_mut() {
            if segment.start.as_secs_f64() - prev.end.as_secs_f64() <= self.config.merge_gap {
                prev.end = Time::from_secs_f64(prev.end.as_secs_f64().max(segment.end.as_secs_f64()));
                return;
            }
        }
        self.output.push(segment);
    }

    /// Forces an immediate close of any open segment (cancellation path)
    /// before final clamping/filtering.
    pub fn force_close(&mut self, at: Time) {
        if self.open_start.is_some() {
            self.on_event(RallyEvent::End(at));
        }
    }

    /// Clamps the output to `[0, duration]` and drops segments shorter than
    /// `min_duration` after padding, consuming the builder.
    pub fn finish(mut self, duration: Time) -> Vec<Segment> {
        if self.open_start.is_some() {
            self.force_close(duration);
        }

        let duration_secs = duration.as_secs_f64();
        self.output
            .into_iter()
            .filter_map(|seg| {
                let start = seg.start.as_secs_f64().max(0.0);
                let end = seg.end.as_secs_f64().min(duration_secs);
                if end - start < self.config.min_duration {
                    return None;
                }
                Some(Segment {
                    start: Time::from_secs_f64(start),
                    end: Time::from_secs_f64(end),
                })
            })
            .collect()
    }
}
