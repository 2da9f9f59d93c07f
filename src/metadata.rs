//! Per-frame metadata contract and run statistics. `stats` is a plain
//! aggregate returned on completion, with no process-wide state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::MovementClass;
use crate::detection::Detection;
use crate::physics::PhysicsVerdict;
use crate::rally::RallyState;
use crate::time::Time;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub id: u64,
    pub recent_history: Vec<(f32, f32, Time)>,
    pub class: MovementClass,
    pub physics: PhysicsVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub t: Time,
    pub detections: Vec<Detection>,
    pub tracks: Vec<TrackMetadata>,
    pub rally_state: RallyStateTag,
}

/// Serializable tag mirroring [`RallyState`]; the state's carried timestamp
/// (e.g. `Arming { since }`) is flattened into an explicit field since
/// `MetadataRecord` is the stable wire contract consumers serialize.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RallyStateTag {
    Idle,
    Arming,
    Active,
    Cooling,
}

impl From<RallyState> for RallyStateTag {
    fn from(state: RallyState) -> Self {
        match state {
            RallyState::Idle => RallyStateTag::Idle,
            RallyState::Arming { .. } => RallyStateTag::Arming,
            RallyState::Active => RallyStateTag::Active,
            RallyState::Cooling { .. } => RallyStateTag::Cooling,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub frames_in: u64,
    pub frames_out: u64,
    pub detections_total: u64,
    pub tracks_confirmed: u64,
    pub rallies: u64,
    pub non_monotonic_dropped: u64,
    pub scene_discontinuities: u64,
    pub fit_degenerate_count: u64,
    pub invalid_detections_dropped: u64,
    pub cancelled: bool,
    #[serde(skip, default)]
    pub processing_duration: Duration,
    #[serde(skip, default)]
    pub avg_frame_time: Duration,
}

impl ProcessingStats {
    pub fn finalize_timing(&mut self, total: Duration) {
        self.processing_duration = total;
        self.avg_frame_time = if self.frames_in > 0 {
            total / self.frames_in as u32
        } else {
            Duration::ZERO
        };
    }
}
