//! Frame-to-rally pipeline for volleyball match video: detection filtering,
//! Kalman-tracked ball candidates, a parabolic-motion physics gate, a
//! kinematic movement classifier, and a hysteresis rally state machine that
//! emits padded, merged rally segments plus a per-frame debug metadata
//! stream.
//!
//! The video decoder, detection model, UI, storage, and debug-video muxer
//! are external collaborators behind the [`interfaces::Decoder`] and
//! [`interfaces::Detector`] traits; this crate owns only the pipeline
//! between them.

mod classifier;
mod config;
mod detection;
mod error;
mod geometry;
mod interfaces;
mod kalman;
mod metadata;
mod physics;
mod pipeline;
mod rally;
mod segment;
mod time;
mod track;
mod tracker;

pub use classifier::{MovementClass, MovementClassifier};
pub use config::{
    ClassifierConfig, CurvatureSign, DetectionConfig, PhysicsConfig, RallyConfig,
    RallyDeciderConfig, SegmentConfig, TrackerConfig, BALL_CLASS,
};
pub use detection::{Detection, DetectionFilter, RawDetection};
pub use error::RallyError;
pub use geometry::Rect;
pub use interfaces::{Decoder, Detector, Image};
pub use metadata::{MetadataRecord, ProcessingStats, RallyStateTag, TrackMetadata};
pub use physics::{CurvatureSignValue, PhysicsGate, PhysicsVerdict};
pub use pipeline::{run, RunOutput};
pub use rally::{RallyDecider, RallyEvent, RallySignal, RallyState};
pub use segment::{Segment, SegmentBuilder};
pub use time::{Quadratic, Time, Vec2};
pub use track::{BoundedDeque, Track, TrackPoint};
pub use tracker::{Tracker, TrackerStepOutput};
