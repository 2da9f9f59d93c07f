//! Pipeline configuration. Plain, fully-public data with tuned defaults, one
//! struct per stage, composed into a single `RallyConfig`.

use serde::{Deserialize, Serialize};

/// The axis convention the physics gate's quadratic-coefficient check uses.
/// Image-space `y` grows downward, so a real-world falling-then-rising ball
/// normally fits with `a > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurvatureSign {
    Positive,
    Negative,
}

impl CurvatureSign {
    pub fn matches(&self, a: f64) -> bool {
        match self {
            CurvatureSign::Positive => a > 0.0,
            CurvatureSign::Negative => a < 0.0,
        }
    }
}

pub const BALL_CLASS: u16 = 0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub min_conf: f32,
    pub ball_class: u16,
    pub min_area: f32,
    pub max_area: f32,
    pub nms_iou: f32,
    pub static_iou: f32,
    pub static_eps: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            min_conf: 0.3,
            ball_class: BALL_CLASS,
            min_area: 0.0001,
            max_area: 0.05,
            nms_iou: 0.45,
            static_iou: 0.9,
            static_eps: 0.002,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub history_cap: usize,
    pub max_misses: u32,
    pub max_age_without_projectile: u32,
    pub birth_conf: f32,
    pub min_confirm: usize,
    pub gate_threshold: f64,
    pub max_dt: f64,
    pub q_pos: f64,
    pub q_vel: f64,
    pub r_meas: f64,
    pub initial_p: f64,
    pub initial_p_vel: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            history_cap: 30,
            max_misses: 10,
            max_age_without_projectile: 60,
            birth_conf: 0.4,
            min_confirm: 5,
            gate_threshold: 9.21, // chi-squared, 2 dof, ~0.99 confidence
            max_dt: 1.0,
            q_pos: 1.0e-4,
            q_vel: 1.0e-2,
            r_meas: 5.0e-4,
            initial_p: 0.05,
            initial_p_vel: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhysicsConfig {
    pub window: usize,
    pub r2_min: f32,
    pub expected_curv_sign: CurvatureSign,
    pub a_min: f64,
    pub a_max: f64,
    pub max_jump: f64,
    pub speed_cv_max: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            window: 10,
            r2_min: 0.85,
            expected_curv_sign: CurvatureSign::Positive,
            a_min: 0.05,
            a_max: 20.0,
            max_jump: 0.2,
            speed_cv_max: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub static_path: f64,
    pub static_min_span: f64,
    pub airborne_min_span: f64,
    pub roll_ratio: f64,
    pub roll_speed_min: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            static_path: 0.01,
            static_min_span: 0.3,
            airborne_min_span: 0.25,
            roll_ratio: 0.15,
            roll_speed_min: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RallyDeciderConfig {
    pub w_start: f64,
    pub w_end: f64,
    pub w_rejoin: f64,
    pub start_ratio: f64,
    pub end_ratio: f64,
    pub cooldown_idle: f64,
}

impl Default for RallyDeciderConfig {
    fn default() -> Self {
        RallyDeciderConfig {
            w_start: 0.6,
            w_end: 1.5,
            w_rejoin: 0.5,
            start_ratio: 0.5,
            end_ratio: 0.2,
            cooldown_idle: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub pre_pad: f64,
    pub post_pad: f64,
    pub merge_gap: f64,
    pub min_duration: f64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            pre_pad: 0.5,
            post_pad: 0.5,
            merge_gap: 1.0,
            min_duration: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RallyConfig {
    pub detection: DetectionConfig,
    pub tracker: TrackerConfig,
    pub physics: PhysicsConfig,
    pub classifier: ClassifierConfig,
    pub rally: RallyDeciderConfig,
    pub segment: SegmentConfig,
    /// Advisory per-frame time budget in seconds. Never aborts a run.
    pub max_frame_time: f64,
}

impl Default for RallyConfig {
    fn default() -> Self {
        RallyConfig {
            detection: DetectionConfig::default(),
            tracker: TrackerConfig::default(),
            physics: PhysicsConfig::default(),
            classifier: ClassifierConfig::default(),
            rally: RallyDeciderConfig::default(),
            segment: SegmentConfig::default(),
            max_frame_time: 0.033,
        }
    }
}
