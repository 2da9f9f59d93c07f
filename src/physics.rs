//! Parabolic-motion gate. Stateless and deterministic — calling
//! [`PhysicsGate::evaluate`] twice on the same window yields the identical
//! verdict by construction.

use crate::config::PhysicsConfig;
use crate::error::RallyError;
use crate::time::{fit_quadratic, r_squared};
use crate::track::TrackPoint;

/// Sign of the fitted quadratic coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CurvatureSignValue {
    Positive,
    Negative,
    Zero,
}

impl CurvatureSignValue {
    fn of(a: f64) -> Self {
        if a > 0.0 {
            CurvatureSignValue::Positive
        } else if a < 0.0 {
            CurvatureSignValue::Negative
        } else {
            CurvatureSignValue::Zero
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PhysicsVerdict {
    pub is_projectile: bool,
    pub r_squared: f32,
    pub curvature_sign: CurvatureSignValue,
    pub confidence: f32,
}

pub struct PhysicsGate {
    config: PhysicsConfig,
}

impl PhysicsGate {
    pub fn new(config: PhysicsConfig) -> Self {
        PhysicsGate { config }
    }

    /// Fits a quadratic to `window`, then checks curvature sign, R², velocity
    /// consistency, jump continuity and acceleration magnitude.
    pub fn evaluate(&self, window: &[TrackPoint]) -> PhysicsVerdict {
        if window.len() < 3 {
            return self.insufficient_data();
        }

        let t0 = window[0].timestamp.as_secs_f64();
        let points: Vec<(f64, f64)> = window
            .iter()
            .map(|p| (p.timestamp.as_secs_f64() - t0, p.center.1 as f64))
            .collect();

        let fit = match fit_quadratic(&points) {
            Ok(f) => f,
            Err(RallyError::FitDegenerate) | Err(_) => return self.insufficient_data(),
        };

        let r2 = r_squared(&points, &fit);
        let sign_ok = self.config.expected_curv_sign.matches(fit.a);

        let (velocity_ok, velocity_margin) = self.velocity_consistency(window);
        let (no_jumps, jump_margin) = self.no_discontinuous_jumps(window);
        let accel_ok = fit.a.abs() >= self.config.a_min && fit.a.abs() <= self.config.a_max;

        let is_projectile =
            r2 >= self.config.r2_min as f64 && sign_ok && velocity_ok && no_jumps && accel_ok;

        let r2_margin = (r2 as f32).clamp(0.0, 1.0);
        let sign_margin = if sign_ok { 1.0 } else { 0.0 };
        let accel_margin = if accel_ok { 1.0 } else { 0.0 };

        let confidence = ((r2_margin as f64 + sign_margin + velocity_margin + jump_margin + accel_margin) / 5.0)
            .clamp(0.0, 1.0) as f32;

        PhysicsVerdict {
            is_projectile,
            r_squared: r2 as f32,
            curvature_sign: CurvatureSignValue::of(fit.a),
            confidence,
        }
    }

    fn insufficient_data(&self) -> PhysicsVerdict {
        PhysicsVerdict {
            is_projectile: false,
            r_squared: 0.0,
            curvature_sign: CurvatureSignValue::Zero,
            confidence: 0.0,
        }
    }

    /// Coefficient of variation of per-step speed, inverted into a [0,1]
    /// margin so the overall confidence stays monotone.
    fn velocity_consistency(&self, window: &[TrackPoint]) -> (bool, f64) {
        let speeds: Vec<f64> = window
            .windows(2)
            .map(|pair| {
                let (p0, p1) = (pair[0], pair[1]);
                let dt = (p1.timestamp.as_secs_f64() - p0.timestamp.as_secs_f64()).max(1e-6);
                let dx = (p1.center.0 - p0.center.0) as f64;
                let dy = (p1.center.1 - p0.center.1) as f64;
                (dx * dx + dy * dy).sqrt() / dt
            })
            .collect();

        if speeds.is_empty() {
            return (false, 0.0);
        }

        let mean = speeds.iter().sum::<f64>() / speeds.len() as f64;
        if mean <= 1e-9 {
            return (false, 0.0);
        }
        let variance = speeds.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / speeds.len() as f64;
        let cv = variance.sqrt() / mean;

        let ok = cv <= self.config.speed_cv_max;
        let margin = (1.0 - (cv / self.config.speed_cv_max).min(1.0)).clamp(0.0, 1.0);
        (ok, margin)
    }

    fn no_discontinuous_jumps(&self, window: &[TrackPoint]) -> (bool, f64) {
        let mut max_step = 0.0_f64;
        for pair in window.windows(2) {
            let (p0, p1) = (pair[0], pair[1]);
            let dx = (p1.center.0 - p0.center.0) as f64;
            let dy = (p1.center.1 - p0.center.1) as f64;
            let step = (dx * dx + dy * dy).sqrt();
            if step > max_step {
                max_step = step;
            }
        }
        let ok = max_step <= self.config.max_jump;
        let margin = (1.0 - (max_step / self.config.max_jump).min(1.0)).clamp(0.0, 1.0);
        (ok, margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CurvatureSign;
    use crate::time::Time;

    fn parabolic_window(n: usize, a: f64, b: f64, c: f64, dt: f64) -> Vec<TrackPoint> {
        (0..n)
            .map(|i| {
                let t = i as f64 * dt;
                let y = a * t * t + b * t + c;
                TrackPoint {
                    center: (0.5, y as f32),
                    timestamp: Time::from_secs_f64(t),
                }
            })
            .collect()
    }

    #[test]
    fn parabolic_trajectory_is_projectile() {
        let config = PhysicsConfig {
            expected_curv_sign: CurvatureSign::Positive,
            ..PhysicsConfig::default()
        };
        let gate = PhysicsGate::new(config);
        let window = parabolic_window(12, 2.0, -0.3, 0.1, 0.05);
        let verdict = gate.evaluate(&window);
        assert!(verdict.is_projectile, "{:?}", verdict);
    }

    #[test]
    fn static_trajectory_is_not_projectile() {
        let gate = PhysicsGate::new(PhysicsConfig::default());
        let window: Vec<TrackPoint> = (0..10)
            .map(|i| TrackPoint {
                center: (0.5, 0.5),
                timestamp: Time::from_secs_f64(i as f64 * 0.05),
            })
            .collect();
        let verdict = gate.evaluate(&window);
        assert!(!verdict.is_projectile);
    }

    #[test]
    fn idempotent_on_same_window() {
        let gate = PhysicsGate::new(PhysicsConfig::default());
        let window = parabolic_window(10, 2.0, -0.3, 0.1, 0.05);
        let v1 = gate.evaluate(&window);
        let v2 = gate.evaluate(&window);
        assert_eq!(v1, v2);
    }

    #[test]
    fn too_few_points_is_insufficient_not_fatal() {
        let gate = PhysicsGate::new(PhysicsConfig::default());
        let window = parabolic_window(2, 2.0, 0.0, 0.0, 0.05);
        let verdict = gate.evaluate(&window);
        assert!(!verdict.is_projectile);
    }

    #[test]
    fn wrong_curvature_sign_rejected() {
        let config = PhysicsConfig {
            expected_curv_sign: CurvatureSign::Negative,
            ..PhysicsConfig::default()
        };
        let gate = PhysicsGate::new(config);
        let window = parabolic_window(12, 2.0, -0.3, 0.1, 0.05);
        let verdict = gate.evaluate(&window);
        assert!(!verdict.is_projectile);
    }
}
