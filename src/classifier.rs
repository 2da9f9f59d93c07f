//! Movement classification: assigns a track one of four kinematic labels
//! from the same window the physics gate scores.

use crate::config::ClassifierConfig;
use crate::physics::PhysicsVerdict;
use crate::track::TrackPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MovementClass {
    Static,
    Carried,
    Rolling,
    Airborne,
}

pub struct MovementClassifier {
    config: ClassifierConfig,
}

impl MovementClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        MovementClassifier { config }
    }

    /// First-hit-wins over Static, Airborne, Rolling, Carried in that order.
    pub fn classify(&self, window: &[TrackPoint], verdict: &PhysicsVerdict) -> (MovementClass, f32) {
        if window.len() < 2 {
            return (MovementClass::Static, 0.0);
        }

        let span = window[window.len() - 1].timestamp.as_secs_f64() - window[0].timestamp.as_secs_f64();
        let path_length = self.path_length(window);
        let speed = if span > 0.0 { path_length / span } else { 0.0 };

        if path_length < self.config.static_path && span >= self.config.static_min_span {
            let margin = (1.0 - (path_length / self.config.static_path).min(1.0)) as f32;
            return (MovementClass::Static, margin.clamp(0.0, 1.0));
        }

        if verdict.is_projectile && span >= self.config.airborne_min_span {
            return (MovementClass::Airborne, verdict.confidence);
        }

        let (var_x, var_y) = self.variance_xy(window);
        let vertical_ratio = if var_x > 0.0 { var_y / var_x } else { f64::INFINITY };
        if vertical_ratio < self.config.roll_ratio && speed > self.config.roll_speed_min {
            let margin = (1.0 - (vertical_ratio / self.config.roll_ratio).min(1.0)) as f32;
            return (MovementClass::Rolling, margin.clamp(0.0, 1.0));
        }

        let margin = (speed / (speed + 1.0)).clamp(0.0, 1.0) as f32;
        (MovementClass::Carried, margin)
    }

    fn path_length(&self, window: &[TrackPoint]) -> f64 {
        window
            .windows(2)
            .map(|pair| {
                let (p0, p1) = (pair[0], pair[1]);
                let dx = (p1.center.0 - p0.center.0) as f64;
                let dy = (p1.center.1 - p0.center.1) as f64;
                (dx * dx + dy * dy).sqrt()
            })
            .sum()
    }

    fn variance_xy(&self, window: &[TrackPoint]) -> (f64, f64) {
        let n = window.len() as f64;
        let mean_x = window.iter().map(|p| p.center.0 as f64).sum::<f64>() / n;
        let mean_y = window.iter().map(|p| p.center.1 as f64).sum::<f64>() / n;
        let var_x = window.iter().map(|p| (p.center.0 as f64 - mean_x).powi(2)).sum::<f64>() / n;
        let var_y = window.iter().map(|p| (p.center.1 as f64 - mean_y).powi(2)).sum::<f64>() / n;
        (var_x, var_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::CurvatureSignValue;
    use crate::time::Time;

    fn pt(x: f32, y: f32, t: f64) -> TrackPoint {
        TrackPoint {
            center: (x, y),
            timestamp: Time::from_secs_f64(t),
        }
    }

    fn not_projectile() -> PhysicsVerdict {
        PhysicsVerdict {
            is_projectile: false,
            r_squared: 0.0,
            curvature_sign: CurvatureSignValue::Zero,
            confidence: 0.0,
        }
    }

    #[test]
    fn constant_position_classifies_static() {
        let classifier = MovementClassifier::new(ClassifierConfig::default());
        let window: Vec<TrackPoint> = (0..10).map(|i| pt(0.5, 0.5, i as f64 * 0.1)).collect();
        let (class, _) = classifier.classify(&window, &not_projectile());
        assert_eq!(class, MovementClass::Static);
    }

    #[test]
    fn projectile_verdict_classifies_airborne() {
        let classifier = MovementClassifier::new(ClassifierConfig::default());
        let window: Vec<TrackPoint> = (0..10)
            .map(|i| pt(0.5, 0.1 + 0.02 * i as f32, i as f64 * 0.05))
            .collect();
        let verdict = PhysicsVerdict {
            is_projectile: true,
            r_squared: 0.95,
            curvature_sign: CurvatureSignValue::Positive,
            confidence: 0.9,
        };
        let (class, _) = classifier.classify(&window, &verdict);
        assert_eq!(class, MovementClass::Airborne);
    }

    #[test]
    fn lateral_fast_motion_classifies_rolling() {
        let classifier = MovementClassifier::new(ClassifierConfig::default());
        let window: Vec<TrackPoint> = (0..10)
            .map(|i| pt(0.1 + 0.05 * i as f32, 0.5, i as f64 * 0.05))
            .collect();
        let (class, _) = classifier.classify(&window, &not_projectile());
        assert_eq!(class, MovementClass::Rolling);
    }
}
