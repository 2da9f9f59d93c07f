//! Detection normalization and filtering: confidence/class gate, area band,
//! static-object suppression, then greedy IoU non-max suppression.

use ordered_float::NotNan;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::error::RallyError;
use crate::geometry::Rect;
use crate::time::Time;

/// Raw per-frame output from the external detector.
#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
    pub bbox: Rect,
    pub confidence: f32,
    pub class_id: u16,
}

/// A validated, timestamped detection flowing downstream into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Detection {
    pub bbox: Rect,
    pub confidence: f32,
    pub class_id: u16,
    pub timestamp: Time,
}

impl Detection {
    fn validate(raw: &RawDetection) -> Result<(), RallyError> {
        if !raw.confidence.is_finite() || raw.confidence < 0.0 || raw.confidence > 1.0 {
            return Err(RallyError::InvalidDetection {
                reason: format!("confidence {} out of [0,1]", raw.confidence),
            });
        }
        if !raw.bbox.is_within_unit_square() {
            return Err(RallyError::InvalidDetection {
                reason: format!("bbox {:?} not within unit square", raw.bbox),
            });
        }
        Ok(())
    }
}

/// Reduces raw detector output to a filtered set of plausible ball
/// detections, holding a single-frame memory for static suppression.
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    config: DetectionConfig,
    last_frame_detections: Vec<Detection>,
    pub invalid_dropped: u64,
}

impl DetectionFilter {
    pub fn new(config: DetectionConfig) -> Self {
        DetectionFilter {
            config,
            last_frame_detections: Vec::new(),
            invalid_dropped: 0,
        }
    }

    /// Runs the four ordered filtering steps; never fails — invalid or
    /// implausible detections are dropped and counted, not propagated as errors.
    pub fn filter(&mut self, raw: Vec<RawDetection>, timestamp: Time) -> Vec<Detection> {
        let mut validated = Vec::with_capacity(raw.len());
        for r in raw {
            match Detection::validate(&r) {
                Ok(()) => validated.push(Detection {
                    bbox: r.bbox,
                    confidence: r.confidence,
                    class_id: r.class_id,
                    timestamp,
                }),
                Err(e) => {
                    self.invalid_dropped += 1;
                    debug!(error = %e, "dropping invalid detection");
                }
            }
        }

        // Step 1: confidence + class gate.
        let step1: Vec<Detection> = validated
            .into_iter()
            .filter(|d| d.confidence >= self.config.min_conf && d.class_id == self.config.ball_class)
            .collect();

        // Step 2: area band.
        let step2: Vec<Detection> = step1
            .into_iter()
            .filter(|d| {
                let area = d.bbox.area();
                area >= self.config.min_area && area <= self.config.max_area
            })
            .collect();

        // Step 3: static suppression against last frame's post-filter set.
        let step3: Vec<Detection> = step2
            .into_iter()
            .filter(|d| !self.is_static(d))
            .collect();

        // Step 4: greedy NMS, sorted by confidence descending.
        let kept = self.non_max_suppress(step3);

        self.last_frame_detections = kept.clone();
        kept
    }

    fn is_static(&self, d: &Detection) -> bool {
        self.last_frame_detections.iter().any(|prev| {
            d.bbox.iou(&prev.bbox) >= self.config.static_iou
                && d.bbox.displacement(&prev.bbox) < self.config.static_eps
        })
    }

    fn non_max_suppress(&self, mut candidates: Vec<Detection>) -> Vec<Detection> {
        candidates.sort_by_key(|d| {
            std::cmp::Reverse(NotNan::new(d.confidence).unwrap_or_else(|_| NotNan::new(0.0).unwrap()))
        });

        let mut kept: Vec<Detection> = Vec::new();
        'outer: for candidate in candidates {
            for k in &kept {
                if candidate.bbox.iou(&k.bbox) > self.config.nms_iou {
                    continue 'outer;
                }
            }
            kept.push(candidate);
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> RawDetection {
        RawDetection {
            bbox: Rect::new(x1, y1, x2, y2),
            confidence: conf,
            class_id: BALL_CLASS_TEST,
        }
    }

    const BALL_CLASS_TEST: u16 = 0;

    #[test]
    fn drops_low_confidence_and_wrong_class() {
        let mut filter = DetectionFilter::new(DetectionConfig::default());
        let raw = vec![
            det(0.1, 0.1, 0.12, 0.12, 0.1),
            RawDetection {
                bbox: Rect::new(0.1, 0.1, 0.12, 0.12),
                confidence: 0.9,
                class_id: 7,
            },
        ];
        let out = filter.filter(raw, Time::from_secs_f64(0.0));
        assert!(out.is_empty());
    }

    #[test]
    fn suppresses_static_detection_across_frames() {
        let mut filter = DetectionFilter::new(DetectionConfig::default());
        let bbox = Rect::new(0.1, 0.1, 0.11, 0.11);
        let raw = vec![RawDetection {
            bbox,
            confidence: 0.9,
            class_id: BALL_CLASS_TEST,
        }];
        let first = filter.filter(raw.clone(), Time::from_secs_f64(0.0));
        assert_eq!(first.len(), 1);

        let second = filter.filter(raw, Time::from_secs_f64(0.033));
        assert!(second.is_empty(), "second identical detection should be suppressed as static");
    }

    #[test]
    fn nms_keeps_highest_confidence_overlap() {
        let mut filter = DetectionFilter::new(DetectionConfig::default());
        let raw = vec![
            det(0.1, 0.1, 0.11, 0.11, 0.5),
            det(0.1001, 0.1001, 0.1101, 0.1101, 0.9),
        ];
        let out = filter.filter(raw, Time::from_secs_f64(0.0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].confidence, 0.9);
    }

    #[test]
    fn invalid_bbox_is_dropped_not_fatal() {
        let mut filter = DetectionFilter::new(DetectionConfig::default());
        let raw = vec![det(-0.1, 0.1, 0.11, 0.11, 0.9)];
        let out = filter.filter(raw, Time::from_secs_f64(0.0));
        assert!(out.is_empty());
        assert_eq!(filter.invalid_dropped, 1);
    }
}
