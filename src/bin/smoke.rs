//! Minimal local smoke-runner: feeds a synthetic parabolic trajectory
//! through the pipeline and prints the resulting segments. Not part of the
//! crate's public contract — a debugging aid only.

use rally_core::{Decoder, Detector, Image, RallyConfig, RawDetection, Rect, Time};

struct SyntheticDecoder {
    frame: u32,
    total_frames: u32,
}

impl Decoder for SyntheticDecoder {
    fn next_frame(&mut self) -> Option<(Time, Image)> {
        if self.frame >= self.total_frames {
            return None;
        }
        let t = Time::from_secs_f64(self.frame as f64 * 0.033);
        self.frame += 1;
        Some((t, Image { width: self.frame, height: 1 }))
    }

    fn duration(&self) -> Time {
        Time::from_secs_f64(self.total_frames as f64 * 0.033)
    }
}

struct SyntheticDetector;

impl Detector for SyntheticDetector {
    fn detect(&self, image: &Image) -> Vec<RawDetection> {
        let frame = image.width as f64;
        // idle, then a parabolic arc (screen-space, opens upward per the
        // default `CurvatureSign::Positive` convention), then idle again
        if !(100.0..=300.0).contains(&frame) {
            return Vec::new();
        }
        let span = 200.0 * 0.033;
        let t = (frame - 100.0) * 0.033;
        let y = (0.06 * (t - span / 2.0).powi(2) + 0.2).clamp(0.0, 0.95) as f32;
        vec![RawDetection {
            bbox: Rect::new(0.49, y, 0.51, (y + 0.02).min(1.0)),
            confidence: 0.85,
            class_id: rally_core::BALL_CLASS,
        }]
    }
}

fn main() {
    let mut decoder = SyntheticDecoder {
        frame: 0,
        total_frames: 450,
    };
    let detector = SyntheticDetector;

    let output = rally_core::run(RallyConfig::default(), &mut decoder, &detector, &|| false)
        .expect("pipeline run failed");

    println!("frames in:  {}", output.stats.frames_in);
    println!("frames out: {}", output.stats.frames_out);
    println!("segments:   {}", output.segments.len());
    for segment in &output.segments {
        println!(
            "  [{:.2}, {:.2}]",
            segment.start.as_secs_f64(),
            segment.end.as_secs_f64()
        );
    }
}
