//! External collaborator interfaces. The decoder and detector are capability
//! traits rather than concrete types, so production code can back them with
//! real decode/inference and tests can back them with fixed fixtures.

use crate::detection::RawDetection;
use crate::time::Time;

/// Opaque handle to a single decoded frame. The core never inspects pixel
/// data directly; it only ever threads `Image` through to the `Detector`.
#[derive(Debug, Clone, Copy)]
pub struct Image {
    pub width: u32,
    pub height: u32,
}

pub trait Decoder {
    /// Yields frames in presentation order, `None` at end of stream.
    fn next_frame(&mut self) -> Option<(Time, Image)>;

    /// Total video duration, used by `SegmentBuilder` for final clamping.
    fn duration(&self) -> Time;
}

pub trait Detector {
    /// Pure function from an image to raw detections. May be slow or run on
    /// an accelerator; the core places no constraint on implementation.
    fn detect(&self, image: &Image) -> Vec<RawDetection>;
}
