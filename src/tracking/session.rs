/// 跟踪会话: 独占一个跟踪器实例及其最近一次接受的 ROI
use tracing::debug;

use super::{TrackerState, TrackingFailure, VisualTracker};
use crate::detection::types::{BBox, Frame};
use crate::error::TrackerInitError;

pub struct TrackerSession {
    tracker: Box<dyn VisualTracker + Send>,
    roi: BBox,
    updates: u64,
}

impl std::fmt::Debug for TrackerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerSession")
            .field("tracker", &self.tracker.name())
            .field("roi", &self.roi)
            .field("updates", &self.updates)
            .finish()
    }
}

impl TrackerSession {
    /// 校验 ROI 并初始化跟踪器
    ///
    /// ROI 退化或超出 `[0, width] x [0, height]` 时返回 `TrackerInitError`.
    pub fn start(
        mut tracker: Box<dyn VisualTracker + Send>,
        frame: &Frame,
        roi: BBox,
    ) -> Result<Self, TrackerInitError> {
        if roi.is_degenerate() {
            return Err(TrackerInitError::Degenerate {
                width: roi.width(),
                height: roi.height(),
            });
        }
        let (fw, fh) = (frame.width(), frame.height());
        if !roi.within(fw as f32, fh as f32) {
            return Err(TrackerInitError::OutOfBounds {
                x1: roi.x1(),
                y1: roi.y1(),
                x2: roi.x2(),
                y2: roi.y2(),
                frame_width: fw,
                frame_height: fh,
            });
        }

        // 跟踪器要求3通道 RGB
        let image = frame.to_rgb();
        tracker.init(&image, &roi)?;
        debug!("🎯 {} session started at {:?}", tracker.name(), roi.to_array());

        Ok(Self {
            tracker,
            roi,
            updates: 0,
        })
    }

    /// 跟踪一帧
    ///
    /// 返回的 ROI 先裁剪到帧内, 再做退化检查; 退化时无论底层成功标志如何都判定失败.
    /// 失败时保留上一次接受的 ROI.
    pub fn update(&mut self, frame: &Frame) -> Result<BBox, TrackingFailure> {
        let image = frame.to_rgb();
        let out = self.tracker.update(&image);
        let (fw, fh) = (frame.width() as f32, frame.height() as f32);
        let roi = out.roi.clamp(fw, fh);

        if roi.is_degenerate() {
            return Err(TrackingFailure::Degenerate);
        }
        if !out.success {
            return Err(TrackingFailure::LowConfidence {
                peak: out.confidence,
            });
        }

        self.roi = roi;
        self.updates += 1;
        Ok(roi)
    }

    /// 最近一次接受的 ROI (帧坐标)
    pub fn roi(&self) -> BBox {
        self.roi
    }

    pub fn state(&self) -> TrackerState {
        self.tracker.state()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackerUpdate;
    use image::RgbImage;

    /// 返回固定结果的跟踪器
    struct FixedTracker {
        out: TrackerUpdate,
        state: TrackerState,
    }

    impl FixedTracker {
        fn boxed(success: bool, roi: BBox) -> Box<dyn VisualTracker + Send> {
            Box::new(Self {
                out: TrackerUpdate {
                    success,
                    roi,
                    confidence: if success { 0.8 } else { 0.01 },
                },
                state: TrackerState::Uninitialized,
            })
        }
    }

    impl VisualTracker for FixedTracker {
        fn init(&mut self, _image: &RgbImage, _roi: &BBox) -> Result<(), TrackerInitError> {
            self.state = TrackerState::Initialized;
            Ok(())
        }

        fn update(&mut self, _image: &RgbImage) -> TrackerUpdate {
            self.state = if self.out.success {
                TrackerState::Updated
            } else {
                TrackerState::Lost
            };
            self.out
        }

        fn state(&self) -> TrackerState {
            self.state
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb_image(RgbImage::new(640, 480), 1)
    }

    #[test]
    fn test_start_rejects_degenerate_roi() {
        let roi = BBox::new(100.0, 100.0, 100.0, 200.0);
        let err = TrackerSession::start(FixedTracker::boxed(true, roi), &frame(), roi).unwrap_err();
        assert!(matches!(err, TrackerInitError::Degenerate { .. }));
    }

    #[test]
    fn test_start_rejects_out_of_bounds_roi() {
        let roi = BBox::new(600.0, 100.0, 700.0, 200.0);
        let err = TrackerSession::start(FixedTracker::boxed(true, roi), &frame(), roi).unwrap_err();
        assert!(matches!(err, TrackerInitError::OutOfBounds { frame_width: 640, .. }));
    }

    #[test]
    fn test_degenerate_update_overrides_success_flag() {
        let init = BBox::new(100.0, 100.0, 200.0, 200.0);
        let zero_width = BBox::new(150.0, 100.0, 150.0, 200.0);
        let mut session = TrackerSession::start(FixedTracker::boxed(true, zero_width), &frame(), init).unwrap();
        assert_eq!(session.update(&frame()), Err(TrackingFailure::Degenerate));
        assert_eq!(session.roi(), init);
    }

    #[test]
    fn test_roi_outside_frame_clips_to_degenerate() {
        let init = BBox::new(100.0, 100.0, 200.0, 200.0);
        let gone = BBox::new(700.0, 100.0, 800.0, 200.0);
        let mut session = TrackerSession::start(FixedTracker::boxed(true, gone), &frame(), init).unwrap();
        assert_eq!(session.update(&frame()), Err(TrackingFailure::Degenerate));
    }

    #[test]
    fn test_low_confidence() {
        let init = BBox::new(100.0, 100.0, 200.0, 200.0);
        let mut session = TrackerSession::start(FixedTracker::boxed(false, init), &frame(), init).unwrap();
        match session.update(&frame()) {
            Err(TrackingFailure::LowConfidence { peak }) => assert!(peak < 0.04),
            other => panic!("Expected low confidence, got {:?}", other),
        }
        assert_eq!(session.state(), TrackerState::Lost);
    }

    #[test]
    fn test_successful_update_moves_roi() {
        let init = BBox::new(100.0, 100.0, 200.0, 200.0);
        let next = BBox::new(110.0, 105.0, 210.0, 205.0);
        let mut session = TrackerSession::start(FixedTracker::boxed(true, next), &frame(), init).unwrap();
        assert_eq!(session.state(), TrackerState::Initialized);
        assert_eq!(session.update(&frame()), Ok(next));
        assert_eq!(session.roi(), next);
        assert_eq!(session.updates(), 1);
        assert_eq!(session.state(), TrackerState::Updated);
    }

    #[test]
    fn test_failure_is_std_error() {
        let low: Box<dyn std::error::Error> = Box::new(TrackingFailure::LowConfidence { peak: 0.0123 });
        assert_eq!(low.to_string(), "low confidence (peak 0.012)");
        assert_eq!(TrackingFailure::Degenerate.to_string(), "degenerate roi");
    }
}
