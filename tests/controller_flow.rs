use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use detrack_rs::controller::csrt_factory;
use detrack_rs::pipeline::FrameWorker;
use detrack_rs::tracking::{TrackerState, TrackerUpdate};
use detrack_rs::{
    BBox, Controller, ControllerState, CoordSpace, CsrtParams, DetectionBackend, DetectionResult,
    Detector, DetectorConfig, Diagnostic, EventSource, Frame, InferenceError, TrackerFactory,
    TrackerInitError, VisualTracker,
};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type Detections = Arc<Mutex<VecDeque<Result<Vec<DetectionResult>, InferenceError>>>>;

struct ScriptedBackend {
    script: Detections,
}

impl DetectionBackend for ScriptedBackend {
    fn infer(&mut self, _frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
    }
}

/// 前 n 次更新成功 (原样返回初始 ROI), 之后失败
struct CountdownTracker {
    remaining: usize,
    roi: Option<BBox>,
    state: TrackerState,
}

impl VisualTracker for CountdownTracker {
    fn init(&mut self, _image: &RgbImage, roi: &BBox) -> Result<(), TrackerInitError> {
        self.roi = Some(*roi);
        self.state = TrackerState::Initialized;
        Ok(())
    }

    fn update(&mut self, _image: &RgbImage) -> TrackerUpdate {
        let roi = self.roi.unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0));
        let success = self.remaining > 0;
        self.remaining = self.remaining.saturating_sub(1);
        self.state = if success {
            TrackerState::Updated
        } else {
            TrackerState::Lost
        };
        TrackerUpdate {
            success,
            roi,
            confidence: if success { 0.5 } else { 0.01 },
        }
    }

    fn state(&self) -> TrackerState {
        self.state
    }

    fn name(&self) -> &'static str {
        "countdown"
    }
}

fn countdown(n: usize) -> TrackerFactory {
    Box::new(move || {
        Box::new(CountdownTracker {
            remaining: n,
            roi: None,
            state: TrackerState::Uninitialized,
        })
    })
}

fn controller(script: Detections, factory: TrackerFactory) -> Controller {
    let detector = Detector::new(Box::new(ScriptedBackend { script }), DetectorConfig::default());
    Controller::new(detector, factory)
}

fn car(bbox: BBox, score: f32) -> DetectionResult {
    DetectionResult {
        bbox,
        label: "car".to_string(),
        class_id: 2,
        score,
    }
}

fn blank(id: u64) -> Frame {
    Frame::from_rgb_image(RgbImage::new(320, 240), id)
}

/// 灰色噪声背景 + 彩色方块目标
fn scene(seed: u64) -> (RgbImage, RgbImage) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut background = RgbImage::new(200, 150);
    for p in background.pixels_mut() {
        let v = 90 + rng.gen_range(0..20u8);
        *p = Rgb([v, v, v + 5]);
    }
    let mut object = RgbImage::new(32, 32);
    for by in (0..32).step_by(4) {
        for bx in (0..32).step_by(4) {
            let c = match rng.gen_range(0..4) {
                0 => [230, 20, 20],
                1 => [20, 20, 230],
                2 => [240, 230, 10],
                _ => [10, 10, 10],
            };
            for y in by..by + 4 {
                for x in bx..bx + 4 {
                    object.put_pixel(x, y, Rgb(c));
                }
            }
        }
    }
    (background, object)
}

#[test]
fn test_detect_then_track_with_csrt() {
    let (background, object) = scene(11);
    let render = |x: u32, y: u32, id: u64| {
        let mut img = background.clone();
        image::imageops::overlay(&mut img, &object, x as i64, y as i64);
        Frame::from_rgb_image(img, id)
    };

    let script: Detections = Arc::default();
    script
        .lock()
        .unwrap()
        .push_back(Ok(vec![car(BBox::from_xywh(60.0, 50.0, 32.0, 32.0), 0.9)]));
    let mut controller = controller(script, csrt_factory(CsrtParams::default()));

    let first = controller.process(render(60, 50, 0));
    assert_eq!(first.source, EventSource::Detection);
    assert_eq!(first.state, ControllerState::Tracking);

    let (mut x, mut y) = (60u32, 50u32);
    for id in 1..=8 {
        x += 3;
        y += 1;
        let event = controller.process(render(x, y, id));
        assert_eq!(event.source, EventSource::Tracking, "frame {}", id);
        let (cx, cy) = event.bbox.unwrap().center();
        assert!((cx - (x as f32 + 16.0)).abs() < 6.0, "cx {} vs {}", cx, x + 16);
        assert!((cy - (y as f32 + 16.0)).abs() < 6.0, "cy {} vs {}", cy, y + 16);
    }
    assert_eq!(controller.stats().detections, 1);
}

#[test]
fn test_loss_reacquires_on_the_same_frame() {
    let script: Detections = Arc::default();
    let first = BBox::new(10.0, 10.0, 60.0, 60.0);
    let second = BBox::new(100.0, 80.0, 180.0, 140.0);
    script
        .lock()
        .unwrap()
        .extend([Ok(vec![car(first, 0.8)]), Ok(vec![car(second, 0.7)])]);
    let mut controller = controller(script, countdown(2));

    let sources: Vec<(EventSource, Option<BBox>)> = (0..4)
        .map(|id| {
            let e = controller.process(blank(id));
            (e.source, e.bbox)
        })
        .collect();

    assert_eq!(
        sources,
        vec![
            (EventSource::Detection, Some(first)),
            (EventSource::Tracking, Some(first)),
            (EventSource::Tracking, Some(first)),
            // 第三次更新失败, 同一帧重新检测到新目标
            (EventSource::Detection, Some(second)),
        ]
    );
    assert_eq!(controller.session_roi(), Some(second));
    assert_eq!(controller.stats().reacquisitions, 1);
}

#[test]
fn test_detections_are_clamped_and_converted_before_tracking() {
    let script: Detections = Arc::default();
    script.lock().unwrap().extend([
        Ok(vec![car(BBox::new(280.0, -20.0, 400.0, 100.0), 0.9)]),
        Ok(vec![car(
            BBox::in_space(0.5, 0.5, 1.0, 1.0, CoordSpace::Normalized),
            0.9,
        )]),
    ]);
    let mut controller = controller(script, countdown(0));

    let e = controller.process(blank(0));
    assert_eq!(e.bbox.unwrap().to_array(), [280.0, 0.0, 320.0, 100.0]);

    // 跟踪失败后重新检测, 归一化框换算到帧坐标
    let e = controller.process(blank(1));
    assert_eq!(e.bbox.unwrap().to_array(), [160.0, 120.0, 320.0, 240.0]);
    assert_eq!(e.bbox.unwrap().space(), CoordSpace::Frame);
}

#[test]
fn test_no_target_keeps_no_track() {
    let script: Detections = Arc::default();
    script.lock().unwrap().extend([
        Ok(vec![]),
        Ok(vec![car(BBox::new(0.0, 0.0, 10.0, 10.0), 0.1)]),
        Ok(vec![DetectionResult {
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            label: "person".to_string(),
            class_id: 0,
            score: 0.99,
        }]),
    ]);
    let mut controller = controller(script, countdown(10));
    for id in 0..3 {
        let e = controller.process(blank(id));
        assert_eq!(e.bbox, None);
        assert_eq!(e.source, EventSource::None);
        assert_eq!(e.state, ControllerState::NoTrack);
        assert!(!controller.has_active_session());
    }
}

#[test]
fn test_inference_error_is_diagnosed_and_recovered() {
    let script: Detections = Arc::default();
    script.lock().unwrap().extend([
        Err(InferenceError("session run failed".to_string())),
        Ok(vec![car(BBox::new(20.0, 20.0, 80.0, 80.0), 0.6)]),
    ]);
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut controller = controller(script, countdown(5)).with_diagnostics(tx);

    let e = controller.process(blank(0));
    assert_eq!(e.state, ControllerState::NoTrack);
    let e = controller.process(blank(1));
    assert_eq!(e.state, ControllerState::Tracking);

    let diagnostics: Vec<Diagnostic> = rx.try_iter().collect();
    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(diagnostics[0], Diagnostic::Inference { frame_id: 0, .. }));
}

#[test]
fn test_worker_events_satisfy_state_invariant() {
    let script: Detections = Arc::default();
    {
        let mut s = script.lock().unwrap();
        for i in 0..30 {
            if i % 2 == 0 {
                s.push_back(Ok(vec![car(BBox::new(40.0, 40.0, 120.0, 100.0), 0.9)]));
            } else {
                s.push_back(Ok(vec![]));
            }
        }
    }
    let mut worker = FrameWorker::spawn(controller(script, countdown(2))).unwrap();
    let events = worker.events().clone();

    for id in 0..30 {
        worker.submit(blank(id)).unwrap();
        std::thread::sleep(Duration::from_millis(1));
    }
    let dropped = worker.dropped_frames();
    let controller = worker.shutdown().unwrap();

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.len() as u64 + dropped, 30);
    assert_eq!(received.last().map(|e| e.frame_id()), Some(29));
    for e in &received {
        assert_eq!(e.bbox.is_some(), e.state == ControllerState::Tracking);
        if e.source == EventSource::None {
            assert!(e.bbox.is_none());
        }
    }
    assert_eq!(controller.stats().frames, received.len() as u64);
}
