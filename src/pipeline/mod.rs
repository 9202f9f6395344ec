/// 分析线程 (Analysis worker)
///
/// 双线程架构, 通过 crossbeam 通道通信:
/// - 调用方 (渲染/采集线程): `submit` 帧, 从 `events` 接收结果
/// - 分析线程: 独占 Controller, 逐帧串行处理
///
/// 帧槽容量为1: 分析线程忙碌时, 新帧替换尚未处理的旧帧 (只保留最新帧).
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use tracing::{debug, info};

use crate::controller::Controller;
use crate::detection::types::{Frame, TrackingEvent};
use crate::error::Error;

pub struct FrameWorker {
    slot_tx: Option<Sender<Frame>>,
    slot_rx: Receiver<Frame>, // 生产者侧用于丢弃旧帧
    events_rx: Receiver<TrackingEvent>,
    handle: Option<JoinHandle<Controller>>,

    // 统计
    submitted: u64,
    dropped_frames: u64,
}

impl FrameWorker {
    /// 启动分析线程, Controller 的所有权移交给该线程
    pub fn spawn(mut controller: Controller) -> Result<Self, Error> {
        let (slot_tx, slot_rx) = bounded::<Frame>(1);
        let (events_tx, events_rx) = unbounded::<TrackingEvent>();

        let rx = slot_rx.clone();
        let handle = thread::Builder::new()
            .name("detrack-analysis".to_string())
            .spawn(move || {
                info!("🔍 分析线程启动");
                for frame in rx.iter() {
                    let event = controller.process(frame);
                    if events_tx.send(event).is_err() {
                        debug!("事件接收端已关闭");
                        break;
                    }
                }
                info!("🔍 分析线程退出 ({} 帧)", controller.stats().frames);
                controller
            })?;

        Ok(Self {
            slot_tx: Some(slot_tx),
            slot_rx,
            events_rx,
            handle: Some(handle),
            submitted: 0,
            dropped_frames: 0,
        })
    }

    /// 提交一帧 (不阻塞)
    ///
    /// 槽内已有未处理帧时丢弃它, 换成新帧. 返回是否有旧帧被丢弃;
    /// 分析线程已退出 (例如 panic) 时返回 `Error::Worker`.
    pub fn submit(&mut self, frame: Frame) -> Result<bool, Error> {
        if self.handle.as_ref().map_or(true, |h| h.is_finished()) {
            return Err(Error::Worker("analysis thread is not running".to_string()));
        }
        let Some(tx) = &self.slot_tx else {
            return Err(Error::Worker("frame slot is closed".to_string()));
        };
        self.submitted += 1;

        let frame = match tx.try_send(frame) {
            Ok(()) => return Ok(false),
            Err(TrySendError::Disconnected(_)) => {
                return Err(Error::Worker("frame slot is disconnected".to_string()))
            }
            Err(TrySendError::Full(frame)) => frame,
        };

        // 只有本线程写入槽, 取走旧帧后槽必然为空
        let dropped = match self.slot_rx.try_recv() {
            Ok(old) => {
                self.dropped_frames += 1;
                debug!("⏭️ 丢弃帧 {} (保留 {})", old.frame_id(), frame.frame_id());
                true
            }
            Err(_) => false,
        };
        let id = frame.frame_id();
        tx.try_send(frame)
            .map_err(|e| Error::Worker(format!("frame {} not queued: {}", id, e)))?;
        Ok(dropped)
    }

    /// 结果通道 (每个处理过的帧一个事件)
    pub fn events(&self) -> &Receiver<TrackingEvent> {
        &self.events_rx
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// 关闭帧槽, 等待槽内剩余帧处理完毕, 交还 Controller
    pub fn shutdown(mut self) -> Result<Controller, Error> {
        self.slot_tx.take();
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::Worker("analysis thread already joined".to_string()))?;
        handle
            .join()
            .map_err(|_| Error::Worker("analysis thread panicked".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerState, TrackerFactory};
    use crate::detection::detector::{DetectionBackend, Detector, DetectorConfig};
    use crate::detection::types::{BBox, DetectionResult};
    use crate::error::InferenceError;
    use crate::tracking::CsrtTracker;
    use image::RgbImage;
    use std::time::Duration;

    /// 每次推理耗时固定, 总是返回同一辆车
    struct SlowBackend {
        delay: Duration,
    }

    impl DetectionBackend for SlowBackend {
        fn infer(&mut self, _frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
            thread::sleep(self.delay);
            Ok(vec![DetectionResult {
                bbox: BBox::new(10.0, 10.0, 40.0, 40.0),
                label: "person".to_string(),
                class_id: 0,
                score: 0.9,
            }])
        }
    }

    fn controller(delay_ms: u64) -> Controller {
        let detector = Detector::new(
            Box::new(SlowBackend {
                delay: Duration::from_millis(delay_ms),
            }),
            DetectorConfig::default(),
        );
        let factory: TrackerFactory = Box::new(|| Box::new(CsrtTracker::default()));
        Controller::new(detector, factory)
    }

    fn frame(id: u64) -> Frame {
        Frame::from_rgb_image(RgbImage::new(64, 48), id)
    }

    #[test]
    fn test_every_frame_processed_when_idle() {
        let mut worker = FrameWorker::spawn(controller(0)).unwrap();
        for id in 0..3 {
            worker.submit(frame(id)).unwrap();
            let event = worker.events().recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(event.frame_id(), id);
            assert_eq!(event.state, ControllerState::NoTrack);
        }
        assert_eq!(worker.dropped_frames(), 0);
        let controller = worker.shutdown().unwrap();
        assert_eq!(controller.stats().frames, 3);
    }

    #[test]
    fn test_keep_latest_drops_pending_frames() {
        let mut worker = FrameWorker::spawn(controller(30)).unwrap();
        let total = 10u64;
        for id in 0..total {
            worker.submit(frame(id)).unwrap();
        }
        let events_rx = worker.events().clone();
        let dropped = worker.dropped_frames();
        let controller = worker.shutdown().unwrap();

        let events: Vec<TrackingEvent> = events_rx.try_iter().collect();
        assert!(dropped > 0);
        assert!((events.len() as u64) < total);
        assert_eq!(events.len() as u64 + dropped, total);
        // 最后提交的帧总会被处理
        assert_eq!(events.last().map(|e| e.frame_id()), Some(total - 1));
        assert_eq!(controller.stats().frames, events.len() as u64);
    }

    #[test]
    fn test_events_preserve_order() {
        let mut worker = FrameWorker::spawn(controller(5)).unwrap();
        for id in 0..6 {
            worker.submit(frame(id)).unwrap();
        }
        let events_rx = worker.events().clone();
        worker.shutdown().unwrap();
        let ids: Vec<u64> = events_rx.try_iter().map(|e| e.frame_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    /// 推理时 panic 的后端
    struct PanickingBackend;

    impl DetectionBackend for PanickingBackend {
        fn infer(&mut self, _frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
            panic!("backend crashed");
        }
    }

    #[test]
    fn test_submit_reports_dead_worker() {
        let detector = Detector::new(Box::new(PanickingBackend), DetectorConfig::default());
        let factory: TrackerFactory = Box::new(|| Box::new(CsrtTracker::default()));
        let mut worker = FrameWorker::spawn(Controller::new(detector, factory)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut id = 0;
        let err = loop {
            match worker.submit(frame(id)) {
                Ok(_) => {
                    assert!(std::time::Instant::now() < deadline, "dead worker never reported");
                    id += 1;
                    thread::sleep(Duration::from_millis(5));
                }
                Err(e) => break e,
            }
        };
        assert!(matches!(err, Error::Worker(_)));
        assert!(worker.events().try_recv().is_err());
        assert!(matches!(worker.shutdown(), Err(Error::Worker(_))));
    }
}
