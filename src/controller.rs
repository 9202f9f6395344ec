//! 检测/跟踪状态机 (Controller)
//!
//! | 当前状态 | 触发                         | 动作                           | 下一状态 |
//! |----------|------------------------------|--------------------------------|----------|
//! | NoTrack  | 检测到目标                   | 用检测框创建会话, 输出检测框   | Tracking |
//! | NoTrack  | 未检测到                     | 输出 None                      | NoTrack  |
//! | Tracking | 跟踪成功                     | 输出跟踪框                     | Tracking |
//! | Tracking | 跟踪失败, 同帧重新检测到目标 | 丢弃旧会话, 新建会话, 输出新框 | Tracking |
//! | Tracking | 跟踪失败, 同帧未检测到       | 丢弃会话, 输出 None            | NoTrack  |
//!
//! 状态由会话是否存在推导, `has_active_session() == (state() == Tracking)` 恒成立.

use std::time::Instant;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::detection::detector::Detector;
use crate::detection::types::{BBox, Diagnostic, EventSource, Frame, TrackingEvent};
use crate::tracking::{CsrtParams, CsrtTracker, TrackerSession, VisualTracker};

/// 控制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    NoTrack,
    Tracking,
}

/// 每次创建会话时构造一个新的跟踪器实例
pub type TrackerFactory = Box<dyn Fn() -> Box<dyn VisualTracker + Send> + Send>;

/// 使用固定参数记录构造 CSRT 跟踪器的工厂
pub fn csrt_factory(params: CsrtParams) -> TrackerFactory {
    Box::new(move || Box::new(CsrtTracker::new(params.clone())))
}

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerStats {
    pub frames: u64,
    pub detections: u64,     // 检测器调用次数
    pub tracker_updates: u64, // 跟踪器调用次数
    pub losses: u64,         // 跟踪失败次数
    pub reacquisitions: u64, // 同帧重新捕获次数
    pub inference_errors: u64,
    pub tracker_init_errors: u64,
    pub fps: f64, // 每秒处理帧数
}

pub struct Controller {
    detector: Detector,
    tracker_factory: TrackerFactory,
    session: Option<TrackerSession>,
    diagnostics: Option<Sender<Diagnostic>>,
    stats: ControllerStats,

    // FPS 统计
    fps_count: u64,
    fps_last: Instant,
}

impl Controller {
    pub fn new(detector: Detector, tracker_factory: TrackerFactory) -> Self {
        Self {
            detector,
            tracker_factory,
            session: None,
            diagnostics: None,
            stats: ControllerStats::default(),
            fps_count: 0,
            fps_last: Instant::now(),
        }
    }

    pub fn with_diagnostics(mut self, tx: Sender<Diagnostic>) -> Self {
        self.diagnostics = Some(tx);
        self
    }

    pub fn state(&self) -> ControllerState {
        if self.session.is_some() {
            ControllerState::Tracking
        } else {
            ControllerState::NoTrack
        }
    }

    pub fn has_active_session(&self) -> bool {
        self.session.is_some()
    }

    /// 当前会话最近一次接受的 ROI
    pub fn session_roi(&self) -> Option<BBox> {
        self.session.as_ref().map(|s| s.roi())
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    /// 丢弃会话, 回到 NoTrack
    pub fn reset(&mut self) {
        if self.session.take().is_some() {
            info!("🔄 跟踪会话已重置");
        }
    }

    /// 处理一帧, 恰好输出一个事件
    pub fn process(&mut self, frame: Frame) -> TrackingEvent {
        self.stats.frames += 1;
        self.tick_fps();

        let (bbox, source) = match self.session.take() {
            None => match self.acquire(&frame) {
                Some(b) => (Some(b), EventSource::Detection),
                None => (None, EventSource::None),
            },
            Some(mut session) => {
                self.stats.tracker_updates += 1;
                match session.update(&frame) {
                    Ok(roi) => {
                        self.session = Some(session);
                        (Some(roi), EventSource::Tracking)
                    }
                    Err(reason) => {
                        // 旧会话在此丢弃, 不会再输出它的 ROI
                        drop(session);
                        self.stats.losses += 1;
                        debug!("⚠️ 帧 {} 跟踪丢失: {}", frame.frame_id(), reason);
                        self.report(Diagnostic::TrackingLost {
                            frame_id: frame.frame_id(),
                            reason,
                        });
                        match self.acquire(&frame) {
                            Some(b) => {
                                self.stats.reacquisitions += 1;
                                (Some(b), EventSource::Detection)
                            }
                            None => (None, EventSource::None),
                        }
                    }
                }
            }
        };

        TrackingEvent {
            bbox,
            frame,
            source,
            state: self.state(),
        }
    }

    /// 检测并建立新会话; 成功时 self.session 被设置
    fn acquire(&mut self, frame: &Frame) -> Option<BBox> {
        self.stats.detections += 1;
        let found = match self.detector.try_detect(frame) {
            Ok(found) => found?,
            Err(error) => {
                self.stats.inference_errors += 1;
                warn!("❌ 帧 {} 推理失败: {}", frame.frame_id(), error);
                self.report(Diagnostic::Inference {
                    frame_id: frame.frame_id(),
                    error,
                });
                return None;
            }
        };

        match TrackerSession::start((self.tracker_factory)(), frame, found.bbox) {
            Ok(session) => {
                debug!(
                    "🎯 帧 {} 捕获 {} ({:.2}) at {:?}",
                    frame.frame_id(),
                    found.label,
                    found.score,
                    found.bbox.to_array()
                );
                let roi = session.roi();
                self.session = Some(session);
                Some(roi)
            }
            Err(error) => {
                self.stats.tracker_init_errors += 1;
                warn!("❌ 帧 {} 跟踪器初始化失败: {}", frame.frame_id(), error);
                self.report(Diagnostic::TrackerInit {
                    frame_id: frame.frame_id(),
                    error,
                });
                None
            }
        }
    }

    fn report(&self, diagnostic: Diagnostic) {
        if let Some(tx) = &self.diagnostics {
            let _ = tx.try_send(diagnostic);
        }
    }

    fn tick_fps(&mut self) {
        self.fps_count += 1;
        let elapsed = self.fps_last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.stats.fps = self.fps_count as f64 / elapsed;
            self.fps_count = 0;
            self.fps_last = Instant::now();
        }
    }
}
