/// 检测系统 (Detection System)
///
/// - types:    帧/框/事件等核心数据结构
/// - Detector: 单帧目标检测, 筛选目标类别的最高置信度结果
pub mod detector;
pub mod types;

pub use detector::{DetectionBackend, Detector, DetectorConfig};
pub use types::{BBox, CoordSpace, DetectionResult, Diagnostic, EventSource, Frame, PixelFormat, TrackingEvent};
