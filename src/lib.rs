#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 运行配置 (CLI + JSON)
pub mod controller; // 检测/跟踪状态机
pub mod detection; // 检测器与核心数据结构
pub mod error; // 错误类型
pub mod input; // 帧来源 (图像序列 + 方向校正)
pub mod mapping; // 坐标映射
pub mod models; // 模型接口与具体实现
pub mod ort_backend; // ONNX Runtime 推理后端
pub mod overlay; // 叠加显示
pub mod pipeline; // 分析线程 (只保留最新帧)
pub mod tracking; // 单目标视觉跟踪
pub mod utils; // 工具模块

pub use crate::config::{AppConfig, Args};
pub use crate::controller::{Controller, ControllerState, ControllerStats, TrackerFactory};
pub use crate::detection::detector::{DetectionBackend, Detector, DetectorConfig};
pub use crate::detection::types::{
    BBox, CoordSpace, DetectionResult, Diagnostic, EventSource, Frame, PixelFormat, TrackingEvent,
};
pub use crate::error::{Error, InferenceError, ModelLoadError, TrackerInitError};
pub use crate::mapping::{CoordinateMapper, ScalePolicy};
pub use crate::models::{LabelMap, Model, ModelType};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::tracking::{CsrtParams, CsrtTracker, TrackerSession, TrackingFailure, VisualTracker};

/// 非极大值抑制 (按置信度降序, 同类与异类一视同仁)
pub fn non_max_suppression(xs: &mut Vec<DetectionResult>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.score.total_cmp(&b1.score));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].bbox.iou(&xs[index].bbox);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, score: f32) -> DetectionResult {
        DetectionResult {
            bbox: BBox::new(x, 0.0, x + 10.0, 10.0),
            label: "car".to_string(),
            class_id: 2,
            score,
        }
    }

    #[test]
    fn test_nms_keeps_highest() {
        let mut xs = vec![det(1.0, 0.5), det(0.0, 0.9), det(50.0, 0.3)];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].score, 0.9);
        assert_eq!(xs[1].score, 0.3);
    }

    #[test]
    fn test_time_string_delimiter() {
        let s = gen_time_string("-");
        assert_eq!(s.matches('-').count(), 6);
    }
}
