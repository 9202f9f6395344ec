//! 检测器 (Detector)
//! 职责: 帧 → 检测后端推理 → 阈值/数量/类别筛选 → 帧坐标系下的单个目标框

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{DetectionResult, Frame};
use crate::error::InferenceError;
use crate::mapping::to_frame_space;

/// 检测后端能力接口 (可替换的模型)
///
/// 返回原始检测结果: 框可以位于归一化、模型输入或帧坐标系, 由 Detector 统一换算.
pub trait DetectionBackend {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError>;
}

/// 检测器配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub target_class: String, // 目标类别
    pub conf_threshold: f32,  // 最低置信度
    pub max_results: usize,   // 参与类别筛选的最大结果数 (0 = 不限)
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            target_class: "car".to_string(),
            conf_threshold: 0.25,
            max_results: 1,
        }
    }
}

pub struct Detector {
    backend: Box<dyn DetectionBackend + Send>,
    config: DetectorConfig,

    // 统计
    count: u64,
    last: Instant,
}

impl Detector {
    pub fn new(backend: Box<dyn DetectionBackend + Send>, config: DetectorConfig) -> Self {
        debug!(
            "🔍 检测器: target={} conf={} max_results={}",
            config.target_class, config.conf_threshold, config.max_results
        );
        Self {
            backend,
            config,
            count: 0,
            last: Instant::now(),
        }
    }

    /// 检测一帧: 后端失败返回 `Err` (由调用方上报), 无目标返回 `Ok(None)`
    pub fn try_detect(&mut self, frame: &Frame) -> Result<Option<DetectionResult>, InferenceError> {
        let t = Instant::now();
        let raw = self.backend.infer(frame)?;
        let found = self.select(raw, frame);
        self.tick(t);
        Ok(found)
    }

    /// 筛选: 置信度阈值 → 按置信度取前 max_results 个 → 目标类别 → 最高置信度 → 帧坐标
    pub fn select(&self, mut raw: Vec<DetectionResult>, frame: &Frame) -> Option<DetectionResult> {
        raw.retain(|d| d.score.is_finite() && d.score >= self.config.conf_threshold);
        raw.sort_by(|a, b| b.score.total_cmp(&a.score));
        if self.config.max_results > 0 {
            raw.truncate(self.config.max_results);
        }

        let best = raw
            .into_iter()
            .filter(|d| d.label == self.config.target_class)
            .max_by(|a, b| a.score.total_cmp(&b.score))?;

        let (fw, fh) = (frame.width(), frame.height());
        let bbox = to_frame_space(&best.bbox, fw, fh).clamp(fw as f32, fh as f32);
        if bbox.is_degenerate() {
            debug!("检测框 {:?} 在帧外, 忽略", best.bbox.to_array());
            return None;
        }
        Some(DetectionResult { bbox, ..best })
    }

    fn tick(&mut self, t: Instant) {
        let last_ms = t.elapsed().as_secs_f64() * 1000.0;
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            let fps = self.count as f64 / elapsed;
            self.count = 0;
            self.last = Instant::now();
            debug!("🔍 检测 FPS: {:.1} ({:.1}ms)", fps, last_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{BBox, CoordSpace};
    use image::RgbImage;
    use std::collections::VecDeque;

    /// 按脚本逐帧返回结果的检测后端
    struct ScriptedBackend {
        script: VecDeque<Result<Vec<DetectionResult>, InferenceError>>,
    }

    impl DetectionBackend for ScriptedBackend {
        fn infer(&mut self, _frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
            self.script.pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    fn detector(script: Vec<Result<Vec<DetectionResult>, InferenceError>>) -> Detector {
        Detector::new(
            Box::new(ScriptedBackend {
                script: script.into(),
            }),
            DetectorConfig::default(),
        )
    }

    fn result(label: &str, score: f32, bbox: BBox) -> DetectionResult {
        DetectionResult {
            bbox,
            label: label.to_string(),
            class_id: 0,
            score,
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb_image(RgbImage::new(640, 480), 1)
    }

    #[test]
    fn test_default_config() {
        let c = DetectorConfig::default();
        assert_eq!(c.target_class, "car");
        assert_eq!(c.conf_threshold, 0.25);
        assert_eq!(c.max_results, 1);
    }

    #[test]
    fn test_detects_car() {
        let car = result("car", 0.9, BBox::new(100.0, 100.0, 200.0, 200.0));
        let mut d = detector(vec![Ok(vec![car])]);
        let found = d.try_detect(&frame()).unwrap().unwrap();
        assert_eq!(found.bbox.to_array(), [100.0, 100.0, 200.0, 200.0]);
        assert_eq!(found.label, "car");
    }

    #[test]
    fn test_below_threshold_is_none() {
        let car = result("car", 0.2, BBox::new(100.0, 100.0, 200.0, 200.0));
        let mut d = detector(vec![Ok(vec![car])]);
        assert_eq!(d.try_detect(&frame()), Ok(None));
    }

    #[test]
    fn test_max_results_applies_before_class_filter() {
        let person = result("person", 0.95, BBox::new(0.0, 0.0, 50.0, 50.0));
        let car = result("car", 0.9, BBox::new(100.0, 100.0, 200.0, 200.0));
        let mut d = detector(vec![Ok(vec![car.clone(), person.clone()])]);
        assert_eq!(d.try_detect(&frame()), Ok(None));

        // 不限数量时能选出车
        let mut d = Detector::new(
            Box::new(ScriptedBackend {
                script: vec![Ok(vec![person, car])].into(),
            }),
            DetectorConfig {
                max_results: 0,
                ..DetectorConfig::default()
            },
        );
        assert_eq!(d.try_detect(&frame()).unwrap().unwrap().score, 0.9);
    }

    #[test]
    fn test_picks_highest_scoring_car() {
        let a = result("car", 0.5, BBox::new(0.0, 0.0, 10.0, 10.0));
        let b = result("car", 0.8, BBox::new(20.0, 20.0, 40.0, 40.0));
        let mut d = Detector::new(
            Box::new(ScriptedBackend {
                script: vec![Ok(vec![a, b])].into(),
            }),
            DetectorConfig {
                max_results: 5,
                ..DetectorConfig::default()
            },
        );
        assert_eq!(d.try_detect(&frame()).unwrap().unwrap().bbox.to_array(), [20.0, 20.0, 40.0, 40.0]);
    }

    #[test]
    fn test_converts_normalized_and_model_input() {
        let norm = result(
            "car",
            0.9,
            BBox::in_space(0.25, 0.25, 0.5, 0.5, CoordSpace::Normalized),
        );
        let mut d = detector(vec![Ok(vec![norm])]);
        assert_eq!(d.try_detect(&frame()).unwrap().unwrap().bbox.to_array(), [160.0, 120.0, 320.0, 240.0]);

        // 640x480 → 320x320 输入: ratio = 0.5
        let input = result(
            "car",
            0.9,
            BBox::in_space(
                10.0,
                20.0,
                60.0,
                80.0,
                CoordSpace::ModelInput {
                    width: 320,
                    height: 320,
                },
            ),
        );
        let mut d = detector(vec![Ok(vec![input])]);
        let found = d.try_detect(&frame()).unwrap().unwrap();
        assert_eq!(found.bbox.to_array(), [20.0, 40.0, 120.0, 160.0]);
        assert_eq!(found.bbox.space(), CoordSpace::Frame);
    }

    #[test]
    fn test_clamps_to_frame() {
        let car = result("car", 0.9, BBox::new(600.0, -10.0, 700.0, 100.0));
        let mut d = detector(vec![Ok(vec![car])]);
        assert_eq!(d.try_detect(&frame()).unwrap().unwrap().bbox.to_array(), [600.0, 0.0, 640.0, 100.0]);
    }

    #[test]
    fn test_backend_error_is_returned_then_recovers() {
        let error = InferenceError("runtime fault".to_string());
        let car = result("car", 0.9, BBox::new(10.0, 10.0, 60.0, 60.0));
        let mut d = detector(vec![Err(error.clone()), Ok(vec![car])]);

        assert_eq!(d.try_detect(&frame()), Err(error));
        // 错误不影响下一帧
        let found = d.try_detect(&frame()).unwrap().unwrap();
        assert_eq!(found.bbox.to_array(), [10.0, 10.0, 60.0, 60.0]);
    }
}
