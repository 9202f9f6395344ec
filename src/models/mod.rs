/// 检测模型统一接口与实现
///
/// # 架构说明
///
/// - **Ssd**: SSD-MobileNet 风格模型, 输出归一化 `[ymin, xmin, ymax, xmax]` 框
///   - 文件: `ssd.rs`
/// - **YOLOv8**: 输出模型输入坐标系下的 `cx, cy, w, h` 框 (等比缩放, 左上角对齐)
///   - 文件: `yolov8.rs`
///
/// ## Model Trait
/// 统一的模型接口, 定义标准流程: preprocess → run → postprocess
///
/// 任何 `Model` 都自动实现 `DetectionBackend`, 可直接交给 `Detector` 使用.
///
/// ## 使用示例
/// ```no_run
/// use detrack_rs::models::{build_model, LabelMap};
/// use detrack_rs::OrtConfig;
///
/// let backend = build_model(OrtConfig::cpu("models/detect.onnx", 300, 300), LabelMap::coco(), false)?;
/// # Ok::<(), detrack_rs::error::ModelLoadError>(())
/// ```
use anyhow::{anyhow, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{Array, IxDyn};

use crate::detection::detector::DetectionBackend;
use crate::detection::types::{DetectionResult, Frame};
use crate::error::{InferenceError, ModelLoadError};
use crate::OrtConfig;

/// 模型类型枚举 (用于自动识别模型)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// SSD-MobileNet (归一化输出)
    Ssd,
    /// YOLOv8 标准模型
    YOLOv8,
}

impl ModelType {
    /// 从模型路径推断模型类型
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_lowercase();
        if lower.contains("yolo") || lower.contains("v8") {
            ModelType::YOLOv8
        } else {
            ModelType::Ssd
        }
    }

    /// 模型默认输入尺寸 (width, height)
    pub fn default_input_size(&self) -> (u32, u32) {
        match self {
            ModelType::Ssd => (300, 300),
            ModelType::YOLOv8 => (640, 640),
        }
    }

    /// 获取模型推荐的IOU阈值
    pub fn default_iou_threshold(&self) -> f32 {
        0.45
    }
}

/// 统一的检测模型接口
///
/// ## 核心流程
/// ```text
/// 帧 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 检测结果 (框所在坐标系由模型决定)
/// ```
pub trait Model {
    /// 预处理: 帧 → ndarray 张量
    fn preprocess(&mut self, frame: &Frame) -> Result<Array<f32, IxDyn>>;

    /// 推理: 执行模型前向传播, 返回原始输出
    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后处理: 原始输出 → 检测结果 (未按类别/阈值筛选)
    fn postprocess(&self, xs: Vec<Array<f32, IxDyn>>, frame: &Frame) -> Result<Vec<DetectionResult>>;

    /// 完整的推理流程: preprocess → run → postprocess
    ///
    /// 任一步失败都转换为 `InferenceError`
    fn forward(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
        let xs = self.preprocess(frame)?;
        let ys = self.run(xs, false)?;
        Ok(self.postprocess(ys, frame)?)
    }

    /// 打印模型信息
    fn summary(&self);
}

impl<M: Model> DetectionBackend for M {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
        self.forward(frame)
    }
}

/// 按路径加载模型, 返回可交给 `Detector` 的后端
pub fn build_model(
    config: OrtConfig,
    labels: LabelMap,
    profile: bool,
) -> Result<Box<dyn DetectionBackend + Send>, ModelLoadError> {
    match ModelType::from_path(&config.f) {
        ModelType::Ssd => {
            let model = Ssd::new(config, labels, profile)?;
            model.summary();
            Ok(Box::new(model))
        }
        ModelType::YOLOv8 => {
            let model = YOLOv8::new(config, labels, profile)?;
            model.summary();
            Ok(Box::new(model))
        }
    }
}

/// RGB 图像缩放 (fast_image_resize, 双线性)
pub(crate) fn resize_rgb(image: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    if image.dimensions() == (width, height) {
        return Ok(image.clone());
    }
    let src = fr::images::Image::from_vec_u8(
        image.width(),
        image.height(),
        image.as_raw().clone(),
        fr::PixelType::U8x3,
    )?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);
    fr::Resizer::new().resize(
        &src,
        &mut dst,
        &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
    )?;
    RgbImage::from_raw(width, height, dst.into_vec()).ok_or_else(|| anyhow!("resized buffer does not match {}x{}", width, height))
}

pub mod labels; // 类别标签表
pub mod ssd; // SSD-MobileNet
pub mod yolov8; // YOLOv8

// Re-exports
pub use labels::{LabelMap, COCO_NAMES};
pub use ssd::Ssd;
pub use yolov8::YOLOv8;
