//! 错误类型 (Error taxonomy)
//!
//! - `ModelLoadError`:   启动期致命错误 (模型缺失/损坏)
//! - `InferenceError`:   单帧推理失败, 本地恢复为"无检测"并上报诊断通道
//! - `TrackerInitError`: ROI非法, 本地恢复为"检测失败"
//!
//! 跟踪丢失 (`TrackingFailure`) 不是错误, 见 `tracking` 模块.

use thiserror::Error;

/// 模型加载失败 (仅启动期出现)
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model asset not found: {0}")]
    NotFound(String),

    #[error("failed to build inference session for {path}: {reason}")]
    Session { path: String, reason: String },

    #[error("invalid label map {path}: {reason}")]
    Labels { path: String, reason: String },
}

/// 推理后端单帧失败
#[derive(Error, Debug, Clone, PartialEq)]
#[error("inference failed: {0}")]
pub struct InferenceError(pub String);

impl From<anyhow::Error> for InferenceError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{:#}", err))
    }
}

/// 跟踪会话创建失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerInitError {
    #[error("roi {width}x{height} is degenerate")]
    Degenerate { width: f32, height: f32 },

    #[error("roi ({x1}, {y1}, {x2}, {y2}) lies outside the {frame_width}x{frame_height} frame")]
    OutOfBounds {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("frame buffer does not match {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },
}

/// crate 顶层错误
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    TrackerInit(#[from] TrackerInitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_error_from_anyhow_keeps_context() {
        let err = anyhow::anyhow!("bad tensor").context("run session");
        let inference: InferenceError = err.into();
        assert!(inference.0.contains("run session"));
        assert!(inference.0.contains("bad tensor"));
    }

    #[test]
    fn test_tracker_init_error_display() {
        let err = TrackerInitError::Degenerate {
            width: 0.0,
            height: 12.0,
        };
        assert!(err.to_string().contains("degenerate"));
    }

    #[test]
    fn test_error_from_model_load() {
        let err: Error = ModelLoadError::NotFound("detect.onnx".to_string()).into();
        match err {
            Error::ModelLoad(ModelLoadError::NotFound(path)) => assert_eq!(path, "detect.onnx"),
            _ => panic!("Expected ModelLoad error"),
        }
    }
}
