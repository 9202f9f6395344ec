// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{
    CUDAExecutionProvider, ExecutionProviderDispatch, TensorRTExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use tracing::{info, warn};

use crate::error::ModelLoadError;

/// 执行设备 (Execution Provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

impl std::fmt::Display for OrtEP {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrtEP::CPU => write!(f, "CPU"),
            OrtEP::CUDA(id) => write!(f, "CUDA:{}", id),
            OrtEP::Trt(id) => write!(f, "TensorRT:{}", id),
        }
    }
}

/// 推理后端配置
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: String,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    /// 模型输入尺寸 (height, width)
    pub image_size: (u32, u32),
}

impl OrtConfig {
    pub fn cpu(f: impl Into<String>, height: u32, width: u32) -> Self {
        Self {
            f: f.into(),
            ep: OrtEP::CPU,
            trt_fp16: false,
            image_size: (height, width),
        }
    }
}

fn session_error<E: std::fmt::Display>(path: &str) -> impl Fn(E) -> ModelLoadError + '_ {
    move |e| ModelLoadError::Session {
        path: path.to_string(),
        reason: e.to_string(),
    }
}

/// ONNX Runtime 会话封装
pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    height: u32,
    width: u32,
    path: String,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self, ModelLoadError> {
        if !Path::new(&config.f).exists() {
            return Err(ModelLoadError::NotFound(config.f));
        }
        let providers: Vec<ExecutionProviderDispatch> = match config.ep {
            OrtEP::CPU => Vec::new(),
            OrtEP::CUDA(device_id) => vec![CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()],
            OrtEP::Trt(device_id) => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .with_fp16(config.trt_fp16)
                    .with_engine_cache(true)
                    .build(),
                // TensorRT 不支持的算子回落到 CUDA
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ],
        };

        let mut builder = Session::builder()
            .map_err(session_error(&config.f))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(session_error(&config.f))?;
        if !providers.is_empty() {
            builder = match builder.with_execution_providers(providers) {
                Ok(b) => b,
                Err(e) => {
                    warn!("⚠️ {} 不可用, 回落到 CPU: {}", config.ep, e);
                    Session::builder()
                        .map_err(session_error(&config.f))?
                        .with_optimization_level(GraphOptimizationLevel::Level3)
                        .map_err(session_error(&config.f))?
                }
            };
        }

        let session = builder.commit_from_file(&config.f).map_err(session_error(&config.f))?;
        info!("✅ 模型已加载: {} ({})", config.f, config.ep);

        Ok(Self {
            session,
            ep: config.ep,
            height: config.image_size.0,
            width: config.image_size.1,
            path: config.f,
        })
    }

    /// 单输入推理, 按位置取回前 `num_outputs` 个输出
    pub fn run(
        &mut self,
        xs: &Array<f32, IxDyn>,
        num_outputs: usize,
        profile: bool,
    ) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = Instant::now();
        let input = TensorRef::from_array_view(xs).map_err(|e| anyhow!(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| anyhow!(e.to_string()))?;

        let mut ys = Vec::with_capacity(num_outputs);
        for i in 0..num_outputs {
            let y = outputs[i]
                .try_extract_array::<f32>()
                .map_err(|e| anyhow!("output {}: {}", i, e))?
                .into_owned();
            ys.push(y);
        }
        if profile {
            info!("[ORT run]: {:?}", t.elapsed());
        }
        Ok(ys)
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_load_error() {
        let err = OrtBackend::build(OrtConfig::cpu("does/not/exist.onnx", 300, 300))
            .err()
            .unwrap();
        assert!(matches!(err, ModelLoadError::NotFound(_)));
    }

    #[test]
    fn test_corrupt_model_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();
        let err = OrtBackend::build(OrtConfig::cpu(path.to_string_lossy(), 300, 300))
            .err()
            .unwrap();
        assert!(matches!(err, ModelLoadError::Session { .. }));
    }

    #[test]
    fn test_ep_display() {
        assert_eq!(OrtEP::CUDA(1).to_string(), "CUDA:1");
        assert_eq!(OrtEP::CPU.to_string(), "CPU");
    }
}
