//! 运行配置 - 命令行参数 + JSON 配置文件
//!
//! JSON 文件保存检测器设置、模型/显示尺寸、缩放策略与跟踪器参数;
//! 命令行参数覆盖文件中的对应项.

use std::fs;
use std::path::Path;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::detector::DetectorConfig;
use crate::error::Error;
use crate::input::Rotation;
use crate::mapping::ScalePolicy;
use crate::models::ModelType;
use crate::ort_backend::{OrtConfig, OrtEP};
use crate::tracking::CsrtParams;

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "single-object detect & track", long_about = None)]
pub struct Args {
    /// ONNX model path
    #[arg(long)]
    pub model: Option<String>,

    /// label file, one label per line (defaults to COCO names)
    #[arg(long)]
    pub labels: Option<String>,

    /// image file or directory of frames
    #[arg(long, required = true)]
    pub source: String,

    /// target class label
    #[arg(long)]
    pub target: Option<String>,

    /// confidence threshold
    #[arg(long)]
    pub conf: Option<f32>,

    /// results kept before class filtering (0 = unlimited)
    #[arg(long)]
    pub max_results: Option<usize>,

    /// input image width
    #[arg(long)]
    pub width: Option<u32>,

    /// input image height
    #[arg(long)]
    pub height: Option<u32>,

    /// overlay width
    #[arg(long)]
    pub display_width: Option<u32>,

    /// overlay height
    #[arg(long)]
    pub display_height: Option<u32>,

    /// overlay scale policy: direct | letterbox
    #[arg(long)]
    pub policy: Option<ScalePolicy>,

    /// clockwise rotation applied to every frame: 0 | 90 | 180 | 270
    #[arg(long)]
    pub rotation: Option<Rotation>,

    /// font for the "no target" status banner
    #[arg(long)]
    pub font: Option<String>,

    /// JSON config file (created with defaults when missing)
    #[arg(long, default_value_t = String::from("detrack.json"))]
    pub config: String,

    /// output directory for overlay images
    #[arg(long)]
    pub output: Option<String>,

    /// using CUDA EP
    #[arg(long)]
    pub cuda: bool,

    /// using TensorRT EP
    #[arg(long)]
    pub trt: bool,

    /// using TensorRT EP FP16
    #[arg(long)]
    pub fp16: bool,

    /// device id
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// feed frames through the keep-latest analysis thread
    #[arg(long)]
    pub realtime: bool,

    /// profile
    #[arg(long)]
    pub profile: bool,
}

impl Args {
    pub fn ep(&self) -> OrtEP {
        if self.trt {
            OrtEP::Trt(self.device_id)
        } else if self.cuda {
            OrtEP::CUDA(self.device_id)
        } else {
            OrtEP::CPU
        }
    }

    /// 命令行参数覆盖配置文件
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(labels) = &self.labels {
            config.labels = Some(labels.clone());
        }
        if let Some(target) = &self.target {
            config.detector.target_class = target.clone();
        }
        if let Some(conf) = self.conf {
            config.detector.conf_threshold = conf;
        }
        if let Some(max_results) = self.max_results {
            config.detector.max_results = max_results;
        }
        if self.width.is_some() {
            config.input_width = self.width;
        }
        if self.height.is_some() {
            config.input_height = self.height;
        }
        if let Some(w) = self.display_width {
            config.display_width = w;
        }
        if let Some(h) = self.display_height {
            config.display_height = h;
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(rotation) = self.rotation {
            config.rotation = rotation;
        }
        if let Some(font) = &self.font {
            config.font = Some(font.clone());
        }
    }
}

/// 应用配置 (JSON)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // === 模型 ===
    pub model: String,                // 模型路径
    pub labels: Option<String>,       // 标签文件 (None = COCO)
    pub input_width: Option<u32>,     // 模型输入宽 (None = 按模型类型)
    pub input_height: Option<u32>,    // 模型输入高

    // === 检测 ===
    pub detector: DetectorConfig,

    // === 显示 ===
    pub display_width: u32,
    pub display_height: u32,
    pub policy: ScalePolicy,
    pub rotation: Rotation,
    pub font: Option<String>, // 状态横幅字体 (None = 只画横幅)

    // === 跟踪器 (构造时一次性传入) ===
    pub tracker: CsrtParams,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: "models/detect.onnx".to_string(),
            labels: None,
            input_width: None,
            input_height: None,
            detector: DetectorConfig::default(),
            display_width: 1280,
            display_height: 720,
            policy: ScalePolicy::DirectFill,
            rotation: Rotation::Deg0,
            font: Some("assets/font/msyh.ttc".to_string()),
            tracker: CsrtParams::default(),
        }
    }
}

impl AppConfig {
    /// 从JSON文件加载配置, 文件不存在时写入默认配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => {
                let config = serde_json::from_str(&json)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                info!("✅ 配置已从 {} 加载", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📝 配置文件不存在, 创建默认配置: {}", path.display());
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("⚠️ 默认配置写入失败: {}", e);
                }
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 保存配置到JSON文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, json)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn model_type(&self) -> ModelType {
        ModelType::from_path(&self.model)
    }

    /// 模型输入尺寸 (width, height), 未配置时取模型类型默认值
    pub fn input_size(&self) -> (u32, u32) {
        let (w, h) = self.model_type().default_input_size();
        (self.input_width.unwrap_or(w), self.input_height.unwrap_or(h))
    }

    pub fn ort_config(&self, ep: OrtEP, trt_fp16: bool) -> OrtConfig {
        let (width, height) = self.input_size();
        OrtConfig {
            f: self.model.clone(),
            ep,
            trt_fp16,
            image_size: (height, width),
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️ 当前配置:");
        info!("  模型: {} ({:?})", self.model, self.model_type());
        info!(
            "  目标: {} | 置信度: {:.2} | 最大结果数: {}",
            self.detector.target_class, self.detector.conf_threshold, self.detector.max_results
        );
        info!(
            "  显示: {}x{} {:?} | 旋转: {}°",
            self.display_width,
            self.display_height,
            self.policy,
            self.rotation.degrees()
        );
        info!(
            "  跟踪器: template {} | padding {} | psr {}",
            self.tracker.template_size, self.tracker.padding, self.tracker.psr_threshold
        );
    }
}
