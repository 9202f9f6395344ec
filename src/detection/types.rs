/// 检测/跟踪系统数据结构定义
/// Data structures for the detect/track core
use std::sync::Arc;

use image::{DynamicImage, RgbImage};

use crate::controller::ControllerState;
use crate::error::{InferenceError, TrackerInitError};
use crate::tracking::TrackingFailure;

// ========== 坐标空间 ==========

/// 边界框所在坐标空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordSpace {
    /// 帧像素坐标 (已旋转为正向)
    Frame,
    /// 归一化坐标 [0, 1]
    Normalized,
    /// 模型输入坐标 (等比缩放, 左上角对齐)
    ModelInput { width: u32, height: u32 },
    /// 显示表面坐标
    Display,
}

// ========== 边界框 ==========

/// 轴对齐边界框 (left, top, right, bottom)
///
/// 构造时保证 `x2 >= x1`, `y2 >= y1`; 宽或高为0视为退化框.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    space: CoordSpace,
}

impl BBox {
    /// 帧坐标系下的框
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::in_space(x1, y1, x2, y2, CoordSpace::Frame)
    }

    pub fn in_space(x1: f32, y1: f32, x2: f32, y2: f32, space: CoordSpace) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
            space,
        }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn x1(&self) -> f32 {
        self.x1
    }

    pub fn y1(&self) -> f32 {
        self.y1
    }

    pub fn x2(&self) -> f32 {
        self.x2
    }

    pub fn y2(&self) -> f32 {
        self.y2
    }

    pub fn space(&self) -> CoordSpace {
        self.space
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// 退化框: 宽或高为0 (或坐标非有限值)
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }

    /// 是否完全位于 [0, width] x [0, height] 内
    pub fn within(&self, width: f32, height: f32) -> bool {
        self.x1 >= 0.0 && self.y1 >= 0.0 && self.x2 <= width && self.y2 <= height
    }

    /// 裁剪到 [0, width] x [0, height], 结果可能退化
    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
            space: self.space,
        }
    }

    /// 改变坐标空间标记 (数值不变)
    pub fn with_space(mut self, space: CoordSpace) -> Self {
        self.space = space;
        self
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let l = self.x1.max(other.x1);
        let t = self.y1.max(other.y1);
        let r = self.x2.min(other.x2);
        let b = self.y2.min(other.y2);
        if r <= l || b <= t {
            return 0.0;
        }
        let inter = (r - l) * (b - t);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

// ========== 帧 ==========

/// 帧像素排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }
}

/// 已校正方向的视频帧 (交给核心后不可变)
#[derive(Clone)]
pub struct Frame {
    data: Arc<Vec<u8>>, // 使用Arc共享数据,事件引用源帧时避免复制
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_id: u64,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("frame_id", &self.frame_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

impl Frame {
    /// 缓冲区长度与尺寸不符时返回 None
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        frame_id: u64,
    ) -> Option<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if width == 0 || height == 0 || data.len() != expected {
            return None;
        }
        Some(Self {
            data: Arc::new(data),
            width,
            height,
            format,
            frame_id,
        })
    }

    pub fn from_rgb_image(image: RgbImage, frame_id: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: Arc::new(image.into_raw()),
            width,
            height,
            format: PixelFormat::Rgb8,
            frame_id,
        }
    }

    pub fn from_dynamic(image: &DynamicImage, frame_id: u64) -> Self {
        Self::from_rgb_image(image.to_rgb8(), frame_id)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 转换为3通道RGB (跟踪器与模型所需格式)
    pub fn to_rgb(&self) -> RgbImage {
        let rgb_data: Vec<u8> = match self.format {
            PixelFormat::Rgb8 => self.data.as_ref().clone(),
            PixelFormat::Rgba8 => {
                let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
                for chunk in self.data.chunks_exact(4) {
                    out.push(chunk[0]); // R
                    out.push(chunk[1]); // G
                    out.push(chunk[2]); // B
                }
                out
            }
            PixelFormat::Bgra8 => {
                let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
                for chunk in self.data.chunks_exact(4) {
                    out.push(chunk[2]);
                    out.push(chunk[1]);
                    out.push(chunk[0]);
                }
                out
            }
        };
        // 长度在构造时已校验
        RgbImage::from_raw(self.width, self.height, rgb_data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

// ========== 检测结果 ==========

/// 单个检测结果 (每次检测新生成, 控制器立即消费)
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub bbox: BBox,
    pub label: String,
    pub class_id: u32,
    pub score: f32,
}

// ========== 跟踪事件 ==========

/// 事件中框的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// 本帧检测得到 (首次捕获或重新捕获)
    Detection,
    /// 跟踪器更新得到
    Tracking,
    /// 无目标
    None,
}

/// 每帧一个的跟踪事件 (核心唯一的对外输出)
#[derive(Debug, Clone)]
pub struct TrackingEvent {
    pub bbox: Option<BBox>,
    pub frame: Frame,
    pub source: EventSource,
    pub state: ControllerState,
}

impl TrackingEvent {
    pub fn frame_id(&self) -> u64 {
        self.frame.frame_id()
    }
}

// ========== 诊断信息 ==========

/// 诊断通道消息 (与正常的"无目标"结果区分)
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    Inference {
        frame_id: u64,
        error: InferenceError,
    },
    TrackerInit {
        frame_id: u64,
        error: TrackerInitError,
    },
    TrackingLost {
        frame_id: u64,
        reason: TrackingFailure,
    },
}
