/// 单目标视觉跟踪模块
/// Single-object visual tracking
pub mod csrt; // 判别式相关滤波跟踪器 (通道/空间可靠性)
pub mod features; // HOG / 颜色名称 / RGB 特征
pub mod fft; // 二维 FFT
pub mod params; // 固定参数记录
pub mod scale; // 尺度估计
pub mod segmentation; // 前景/背景分割
pub mod session; // 跟踪会话 (ROI 校验 + 退化判定)

pub use csrt::CsrtTracker;
pub use params::{CsrtParams, WindowFunction};
pub use session::TrackerSession;

use image::RgbImage;

use crate::detection::types::BBox;
use crate::error::TrackerInitError;

/// 跟踪器生命周期状态
///
/// `Uninitialized → Initialized → {Updated, Lost}`, 重新 init 后可再次进入.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Initialized,
    Updated,
    Lost,
}

/// 底层跟踪器一次更新的原始输出
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerUpdate {
    /// 算法自身的成功标志
    pub success: bool,
    /// 帧坐标系下的新 ROI (未裁剪, 可能退化)
    pub roi: BBox,
    /// 响应峰值
    pub confidence: f32,
}

/// 视觉跟踪器接口
///
/// 输入统一为3通道 RGB 图像; 参数在构造时固定, 不提供运行时修改.
pub trait VisualTracker {
    fn init(&mut self, image: &RgbImage, roi: &BBox) -> Result<(), TrackerInitError>;

    fn update(&mut self, image: &RgbImage) -> TrackerUpdate;

    fn state(&self) -> TrackerState;

    fn name(&self) -> &'static str {
        "tracker"
    }
}

/// 跟踪失败 (预期结果, 非错误): 驱动控制器重新检测
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum TrackingFailure {
    /// 响应峰值低于阈值
    #[error("low confidence (peak {peak:.3})")]
    LowConfidence { peak: f32 },
    /// 返回的 ROI 宽或高为0 (无论算法自身标志如何)
    #[error("degenerate roi")]
    Degenerate,
}
