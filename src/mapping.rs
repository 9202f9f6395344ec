//! 坐标映射 (CoordinateMapper)
//!
//! 纯函数, 无状态: 把帧/模型坐标系下的框映射到显示表面.
//! - DirectFill: 两轴独立缩放 (全屏预览)
//! - Letterbox:  等比缩放 + 居中偏移 (方形模型输入居中显示在非方形表面)
//!
//! 映射结果不做越界裁剪, 由调用方决定是否 clamp.

use serde::{Deserialize, Serialize};

use crate::detection::types::{BBox, CoordSpace};
use crate::utils::affine_transform::AffineMatrix;

/// 缩放策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalePolicy {
    // 与命令行写法一致
    #[serde(alias = "direct", alias = "fill")]
    DirectFill,
    #[serde(alias = "fit")]
    Letterbox,
}

impl std::str::FromStr for ScalePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" | "directfill" | "fill" => Ok(ScalePolicy::DirectFill),
            "letterbox" | "fit" => Ok(ScalePolicy::Letterbox),
            other => Err(format!("unknown scale policy: {}", other)),
        }
    }
}

/// 帧/模型坐标 → 显示坐标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    policy: ScalePolicy,
    /// DirectFill: 帧尺寸; Letterbox: 模型输入尺寸
    source: (u32, u32),
    display: (u32, u32),
}

impl CoordinateMapper {
    pub fn new(policy: ScalePolicy, source: (u32, u32), display: (u32, u32)) -> Self {
        Self {
            policy,
            source,
            display,
        }
    }

    pub fn direct_fill(frame_width: u32, frame_height: u32, display_width: u32, display_height: u32) -> Self {
        Self::new(
            ScalePolicy::DirectFill,
            (frame_width, frame_height),
            (display_width, display_height),
        )
    }

    pub fn letterbox(input_width: u32, input_height: u32, display_width: u32, display_height: u32) -> Self {
        Self::new(
            ScalePolicy::Letterbox,
            (input_width, input_height),
            (display_width, display_height),
        )
    }

    pub fn policy(&self) -> ScalePolicy {
        self.policy
    }

    /// 各轴缩放系数 (Letterbox 下两轴相同)
    pub fn scale(&self) -> (f32, f32) {
        let scale_x = self.display.0 as f32 / self.source.0.max(1) as f32;
        let scale_y = self.display.1 as f32 / self.source.1.max(1) as f32;
        match self.policy {
            ScalePolicy::DirectFill => (scale_x, scale_y),
            ScalePolicy::Letterbox => {
                let s = scale_x.min(scale_y);
                (s, s)
            }
        }
    }

    /// 居中偏移 (DirectFill 下为0)
    pub fn offset(&self) -> (f32, f32) {
        match self.policy {
            ScalePolicy::DirectFill => (0.0, 0.0),
            ScalePolicy::Letterbox => {
                let (scale, _) = self.scale();
                (
                    (self.display.0 as f32 - self.source.0 as f32 * scale) / 2.0,
                    (self.display.1 as f32 - self.source.1 as f32 * scale) / 2.0,
                )
            }
        }
    }

    /// 源像素坐标 → 显示坐标 的仿射矩阵
    pub fn matrix(&self) -> AffineMatrix {
        let (sx, sy) = self.scale();
        let (ox, oy) = self.offset();
        AffineMatrix::translation(ox, oy).compose(&AffineMatrix::scale(sx, sy))
    }

    /// 映射一个框到显示坐标
    ///
    /// 归一化框先乘以源尺寸; 帧/模型输入坐标直接使用.
    /// Letterbox: `edge = coord * inputDim * scale + offset`
    pub fn map(&self, bbox: &BBox) -> BBox {
        let (w, h) = (self.source.0 as f32, self.source.1 as f32);
        let (x1, y1, x2, y2) = match bbox.space() {
            CoordSpace::Normalized => (bbox.x1() * w, bbox.y1() * h, bbox.x2() * w, bbox.y2() * h),
            _ => (bbox.x1(), bbox.y1(), bbox.x2(), bbox.y2()),
        };
        let m = self.matrix();
        let (l, t) = m.transform_point(x1, y1);
        let (r, b) = m.transform_point(x2, y2);
        BBox::in_space(l, t, r, b, CoordSpace::Display)
    }
}

/// 模型输出坐标 → 帧像素坐标
///
/// - Normalized: 乘以帧尺寸
/// - ModelInput: 除以等比缩放系数 min(inputW/frameW, inputH/frameH) (左上角对齐)
/// - Frame: 原样返回
pub fn to_frame_space(bbox: &BBox, frame_width: u32, frame_height: u32) -> BBox {
    let (fw, fh) = (frame_width as f32, frame_height as f32);
    match bbox.space() {
        CoordSpace::Frame => *bbox,
        CoordSpace::Normalized => BBox::new(
            bbox.x1() * fw,
            bbox.y1() * fh,
            bbox.x2() * fw,
            bbox.y2() * fh,
        ),
        CoordSpace::ModelInput { width, height } => {
            let ratio = (width as f32 / fw).min(height as f32 / fh);
            BBox::new(
                bbox.x1() / ratio,
                bbox.y1() / ratio,
                bbox.x2() / ratio,
                bbox.y2() / ratio,
            )
        }
        // 显示坐标不能反推帧坐标, 标记后原样返回
        CoordSpace::Display => bbox.with_space(CoordSpace::Frame),
    }
}
