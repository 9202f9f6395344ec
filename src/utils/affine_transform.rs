/// 仿射变换工具模块
/// 用于框坐标映射与跟踪器图像块采样 (类似 cv2::warpAffine)
use image::RgbImage;

/// 仿射变换矩阵 (2x3)
/// | a11 a12 b1 |
/// | a21 a22 b2 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub a11: f32,
    pub a12: f32,
    pub b1: f32,
    pub a21: f32,
    pub a22: f32,
    pub b2: f32,
}

impl AffineMatrix {
    /// 创建单位仿射矩阵
    pub fn identity() -> Self {
        Self::scale(1.0, 1.0)
    }

    /// 应用仿射变换到点 (x, y)
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        let new_x = self.a11 * x + self.a12 * y + self.b1;
        let new_y = self.a21 * x + self.a22 * y + self.b2;
        (new_x, new_y)
    }

    /// 计算逆矩阵 (用于反向映射)
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a11 * self.a22 - self.a12 * self.a21;
        if det.abs() < 1e-10 {
            return None; // 矩阵不可逆
        }

        let inv_det = 1.0 / det;
        Some(Self {
            a11: self.a22 * inv_det,
            a12: -self.a12 * inv_det,
            b1: (self.a12 * self.b2 - self.a22 * self.b1) * inv_det,
            a21: -self.a21 * inv_det,
            a22: self.a11 * inv_det,
            b2: (self.a21 * self.b1 - self.a11 * self.b2) * inv_det,
        })
    }

    /// 创建平移矩阵
    pub fn translation(dx: f32, dy: f32) -> Self {
        Self {
            a11: 1.0,
            a12: 0.0,
            b1: dx,
            a21: 0.0,
            a22: 1.0,
            b2: dy,
        }
    }

    /// 创建缩放矩阵
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a11: sx,
            a12: 0.0,
            b1: 0.0,
            a21: 0.0,
            a22: sy,
            b2: 0.0,
        }
    }

    /// 矩阵组合 (self * other): 先应用 other, 再应用 self
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            a11: self.a11 * other.a11 + self.a12 * other.a21,
            a12: self.a11 * other.a12 + self.a12 * other.a22,
            b1: self.a11 * other.b1 + self.a12 * other.b2 + self.b1,
            a21: self.a21 * other.a11 + self.a22 * other.a21,
            a22: self.a21 * other.a12 + self.a22 * other.a22,
            b2: self.a21 * other.b1 + self.a22 * other.b2 + self.b2,
        }
    }

    /// 把源图像中以 (cx, cy) 为中心、尺寸 src_size 的区域映射到 dst_size 图像块
    pub fn crop_to(center: (f32, f32), src_size: (f32, f32), dst_size: (usize, usize)) -> Self {
        let sx = dst_size.0 as f32 / src_size.0.max(1e-3);
        let sy = dst_size.1 as f32 / src_size.1.max(1e-3);
        // 像素中心对齐: dst = (src - (c - size/2)) * s - 0.5 + 0.5*s
        let t = AffineMatrix::translation(
            -(center.0 - src_size.0 / 2.0),
            -(center.1 - src_size.1 / 2.0),
        );
        let s = AffineMatrix::scale(sx, sy);
        let half = AffineMatrix::translation(0.5 * sx - 0.5, 0.5 * sy - 0.5);
        half.compose(&s.compose(&t))
    }
}

/// 边界处理方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BorderMode {
    Constant(u8), // 常数填充
    Replicate,    // 边缘复制
}

/// 仿射变换 (RGB图像 → 浮点RGB图像块)
///
/// # 参数
/// - `src`: 源图像
/// - `matrix`: 源 → 目标 的仿射变换矩阵
/// - `dst_size`: 目标图像尺寸 (width, height)
/// - `border_mode`: 边界处理方法
///
/// # 返回
/// 行主序 HWC 浮点数组, 取值范围 [0, 255], 双线性插值
pub fn warp_affine_rgb_f32(
    src: &RgbImage,
    matrix: &AffineMatrix,
    dst_size: (usize, usize),
    border_mode: BorderMode,
) -> Vec<f32> {
    let (dst_width, dst_height) = dst_size;
    let mut dst = vec![0f32; dst_height * dst_width * 3];

    // 使用逆变换进行反向映射; 不可逆时返回全零块
    let Some(inv_matrix) = matrix.inverse() else {
        return dst;
    };

    let (src_width, src_height) = (src.width() as usize, src.height() as usize);
    let raw = src.as_raw();

    for dst_y in 0..dst_height {
        for dst_x in 0..dst_width {
            let (src_x, src_y) = inv_matrix.transform_point(dst_x as f32, dst_y as f32);
            for c in 0..3 {
                let dst_idx = (dst_y * dst_width + dst_x) * 3 + c;
                dst[dst_idx] =
                    get_pixel_bilinear_rgb(raw, src_x, src_y, src_width, src_height, c, border_mode);
            }
        }
    }

    dst
}

/// 双线性插值 (RGB)
fn get_pixel_bilinear_rgb(
    src: &[u8],
    x: f32,
    y: f32,
    width: usize,
    height: usize,
    channel: usize,
    border_mode: BorderMode,
) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_border_pixel_rgb(src, x0, y0, width, height, channel, border_mode) as f32;
    let p01 = get_border_pixel_rgb(src, x0, y1, width, height, channel, border_mode) as f32;
    let p10 = get_border_pixel_rgb(src, x1, y0, width, height, channel, border_mode) as f32;
    let p11 = get_border_pixel_rgb(src, x1, y1, width, height, channel, border_mode) as f32;

    let v0 = p00 * (1.0 - fx) + p10 * fx;
    let v1 = p01 * (1.0 - fx) + p11 * fx;
    (v0 * (1.0 - fy) + v1 * fy).clamp(0.0, 255.0)
}

/// 边界处理 (RGB)
fn get_border_pixel_rgb(
    src: &[u8],
    x: i32,
    y: i32,
    width: usize,
    height: usize,
    channel: usize,
    border_mode: BorderMode,
) -> u8 {
    let (bx, by) = match border_mode {
        BorderMode::Constant(_) => (x, y),
        BorderMode::Replicate => (x.clamp(0, width as i32 - 1), y.clamp(0, height as i32 - 1)),
    };

    if bx >= 0 && bx < width as i32 && by >= 0 && by < height as i32 {
        let idx = (by as usize * width + bx as usize) * 3 + channel;
        src[idx]
    } else {
        match border_mode {
            BorderMode::Constant(val) => val,
            _ => 0,
        }
    }
}
