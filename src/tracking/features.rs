//! 跟踪特征提取 (HOG / 颜色名称 / 灰度 / RGB)
//!
//! 输入为 HWC 浮点图像块 (取值 0..255), 尺寸为 cell 的整数倍;
//! 输出为按 cell 排列的多通道特征图, 每个通道行主序.

use super::params::{CsrtParams, WindowFunction};

/// 特征 cell 边长 (像素)
pub const CELL_SIZE: usize = 4;

/// 颜色名称个数
pub const COLOR_NAME_COUNT: usize = 11;

/// 颜色名称原型 (黑 蓝 棕 灰 绿 橙 粉 紫 红 白 黄)
const COLOR_NAMES: [[f32; 3]; COLOR_NAME_COUNT] = [
    [0.0, 0.0, 0.0],
    [0.0, 0.0, 255.0],
    [128.0, 80.0, 30.0],
    [128.0, 128.0, 128.0],
    [0.0, 160.0, 0.0],
    [255.0, 150.0, 0.0],
    [255.0, 170.0, 200.0],
    [130.0, 0.0, 170.0],
    [230.0, 0.0, 0.0],
    [255.0, 255.0, 255.0],
    [255.0, 240.0, 0.0],
];

/// 颜色名称软分配的带宽
const COLOR_NAME_SIGMA: f32 = 40.0;

/// 多通道特征图 (cell 网格)
#[derive(Debug, Clone)]
pub struct FeatureMap {
    pub width: usize,
    pub height: usize,
    pub channels: Vec<Vec<f32>>,
}

impl FeatureMap {
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 每个通道逐元素乘以空间窗
    pub fn apply_window(&mut self, window: &[f32]) {
        for channel in self.channels.iter_mut() {
            for (v, w) in channel.iter_mut().zip(window.iter()) {
                *v *= w;
            }
        }
    }

    /// 所有通道按 cell 拼接为一个向量 (尺度估计使用)
    pub fn flatten(&self) -> Vec<f32> {
        self.channels.iter().flatten().copied().collect()
    }
}

/// 提取图像块特征
///
/// `patch` 为 HWC 浮点数组, `width`/`height` 为像素尺寸 (应为 CELL_SIZE 的整数倍)
pub fn extract(patch: &[f32], width: usize, height: usize, params: &CsrtParams) -> FeatureMap {
    let cells_w = width / CELL_SIZE;
    let cells_h = height / CELL_SIZE;
    let mut channels = Vec::with_capacity(params.channel_count());

    if params.use_hog {
        channels.extend(hog(patch, width, height, params.hog_orientations, params.hog_clip));
    }
    if params.use_color_names {
        channels.extend(color_names(patch, width, cells_w, cells_h));
    }
    if params.use_gray || params.use_rgb {
        let means = cell_means(patch, width, cells_w, cells_h);
        if params.use_gray {
            channels.push(
                means
                    .iter()
                    .map(|m| (m[0] + m[1] + m[2]) / (3.0 * 255.0) - 0.5)
                    .collect(),
            );
        }
        if params.use_rgb {
            for c in 0..3 {
                channels.push(means.iter().map(|m| m[c] / 255.0 - 0.5).collect());
            }
        }
    }

    FeatureMap {
        width: cells_w,
        height: cells_h,
        channels,
    }
}

/// 只提取 HOG 通道
pub fn extract_hog(patch: &[f32], width: usize, height: usize, params: &CsrtParams) -> FeatureMap {
    FeatureMap {
        width: width / CELL_SIZE,
        height: height / CELL_SIZE,
        channels: hog(patch, width, height, params.hog_orientations, params.hog_clip),
    }
}

/// 空间窗 (cell 网格, 行主序)
pub fn spatial_window(width: usize, height: usize, function: WindowFunction) -> Vec<f32> {
    let hann = |n: usize| -> Vec<f32> {
        if n <= 1 {
            return vec![1.0; n];
        }
        (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos())
            .collect()
    };
    match function {
        WindowFunction::Rectangular => vec![1.0; width * height],
        WindowFunction::Hann => {
            let wx = hann(width);
            let wy = hann(height);
            let mut out = Vec::with_capacity(width * height);
            for y in 0..height {
                for x in 0..width {
                    out.push(wx[x] * wy[y]);
                }
            }
            out
        }
    }
}

fn luminance(patch: &[f32], width: usize, x: usize, y: usize) -> f32 {
    let i = (y * width + x) * 3;
    (0.299 * patch[i] + 0.587 * patch[i + 1] + 0.114 * patch[i + 2]) / 255.0
}

/// 方向梯度直方图: 无符号方向, 相邻 bin 线性插值, cell 内 L2 归一化 → 截断 → 再归一化
fn hog(patch: &[f32], width: usize, height: usize, bins: usize, clip: f32) -> Vec<Vec<f32>> {
    let cells_w = width / CELL_SIZE;
    let cells_h = height / CELL_SIZE;
    let mut hist = vec![vec![0f32; cells_w * cells_h]; bins];
    if bins == 0 || cells_w == 0 || cells_h == 0 {
        return hist;
    }

    let bin_width = std::f32::consts::PI / bins as f32;
    for y in 0..cells_h * CELL_SIZE {
        for x in 0..cells_w * CELL_SIZE {
            let xl = x.saturating_sub(1);
            let xr = (x + 1).min(width - 1);
            let yt = y.saturating_sub(1);
            let yb = (y + 1).min(height - 1);
            let gx = luminance(patch, width, xr, y) - luminance(patch, width, xl, y);
            let gy = luminance(patch, width, x, yb) - luminance(patch, width, x, yt);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude <= f32::EPSILON {
                continue;
            }

            let mut angle = gy.atan2(gx);
            if angle < 0.0 {
                angle += std::f32::consts::PI;
            }
            let pos = angle / bin_width - 0.5;
            let b0 = pos.floor();
            let frac = pos - b0;
            let b0 = (b0 as i32).rem_euclid(bins as i32) as usize;
            let b1 = (b0 + 1) % bins;

            let cell = (y / CELL_SIZE) * cells_w + x / CELL_SIZE;
            hist[b0][cell] += magnitude * (1.0 - frac);
            hist[b1][cell] += magnitude * frac;
        }
    }

    for cell in 0..cells_w * cells_h {
        normalize_cell(&mut hist, cell, clip);
    }
    hist
}

fn normalize_cell(hist: &mut [Vec<f32>], cell: usize, clip: f32) {
    const EPS: f32 = 1e-2;
    let norm = (hist.iter().map(|h| h[cell] * h[cell]).sum::<f32>() + EPS).sqrt();
    for h in hist.iter_mut() {
        h[cell] = (h[cell] / norm).min(clip);
    }
    let norm = (hist.iter().map(|h| h[cell] * h[cell]).sum::<f32>() + EPS).sqrt();
    for h in hist.iter_mut() {
        h[cell] /= norm;
    }
}

/// 像素到 11 个颜色原型的软分配概率, 按 cell 取平均后去均值
fn color_names(patch: &[f32], width: usize, cells_w: usize, cells_h: usize) -> Vec<Vec<f32>> {
    let mut out = vec![vec![0f32; cells_w * cells_h]; COLOR_NAME_COUNT];
    let denom = 2.0 * COLOR_NAME_SIGMA * COLOR_NAME_SIGMA;
    let per_cell = (CELL_SIZE * CELL_SIZE) as f32;
    let mut probs = [0f32; COLOR_NAME_COUNT];

    for y in 0..cells_h * CELL_SIZE {
        for x in 0..cells_w * CELL_SIZE {
            let i = (y * width + x) * 3;
            let rgb = [patch[i], patch[i + 1], patch[i + 2]];
            let mut sum = 0.0;
            for (k, proto) in COLOR_NAMES.iter().enumerate() {
                let d2: f32 = (0..3).map(|c| (rgb[c] - proto[c]).powi(2)).sum();
                probs[k] = (-d2 / denom).exp();
                sum += probs[k];
            }
            let cell = (y / CELL_SIZE) * cells_w + x / CELL_SIZE;
            for k in 0..COLOR_NAME_COUNT {
                let p = if sum > 0.0 {
                    probs[k] / sum
                } else {
                    1.0 / COLOR_NAME_COUNT as f32
                };
                out[k][cell] += p / per_cell;
            }
        }
    }

    let mean = 1.0 / COLOR_NAME_COUNT as f32;
    for channel in out.iter_mut() {
        for v in channel.iter_mut() {
            *v -= mean;
        }
    }
    out
}

fn cell_means(patch: &[f32], width: usize, cells_w: usize, cells_h: usize) -> Vec<[f32; 3]> {
    let mut means = vec![[0f32; 3]; cells_w * cells_h];
    let per_cell = (CELL_SIZE * CELL_SIZE) as f32;
    for y in 0..cells_h * CELL_SIZE {
        for x in 0..cells_w * CELL_SIZE {
            let i = (y * width + x) * 3;
            let cell = &mut means[(y / CELL_SIZE) * cells_w + x / CELL_SIZE];
            for c in 0..3 {
                cell[c] += patch[i + c] / per_cell;
            }
        }
    }
    means
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: usize, height: usize, rgb: [f32; 3]) -> Vec<f32> {
        (0..width * height).flat_map(|_| rgb).collect()
    }

    #[test]
    fn test_channel_layout() {
        let params = CsrtParams::default();
        let patch = solid(32, 16, [120.0, 60.0, 30.0]);
        let fm = extract(&patch, 32, 16, &params);
        assert_eq!(fm.width, 8);
        assert_eq!(fm.height, 4);
        assert_eq!(fm.channels.len(), params.channel_count());
        assert!(fm.channels.iter().all(|c| c.len() == 32));
    }

    #[test]
    fn test_flat_patch_has_no_gradient() {
        let params = CsrtParams::default();
        let patch = solid(16, 16, [200.0, 200.0, 200.0]);
        let fm = extract_hog(&patch, 16, 16, &params);
        assert!(fm.channels.iter().flatten().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_vertical_edge_orientation() {
        // 左黑右白: 梯度沿 x 方向, 能量落在 0 / π 附近的 bin
        let mut patch = solid(16, 16, [0.0, 0.0, 0.0]);
        for y in 0..16 {
            for x in 8..16 {
                let i = (y * 16 + x) * 3;
                patch[i..i + 3].copy_from_slice(&[255.0, 255.0, 255.0]);
            }
        }
        let params = CsrtParams::default();
        let fm = extract_hog(&patch, 16, 16, &params);
        let cell = 4 + 1; // 第二行, 第二列 (边缘所在)
        let middle_bin = params.hog_orientations / 2;
        assert!(fm.channels[0][cell] > fm.channels[middle_bin][cell]);
    }

    #[test]
    fn test_color_names_pick_red() {
        let params = CsrtParams {
            use_hog: false,
            use_rgb: false,
            ..CsrtParams::default()
        };
        let fm = extract(&solid(8, 8, [230.0, 0.0, 0.0]), 8, 8, &params);
        let best = (0..COLOR_NAME_COUNT)
            .max_by(|&a, &b| fm.channels[a][0].total_cmp(&fm.channels[b][0]))
            .unwrap();
        assert_eq!(best, 8);
    }

    #[test]
    fn test_hann_window_peaks_in_middle() {
        let w = spatial_window(9, 9, WindowFunction::Hann);
        assert!((w[4 * 9 + 4] - 1.0).abs() < 1e-6);
        assert!(w[0].abs() < 1e-6);
        assert_eq!(spatial_window(3, 2, WindowFunction::Rectangular), vec![1.0; 6]);
    }
}
