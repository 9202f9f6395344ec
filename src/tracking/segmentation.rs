//! 前景/背景颜色直方图分割 (空间可靠性掩码)

use super::features::CELL_SIZE;

/// 掩码中前景 cell 少于该比例时退回整个目标矩形
const MIN_MASK_RATIO: f32 = 0.05;

/// 联合 RGB 直方图 (归一化)
#[derive(Debug, Clone)]
pub struct ColorHistogram {
    bins: usize,
    data: Vec<f32>,
}

impl ColorHistogram {
    pub fn new(bins: usize) -> Self {
        let bins = bins.max(1);
        Self {
            bins,
            data: vec![0.0; bins * bins * bins],
        }
    }

    fn index(&self, rgb: [f32; 3]) -> usize {
        let b = |v: f32| ((v / 256.0 * self.bins as f32) as usize).min(self.bins - 1);
        (b(rgb[0]) * self.bins + b(rgb[1])) * self.bins + b(rgb[2])
    }

    /// 统计像素集合, 结果归一化为概率
    pub fn from_pixels(bins: usize, pixels: impl Iterator<Item = [f32; 3]>) -> Self {
        let mut hist = Self::new(bins);
        let mut total = 0.0;
        for rgb in pixels {
            let i = hist.index(rgb);
            hist.data[i] += 1.0;
            total += 1.0;
        }
        if total > 0.0 {
            hist.data.iter_mut().for_each(|v| *v /= total);
        }
        hist
    }

    /// 指数滑动平均: self = (1 - lr) * self + lr * other
    pub fn blend(&mut self, other: &ColorHistogram, lr: f32) {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = (1.0 - lr) * *a + lr * b;
        }
    }

    pub fn probability(&self, rgb: [f32; 3]) -> f32 {
        self.data[self.index(rgb)]
    }
}

/// 图像块内的矩形区域 (cell 坐标, 右/下开区间)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl CellRect {
    /// 以网格中心为中心、尺寸为 (w, h) cell 的矩形
    pub fn centered(cells_w: usize, cells_h: usize, w: f32, h: f32) -> Self {
        let w = (w.round() as usize).clamp(1, cells_w);
        let h = (h.round() as usize).clamp(1, cells_h);
        let x0 = (cells_w - w) / 2;
        let y0 = (cells_h - h) / 2;
        Self {
            x0,
            y0,
            x1: x0 + w,
            y1: y0 + h,
        }
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    pub fn area(&self) -> usize {
        (self.x1 - self.x0) * (self.y1 - self.y0)
    }
}

/// 前景/背景分割器
#[derive(Debug, Clone)]
pub struct Segmenter {
    foreground: ColorHistogram,
    background: ColorHistogram,
    bins: usize,
}

fn pixels_where<'a>(
    patch: &'a [f32],
    width: usize,
    height: usize,
    pred: impl Fn(usize, usize) -> bool + 'a,
) -> impl Iterator<Item = [f32; 3]> + 'a {
    (0..height).flat_map(move |y| (0..width).map(move |x| (x, y))).filter_map(move |(x, y)| {
        if pred(x / CELL_SIZE, y / CELL_SIZE) {
            let i = (y * width + x) * 3;
            Some([patch[i], patch[i + 1], patch[i + 2]])
        } else {
            None
        }
    })
}

impl Segmenter {
    /// 目标矩形内统计前景, 其余部分统计背景
    pub fn new(patch: &[f32], width: usize, height: usize, target: CellRect, bins: usize) -> Self {
        let foreground =
            ColorHistogram::from_pixels(bins, pixels_where(patch, width, height, move |x, y| target.contains(x, y)));
        let background =
            ColorHistogram::from_pixels(bins, pixels_where(patch, width, height, move |x, y| !target.contains(x, y)));
        Self {
            foreground,
            background,
            bins,
        }
    }

    /// 以学习率 lr 更新前景/背景直方图
    pub fn update(&mut self, patch: &[f32], width: usize, height: usize, target: CellRect, lr: f32) {
        let fresh = Segmenter::new(patch, width, height, target, self.bins);
        self.foreground.blend(&fresh.foreground, lr);
        self.background.blend(&fresh.background, lr);
    }

    /// 滤波器支撑掩码 (cell 网格, 0/1)
    ///
    /// 仅目标矩形内的 cell 可能为1; 前景概率 > 0.5 的 cell 保留.
    pub fn mask(&self, patch: &[f32], width: usize, height: usize, target: CellRect) -> Vec<f32> {
        let cells_w = width / CELL_SIZE;
        let cells_h = height / CELL_SIZE;
        let mut prob = vec![0f32; cells_w * cells_h];
        let per_cell = (CELL_SIZE * CELL_SIZE) as f32;

        for y in 0..cells_h * CELL_SIZE {
            for x in 0..cells_w * CELL_SIZE {
                let (cx, cy) = (x / CELL_SIZE, y / CELL_SIZE);
                if !target.contains(cx, cy) {
                    continue;
                }
                let i = (y * width + x) * 3;
                let rgb = [patch[i], patch[i + 1], patch[i + 2]];
                let pf = self.foreground.probability(rgb);
                let pb = self.background.probability(rgb);
                let p = if pf + pb > 0.0 { pf / (pf + pb) } else { 0.5 };
                prob[cy * cells_w + cx] += p / per_cell;
            }
        }

        let mut mask: Vec<f32> = prob.iter().map(|&p| if p > 0.5 { 1.0 } else { 0.0 }).collect();
        let kept = mask.iter().filter(|&&m| m > 0.0).count();
        if (kept as f32) < MIN_MASK_RATIO * target.area() as f32 {
            mask = rect_mask(cells_w, cells_h, target);
        }
        mask
    }
}

/// 整个目标矩形作为掩码
pub fn rect_mask(cells_w: usize, cells_h: usize, target: CellRect) -> Vec<f32> {
    let mut mask = vec![0f32; cells_w * cells_h];
    for y in target.y0..target.y1.min(cells_h) {
        for x in target.x0..target.x1.min(cells_w) {
            mask[y * cells_w + x] = 1.0;
        }
    }
    mask
}
