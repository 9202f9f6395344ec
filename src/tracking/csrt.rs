//! CSRT 跟踪器 (Channel and Spatial Reliability Tracker)
//!
//! 每个特征通道一个相关滤波器, 用 ADMM 求解带空间掩码约束的滤波器;
//! 定位时按通道可靠性加权求和响应图, 峰值低于阈值判定失败.
//! 尺度由独立的一维尺度滤波器估计.

use image::RgbImage;
use rustfft::num_complex::Complex32;
use tracing::{debug, trace};

use super::features::{self, FeatureMap, CELL_SIZE};
use super::fft::Fft2;
use super::params::CsrtParams;
use super::scale::ScaleEstimator;
use super::segmentation::{rect_mask, CellRect, Segmenter};
use super::{TrackerState, TrackerUpdate, VisualTracker};
use crate::detection::types::BBox;
use crate::error::TrackerInitError;
use crate::utils::affine_transform::{warp_affine_rgb_f32, AffineMatrix, BorderMode};

/// 特征网格最小边长 (cell)
const MIN_CELLS: usize = 4;

// ADMM 常数
const ADMM_MU: f32 = 5.0;
const ADMM_BETA: f32 = 3.0;
const ADMM_MU_MAX: f32 = 20.0;

/// 跟踪模型 (init 之后存在)
struct CsrtModel {
    center: (f32, f32),
    base_size: (f32, f32), // 尺度 1 时的目标尺寸 (帧像素)
    scale: f32,
    window_size: (f32, f32), // 尺度 1 时的搜索窗口 (帧像素)
    patch_size: (usize, usize),
    cells: (usize, usize),
    target: CellRect,
    fft: Fft2,
    window: Vec<f32>,
    label: Vec<Complex32>,
    filters: Vec<Vec<Complex32>>,
    weights: Vec<f32>,
    segmenter: Option<Segmenter>,
    scale_estimator: ScaleEstimator,
}

impl CsrtModel {
    /// 每个 cell 对应的帧像素数 (尺度 1)
    fn cell_px(&self) -> (f32, f32) {
        (
            self.window_size.0 / self.cells.0 as f32,
            self.window_size.1 / self.cells.1 as f32,
        )
    }

    fn roi(&self) -> BBox {
        BBox::from_center(
            self.center.0,
            self.center.1,
            self.base_size.0 * self.scale,
            self.base_size.1 * self.scale,
        )
    }
}

/// CSRT 跟踪器
pub struct CsrtTracker {
    params: CsrtParams,
    state: TrackerState,
    model: Option<CsrtModel>,
}

impl Default for CsrtTracker {
    fn default() -> Self {
        Self::new(CsrtParams::default())
    }
}

impl CsrtTracker {
    pub fn new(params: CsrtParams) -> Self {
        Self {
            params,
            state: TrackerState::Uninitialized,
            model: None,
        }
    }

    pub fn params(&self) -> &CsrtParams {
        &self.params
    }

    /// 当前尺度系数 (相对初始化时的目标尺寸)
    pub fn scale(&self) -> Option<f32> {
        self.model.as_ref().map(|m| m.scale)
    }

    /// 以 center 为中心、按 scale 采样搜索窗口
    fn sample(model: &CsrtModel, image: &RgbImage, center: (f32, f32), scale: f32) -> Vec<f32> {
        let src = (model.window_size.0 * scale, model.window_size.1 * scale);
        let m = AffineMatrix::crop_to(center, src, model.patch_size);
        warp_affine_rgb_f32(image, &m, model.patch_size, BorderMode::Replicate)
    }

    fn features(&self, model: &CsrtModel, patch: &[f32]) -> FeatureMap {
        let mut fm = features::extract(patch, model.patch_size.0, model.patch_size.1, &self.params);
        fm.apply_window(&model.window);
        fm
    }

    /// 带空间掩码约束的单通道滤波器 (ADMM)
    fn solve_filter(&self, fft: &Fft2, x: &[Complex32], label: &[Complex32], mask: &[f32]) -> Vec<Complex32> {
        let n = x.len();
        let sxy: Vec<Complex32> = x.iter().zip(label.iter()).map(|(xv, yv)| *xv * yv.conj()).collect();
        let sxx: Vec<f32> = x.iter().map(|v| v.norm_sqr()).collect();

        let mut mu = ADMM_MU;
        let lambda = ADMM_MU / 100.0;

        // 闭式解作为初值, 再投影到掩码支撑
        let g0: Vec<Complex32> = sxy.iter().zip(sxx.iter()).map(|(s, xx)| *s / (xx + lambda)).collect();
        let h = masked_spatial(fft, &g0, mask, 1.0);
        let mut hp = fft.forward(&h);
        let mut l = vec![Complex32::new(0.0, 0.0); n];
        let mut g = g0;

        for _ in 0..self.params.admm_iterations {
            for i in 0..n {
                g[i] = (sxy[i] + hp[i] * mu - l[i]) / (sxx[i] + mu);
            }
            let mixed: Vec<Complex32> = g.iter().zip(l.iter()).map(|(gv, lv)| *gv * mu + *lv).collect();
            let h = masked_spatial(fft, &mixed, mask, 1.0 / (lambda + mu));
            hp = fft.forward(&h);
            for i in 0..n {
                l[i] += (g[i] - hp[i]) * mu;
            }
            mu = (mu * ADMM_BETA).min(ADMM_MU_MAX);
        }
        hp
    }

    /// 通道可靠性: 各通道单独响应的峰值, 归一化为和为1
    fn channel_weights(&self, fft: &Fft2, xs: &[Vec<Complex32>], filters: &[Vec<Complex32>]) -> Vec<f32> {
        let count = filters.len();
        if !self.params.use_channel_weights || count == 0 {
            return vec![1.0 / count.max(1) as f32; count];
        }
        let peaks: Vec<f32> = xs
            .iter()
            .zip(filters.iter())
            .map(|(x, h)| {
                let spectrum: Vec<Complex32> = x.iter().zip(h.iter()).map(|(xv, hv)| *xv * hv.conj()).collect();
                fft.inverse_real(&spectrum)
                    .into_iter()
                    .fold(0f32, f32::max)
            })
            .collect();
        let sum: f32 = peaks.iter().sum();
        if sum <= f32::EPSILON {
            return vec![1.0 / count as f32; count];
        }
        peaks.iter().map(|p| p / sum).collect()
    }

    /// 当前样本的滤波器支撑掩码
    fn mask(&self, model: &mut CsrtModel, patch: &[f32], learn: bool) -> Vec<f32> {
        let (pw, ph) = model.patch_size;
        match model.segmenter.as_mut() {
            Some(segmenter) => {
                if learn {
                    segmenter.update(patch, pw, ph, model.target, self.params.histogram_lr);
                }
                segmenter.mask(patch, pw, ph, model.target)
            }
            None => rect_mask(model.cells.0, model.cells.1, model.target),
        }
    }

    /// 在 model 当前位置/尺度训练新的滤波器 (返回每通道频域特征与滤波器)
    fn train(
        &self,
        model: &mut CsrtModel,
        image: &RgbImage,
        learn: bool,
    ) -> (Vec<Vec<Complex32>>, Vec<Vec<Complex32>>) {
        let patch = Self::sample(model, image, model.center, model.scale);
        let fm = self.features(model, &patch);
        let mask = self.mask(model, &patch, learn);
        let xs: Vec<Vec<Complex32>> = fm.channels.iter().map(|c| model.fft.forward(c)).collect();
        let filters = xs
            .iter()
            .map(|x| self.solve_filter(&model.fft, x, &model.label, &mask))
            .collect();
        (xs, filters)
    }

    /// 定位: 返回 (峰值, 亚像素位移 cell)
    fn localize(&self, model: &CsrtModel, image: &RgbImage) -> (f32, (f32, f32)) {
        let patch = Self::sample(model, image, model.center, model.scale);
        let fm = self.features(model, &patch);

        let n = model.fft.len();
        let mut acc = vec![Complex32::new(0.0, 0.0); n];
        for ((channel, filter), weight) in fm.channels.iter().zip(model.filters.iter()).zip(model.weights.iter()) {
            let z = model.fft.forward(channel);
            for i in 0..n {
                acc[i] += z[i] * filter[i].conj() * *weight;
            }
        }
        let response = model.fft.inverse_real(&acc);
        let (w, h) = model.cells;

        let (idx, peak) = response
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f32::MIN), |best, (i, v)| if v > best.1 { (i, v) } else { best });
        let (px, py) = (idx % w, idx / w);

        // 抛物线插值求亚像素峰值
        let at = |x: isize, y: isize| {
            let xx = x.rem_euclid(w as isize) as usize;
            let yy = y.rem_euclid(h as isize) as usize;
            response[yy * w + xx]
        };
        let sub = |l: f32, c: f32, r: f32| {
            let denom = l - 2.0 * c + r;
            if denom.abs() < 1e-9 {
                0.0
            } else {
                (0.5 * (l - r) / denom).clamp(-0.5, 0.5)
            }
        };
        let (pxi, pyi) = (px as isize, py as isize);
        let dx_sub = sub(at(pxi - 1, pyi), peak, at(pxi + 1, pyi));
        let dy_sub = sub(at(pxi, pyi - 1), peak, at(pxi, pyi + 1));

        // 循环位移: 超过一半视为负方向
        let wrap = |p: usize, n: usize| if p > n / 2 { p as f32 - n as f32 } else { p as f32 };
        (peak, (wrap(px, w) + dx_sub, wrap(py, h) + dy_sub))
    }
}

/// 频域 → 空域实部, 乘掩码与系数
fn masked_spatial(fft: &Fft2, spectrum: &[Complex32], mask: &[f32], factor: f32) -> Vec<f32> {
    fft.inverse_real(spectrum)
        .into_iter()
        .zip(mask.iter())
        .map(|(v, m)| v * m * factor)
        .collect()
}

/// 高斯标签, 峰值位于 (0, 0) (循环)
fn gaussian_label(width: usize, height: usize, sigma: f32) -> Vec<f32> {
    let sigma2 = (sigma * sigma).max(1e-6);
    let circ = |i: usize, n: usize| -> f32 {
        if i > n / 2 {
            i as f32 - n as f32
        } else {
            i as f32
        }
    };
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let dx = circ(x, width);
            let dy = circ(y, height);
            out.push((-0.5 * (dx * dx + dy * dy) / sigma2).exp());
        }
    }
    out
}

impl VisualTracker for CsrtTracker {
    fn init(&mut self, image: &RgbImage, roi: &BBox) -> Result<(), TrackerInitError> {
        let (w, h) = (roi.width(), roi.height());
        if roi.is_degenerate() || w < 1.0 || h < 1.0 {
            return Err(TrackerInitError::Degenerate { width: w, height: h });
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(TrackerInitError::EmptyFrame {
                width: image.width(),
                height: image.height(),
            });
        }

        let p = &self.params;
        let pad = p.padding * (w * h).sqrt();
        let template = (w + pad, h + pad);
        let rescale = (p.template_size / (template.0 * template.1).sqrt()).min(1.0);
        let cells = (
            ((template.0 * rescale) as usize / CELL_SIZE).max(MIN_CELLS),
            ((template.1 * rescale) as usize / CELL_SIZE).max(MIN_CELLS),
        );
        let patch_size = (cells.0 * CELL_SIZE, cells.1 * CELL_SIZE);
        let window_size = (patch_size.0 as f32 / rescale, patch_size.1 as f32 / rescale);
        let target = CellRect::centered(
            cells.0,
            cells.1,
            w * rescale / CELL_SIZE as f32,
            h * rescale / CELL_SIZE as f32,
        );

        let fft = Fft2::new(cells.0, cells.1);
        let label = fft.forward(&gaussian_label(cells.0, cells.1, p.gsl_sigma));
        let window = features::spatial_window(cells.0, cells.1, p.window_function);

        let mut model = CsrtModel {
            center: roi.center(),
            base_size: (w, h),
            scale: 1.0,
            window_size,
            patch_size,
            cells,
            target,
            fft,
            window,
            label,
            filters: Vec::new(),
            weights: Vec::new(),
            segmenter: None,
            scale_estimator: ScaleEstimator::new((w, h), p),
        };

        if p.use_segmentation {
            let patch = Self::sample(&model, image, model.center, 1.0);
            model.segmenter = Some(Segmenter::new(
                &patch,
                patch_size.0,
                patch_size.1,
                target,
                p.histogram_bins,
            ));
        }

        let (xs, filters) = self.train(&mut model, image, false);
        model.weights = self.channel_weights(&model.fft, &xs, &filters);
        model.filters = filters;
        model.scale_estimator.learn(image, model.center, 1.0);

        debug!(
            "🎯 CSRT init: roi={:?} cells={}x{} rescale={:.3}",
            roi.to_array(),
            cells.0,
            cells.1,
            rescale
        );
        self.model = Some(model);
        self.state = TrackerState::Initialized;
        Ok(())
    }

    fn update(&mut self, image: &RgbImage) -> TrackerUpdate {
        let Some(mut model) = self.model.take() else {
            return TrackerUpdate {
                success: false,
                roi: BBox::new(0.0, 0.0, 0.0, 0.0),
                confidence: 0.0,
            };
        };

        let (peak, (dx, dy)) = self.localize(&model, image);
        if !peak.is_finite() || peak < self.params.psr_threshold {
            trace!("CSRT peak {:.4} below threshold {}", peak, self.params.psr_threshold);
            let roi = model.roi();
            self.model = Some(model);
            self.state = TrackerState::Lost;
            return TrackerUpdate {
                success: false,
                roi,
                confidence: peak,
            };
        }

        let (cell_x, cell_y) = model.cell_px();
        let (fw, fh) = (image.width() as f32, image.height() as f32);
        model.center = (
            (model.center.0 + dx * cell_x * model.scale).clamp(0.0, fw),
            (model.center.1 + dy * cell_y * model.scale).clamp(0.0, fh),
        );
        model.scale = model.scale_estimator.estimate(image, model.center, model.scale);

        // 以新位置/尺度更新模型
        let (xs, filters) = self.train(&mut model, image, true);
        let weights = self.channel_weights(&model.fft, &xs, &filters);
        let lr = self.params.filter_lr;
        for (old, new) in model.filters.iter_mut().zip(filters.iter()) {
            for (o, v) in old.iter_mut().zip(new.iter()) {
                *o = *o * (1.0 - lr) + *v * lr;
            }
        }
        let wlr = self.params.weights_lr;
        for (o, v) in model.weights.iter_mut().zip(weights.iter()) {
            *o = (1.0 - wlr) * *o + wlr * v;
        }
        let total: f32 = model.weights.iter().sum();
        if total > f32::EPSILON {
            model.weights.iter_mut().for_each(|w| *w /= total);
        }
        model.scale_estimator.learn(image, model.center, model.scale);

        let roi = model.roi();
        self.model = Some(model);
        self.state = TrackerState::Updated;
        TrackerUpdate {
            success: true,
            roi,
            confidence: peak,
        }
    }

    fn state(&self) -> TrackerState {
        self.state
    }

    fn name(&self) -> &'static str {
        "CSRT"
    }
}
