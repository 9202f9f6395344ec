//! DSST 风格的一维尺度滤波器

use std::sync::Arc;

use image::RgbImage;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use super::features::{self, CELL_SIZE};
use super::params::CsrtParams;
use crate::utils::affine_transform::{warp_affine_rgb_f32, AffineMatrix, BorderMode};

const SCALE_LAMBDA: f32 = 0.01;

/// 目标的最小边长 (像素)
pub const MIN_TARGET_SIDE: f32 = 5.0;

/// 尺度估计器
pub struct ScaleEstimator {
    factors: Vec<f32>,
    window: Vec<f32>,
    label: Vec<Complex32>,
    model_size: (usize, usize),
    base_size: (f32, f32),
    num: Vec<Vec<Complex32>>,
    den: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    lr: f32,
    params: CsrtParams,
}

impl ScaleEstimator {
    /// `base_size` 为尺度 1 时的目标尺寸 (帧像素)
    pub fn new(base_size: (f32, f32), params: &CsrtParams) -> Self {
        let n = params.number_of_scales.max(1);
        let mid = (n / 2) as f32;
        let factors = (0..n)
            .map(|k| params.scale_step.powf(k as f32 - mid))
            .collect::<Vec<_>>();

        let sigma = params.scale_sigma_factor.max(1e-3);
        let label_real: Vec<f32> = (0..n)
            .map(|k| (-0.5 * (k as f32 - mid).powi(2) / (sigma * sigma)).exp())
            .collect();
        let window = if n > 1 {
            (0..n)
                .map(|k| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * (k as f32 + 0.5) / n as f32).cos())
                .collect()
        } else {
            vec![1.0]
        };

        // 尺度模型尺寸: 面积不超过 scale_model_max_area, 至少 2x2 cell
        let area = (base_size.0 * base_size.1).max(1.0);
        let factor = if area > params.scale_model_max_area {
            (params.scale_model_max_area / area).sqrt()
        } else {
            1.0
        };
        let snap = |v: f32| (((v * factor) as usize) / CELL_SIZE).max(2) * CELL_SIZE;
        let model_size = (snap(base_size.0), snap(base_size.1));

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);
        let mut label: Vec<Complex32> = label_real.iter().map(|&v| Complex32::new(v, 0.0)).collect();
        fft.process(&mut label);

        Self {
            factors,
            window,
            label,
            model_size,
            base_size,
            num: Vec::new(),
            den: vec![0.0; n],
            fft,
            ifft,
            lr: params.scale_lr,
            params: params.clone(),
        }
    }

    pub fn factors(&self) -> &[f32] {
        &self.factors
    }

    /// 各尺度样本特征的频域表示: 每个特征维度一个长度为 n 的序列
    fn sample(&self, image: &RgbImage, center: (f32, f32), scale: f32) -> Vec<Vec<Complex32>> {
        let n = self.factors.len();
        let mut per_scale: Vec<Vec<f32>> = Vec::with_capacity(n);
        for (k, factor) in self.factors.iter().enumerate() {
            let s = scale * factor;
            let src = (self.base_size.0 * s, self.base_size.1 * s);
            let m = AffineMatrix::crop_to(center, src, self.model_size);
            let patch = warp_affine_rgb_f32(image, &m, self.model_size, BorderMode::Replicate);
            let fm = features::extract_hog(&patch, self.model_size.0, self.model_size.1, &self.params);
            per_scale.push(fm.flatten().into_iter().map(|v| v * self.window[k]).collect());
        }

        let dims = per_scale.first().map(|v| v.len()).unwrap_or(0);
        let mut out = Vec::with_capacity(dims);
        for d in 0..dims {
            let mut seq: Vec<Complex32> = per_scale.iter().map(|v| Complex32::new(v[d], 0.0)).collect();
            self.fft.process(&mut seq);
            out.push(seq);
        }
        out
    }

    /// 以当前中心/尺度训练 (首次) 或按学习率更新尺度模型
    pub fn learn(&mut self, image: &RgbImage, center: (f32, f32), scale: f32) {
        let xs = self.sample(image, center, scale);
        let n = self.factors.len();
        let new_num: Vec<Vec<Complex32>> = xs
            .iter()
            .map(|x| x.iter().zip(self.label.iter()).map(|(xv, yv)| yv.conj() * *xv).collect())
            .collect();
        let mut new_den = vec![0f32; n];
        for x in xs.iter() {
            for (d, v) in new_den.iter_mut().zip(x.iter()) {
                *d += v.norm_sqr();
            }
        }

        if self.num.is_empty() {
            self.num = new_num;
            self.den = new_den;
            return;
        }
        let lr = self.lr;
        for (old, new) in self.num.iter_mut().zip(new_num.iter()) {
            for (o, v) in old.iter_mut().zip(new.iter()) {
                *o = *o * (1.0 - lr) + *v * lr;
            }
        }
        for (o, v) in self.den.iter_mut().zip(new_den.iter()) {
            *o = (1.0 - lr) * *o + lr * v;
        }
    }

    /// 返回最佳尺度 (已按最小尺寸与帧尺寸截断)
    pub fn estimate(&self, image: &RgbImage, center: (f32, f32), scale: f32) -> f32 {
        if self.num.is_empty() || self.factors.len() < 2 {
            return scale;
        }
        let zs = self.sample(image, center, scale);
        let n = self.factors.len();
        let mut acc = vec![Complex32::new(0.0, 0.0); n];
        for (a, z) in self.num.iter().zip(zs.iter()) {
            for k in 0..n {
                acc[k] += a[k].conj() * z[k];
            }
        }
        for k in 0..n {
            acc[k] /= self.den[k] + SCALE_LAMBDA;
        }
        self.ifft.process(&mut acc);

        let best = acc
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.re.total_cmp(&b.1.re))
            .map(|(k, _)| k)
            .unwrap_or(n / 2);
        self.clamp_scale(scale * self.factors[best], image.width() as f32, image.height() as f32)
    }

    /// 尺度截断: 目标边长不小于 MIN_TARGET_SIDE, 且不超过帧尺寸
    pub fn clamp_scale(&self, scale: f32, frame_w: f32, frame_h: f32) -> f32 {
        let (w, h) = self.base_size;
        let min_scale = (MIN_TARGET_SIDE / w.min(h).max(1e-3)).max(1e-3);
        let max_scale = (frame_w / w.max(1e-3)).min(frame_h / h.max(1e-3));
        if max_scale < min_scale {
            return min_scale;
        }
        scale.clamp(min_scale, max_scale)
    }
}
