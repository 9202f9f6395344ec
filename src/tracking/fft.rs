//! 二维 FFT (行列分离, rustfft)

use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

/// 固定尺寸的二维 FFT, 行主序 (height 行 x width 列)
pub struct Fft2 {
    width: usize,
    height: usize,
    row_fwd: Arc<dyn Fft<f32>>,
    row_inv: Arc<dyn Fft<f32>>,
    col_fwd: Arc<dyn Fft<f32>>,
    col_inv: Arc<dyn Fft<f32>>,
}

impl Fft2 {
    pub fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            width,
            height,
            row_fwd: planner.plan_fft_forward(width),
            row_inv: planner.plan_fft_inverse(width),
            col_fwd: planner.plan_fft_forward(height),
            col_inv: planner.plan_fft_inverse(height),
        }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 实数 → 频域
    pub fn forward(&self, data: &[f32]) -> Vec<Complex32> {
        let mut buf: Vec<Complex32> = data.iter().map(|&v| Complex32::new(v, 0.0)).collect();
        self.transform(&mut buf, false);
        buf
    }

    /// 频域 → 实部 (含 1/N 归一化)
    pub fn inverse_real(&self, spectrum: &[Complex32]) -> Vec<f32> {
        let mut buf = spectrum.to_vec();
        self.transform(&mut buf, true);
        let norm = 1.0 / self.len() as f32;
        buf.iter().map(|c| c.re * norm).collect()
    }

    fn transform(&self, buf: &mut [Complex32], inverse: bool) {
        debug_assert_eq!(buf.len(), self.len());
        let (row, col) = if inverse {
            (&self.row_inv, &self.col_inv)
        } else {
            (&self.row_fwd, &self.col_fwd)
        };

        // 行变换: 连续存储, 一次处理全部行
        row.process(buf);

        // 列变换: 转置 → 处理 → 转置回来
        let mut transposed = vec![Complex32::new(0.0, 0.0); buf.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                transposed[x * self.height + y] = buf[y * self.width + x];
            }
        }
        col.process(&mut transposed);
        for x in 0..self.width {
            for y in 0..self.height {
                buf[y * self.width + x] = transposed[x * self.height + y];
            }
        }
    }
}
