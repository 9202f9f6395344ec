//! 跟踪器参数 - 经验调优常数, 构造时一次性设定

use serde::{Deserialize, Serialize};

/// 空间窗函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    Hann,
    Rectangular,
}

/// CSRT 跟踪器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrtParams {
    // === 特征通道 ===
    pub use_hog: bool,             // 梯度方向直方图
    pub use_color_names: bool,     // 颜色名称
    pub use_gray: bool,            // 灰度
    pub use_rgb: bool,             // RGB
    pub use_channel_weights: bool, // 通道可靠性加权
    pub use_segmentation: bool,    // 前景/背景分割 (空间可靠性)

    // === 模板 ===
    pub window_function: WindowFunction,
    pub template_size: f32,
    pub padding: f32,
    pub gsl_sigma: f32, // 高斯标签标准差 (cell)
    pub hog_orientations: usize,
    pub hog_clip: f32,

    // === 学习率 ===
    pub filter_lr: f32,
    pub weights_lr: f32,
    pub admm_iterations: usize,

    // === 分割直方图 ===
    pub histogram_bins: usize,
    pub histogram_lr: f32,

    // === 尺度 ===
    pub number_of_scales: usize,
    pub scale_step: f32,
    pub scale_lr: f32,
    pub scale_sigma_factor: f32, // 尺度标签标准差 (尺度索引单位)
    pub scale_model_max_area: f32,

    // === 失败判定 ===
    pub psr_threshold: f32,
}

impl Default for CsrtParams {
    fn default() -> Self {
        Self {
            use_hog: true,
            use_color_names: true,
            use_gray: false,
            use_rgb: true,
            use_channel_weights: true,
            use_segmentation: true,

            window_function: WindowFunction::Hann,
            template_size: 250.0,
            padding: 3.0,
            gsl_sigma: 1.0,
            hog_orientations: 9,
            hog_clip: 0.1,

            filter_lr: 0.02,
            weights_lr: 0.01,
            admm_iterations: 15,

            histogram_bins: 20,
            histogram_lr: 0.08,

            number_of_scales: 5,
            scale_step: 1.02,
            scale_lr: 0.015,
            scale_sigma_factor: 0.95,
            scale_model_max_area: 50000.0,

            psr_threshold: 0.04,
        }
    }
}

impl CsrtParams {
    /// 启用的特征通道总数
    pub fn channel_count(&self) -> usize {
        let mut n = 0;
        if self.use_hog {
            n += self.hog_orientations;
        }
        if self.use_color_names {
            n += super::features::COLOR_NAME_COUNT;
        }
        if self.use_gray {
            n += 1;
        }
        if self.use_rgb {
            n += 3;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record() {
        let p = CsrtParams::default();
        assert!(p.use_hog && p.use_color_names && p.use_rgb && p.use_channel_weights);
        assert!(!p.use_gray);
        assert!(p.use_segmentation);
        assert_eq!(p.window_function, WindowFunction::Hann);
        assert_eq!(p.template_size, 250.0);
        assert_eq!(p.padding, 3.0);
        assert_eq!(p.filter_lr, 0.02);
        assert_eq!(p.weights_lr, 0.01);
        assert_eq!(p.number_of_scales, 5);
        assert_eq!(p.scale_step, 1.02);
        assert_eq!(p.scale_lr, 0.015);
        assert_eq!(p.psr_threshold, 0.04);
        assert_eq!(p.histogram_bins, 20);
        assert_eq!(p.histogram_lr, 0.08);
    }

    #[test]
    fn test_channel_count() {
        // 9 HOG + 11 颜色名称 + 3 RGB
        assert_eq!(CsrtParams::default().channel_count(), 23);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let p: CsrtParams = serde_json::from_str(r#"{"padding": 2.0}"#).unwrap();
        assert_eq!(p.padding, 2.0);
        assert_eq!(p.template_size, 250.0);
    }
}
