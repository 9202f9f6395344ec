// SSD-MobileNet 检测模型
// 输入: NHWC, 拉伸缩放到模型尺寸, (x - 127.5) / 127.5
// 输出: [boxes, classes, scores, count], 框为归一化 [ymin, xmin, ymax, xmax]

use anyhow::{anyhow, Result};
use ndarray::{Array, IxDyn};
use tracing::info;

use super::{resize_rgb, LabelMap, Model};
use crate::detection::types::{BBox, CoordSpace, DetectionResult, Frame};
use crate::error::ModelLoadError;
use crate::{OrtBackend, OrtConfig};

const MEAN: f32 = 127.5;
const STD: f32 = 127.5;
const NUM_OUTPUTS: usize = 4;

pub struct Ssd {
    engine: OrtBackend,
    labels: LabelMap,
    width: u32,
    height: u32,
    profile: bool,
}

impl Ssd {
    pub fn new(config: OrtConfig, labels: LabelMap, profile: bool) -> Result<Self, ModelLoadError> {
        let (height, width) = config.image_size;
        let engine = OrtBackend::build(config)?;
        Ok(Self {
            engine,
            labels,
            width,
            height,
            profile,
        })
    }
}

/// 解码 SSD 输出 (不做阈值/类别筛选)
pub fn decode(
    boxes: &Array<f32, IxDyn>,
    classes: &Array<f32, IxDyn>,
    scores: &Array<f32, IxDyn>,
    count: &Array<f32, IxDyn>,
    labels: &LabelMap,
) -> Result<Vec<DetectionResult>> {
    let boxes = boxes
        .view()
        .into_shape_with_order((boxes.len() / 4, 4))
        .map_err(|e| anyhow!("boxes: {}", e))?;
    let classes = classes.iter().copied().collect::<Vec<f32>>();
    let scores = scores.iter().copied().collect::<Vec<f32>>();
    let available = boxes.nrows().min(classes.len()).min(scores.len());
    let n = count
        .iter()
        .next()
        .map(|&c| (c.max(0.0) as usize).min(available))
        .unwrap_or(available);

    let mut ys = Vec::with_capacity(n);
    for i in 0..n {
        let (ymin, xmin, ymax, xmax) = (boxes[[i, 0]], boxes[[i, 1]], boxes[[i, 2]], boxes[[i, 3]]);
        let class_id = classes[i].max(0.0) as u32;
        ys.push(DetectionResult {
            bbox: BBox::in_space(xmin, ymin, xmax, ymax, CoordSpace::Normalized).clamp(1.0, 1.0),
            label: labels.name_or_unknown(class_id),
            class_id,
            score: scores[i],
        });
    }
    Ok(ys)
}

impl Model for Ssd {
    fn preprocess(&mut self, frame: &Frame) -> Result<Array<f32, IxDyn>> {
        let img = resize_rgb(&frame.to_rgb(), self.width, self.height)?;
        let (w, h) = (self.width as usize, self.height as usize);
        let mut xs = Array::zeros((1, h, w, 3)).into_dyn();
        for (x, y, rgb) in img.enumerate_pixels() {
            for c in 0..3 {
                xs[[0, y as usize, x as usize, c]] = (rgb.0[c] as f32 - MEAN) / STD;
            }
        }
        Ok(xs)
    }

    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine.run(&xs, NUM_OUTPUTS, profile || self.profile)
    }

    fn postprocess(&self, xs: Vec<Array<f32, IxDyn>>, _frame: &Frame) -> Result<Vec<DetectionResult>> {
        if xs.len() < NUM_OUTPUTS {
            return Err(anyhow!("expected {} outputs, got {}", NUM_OUTPUTS, xs.len()));
        }
        decode(&xs[0], &xs[1], &xs[2], &xs[3], &self.labels)
    }

    fn summary(&self) {
        info!(
            "📦 SSD: {} | EP: {} | Input: {}x{} | Labels: {}",
            self.engine.path(),
            self.engine.ep(),
            self.width,
            self.height,
            self.labels.len()
        );
    }
}
