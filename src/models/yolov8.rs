// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型
// 包含: 模型加载、预处理、推理、后处理

use anyhow::{anyhow, Result};
use ndarray::{Array, Axis, IxDyn};
use tracing::info;

use super::{resize_rgb, LabelMap, Model, ModelType};
use crate::detection::types::{BBox, CoordSpace, DetectionResult, Frame};
use crate::error::ModelLoadError;
use crate::{non_max_suppression, OrtBackend, OrtConfig};

const CXYWH_OFFSET: usize = 4;

/// 预过滤置信度 (最终阈值由 Detector 决定)
const PREFILTER_CONF: f32 = 0.05;

/// YOLOv8 模型结构
pub struct YOLOv8 {
    engine: OrtBackend,
    labels: LabelMap,
    height: u32,
    width: u32,
    conf: f32,
    iou: f32,
    profile: bool,
}

impl YOLOv8 {
    /// 从配置创建 YOLOv8 模型
    pub fn new(config: OrtConfig, labels: LabelMap, profile: bool) -> Result<Self, ModelLoadError> {
        let (height, width) = config.image_size;
        let engine = OrtBackend::build(config)?;
        Ok(Self {
            engine,
            labels,
            height,
            width,
            conf: PREFILTER_CONF,
            iou: ModelType::YOLOv8.default_iou_threshold(),
            profile,
        })
    }
}

/// 等比缩放系数与缩放后尺寸
pub fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 解码 `[1, 4 + nc, anchors]` 输出, 框保留在模型输入坐标系
pub fn decode(
    preds: &Array<f32, IxDyn>,
    input_size: (u32, u32),
    conf: f32,
    iou: f32,
    labels: &LabelMap,
) -> Result<Vec<DetectionResult>> {
    let shape = preds.shape();
    if shape.len() != 3 || shape[1] <= CXYWH_OFFSET {
        return Err(anyhow!("unexpected YOLOv8 output shape {:?}", shape));
    }
    let nc = shape[1] - CXYWH_OFFSET;
    let space = CoordSpace::ModelInput {
        width: input_size.0,
        height: input_size.1,
    };

    let mut data = Vec::new();
    let anchors = preds.index_axis(Axis(0), 0);
    for pred in anchors.axis_iter(Axis(1)) {
        let Some((id, confidence)) = (0..nc)
            .map(|c| (c, pred[CXYWH_OFFSET + c]))
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };
        if confidence < conf {
            continue;
        }

        let (cx, cy, w, h) = (pred[0], pred[1], pred[2], pred[3]);
        data.push(DetectionResult {
            bbox: BBox::in_space(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0, space),
            label: labels.name_or_unknown(id as u32),
            class_id: id as u32,
            score: confidence,
        });
    }

    non_max_suppression(&mut data, iou);
    Ok(data)
}

impl Model for YOLOv8 {
    /// 等比缩放到输入尺寸 (左上角对齐), 其余区域填充 144/255, NCHW /255
    fn preprocess(&mut self, frame: &Frame) -> Result<Array<f32, IxDyn>> {
        let (_, w_new, h_new) = scale_wh(
            frame.width() as f32,
            frame.height() as f32,
            self.width as f32,
            self.height as f32,
        );
        let w_new = (w_new as u32).clamp(1, self.width);
        let h_new = (h_new as u32).clamp(1, self.height);
        let img = resize_rgb(&frame.to_rgb(), w_new, h_new)?;

        let mut ys = Array::ones((1, 3, self.height as usize, self.width as usize)).into_dyn();
        ys.fill(144.0 / 255.0);
        for (x, y, rgb) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = rgb.0;
            ys[[0, 0, y, x]] = (r as f32) / 255.0;
            ys[[0, 1, y, x]] = (g as f32) / 255.0;
            ys[[0, 2, y, x]] = (b as f32) / 255.0;
        }
        Ok(ys)
    }

    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine.run(&xs, 1, profile || self.profile)
    }

    fn postprocess(&self, xs: Vec<Array<f32, IxDyn>>, _frame: &Frame) -> Result<Vec<DetectionResult>> {
        let preds = xs.first().ok_or_else(|| anyhow!("YOLOv8 produced no output"))?;
        decode(preds, (self.width, self.height), self.conf, self.iou, &self.labels)
    }

    fn summary(&self) {
        info!(
            "📦 YOLOv8: {} | EP: {} | Input: {}x{} | nc: {} | conf: {} | iou: {}",
            self.engine.path(),
            self.engine.ep(),
            self.width,
            self.height,
            self.labels.len(),
            self.conf,
            self.iou
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造 [1, 4 + nc, anchors] 输出
    fn output(anchors: &[([f32; 4], usize, f32)], nc: usize) -> Array<f32, IxDyn> {
        let mut arr = Array::zeros((1, 4 + nc, anchors.len()));
        for (i, (cxywh, cls, score)) in anchors.iter().enumerate() {
            for k in 0..4 {
                arr[[0, k, i]] = cxywh[k];
            }
            arr[[0, 4 + cls, i]] = *score;
        }
        arr.into_dyn()
    }

    #[test]
    fn test_scale_wh() {
        let (r, w, h) = scale_wh(1280.0, 720.0, 640.0, 640.0);
        assert!((r - 0.5).abs() < 1e-6);
        assert_eq!((w, h), (640.0, 360.0));
    }

    #[test]
    fn test_decode_model_input_space() {
        let preds = output(&[([100.0, 100.0, 40.0, 20.0], 2, 0.8)], 80);
        let ys = decode(&preds, (640, 640), 0.25, 0.45, &LabelMap::coco()).unwrap();
        assert_eq!(ys.len(), 1);
        assert_eq!(ys[0].label, "car");
        assert_eq!(ys[0].bbox.to_array(), [80.0, 90.0, 120.0, 110.0]);
        assert_eq!(
            ys[0].bbox.space(),
            CoordSpace::ModelInput {
                width: 640,
                height: 640
            }
        );
    }

    #[test]
    fn test_decode_applies_nms_and_conf() {
        let preds = output(
            &[
                ([100.0, 100.0, 40.0, 40.0], 2, 0.9),
                ([102.0, 101.0, 40.0, 40.0], 2, 0.7),
                ([300.0, 300.0, 40.0, 40.0], 0, 0.6),
                ([500.0, 500.0, 40.0, 40.0], 2, 0.1),
            ],
            80,
        );
        let ys = decode(&preds, (640, 640), 0.25, 0.45, &LabelMap::coco()).unwrap();
        assert_eq!(ys.len(), 2);
        assert_eq!(ys[0].score, 0.9);
        assert_eq!(ys[1].label, "person");
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        let preds = Array::<f32, _>::zeros((1, 4)).into_dyn();
        assert!(decode(&preds, (640, 640), 0.25, 0.45, &LabelMap::coco()).is_err());
    }
}
