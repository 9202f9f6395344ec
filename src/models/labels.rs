/// 类别标签表 (Class label map)
use std::path::Path;

use phf::phf_map;

use crate::error::ModelLoadError;

/// COCO 80 类名称 (按类别 id 排列)
pub const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// 常用目标类别 → COCO id
static COCO_IDS: phf::Map<&'static str, u32> = phf_map! {
    "person" => 0,
    "bicycle" => 1,
    "car" => 2,
    "motorcycle" => 3,
    "airplane" => 4,
    "bus" => 5,
    "train" => 6,
    "truck" => 7,
    "boat" => 8,
    "bird" => 14,
    "cat" => 15,
    "dog" => 16,
    "horse" => 17,
};

/// 类别 id ↔ 名称
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    names: Vec<String>,
    coco: bool,
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::coco()
    }
}

impl LabelMap {
    pub fn coco() -> Self {
        Self {
            names: COCO_NAMES.iter().map(|s| s.to_string()).collect(),
            coco: true,
        }
    }

    pub fn new(names: Vec<String>) -> Self {
        Self { names, coco: false }
    }

    /// 每行一个标签; 保留占位行 (如 "???") 以维持 id 对齐, 仅去掉末尾空行
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ModelLoadError::Labels {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut names: Vec<String> = text.lines().map(|l| l.trim().to_string()).collect();
        while names.last().is_some_and(|l| l.is_empty()) {
            names.pop();
        }
        if names.is_empty() {
            return Err(ModelLoadError::Labels {
                path: path.display().to_string(),
                reason: "no labels".to_string(),
            });
        }
        Ok(Self::new(names))
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(|s| s.as_str())
    }

    /// 未知 id 返回 "unknown"
    pub fn name_or_unknown(&self, id: u32) -> String {
        self.name(id).unwrap_or("unknown").to_string()
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        if self.coco {
            if let Some(id) = COCO_IDS.get(name) {
                return Some(*id);
            }
        }
        self.names.iter().position(|n| n == name).map(|i| i as u32)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.id_of(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
