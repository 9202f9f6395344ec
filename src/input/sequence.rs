use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info};

use super::Rotation;
use crate::detection::types::Frame;
use crate::error::Error;

const EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// 自然排序键: 数字段按数值比较 ("frame2" < "frame10")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum NaturalChunk {
    Number(u64),
    Text(String),
}

pub fn natural_key(re: &Regex, name: &str) -> Vec<NaturalChunk> {
    re.find_iter(name)
        .map(|m| {
            let s = m.as_str();
            match s.parse::<u64>() {
                Ok(n) if s.bytes().all(|b| b.is_ascii_digit()) => NaturalChunk::Number(n),
                _ => NaturalChunk::Text(s.to_lowercase()),
            }
        })
        .collect()
}

/// 图像序列帧源 (目录或单个文件)
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    rotation: Rotation,
    next: usize,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(source: P, rotation: Rotation) -> Result<Self, Error> {
        let source = source.as_ref();
        let mut paths = if source.is_dir() {
            std::fs::read_dir(source)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image(p))
                .collect::<Vec<_>>()
        } else if source.is_file() {
            vec![source.to_path_buf()]
        } else {
            return Err(Error::Config(format!("source not found: {}", source.display())));
        };

        let re = Regex::new(r"\d+|\D+").map_err(|e| Error::Config(e.to_string()))?;
        paths.sort_by_cached_key(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            natural_key(&re, &name)
        });

        info!("📂 图像序列: {} ({} 帧, 旋转 {}°)", source.display(), paths.len(), rotation.degrees());
        Ok(Self {
            paths,
            rotation,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// 读取第 index 帧并转正
    pub fn load(&self, index: usize) -> Result<Frame, Error> {
        let path = self
            .paths
            .get(index)
            .ok_or_else(|| Error::Config(format!("frame index {} out of range", index)))?;
        let image = image::open(path)?;
        let image = self.rotation.apply(image);
        debug!("读取帧 {}: {} ({}x{})", index, path.display(), image.width(), image.height());
        Ok(Frame::from_dynamic(&image, index as u64))
    }
}

impl Iterator for ImageSequence {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.paths.len() {
            return None;
        }
        let item = self.load(self.next);
        self.next += 1;
        Some(item)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
