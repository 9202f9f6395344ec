//! 叠加显示 (Overlay)
//!
//! 把一帧及其跟踪事件合成到显示画布:
//! - DirectFill: 帧拉伸铺满画布
//! - Letterbox:  帧等比缩放居中, 其余区域为黑色
//!
//! 目标框经 `CoordinateMapper` 映射后画成红色空心矩形;
//! 无目标时在画布顶部画状态横幅 (有字体时附带状态文字).

use std::path::Path;

use ab_glyph::FontArc;
use anyhow::{Context, Result};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detection::types::{BBox, Frame, TrackingEvent};
use crate::mapping::{CoordinateMapper, ScalePolicy};
use crate::models::resize_rgb;

pub const BOX_COLOR: Rgb<u8> = Rgb([0xFF, 0x00, 0x00]);
pub const BOX_STROKE: u32 = 8;

pub const STATUS_TEXT: &str = "Объект осмотра вне кадра";
pub const BANNER_COLOR: Rgb<u8> = Rgb([0x20, 0x20, 0x20]);
pub const TEXT_COLOR: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);

/// 加载状态文字字体 (ttf/otf/ttc)
pub fn load_font<P: AsRef<Path>>(path: P) -> Result<FontArc> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
    FontArc::try_from_vec(bytes).with_context(|| format!("parse font {}", path.display()))
}

#[derive(Clone)]
pub struct Overlay {
    policy: ScalePolicy,
    display: (u32, u32),
    color: Rgb<u8>,
    stroke: u32,
    font: Option<FontArc>,
}

impl Overlay {
    pub fn new(policy: ScalePolicy, display_width: u32, display_height: u32) -> Self {
        Self {
            policy,
            display: (display_width.max(1), display_height.max(1)),
            color: BOX_COLOR,
            stroke: BOX_STROKE,
            font: None,
        }
    }

    /// 没有字体时横幅只有底色
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_style(mut self, color: Rgb<u8>, stroke: u32) -> Self {
        self.color = color;
        self.stroke = stroke.max(1);
        self
    }

    /// 帧坐标 → 画布坐标
    pub fn mapper(&self, frame: &Frame) -> CoordinateMapper {
        CoordinateMapper::new(
            self.policy,
            (frame.width(), frame.height()),
            self.display,
        )
    }

    /// 合成画布并画出事件中的目标框
    pub fn compose(&self, event: &TrackingEvent) -> Result<RgbImage> {
        let mapper = self.mapper(&event.frame);
        let mut canvas = self.canvas(&event.frame, &mapper)?;
        match &event.bbox {
            Some(bbox) => self.draw_box(&mut canvas, &mapper.map(bbox)),
            None => self.draw_status(&mut canvas),
        }
        Ok(canvas)
    }

    /// 横幅高度: 画布高度的 1/8, 12..=64 像素
    fn banner_height(&self) -> u32 {
        (self.display.1 / 8).clamp(12, 64).min(self.display.1)
    }

    fn draw_status(&self, canvas: &mut RgbImage) {
        let height = self.banner_height();
        draw_filled_rect_mut(
            canvas,
            Rect::at(0, 0).of_size(self.display.0, height),
            BANNER_COLOR,
        );
        if let Some(font) = &self.font {
            let scale = height as f32 * 0.7;
            let y = ((height as f32 - scale) / 2.0).round() as i32;
            draw_text_mut(canvas, TEXT_COLOR, 8, y, scale, font, STATUS_TEXT);
        }
    }

    fn canvas(&self, frame: &Frame, mapper: &CoordinateMapper) -> Result<RgbImage> {
        let (dw, dh) = self.display;
        let rgb = frame.to_rgb();
        match self.policy {
            ScalePolicy::DirectFill => resize_rgb(&rgb, dw, dh),
            ScalePolicy::Letterbox => {
                let (scale, _) = mapper.scale();
                let (ox, oy) = mapper.offset();
                let w = ((frame.width() as f32 * scale).round() as u32).clamp(1, dw);
                let h = ((frame.height() as f32 * scale).round() as u32).clamp(1, dh);
                let fitted = resize_rgb(&rgb, w, h)?;
                let mut canvas = RgbImage::new(dw, dh);
                imageops::replace(&mut canvas, &fitted, ox.round() as i64, oy.round() as i64);
                Ok(canvas)
            }
        }
    }

    /// 描边以框边为中心, 越界部分被裁掉
    pub fn draw_box(&self, canvas: &mut RgbImage, bbox: &BBox) {
        let half = (self.stroke / 2) as i32;
        let (l, t) = (bbox.x1().round() as i32, bbox.y1().round() as i32);
        let (r, b) = (bbox.x2().round() as i32, bbox.y2().round() as i32);
        for k in -half..(self.stroke as i32 - half) {
            let (w, h) = (r - l + 2 * k, b - t + 2 * k);
            if w <= 0 || h <= 0 {
                continue;
            }
            let rect = Rect::at(l - k, t - k).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, self.color);
        }
    }
}
