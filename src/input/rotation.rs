use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// 顺时针旋转角度 (把采集到的图像转为正向)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// 任意整数角度, 须为90的倍数 (负数按逆时针处理)
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// 旋转后宽高是否互换
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        match self {
            Rotation::Deg0 => image,
            Rotation::Deg90 => image.rotate90(),
            Rotation::Deg180 => image.rotate180(),
            Rotation::Deg270 => image.rotate270(),
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = String;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(format!("unsupported rotation: {} (expected 0, 90, 180 or 270)", other)),
        }
    }
}

impl From<Rotation> for u32 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl std::str::FromStr for Rotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let degrees: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid rotation: {}", s))?;
        Rotation::try_from(degrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_from_degrees() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!("180".parse::<Rotation>(), Ok(Rotation::Deg180));
        assert!("12".parse::<Rotation>().is_err());
    }

    #[test]
    fn test_rotate90_moves_top_left_to_top_right() {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let out = Rotation::Deg90.apply(DynamicImage::ImageRgb8(img)).to_rgb8();
        assert_eq!(out.dimensions(), (2, 4));
        assert_eq!(out.get_pixel(1, 0).0, [255, 0, 0]);
        assert!(Rotation::Deg90.swaps_axes());
    }

    #[test]
    fn test_serde_as_degrees() {
        let json = serde_json::to_string(&Rotation::Deg270).unwrap();
        assert_eq!(json, "270");
        assert_eq!(serde_json::from_str::<Rotation>("90").unwrap(), Rotation::Deg90);
        assert!(serde_json::from_str::<Rotation>("30").is_err());
    }
}
