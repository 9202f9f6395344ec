/// 帧来源 (Frame Source)
///
/// 核心只接收已校正方向的帧:
/// - Rotation:      按设备上报的角度把图像转正
/// - ImageSequence: 按文件名自然顺序读取图像目录, 逐帧产出 `Frame`
pub mod rotation;
pub mod sequence;

pub use rotation::Rotation;
pub use sequence::{natural_key, ImageSequence};
