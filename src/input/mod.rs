/// 视频输入 (Video Input)
///
/// - PlanarFrame: 相机原生 YUV420 平面帧 (I420 / NV12) 及 RGB 转换
pub mod planar;

pub use planar::{ChromaKind, ChromaPlanes, PlanarFrame};
