// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 检测参数配置
pub mod detection; // 检测流水线 + 目标关联
pub mod error; // 错误类型
pub mod input; // 相机帧输入
pub mod models; // 推理引擎接口与备用检测器
pub mod utils; // letterbox / 仿射变换

#[cfg(feature = "onnx")]
pub mod ort_backend;

pub use crate::config::{Args, DetectorConfig};
pub use crate::detection::{
    Association, Detection, Detector, FrameGate, InferenceWorker, NormalizedBox, OutputDecoder,
    OutputLayout, Placement, Placer, TrackedObject, TrackedObjectStore,
};
pub use crate::error::PipelineError;
pub use crate::input::{ChromaKind, ChromaPlanes, PlanarFrame};
pub use crate::models::{FallbackDetector, InferenceEngine};
#[cfg(feature = "onnx")]
pub use crate::ort_backend::OrtBackend;
pub use crate::utils::letterbox::{LetterboxTensor, PreprocessInfo};

/// 贪心 NMS
///
/// 按置信度稳定降序排序, 候选框与所有已保留框的 IoU 都不超过阈值时才保留。
pub fn non_max_suppression(mut xs: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    // sort_by 是稳定排序, 相同置信度保持输入顺序
    xs.sort_by(|b1, b2| b2.confidence().total_cmp(&b1.confidence()));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].bbox().iou(xs[index].bbox());
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
    xs
}
