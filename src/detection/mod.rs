/// 检测系统 (Detection System)
///
/// - Decoder:  原始输出解码 + 坐标还原
/// - Detector: 完整检测流水线 (含备用检测器)
/// - Tracker:  检测结果与已放置对象的关联
/// - Worker:   帧节流与单槽推理线程
pub mod decoder;
pub mod detector;
pub mod tracker;
pub mod types;
pub mod worker;

pub use decoder::{rectify, Candidate, OutputDecoder, OutputLayout};
pub use detector::Detector;
pub use tracker::{Association, Placement, Placer, TrackedObject, TrackedObjectStore};
pub use types::{Detection, NormalizedBox};
pub use worker::{FrameGate, FrameResult, InferenceWorker};
