//! 流水线错误类型
//! Error types for the detection pipeline

use thiserror::Error;

/// 检测流水线错误 (Detection pipeline errors)
///
/// 这些错误只在模块内部流转, `Detector::detect` 会把它们全部降级为"本帧无检测"。
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("unexpected output shape {shape:?}: {reason}")]
    OutputShape { shape: Vec<usize>, reason: String },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
