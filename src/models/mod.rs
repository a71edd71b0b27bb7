// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 推理引擎接口与备用检测器
///
/// # 架构说明
///
/// ## 推理引擎 (InferenceEngine)
/// - 输入: letterbox 后的 HWC 归一化 RGB 张量 (`3 × S × S`)
/// - 输出: 原始输出张量 `[N, 5+K]` 或 `[5+K, N]` (可带 batch=1 维)
/// - 解码、坐标还原、NMS 都在 `detection` 中完成, 引擎只负责前向传播
/// - 实现: `OrtBackend` (feature `onnx`), 测试中的脚本化 mock
///
/// ## 备用检测器 (FallbackDetector)
/// - 没有模型时生成固定图案的合成检测结果, 下游不需要区分 "无模型"
///
/// ## 流程
/// ```text
/// PlanarFrame → letterbox → InferenceEngine::run → OutputDecoder → rectify → NMS
///                                 ↓ (无模型)
///                          FallbackDetector
/// ```
use anyhow::Result;
use ndarray::ArrayD;

use crate::utils::letterbox::LetterboxTensor;

/// 统一的推理引擎接口
///
/// 同一实例不会被并发调用; 需要跨线程时由 `InferenceWorker` 独占持有。
pub trait InferenceEngine {
    /// 推理: 预处理张量 → 原始输出
    ///
    /// 失败由调用方降级为 "本帧无检测"。
    fn run(&mut self, tensor: &LetterboxTensor) -> Result<ArrayD<f32>>;

    /// 引擎名称 (日志用)
    fn name(&self) -> &str;

    /// 打印模型信息
    fn summary(&self) {
        log::info!("inference engine: {}", self.name());
    }
}

pub mod fallback; // 无模型时的合成检测

pub use fallback::FallbackDetector;
