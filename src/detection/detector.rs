//! 检测器 (Detector)
//! 职责: 平面帧 → letterbox → 推理 → 解码 → 坐标还原 → NMS → 检测结果
//!
//! 所有失败路径都降级为 "本帧无检测", 不会中断调用方的帧循环。

use std::time::Instant;

use image::RgbImage;

use super::decoder::{rectify, OutputDecoder};
use super::types::Detection;
use crate::config::DetectorConfig;
use crate::error::PipelineError;
use crate::input::PlanarFrame;
use crate::models::{FallbackDetector, InferenceEngine};
use crate::non_max_suppression;
use crate::utils::letterbox::{letterbox, letterbox_frame, LetterboxTensor};

pub struct Detector {
    config: DetectorConfig,
    engine: Option<Box<dyn InferenceEngine + Send>>,
    decoder: OutputDecoder,
    fallback: FallbackDetector,

    // 统计
    count: u64,
    last: Instant,
    current_fps: f64,
    inference_ms: f64,
}

impl Detector {
    /// `engine` 为 None 时启用备用检测器
    pub fn new(config: DetectorConfig, engine: Option<Box<dyn InferenceEngine + Send>>) -> Self {
        let decoder = OutputDecoder::new(
            config.input_size,
            config.conf_threshold,
            config.output_layout,
        );
        let fallback = FallbackDetector::new(config.fallback_boxes, &config.label);
        match &engine {
            Some(engine) => log::info!("detector ready with engine '{}'", engine.name()),
            None => log::info!(
                "no model loaded, fallback detector active ({} boxes)",
                fallback.count()
            ),
        }

        Self {
            config,
            engine,
            decoder,
            fallback,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
            inference_ms: 0.0,
        }
    }

    /// 是否加载了真实模型 (false 表示备用检测器)
    pub fn is_model_loaded(&self) -> bool {
        self.engine.is_some()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn fps(&self) -> f64 {
        self.current_fps
    }

    /// 最近一帧推理耗时
    pub fn inference_ms(&self) -> f64 {
        self.inference_ms
    }

    /// 相机原生平面帧检测
    pub fn detect(&mut self, frame: &PlanarFrame) -> Vec<Detection> {
        if self.engine.is_none() {
            return self.fallback.detect();
        }
        match letterbox_frame(frame, self.config.input_size) {
            Ok(tensor) => self.detect_tensor(&tensor),
            Err(e) => {
                log::warn!("preprocess failed: {}", e);
                Vec::new()
            }
        }
    }

    /// 已打包 RGB 图像检测
    pub fn detect_rgb(&mut self, rgb: &RgbImage) -> Vec<Detection> {
        if self.engine.is_none() {
            return self.fallback.detect();
        }
        match letterbox(rgb, self.config.input_size) {
            Ok(tensor) => self.detect_tensor(&tensor),
            Err(e) => {
                log::warn!("preprocess failed: {}", e);
                Vec::new()
            }
        }
    }

    fn detect_tensor(&mut self, tensor: &LetterboxTensor) -> Vec<Detection> {
        let Some(engine) = self.engine.as_mut() else {
            return self.fallback.detect();
        };

        let t_start = Instant::now();
        let raw = match engine.run(tensor) {
            Ok(raw) => raw,
            Err(e) => {
                let err = PipelineError::Inference(format!("{}: {:#}", engine.name(), e));
                log::warn!("{}", err);
                return Vec::new();
            }
        };
        self.inference_ms = t_start.elapsed().as_secs_f64() * 1000.0;

        let candidates = match self.decoder.decode(raw.view()) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!("{}", e);
                return Vec::new();
            }
        };

        let rectified: Vec<Detection> = candidates
            .iter()
            .filter_map(|c| {
                rectify(
                    c,
                    tensor.info.as_ref(),
                    self.config.input_size,
                    &self.config.label,
                )
            })
            .collect();
        let n_rectified = rectified.len();
        let detections = non_max_suppression(rectified, self.config.iou_threshold);

        log::debug!(
            "{} candidates → {} rectified → {} after nms ({:.1} ms inference)",
            candidates.len(),
            n_rectified,
            detections.len(),
            self.inference_ms
        );
        self.tick();
        detections
    }

    fn tick(&mut self) {
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.current_fps = self.count as f64 / elapsed;
            self.count = 0;
            self.last = Instant::now();
        }
    }

    /// 打印检测器信息
    pub fn summary(&self) {
        self.config.print_summary();
        match &self.engine {
            Some(engine) => engine.summary(),
            None => log::info!("fallback detector: {} boxes", self.fallback.count()),
        }
    }
}
