//! 检测器配置 - 通过JSON文件调整参数

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::detection::decoder::OutputLayout;
use crate::detection::types::{CONFIDENCE_THRESHOLD, DEFAULT_LABEL, INF_SIZE, IOU_THRESHOLD};
use crate::error::{PipelineError, Result};

/// 检测流水线参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    // === 预处理 ===
    pub input_size: u32, // 模型输入边长 S

    // === 后处理 ===
    pub conf_threshold: f32, // 置信度阈值 (严格大于)
    pub iou_threshold: f32,  // NMS IOU阈值
    pub output_layout: OutputLayout,
    pub label: String,

    // === 关联 ===
    pub association_iou_threshold: f32,
    pub frame_interval_ms: u64, // 两次检测的最小间隔

    // === 推理 ===
    pub fallback_boxes: usize, // 无模型时的合成框数量 (4~8)
    pub intra_threads: usize,  // ORT 线程数
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: INF_SIZE,
            conf_threshold: CONFIDENCE_THRESHOLD,
            iou_threshold: IOU_THRESHOLD,
            output_layout: OutputLayout::Auto,
            label: DEFAULT_LABEL.to_string(),
            association_iou_threshold: IOU_THRESHOLD,
            frame_interval_ms: 500,
            fallback_boxes: 6,
            intra_threads: 4,
        }
    }
}

impl DetectorConfig {
    /// 从JSON文件加载配置
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        log::info!("config loaded from {}", path.display());
        Ok(config)
    }

    /// 加载配置; 文件不存在时写出默认配置, 解析失败时使用默认值
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::info!("config {} not found, writing defaults", path.display());
            let config = Self::default();
            if let Err(e) = config.save(path) {
                log::warn!("failed to save default config: {}", e);
            }
            return config;
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        log::debug!("config saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(PipelineError::Config(format!("{} must be in [0, 1], got {}", name, v)))
            }
        };
        unit("conf_threshold", self.conf_threshold)?;
        unit("iou_threshold", self.iou_threshold)?;
        unit("association_iou_threshold", self.association_iou_threshold)?;
        if self.input_size == 0 {
            return Err(PipelineError::Config("input_size must be positive".to_string()));
        }
        if self.frame_interval_ms == 0 {
            return Err(PipelineError::Config(
                "frame_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        log::info!(
            "detector: input {}x{}, conf > {:.2}, nms iou {:.2}, layout {:?}, label '{}'",
            self.input_size,
            self.input_size,
            self.conf_threshold,
            self.iou_threshold,
            self.output_layout,
            self.label
        );
        log::info!(
            "association iou {:.2}, frame interval {} ms, fallback boxes {}",
            self.association_iou_threshold,
            self.frame_interval_ms,
            self.fallback_boxes
        );
    }
}

/// 命令行参数
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "托槽定位 - 牙齿检测与目标关联", long_about = None)]
pub struct Args {
    /// ONNX 模型路径 (不指定时使用备用检测器)
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 配置文件
    #[arg(short, long, default_value = "bracket_vision.json")]
    pub config: PathBuf,

    /// 输入图片 (按顺序作为连续帧处理)
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// 标注结果输出目录
    #[arg(long)]
    pub annotate: Option<PathBuf>,

    /// 新放置对象的初始旋转角度
    #[arg(long, default_value_t = 0.0)]
    pub rotation: f32,
}
