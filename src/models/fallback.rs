// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 备用检测器 (Fallback detector)
//!
//! 模型不可用时生成一排沿牙弓弧线分布的合成框, 数量 4~8,
//! 置信度中间最高 (0.95) 两端最低 (0.75), 每次调用结果相同。

use crate::detection::types::{Detection, NormalizedBox};

pub const MIN_BOXES: usize = 4;
pub const MAX_BOXES: usize = 8;

const MAX_CONF: f32 = 0.95;
const MIN_CONF: f32 = 0.75;

/// 弧线横向范围
const ARC_LEFT: f32 = 0.2;
const ARC_SPAN: f32 = 0.6;
/// 弧线中心高度与下沉量
const ARC_TOP: f32 = 0.42;
const ARC_SAG: f32 = 0.12;
const BOX_HEIGHT: f32 = 0.14;
/// 框宽占间距的比例 (保证相邻框不重叠)
const BOX_FILL: f32 = 0.8;

#[derive(Debug, Clone)]
pub struct FallbackDetector {
    count: usize,
    label: String,
}

impl FallbackDetector {
    /// 数量夹到 [4, 8]
    pub fn new(count: usize, label: &str) -> Self {
        Self {
            count: count.clamp(MIN_BOXES, MAX_BOXES),
            label: label.to_string(),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// 生成合成检测结果
    pub fn detect(&self) -> Vec<Detection> {
        let n = self.count;
        let spacing = ARC_SPAN / (n - 1) as f32;
        let half_w = spacing * BOX_FILL / 2.0;
        let mid = (n - 1) as f32 / 2.0;

        (0..n)
            .filter_map(|i| {
                // t ∈ [-1, 1], 两端 (|t|=1) 最高, 中间下沉
                let t = (i as f32 - mid) / mid;
                let cx = ARC_LEFT + spacing * i as f32;
                let cy = ARC_TOP + ARC_SAG * (1.0 - t * t);
                let confidence = MAX_CONF - (MAX_CONF - MIN_CONF) * t.abs();

                let bbox = NormalizedBox::new(
                    cx - half_w,
                    cy - BOX_HEIGHT / 2.0,
                    cx + half_w,
                    cy + BOX_HEIGHT / 2.0,
                )?;
                Detection::new(bbox, confidence, 0, &self.label)
            })
            .collect()
    }
}
