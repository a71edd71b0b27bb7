//! 输出解码 + 坐标还原 (Output decoding and rectification)
//!
//! 模型原始输出: 每个候选一行 `[cx, cy, w, h, objectness, cls_0 .. cls_{K-1}]`,
//! 单位为模型输入像素。支持 `[N, 5+K]` 与转置的 `[5+K, N]`, 可带 batch=1 维。

use ndarray::{ArrayView1, ArrayView2, ArrayViewD, Axis, Ix2};
use serde::{Deserialize, Serialize};

use super::types::{Detection, NormalizedBox};
use crate::error::{PipelineError, Result};
use crate::utils::letterbox::{unletterbox, PreprocessInfo};

const CXYWH_OFFSET: usize = 4;
const CLASS_OFFSET: usize = 5;

/// 输出张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
    /// 按形状推断: 字段数 (>=4) 较少的那一维是字段维
    #[default]
    Auto,
    /// `[N, 5+K]`
    Rows,
    /// `[5+K, N]`
    Channels,
}

/// 候选框 (模型输入空间, 已通过置信度过滤)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub confidence: f32,
    pub class_id: usize,
}

/// 输出解码器
#[derive(Debug, Clone)]
pub struct OutputDecoder {
    input_size: u32,
    conf_threshold: f32,
    layout: OutputLayout,
}

impl OutputDecoder {
    pub fn new(input_size: u32, conf_threshold: f32, layout: OutputLayout) -> Self {
        Self {
            input_size,
            conf_threshold,
            layout,
        }
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// 原始输出 → 候选框
    pub fn decode(&self, output: ArrayViewD<'_, f32>) -> Result<Vec<Candidate>> {
        let shape = output.shape().to_vec();
        let shape_err = |reason: &str| PipelineError::OutputShape {
            shape: shape.clone(),
            reason: reason.to_string(),
        };

        let table: ArrayView2<'_, f32> = match output.ndim() {
            2 => output
                .into_dimensionality::<Ix2>()
                .map_err(|e| shape_err(&e.to_string()))?,
            3 if shape[0] == 1 => output
                .index_axis_move(Axis(0), 0)
                .into_dimensionality::<Ix2>()
                .map_err(|e| shape_err(&e.to_string()))?,
            3 => return Err(shape_err("only batch size 1 is supported")),
            _ => return Err(shape_err("expected a 2-D or 3-D tensor")),
        };

        let rows = match self.resolve_layout(table.dim()) {
            Some(OutputLayout::Channels) => table.reversed_axes(),
            Some(_) => table,
            None => return Err(shape_err("fewer than 4 fields per candidate")),
        };

        let candidates: Vec<Candidate> = rows
            .axis_iter(Axis(0))
            .filter_map(|row| self.decode_row(row))
            .collect();

        log::trace!(
            "decoded {} candidates from {} rows",
            candidates.len(),
            rows.nrows()
        );
        Ok(candidates)
    }

    /// 确定字段维; 两种解释都不足 4 个字段时返回 None
    fn resolve_layout(&self, (a, b): (usize, usize)) -> Option<OutputLayout> {
        match self.layout {
            OutputLayout::Rows => (b >= CXYWH_OFFSET).then_some(OutputLayout::Rows),
            OutputLayout::Channels => (a >= CXYWH_OFFSET).then_some(OutputLayout::Channels),
            OutputLayout::Auto => match (b >= CXYWH_OFFSET, a >= CXYWH_OFFSET) {
                (true, true) => {
                    let layout = if b <= a {
                        OutputLayout::Rows
                    } else {
                        OutputLayout::Channels
                    };
                    // 两种解释都合法, 候选数少于字段数的输出会被误读
                    log::debug!(
                        "auto layout: {}x{} read as {:?} ({} fields per candidate)",
                        a,
                        b,
                        layout,
                        a.min(b)
                    );
                    Some(layout)
                }
                (true, false) => Some(OutputLayout::Rows),
                (false, true) => Some(OutputLayout::Channels),
                (false, false) => None,
            },
        }
    }

    /// 单行解码; 置信度过滤在几何计算之前
    fn decode_row(&self, row: ArrayView1<'_, f32>) -> Option<Candidate> {
        // 没有 objectness 或类别分数时用 1.0 代替 (单类模型)
        let objectness = row.get(CXYWH_OFFSET).copied().unwrap_or(1.0);
        // NaN 分数永远比较失败, 相当于 -inf, 不会遮住后面的有效类别
        let (class_id, class_conf) = if row.len() > CLASS_OFFSET {
            row.iter()
                .skip(CLASS_OFFSET)
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |max, x| if x.1 > max.1 { x } else { max })
        } else {
            (0, 1.0)
        };

        // confidence = objectness * class_confidence, 阈值不含等号 (NaN 同样被丢弃)
        let confidence = objectness * class_conf;
        if !(confidence > self.conf_threshold) {
            return None;
        }

        let s = self.input_size as f32;
        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        Some(Candidate {
            left: (cx - w / 2.0).clamp(0.0, s),
            top: (cy - h / 2.0).clamp(0.0, s),
            right: (cx + w / 2.0).clamp(0.0, s),
            bottom: (cy + h / 2.0).clamp(0.0, s),
            confidence,
            class_id,
        })
    }
}

/// 候选框 → 归一化原图检测结果
///
/// 退化 (零面积/反向) 或置信度越界的框直接丢弃, 这是正常过滤结果。
pub fn rectify(
    candidate: &Candidate,
    info: Option<&PreprocessInfo>,
    input_size: u32,
    label: &str,
) -> Option<Detection> {
    let (left, top) = unletterbox(info, input_size, candidate.left, candidate.top);
    let (right, bottom) = unletterbox(info, input_size, candidate.right, candidate.bottom);
    let bbox = NormalizedBox::new(left, top, right, bottom)?;
    Detection::new(bbox, candidate.confidence, candidate.class_id, label)
}
