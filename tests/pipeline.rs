use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use ndarray::{Array2, ArrayD};

use bracket_vision::detection::OutputLayout;
use bracket_vision::{
    ChromaKind, Detector, DetectorConfig, InferenceEngine, LetterboxTensor, NormalizedBox,
    PlanarFrame, Placement, Placer, TrackedObjectStore,
};

/// 按顺序返回预先写好的输出, 用完后报错
struct Scripted {
    outputs: VecDeque<Result<Array2<f32>>>,
}

impl Scripted {
    fn new(outputs: Vec<Result<Array2<f32>>>) -> Self {
        Self {
            outputs: outputs.into(),
        }
    }
}

impl InferenceEngine for Scripted {
    fn run(&mut self, tensor: &LetterboxTensor) -> Result<ArrayD<f32>> {
        assert_eq!(tensor.data.len(), 3 * 64 * 64);
        match self.outputs.pop_front() {
            Some(out) => out.map(|a| a.into_dyn()),
            None => Err(anyhow!("script exhausted")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct AcceptAll;

impl Placer for AcceptAll {
    fn place(&mut self, _center: (f32, f32), _bbox: &NormalizedBox) -> Option<Placement> {
        Some(Placement::default())
    }
}

fn config() -> DetectorConfig {
    DetectorConfig {
        input_size: 64,
        output_layout: OutputLayout::Rows,
        ..DetectorConfig::default()
    }
}

/// 128x64 相机帧, letterbox 到 64: scale 0.5, pad_y 16
fn camera_frame() -> PlanarFrame {
    PlanarFrame::from_rgb(&RgbImage::from_pixel(128, 64, Rgb([200, 180, 170])), ChromaKind::I420)
}

/// 模型空间一行: [cx, cy, w, h, obj, cls]
fn row(cx: f32, cy: f32, w: f32, h: f32, conf: f32) -> [f32; 6] {
    [cx, cy, w, h, 1.0, conf]
}

fn table(rows: &[[f32; 6]]) -> Array2<f32> {
    let mut a = Array2::zeros((rows.len(), 6));
    for (i, r) in rows.iter().enumerate() {
        for (j, v) in r.iter().enumerate() {
            a[[i, j]] = *v;
        }
    }
    a
}

#[test]
fn frames_flow_through_detection_and_association() {
    let engine = Scripted::new(vec![
        // 第 1 帧: 两颗牙 + 一个重复框 + 一个低分框
        Ok(table(&[
            row(16.0, 32.0, 12.0, 12.0, 0.9),
            row(17.0, 32.0, 12.0, 12.0, 0.7),
            row(48.0, 32.0, 12.0, 12.0, 0.8),
            row(32.0, 32.0, 12.0, 12.0, 0.4),
        ])),
        // 第 2 帧: 两颗牙轻微移动, 第三颗出现
        Ok(table(&[
            row(17.0, 33.0, 12.0, 12.0, 0.85),
            row(48.0, 31.0, 12.0, 12.0, 0.8),
            row(32.0, 44.0, 8.0, 8.0, 0.75),
        ])),
        // 第 3 帧: 推理失败
        Err(anyhow!("timeout")),
    ]);

    let mut detector = Detector::new(config(), Some(Box::new(engine)));
    let mut store = TrackedObjectStore::new();
    let iou = detector.config().association_iou_threshold;

    let frame = camera_frame();

    let first = detector.detect(&frame);
    assert_eq!(first.len(), 2);
    let assoc = store.associate(&first, iou);
    assert!(assoc.matched.is_empty());
    let ids = store.apply(&assoc, &mut AcceptAll);
    assert_eq!(ids.len(), 2);

    // 用户旋转第一个对象
    store.get_mut_placement(ids[0]).unwrap().rotation_degrees = 45.0;

    let second = detector.detect(&frame);
    assert_eq!(second.len(), 3);
    let assoc = store.associate(&second, iou);
    assert_eq!(assoc.matched.len(), 2);
    assert_eq!(assoc.unmatched.len(), 1);
    let new_ids = store.apply(&assoc, &mut AcceptAll);
    assert_eq!(new_ids.len(), 1);
    assert!(new_ids[0] > ids[1]);
    assert_eq!(store.len(), 3);
    assert_eq!(store.get(ids[0]).unwrap().placement().rotation_degrees, 45.0);

    let third = detector.detect(&frame);
    assert!(third.is_empty());
    assert_eq!(store.len(), 3);
}

#[test]
fn rectified_boxes_are_normalized_to_source() {
    let engine = Scripted::new(vec![Ok(table(&[row(32.0, 32.0, 32.0, 16.0, 0.9)]))]);
    let mut detector = Detector::new(config(), Some(Box::new(engine)));

    let dets = detector.detect(&camera_frame());
    assert_eq!(dets.len(), 1);
    let b = dets[0].bbox();
    // 模型 (16,24)-(48,40) → 原图 (32,16)-(96,48)
    assert!((b.left() - 0.25).abs() < 1e-5);
    assert!((b.top() - 0.25).abs() < 1e-5);
    assert!((b.right() - 0.75).abs() < 1e-5);
    assert!((b.bottom() - 0.75).abs() < 1e-5);
    assert_eq!(dets[0].label(), "tooth");
}

#[test]
fn boxes_in_padding_never_reach_output() {
    // 第一行完全落在上方填充区, 第二行宽度为 0
    let engine = Scripted::new(vec![Ok(table(&[
        row(32.0, 6.0, 20.0, 8.0, 0.9),
        row(40.0, 32.0, 0.0, 10.0, 0.9),
    ]))]);
    let mut detector = Detector::new(config(), Some(Box::new(engine)));
    assert!(detector.detect(&camera_frame()).is_empty());
}

#[test]
fn empty_frame_skips_letterbox_mapping() {
    let empty = PlanarFrame {
        width: 0,
        height: 0,
        luma: Vec::new(),
        luma_stride: 0,
        chroma: bracket_vision::ChromaPlanes::Nv12 {
            cbcr: Vec::new(),
            stride: 0,
        },
    };
    // 无映射时直接除以输入尺寸
    let engine = Scripted::new(vec![Ok(table(&[row(32.0, 32.0, 32.0, 32.0, 0.9)]))]);
    let mut detector = Detector::new(config(), Some(Box::new(engine)));
    let dets = detector.detect(&empty);
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].bbox().left(), 0.25);
    assert_eq!(dets[0].bbox().bottom(), 0.75);
}

#[test]
fn fallback_detector_feeds_the_tracker() {
    let mut detector = Detector::new(
        DetectorConfig {
            fallback_boxes: 8,
            ..DetectorConfig::default()
        },
        None,
    );
    assert!(!detector.is_model_loaded());

    let mut store = TrackedObjectStore::new();
    let frame = camera_frame();
    for _ in 0..3 {
        let dets = detector.detect(&frame);
        assert_eq!(dets.len(), 8);
        let assoc = store.associate(&dets, 0.45);
        store.apply(&assoc, &mut AcceptAll);
    }
    // 合成框每帧相同, 只在第一帧放置
    assert_eq!(store.len(), 8);
}
