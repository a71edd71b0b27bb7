/// 托槽定位 (Bracket Vision)
///
/// 把一组图片当作连续相机帧:
/// 1. 主线程: 帧节流 + 目标关联 + 放置
/// 2. 推理线程: letterbox → 推理 → 解码 → NMS
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use bracket_vision::{
    Args, ChromaKind, Detection, Detector, DetectorConfig, FrameGate, InferenceEngine,
    InferenceWorker, NormalizedBox, PlanarFrame, Placement, Placer, TrackedObjectStore,
};

const RESULT_TIMEOUT: Duration = Duration::from_secs(30);

/// 接受所有命中测试, 使用命令行给定的初始旋转
struct AcceptAll {
    rotation_degrees: f32,
}

impl Placer for AcceptAll {
    fn place(&mut self, _center: (f32, f32), _bbox: &NormalizedBox) -> Option<Placement> {
        Some(Placement {
            rotation_degrees: self.rotation_degrees,
            ..Placement::default()
        })
    }
}

#[cfg(feature = "onnx")]
fn load_engine(args: &Args, config: &DetectorConfig) -> Option<Box<dyn InferenceEngine + Send>> {
    let path = args.model.as_ref()?;
    match bracket_vision::OrtBackend::build(path, config.intra_threads) {
        Ok(backend) => Some(Box::new(backend)),
        Err(e) => {
            log::warn!("{:#}, falling back to synthetic detections", e);
            None
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn load_engine(args: &Args, _config: &DetectorConfig) -> Option<Box<dyn InferenceEngine + Send>> {
    if let Some(path) = &args.model {
        log::warn!(
            "built without the `onnx` feature, ignoring model {}",
            path.display()
        );
    }
    None
}

fn annotate(
    rgb: &RgbImage,
    detections: &[Detection],
    store: &TrackedObjectStore,
    out_dir: &Path,
    name: &str,
) -> Result<()> {
    let mut canvas = rgb.clone();
    let (w, h) = canvas.dimensions();

    let mut draw = |bbox: &NormalizedBox, color: Rgb<u8>| {
        let (x1, y1, x2, y2) = bbox.to_pixels(w, h);
        let rect = Rect::at(x1 as i32, y1 as i32)
            .of_size(((x2 - x1) as u32).max(1), ((y2 - y1) as u32).max(1));
        draw_hollow_rect_mut(&mut canvas, rect, color);
    };

    for obj in store.iter() {
        if let Some(bbox) = &obj.detection_box {
            draw(bbox, Rgb([0, 200, 255]));
        }
    }
    for det in detections {
        draw(det.bbox(), Rgb([0, 255, 0]));
    }

    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{}.png", name));
    canvas
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("annotated → {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = DetectorConfig::load_or_default(&args.config);

    let engine = load_engine(&args, &config);
    let detector = Detector::new(config.clone(), engine);
    detector.summary();

    let mut worker = InferenceWorker::spawn(detector)?;
    let mut gate = FrameGate::from_millis(config.frame_interval_ms);
    let mut store = TrackedObjectStore::new();
    let mut placer = AcceptAll {
        rotation_degrees: args.rotation,
    };

    log::info!(
        "processing {} images ({})",
        args.images.len(),
        if worker.is_model_loaded() {
            "model"
        } else {
            "fallback"
        }
    );

    for path in &args.images {
        let rgb = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                log::warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let frame = PlanarFrame::from_rgb(&rgb, ChromaKind::Nv12);

        while !gate.ready() {
            thread::sleep(Duration::from_millis(10));
        }
        let Some(sequence) = worker.submit_timeout(frame, RESULT_TIMEOUT) else {
            log::warn!("frame {} dropped", path.display());
            continue;
        };
        let Some(result) = worker.recv_timeout(RESULT_TIMEOUT) else {
            log::warn!("no result for frame #{}", sequence);
            continue;
        };

        let association = store.associate(&result.detections, config.association_iou_threshold);
        let created = store.apply(&association, &mut placer);
        log::info!(
            "#{} {}: {} detections, {} updated, {} placed, {} tracked ({:.1} ms inference, {:.1} ms total)",
            result.sequence,
            path.display(),
            result.detections.len(),
            association.matched.len(),
            created.len(),
            store.len(),
            result.inference_ms,
            result.total_ms
        );
        for det in &result.detections {
            let b = det.bbox();
            log::debug!(
                "  {} {:.2} [{:.3}, {:.3}, {:.3}, {:.3}]",
                det.label(),
                det.confidence(),
                b.left(),
                b.top(),
                b.right(),
                b.bottom()
            );
        }

        if let Some(dir) = &args.annotate {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("frame_{}", sequence));
            if let Err(e) = annotate(&rgb, &result.detections, &store, dir, &name) {
                log::warn!("{:#}", e);
            }
        }
    }

    log::info!(
        "done: {} frames, {} dropped, {} objects placed",
        worker.submitted(),
        worker.dropped(),
        store.len()
    );
    worker.shutdown();
    Ok(())
}
