//! Letterbox 预处理 (Letterbox preprocessing)
//!
//! 相机帧 → 等比缩放 → 居中贴到 S×S 黑色画布 → 归一化 RGB 张量,
//! 同时记录缩放与填充, 供后处理把框映射回原图。

use fast_image_resize as fr;
use image::{imageops, Rgb, RgbImage};

use crate::error::{PipelineError, Result};
use crate::input::PlanarFrame;

/// 画布背景色
pub const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// 单帧 letterbox 参数
///
/// 每帧创建一次, 由同一帧的后处理消费后丢弃。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub src_width: u32,
    pub src_height: u32,
}

impl PreprocessInfo {
    /// 计算把 src 放进 input_size 正方形的参数, 源尺寸为 0 时返回 None
    pub fn fit(src_width: u32, src_height: u32, input_size: u32) -> Option<Self> {
        if src_width == 0 || src_height == 0 || input_size == 0 {
            return None;
        }
        let s = input_size as f32;
        let scale = (s / src_width as f32).min(s / src_height as f32);
        let (scaled_w, scaled_h) = scaled_dims(src_width, src_height, scale, input_size);
        Some(Self {
            scale,
            pad_x: (s - scaled_w as f32) / 2.0,
            pad_y: (s - scaled_h as f32) / 2.0,
            src_width,
            src_height,
        })
    }

    /// 缩放后的尺寸 (每边至少 1 像素)
    pub fn scaled_size(&self, input_size: u32) -> (u32, u32) {
        scaled_dims(self.src_width, self.src_height, self.scale, input_size)
    }

    /// 原图像素 → 模型输入像素
    pub fn to_model(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
    }

    /// 模型输入像素 → 归一化原图坐标, 各轴先夹到 [0, src] 再除以尺寸
    ///
    /// 直接按 `(x - pad) / scale` 求逆, 极小的 scale 也不会退化。
    pub fn to_normalized(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = (x - self.pad_x) / self.scale;
        let sy = (y - self.pad_y) / self.scale;
        let w = self.src_width as f32;
        let h = self.src_height as f32;
        (
            (sx.clamp(0.0, w) / w).clamp(0.0, 1.0),
            (sy.clamp(0.0, h) / h).clamp(0.0, 1.0),
        )
    }
}

fn scaled_dims(src_width: u32, src_height: u32, scale: f32, input_size: u32) -> (u32, u32) {
    let w = (src_width as f32 * scale).round() as u32;
    let h = (src_height as f32 * scale).round() as u32;
    (w.clamp(1, input_size.max(1)), h.clamp(1, input_size.max(1)))
}

/// 模型空间点 → 归一化原图坐标
///
/// 没有 letterbox 参数时 (源尺寸退化) 直接除以 input_size。
pub fn unletterbox(info: Option<&PreprocessInfo>, input_size: u32, x: f32, y: f32) -> (f32, f32) {
    match info {
        Some(info) => info.to_normalized(x, y),
        None => {
            let s = input_size.max(1) as f32;
            ((x / s).clamp(0.0, 1.0), (y / s).clamp(0.0, 1.0))
        }
    }
}

/// 预处理结果: HWC 交错的归一化 RGB 张量 + letterbox 参数
#[derive(Debug, Clone)]
pub struct LetterboxTensor {
    /// 长度 3 × S × S, 行优先, 每像素一组 (R, G, B), 取值 [0, 1]
    pub data: Vec<f32>,
    pub info: Option<PreprocessInfo>,
    pub input_size: u32,
}

impl LetterboxTensor {
    /// 全零张量, 无映射 (退化源图)
    pub fn zeros(input_size: u32) -> Self {
        let s = input_size as usize;
        Self {
            data: vec![0.0; 3 * s * s],
            info: None,
            input_size,
        }
    }
}

/// 平面帧 → letterbox 张量
pub fn letterbox_frame(frame: &PlanarFrame, input_size: u32) -> Result<LetterboxTensor> {
    if frame.is_empty() {
        return Ok(LetterboxTensor::zeros(input_size));
    }
    let rgb = frame.to_rgb()?;
    letterbox(&rgb, input_size)
}

/// 打包 RGB → letterbox 张量
pub fn letterbox(rgb: &RgbImage, input_size: u32) -> Result<LetterboxTensor> {
    let (w0, h0) = rgb.dimensions();
    let info = match PreprocessInfo::fit(w0, h0, input_size) {
        Some(info) => info,
        None => return Ok(LetterboxTensor::zeros(input_size)),
    };
    let (w_new, h_new) = info.scaled_size(input_size);

    let resized = resize_rgb(rgb, w_new, h_new)?;

    let mut canvas = RgbImage::from_pixel(input_size, input_size, BACKGROUND);
    // 奇数填充时向下取整, 张量与 info 之间最多差半个像素
    imageops::replace(
        &mut canvas,
        &resized,
        info.pad_x.floor() as i64,
        info.pad_y.floor() as i64,
    );

    let data = canvas
        .as_raw()
        .iter()
        .map(|&v| v as f32 / 255.0)
        .collect();

    Ok(LetterboxTensor {
        data,
        info: Some(info),
        input_size,
    })
}

/// 双线性缩放 (fast_image_resize)
fn resize_rgb(rgb: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    if rgb.dimensions() == (width, height) {
        return Ok(rgb.clone());
    }

    let src = fr::images::ImageRef::new(rgb.width(), rgb.height(), rgb.as_raw(), fr::PixelType::U8x3)
        .map_err(|e| PipelineError::Resize(e.to_string()))?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .map_err(|e| PipelineError::Resize(e.to_string()))?;

    RgbImage::from_raw(width, height, dst.buffer().to_vec())
        .ok_or_else(|| PipelineError::Resize("resized buffer size mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ChromaKind, ChromaPlanes};

    #[test]
    fn hd_frame_fits_with_vertical_padding() {
        let info = PreprocessInfo::fit(1280, 720, 640).unwrap();
        assert_eq!(info.scale, 0.5);
        assert_eq!(info.scaled_size(640), (640, 360));
        assert_eq!(info.pad_x, 0.0);
        assert_eq!(info.pad_y, 140.0);
    }

    #[test]
    fn portrait_frame_pads_horizontally() {
        let info = PreprocessInfo::fit(480, 640, 640).unwrap();
        assert_eq!(info.scale, 1.0);
        assert_eq!(info.pad_x, 80.0);
        assert_eq!(info.pad_y, 0.0);
    }

    #[test]
    fn degenerate_source_has_no_info() {
        assert!(PreprocessInfo::fit(0, 720, 640).is_none());
        assert!(PreprocessInfo::fit(1280, 0, 640).is_none());
    }

    #[test]
    fn extreme_aspect_keeps_one_pixel() {
        let info = PreprocessInfo::fit(10_000, 1, 640).unwrap();
        assert_eq!(info.scaled_size(640), (640, 1));
    }

    #[test]
    fn model_point_maps_back_to_source() {
        let info = PreprocessInfo::fit(1280, 720, 640).unwrap();
        // 原图 (400, 300) → 模型 (200, 290)
        let (mx, my) = info.to_model(400.0, 300.0);
        assert!((mx - 200.0).abs() < 1e-4);
        assert!((my - 290.0).abs() < 1e-4);

        let (nx, ny) = info.to_normalized(mx, my);
        assert!((nx - 400.0 / 1280.0).abs() < 1e-5);
        assert!((ny - 300.0 / 720.0).abs() < 1e-5);
    }

    #[test]
    fn tiny_scale_still_maps_back() {
        // scale ≈ 1.6e-7, 行列式远小于 1e-10
        let info = PreprocessInfo::fit(4_000_000_000, 1_000_000, 640).unwrap();
        assert!(info.scale < 1e-6);
        let (nx, ny) = info.to_normalized(320.0, 320.0);
        assert!((nx - 0.5).abs() < 1e-3);
        assert_eq!(ny, 1.0);
        assert!((info.to_normalized(160.0, 0.0).0 - 0.25).abs() < 1e-3);
    }

    #[test]
    fn padding_region_clamps_to_edges() {
        let info = PreprocessInfo::fit(1280, 720, 640).unwrap();
        assert_eq!(info.to_normalized(10.0, 20.0), (10.0 / 640.0, 0.0));
        assert_eq!(info.to_normalized(639.0, 630.0).1, 1.0);
    }

    #[test]
    fn identity_mapping_without_info() {
        assert_eq!(unletterbox(None, 640, 320.0, 160.0), (0.5, 0.25));
        assert_eq!(unletterbox(None, 640, 700.0, -5.0), (1.0, 0.0));
    }

    #[test]
    fn tensor_is_interleaved_and_padded_black() {
        let rgb = RgbImage::from_pixel(64, 32, Rgb([255, 0, 51]));
        let t = letterbox(&rgb, 32).unwrap();
        assert_eq!(t.data.len(), 3 * 32 * 32);

        let info = t.info.unwrap();
        assert_eq!(info.scale, 0.5);
        assert_eq!(info.pad_y, 8.0);

        // 第 0 行是填充区
        assert_eq!(&t.data[0..3], &[0.0, 0.0, 0.0]);
        // 第 16 行中间是原图内容
        let idx = (16 * 32 + 16) * 3;
        assert!((t.data[idx] - 1.0).abs() < 1e-6);
        assert!(t.data[idx + 1].abs() < 1e-6);
        assert!((t.data[idx + 2] - 0.2).abs() < 1e-6);
        assert!(t.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn empty_frame_yields_zero_tensor() {
        let frame = PlanarFrame {
            width: 0,
            height: 0,
            luma: Vec::new(),
            luma_stride: 0,
            chroma: ChromaPlanes::Nv12 {
                cbcr: Vec::new(),
                stride: 0,
            },
        };
        let t = letterbox_frame(&frame, 16).unwrap();
        assert!(t.info.is_none());
        assert_eq!(t.data.len(), 3 * 16 * 16);
        assert!(t.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn planar_frame_goes_through_conversion() {
        let rgb = RgbImage::from_pixel(20, 10, Rgb([128, 128, 128]));
        let frame = PlanarFrame::from_rgb(&rgb, ChromaKind::I420);
        let t = letterbox_frame(&frame, 20).unwrap();
        let info = t.info.unwrap();
        assert_eq!(info.pad_y, 5.0);
        let idx = (10 * 20 + 10) * 3;
        assert!((t.data[idx] - 128.0 / 255.0).abs() < 0.02);
    }
}
