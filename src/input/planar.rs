//! 平面 YUV 帧 (Planar luma/chroma frames)
//!
//! 相机输出的原生格式: 一个亮度平面 + 4:2:0 色度平面,
//! 色度可以是三平面 I420 (Cb/Cr 分开) 或双平面 NV12 (CbCr 交错)。

use image::RgbImage;

use crate::error::{PipelineError, Result};

/// 色度平面布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChromaPlanes {
    /// 三平面: Cb 与 Cr 各一个平面, 共用行步长
    I420 { cb: Vec<u8>, cr: Vec<u8>, stride: usize },
    /// 双平面: CbCr 交错
    Nv12 { cbcr: Vec<u8>, stride: usize },
}

/// 色度布局种类 (用于 RGB → YUV 正向转换)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaKind {
    I420,
    Nv12,
}

/// 相机原生的平面帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarFrame {
    pub width: u32,
    pub height: u32,
    pub luma: Vec<u8>,
    pub luma_stride: usize,
    pub chroma: ChromaPlanes,
}

impl PlanarFrame {
    /// 色度平面尺寸 (4:2:0 子采样, 奇数尺寸向上取整)
    pub fn chroma_size(&self) -> (usize, usize) {
        (
            (self.width as usize).div_ceil(2),
            (self.height as usize).div_ceil(2),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// 检查各平面的步长与长度是否足以覆盖 width × height
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let w = self.width as usize;
        let h = self.height as usize;
        let (cw, ch) = self.chroma_size();

        check_plane("luma", self.luma.len(), self.luma_stride, w, h)?;
        match &self.chroma {
            ChromaPlanes::I420 { cb, cr, stride } => {
                check_plane("cb", cb.len(), *stride, cw, ch)?;
                check_plane("cr", cr.len(), *stride, cw, ch)?;
            }
            ChromaPlanes::Nv12 { cbcr, stride } => {
                check_plane("cbcr", cbcr.len(), *stride, cw * 2, ch)?;
            }
        }
        Ok(())
    }

    /// YUV420 → 打包 RGB (原始分辨率)
    ///
    /// 全范围 BT.601, 定点系数放大 128 倍 (1.402→179, 0.344→44, 0.714→91, 1.772→227)。
    pub fn to_rgb(&self) -> Result<RgbImage> {
        self.validate()?;
        let w = self.width as usize;
        let h = self.height as usize;
        let mut rgb = vec![0u8; w * h * 3];

        let mut out_idx = 0;
        for y in 0..h {
            let y_row = y * self.luma_stride;
            for x in 0..w {
                let y_val = self.luma[y_row + x] as i32;
                let (cb, cr) = self.chroma_at(x, y);
                let u_val = cb as i32 - 128;
                let v_val = cr as i32 - 128;

                rgb[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
                rgb[out_idx + 1] =
                    (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
                rgb[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
                out_idx += 3;
            }
        }

        RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| PipelineError::InvalidFrame("RGB buffer size mismatch".to_string()))
    }

    #[inline]
    fn chroma_at(&self, x: usize, y: usize) -> (u8, u8) {
        let cx = x >> 1;
        let cy = y >> 1;
        match &self.chroma {
            ChromaPlanes::I420 { cb, cr, stride } => (cb[cy * stride + cx], cr[cy * stride + cx]),
            ChromaPlanes::Nv12 { cbcr, stride } => {
                let idx = cy * stride + cx * 2;
                (cbcr[idx], cbcr[idx + 1])
            }
        }
    }

    /// 打包 RGB → YUV420 (紧凑步长)
    ///
    /// 静态图片走相机同一条流水线时使用; 色度取 2x2 块的平均值。
    pub fn from_rgb(img: &RgbImage, kind: ChromaKind) -> Self {
        let (width, height) = img.dimensions();
        let w = width as usize;
        let h = height as usize;
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);

        let mut luma = vec![0u8; w * h];
        for (x, y, px) in img.enumerate_pixels() {
            let [r, g, b] = px.0;
            let yv = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            luma[y as usize * w + x as usize] = yv.round().clamp(0.0, 255.0) as u8;
        }

        let mut cb_plane = vec![128u8; cw * ch];
        let mut cr_plane = vec![128u8; cw * ch];
        for cy in 0..ch {
            for cx in 0..cw {
                let (mut sum_cb, mut sum_cr, mut n) = (0.0f32, 0.0f32, 0.0f32);
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let x = cx * 2 + dx;
                    let y = cy * 2 + dy;
                    if x >= w || y >= h {
                        continue;
                    }
                    let [r, g, b] = img.get_pixel(x as u32, y as u32).0;
                    let (r, g, b) = (r as f32, g as f32, b as f32);
                    sum_cb += -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
                    sum_cr += 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
                    n += 1.0;
                }
                if n > 0.0 {
                    cb_plane[cy * cw + cx] = (sum_cb / n).round().clamp(0.0, 255.0) as u8;
                    cr_plane[cy * cw + cx] = (sum_cr / n).round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        let chroma = match kind {
            ChromaKind::I420 => ChromaPlanes::I420 {
                cb: cb_plane,
                cr: cr_plane,
                stride: cw,
            },
            ChromaKind::Nv12 => {
                let cbcr = cb_plane
                    .iter()
                    .zip(cr_plane.iter())
                    .flat_map(|(&cb, &cr)| [cb, cr])
                    .collect();
                ChromaPlanes::Nv12 {
                    cbcr,
                    stride: cw * 2,
                }
            }
        };

        Self {
            width,
            height,
            luma,
            luma_stride: w,
            chroma,
        }
    }
}

fn check_plane(name: &str, len: usize, stride: usize, row_bytes: usize, rows: usize) -> Result<()> {
    if stride < row_bytes {
        return Err(PipelineError::InvalidFrame(format!(
            "{} stride {} < row width {}",
            name, stride, row_bytes
        )));
    }
    let required = stride * (rows - 1) + row_bytes;
    if len < required {
        return Err(PipelineError::InvalidFrame(format!(
            "{} plane has {} bytes, needs {}",
            name, len, required
        )));
    }
    Ok(())
}
