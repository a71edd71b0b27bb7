/// 检测系统数据结构定义
/// Data structures for the detection pipeline

// ========== 公共常量 ==========

/// 模型输入尺寸
pub const INF_SIZE: u32 = 640;

/// 置信度阈值 (严格大于才保留)
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// NMS / 关联共用的 IoU 阈值
pub const IOU_THRESHOLD: f32 = 0.45;

/// 当前唯一的检测类别
pub const DEFAULT_LABEL: &str = "tooth";

// ========== 数据结构 ==========

/// 归一化边界框 (原图坐标, [0,1])
///
/// 只能通过 `new` 构造, 保证 left < right, top < bottom 且全部落在 [0,1]。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedBox {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl NormalizedBox {
    /// 校验后构造; 零面积、反向或越界 (含 NaN) 的框返回 None
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Option<Self> {
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        if !(in_range(left) && in_range(top) && in_range(right) && in_range(bottom)) {
            return None;
        }
        if right > left && bottom > top {
            Some(Self {
                left,
                top,
                right,
                bottom,
            })
        } else {
            None
        }
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn top(&self) -> f32 {
        self.top
    }

    pub fn right(&self) -> f32 {
        self.right
    }

    pub fn bottom(&self) -> f32 {
        self.bottom
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    pub fn intersection_area(&self, another: &NormalizedBox) -> f32 {
        let l = self.left.max(another.left);
        let r = self.right.min(another.right);
        let t = self.top.max(another.top);
        let b = self.bottom.min(another.bottom);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    pub fn union(&self, another: &NormalizedBox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    /// 交并比; 并集面积非正时返回 0
    pub fn iou(&self, another: &NormalizedBox) -> f32 {
        let union = self.union(another);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(another) / union
    }

    /// 映射到像素坐标 (x1, y1, x2, y2)
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32, f32, f32) {
        let w = width as f32;
        let h = height as f32;
        (
            self.left * w,
            self.top * h,
            self.right * w,
            self.bottom * h,
        )
    }
}

/// 检测结果 (一帧一份, 构造后不可变)
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    bbox: NormalizedBox,
    confidence: f32,
    class_id: usize,
    label: String,
}

impl Detection {
    /// 置信度必须落在 [0,1]
    pub fn new(bbox: NormalizedBox, confidence: f32, class_id: usize, label: &str) -> Option<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return None;
        }
        Some(Self {
            bbox,
            confidence,
            class_id,
            label: label.to_string(),
        })
    }

    pub fn bbox(&self) -> &NormalizedBox {
        &self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }
}
