//! 目标关联 + 已放置对象管理
//! Temporal association of detections with placed objects

use super::types::{Detection, NormalizedBox};

// ========== 公共数据结构 ==========

/// 放置变换 (只由用户交互修改, 检测流水线从不改动)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub rotation_degrees: f32,
    pub scale: f32,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            rotation_degrees: 0.0,
            scale: 1.0,
        }
    }
}

/// 已放置对象
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObject {
    /// 唯一ID (单调递增, 不复用)
    id: u64,

    /// 最近一次检测的中心点 (归一化)
    pub detection_center: Option<(f32, f32)>,

    /// 最近一次检测框 (用于匹配)
    pub detection_box: Option<NormalizedBox>,

    placement: Placement,
}

impl TrackedObject {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }
}

/// 单次关联结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Association {
    /// (检测下标, 被更新的对象ID)
    pub matched: Vec<(usize, u64)>,
    /// 未匹配的新检测, 交给放置模块
    pub unmatched: Vec<Detection>,
    /// 中心点非法 (NaN / 越界) 被丢弃的检测数
    pub rejected: usize,
}

/// 放置协作者: 对未匹配检测做表面命中测试
pub trait Placer {
    /// 命中时返回初始放置变换, 未命中返回 None
    fn place(&mut self, center: (f32, f32), bbox: &NormalizedBox) -> Option<Placement>;
}

// ========== 对象存储 ==========

/// 已放置对象的唯一所有者
///
/// 所有修改 (关联更新、用户删除) 都经过 `&mut self`, 单写者。
#[derive(Debug, Default)]
pub struct TrackedObjectStore {
    next_id: u64,
    objects: Vec<TrackedObject>,
}

impl TrackedObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为检测创建新对象, 返回分配的ID
    pub fn insert(&mut self, detection: &Detection, placement: Placement) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.push(TrackedObject {
            id,
            detection_center: Some(detection.center()),
            detection_box: Some(*detection.bbox()),
            placement,
        });
        log::debug!("placed object #{} at {:?}", id, detection.center());
        id
    }

    /// 覆盖检测字段; ID 与放置变换保持不变
    pub fn update_detection(&mut self, id: u64, detection: &Detection) -> bool {
        match self.objects.iter_mut().find(|o| o.id == id) {
            Some(obj) => {
                obj.detection_center = Some(detection.center());
                obj.detection_box = Some(*detection.bbox());
                true
            }
            None => false,
        }
    }

    /// 用户删除
    pub fn remove(&mut self, id: u64) -> Option<TrackedObject> {
        let pos = self.objects.iter().position(|o| o.id == id)?;
        Some(self.objects.remove(pos))
    }

    pub fn get(&self, id: u64) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// 用户交互修改放置变换 (旋转 / 缩放)
    pub fn get_mut_placement(&mut self, id: u64) -> Option<&mut Placement> {
        self.objects
            .iter_mut()
            .find(|o| o.id == id)
            .map(|o| &mut o.placement)
    }

    /// 按放置顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// 清空对象; ID 计数不回退
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// 首个匹配关联
    ///
    /// 每个检测按放置顺序扫描对象, 取第一个 IoU > 阈值的对象原地更新;
    /// 没有匹配的检测放进 `unmatched`。一个检测最多更新一个对象。
    pub fn associate(&mut self, detections: &[Detection], iou_threshold: f32) -> Association {
        let mut association = Association::default();

        for (index, detection) in detections.iter().enumerate() {
            let (cx, cy) = detection.center();
            if !valid_centroid(cx, cy) {
                association.rejected += 1;
                continue;
            }

            let matched = self.objects.iter_mut().find(|obj| {
                obj.detection_box
                    .map(|b| b.iou(detection.bbox()) > iou_threshold)
                    .unwrap_or(false)
            });

            match matched {
                Some(obj) => {
                    obj.detection_center = Some((cx, cy));
                    obj.detection_box = Some(*detection.bbox());
                    association.matched.push((index, obj.id));
                }
                None => association.unmatched.push(detection.clone()),
            }
        }

        log::debug!(
            "association: {} matched, {} new, {} rejected",
            association.matched.len(),
            association.unmatched.len(),
            association.rejected
        );
        association
    }

    /// 把未匹配检测交给放置模块, 命中的创建新对象; 返回新对象ID
    pub fn apply<P: Placer + ?Sized>(&mut self, association: &Association, placer: &mut P) -> Vec<u64> {
        association
            .unmatched
            .iter()
            .filter_map(|detection| {
                let placement = placer.place(detection.center(), detection.bbox())?;
                Some(self.insert(detection, placement))
            })
            .collect()
    }
}

fn valid_centroid(x: f32, y: f32) -> bool {
    (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y)
}
