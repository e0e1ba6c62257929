//! 检测数据结构定义
//! Shared data structures for the post-processing pipeline.

use serde::{Deserialize, Serialize};

/// 检测框 (corner form bounding box)
///
/// 解码器产出的候选框和 NMS 之后的最终检测共用该结构,
/// `confidence` 在不同模型族下含义不同:
/// - YOLO 系列: objectness × 最优类别分数
/// - FCOS: sqrt(类别分数 × centerness)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// 面积, 退化框 (负宽高) 记为 0
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// 中心点 (cx, cy)
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// 坐标与分数全部为有限值
    pub fn is_finite(&self) -> bool {
        self.x1.is_finite()
            && self.y1.is_finite()
            && self.x2.is_finite()
            && self.y2.is_finite()
            && self.confidence.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_and_center() {
        let b = BBox::new(10.0, 20.0, 40.0, 60.0, 0.9, 0);
        assert_eq!(b.width(), 30.0);
        assert_eq!(b.height(), 40.0);
        assert_eq!(b.area(), 1200.0);
        assert_eq!(b.center(), (25.0, 40.0));
    }

    #[test]
    fn test_degenerate_area_is_zero() {
        let b = BBox::new(40.0, 60.0, 10.0, 20.0, 0.9, 0);
        assert_eq!(b.area(), 0.0);
    }

    #[test]
    fn test_is_finite_rejects_nan_score() {
        let b = BBox::new(0.0, 0.0, 1.0, 1.0, f32::NAN, 0);
        assert!(!b.is_finite());
    }
}
