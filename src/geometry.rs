//! IoU 几何内核 (axis-aligned box overlap arithmetic)
//!
//! 所有 NMS 变体与追踪器的匹配都建立在这两个纯函数之上。
//! 退化框 (负宽高) 一律按零面积处理, 不会产生负交集。

use crate::types::BBox;

/// 防止零面积框除零的小量
pub const IOU_EPS: f32 = 1e-5;

/// 两角点矩形面积, 负宽高夹为 0
#[inline]
pub fn area(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
}

/// 单对框的 IoU
///
/// IoU = 交集 / (并集 + ε), 值域 [0, 1]
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let intersection = area(ix1, iy1, ix2, iy2);
    let union = a.area() + b.area() - intersection;

    intersection / (union + IOU_EPS)
}

/// 一对多 IoU, NMS 的抑制步骤按批评估
pub fn iou_one_to_many(src: &BBox, others: &[BBox]) -> Vec<f32> {
    others.iter().map(|b| iou(src, b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(x: f32, y: f32) -> BBox {
        BBox::new(x, y, x + 10.0, y + 10.0, 1.0, 0)
    }

    #[test]
    fn test_self_iou_is_one() {
        let a = unit_box(5.0, 5.0);
        assert!((1.0 - iou(&a, &a)) < 1e-4);
    }

    #[test]
    fn test_disjoint_iou_is_zero() {
        let a = unit_box(0.0, 0.0);
        let b = unit_box(100.0, 100.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_in_unit_range() {
        let a = unit_box(0.0, 0.0);
        let b = unit_box(5.0, 5.0);
        let v = iou(&a, &b);
        assert!((0.0..=1.0).contains(&v));
        // 交集 25, 并集 175
        assert!((v - 25.0 / 175.0).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_box_zero_area() {
        let bad = BBox::new(10.0, 10.0, 5.0, 5.0, 1.0, 0);
        let a = unit_box(0.0, 0.0);
        assert_eq!(bad.area(), 0.0);
        assert_eq!(iou(&a, &bad), 0.0);
    }

    #[test]
    fn test_one_to_many_matches_scalar() {
        let src = unit_box(0.0, 0.0);
        let others = vec![unit_box(0.0, 0.0), unit_box(5.0, 0.0), unit_box(50.0, 50.0)];
        let batch = iou_one_to_many(&src, &others);
        for (i, b) in others.iter().enumerate() {
            assert_eq!(batch[i], iou(&src, b));
        }
    }
}
