//! 逐类别贪心 NMS (class-wise greedy non-maximum suppression)
//!
//! 不同类别的框互不抑制。排序使用稳定排序, 同分候选保持解码顺序,
//! 相同输入必然产生相同输出。

use tracing::debug;

use crate::geometry;
use crate::types::BBox;

/// 对候选框做逐类别 NMS
///
/// 非有限坐标或零面积的候选先被丢弃。每个类别内按置信度降序
/// 贪心保留, IoU 超过 `iou_threshold` 的低分框被抑制。
/// `top_k` 限制单个类别保留的框数, `None` 不限。
pub fn non_max_suppression(
    candidates: Vec<BBox>,
    iou_threshold: f32,
    top_k: Option<usize>,
) -> Vec<BBox> {
    let total = candidates.len();
    let candidates: Vec<BBox> = candidates
        .into_iter()
        .filter(|b| b.is_finite() && b.area() > 0.0)
        .collect();

    // 类别按首次出现顺序处理, 保证输出顺序可复现
    let mut class_ids: Vec<u32> = Vec::new();
    for b in &candidates {
        if !class_ids.contains(&b.class_id) {
            class_ids.push(b.class_id);
        }
    }

    let mut keep: Vec<BBox> = Vec::new();
    for class_id in class_ids {
        let mut pool: Vec<BBox> = candidates
            .iter()
            .filter(|b| b.class_id == class_id)
            .cloned()
            .collect();
        pool.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut kept_for_class = 0usize;
        while !pool.is_empty() {
            if let Some(limit) = top_k {
                if kept_for_class >= limit {
                    break;
                }
            }
            let best = pool.remove(0);
            let ious = geometry::iou_one_to_many(&best, &pool);
            let mut idx = 0;
            pool.retain(|_| {
                let suppressed = ious[idx] > iou_threshold;
                idx += 1;
                !suppressed
            });
            keep.push(best);
            kept_for_class += 1;
        }
    }

    debug!(candidates = total, kept = keep.len(), "nms done");
    keep
}
