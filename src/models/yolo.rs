//! 锚框式 YOLO 解码器 (tiny-YOLOv3 / YOLOv5)
//!
//! 两代模型共享 (x, y, w, h, obj, cls...) 的通道布局,
//! 仅中心点公式不同, 用 [`YoloVersion`] 区分。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PostprocessError;
use crate::nms::non_max_suppression;
use crate::rectify::HwPreProcInfo;
use crate::tensor::NodeOutput;
use crate::types::BBox;

use super::{sigmoid, Postprocess};

/// 锚框式 YOLO 的两种中心点解码公式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YoloVersion {
    /// cxy = (sigmoid(p) + grid) * stride
    V3Tiny,
    /// cxy = (sigmoid(p) * 2 - 0.5 + grid) * stride
    V5,
}

/// 锚框式 YOLO 解码配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct YoloConfig {
    pub version: YoloVersion,
    pub num_classes: usize,
    /// 每个检测层一组锚框, 与输出节点一一对应, 单位为模型输入像素
    pub anchors: Vec<Vec<(f32, f32)>>,
    pub prob_threshold: f32,
    pub iou_threshold: f32,
    /// 单类别最多保留的检测数
    pub max_detection_per_class: usize,
    /// 导出是否已内联 sigmoid; false 表示张量里已是概率值
    pub with_sigmoid: bool,
}

impl YoloConfig {
    /// tiny-YOLOv3 双层头的默认配置
    pub fn tiny_v3(num_classes: usize) -> Self {
        Self {
            version: YoloVersion::V3Tiny,
            num_classes,
            anchors: vec![
                vec![(81.0, 82.0), (135.0, 169.0), (344.0, 319.0)],
                vec![(23.0, 27.0), (37.0, 58.0), (81.0, 82.0)],
            ],
            prob_threshold: 0.3,
            iou_threshold: 0.45,
            max_detection_per_class: 100,
            with_sigmoid: true,
        }
    }

    /// YOLOv5 三层头的默认配置
    pub fn v5(num_classes: usize) -> Self {
        Self {
            version: YoloVersion::V5,
            num_classes,
            anchors: vec![
                vec![(10.0, 13.0), (16.0, 30.0), (33.0, 23.0)],
                vec![(30.0, 61.0), (62.0, 45.0), (59.0, 119.0)],
                vec![(116.0, 90.0), (156.0, 198.0), (373.0, 326.0)],
            ],
            prob_threshold: 0.3,
            iou_threshold: 0.5,
            max_detection_per_class: 100,
            with_sigmoid: true,
        }
    }
}

/// 锚框式 YOLO 后处理器
#[derive(Clone, Debug)]
pub struct YoloPostprocessor {
    config: YoloConfig,
}

impl YoloPostprocessor {
    pub fn new(config: YoloConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &YoloConfig {
        &self.config
    }

    #[inline]
    fn activate(&self, x: f32) -> f32 {
        if self.config.with_sigmoid {
            sigmoid(x)
        } else {
            x
        }
    }

    /// 解码单个检测层, 返回全部 rows × cols × anchors 个候选
    ///
    /// 不做任何阈值过滤, 候选的丢弃统一发生在 postprocess 中。
    fn decode_layer(
        &self,
        node: &NodeOutput,
        anchors: &[(f32, f32)],
        input_width: f32,
        input_height: f32,
    ) -> Result<Vec<BBox>, PostprocessError> {
        node.ensure_single_batch()?;
        let rows = node.height();
        let cols = node.width();
        let per_anchor = 5 + self.config.num_classes;
        let expected = anchors.len() * per_anchor;
        if node.channels() != expected {
            return Err(PostprocessError::ShapeMismatch(format!(
                "detection layer has {} channels, expected {} ({} anchors x {})",
                node.channels(),
                expected,
                anchors.len(),
                per_anchor
            )));
        }
        if rows == 0 || input_height as usize % rows != 0 {
            return Err(PostprocessError::ShapeMismatch(format!(
                "grid height {} does not divide input height {}",
                rows, input_height
            )));
        }
        let stride = input_height / rows as f32;

        let mut out = Vec::with_capacity(rows * cols * anchors.len());
        for r in 0..rows {
            for c in 0..cols {
                for (a, &(aw, ah)) in anchors.iter().enumerate() {
                    let base = a * per_anchor;
                    let tx = self.activate(node.get(r, c, base));
                    let ty = self.activate(node.get(r, c, base + 1));
                    let tw = self.activate(node.get(r, c, base + 2));
                    let th = self.activate(node.get(r, c, base + 3));
                    let obj = self.activate(node.get(r, c, base + 4));

                    let (cx, cy) = match self.config.version {
                        YoloVersion::V3Tiny => {
                            ((tx + c as f32) * stride, (ty + r as f32) * stride)
                        }
                        YoloVersion::V5 => (
                            (tx * 2.0 - 0.5 + c as f32) * stride,
                            (ty * 2.0 - 0.5 + r as f32) * stride,
                        ),
                    };
                    let w = (tw * 2.0).powi(2) * aw;
                    let h = (th * 2.0).powi(2) * ah;

                    // 最优类别
                    let mut best_class = 0u32;
                    let mut best_score = f32::MIN;
                    for k in 0..self.config.num_classes {
                        let s = self.activate(node.get(r, c, base + 5 + k));
                        if s > best_score {
                            best_score = s;
                            best_class = k as u32;
                        }
                    }

                    let x1 = (cx - w / 2.0).clamp(0.0, input_width - 1.0);
                    let y1 = (cy - h / 2.0).clamp(0.0, input_height - 1.0);
                    let x2 = (cx + w / 2.0).clamp(0.0, input_width - 1.0);
                    let y2 = (cy + h / 2.0).clamp(0.0, input_height - 1.0);
                    out.push(BBox::new(x1, y1, x2, y2, obj * best_score, best_class));
                }
            }
        }
        Ok(out)
    }
}

impl Postprocess for YoloPostprocessor {
    fn postprocess(
        &self,
        nodes: &[NodeOutput],
        preproc: &HwPreProcInfo,
    ) -> Result<Vec<BBox>, PostprocessError> {
        if nodes.len() != self.config.anchors.len() {
            return Err(PostprocessError::NodeCount {
                expected: self.config.anchors.len(),
                actual: nodes.len(),
            });
        }
        let input_w = preproc.model_input_width as f32;
        let input_h = preproc.model_input_height as f32;

        let mut candidates = Vec::new();
        for (node, anchors) in nodes.iter().zip(&self.config.anchors) {
            candidates.extend(self.decode_layer(node, anchors, input_w, input_h)?);
        }
        let decoded = candidates.len();
        candidates.retain(|b| b.is_finite() && b.confidence > self.config.prob_threshold);
        debug!(
            decoded,
            above_threshold = candidates.len(),
            "yolo decode"
        );

        let mut detections = non_max_suppression(
            candidates,
            self.config.iou_threshold,
            Some(self.config.max_detection_per_class),
        );
        preproc.rectify(&mut detections);
        Ok(detections)
    }
}
