//! YOLOX 解码器
//! YOLOX is an anchor-free YOLO: per-stride (reg, obj, cls) node triplets.
//!
//! 回归通道为原始值, objectness 与类别分数是 logit, 解码时过 sigmoid:
//! - cxy = (p + grid) * stride
//! - wh  = exp(p) * stride

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PostprocessError;
use crate::nms::non_max_suppression;
use crate::rectify::HwPreProcInfo;
use crate::tensor::NodeOutput;
use crate::types::BBox;

use super::{sigmoid, ModelLayout, Postprocess, TensorRole};

const YOLOX_ROLES: [TensorRole; 3] = [
    TensorRole::Regression,
    TensorRole::Objectness,
    TensorRole::ClassScores,
];

/// YOLOX 解码配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct YoloxConfig {
    pub num_classes: usize,
    /// 每个检测层的 stride, 与布局表的层序一致
    pub strides: Vec<u32>,
    pub prob_threshold: f32,
    pub iou_threshold: f32,
    /// 单类别 NMS 保留上限
    pub top_k: usize,
    /// 导出是否需要解码侧补 sigmoid; false 表示 obj/cls 已是概率值
    pub with_sigmoid: bool,
    /// 输出节点布局, 默认每层 (reg, obj, cls) 连续排列
    pub layout: ModelLayout,
}

impl YoloxConfig {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            strides: vec![8, 16, 32],
            prob_threshold: 0.3,
            iou_threshold: 0.5,
            top_k: 300,
            with_sigmoid: true,
            layout: ModelLayout::layer_major(3, &YOLOX_ROLES),
        }
    }

    pub fn with_layout(mut self, layout: ModelLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// YOLOX 后处理器
#[derive(Clone, Debug)]
pub struct YoloxPostprocessor {
    config: YoloxConfig,
}

impl YoloxPostprocessor {
    pub fn new(config: YoloxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &YoloxConfig {
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

    fn decode_layer(
        &self,
        reg: &NodeOutput,
        obj: &NodeOutput,
        cls: &NodeOutput,
        stride: f32,
    ) -> Result<Vec<BBox>, PostprocessError> {
        reg.ensure_single_batch()?;
        obj.ensure_single_batch()?;
        cls.ensure_single_batch()?;

        // 节点顺序错置最常见的症状: reg 与 obj 互换
        if reg.channels() <= obj.channels() {
            return Err(PostprocessError::ChannelLayout {
                reg: reg.channels(),
                obj: obj.channels(),
            });
        }
        if reg.channels() != 4 || obj.channels() != 1 {
            return Err(PostprocessError::ShapeMismatch(format!(
                "yolox layer expects reg=4/obj=1 channels, got reg={}/obj={}",
                reg.channels(),
                obj.channels()
            )));
        }
        if cls.channels() != self.config.num_classes {
            return Err(PostprocessError::ShapeMismatch(format!(
                "class node has {} channels, expected {}",
                cls.channels(),
                self.config.num_classes
            )));
        }
        let rows = reg.height();
        let cols = reg.width();
        if obj.height() != rows
            || obj.width() != cols
            || cls.height() != rows
            || cls.width() != cols
        {
            return Err(PostprocessError::ShapeMismatch(format!(
                "grid mismatch across triplet: reg {}x{}, obj {}x{}, cls {}x{}",
                rows,
                cols,
                obj.height(),
                obj.width(),
                cls.height(),
                cls.width()
            )));
        }

        let mut out = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let objectness = self.activate(obj.get(r, c, 0));
                let cx = (reg.get(r, c, 0) + c as f32) * stride;
                let cy = (reg.get(r, c, 1) + r as f32) * stride;
                let w = reg.get(r, c, 2).exp() * stride;
                let h = reg.get(r, c, 3).exp() * stride;

                let mut best_class = 0u32;
                let mut best_score = f32::MIN;
                for k in 0..self.config.num_classes {
                    let s = self.activate(cls.get(r, c, k));
                    if s > best_score {
                        best_score = s;
                        best_class = k as u32;
                    }
                }

                out.push(BBox::new(
                    cx - w / 2.0,
                    cy - h / 2.0,
                    cx + w / 2.0,
                    cy + h / 2.0,
                    objectness * best_score,
                    best_class,
                ));
            }
        }
        Ok(out)
    }
}

impl Postprocess for YoloxPostprocessor {
    fn postprocess(
        &self,
        nodes: &[NodeOutput],
        preproc: &HwPreProcInfo,
    ) -> Result<Vec<BBox>, PostprocessError> {
        let grouped = self.config.layout.group(nodes, &YOLOX_ROLES)?;
        if grouped.len() != self.config.strides.len() {
            return Err(PostprocessError::Layout(format!(
                "layout declares {} layers but {} strides configured",
                grouped.len(),
                self.config.strides.len()
            )));
        }

        let mut candidates = Vec::new();
        for (triplet, &stride) in grouped.iter().zip(&self.config.strides) {
            candidates.extend(self.decode_layer(
                triplet[0],
                triplet[1],
                triplet[2],
                stride as f32,
            )?);
        }
        let decoded = candidates.len();
        candidates.retain(|b| b.is_finite() && b.confidence > self.config.prob_threshold);
        debug!(decoded, above_threshold = candidates.len(), "yolox decode");

        let mut detections = non_max_suppression(
            candidates,
            self.config.iou_threshold,
            Some(self.config.top_k),
        );
        preproc.rectify(&mut detections);
        Ok(detections)
    }
}
