//! FCOS 解码器
//! FCOS: fully convolutional one-stage, anchor-free, per-pixel prediction.
//!
//! 每个检测层三个节点 (reg, cls, cts), 类别分数与 centerness
//! 直接取原始值, 分数为 sqrt(cls × centerness), 回归值经映射后
//! 作为像素中心到框四边的距离 (l, t, r, b)。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PostprocessError;
use crate::nms::non_max_suppression;
use crate::rectify::HwPreProcInfo;
use crate::tensor::NodeOutput;
use crate::types::BBox;

use super::{ModelLayout, Postprocess, TensorRole};

const FCOS_ROLES: [TensorRole; 3] = [
    TensorRole::Regression,
    TensorRole::ClassScores,
    TensorRole::Centerness,
];

/// 回归通道 → 像素距离的映射方式, 取决于导出头的设计
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionMapping {
    /// ltrb = exp(p)
    Exp,
    /// ltrb = 2^(3 + stage) * relu(p)^2, stage 为检测层序号
    Linear,
}

/// FCOS 解码配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FcosConfig {
    pub num_classes: usize,
    pub score_threshold: f32,
    pub iou_threshold: f32,
    /// 单类别 NMS 保留上限
    pub max_detection_per_class: usize,
    pub mapping: RegressionMapping,
    /// 输出节点布局, 默认角色优先 (reg×3, cls×3, cts×3)
    pub layout: ModelLayout,
}

impl FcosConfig {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            score_threshold: 0.5,
            iou_threshold: 0.35,
            max_detection_per_class: 100,
            mapping: RegressionMapping::Linear,
            layout: ModelLayout::role_major(3, &FCOS_ROLES),
        }
    }

    pub fn with_layout(mut self, layout: ModelLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// FCOS 后处理器
#[derive(Clone, Debug)]
pub struct FcosPostprocessor {
    config: FcosConfig,
}

impl FcosPostprocessor {
    pub fn new(config: FcosConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FcosConfig {
        &self.config
    }

    #[inline]
    fn map_distance(&self, p: f32, stage: usize) -> f32 {
        match self.config.mapping {
            RegressionMapping::Exp => p.exp(),
            RegressionMapping::Linear => {
                let base = 2f32.powi(3 + stage as i32);
                base * p.max(0.0).powi(2)
            }
        }
    }

    fn decode_layer(
        &self,
        reg: &NodeOutput,
        cls: &NodeOutput,
        cts: &NodeOutput,
        stage: usize,
        input_height: f32,
    ) -> Result<Vec<BBox>, PostprocessError> {
        reg.ensure_single_batch()?;
        cls.ensure_single_batch()?;
        cts.ensure_single_batch()?;

        if reg.channels() != 4 || cts.channels() != 1 {
            return Err(PostprocessError::ShapeMismatch(format!(
                "fcos layer expects reg=4/centerness=1 channels, got reg={}/centerness={}",
                reg.channels(),
                cts.channels()
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
        if cls.height() != rows
            || cls.width() != cols
            || cts.height() != rows
            || cts.width() != cols
        {
            return Err(PostprocessError::ShapeMismatch(format!(
                "grid mismatch across triplet: reg {}x{}, cls {}x{}, centerness {}x{}",
                rows,
                cols,
                cls.height(),
                cls.width(),
                cts.height(),
                cts.width()
            )));
        }
        if rows == 0 {
            return Err(PostprocessError::ShapeMismatch(
                "empty detection layer".into(),
            ));
        }
        // stride 不随回执显式给出, 由网格尺寸推回最接近的 2 的幂
        let stride = 2f32.powi((input_height / rows as f32).log2().round() as i32);

        let mut out = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let centerness = cts.get(r, c, 0);

                let mut best_class = 0u32;
                let mut best_score = f32::MIN;
                for k in 0..self.config.num_classes {
                    let s = cls.get(r, c, k);
                    if s > best_score {
                        best_score = s;
                        best_class = k as u32;
                    }
                }
                let score = (best_score * centerness).sqrt();

                let cx = c as f32 * stride + stride / 2.0;
                let cy = r as f32 * stride + stride / 2.0;
                let l = self.map_distance(reg.get(r, c, 0), stage);
                let t = self.map_distance(reg.get(r, c, 1), stage);
                let rt = self.map_distance(reg.get(r, c, 2), stage);
                let b = self.map_distance(reg.get(r, c, 3), stage);

                out.push(BBox::new(cx - l, cy - t, cx + rt, cy + b, score, best_class));
            }
        }
        Ok(out)
    }
}

impl Postprocess for FcosPostprocessor {
    fn postprocess(
        &self,
        nodes: &[NodeOutput],
        preproc: &HwPreProcInfo,
    ) -> Result<Vec<BBox>, PostprocessError> {
        let grouped = self.config.layout.group(nodes, &FCOS_ROLES)?;
        let input_h = preproc.model_input_height as f32;

        let mut candidates = Vec::new();
        for (stage, triplet) in grouped.iter().enumerate() {
            candidates.extend(self.decode_layer(
                triplet[0],
                triplet[1],
                triplet[2],
                stage,
                input_h,
            )?);
        }
        let decoded = candidates.len();
        candidates.retain(|b| b.is_finite() && b.confidence > self.config.score_threshold);
        debug!(decoded, above_threshold = candidates.len(), "fcos decode");

        let mut detections = non_max_suppression(
            candidates,
            self.config.iou_threshold,
            Some(self.config.max_detection_per_class),
        );
        preproc.rectify(&mut detections);
        Ok(detections)
    }
}
