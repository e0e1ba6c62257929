//! 模型族解码器
//!
//! 每个模型族一个 `*Postprocessor`, 统一实现 [`Postprocess`]:
//! 原始节点张量 + 前处理回执 → 原图坐标系下的最终检测。

use serde::{Deserialize, Serialize};

use crate::error::PostprocessError;
use crate::rectify::HwPreProcInfo;
use crate::tensor::NodeOutput;
use crate::types::BBox;

pub mod fcos;
pub mod yolo;
pub mod yolox;

pub use fcos::{FcosConfig, FcosPostprocessor, RegressionMapping};
pub use yolo::{YoloConfig, YoloPostprocessor, YoloVersion};
pub use yolox::{YoloxConfig, YoloxPostprocessor};

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// 模型族后处理统一入口
pub trait Postprocess {
    /// 解码 → 过滤 → NMS → 坐标还原
    fn postprocess(
        &self,
        nodes: &[NodeOutput],
        preproc: &HwPreProcInfo,
    ) -> Result<Vec<BBox>, PostprocessError>;
}

/// 单个输出节点在模型中承担的角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorRole {
    Regression,
    Objectness,
    ClassScores,
    Centerness,
}

/// 节点绑定: 第几个检测层 + 什么角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBinding {
    pub layer: usize,
    pub role: TensorRole,
}

/// 输出节点布局表
///
/// 不同导出工具给出的节点顺序各不相同, 布局表按节点下标声明
/// 每个节点属于哪个检测层、承担什么角色, 解码器据此重组节点
/// 而不是硬编码下标置换。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelLayout {
    bindings: Vec<NodeBinding>,
}

impl ModelLayout {
    pub fn new(bindings: Vec<NodeBinding>) -> Self {
        Self { bindings }
    }

    /// 从 JSON 数组读取布局表
    pub fn from_json(json: &str) -> Result<Self, PostprocessError> {
        let bindings: Vec<NodeBinding> =
            serde_json::from_str(json).map_err(|e| PostprocessError::Layout(e.to_string()))?;
        Ok(Self::new(bindings))
    }

    /// 层优先顺序: (L0 role0, L0 role1, ..., L1 role0, ...)
    pub fn layer_major(layers: usize, roles: &[TensorRole]) -> Self {
        let mut bindings = Vec::with_capacity(layers * roles.len());
        for layer in 0..layers {
            for &role in roles {
                bindings.push(NodeBinding { layer, role });
            }
        }
        Self::new(bindings)
    }

    /// 角色优先顺序: (role0 L0..Ln, role1 L0..Ln, ...)
    pub fn role_major(layers: usize, roles: &[TensorRole]) -> Self {
        let mut bindings = Vec::with_capacity(layers * roles.len());
        for &role in roles {
            for layer in 0..layers {
                bindings.push(NodeBinding { layer, role });
            }
        }
        Self::new(bindings)
    }

    pub fn num_layers(&self) -> usize {
        self.bindings
            .iter()
            .map(|b| b.layer + 1)
            .max()
            .unwrap_or(0)
    }

    /// 按布局表把输入节点重组为 `结果[layer][role下标]`
    ///
    /// `roles` 给出每层期望的角色顺序, 缺失或重复的绑定都报错。
    pub fn group<'a>(
        &self,
        nodes: &'a [NodeOutput],
        roles: &[TensorRole],
    ) -> Result<Vec<Vec<&'a NodeOutput>>, PostprocessError> {
        if nodes.len() != self.bindings.len() {
            return Err(PostprocessError::NodeCount {
                expected: self.bindings.len(),
                actual: nodes.len(),
            });
        }
        let layers = self.num_layers();
        let mut grouped: Vec<Vec<Option<&NodeOutput>>> = vec![vec![None; roles.len()]; layers];
        for (node, binding) in nodes.iter().zip(&self.bindings) {
            let slot = roles.iter().position(|r| *r == binding.role).ok_or_else(|| {
                PostprocessError::Layout(format!(
                    "role {:?} not used by this model family",
                    binding.role
                ))
            })?;
            if binding.layer >= layers {
                return Err(PostprocessError::Layout(format!(
                    "layer index {} out of range",
                    binding.layer
                )));
            }
            if grouped[binding.layer][slot].is_some() {
                return Err(PostprocessError::Layout(format!(
                    "duplicate binding for layer {} role {:?}",
                    binding.layer, binding.role
                )));
            }
            grouped[binding.layer][slot] = Some(node);
        }
        grouped
            .into_iter()
            .enumerate()
            .map(|(layer, row)| {
                row.into_iter()
                    .enumerate()
                    .map(|(slot, cell)| {
                        cell.ok_or_else(|| {
                            PostprocessError::Layout(format!(
                                "missing binding for layer {} role {:?}",
                                layer, roles[slot]
                            ))
                        })
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::ChannelOrder;

    fn node(fill: f32) -> NodeOutput {
        NodeOutput::new(&[1, 1, 1, 1], vec![fill], ChannelOrder::ChannelLast)
            .expect("valid shape")
    }

    #[test]
    fn test_group_resolves_shuffled_node_order() {
        // 某导出把 9 个节点排成 cls×3, reg×3, obj×3
        let roles = [
            TensorRole::Regression,
            TensorRole::Objectness,
            TensorRole::ClassScores,
        ];
        let mut bindings = Vec::new();
        for layer in 0..3 {
            bindings.push(NodeBinding {
                layer,
                role: TensorRole::ClassScores,
            });
        }
        for layer in 0..3 {
            bindings.push(NodeBinding {
                layer,
                role: TensorRole::Regression,
            });
        }
        for layer in 0..3 {
            bindings.push(NodeBinding {
                layer,
                role: TensorRole::Objectness,
            });
        }
        let layout = ModelLayout::new(bindings);

        // 节点值编码为 层号*10 + 角色序号 (reg=0, obj=1, cls=2)
        let nodes: Vec<NodeOutput> = vec![
            node(2.0),
            node(12.0),
            node(22.0),
            node(0.0),
            node(10.0),
            node(20.0),
            node(1.0),
            node(11.0),
            node(21.0),
        ];
        let grouped = layout.group(&nodes, &roles).expect("valid layout");
        for layer in 0..3 {
            for slot in 0..3 {
                let expected = (layer * 10 + slot) as f32;
                assert_eq!(grouped[layer][slot].get(0, 0, 0), expected);
            }
        }
    }

    #[test]
    fn test_group_rejects_wrong_node_count() {
        let roles = [TensorRole::Regression];
        let layout = ModelLayout::layer_major(2, &roles);
        let nodes = vec![node(0.0)];
        assert!(matches!(
            layout.group(&nodes, &roles),
            Err(PostprocessError::NodeCount {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_from_json_round_trip() -> anyhow::Result<()> {
        let json = r#"[
            {"layer": 0, "role": "regression"},
            {"layer": 0, "role": "class_scores"}
        ]"#;
        let layout = ModelLayout::from_json(json)?;
        assert_eq!(layout.num_layers(), 1);

        let serialized = serde_json::to_string(&layout.bindings)?;
        let restored = ModelLayout::from_json(&serialized)?;
        assert_eq!(restored.bindings, layout.bindings);
        Ok(())
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let roles = [TensorRole::Regression];
        let layout = ModelLayout::new(vec![
            NodeBinding {
                layer: 0,
                role: TensorRole::Regression,
            },
            NodeBinding {
                layer: 0,
                role: TensorRole::Regression,
            },
        ]);
        let nodes = vec![node(0.0), node(1.0)];
        assert!(matches!(
            layout.group(&nodes, &roles),
            Err(PostprocessError::Layout(_))
        ));
    }
}
