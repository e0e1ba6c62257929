//! 后处理错误类型定义
//! Error taxonomy: malformed input fails fast, empty results are never errors.

use thiserror::Error;

/// 输入数据不符合模型族约定时的错误
///
/// 所有变体都是调用方可恢复的: 单帧出错不影响后续帧,
/// 追踪器状态不会被坏帧污染
#[derive(Debug, Error)]
pub enum PostprocessError {
    /// 输出节点数量与模型布局不符
    #[error("expected {expected} output nodes, got {actual}")]
    NodeCount { expected: usize, actual: usize },

    /// 张量维度不是 4 (batch, h, w, c)
    #[error("tensor rank {rank} unsupported, expected 4 (NCHW or NHWC)")]
    Rank { rank: usize },

    /// 缓冲区长度与 shape 不一致
    #[error("shape {shape:?} does not hold a buffer of {len} values")]
    BufferSize { shape: Vec<usize>, len: usize },

    /// 张量形状与检测层约定不符
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// 回归通道数必须大于 objectness 通道数, 否则节点顺序有误
    #[error(
        "regression node channel length ({reg}) not greater than objectness \
         node channel length ({obj}); check the node ordering of the export"
    )]
    ChannelLayout { reg: usize, obj: usize },

    /// 节点布局表本身无效
    #[error("invalid model layout: {0}")]
    Layout(String),
}
