//! 原始输出节点张量封装
//!
//! 推理侧交付的是 shape + 扁平 float 缓冲区。NPU 固件以 channel-first
//! (NCHW) 顺序回传, 解码器统一按 channel-last (NHWC) 读取, 所以在构造时
//! 做一次纯转置, 之后所有层的解码都不再关心内存布局。

use ndarray::{Array, IxDyn};

use crate::error::PostprocessError;

/// 原始缓冲区的通道顺序
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    /// NCHW, NPU 固件的默认回传顺序
    ChannelFirst,
    /// NHWC
    ChannelLast,
}

/// 单个推理输出节点的浮点张量, 内部统一为 NHWC
#[derive(Clone, Debug)]
pub struct NodeOutput {
    data: Array<f32, IxDyn>,
}

impl NodeOutput {
    /// 由 shape + 扁平缓冲区构造
    pub fn new(
        shape: &[usize],
        buf: Vec<f32>,
        order: ChannelOrder,
    ) -> Result<Self, PostprocessError> {
        if shape.len() != 4 {
            return Err(PostprocessError::Rank { rank: shape.len() });
        }
        let len = buf.len();
        let array = Array::from_shape_vec(IxDyn(shape), buf).map_err(|_| {
            PostprocessError::BufferSize {
                shape: shape.to_vec(),
                len,
            }
        })?;
        Ok(Self::from_array(array, order))
    }

    /// 由已有 ndarray 构造, rank 必须已经是 4
    fn from_array(array: Array<f32, IxDyn>, order: ChannelOrder) -> Self {
        let data = match order {
            ChannelOrder::ChannelLast => array,
            ChannelOrder::ChannelFirst => array
                .permuted_axes(IxDyn(&[0, 2, 3, 1]))
                .as_standard_layout()
                .into_owned(),
        };
        Self { data }
    }

    pub fn batch(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn height(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn width(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn channels(&self) -> usize {
        self.data.shape()[3]
    }

    /// 读取 batch 0 中 (row, col) 处的一个通道值
    #[inline]
    pub fn get(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.data[[0, row, col, channel]]
    }

    /// 解码器只处理单 batch 输出
    pub(crate) fn ensure_single_batch(&self) -> Result<(), PostprocessError> {
        if self.batch() != 1 {
            return Err(PostprocessError::ShapeMismatch(format!(
                "batch size {} unsupported, expected 1",
                self.batch()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_first_is_transposed() {
        // NCHW (1, 2, 2, 3): 通道 0 全 0, 通道 1 全 1
        let mut buf = vec![0.0; 2 * 3]; // c=0
        buf.extend(vec![1.0; 2 * 3]); // c=1
        let node = NodeOutput::new(&[1, 2, 3, 2], buf, ChannelOrder::ChannelFirst).unwrap();
        assert_eq!(node.height(), 3);
        assert_eq!(node.width(), 2);
        assert_eq!(node.channels(), 2);
        assert_eq!(node.get(2, 1, 0), 0.0);
        assert_eq!(node.get(2, 1, 1), 1.0);
    }

    #[test]
    fn test_channel_last_kept_as_is() {
        let buf: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let node = NodeOutput::new(&[1, 2, 2, 2], buf, ChannelOrder::ChannelLast).unwrap();
        assert_eq!(node.get(0, 0, 1), 1.0);
        assert_eq!(node.get(1, 1, 0), 6.0);
    }

    #[test]
    fn test_bad_rank_rejected() {
        let err = NodeOutput::new(&[2, 2, 2], vec![0.0; 8], ChannelOrder::ChannelLast);
        assert!(matches!(err, Err(PostprocessError::Rank { rank: 3 })));
    }

    #[test]
    fn test_bad_buffer_size_rejected() {
        let err = NodeOutput::new(&[1, 2, 2, 2], vec![0.0; 7], ChannelOrder::ChannelLast);
        assert!(matches!(err, Err(PostprocessError::BufferSize { .. })));
    }
}
