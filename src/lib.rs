//! NPU 检测后处理库
//!
//! 推理硬件只负责张量计算, 本库承接其后的全部工作:
//! 原始浮点输出节点 → 解码 → 逐类别 NMS → 坐标还原 → 多目标追踪。
//!
//! 支持的模型族:
//! - tiny-YOLOv3 / YOLOv5 (锚框式, [`models::YoloPostprocessor`])
//! - YOLOX (anchor-free, [`models::YoloxPostprocessor`])
//! - FCOS (anchor-free + centerness, [`models::FcosPostprocessor`])
//!
//! ## 使用示例
//! ```no_run
//! use npu_postprocess::{
//!     ChannelOrder, HwPreProcInfo, NodeOutput, TrackerConfig, TrackingPipeline,
//!     YoloConfig, YoloPostprocessor,
//! };
//!
//! # fn main() -> Result<(), npu_postprocess::PostprocessError> {
//! let postprocessor = YoloPostprocessor::new(YoloConfig::tiny_v3(80));
//! let mut pipeline = TrackingPipeline::new(postprocessor, TrackerConfig::default());
//!
//! // 每帧: 推理输出的节点缓冲区 + 前处理回执
//! let nodes = vec![
//!     NodeOutput::new(&[1, 255, 13, 13], vec![0.0; 255 * 13 * 13], ChannelOrder::ChannelFirst)?,
//!     NodeOutput::new(&[1, 255, 26, 26], vec![0.0; 255 * 26 * 26], ChannelOrder::ChannelFirst)?,
//! ];
//! let preproc = HwPreProcInfo::full_frame(1920, 1080, 416, 416);
//! let tracks = pipeline.process_frame(&nodes, &preproc)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod geometry;
pub mod models;
pub mod nms;
pub mod pipeline;
pub mod rectify;
pub mod tensor;
pub mod tracker;
pub mod types;

pub use crate::error::PostprocessError;
pub use crate::models::{
    FcosConfig, FcosPostprocessor, ModelLayout, NodeBinding, Postprocess, RegressionMapping,
    TensorRole, YoloConfig, YoloPostprocessor, YoloVersion, YoloxConfig, YoloxPostprocessor,
};
pub use crate::nms::non_max_suppression;
pub use crate::pipeline::TrackingPipeline;
pub use crate::rectify::{CropRect, HwPreProcInfo};
pub use crate::tensor::{ChannelOrder, NodeOutput};
pub use crate::tracker::{ByteTracker, TrackOutput, TrackState, TrackerConfig};
pub use crate::types::BBox;
