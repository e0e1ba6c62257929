//! 检测 + 追踪组合管线
//!
//! 把任意模型族的后处理器与追踪器串起来: 每帧一次调用,
//! 原始节点张量进, 带 id 的轨迹出。

use tracing::debug;

use crate::error::PostprocessError;
use crate::models::Postprocess;
use crate::rectify::HwPreProcInfo;
use crate::tensor::NodeOutput;
use crate::tracker::{ByteTracker, TrackOutput, TrackerConfig};

/// 检测 → 追踪的逐帧管线
pub struct TrackingPipeline<P: Postprocess> {
    postprocessor: P,
    tracker: ByteTracker,
}

impl<P: Postprocess> TrackingPipeline<P> {
    pub fn new(postprocessor: P, tracker_config: TrackerConfig) -> Self {
        Self {
            postprocessor,
            tracker: ByteTracker::new(tracker_config),
        }
    }

    /// 处理一帧: 解码 + NMS + 坐标还原, 再送入追踪器
    ///
    /// 解码失败时追踪器状态不变, 该帧视为没有发生。
    pub fn process_frame(
        &mut self,
        nodes: &[NodeOutput],
        preproc: &HwPreProcInfo,
    ) -> Result<Vec<TrackOutput>, PostprocessError> {
        let detections = self.postprocessor.postprocess(nodes, preproc)?;
        debug!(detections = detections.len(), "frame decoded");
        Ok(self.tracker.update(&detections))
    }

    pub fn postprocessor(&self) -> &P {
        &self.postprocessor
    }

    pub fn tracker(&self) -> &ByteTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;

    /// 固定输出序列的假后处理器
    struct Scripted {
        frames: std::cell::RefCell<Vec<Result<Vec<BBox>, PostprocessError>>>,
    }

    impl Scripted {
        fn new(frames: Vec<Result<Vec<BBox>, PostprocessError>>) -> Self {
            Self {
                frames: std::cell::RefCell::new(frames),
            }
        }
    }

    impl Postprocess for Scripted {
        fn postprocess(
            &self,
            _nodes: &[NodeOutput],
            _preproc: &HwPreProcInfo,
        ) -> Result<Vec<BBox>, PostprocessError> {
            self.frames.borrow_mut().remove(0)
        }
    }

    fn det(x: f32) -> BBox {
        BBox::new(x, 0.0, x + 50.0, 50.0, 0.9, 0)
    }

    #[test]
    fn test_pipeline_threads_detections_into_tracker() {
        let scripted = Scripted::new(vec![Ok(vec![det(0.0)]), Ok(vec![det(5.0)])]);
        let mut pipeline = TrackingPipeline::new(scripted, TrackerConfig::default());
        let preproc = HwPreProcInfo::full_frame(640, 480, 320, 240);

        let first = pipeline.process_frame(&[], &preproc).expect("frame 1");
        let second = pipeline.process_frame(&[], &preproc).expect("frame 2");
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_decode_error_leaves_tracker_untouched() {
        let scripted = Scripted::new(vec![
            Ok(vec![det(0.0)]),
            Err(PostprocessError::NodeCount {
                expected: 2,
                actual: 1,
            }),
            Ok(vec![det(2.0)]),
        ]);
        let mut pipeline = TrackingPipeline::new(scripted, TrackerConfig::default());
        let preproc = HwPreProcInfo::full_frame(640, 480, 320, 240);

        let first = pipeline.process_frame(&[], &preproc).expect("frame 1");
        let id = first[0].id;
        assert!(pipeline.process_frame(&[], &preproc).is_err());
        // 坏帧不计入追踪器帧计数
        assert_eq!(pipeline.tracker().frame_id(), 1);

        let third = pipeline.process_frame(&[], &preproc).expect("frame 3");
        assert_eq!(third[0].id, id);
    }
}
