//! ByteTrack 风格多目标追踪
//!
//! 两轮贪心关联: 高分检测先与全部轨迹匹配, 低分检测再以更宽松的
//! 阈值打捞仍在跟踪中的剩余轨迹。运动模型为恒速中心点外推,
//! 不引入完整 Kalman 滤波。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry;
use crate::types::BBox;

/// 轨迹生命周期状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    New,
    Tracked,
    Lost,
    Removed,
}

/// 追踪器参数
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// 高低分检测的分界
    pub track_thresh: f32,
    /// 低于该值的检测直接丢弃
    pub low_thresh: f32,
    /// 高分关联的最小 IoU
    pub match_thresh: f32,
    /// 低分打捞的最小 IoU, 应低于 match_thresh
    pub rescue_thresh: f32,
    /// 轨迹丢失后保留的帧数, 超过即移除
    pub track_buffer: u32,
    /// 小于该面积的轨迹不输出
    pub min_box_area: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_thresh: 0.6,
            low_thresh: 0.1,
            match_thresh: 0.5,
            rescue_thresh: 0.3,
            track_buffer: 120,
            min_box_area: 0.0,
        }
    }
}

/// 单条轨迹的内部状态
#[derive(Clone, Debug)]
struct Track {
    id: u64,
    bbox: BBox,
    score: f32,
    state: TrackState,
    // 恒速模型: 当前外推中心与上次实测中心
    cx: f32,
    cy: f32,
    vx: f32,
    vy: f32,
    last_cx: f32,
    last_cy: f32,
    last_match_frame: u64,
    misses: u32,
}

impl Track {
    fn spawn(id: u64, det: &BBox, frame_id: u64) -> Self {
        let (cx, cy) = det.center();
        Self {
            id,
            bbox: det.clone(),
            score: det.confidence,
            state: TrackState::Tracked,
            cx,
            cy,
            vx: 0.0,
            vy: 0.0,
            last_cx: cx,
            last_cy: cy,
            last_match_frame: frame_id,
            misses: 0,
        }
    }

    /// 中心点恒速外推, 宽高保持不变
    fn predict(&mut self) {
        self.cx += self.vx;
        self.cy += self.vy;
        let hw = self.bbox.width() / 2.0;
        let hh = self.bbox.height() / 2.0;
        self.bbox.x1 = self.cx - hw;
        self.bbox.x2 = self.cx + hw;
        self.bbox.y1 = self.cy - hh;
        self.bbox.y2 = self.cy + hh;
    }

    /// 用实测检测更新轨迹, 速度按帧间隔归一
    fn update(&mut self, det: &BBox, frame_id: u64) {
        let (cx, cy) = det.center();
        let gap = frame_id.saturating_sub(self.last_match_frame).max(1) as f32;
        self.vx = (cx - self.last_cx) / gap;
        self.vy = (cy - self.last_cy) / gap;
        self.last_cx = cx;
        self.last_cy = cy;
        self.cx = cx;
        self.cy = cy;
        self.bbox = det.clone();
        self.score = det.confidence;
        self.state = TrackState::Tracked;
        self.last_match_frame = frame_id;
        self.misses = 0;
    }
}

/// 一帧追踪结果中的单条轨迹
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackOutput {
    pub id: u64,
    pub bbox: BBox,
    pub score: f32,
}

/// ByteTrack 风格追踪器
///
/// 每帧调用一次 [`update`](ByteTracker::update), 输入该帧的最终检测
/// (原图坐标系), 返回当前处于跟踪态的轨迹。轨迹 id 从 1 起单调递增,
/// 永不复用。
#[derive(Debug)]
pub struct ByteTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
    frame_id: u64,
}

impl ByteTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
            frame_id: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// 当前存活 (未移除) 的轨迹数
    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// 送入一帧检测, 推进追踪器一帧
    pub fn update(&mut self, detections: &[BBox]) -> Vec<TrackOutput> {
        self.frame_id += 1;

        for t in &mut self.tracks {
            t.predict();
        }

        // 分数划分高低两档, 非有限分数直接丢弃
        let mut high: Vec<&BBox> = Vec::new();
        let mut low: Vec<&BBox> = Vec::new();
        for d in detections {
            if !d.is_finite() || d.confidence < self.config.low_thresh {
                continue;
            }
            if d.confidence >= self.config.track_thresh {
                high.push(d);
            } else {
                low.push(d);
            }
        }

        let mut track_used = vec![false; self.tracks.len()];

        // 第一轮: 高分检测 vs 全部轨迹
        let track_indices: Vec<usize> = (0..self.tracks.len()).collect();
        let (matched_high, unmatched_high) =
            self.associate(&high, &track_indices, &mut track_used, self.config.match_thresh);
        for (det_idx, track_idx) in matched_high {
            let det = high[det_idx].clone();
            self.tracks[track_idx].update(&det, self.frame_id);
        }

        // 第二轮: 低分检测打捞仍在跟踪态的剩余轨迹
        let rescue_pool: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| !track_used[i] && self.tracks[i].state == TrackState::Tracked)
            .collect();
        let (matched_low, _) =
            self.associate(&low, &rescue_pool, &mut track_used, self.config.rescue_thresh);
        for (det_idx, track_idx) in matched_low {
            let det = low[det_idx].clone();
            self.tracks[track_idx].update(&det, self.frame_id);
        }

        // 两轮都没匹配上的轨迹进入丢失态
        for (i, t) in self.tracks.iter_mut().enumerate() {
            if track_used[i] {
                continue;
            }
            t.state = TrackState::Lost;
            t.misses += 1;
            if t.misses > self.config.track_buffer {
                t.state = TrackState::Removed;
            }
        }
        self.tracks.retain(|t| t.state != TrackState::Removed);

        // 未匹配的高分检测生成新轨迹
        for det_idx in unmatched_high {
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(Track::spawn(id, high[det_idx], self.frame_id));
        }

        let outputs: Vec<TrackOutput> = self
            .tracks
            .iter()
            .filter(|t| t.state == TrackState::Tracked && t.bbox.area() >= self.config.min_box_area)
            .map(|t| TrackOutput {
                id: t.id,
                bbox: t.bbox.clone(),
                score: t.score,
            })
            .collect();
        debug!(
            frame = self.frame_id,
            detections = detections.len(),
            tracked = outputs.len(),
            alive = self.tracks.len(),
            "tracker update"
        );
        outputs
    }

    /// 贪心关联: 候选对按 IoU 降序逐一确认, 已占用的检测或轨迹跳过
    ///
    /// 返回 (匹配对列表, 未匹配检测下标)。排序为稳定排序, IoU 相同的
    /// 候选对保持检测优先、轨迹存储顺序次之的枚举顺序。
    fn associate(
        &self,
        detections: &[&BBox],
        track_indices: &[usize],
        track_used: &mut [bool],
        iou_thresh: f32,
    ) -> (Vec<(usize, usize)>, Vec<usize>) {
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (det_idx, det) in detections.iter().enumerate() {
            for &track_idx in track_indices {
                if track_used[track_idx] {
                    continue;
                }
                let score = geometry::iou(det, &self.tracks[track_idx].bbox);
                if score >= iou_thresh {
                    pairs.push((score, det_idx, track_idx));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut det_used = vec![false; detections.len()];
        let mut matched = Vec::new();
        for (_, det_idx, track_idx) in pairs {
            if det_used[det_idx] || track_used[track_idx] {
                continue;
            }
            det_used[det_idx] = true;
            track_used[track_idx] = true;
            matched.push((det_idx, track_idx));
        }
        let unmatched = (0..detections.len()).filter(|&i| !det_used[i]).collect();
        (matched, unmatched)
    }
}
