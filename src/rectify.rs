//! 坐标还原 (coordinate rectification)
//!
//! 前处理对原图做了 crop → resize → pad 三步, 解码出的框位于模型输入
//! 坐标系, 必须按相反顺序撤销这三步才能回到原图像素坐标。

use serde::{Deserialize, Serialize};

use crate::types::BBox;

/// 前处理裁剪区域, 原图坐标系下的像素矩形
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 硬件前处理参数回执
///
/// 推理请求完成时由前处理单元回传, 记录了这一帧实际经历的
/// crop / resize / pad 几何参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwPreProcInfo {
    /// 原图宽高
    pub img_width: u32,
    pub img_height: u32,
    /// resize 后 (pad 前) 的宽高
    pub resized_img_width: u32,
    pub resized_img_height: u32,
    /// pad 只会加在右侧与下侧之外的部分由这两个偏移描述
    pub pad_left: u32,
    pub pad_top: u32,
    /// 模型输入平面宽高
    pub model_input_width: u32,
    pub model_input_height: u32,
    /// 若前处理做过裁剪, 此处为原图坐标系下的裁剪窗口
    pub crop: Option<CropRect>,
}

impl HwPreProcInfo {
    /// 无 crop 无 pad 的整图 resize 场景
    pub fn full_frame(
        img_width: u32,
        img_height: u32,
        model_input_width: u32,
        model_input_height: u32,
    ) -> Self {
        Self {
            img_width,
            img_height,
            resized_img_width: model_input_width,
            resized_img_height: model_input_height,
            pad_left: 0,
            pad_top: 0,
            model_input_width,
            model_input_height,
            crop: None,
        }
    }

    /// 将模型输入坐标系下的框原地还原到原图坐标系
    ///
    /// 逆变换顺序: 去 pad → 除以缩放比 → 加裁剪原点 → 夹取到图像边界。
    /// 坐标保持浮点, 不做整数化。
    pub fn rectify(&self, boxes: &mut [BBox]) {
        let (src_w, src_h, origin_x, origin_y) = match self.crop {
            Some(c) => (c.width as f32, c.height as f32, c.x as f32, c.y as f32),
            None => (self.img_width as f32, self.img_height as f32, 0.0, 0.0),
        };
        let ratio_x = src_w / self.resized_img_width as f32;
        let ratio_y = src_h / self.resized_img_height as f32;
        let pad_left = self.pad_left as f32;
        let pad_top = self.pad_top as f32;
        let max_x = self.img_width as f32 - 1.0;
        let max_y = self.img_height as f32 - 1.0;

        for b in boxes.iter_mut() {
            b.x1 = ((b.x1 - pad_left) * ratio_x + origin_x).clamp(0.0, max_x);
            b.x2 = ((b.x2 - pad_left) * ratio_x + origin_x).clamp(0.0, max_x);
            b.y1 = ((b.y1 - pad_top) * ratio_y + origin_y).clamp(0.0, max_y);
            b.y2 = ((b.y2 - pad_top) * ratio_y + origin_y).clamp(0.0, max_y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 正向前处理变换, 用来验证 rectify 是它的左逆
    fn forward(info: &HwPreProcInfo, x: f32, y: f32) -> (f32, f32) {
        let (src_w, src_h, ox, oy) = match info.crop {
            Some(c) => (c.width as f32, c.height as f32, c.x as f32, c.y as f32),
            None => (info.img_width as f32, info.img_height as f32, 0.0, 0.0),
        };
        let rx = info.resized_img_width as f32 / src_w;
        let ry = info.resized_img_height as f32 / src_h;
        (
            (x - ox) * rx + info.pad_left as f32,
            (y - oy) * ry + info.pad_top as f32,
        )
    }

    #[test]
    fn test_rectify_inverts_crop_resize_pad() {
        let info = HwPreProcInfo {
            img_width: 1920,
            img_height: 1080,
            resized_img_width: 200,
            resized_img_height: 150,
            pad_left: 10,
            pad_top: 20,
            model_input_width: 224,
            model_input_height: 224,
            crop: Some(CropRect {
                x: 100,
                y: 50,
                width: 400,
                height: 300,
            }),
        };
        // 原图中的一个框, 且完全落在裁剪窗口内
        let (ox1, oy1) = (150.0, 80.0);
        let (ox2, oy2) = (420.0, 310.0);
        let (mx1, my1) = forward(&info, ox1, oy1);
        let (mx2, my2) = forward(&info, ox2, oy2);

        let mut boxes = vec![BBox::new(mx1, my1, mx2, my2, 0.9, 0)];
        info.rectify(&mut boxes);
        assert!((boxes[0].x1 - ox1).abs() < 1e-3);
        assert!((boxes[0].y1 - oy1).abs() < 1e-3);
        assert!((boxes[0].x2 - ox2).abs() < 1e-3);
        assert!((boxes[0].y2 - oy2).abs() < 1e-3);
    }

    #[test]
    fn test_rectify_clips_to_image_bounds() {
        let info = HwPreProcInfo::full_frame(640, 480, 320, 240);
        let mut boxes = vec![BBox::new(-5.0, -5.0, 330.0, 250.0, 0.9, 0)];
        info.rectify(&mut boxes);
        assert_eq!(boxes[0].x1, 0.0);
        assert_eq!(boxes[0].y1, 0.0);
        assert_eq!(boxes[0].x2, 639.0);
        assert_eq!(boxes[0].y2, 479.0);
    }

    #[test]
    fn test_rectify_keeps_float_precision() {
        // 非整数缩放比: 100 / 33
        let mut info = HwPreProcInfo::full_frame(100, 100, 33, 33);
        info.resized_img_width = 33;
        info.resized_img_height = 33;
        let mut boxes = vec![BBox::new(1.0, 1.0, 2.0, 2.0, 0.9, 0)];
        info.rectify(&mut boxes);
        let ratio = 100.0 / 33.0;
        assert!((boxes[0].x1 - ratio).abs() < 1e-4);
        assert!((boxes[0].x2 - 2.0 * ratio).abs() < 1e-4);
    }
}
