// 该文件是 CogCoach 项目的一部分。
// src/detector.rs - 中心区域红色检测
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! # 中心区域检测
//!
//! 每帧只产生一个标量：中心 ROI 中被判定为红色的像素比例。
//!
//! 颜色空间采用 8 位 HSV（H ∈ [0, 180)，即角度的一半；S、V ∈ [0, 255]）。
//! 红色横跨色相原点，所以掩码由低、高两个色相带组成。

use thiserror::Error;

use crate::{config::RoiFraction, frame::Frame};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
  #[error("无效的帧: {reason}")]
  InvalidFrame { reason: String },
}

/// 8 位 HSV 像素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
  pub h: u8,
  pub s: u8,
  pub v: u8,
}

/// RGB 转 8 位 HSV
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
  let (rf, gf, bf) = (r as f32, g as f32, b as f32);
  let max = rf.max(gf).max(bf);
  let min = rf.min(gf).min(bf);
  let diff = max - min;

  let s = if max > 0.0 {
    (255.0 * diff / max).round()
  } else {
    0.0
  };

  let hue_deg = if diff == 0.0 {
    0.0
  } else if max == rf {
    60.0 * (gf - bf) / diff
  } else if max == gf {
    120.0 + 60.0 * (bf - rf) / diff
  } else {
    240.0 + 60.0 * (rf - gf) / diff
  };
  let hue_deg = if hue_deg < 0.0 { hue_deg + 360.0 } else { hue_deg };

  let mut h = (hue_deg / 2.0).round() as u16;
  if h >= 180 {
    h -= 180;
  }

  Hsv {
    h: h as u8,
    s: s as u8,
    v: max as u8,
  }
}

/// 闭区间色相带 [lo, hi]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HueBand {
  pub lo: u8,
  pub hi: u8,
}

impl HueBand {
  pub fn new(lo: u8, hi: u8) -> Self {
    Self { lo, hi }
  }

  #[inline]
  pub fn contains(&self, h: u8) -> bool {
    self.lo <= h && h <= self.hi
  }
}

/// 双色相带红色掩码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedMask {
  pub low: HueBand,
  pub high: HueBand,
  pub min_saturation: u8,
  pub min_value: u8,
}

impl Default for RedMask {
  fn default() -> Self {
    Self {
      low: HueBand::new(0, 10),
      high: HueBand::new(160, 179),
      min_saturation: 100,
      min_value: 100,
    }
  }
}

impl RedMask {
  #[inline]
  pub fn matches(&self, hsv: Hsv) -> bool {
    hsv.s >= self.min_saturation
      && hsv.v >= self.min_value
      && (self.low.contains(hsv.h) || self.high.contains(hsv.h))
  }
}

/// 单帧检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
  /// ROI 中红色像素占比，范围 [0, 1]
  pub ratio: f64,
}

/// 无状态的中心区域检测器
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegionDetector {
  roi: RoiFraction,
  mask: RedMask,
}

impl RegionDetector {
  pub fn new(roi: RoiFraction) -> Self {
    Self {
      roi,
      mask: RedMask::default(),
    }
  }

  pub fn with_mask(mut self, mask: RedMask) -> Self {
    self.mask = mask;
    self
  }

  pub fn roi(&self) -> RoiFraction {
    self.roi
  }

  pub fn detect(&self, frame: &Frame<'_>) -> Result<DetectionResult, DetectorError> {
    frame.validate()?;

    let (x0, x1) = self.roi.pixel_span(frame.width());
    let (y0, y1) = self.roi.pixel_span(frame.height());
    let total = (x1 - x0) as u64 * (y1 - y0) as u64;
    if total == 0 {
      return Ok(DetectionResult { ratio: 0.0 });
    }

    let mut hits = 0u64;
    for y in y0..y1 {
      for x in x0..x1 {
        let (r, g, b) = frame.rgb_at(x, y);
        if self.mask.matches(rgb_to_hsv(r, g, b)) {
          hits += 1;
        }
      }
    }

    Ok(DetectionResult {
      ratio: hits as f64 / total as f64,
    })
  }
}

/// 使用默认红色掩码检测一帧
pub fn detect(frame: &Frame<'_>, roi: RoiFraction) -> Result<DetectionResult, DetectorError> {
  RegionDetector::new(roi).detect(frame)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::PixelLayout;

  const RED: [u8; 3] = [0, 0, 255];
  const GREEN: [u8; 3] = [0, 255, 0];

  fn bgr_frame(width: u32, height: u32, paint: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
      for x in 0..width {
        data.extend_from_slice(&paint(x, y));
      }
    }
    data
  }

  #[test]
  fn test_hsv_primaries() {
    assert_eq!(rgb_to_hsv(255, 0, 0), Hsv { h: 0, s: 255, v: 255 });
    assert_eq!(rgb_to_hsv(0, 255, 0), Hsv { h: 60, s: 255, v: 255 });
    assert_eq!(rgb_to_hsv(0, 0, 255), Hsv { h: 120, s: 255, v: 255 });
    assert_eq!(rgb_to_hsv(128, 128, 128), Hsv { h: 0, s: 0, v: 128 });
    assert_eq!(rgb_to_hsv(0, 0, 0), Hsv { h: 0, s: 0, v: 0 });
  }

  #[test]
  fn test_hsv_magenta_red_wraps_to_high_band() {
    // 色相约 340°，落在高色相带
    let hsv = rgb_to_hsv(255, 0, 85);
    assert_eq!(hsv.h, 170);
    assert!(RedMask::default().matches(hsv));
  }

  #[test]
  fn test_mask_rejects_dark_and_pale_red() {
    let mask = RedMask::default();
    assert!(!mask.matches(rgb_to_hsv(90, 0, 0)));
    assert!(!mask.matches(rgb_to_hsv(255, 200, 200)));
    assert!(!mask.matches(rgb_to_hsv(255, 160, 0)));
  }

  #[test]
  fn test_all_red_is_one() {
    let data = bgr_frame(40, 30, |_, _| RED);
    let frame = Frame::new(40, 30, PixelLayout::Bgr24, &data);
    let result = detect(&frame, RoiFraction::default()).unwrap();
    assert_eq!(result.ratio, 1.0);
  }

  #[test]
  fn test_all_green_is_zero() {
    let data = bgr_frame(40, 30, |_, _| GREEN);
    let frame = Frame::new(40, 30, PixelLayout::Bgr24, &data);
    let result = detect(&frame, RoiFraction::default()).unwrap();
    assert_eq!(result.ratio, 0.0);
  }

  #[test]
  fn test_red_outside_roi_is_ignored() {
    // ROI: x ∈ [40, 60), y ∈ [40, 60)
    let data = bgr_frame(100, 100, |x, y| {
      if (40..60).contains(&x) && (40..60).contains(&y) {
        GREEN
      } else {
        RED
      }
    });
    let frame = Frame::new(100, 100, PixelLayout::Bgr24, &data);
    let result = detect(&frame, RoiFraction::default()).unwrap();
    assert_eq!(result.ratio, 0.0);
  }

  #[test]
  fn test_partial_fill() {
    // ROI 20x20 中左侧 5 列为红色，占比 0.25
    let data = bgr_frame(100, 100, |x, _| if (40..45).contains(&x) { RED } else { GREEN });
    let frame = Frame::new(100, 100, PixelLayout::Bgr24, &data);
    let result = detect(&frame, RoiFraction::default()).unwrap();
    assert_eq!(result.ratio, 0.25);
  }

  #[test]
  fn test_rgba_layout_matches_bgr() {
    let mut data = Vec::new();
    for _ in 0..(10 * 10) {
      data.extend_from_slice(&[255, 0, 0, 255]);
    }
    let frame = Frame::new(10, 10, PixelLayout::Rgba32, &data);
    let result = detect(&frame, RoiFraction::default()).unwrap();
    assert_eq!(result.ratio, 1.0);
  }

  #[test]
  fn test_empty_roi_is_zero() {
    // 1x1 帧的 ROI 为 [0, 0)
    let data = bgr_frame(1, 1, |_, _| RED);
    let frame = Frame::new(1, 1, PixelLayout::Bgr24, &data);
    let result = detect(&frame, RoiFraction::default()).unwrap();
    assert_eq!(result.ratio, 0.0);
  }

  #[test]
  fn test_invalid_frame() {
    let data = vec![0u8; 10];
    let frame = Frame::new(10, 10, PixelLayout::Bgr24, &data);
    assert!(matches!(
      detect(&frame, RoiFraction::default()),
      Err(DetectorError::InvalidFrame { .. })
    ));
  }
}
