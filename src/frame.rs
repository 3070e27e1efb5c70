// 该文件是 CogCoach 项目的一部分。
// src/frame.rs - 帧定义
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

use crate::detector::DetectorError;

/// 像素排布
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLayout {
  /// 8 位 B、G、R 交错
  Bgr24,
  /// 8 位 R、G、B 交错
  Rgb24,
  /// 8 位 R、G、B、A 交错
  Rgba32,
  /// 8 位 B、G、R、A（或 X）交错
  Bgra32,
}

impl PixelLayout {
  pub fn bytes_per_pixel(&self) -> usize {
    match self {
      PixelLayout::Bgr24 | PixelLayout::Rgb24 => 3,
      PixelLayout::Rgba32 | PixelLayout::Bgra32 => 4,
    }
  }

  /// 从单个像素切片中取出 (R, G, B)
  #[inline]
  pub fn rgb(&self, pixel: &[u8]) -> (u8, u8, u8) {
    match self {
      PixelLayout::Bgr24 | PixelLayout::Bgra32 => (pixel[2], pixel[1], pixel[0]),
      PixelLayout::Rgb24 | PixelLayout::Rgba32 => (pixel[0], pixel[1], pixel[2]),
    }
  }
}

/// 一帧图像
///
/// 像素数据只在产生它的回调或轮询调用期间有效，
/// 后端可能在返回后立即复用底层存储，因此帧只借用缓冲区。
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
  width: u32,
  height: u32,
  layout: PixelLayout,
  data: &'a [u8],
}

impl<'a> Frame<'a> {
  /// 创建帧，不做尺寸校验；校验交给 [`Frame::validate`]。
  pub fn new(width: u32, height: u32, layout: PixelLayout, data: &'a [u8]) -> Self {
    Self {
      width,
      height,
      layout,
      data,
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn layout(&self) -> PixelLayout {
    self.layout
  }

  pub fn data(&self) -> &'a [u8] {
    self.data
  }

  /// 宽 × 高 × 每像素字节数；溢出时返回 `None`
  pub fn expected_len(&self) -> Option<usize> {
    (self.width as usize)
      .checked_mul(self.height as usize)?
      .checked_mul(self.layout.bytes_per_pixel())
  }

  /// 校验宽高非零，且缓冲区长度等于 宽 × 高 × 每像素字节数
  pub fn validate(&self) -> Result<(), DetectorError> {
    if self.width == 0 || self.height == 0 {
      return Err(DetectorError::InvalidFrame {
        reason: format!("帧尺寸为零: {}x{}", self.width, self.height),
      });
    }
    let expected = self.expected_len().ok_or_else(|| DetectorError::InvalidFrame {
      reason: format!("帧尺寸溢出: {}x{}", self.width, self.height),
    })?;
    if self.data.len() != expected {
      return Err(DetectorError::InvalidFrame {
        reason: format!(
          "数据长度不匹配: 期望长度 {}, 实际长度 {}",
          expected,
          self.data.len()
        ),
      });
    }
    Ok(())
  }

  /// 读取 (x, y) 处像素的 (R, G, B)，调用方需保证帧已通过校验
  #[inline]
  pub fn rgb_at(&self, x: u32, y: u32) -> (u8, u8, u8) {
    let bpp = self.layout.bytes_per_pixel();
    let offset = (y as usize * self.width as usize + x as usize) * bpp;
    self.layout.rgb(&self.data[offset..offset + bpp])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bytes_per_pixel() {
    assert_eq!(PixelLayout::Bgr24.bytes_per_pixel(), 3);
    assert_eq!(PixelLayout::Rgb24.bytes_per_pixel(), 3);
    assert_eq!(PixelLayout::Rgba32.bytes_per_pixel(), 4);
    assert_eq!(PixelLayout::Bgra32.bytes_per_pixel(), 4);
  }

  #[test]
  fn test_channel_order() {
    let px = [10u8, 20, 30, 255];
    assert_eq!(PixelLayout::Bgr24.rgb(&px), (30, 20, 10));
    assert_eq!(PixelLayout::Rgb24.rgb(&px), (10, 20, 30));
    assert_eq!(PixelLayout::Rgba32.rgb(&px), (10, 20, 30));
    assert_eq!(PixelLayout::Bgra32.rgb(&px), (30, 20, 10));
  }

  #[test]
  fn test_validate_accepts_well_formed_frame() {
    let data = vec![0u8; 4 * 2 * 3];
    let frame = Frame::new(4, 2, PixelLayout::Bgr24, &data);
    assert!(frame.validate().is_ok());
  }

  #[test]
  fn test_validate_rejects_length_mismatch() {
    let data = vec![0u8; 4 * 2 * 3 - 1];
    let frame = Frame::new(4, 2, PixelLayout::Bgr24, &data);
    assert!(matches!(
      frame.validate(),
      Err(DetectorError::InvalidFrame { .. })
    ));
  }

  #[test]
  fn test_validate_rejects_zero_dimension() {
    let data: Vec<u8> = Vec::new();
    let frame = Frame::new(0, 2, PixelLayout::Rgba32, &data);
    assert!(frame.validate().is_err());
  }

  #[test]
  fn test_validate_rejects_overflowing_dimensions() {
    let frame = Frame::new(u32::MAX, u32::MAX, PixelLayout::Rgba32, &[]);
    assert_eq!(frame.expected_len(), None);
    assert!(matches!(
      frame.validate(),
      Err(DetectorError::InvalidFrame { .. })
    ));
  }

  #[test]
  fn test_rgb_at() {
    // 2x1 RGBA: 红、蓝
    let data = [255u8, 0, 0, 255, 0, 0, 255, 255];
    let frame = Frame::new(2, 1, PixelLayout::Rgba32, &data);
    assert_eq!(frame.rgb_at(0, 0), (255, 0, 0));
    assert_eq!(frame.rgb_at(1, 0), (0, 0, 255));
  }
}
