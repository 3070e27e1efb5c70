// 该文件是 CogCoach 项目的一部分。
// src/config.rs - 任务配置
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

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("阈值必须在 (0, 1) 之间: {0}")]
  ThresholdOutOfRange(f64),
  #[error("超时时间必须大于零")]
  ZeroTimeout,
  #[error("无效的 ROI 比例: [{start}, {end})")]
  InvalidRoi { start: f64, end: f64 },
}

/// 中心感兴趣区域，两个轴使用相同的比例区间 [start, end)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiFraction {
  start: f64,
  end: f64,
}

impl Default for RoiFraction {
  fn default() -> Self {
    Self {
      start: 0.4,
      end: 0.6,
    }
  }
}

impl RoiFraction {
  pub fn new(start: f64, end: f64) -> Result<Self, ConfigError> {
    if !(0.0..1.0).contains(&start) || !(start < end && end <= 1.0) {
      return Err(ConfigError::InvalidRoi { start, end });
    }
    Ok(Self { start, end })
  }

  pub fn start(&self) -> f64 {
    self.start
  }

  pub fn end(&self) -> f64 {
    self.end
  }

  /// 把比例区间换算成某个轴上的像素区间 [lo, hi)
  pub fn pixel_span(&self, extent: u32) -> (u32, u32) {
    let lo = (extent as f64 * self.start) as u32;
    let hi = (extent as f64 * self.end) as u32;
    (lo.min(extent), hi.min(extent))
  }
}

/// 单次任务调用的配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskConfig {
  threshold: f64,
  timeout: Duration,
  roi: RoiFraction,
}

impl TaskConfig {
  pub fn new(threshold: f64, timeout: Duration) -> Result<Self, ConfigError> {
    if !(threshold > 0.0 && threshold < 1.0) {
      return Err(ConfigError::ThresholdOutOfRange(threshold));
    }
    if timeout.is_zero() {
      return Err(ConfigError::ZeroTimeout);
    }
    Ok(Self {
      threshold,
      timeout,
      roi: RoiFraction::default(),
    })
  }

  pub fn with_roi(mut self, roi: RoiFraction) -> Self {
    self.roi = roi;
    self
  }

  pub fn threshold(&self) -> f64 {
    self.threshold
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  pub fn roi(&self) -> RoiFraction {
    self.roi
  }
}
