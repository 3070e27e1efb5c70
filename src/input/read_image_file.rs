// 该文件是 CogCoach 项目的一部分。
// src/input/read_image_file.rs - 静态图像轮询输入
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

use std::{
  thread,
  time::{Duration, Instant},
};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use super::{FrameSource, PollingSource, SourceError};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, PixelLayout},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Invalid query parameter {key}={value}")]
  InvalidParameter { key: String, value: String },
}

/// 以固定帧率重复投递同一张图片，模拟摄像头
pub struct ImageFileInput {
  path: String,
  frame_interval: Option<Duration>,
  frame_limit: Option<u64>,
  image: Option<RgbImage>,
  delivered: u64,
  last_delivery: Option<Instant>,
}

impl ImageFileInput {
  pub fn new(path: &str) -> Self {
    Self {
      path: path.to_string(),
      frame_interval: None,
      frame_limit: None,
      image: None,
      delivered: 0,
      last_delivery: None,
    }
  }

  pub fn with_fps(mut self, fps: f64) -> Self {
    self.frame_interval = (fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps));
    self
  }

  /// 投递指定帧数后结束帧流
  pub fn with_frame_limit(mut self, frames: u64) -> Self {
    self.frame_limit = Some(frames);
    self
  }

  fn pace(&mut self) {
    if let (Some(interval), Some(last)) = (self.frame_interval, self.last_delivery) {
      let elapsed = last.elapsed();
      if elapsed < interval {
        thread::sleep(interval - elapsed);
      }
    }
    self.last_delivery = Some(Instant::now());
  }
}

impl FrameSource for ImageFileInput {
  fn start(&mut self) -> Result<(), SourceError> {
    let image = ImageReader::open(&self.path)
      .map_err(|e| SourceError::Unavailable(format!("无法打开图像 {}: {}", self.path, e)))?
      .decode()
      .map_err(|e| SourceError::Unavailable(format!("无法解码图像 {}: {}", self.path, e)))?;
    let image = image.into_rgb8();
    info!(
      "图像输入已加载: {} ({}x{})",
      self.path,
      image.width(),
      image.height()
    );
    self.image = Some(image);
    self.delivered = 0;
    self.last_delivery = None;
    Ok(())
  }

  fn stop(&mut self) -> Result<(), SourceError> {
    self.image = None;
    Ok(())
  }
}

impl PollingSource for ImageFileInput {
  fn next_frame(&mut self) -> Option<Frame<'_>> {
    if self.image.is_none() {
      error!("图像输入未启动");
      return None;
    }
    if self.frame_limit.is_some_and(|limit| self.delivered >= limit) {
      return None;
    }
    self.pace();
    self.delivered += 1;

    let image = self.image.as_ref()?;
    Some(Frame::new(
      image.width(),
      image.height(),
      PixelLayout::Rgb24,
      image.as_raw(),
    ))
  }
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let invalid = |key: &str, value: &str| ImageFileInputError::InvalidParameter {
      key: key.to_string(),
      value: value.to_string(),
    };

    let mut input = ImageFileInput::new(url.path()).with_fps(30.0);
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "fps" => {
          let fps = value.parse::<f64>().map_err(|_| invalid(&key, &value))?;
          input = input.with_fps(fps);
        }
        "frames" => {
          let frames = value.parse::<u64>().map_err(|_| invalid(&key, &value))?;
          input = input.with_frame_limit(frames);
        }
        _ => {}
      }
    }
    Ok(input)
  }
}
