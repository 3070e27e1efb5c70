// 该文件是 CogCoach 项目的一部分。
// src/input/v4l2_input.rs - V4L2 摄像头轮询输入
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

use std::pin::Pin;

use thiserror::Error;
use tracing::{error, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{FrameSource, PollingSource, SourceError};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, PixelLayout},
};

#[derive(Error, Debug)]
pub enum V4l2InputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Invalid query parameter {key}={value}")]
  InvalidParameter { key: String, value: String },
}

/// 只保留最新一帧
const BUFFER_COUNT: u32 = 1;

/// V4L2 摄像头输入源（YUYV 采集，转换为 RGB 后交给引擎）
///
/// 由于 v4l 库的 Stream 需要引用 Device，我们使用 Pin<Box<Device>> 来保证
/// Device 的内存地址稳定，从而可以安全地创建引用它的 Stream。
pub struct V4l2Input {
  device_path: String,
  width: u32,
  height: u32,
  /// 捕获流（必须先于 device 释放）
  stream: Option<Stream<'static>>,
  device: Option<Pin<Box<Device>>>,
  /// 复用的 RGB 缓冲区，帧只借用它
  rgb: Vec<u8>,
}

impl V4l2Input {
  pub fn new(device_path: &str, width: u32, height: u32) -> Self {
    Self {
      device_path: device_path.to_string(),
      width,
      height,
      stream: None,
      device: None,
      rgb: Vec::new(),
    }
  }

  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], rgb: &mut Vec<u8>) {
    rgb.clear();

    for chunk in yuyv.chunks_exact(4) {
      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }
  }

  fn open(&mut self) -> std::io::Result<()> {
    let device = Box::pin(Device::with_path(&self.device_path)?);

    let mut format = device.format()?;
    format.width = self.width;
    format.height = self.height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("设备不支持 YUYV，协商结果为 {}", format.fourcc),
      ));
    }
    self.width = format.width;
    self.height = format.height;

    // SAFETY: device 被 Pin<Box> 固定在堆上，不会移动；
    // stream 总是先于 device 被释放（见 stop 与字段顺序）。
    let device_ref: &Device = &device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, BUFFER_COUNT)?
    };

    self.device = Some(device);
    self.stream = Some(stream);
    Ok(())
  }
}

impl FrameSource for V4l2Input {
  fn start(&mut self) -> Result<(), SourceError> {
    if self.stream.is_some() {
      return Ok(());
    }
    self.open().map_err(|e| {
      self.stop_inner();
      SourceError::Unavailable(format!("无法打开设备 {}: {}", self.device_path, e))
    })?;
    info!(
      "V4L2 设备已启动: {} ({}x{})",
      self.device_path, self.width, self.height
    );
    Ok(())
  }

  fn stop(&mut self) -> Result<(), SourceError> {
    if self.stop_inner() {
      info!("V4L2 设备已关闭: {}", self.device_path);
    }
    Ok(())
  }
}

impl V4l2Input {
  fn stop_inner(&mut self) -> bool {
    let was_open = self.device.is_some();
    self.stream.take();
    self.device.take();
    was_open
  }
}

impl PollingSource for V4l2Input {
  fn next_frame(&mut self) -> Option<Frame<'_>> {
    let stream = self.stream.as_mut()?;

    match stream.next() {
      Ok((buffer, _meta)) => {
        Self::yuyv_to_rgb(buffer, &mut self.rgb);
        Some(Frame::new(
          self.width,
          self.height,
          PixelLayout::Rgb24,
          &self.rgb,
        ))
      }
      Err(e) => {
        error!("无法捕获帧: {}", e);
        None
      }
    }
  }
}

impl Drop for V4l2Input {
  fn drop(&mut self) {
    self.stop_inner();
  }
}

impl FromUrlWithScheme for V4l2Input {
  const SCHEME: &'static str = "v4l2";
}

impl FromUrl for V4l2Input {
  type Error = V4l2InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(V4l2InputError::SchemeMismatch);
    }

    // v4l2:///dev/video0?width=640&height=480
    let device_path = if url.path().is_empty() || url.path() == "/" {
      super::DEFAULT_CAMERA_DEVICE.to_string()
    } else {
      url.path().to_string()
    };

    let mut width = 640;
    let mut height = 480;
    for (key, value) in url.query_pairs() {
      let target = match key.as_ref() {
        "width" => &mut width,
        "height" => &mut height,
        _ => continue,
      };
      *target = value
        .parse::<u32>()
        .map_err(|_| V4l2InputError::InvalidParameter {
          key: key.to_string(),
          value: value.to_string(),
        })?;
    }

    Ok(V4l2Input::new(&device_path, width, height))
  }
}
