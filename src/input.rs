// 该文件是 CogCoach 项目的一部分。
// src/input.rs - 帧源
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

use thiserror::Error;
use tracing::{info, warn};

use crate::{FromUrl, frame::Frame};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "v4l2_input")]
mod v4l2_input;
#[cfg(feature = "v4l2_input")]
pub use self::v4l2_input::{V4l2Input, V4l2InputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInput, GStreamerInputBuilderItem, GStreamerInputError, GStreamerInputPipelineBuilder,
};

#[derive(Error, Debug)]
pub enum SourceError {
  #[error("没有可用的采集设备: {0}")]
  Unavailable(String),
  #[error("帧流意外结束: {0}")]
  StreamEnded(String),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "v4l2_input")]
  #[error("V4L2 输入错误: {0}")]
  V4l2InputError(#[from] V4l2InputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
}

/// 回调返回值，告诉帧源是否继续投递
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueSignal {
  Continue,
  Stop,
}

/// 回调式帧源投递给处理函数的内容
#[derive(Debug)]
pub enum Delivery<'a> {
  Frame(Frame<'a>),
  /// 流中途失败，只投递一次
  Error(SourceError),
}

pub type FrameHandler = Box<dyn for<'a> FnMut(Delivery<'a>) -> ContinueSignal + Send + 'static>;

/// 所有帧源共有的生命周期
pub trait FrameSource {
  /// 启动设备或管道，无设备响应时返回 [`SourceError::Unavailable`]
  fn start(&mut self) -> Result<(), SourceError>;

  /// 停止投递并释放资源，可重复调用
  fn stop(&mut self) -> Result<(), SourceError>;
}

/// 轮询式帧源：阻塞直到下一帧就绪，流结束或失败时返回 `None`
pub trait PollingSource: FrameSource {
  fn next_frame(&mut self) -> Option<Frame<'_>>;
}

/// 回调式帧源：内部事件循环每帧调用一次处理函数
pub trait CallbackSource: FrameSource {
  /// 在 [`FrameSource::start`] 之前注册处理函数
  fn set_handler(&mut self, handler: FrameHandler);
}

/// 两种投递模型之一的帧源引用
pub enum AnySource<'a> {
  Polling(&'a mut dyn PollingSource),
  Callback(&'a mut dyn CallbackSource),
}

pub enum InputWrapper {
  #[cfg(feature = "v4l2_input")]
  V4l2(V4l2Input),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerInput),
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileInput),
}

impl InputWrapper {
  pub fn as_source(&mut self) -> AnySource<'_> {
    match self {
      #[cfg(feature = "v4l2_input")]
      InputWrapper::V4l2(input) => AnySource::Polling(input),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => AnySource::Callback(input),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => AnySource::Polling(input),
    }
  }
}

const AUTO_SCHEME: &str = "auto";

impl FromUrl for InputWrapper {
  type Error = SourceError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() == AUTO_SCHEME {
      return probe();
    }
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamer(input));
      }
    }
    #[cfg(feature = "v4l2_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == V4l2Input::SCHEME {
        return Ok(InputWrapper::V4l2(V4l2Input::from_url(url)?));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        return Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?));
      }
    }
    Err(SourceError::SchemeMismatch)
  }
}

/// 探测链中的一个候选后端
pub struct Candidate<T> {
  pub name: &'static str,
  /// 前置资源是否存在
  pub available: fn() -> bool,
  pub build: fn() -> Result<T, SourceError>,
}

/// 选择第一个前置资源存在且构建成功的后端；都不可用时返回 [`SourceError::Unavailable`]
pub fn select_first<T>(candidates: &[Candidate<T>]) -> Result<T, SourceError> {
  for candidate in candidates {
    if !(candidate.available)() {
      warn!("输入后端不可用: {}", candidate.name);
      continue;
    }
    match (candidate.build)() {
      Ok(input) => {
        info!("选用输入后端: {}", candidate.name);
        return Ok(input);
      }
      Err(e) => warn!("输入后端构建失败: {}: {}", candidate.name, e),
    }
  }
  Err(SourceError::Unavailable(
    "未探测到任何可用的采集设备".to_string(),
  ))
}

pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

#[cfg(any(feature = "v4l2_input", feature = "gstreamer_input"))]
fn camera_device_present() -> bool {
  std::path::Path::new(DEFAULT_CAMERA_DEVICE).exists()
}

#[cfg(feature = "gstreamer_input")]
fn gstreamer_camera_present() -> bool {
  camera_device_present() && GStreamerInputPipelineBuilder::element_available("v4l2src")
}

/// 按环境探测可用的采集后端
///
/// 顺序: GStreamer USB 摄像头、V4L2 直连、GStreamer CSI 摄像头。
/// 设备文件存在但 GStreamer 运行时缺少 `v4l2src` 或管道构建失败时，回退到 V4L2 直连。
pub fn probe() -> Result<InputWrapper, SourceError> {
  let candidates: Vec<Candidate<InputWrapper>> = vec![
    #[cfg(feature = "gstreamer_input")]
    Candidate {
      name: "gstreamer-camera",
      available: gstreamer_camera_present,
      build: || {
        let input = GStreamerInputPipelineBuilder::new()
          .camera(DEFAULT_CAMERA_DEVICE, 1280, 720, 30)
          .converter("videoconvert")
          .target_format("BGR")
          .build()?;
        Ok(InputWrapper::GStreamer(input))
      },
    },
    #[cfg(feature = "v4l2_input")]
    Candidate {
      name: "v4l2",
      available: camera_device_present,
      build: || {
        Ok(InputWrapper::V4l2(V4l2Input::new(
          DEFAULT_CAMERA_DEVICE,
          640,
          480,
        )))
      },
    },
    #[cfg(feature = "gstreamer_input")]
    Candidate {
      name: "gstreamer-argus",
      available: GStreamerInputPipelineBuilder::argus_available,
      build: || {
        let input = GStreamerInputPipelineBuilder::new()
          .argus(1280, 720, 30)
          .converter("nvvidconv")
          .target_format("BGR")
          .build()?;
        Ok(InputWrapper::GStreamer(input))
      },
    },
  ];

  select_first(&candidates)
}
