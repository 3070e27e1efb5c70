// 该文件是 CogCoach 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 回调输入
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

//! # GStreamer 视频输入模块
//!
//! 管道末端是 `appsink`（`max-buffers=1 drop=true`），只保留最新一帧。
//! 每个样本在 GStreamer 流线程上通过 `new-sample` 回调投递给注册的处理函数；
//! 总线上的错误或 EOS 只投递一次 [`Delivery::Error`]。
//!
//! 样本行步长与 `宽 × 每像素字节数` 相同时直接借用映射后的缓冲区（零拷贝），
//! 否则先按行压实到临时缓冲区。
//!
//! ## URL 格式
//!
//! - `gst://camera/dev/video0?width=1280&height=720&fps=30&convert=nvvidconv`
//! - `gst://argus?width=1280&height=720&fps=30`
//! - `gst://file/path/to/video.mp4`
//! - `gst://deepstream/dev/video0?width=1280&height=720&fps=30`
//! - `gst://test?frames=90&pattern=red`
//!
//! DeepStream 管道经 `nvstreammux` 批处理后由 `nvvideoconvert` 输出系统内存中的 RGBA，
//! appsink 的 caps 不带 `memory:NVMM`，缓冲区可以直接在 CPU 上映射。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use super::{CallbackSource, ContinueSignal, Delivery, FrameHandler, FrameSource, SourceError};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, PixelLayout},
};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format: {0}")]
  UnsupportedFormat(String),
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
}

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  /// Jetson CSI 摄像头，输出 NVMM 内存中的 NV12
  ArgusSource {
    width: u32,
    height: u32,
    fps: u32,
  },
  /// DeepStream 批处理，单路实时源
  StreamMux {
    width: u32,
    height: u32,
  },
  /// `videotestsrc`，实时 30fps，投递指定帧数后 EOS
  TestSource {
    frames: u32,
    pattern: String,
  },
  Converter(String),
  TargetFormat {
    format: String,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        width,
        height,
        fps,
      } => format!(
        "v4l2src device={} ! video/x-raw,width={},height={},framerate={}/1",
        camera, width, height, fps
      ),
      GStreamerInputBuilderItem::ArgusSource { width, height, fps } => format!(
        "nvarguscamerasrc ! video/x-raw(memory:NVMM),width={},height={},framerate={}/1,format=NV12",
        width, height, fps
      ),
      GStreamerInputBuilderItem::StreamMux { width, height } => format!(
        "video/x-raw(memory:NVMM),format=NV12 ! queue ! mux.sink_0 nvstreammux name=mux batch-size=1 width={} height={} live-source=1",
        width, height
      ),
      GStreamerInputBuilderItem::TestSource { frames, pattern } => format!(
        "videotestsrc is-live=true num-buffers={} pattern={} ! video/x-raw,framerate=30/1",
        frames, pattern
      ),
      GStreamerInputBuilderItem::Converter(element) => element.clone(),
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 输入管道构建器
///
/// ```no_run
/// use cogcoach::input::GStreamerInputPipelineBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let input = GStreamerInputPipelineBuilder::new()
///     .camera("/dev/video0", 1280, 720, 30)
///     .converter("videoconvert")
///     .target_format("BGR")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
}

impl GStreamerInputPipelineBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn camera(mut self, camera: &str, width: u32, height: u32, fps: u32) -> Self {
    self.items.push(GStreamerInputBuilderItem::CameraSource {
      camera: camera.to_string(),
      width,
      height,
      fps,
    });
    self
  }

  pub fn argus(mut self, width: u32, height: u32, fps: u32) -> Self {
    self
      .items
      .push(GStreamerInputBuilderItem::ArgusSource { width, height, fps });
    self
  }

  /// USB 摄像头经 DeepStream 批处理，输出 RGBA
  pub fn deepstream(self, camera: &str, width: u32, height: u32, fps: u32) -> Self {
    let mut builder = self
      .camera(camera, width, height, fps)
      .converter("nvvideoconvert");
    builder
      .items
      .push(GStreamerInputBuilderItem::StreamMux { width, height });
    builder.converter("nvvideoconvert").target_format("RGBA")
  }

  pub fn test_source(mut self, frames: u32, pattern: &str) -> Self {
    self.items.push(GStreamerInputBuilderItem::TestSource {
      frames,
      pattern: pattern.to_string(),
    });
    self
  }

  pub fn file(mut self, path: &str) -> Self {
    self
      .items
      .push(GStreamerInputBuilderItem::FileSource(path.to_string()));
    self
  }

  pub fn converter(mut self, element: &str) -> Self {
    self
      .items
      .push(GStreamerInputBuilderItem::Converter(element.to_string()));
    self
  }

  pub fn target_format(mut self, format: &str) -> Self {
    self.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: format.to_string(),
    });
    self
  }

  /// 当前 GStreamer 注册表中是否有指定元素
  pub fn element_available(factory: &str) -> bool {
    gst::init().is_ok() && gst::ElementFactory::find(factory).is_some()
  }

  /// 当前 GStreamer 注册表中是否有 CSI 摄像头元素
  pub fn argus_available() -> bool {
    Self::element_available("nvarguscamerasrc")
  }

  pub fn description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink name=sink max-buffers=1 drop=true sync=false",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.description();
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      finished: Arc::new(AtomicBool::new(false)),
      running: false,
    })
  }

  fn query_u32(
    query: &HashMap<String, String>,
    key: &str,
    default: u32,
  ) -> Result<u32, GStreamerInputError> {
    match query.get(key) {
      Some(value) => value
        .parse::<u32>()
        .map_err(|_| GStreamerInputError::PipelineError(format!("invalid {}={}", key, value))),
      None => Ok(default),
    }
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let width = Self::query_u32(&query, "width", 1280)?;
    let height = Self::query_u32(&query, "height", 720)?;
    let fps = Self::query_u32(&query, "fps", 30)?;
    let format = query.get("format").map(String::as_str).unwrap_or("BGR");

    let builder = match url.host_str() {
      Some("camera") => {
        let convert = query
          .get("convert")
          .map(String::as_str)
          .unwrap_or("videoconvert");
        Self::new()
          .camera(url.path(), width, height, fps)
          .converter(convert)
      }
      Some("argus") => Self::new().argus(width, height, fps).converter("nvvidconv"),
      Some("file") => Self::new().file(url.path()).converter("videoconvert"),
      // 输出格式固定为 RGBA
      Some("deepstream") => return Ok(Self::new().deepstream(url.path(), width, height, fps)),
      Some("test") => {
        let frames = Self::query_u32(&query, "frames", 90)?;
        let pattern = query.get("pattern").map(String::as_str).unwrap_or("red");
        Self::new().test_source(frames, pattern)
      }
      _ => return Err(GStreamerInputError::SchemeMismatch),
    };

    Ok(builder.target_format(format))
  }
}

/// GStreamer 视频输入
///
/// 管道在 [`FrameSource::start`] 中进入 Playing，在 [`FrameSource::stop`] 或 Drop 时回到 Null。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  /// 处理函数要求停止或已投递错误后置位，之后不再投递
  finished: Arc<AtomicBool>,
  running: bool,
}

/// 启动时等待管道进入 Playing 的最长时间
const START_TIMEOUT_SECS: u64 = 5;

impl GStreamerInput {
  fn install_callbacks(&self, handler: Arc<Mutex<FrameHandler>>) {
    let sample_handler = handler.clone();
    let finished = self.finished.clone();
    self.appsink.set_callbacks(
      gst_app::AppSinkCallbacks::builder()
        .new_sample(move |appsink| {
          if finished.load(Ordering::SeqCst) {
            return Err(gst::FlowError::Eos);
          }
          let sample = appsink.pull_sample().map_err(|e| {
            error!("Failed to pull sample: {}", e);
            gst::FlowError::Error
          })?;

          let signal = with_sample_frame(&sample, |delivery| {
            let mut handler = sample_handler.lock().unwrap_or_else(|e| e.into_inner());
            (*handler)(delivery)
          });
          if signal == ContinueSignal::Stop {
            finished.store(true, Ordering::SeqCst);
            return Err(gst::FlowError::Eos);
          }
          Ok(gst::FlowSuccess::Ok)
        })
        .build(),
    );

    if let Some(bus) = self.pipeline.bus() {
      let finished = self.finished.clone();
      bus.unset_sync_handler();
      bus.set_sync_handler(move |_, message| {
        let error = match message.view() {
          gst::MessageView::Error(err) => Some(format!(
            "{} ({:?})",
            err.error(),
            err.debug()
          )),
          gst::MessageView::Eos(..) => Some("end of stream".to_string()),
          _ => None,
        };
        if let Some(reason) = error {
          if !finished.swap(true, Ordering::SeqCst) {
            warn!("GStreamer 管道结束: {}", reason);
            let mut handler = handler.lock().unwrap_or_else(|e| e.into_inner());
            (*handler)(Delivery::Error(SourceError::StreamEnded(reason)));
          }
        }
        gst::BusSyncReply::Pass
      });
    }
  }
}

/// 把样本映射为帧并交给 `deliver`；单个样本映射失败只记录，继续接收后续样本
fn with_sample_frame<F>(sample: &gst::Sample, deliver: F) -> ContinueSignal
where
  F: FnOnce(Delivery<'_>) -> ContinueSignal,
{
  match map_sample(sample) {
    Ok((video_info, map)) => {
      let layout = match pixel_layout(video_info.format()) {
        Ok(layout) => layout,
        Err(e) => {
          error!("Failed to fetch sample: {}", e);
          return ContinueSignal::Continue;
        }
      };
      let width = video_info.width();
      let height = video_info.height();
      let row_bytes = width as usize * layout.bytes_per_pixel();
      let stride = video_info.stride()[0] as usize;
      let data = map.as_slice();

      if stride == row_bytes {
        let len = (row_bytes * height as usize).min(data.len());
        deliver(Delivery::Frame(Frame::new(
          width,
          height,
          layout,
          &data[..len],
        )))
      } else {
        let packed = compact_rows(data, stride, row_bytes, height as usize);
        deliver(Delivery::Frame(Frame::new(width, height, layout, &packed)))
      }
    }
    Err(e) => {
      error!("Failed to fetch sample: {}", e);
      ContinueSignal::Continue
    }
  }
}

fn map_sample(
  sample: &gst::Sample,
) -> Result<
  (
    gst_video::VideoInfo,
    gst::BufferMap<'_, gst::buffer::Readable>,
  ),
  GStreamerInputError,
> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;

  Ok((video_info, map))
}

fn pixel_layout(format: gst_video::VideoFormat) -> Result<PixelLayout, GStreamerInputError> {
  match format {
    gst_video::VideoFormat::Bgr => Ok(PixelLayout::Bgr24),
    gst_video::VideoFormat::Rgb => Ok(PixelLayout::Rgb24),
    gst_video::VideoFormat::Rgba | gst_video::VideoFormat::Rgbx => Ok(PixelLayout::Rgba32),
    gst_video::VideoFormat::Bgra | gst_video::VideoFormat::Bgrx => Ok(PixelLayout::Bgra32),
    other => Err(GStreamerInputError::UnsupportedFormat(format!(
      "{:?}",
      other
    ))),
  }
}

/// 去掉每行末尾的对齐填充
fn compact_rows(data: &[u8], stride: usize, row_bytes: usize, height: usize) -> Vec<u8> {
  let mut packed = Vec::with_capacity(row_bytes * height);
  for row in data.chunks(stride).take(height) {
    packed.extend_from_slice(&row[..row_bytes.min(row.len())]);
  }
  packed
}

impl CallbackSource for GStreamerInput {
  fn set_handler(&mut self, handler: FrameHandler) {
    self.install_callbacks(Arc::new(Mutex::new(handler)));
  }
}

impl FrameSource for GStreamerInput {
  fn start(&mut self) -> Result<(), SourceError> {
    if self.running {
      return Ok(());
    }
    self.finished.store(false, Ordering::SeqCst);

    self.pipeline.set_state(gst::State::Playing).map_err(|e| {
      let _ = self.pipeline.set_state(gst::State::Null);
      SourceError::Unavailable(format!("无法启动 GStreamer 管道: {}", e))
    })?;

    let (result, state, _) = self
      .pipeline
      .state(gst::ClockTime::from_seconds(START_TIMEOUT_SECS));
    if let Err(e) = result {
      let _ = self.pipeline.set_state(gst::State::Null);
      return Err(SourceError::Unavailable(format!(
        "GStreamer 管道未能进入 Playing（当前 {:?}）: {}",
        state, e
      )));
    }

    self.running = true;
    info!("GStreamer 管道已启动");
    Ok(())
  }

  fn stop(&mut self) -> Result<(), SourceError> {
    self.finished.store(true, Ordering::SeqCst);
    if !self.running {
      return Ok(());
    }
    self.running = false;

    if let Some(bus) = self.pipeline.bus() {
      bus.unset_sync_handler();
    }
    self
      .pipeline
      .set_state(gst::State::Null)
      .map_err(|e| SourceError::StreamEnded(format!("Failed to stop GStreamer pipeline: {}", e)))?;
    info!("GStreamer 管道已停止");
    Ok(())
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}
