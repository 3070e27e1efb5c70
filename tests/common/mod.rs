// 该文件是 CogCoach 项目的一部分。
// tests/common/mod.rs - 测试用帧源
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

#![allow(dead_code)]

use std::{
  collections::VecDeque,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  thread::{self, JoinHandle},
  time::Duration,
};

use cogcoach::{
  engine::ManualClock,
  frame::{Frame, PixelLayout},
  input::{
    CallbackSource, ContinueSignal, Delivery, FrameHandler, FrameSource, PollingSource,
    SourceError,
  },
};

pub const WIDTH: u32 = 100;
pub const HEIGHT: u32 = 100;

/// 100x100 BGR 帧，中心 20x20 ROI 中按行优先涂红 `ratio × 400` 个像素，其余为绿色
pub fn frame_with_ratio(ratio: f64) -> Vec<u8> {
  let red_pixels = (ratio * 400.0).round() as usize;
  let mut data = Vec::with_capacity((WIDTH * HEIGHT * 3) as usize);
  for y in 0..HEIGHT {
    for x in 0..WIDTH {
      let in_roi = (40..60).contains(&x) && (40..60).contains(&y);
      let roi_index = ((y.saturating_sub(40)) * 20 + x.saturating_sub(40)) as usize;
      if in_roi && roi_index < red_pixels {
        data.extend_from_slice(&[0, 0, 255]);
      } else {
        data.extend_from_slice(&[0, 255, 0]);
      }
    }
  }
  data
}

#[derive(Clone, Copy)]
pub enum Step {
  Frame { ratio: f64, advance: Duration },
  Corrupt { advance: Duration },
}

/// 按脚本投递帧的轮询帧源；每次投递前推进手动时钟
pub struct ScriptedPollingSource {
  steps: VecDeque<Step>,
  tail: Option<Step>,
  clock: Option<ManualClock>,
  pace: Option<Duration>,
  unavailable: bool,
  current: Vec<u8>,
  stops: Arc<AtomicUsize>,
}

impl ScriptedPollingSource {
  pub fn new() -> Self {
    Self {
      steps: VecDeque::new(),
      tail: None,
      clock: None,
      pace: None,
      unavailable: false,
      current: Vec::new(),
      stops: Arc::new(AtomicUsize::new(0)),
    }
  }

  pub fn with_clock(mut self, clock: ManualClock) -> Self {
    self.clock = Some(clock);
    self
  }

  /// 每帧之前真实休眠
  pub fn with_pace(mut self, pace: Duration) -> Self {
    self.pace = Some(pace);
    self
  }

  pub fn frames(mut self, count: usize, ratio: f64, advance: Duration) -> Self {
    for _ in 0..count {
      self.steps.push_back(Step::Frame { ratio, advance });
    }
    self
  }

  pub fn corrupt(mut self, advance: Duration) -> Self {
    self.steps.push_back(Step::Corrupt { advance });
    self
  }

  /// 脚本用完后无限重复
  pub fn forever(mut self, ratio: f64, advance: Duration) -> Self {
    self.tail = Some(Step::Frame { ratio, advance });
    self
  }

  pub fn unavailable(mut self) -> Self {
    self.unavailable = true;
    self
  }

  pub fn stop_counter(&self) -> Arc<AtomicUsize> {
    self.stops.clone()
  }
}

impl FrameSource for ScriptedPollingSource {
  fn start(&mut self) -> Result<(), SourceError> {
    if self.unavailable {
      return Err(SourceError::Unavailable("scripted".to_string()));
    }
    Ok(())
  }

  fn stop(&mut self) -> Result<(), SourceError> {
    self.stops.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

impl PollingSource for ScriptedPollingSource {
  fn next_frame(&mut self) -> Option<Frame<'_>> {
    let step = self.steps.pop_front().or(self.tail)?;
    if let Some(pace) = self.pace {
      thread::sleep(pace);
    }
    let advance = match step {
      Step::Frame { ratio, advance } => {
        self.current = frame_with_ratio(ratio);
        advance
      }
      Step::Corrupt { advance } => {
        self.current = vec![0u8; 17];
        advance
      }
    };
    if let Some(clock) = &self.clock {
      clock.advance(advance);
    }
    Some(Frame::new(WIDTH, HEIGHT, PixelLayout::Bgr24, &self.current))
  }
}

/// 在独立线程上以固定间隔投递帧的回调帧源
pub struct ThreadedCallbackSource {
  ratios: Vec<f64>,
  tail: Option<f64>,
  interval: Duration,
  fail_after_script: bool,
  handler: Option<FrameHandler>,
  stop_flag: Arc<AtomicBool>,
  worker: Option<JoinHandle<()>>,
  stops: Arc<AtomicUsize>,
  signals: Arc<Mutex<Vec<ContinueSignal>>>,
}

impl ThreadedCallbackSource {
  pub fn new(interval: Duration) -> Self {
    Self {
      ratios: Vec::new(),
      tail: None,
      interval,
      fail_after_script: false,
      handler: None,
      stop_flag: Arc::new(AtomicBool::new(false)),
      worker: None,
      stops: Arc::new(AtomicUsize::new(0)),
      signals: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn frames(mut self, count: usize, ratio: f64) -> Self {
    self.ratios.extend(std::iter::repeat_n(ratio, count));
    self
  }

  pub fn forever(mut self, ratio: f64) -> Self {
    self.tail = Some(ratio);
    self
  }

  /// 脚本用完后投递一次流错误
  pub fn fail_after_script(mut self) -> Self {
    self.fail_after_script = true;
    self
  }

  pub fn stop_counter(&self) -> Arc<AtomicUsize> {
    self.stops.clone()
  }

  /// 处理函数返回过的信号
  pub fn signals(&self) -> Arc<Mutex<Vec<ContinueSignal>>> {
    self.signals.clone()
  }
}

impl CallbackSource for ThreadedCallbackSource {
  fn set_handler(&mut self, handler: FrameHandler) {
    self.handler = Some(handler);
  }
}

impl FrameSource for ThreadedCallbackSource {
  fn start(&mut self) -> Result<(), SourceError> {
    let mut handler = self
      .handler
      .take()
      .ok_or_else(|| SourceError::Unavailable("no handler".to_string()))?;
    let ratios = self.ratios.clone();
    let tail = self.tail;
    let interval = self.interval;
    let fail_after_script = self.fail_after_script;
    let stop_flag = self.stop_flag.clone();
    let signals = self.signals.clone();

    self.worker = Some(thread::spawn(move || {
      let mut script = ratios.into_iter();
      loop {
        thread::sleep(interval);
        if stop_flag.load(Ordering::SeqCst) {
          break;
        }
        let signal = match script.next().or(tail) {
          Some(ratio) => {
            let data = frame_with_ratio(ratio);
            handler(Delivery::Frame(Frame::new(
              WIDTH,
              HEIGHT,
              PixelLayout::Bgr24,
              &data,
            )))
          }
          None if fail_after_script => handler(Delivery::Error(SourceError::StreamEnded(
            "scripted failure".to_string(),
          ))),
          None => break,
        };
        signals.lock().unwrap().push(signal);
        if signal == ContinueSignal::Stop {
          break;
        }
      }
    }));
    Ok(())
  }

  fn stop(&mut self) -> Result<(), SourceError> {
    self.stops.fetch_add(1, Ordering::SeqCst);
    self.stop_flag.store(true, Ordering::SeqCst);
    if let Some(worker) = self.worker.take() {
      let _ = worker.join();
    }
    Ok(())
  }
}
