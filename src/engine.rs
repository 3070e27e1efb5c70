// 该文件是 CogCoach 项目的一部分。
// src/engine.rs - 限时事件检测引擎
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

//! # 任务引擎
//!
//! 引擎消费帧源产生的帧，对每帧计算中心区域红色比例，
//! 并在限定时间内把任务解决为 `Success`、`Timeout` 或 `Aborted` 之一。
//!
//! 支持两种调度模型：
//! - 轮询：单线程循环调用 `next_frame`，每轮检查超时与中断；
//! - 回调：帧在帧源的线程中分析，结果通过通道送回引擎线程，
//!   引擎线程上的 `select!` 同时等待帧事件、一次性定时器与中断。
//!
//! 无论哪种模型，任务一旦解决，引擎都会恰好调用一次 `stop()`。

mod abort;
mod clock;
mod state;

pub use self::abort::{AbortHandle, AbortSignal, abort_pair};
pub use self::clock::{Clock, ManualClock, MonotonicClock};
pub use self::state::{EngineState, Phase, TaskEvent};

use std::sync::Arc;

use crossbeam_channel::{after, select, unbounded};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  config::TaskConfig,
  detector::{RedMask, RegionDetector},
  input::{
    AnySource, CallbackSource, ContinueSignal, Delivery, FrameHandler, FrameSource, PollingSource,
    SourceError,
  },
};

/// 任务结果，每次运行恰好产生一个
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
  Success { elapsed_ms: u64 },
  Timeout,
  Aborted,
}

impl TaskOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, TaskOutcome::Success { .. })
  }

  /// 反应时间，仅 `Success` 有值
  pub fn reaction_time_ms(&self) -> Option<u64> {
    match self {
      TaskOutcome::Success { elapsed_ms } => Some(*elapsed_ms),
      _ => None,
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
  #[error("重复解决任务: 已有结果 {kept:?}, 拒绝 {rejected:?}")]
  DoubleResolution {
    kept: TaskOutcome,
    rejected: TaskOutcome,
  },
}

/// 回调线程发往引擎线程的消息
enum LoopEvent {
  Resolved(TaskOutcome),
  StreamEnded(SourceError),
}

pub struct TaskEngine<C = MonotonicClock> {
  config: TaskConfig,
  detector: RegionDetector,
  clock: C,
  abort: AbortSignal,
}

impl TaskEngine<MonotonicClock> {
  pub fn new(config: TaskConfig) -> Self {
    Self {
      config,
      detector: RegionDetector::new(config.roi()),
      clock: MonotonicClock,
      abort: AbortSignal::never(),
    }
  }
}

impl<C> TaskEngine<C>
where
  C: Clock + Clone + Send + 'static,
{
  pub fn with_clock<D: Clock + Clone + Send + 'static>(self, clock: D) -> TaskEngine<D> {
    TaskEngine {
      config: self.config,
      detector: self.detector,
      clock,
      abort: self.abort,
    }
  }

  pub fn with_abort(mut self, abort: AbortSignal) -> Self {
    self.abort = abort;
    self
  }

  pub fn with_mask(mut self, mask: RedMask) -> Self {
    self.detector = self.detector.with_mask(mask);
    self
  }

  pub fn config(&self) -> &TaskConfig {
    &self.config
  }

  /// 按帧源的投递模型运行任务
  ///
  /// 帧源无法启动时返回 `Err`；启动之后总是返回一个 [`TaskOutcome`]。
  pub fn run(&self, source: AnySource<'_>) -> Result<TaskOutcome, SourceError> {
    match source {
      AnySource::Polling(source) => self.run_polling(source),
      AnySource::Callback(source) => self.run_callback(source),
    }
  }

  pub fn run_polling<S: PollingSource + ?Sized>(
    &self,
    source: &mut S,
  ) -> Result<TaskOutcome, SourceError> {
    source.start()?;

    let state = EngineState::new();
    let epoch = self.clock.now();
    state.begin(epoch);
    let deadline = epoch + self.config.timeout();
    let threshold = self.config.threshold();
    info!(
      "任务开始（轮询模式），阈值 {:.2}，限时 {:?}",
      threshold,
      self.config.timeout()
    );

    let mut frame_index = 0u64;
    let outcome = loop {
      if self.abort.is_aborted() {
        state.apply(TaskEvent::Abort, threshold);
      } else if self.clock.now() >= deadline {
        state.apply(TaskEvent::TimerExpired, threshold);
      } else {
        match source.next_frame() {
          None => {
            warn!("帧流结束，无法继续任务");
            state.apply(TaskEvent::StreamEnded, threshold);
          }
          Some(frame) => {
            frame_index += 1;
            match self.detector.detect(&frame) {
              Ok(result) => {
                let at = self.clock.now();
                debug!("第 {} 帧中心红色比例: {:.3}", frame_index, result.ratio);
                state.apply(
                  TaskEvent::Detection {
                    ratio: result.ratio,
                    at,
                  },
                  threshold,
                );
              }
              Err(e) => warn!("跳过第 {} 帧: {}", frame_index, e),
            }
          }
        }
      }

      if let Some(outcome) = state.outcome() {
        break outcome;
      }
    };

    info!("任务结束: {:?}", outcome);
    teardown(source);
    Ok(outcome)
  }

  pub fn run_callback<S: CallbackSource + ?Sized>(
    &self,
    source: &mut S,
  ) -> Result<TaskOutcome, SourceError> {
    let state = Arc::new(EngineState::new());
    let threshold = self.config.threshold();
    let (tx, rx) = unbounded::<LoopEvent>();

    let handler: FrameHandler = {
      let state = state.clone();
      let detector = self.detector;
      let clock = self.clock.clone();
      let mut frame_index = 0u64;
      Box::new(move |delivery| {
        if state.is_resolved() {
          return ContinueSignal::Stop;
        }
        match delivery {
          Delivery::Frame(frame) => {
            frame_index += 1;
            match detector.detect(&frame) {
              Ok(result) => {
                let at = clock.now();
                let event = TaskEvent::Detection {
                  ratio: result.ratio,
                  at,
                };
                if let Some(outcome) = state.apply(event, threshold) {
                  let _ = tx.send(LoopEvent::Resolved(outcome));
                }
              }
              Err(e) => warn!("跳过第 {} 帧: {}", frame_index, e),
            }
          }
          Delivery::Error(e) => {
            let _ = tx.send(LoopEvent::StreamEnded(e));
            return ContinueSignal::Stop;
          }
        }
        if state.is_resolved() {
          ContinueSignal::Stop
        } else {
          ContinueSignal::Continue
        }
      })
    };
    source.set_handler(handler);

    source.start()?;
    state.begin(self.clock.now());
    let timer = after(self.config.timeout());
    info!(
      "任务开始（回调模式），阈值 {:.2}，限时 {:?}",
      threshold,
      self.config.timeout()
    );

    if self.abort.is_aborted() {
      state.apply(TaskEvent::Abort, threshold);
    }

    let outcome = loop {
      if let Some(outcome) = state.outcome() {
        break outcome;
      }
      select! {
        recv(rx) -> event => match event {
          Ok(LoopEvent::Resolved(outcome)) => debug!("帧回调解决任务: {:?}", outcome),
          Ok(LoopEvent::StreamEnded(e)) => {
            warn!("帧流结束，无法继续任务: {}", e);
            state.apply(TaskEvent::StreamEnded, threshold);
          }
          Err(_) => {
            warn!("帧源已释放处理函数");
            state.apply(TaskEvent::StreamEnded, threshold);
          }
        },
        recv(timer) -> _ => {
          state.apply(TaskEvent::TimerExpired, threshold);
        },
        recv(self.abort.waker()) -> _ => {
          state.apply(TaskEvent::Abort, threshold);
        },
      }
    };

    info!("任务结束: {:?}", outcome);
    teardown(source);
    Ok(outcome)
  }
}

/// 停止帧源；失败只记录，不影响已确定的结果
fn teardown<S: FrameSource + ?Sized>(source: &mut S) {
  if let Err(e) = source.stop() {
    warn!("停止帧源失败: {}", e);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_outcome_reaction_time() {
    assert_eq!(
      TaskOutcome::Success { elapsed_ms: 1200 }.reaction_time_ms(),
      Some(1200)
    );
    assert_eq!(TaskOutcome::Timeout.reaction_time_ms(), None);
    assert!(!TaskOutcome::Aborted.is_success());
  }
}
