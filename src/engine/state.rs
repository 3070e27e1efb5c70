// 该文件是 CogCoach 项目的一部分。
// src/engine/state.rs - 一次写入的任务状态
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
  sync::OnceLock,
  time::{Duration, Instant},
};

use tracing::debug;

use super::{EngineError, TaskOutcome};

/// 驱动状态机的事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskEvent {
  /// 一帧已分析完毕，`at` 为分析完成的时刻
  Detection { ratio: f64, at: Instant },
  /// 超时定时器到期
  TimerExpired,
  /// 外部中断
  Abort,
  /// 帧流意外结束
  StreamEnded,
}

/// 状态机当前所处阶段
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
  Running,
  Resolved(TaskOutcome),
}

/// 任务状态：`Running` 至多一次转移到 `Resolved`
///
/// 转移通过 [`OnceLock`] 完成，帧回调、定时器和中断可以在不同线程上并发调用
/// [`EngineState::apply`]，只有第一个满足条件的事件生效。
#[derive(Debug, Default)]
pub struct EngineState {
  epoch: OnceLock<Instant>,
  outcome: OnceLock<TaskOutcome>,
}

impl EngineState {
  pub fn new() -> Self {
    Self::default()
  }

  /// 记录计时起点（帧源启动成功的时刻），只有第一次调用生效
  pub fn begin(&self, epoch: Instant) {
    if self.epoch.set(epoch).is_err() {
      debug!("计时起点已设置，忽略");
    }
  }

  pub fn epoch(&self) -> Option<Instant> {
    self.epoch.get().copied()
  }

  pub fn phase(&self) -> Phase {
    match self.outcome.get() {
      Some(outcome) => Phase::Resolved(*outcome),
      None => Phase::Running,
    }
  }

  pub fn is_resolved(&self) -> bool {
    self.outcome.get().is_some()
  }

  pub fn outcome(&self) -> Option<TaskOutcome> {
    self.outcome.get().copied()
  }

  /// 直接写入结果；已有结果时返回 [`EngineError::DoubleResolution`]，原结果保持不变
  pub fn resolve(&self, outcome: TaskOutcome) -> Result<(), EngineError> {
    self
      .outcome
      .set(outcome)
      .map_err(|rejected| EngineError::DoubleResolution {
        kept: self.outcome.get().copied().unwrap_or(rejected),
        rejected,
      })
  }

  /// 状态转移函数
  ///
  /// 返回 `Some(outcome)` 当且仅当本次事件完成了转移。
  /// 已解决后的任何事件都是空操作。
  pub fn apply(&self, event: TaskEvent, threshold: f64) -> Option<TaskOutcome> {
    if self.is_resolved() {
      return None;
    }

    let outcome = match event {
      TaskEvent::Detection { ratio, at } => {
        if ratio <= threshold {
          return None;
        }
        // 起点未确定前到达的帧不计入
        let epoch = self.epoch()?;
        TaskOutcome::Success {
          elapsed_ms: elapsed_ms(epoch, at),
        }
      }
      TaskEvent::TimerExpired | TaskEvent::StreamEnded => TaskOutcome::Timeout,
      TaskEvent::Abort => TaskOutcome::Aborted,
    };

    match self.resolve(outcome) {
      Ok(()) => Some(outcome),
      Err(e) => {
        debug!("竞争失败，丢弃事件: {}", e);
        None
      }
    }
  }
}

fn elapsed_ms(epoch: Instant, at: Instant) -> u64 {
  let elapsed: Duration = at.saturating_duration_since(epoch);
  elapsed.as_millis().min(u64::MAX as u128) as u64
}
