// 该文件是 CogCoach 项目的一部分。
// src/engine/clock.rs - 单调时钟
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
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

pub trait Clock {
  fn now(&self) -> Instant;
}

/// 系统单调时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
  fn now(&self) -> Instant {
    Instant::now()
  }
}

/// 手动推进的时钟，克隆之间共享同一时间
#[derive(Debug, Clone)]
pub struct ManualClock {
  now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
  fn default() -> Self {
    Self::new()
  }
}

impl ManualClock {
  pub fn new() -> Self {
    Self {
      now: Arc::new(Mutex::new(Instant::now())),
    }
  }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
    *now += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> Instant {
    *self.now.lock().unwrap_or_else(|e| e.into_inner())
  }
}
