// 该文件是 CogCoach 项目的一部分。
// src/task.rs - 任务定义
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

use std::fmt::Display;

use tracing::{error, info};

use crate::{
  engine::{Clock, MonotonicClock, TaskEngine, TaskOutcome},
  input::{AnySource, SourceError},
  output::ResultSink,
};

pub trait Task<O>: Sized {
  type Error;
  fn run_task(&self, source: AnySource<'_>, output: &O) -> Result<TaskOutcome, Self::Error>;
}

pub const RED_TO_CENTER: &str = "red_to_center";

/// 视觉反应任务：把红色物体移到画面中央
pub struct VisualTask<C = MonotonicClock> {
  name: String,
  engine: TaskEngine<C>,
}

impl<C> VisualTask<C> {
  pub fn new(name: &str, engine: TaskEngine<C>) -> Self {
    Self {
      name: name.to_string(),
      engine,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl<C, O> Task<O> for VisualTask<C>
where
  C: Clock + Clone + Send + 'static,
  O: ResultSink,
  O::Error: Display,
{
  type Error = SourceError;

  fn run_task(&self, source: AnySource<'_>, output: &O) -> Result<TaskOutcome, Self::Error> {
    info!("开始任务: {}", self.name);
    let outcome = self.engine.run(source)?;

    // 记录失败不影响任务结果
    if let Err(e) = output.record(&self.name, &outcome) {
      error!("结果记录失败: {}", e);
    }

    match outcome.reaction_time_ms() {
      Some(rt_ms) => info!("[结果] 成功=true, 反应时间(ms)={}", rt_ms),
      None => info!("[结果] 成功=false, 结果={:?}", outcome),
    }
    Ok(outcome)
  }
}
