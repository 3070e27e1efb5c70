// 该文件是 CogCoach 项目的一部分。
// src/main.rs - 视觉反应任务主程序
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use cogcoach::{
  FromUrl,
  config::{RoiFraction, TaskConfig},
  engine::{TaskEngine, abort_pair},
  input::InputWrapper,
  output::OutputWrapper,
  task::{RED_TO_CENTER, Task, VisualTask},
};

/// CogCoach 视觉反应任务参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源（auto://、v4l2://、gst://、image://）
  #[arg(long, value_name = "SOURCE", default_value = "auto://")]
  pub input: Url,
  /// 结果记录（csv:<路径>）
  #[arg(long, value_name = "OUTPUT", default_value = "csv:logs/visual.csv")]
  pub output: Url,
  /// 中心区域红色比例阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD", default_value_t = 0.20)]
  pub threshold: f64,
  /// 限时（秒）
  #[arg(long, value_name = "SECONDS", default_value_t = 30)]
  pub timeout: u64,
  /// 中心区域起始比例
  #[arg(long, default_value_t = 0.4)]
  pub roi_start: f64,
  /// 中心区域结束比例
  #[arg(long, default_value_t = 0.6)]
  pub roi_end: f64,
  /// 记录中的任务名
  #[arg(long, default_value = RED_TO_CENTER)]
  pub task_name: String,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("结果记录: {}", args.output);
  info!("阈值: {}, 限时: {} 秒", args.threshold, args.timeout);

  let config = TaskConfig::new(args.threshold, Duration::from_secs(args.timeout))?
    .with_roi(RoiFraction::new(args.roi_start, args.roi_end)?);

  let mut input = InputWrapper::from_url(&args.input).context("无法创建输入源")?;
  let output = OutputWrapper::from_url(&args.output).context("无法创建结果记录")?;

  let (abort, signal) = abort_pair();
  ctrlc::set_handler(move || {
    warn!("收到中断信号，准备退出...");
    abort.abort();
  })
  .context("无法设置 Ctrl-C 处理函数")?;

  let engine = TaskEngine::new(config).with_abort(signal);
  info!("[提示] 请把红色物体移到画面中央");
  let outcome = VisualTask::new(&args.task_name, engine)
    .run_task(input.as_source(), &output)
    .context("无法运行任务")?;

  info!("任务完成: {:?}", outcome);
  Ok(())
}
