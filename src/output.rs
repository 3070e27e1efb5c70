// 该文件是 CogCoach 项目的一部分。
// src/output.rs - 结果输出
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, engine::TaskOutcome};

/// 结果记录。引擎本身不做 I/O，由调用方在任务结束后记录。
pub trait ResultSink {
  type Error;
  fn record(&self, task_name: &str, outcome: &TaskOutcome) -> Result<(), Self::Error>;
}

mod csv_record;
pub use self::csv_record::{CsvRecordOutput, CsvRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("CSV 记录输出错误: {0}")]
  CsvRecordOutputError(#[from] CsvRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  CsvRecord(CsvRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      CsvRecordOutput::SCHEME => Ok(OutputWrapper::CsvRecord(CsvRecordOutput::from_url(url)?)),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl ResultSink for OutputWrapper {
  type Error = OutputError;

  fn record(&self, task_name: &str, outcome: &TaskOutcome) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::CsvRecord(output) => output
        .record(task_name, outcome)
        .map_err(OutputError::from),
    }
  }
}
