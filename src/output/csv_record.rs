// 该文件是 CogCoach 项目的一部分。
// src/output/csv_record.rs - CSV 追加记录
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
  fs::{self, OpenOptions},
  io::Write,
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::Local;
use thiserror::Error;
use tracing::debug;

use crate::{FromUrl, FromUrlWithScheme, engine::TaskOutcome, output::ResultSink};

#[derive(Error, Debug)]
pub enum CsvRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

const HEADER: &str = "datetime,task,success,rt_ms";

/// 含分隔符、引号或换行的字段加双引号，内部引号写两次
fn quote_field(field: &str) -> String {
  if field.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", field.replace('"', "\"\""))
  } else {
    field.to_string()
  }
}

/// 追加写入的 CSV 结果文件，文件不存在或为空时先写表头
pub struct CsvRecordOutput {
  path: PathBuf,
  // 同一进程内的多次记录串行写入
  lock: Mutex<()>,
}

impl CsvRecordOutput {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      lock: Mutex::new(()),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn row(task_name: &str, outcome: &TaskOutcome) -> String {
    let rt_ms = outcome
      .reaction_time_ms()
      .map(|ms| ms as i64)
      .unwrap_or(-1);
    format!(
      "{},{},{},{}",
      Local::now().format("%Y-%m-%d %H:%M:%S"),
      quote_field(task_name),
      if outcome.is_success() { 1 } else { 0 },
      rt_ms
    )
  }
}

impl FromUrlWithScheme for CsvRecordOutput {
  const SCHEME: &'static str = "csv";
}

impl FromUrl for CsvRecordOutput {
  type Error = CsvRecordOutputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CsvRecordOutputError::SchemeMismatch);
    }
    Ok(CsvRecordOutput::new(url.path()))
  }
}

impl ResultSink for CsvRecordOutput {
  type Error = CsvRecordOutputError;

  fn record(&self, task_name: &str, outcome: &TaskOutcome) -> Result<(), Self::Error> {
    let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?;
    let mut content = String::new();
    if file.metadata()?.len() == 0 {
      content.push_str(HEADER);
      content.push('\n');
    }
    content.push_str(&Self::row(task_name, outcome));
    content.push('\n');
    file.write_all(content.as_bytes())?;

    debug!("结果已记录到 {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
      .unwrap()
      .lines()
      .map(String::from)
      .collect()
  }

  #[test]
  fn test_header_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("visual.csv");
    let output = CsvRecordOutput::new(&path);

    output
      .record("red_to_center", &TaskOutcome::Success { elapsed_ms: 1200 })
      .unwrap();
    output.record("red_to_center", &TaskOutcome::Timeout).unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], HEADER);
    assert!(lines[1].ends_with(",red_to_center,1,1200"));
    assert!(lines[2].ends_with(",red_to_center,0,-1"));
  }

  #[test]
  fn test_existing_file_is_appended() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("visual.csv");
    fs::write(&path, format!("{}\n2026-01-01 00:00:00,red_to_center,0,-1\n", HEADER)).unwrap();

    CsvRecordOutput::new(&path)
      .record("red_to_center", &TaskOutcome::Aborted)
      .unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], "2026-01-01 00:00:00,red_to_center,0,-1");
    assert!(lines[2].ends_with(",red_to_center,0,-1"));
  }

  #[test]
  fn test_datetime_column_format() {
    let row = CsvRecordOutput::row("t", &TaskOutcome::Timeout);
    let datetime = row.split(',').next().unwrap();
    assert!(chrono::NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M:%S").is_ok());
  }

  #[test]
  fn test_task_name_with_separator_is_quoted() {
    let row = CsvRecordOutput::row("red,center", &TaskOutcome::Timeout);
    assert!(row.ends_with(",\"red,center\",0,-1"));

    let row = CsvRecordOutput::row("say \"hi\"\nnow", &TaskOutcome::Aborted);
    assert!(row.ends_with(",\"say \"\"hi\"\"\nnow\",0,-1"));
  }

  #[test]
  fn test_plain_task_name_is_unquoted() {
    assert_eq!(quote_field("red_to_center"), "red_to_center");
  }

  #[test]
  fn test_from_url() {
    let url = url::Url::parse("csv:logs/visual.csv").unwrap();
    let output = CsvRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), Path::new("logs/visual.csv"));
  }
}
