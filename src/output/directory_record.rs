// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  output::{
    Render,
    record::{Record, RecordFormat},
  },
  tensor::RawTensor,
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("记录格式无效: {0}")]
  InvalidFormat(String),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把每个张量的检测结果写入 `目录/年/月/日/时-分-秒-序号.扩展名`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: Record,
  frame_counters: Arc<Mutex<u16>>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut record = Record::default();
    for (k, v) in uri.query_pairs() {
      match &*k {
        "record" => record.label_with_name = v != "id",
        "format" => {
          record.format = match &*v {
            "txt" | "text" => RecordFormat::Text,
            "json" => RecordFormat::Json,
            other => return Err(DirectoryRecordOutputError::InvalidFormat(other.to_string())),
          }
        }
        _ => {}
      }
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(Self::new(url_path(uri), record, always))
  }
}

impl DirectoryRecordOutput {
  pub fn new<P: AsRef<Path>>(directory: P, record: Record, always: bool) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      record,
      frame_counters: Arc::new(Mutex::new(0)),
      always,
    }
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counters
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    let id = counter.wrapping_add(1);
    *counter = id;
    id
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    let filename = format!(
      "{}-{:04X}.{}",
      now.format("%H-%M-%S"),
      self.frame_id(),
      self.record.format.extension()
    );

    Ok(directory.join(filename))
  }
}

impl Render<RawTensor, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, _frame: &RawTensor, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let path = self.frame_path()?;
    std::fs::write(&path, self.record.render(result)?)?;
    debug!("记录 {} 个检测结果到 {}", result.len(), path.display());
    Ok(())
  }
}
