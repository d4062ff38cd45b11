// 该文件是 Shanan （山南西风） 项目的一部分。
// src/label.rs - 类别标签表
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

use std::{path::Path, sync::Arc};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, url_path};

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

const COCO_SCHEME: &str = "coco";
const LABEL_FILE_SCHEME: &str = "labels";

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件为空: {0}")]
  Empty(String),
}

/// 有序、不可变的类别名称表，克隆时共享同一份数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  labels: Arc<[String]>,
}

impl LabelTable {
  pub fn coco() -> Self {
    COCO_CLASSES.iter().copied().collect()
  }

  /// 每行一个标签，忽略空行并去除首尾空白
  pub fn from_lines(text: &str) -> Self {
    text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .collect()
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let table = Self::from_lines(&text);
    if table.is_empty() {
      error!("标签文件中没有任何标签: {}", path.display());
      return Err(LabelError::Empty(path.display().to_string()));
    }
    debug!("标签数量: {}", table.len());
    Ok(table)
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl Default for LabelTable {
  fn default() -> Self {
    Self::coco()
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      labels: iter.into_iter().map(Into::<String>::into).collect(),
    }
  }
}

impl FromUrl for LabelTable {
  type Error = LabelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      COCO_SCHEME => Ok(Self::coco()),
      LABEL_FILE_SCHEME => Self::from_file(url_path(url)),
      other => {
        error!(
          "URI 方案不匹配: 期望 '{}' 或 '{}', 实际 '{}'",
          COCO_SCHEME, LABEL_FILE_SCHEME, other
        );
        Err(LabelError::SchemeMismatch(other.to_string()))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_table_has_eighty_labels() {
    let table = LabelTable::coco();
    assert_eq!(table.len(), 80);
    assert_eq!(table.get(0), Some("person"));
    assert_eq!(table.get(79), Some("toothbrush"));
    assert_eq!(table.get(80), None);
  }

  #[test]
  fn lines_are_trimmed_and_blank_lines_skipped() {
    let table = LabelTable::from_lines("cat\n\n  dog \r\nbird\n");
    assert_eq!(table.iter().collect::<Vec<_>>(), vec!["cat", "dog", "bird"]);
  }

  #[test]
  fn clones_share_storage() {
    let table = LabelTable::coco();
    let other = table.clone();
    assert!(Arc::ptr_eq(&table.labels, &other.labels));
  }

  #[test]
  fn from_url_resolves_builtin_and_files() {
    let coco = LabelTable::from_url(&Url::parse("coco:").unwrap()).unwrap();
    assert_eq!(coco, LabelTable::coco());

    let path = std::env::temp_dir().join(format!("shanan-yolox-labels-{}.txt", std::process::id()));
    std::fs::write(&path, "a\nb\n").unwrap();
    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&format!("labels://{}", url.path())).unwrap();
    let table = LabelTable::from_url(&url).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(table.len(), 2);

    assert!(matches!(
      LabelTable::from_url(&Url::parse("http://example.com/labels").unwrap()),
      Err(LabelError::SchemeMismatch(_))
    ));
  }
}
