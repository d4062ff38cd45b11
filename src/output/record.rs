// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/record.rs - 检测结果记录格式
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

use serde_json::{Value, json};

use crate::model::DetectResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
  #[default]
  Text,
  Json,
}

impl RecordFormat {
  pub fn extension(&self) -> &'static str {
    match self {
      RecordFormat::Text => "txt",
      RecordFormat::Json => "json",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
  pub label_with_name: bool,
  pub format: RecordFormat,
}

impl Default for Record {
  fn default() -> Self {
    Self {
      label_with_name: true,
      format: RecordFormat::Text,
    }
  }
}

impl Record {
  /// 每行一个检测: `label, score, x, y, width, height`
  pub fn to_text(&self, result: &DetectResult) -> String {
    let mut records = Vec::with_capacity(result.len());
    for item in result.iter() {
      let name = if self.label_with_name {
        item.label.clone()
      } else {
        item.class_id.to_string()
      };
      records.push(format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
        name, item.score, item.rect.x, item.rect.y, item.rect.width, item.rect.height
      ));
    }
    records.join("\n")
  }

  pub fn to_json(&self, result: &DetectResult) -> Value {
    Value::Array(
      result
        .iter()
        .map(|item| {
          json!({
            "label": item.label,
            "class_id": item.class_id,
            "score": item.score,
            "rect": {
              "x": item.rect.x,
              "y": item.rect.y,
              "width": item.rect.width,
              "height": item.rect.height,
            },
          })
        })
        .collect(),
    )
  }

  pub fn render(&self, result: &DetectResult) -> Result<String, serde_json::Error> {
    match self.format {
      RecordFormat::Text => Ok(self.to_text(result)),
      RecordFormat::Json => serde_json::to_string_pretty(&self.to_json(result)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Detection, NormalizedRect};

  fn result() -> DetectResult {
    DetectResult::from(vec![
      Detection {
        rect: NormalizedRect::new(0.0, 0.5, 0.5, 0.5),
        label: "motorcycle".to_string(),
        class_id: 3,
        score: 0.9,
      },
      Detection {
        rect: NormalizedRect::new(0.25, 0.125, 0.5, 0.25),
        label: "person".to_string(),
        class_id: 0,
        score: 0.5,
      },
    ])
  }

  #[test]
  fn text_record_by_name_and_id() {
    let by_name = Record::default().to_text(&result());
    assert_eq!(
      by_name,
      "motorcycle, 0.9000, 0.0000, 0.5000, 0.5000, 0.5000\nperson, 0.5000, 0.2500, 0.1250, 0.5000, 0.2500"
    );

    let by_id = Record {
      label_with_name: false,
      ..Record::default()
    }
    .to_text(&result());
    assert!(by_id.starts_with("3, 0.9000"));
    assert!(by_id.contains("\n0, 0.5000"));
  }

  #[test]
  fn json_record_keeps_order_and_fields() {
    let value = Record::default().to_json(&result());
    let items = value.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["label"], "motorcycle");
    assert_eq!(items[0]["class_id"], 3);
    assert_eq!(items[1]["rect"]["height"], 0.25);
  }

  #[test]
  fn empty_result_renders_empty() {
    let empty = DetectResult::default();
    assert_eq!(Record::default().render(&empty).unwrap(), "");
    let json = Record {
      format: RecordFormat::Json,
      ..Record::default()
    };
    assert_eq!(json.render(&empty).unwrap(), "[]");
  }
}
