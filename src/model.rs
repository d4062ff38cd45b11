// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 归一化矩形，原点在左下角，(1, 1) 为右上角
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedRect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl NormalizedRect {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由中心点与宽高构造
  pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
    Self::new(cx - 0.5 * width, cy - 0.5 * height, width, height)
  }

  pub fn is_finite(&self) -> bool {
    self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
  }

  pub fn x_max(&self) -> f32 {
    self.x + self.width
  }

  pub fn y_max(&self) -> f32 {
    self.y + self.height
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  pub fn intersection(&self, other: &Self) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = self.x_max().min(other.x_max());
    let y2 = self.y_max().min(other.y_max());

    (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
  }

  /// 交并比，不相交或并集非正时为 0
  pub fn iou(&self, other: &Self) -> f32 {
    let intersection = self.intersection(other);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  /// 归一化边界框
  pub rect: NormalizedRect,
  /// 类别名称
  pub label: String,
  /// 类别索引
  pub class_id: usize,
  /// 置信度
  pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

mod decode;
mod yolox;
pub use self::decode::{Candidate, decode_candidates, select_class};
pub use self::yolox::{
  DEFAULT_INPUT_SIZE, DEFAULT_MAX_IOU, DEFAULT_MIN_SCORE, DEFAULT_NUM_CLASSES, DEFAULT_STRIDES,
  Yolox, YoloxBuilder, YoloxError,
};
