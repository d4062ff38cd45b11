// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 原始输出张量与分尺度视图
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

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
  #[error("视图越界: 偏移 {offset} + 元素数 {count} 超出缓冲区长度 {len}")]
  OutOfRange {
    offset: usize,
    count: usize,
    len: usize,
  },
  #[error("张量长度不匹配: 期望 {expected}, 实际 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 推理引擎输出的扁平浮点缓冲区（行主序，通道在最后）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTensor {
  data: Box<[f32]>,
}

impl From<Vec<f32>> for RawTensor {
  fn from(data: Vec<f32>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl RawTensor {
  pub fn zeros(len: usize) -> Self {
    Self {
      data: vec![0.0f32; len].into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl AsRef<[f32]> for RawTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

impl AsMut<[f32]> for RawTensor {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

/// 单个检测尺度的描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDescriptor {
  pub stride: usize,
  pub grid_height: usize,
  pub grid_width: usize,
}

impl ScaleDescriptor {
  /// 根据模型输入尺寸和步长推导网格大小（整数除法）
  pub fn from_input(input_width: usize, input_height: usize, stride: usize) -> Self {
    Self {
      stride,
      grid_height: input_height / stride,
      grid_width: input_width / stride,
    }
  }

  pub fn cells(&self) -> usize {
    self.grid_height * self.grid_width
  }
}

/// 扁平缓冲区上的只读三维视图 `(rows, cols, channels)`
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
  data: &'a [f32],
  rows: usize,
  cols: usize,
  channels: usize,
}

impl<'a> TensorView<'a> {
  pub fn new(buffer: &'a [f32], offset: usize, shape: [usize; 3]) -> Result<Self, TensorError> {
    let [rows, cols, channels] = shape;
    let count = rows * cols * channels;
    let data = offset
      .checked_add(count)
      .and_then(|end| buffer.get(offset..end))
      .ok_or(TensorError::OutOfRange {
        offset,
        count,
        len: buffer.len(),
      })?;

    Ok(Self {
      data,
      rows,
      cols,
      channels,
    })
  }

  pub fn shape(&self) -> [usize; 3] {
    [self.rows, self.cols, self.channels]
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn element_count(&self) -> usize {
    self.data.len()
  }

  fn index(&self, row: usize, col: usize, channel: usize) -> Option<usize> {
    if row < self.rows && col < self.cols && channel < self.channels {
      Some((row * self.cols + col) * self.channels + channel)
    } else {
      None
    }
  }

  pub fn try_get(&self, row: usize, col: usize, channel: usize) -> Option<f32> {
    self.index(row, col, channel).map(|idx| self.data[idx])
  }

  /// 按 `(row, col, channel)` 读取元素，越界即为内部不变量被破坏
  pub fn get(&self, row: usize, col: usize, channel: usize) -> f32 {
    match self.try_get(row, col, channel) {
      Some(value) => value,
      None => panic!(
        "张量视图越界: ({}, {}, {}) 超出形状 {:?}",
        row,
        col,
        channel,
        self.shape()
      ),
    }
  }

  /// 某个网格单元的全部通道
  pub fn cell(&self, row: usize, col: usize) -> &'a [f32] {
    assert!(
      row < self.rows && col < self.cols,
      "网格单元越界: ({}, {}) 超出 {}x{}",
      row,
      col,
      self.rows,
      self.cols
    );
    let start = (row * self.cols + col) * self.channels;
    &self.data[start..start + self.channels]
  }
}

/// 按尺度顺序把一个扁平张量切分为互不重叠的连续视图
pub fn split_scales<'a>(
  buffer: &'a [f32],
  scales: &[ScaleDescriptor],
  channels: usize,
) -> Result<Vec<TensorView<'a>>, TensorError> {
  let expected: usize = scales.iter().map(|s| s.cells() * channels).sum();
  if expected != buffer.len() {
    return Err(TensorError::LengthMismatch {
      expected,
      actual: buffer.len(),
    });
  }

  let mut offset = 0usize;
  let mut views = Vec::with_capacity(scales.len());
  for scale in scales {
    let view = TensorView::new(buffer, offset, [scale.grid_height, scale.grid_width, channels])?;
    offset += view.element_count();
    views.push(view);
  }

  Ok(views)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn view_uses_channels_last_addressing() {
    let buffer: Vec<f32> = (0..24).map(|v| v as f32).collect();
    let view = TensorView::new(&buffer, 0, [2, 3, 4]).unwrap();
    assert_eq!(view.get(0, 0, 0), 0.0);
    assert_eq!(view.get(0, 1, 2), 6.0);
    assert_eq!(view.get(1, 2, 3), 23.0);
    assert_eq!(view.cell(1, 0), &[12.0, 13.0, 14.0, 15.0]);
  }

  #[test]
  fn view_rejects_range_past_buffer() {
    let buffer = vec![0.0f32; 10];
    let err = TensorView::new(&buffer, 4, [1, 2, 4]).unwrap_err();
    assert_eq!(
      err,
      TensorError::OutOfRange {
        offset: 4,
        count: 8,
        len: 10
      }
    );
  }

  #[test]
  fn try_get_out_of_shape_is_none() {
    let buffer = vec![1.0f32; 8];
    let view = TensorView::new(&buffer, 0, [1, 2, 4]).unwrap();
    assert_eq!(view.try_get(0, 1, 3), Some(1.0));
    assert_eq!(view.try_get(1, 0, 0), None);
    assert_eq!(view.try_get(0, 2, 0), None);
    assert_eq!(view.try_get(0, 0, 4), None);
  }

  #[test]
  #[should_panic]
  fn get_out_of_shape_panics() {
    let buffer = vec![0.0f32; 8];
    let view = TensorView::new(&buffer, 0, [1, 2, 4]).unwrap();
    view.get(0, 0, 4);
  }

  #[test]
  fn split_uses_running_offsets() {
    let scales = [
      ScaleDescriptor::from_input(32, 32, 8),
      ScaleDescriptor::from_input(32, 32, 16),
      ScaleDescriptor::from_input(32, 32, 32),
    ];
    let channels = 2;
    let total = (16 + 4 + 1) * channels;
    let buffer: Vec<f32> = (0..total).map(|v| v as f32).collect();

    let views = split_scales(&buffer, &scales, channels).unwrap();
    assert_eq!(views.len(), 3);
    assert_eq!(views[0].shape(), [4, 4, 2]);
    assert_eq!(views[1].shape(), [2, 2, 2]);
    assert_eq!(views[2].shape(), [1, 1, 2]);
    assert_eq!(views[1].get(0, 0, 0), 32.0);
    assert_eq!(views[2].get(0, 0, 1), 41.0);
  }

  #[test]
  fn split_rejects_wrong_length() {
    let scales = [ScaleDescriptor::from_input(32, 32, 16)];
    let short = vec![0.0f32; 4 * 85 - 1];
    let long = vec![0.0f32; 4 * 85 + 85];
    assert_eq!(
      split_scales(&short, &scales, 85).unwrap_err(),
      TensorError::LengthMismatch {
        expected: 340,
        actual: 339
      }
    );
    assert!(split_scales(&long, &scales, 85).is_err());
  }
}
