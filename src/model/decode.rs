// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decode.rs - YOLOX 候选框解码
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

use tracing::debug;

use crate::{
  mapper::{CoordinateMapper, ModelInput},
  model::NormalizedRect,
  tensor::{ScaleDescriptor, TensorView},
};

/// 边界框回归通道数
pub(crate) const BOX_CHANNELS: usize = 4;
/// 目标置信度所在通道
pub(crate) const SCORE_CHANNEL: usize = 4;
/// 第一个类别通道
pub(crate) const CLASS_OFFSET: usize = 5;

/// 单个网格单元产生的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub rect: NormalizedRect,
  pub class_index: usize,
  pub score: f32,
}

/// 在类别通道中选出最大值的索引，相等时取较小索引
pub fn select_class(logits: &[f32]) -> usize {
  let mut max_logit = f32::NEG_INFINITY;
  let mut class_index = 0usize;
  for (c, &logit) in logits.iter().enumerate() {
    if logit > max_logit {
      max_logit = logit;
      class_index = c;
    }
  }
  class_index
}

/// 遍历各尺度视图，输出分数不低于 `min_score` 的候选框
///
/// 视图与尺度描述一一对应；若提供了映射器，每个候选框的矩形恰好映射一次。
pub fn decode_candidates(
  views: &[TensorView<'_>],
  scales: &[ScaleDescriptor],
  input: &ModelInput,
  min_score: f32,
  mapper: Option<&dyn CoordinateMapper>,
) -> Vec<Candidate> {
  let width_inv = 1.0 / input.width as f32;
  let height_inv = 1.0 / input.height as f32;
  let mut candidates = Vec::new();

  for (scale_idx, (view, scale)) in views.iter().zip(scales).enumerate() {
    let stride = scale.stride as f32;
    let before = candidates.len();

    for j in 0..view.rows() {
      for i in 0..view.cols() {
        let cell = view.cell(j, i);

        // NaN 分数同样被丢弃
        let score = cell[SCORE_CHANNEL];
        if !(score >= min_score) {
          continue;
        }

        let class_index = select_class(&cell[CLASS_OFFSET..]);

        let [tx, ty, tw, th]: [f32; BOX_CHANNELS] = [cell[0], cell[1], cell[2], cell[3]];
        let cx = (i as f32 + tx) * stride * width_inv;
        let cy = 1.0 - (j as f32 + ty) * stride * height_inv;
        let w = tw.exp() * stride * width_inv;
        let h = th.exp() * stride * height_inv;
        let raw = NormalizedRect::from_center(cx, cy, w, h);
        // exp 溢出或回归值为 NaN 时无法参与 IoU 比较
        if !raw.is_finite() {
          debug!("丢弃非有限候选框: 单元 ({}, {}), 尺度 {}", j, i, scale_idx);
          continue;
        }

        let rect = match mapper {
          Some(mapper) => mapper.map_rect(raw, input),
          None => raw,
        };

        candidates.push(Candidate {
          rect,
          class_index,
          score,
        });
      }
    }

    debug!(
      "尺度 {} (步长 {}, 网格 {}x{}): {} 个候选框",
      scale_idx,
      scale.stride,
      view.rows(),
      view.cols(),
      candidates.len() - before
    );
  }

  candidates
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use super::*;
  use crate::{mapper::AspectMode, tensor::split_scales};

  const CHANNELS: usize = 85;

  fn input_32() -> ModelInput {
    ModelInput {
      width: 32,
      height: 32,
      aspect_mode: AspectMode::ScaleToFit,
    }
  }

  fn set_cell(buffer: &mut [f32], cols: usize, row: usize, col: usize, values: &[(usize, f32)]) {
    let base = (row * cols + col) * CHANNELS;
    for &(channel, value) in values {
      buffer[base + channel] = value;
    }
  }

  #[test]
  fn select_class_prefers_first_on_ties() {
    assert_eq!(select_class(&[0.1, 0.7, 0.7, 0.2]), 1);
    assert_eq!(select_class(&[0.0, 0.0, 0.0]), 0);
    assert_eq!(select_class(&[-3.0, -1.0, -2.0]), 1);
  }

  #[test]
  fn decodes_single_cell_box() {
    let scales = [ScaleDescriptor::from_input(32, 32, 16)];
    let mut buffer = vec![0.0f32; 4 * CHANNELS];
    set_cell(
      &mut buffer,
      2,
      0,
      0,
      &[(0, 0.5), (1, 0.5), (4, 0.9), (CLASS_OFFSET + 3, 2.0)],
    );

    let views = split_scales(&buffer, &scales, CHANNELS).unwrap();
    let candidates = decode_candidates(&views, &scales, &input_32(), 0.4, None);

    assert_eq!(candidates.len(), 1);
    let candidate = candidates[0];
    assert_eq!(candidate.class_index, 3);
    assert_eq!(candidate.score, 0.9);
    assert!((candidate.rect.x - 0.0).abs() < 1e-6);
    assert!((candidate.rect.y - 0.5).abs() < 1e-6);
    assert!((candidate.rect.width - 0.5).abs() < 1e-6);
    assert!((candidate.rect.height - 0.5).abs() < 1e-6);
  }

  #[test]
  fn vertical_axis_is_flipped() {
    let scales = [ScaleDescriptor::from_input(32, 32, 16)];
    let mut buffer = vec![0.0f32; 4 * CHANNELS];
    // 第 1 行（图像下半部分）
    set_cell(&mut buffer, 2, 1, 1, &[(0, 0.5), (1, 0.5), (4, 0.8)]);

    let views = split_scales(&buffer, &scales, CHANNELS).unwrap();
    let candidates = decode_candidates(&views, &scales, &input_32(), 0.4, None);

    assert_eq!(candidates.len(), 1);
    let rect = candidates[0].rect;
    // cx = 1.5 * 16 / 32 = 0.75, cy = 1 - 0.75 = 0.25
    assert!((rect.x - 0.5).abs() < 1e-6);
    assert!((rect.y - 0.0).abs() < 1e-6);
  }

  #[test]
  fn cells_below_min_score_are_skipped() {
    let scales = [ScaleDescriptor::from_input(32, 32, 16)];
    let mut buffer = vec![0.0f32; 4 * CHANNELS];
    set_cell(&mut buffer, 2, 0, 0, &[(4, 0.39)]);
    set_cell(&mut buffer, 2, 0, 1, &[(4, 0.4)]);
    set_cell(&mut buffer, 2, 1, 0, &[(4, f32::NAN)]);

    let views = split_scales(&buffer, &scales, CHANNELS).unwrap();
    let candidates = decode_candidates(&views, &scales, &input_32(), 0.4, None);

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].score, 0.4);
  }

  #[test]
  fn log_size_uses_exp() {
    let scales = [ScaleDescriptor::from_input(32, 32, 16)];
    let mut buffer = vec![0.0f32; 4 * CHANNELS];
    set_cell(&mut buffer, 2, 0, 0, &[(2, 2.0f32.ln()), (3, 0.5f32.ln()), (4, 1.0)]);

    let views = split_scales(&buffer, &scales, CHANNELS).unwrap();
    let candidates = decode_candidates(&views, &scales, &input_32(), 0.4, None);

    assert!((candidates[0].rect.width - 1.0).abs() < 1e-6);
    assert!((candidates[0].rect.height - 0.25).abs() < 1e-6);
  }

  #[test]
  fn candidates_follow_scale_then_cell_order() {
    let scales = [
      ScaleDescriptor::from_input(32, 32, 16),
      ScaleDescriptor::from_input(32, 32, 32),
    ];
    let mut buffer = vec![0.0f32; (4 + 1) * CHANNELS];
    set_cell(&mut buffer, 2, 1, 0, &[(4, 0.5)]);
    set_cell(&mut buffer, 2, 0, 1, &[(4, 0.6)]);
    let second = &mut buffer[4 * CHANNELS..];
    set_cell(second, 1, 0, 0, &[(4, 0.7)]);

    let views = split_scales(&buffer, &scales, CHANNELS).unwrap();
    let scores: Vec<f32> = decode_candidates(&views, &scales, &input_32(), 0.4, None)
      .iter()
      .map(|c| c.score)
      .collect();

    assert_eq!(scores, vec![0.6, 0.5, 0.7]);
  }

  #[test]
  fn overflowing_box_is_discarded() {
    let scales = [ScaleDescriptor::from_input(32, 32, 16)];
    let mut buffer = vec![0.0f32; 4 * CHANNELS];
    set_cell(&mut buffer, 2, 0, 0, &[(2, 100.0), (3, 100.0), (4, 0.9)]);
    set_cell(&mut buffer, 2, 0, 1, &[(2, 100.0), (3, 100.0), (4, 0.8)]);
    set_cell(&mut buffer, 2, 1, 0, &[(0, f32::NAN), (4, 0.7)]);
    set_cell(&mut buffer, 2, 1, 1, &[(4, 0.6)]);

    let views = split_scales(&buffer, &scales, CHANNELS).unwrap();
    let candidates = decode_candidates(&views, &scales, &input_32(), 0.4, None);

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].score, 0.6);
    assert!(candidates[0].rect.is_finite());
  }

  #[test]
  fn mapper_is_called_once_per_candidate() {
    let scales = [ScaleDescriptor::from_input(32, 32, 16)];
    let mut buffer = vec![0.0f32; 4 * CHANNELS];
    set_cell(&mut buffer, 2, 0, 0, &[(4, 0.9)]);
    set_cell(&mut buffer, 2, 1, 1, &[(4, 0.8)]);

    let calls = Cell::new(0usize);
    let mapper = |rect: NormalizedRect, input: &ModelInput| {
      assert_eq!(input.width, 32);
      calls.set(calls.get() + 1);
      NormalizedRect { x: -1.0, ..rect }
    };

    let views = split_scales(&buffer, &scales, CHANNELS).unwrap();
    let candidates = decode_candidates(&views, &scales, &input_32(), 0.4, Some(&mapper));

    assert_eq!(calls.get(), 2);
    assert!(candidates.iter().all(|c| c.rect.x == -1.0));
  }
}
