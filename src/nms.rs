// 该文件是 Shanan （山南西风） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

use crate::model::NormalizedRect;

/// 与类别无关的贪心非极大值抑制
///
/// 按分数降序（稳定排序）处理候选框，与任一已保留框的 IoU 大于 `max_iou`
/// 即被丢弃。返回保留的索引，顺序即保留顺序。
pub fn non_max_suppression(rects: &[NormalizedRect], scores: &[f32], max_iou: f32) -> Vec<usize> {
  debug_assert_eq!(rects.len(), scores.len());

  let mut order: Vec<usize> = (0..rects.len().min(scores.len())).collect();
  order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

  let mut keep: Vec<usize> = Vec::new();
  for idx in order {
    let suppressed = keep
      .iter()
      .any(|&kept| rects[kept].iou(&rects[idx]) > max_iou);
    if !suppressed {
      keep.push(idx);
    }
  }

  keep
}
