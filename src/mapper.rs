// 该文件是 Shanan （山南西风） 项目的一部分。
// src/mapper.rs - 坐标映射
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

use std::str::FromStr;

use crate::model::NormalizedRect;

/// 图像缩放到模型输入时的宽高比处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectMode {
  /// 直接拉伸，不保持宽高比
  #[default]
  ScaleToFit,
  /// 保持宽高比并居中填充（letterbox）
  AspectFit,
  /// 保持宽高比并居中裁剪
  AspectFill,
}

impl FromStr for AspectMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "stretch" | "scale" => Ok(AspectMode::ScaleToFit),
      "fit" | "letterbox" => Ok(AspectMode::AspectFit),
      "fill" | "crop" => Ok(AspectMode::AspectFill),
      other => Err(format!("未知的宽高比模式: {}", other)),
    }
  }
}

/// 模型声明的输入描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInput {
  pub width: usize,
  pub height: usize,
  pub aspect_mode: AspectMode,
}

/// 把模型输入空间中的归一化矩形映射到调用方需要的输出空间
pub trait CoordinateMapper {
  fn map_rect(&self, rect: NormalizedRect, input: &ModelInput) -> NormalizedRect;
}

impl<F> CoordinateMapper for F
where
  F: Fn(NormalizedRect, &ModelInput) -> NormalizedRect,
{
  fn map_rect(&self, rect: NormalizedRect, input: &ModelInput) -> NormalizedRect {
    self(rect, input)
  }
}

/// 原始图像尺寸已知时，撤销缩放阶段引入的填充或裁剪
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMapper {
  pub image_width: usize,
  pub image_height: usize,
}

impl ImageMapper {
  pub fn new(image_width: usize, image_height: usize) -> Self {
    Self {
      image_width,
      image_height,
    }
  }

  /// 图像内容在模型输入中所占的归一化比例
  fn content_fraction(&self, input: &ModelInput) -> (f32, f32) {
    let (iw, ih) = (self.image_width as f32, self.image_height as f32);
    let (mw, mh) = (input.width as f32, input.height as f32);
    let scale = match input.aspect_mode {
      AspectMode::ScaleToFit => return (1.0, 1.0),
      AspectMode::AspectFit => (mw / iw).min(mh / ih),
      AspectMode::AspectFill => (mw / iw).max(mh / ih),
    };
    (iw * scale / mw, ih * scale / mh)
  }
}

impl CoordinateMapper for ImageMapper {
  fn map_rect(&self, rect: NormalizedRect, input: &ModelInput) -> NormalizedRect {
    if self.image_width == 0 || self.image_height == 0 || input.width == 0 || input.height == 0 {
      return rect;
    }

    let (fx, fy) = self.content_fraction(input);
    NormalizedRect {
      x: (rect.x - 0.5 * (1.0 - fx)) / fx,
      y: (rect.y - 0.5 * (1.0 - fy)) / fy,
      width: rect.width / fx,
      height: rect.height / fy,
    }
  }
}
