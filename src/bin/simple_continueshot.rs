// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续解码
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_yolox::{
  FromUrl,
  input::InputWrapper,
  label::LabelTable,
  mapper::ImageMapper,
  model::YoloxBuilder,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use tracing::info;

/// Shanan YOLOX 解码参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型配置，例如 yolox:?size=640&min_score=0.4&max_iou=0.5
  #[arg(long, value_name = "MODEL", default_value = "yolox:")]
  pub model: Url,
  /// 标签表，coco: 或 labels:///path/to/labels.txt
  #[arg(long, value_name = "LABELS", default_value = "coco:")]
  pub labels: Url,
  /// 输入来源，tensor:///path/to/file-or-directory
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，log: 或 folder:///path/to/records
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,
  /// 原始图像宽度，与高度一同给出时把检测框映射回原图
  #[arg(long, value_name = "WIDTH", requires = "image_height")]
  pub image_width: Option<usize>,
  /// 原始图像高度
  #[arg(long, value_name = "HEIGHT", requires = "image_width")]
  pub image_height: Option<usize>,
  /// 最多处理的张量数量
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型配置: {}", args.model);
  info!("标签表: {}", args.labels);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let labels = LabelTable::from_url(&args.labels)?;
  let mut model = YoloxBuilder::from_url(&args.model)?.build(labels)?;
  if let (Some(width), Some(height)) = (args.image_width, args.image_height) {
    info!("检测框将映射回 {}x{} 的原图", width, height);
    model = model.with_mapper(ImageMapper::new(width, height));
  }
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .run_task(input.into_iter(), model, output)?;

  Ok(())
}
