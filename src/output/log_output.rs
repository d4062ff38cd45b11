// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use tracing::info;

use crate::{FromUrl, FromUrlWithScheme, model::DetectResult, output::Render, tensor::RawTensor};

/// 通过 tracing 打印每个检测结果
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = Infallible;

  fn from_url(_url: &url::Url) -> Result<Self, Self::Error> {
    Ok(LogOutput)
  }
}

impl Render<RawTensor, DetectResult> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, _frame: &RawTensor, result: &DetectResult) -> Result<(), Self::Error> {
    info!("检测到 {} 个物体", result.len());
    for det in result.iter() {
      info!(
        "  - {}: {:.2}% at ({:.3}, {:.3}, {:.3}x{:.3})",
        det.label,
        det.score * 100.0,
        det.rect.x,
        det.rect.y,
        det.rect.width,
        det.rect.height
      );
    }
    Ok(())
  }
}
