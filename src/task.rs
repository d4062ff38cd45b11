// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 解码任务
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};
use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 结果中检测数量，用于任务统计
pub trait DetectionCount {
  fn detection_count(&self) -> usize;
}

impl DetectionCount for crate::model::DetectResult {
  fn detection_count(&self) -> usize {
    self.len()
  }
}

pub struct OneShotTask;

impl<
  F,
  D: DetectionCount,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let tensor = input.next().ok_or_else(|| anyhow::anyhow!("没有输入张量"))?;
    info!("输入张量获取成功，开始解码...");
    let now = Instant::now();
    let result = model.infer(&tensor)?;
    let elapsed = now.elapsed();
    info!(
      "解码完成，耗时: {:.2?}，检测到 {} 个物体",
      elapsed,
      result.detection_count()
    );
    output.render_result(&tensor, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一张量重复解码，统计平均耗时（跳过前两次预热）
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }
}

impl<
  F,
  D: DetectionCount,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    const WARMUP: usize = 2;

    info!("开始任务...");
    let tensor = input.next().ok_or_else(|| anyhow::anyhow!("没有输入张量"))?;
    info!("输入张量获取成功，重复解码 {} 次...", self.repeat);
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&tensor)?;
      let elapsed = now.elapsed();
      info!(
        "({})解码完成，耗时: {:.2?}，检测到 {} 个物体",
        i,
        elapsed,
        result.detection_count()
      );
      output.render_result(&tensor, &result)?;
      times.push(elapsed);
    }

    if times.len() > WARMUP {
      warn!(
        "平均解码时间: {:.2?}",
        times.iter().skip(WARMUP).sum::<Duration>() / (times.len() - WARMUP) as u32
      );
    } else {
      warn!("重复次数不足 {}，不统计平均时间", WARMUP + 1);
    }

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<
  F,
  D: DetectionCount,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let interrupted = Arc::new(AtomicBool::new(false));
    {
      let interrupted = interrupted.clone();
      ctrlc::set_handler(move || {
        info!("收到中断信号，处理完当前张量后退出...");
        interrupted.store(true, Ordering::SeqCst);
      })?;
    }

    let mut frame_index = 0usize;
    let mut total_detections = 0usize;
    for tensor in input {
      frame_index += 1;
      let now = Instant::now();
      let result = model.infer(&tensor)?;
      let elapsed_a = now.elapsed();
      total_detections += result.detection_count();
      output.render_result(&tensor, &result)?;
      let elapsed_b = now.elapsed();
      info!(
        "第 {} 个张量: {} 个物体，耗时: {:.2?} / {:.2?}",
        frame_index,
        result.detection_count(),
        elapsed_a,
        elapsed_b
      );
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定数量 {}, 退出任务循环", frame_index);
        break;
      }
      if interrupted.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!(
      "任务完成，共处理 {} 个张量，检测到 {} 个物体",
      frame_index, total_detections
    );
    Ok(())
  }
}
