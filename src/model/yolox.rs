// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolox.rs - YOLOX 预测器
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

use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  label::LabelTable,
  mapper::{AspectMode, CoordinateMapper, ModelInput},
  model::{
    DetectResult, Detection, Model,
    decode::{CLASS_OFFSET, decode_candidates},
  },
  nms::non_max_suppression,
  tensor::{RawTensor, ScaleDescriptor, TensorError, split_scales},
};

pub const DEFAULT_INPUT_SIZE: usize = 640;
pub const DEFAULT_STRIDES: [usize; 3] = [8, 16, 32];
pub const DEFAULT_NUM_CLASSES: usize = 80;
pub const DEFAULT_MIN_SCORE: f32 = 0.4;
pub const DEFAULT_MAX_IOU: f32 = 0.5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum YoloxError {
  #[error("阈值 {name} 无效: {value}, 取值范围应为 [0, 1]")]
  InvalidThreshold { name: &'static str, value: f32 },
  #[error("模型输入尺寸无效: {width}x{height}")]
  InvalidInputSize { width: usize, height: usize },
  #[error("步长 {0} 无效")]
  InvalidStride(usize),
  #[error("类别数量无效: {0}")]
  InvalidClassCount(usize),
  #[error("标签数量与模型类别数不匹配: 期望 {expected}, 实际 {actual}")]
  LabelCountMismatch { expected: usize, actual: usize },
  #[error("类别索引 {index} 超出标签表范围 {len}")]
  LabelOutOfRange { index: usize, len: usize },
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数 {key} 无效: {value}")]
  InvalidParameter { key: String, value: String },
}

/// YOLOX 预测器配置
#[derive(Debug, Clone, PartialEq)]
pub struct YoloxBuilder {
  input_width: usize,
  input_height: usize,
  strides: Vec<usize>,
  num_classes: usize,
  min_score: f32,
  max_iou: f32,
  aspect_mode: AspectMode,
}

impl Default for YoloxBuilder {
  fn default() -> Self {
    Self {
      input_width: DEFAULT_INPUT_SIZE,
      input_height: DEFAULT_INPUT_SIZE,
      strides: DEFAULT_STRIDES.to_vec(),
      num_classes: DEFAULT_NUM_CLASSES,
      min_score: DEFAULT_MIN_SCORE,
      max_iou: DEFAULT_MAX_IOU,
      aspect_mode: AspectMode::default(),
    }
  }
}

impl FromUrlWithScheme for YoloxBuilder {
  const SCHEME: &'static str = "yolox";
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, YoloxError> {
  value.parse().map_err(|_| {
    error!("无法解析参数 {}={}", key, value);
    YoloxError::InvalidParameter {
      key: key.to_string(),
      value: value.to_string(),
    }
  })
}

impl FromUrl for YoloxBuilder {
  type Error = YoloxError;

  /// 例如 `yolox:?width=640&height=640&min_score=0.4&max_iou=0.5&strides=8,16,32`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloxError::SchemeMismatch(format!(
        "模型配置必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = YoloxBuilder::default();
    for (key, value) in url.query_pairs() {
      match &*key {
        "width" => builder.input_width = parse_param(&key, &value)?,
        "height" => builder.input_height = parse_param(&key, &value)?,
        "size" => {
          let size = parse_param(&key, &value)?;
          builder.input_width = size;
          builder.input_height = size;
        }
        "strides" => {
          builder.strides = value
            .split(',')
            .map(|s| parse_param(&key, s.trim()))
            .collect::<Result<_, _>>()?
        }
        "classes" => builder.num_classes = parse_param(&key, &value)?,
        "min_score" => builder.min_score = parse_param(&key, &value)?,
        "max_iou" => builder.max_iou = parse_param(&key, &value)?,
        "aspect" => {
          builder.aspect_mode = value.parse().map_err(|_| YoloxError::InvalidParameter {
            key: key.to_string(),
            value: value.to_string(),
          })?
        }
        other => debug!("忽略未知参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl YoloxBuilder {
  pub fn input_size(mut self, width: usize, height: usize) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn strides(mut self, strides: &[usize]) -> Self {
    self.strides = strides.to_vec();
    self
  }

  pub fn num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn min_score(mut self, min_score: f32) -> Self {
    self.min_score = min_score;
    self
  }

  pub fn max_iou(mut self, max_iou: f32) -> Self {
    self.max_iou = max_iou;
    self
  }

  pub fn aspect_mode(mut self, aspect_mode: AspectMode) -> Self {
    self.aspect_mode = aspect_mode;
    self
  }

  fn check_threshold(name: &'static str, value: f32) -> Result<(), YoloxError> {
    if (0.0..=1.0).contains(&value) {
      Ok(())
    } else {
      error!("阈值 {} 超出范围: {}", name, value);
      Err(YoloxError::InvalidThreshold { name, value })
    }
  }

  /// 校验配置并构造预测器，配置错误在此处一次性暴露
  pub fn build(self, labels: LabelTable) -> Result<Yolox, YoloxError> {
    Self::check_threshold("min_score", self.min_score)?;
    Self::check_threshold("max_iou", self.max_iou)?;

    if self.input_width == 0 || self.input_height == 0 {
      error!(
        "模型输入尺寸无效: {}x{}",
        self.input_width, self.input_height
      );
      return Err(YoloxError::InvalidInputSize {
        width: self.input_width,
        height: self.input_height,
      });
    }

    if self.strides.is_empty() {
      error!("至少需要一个检测尺度");
      return Err(YoloxError::InvalidStride(0));
    }

    let mut scales = Vec::with_capacity(self.strides.len());
    for &stride in &self.strides {
      if stride == 0 {
        error!("步长不能为 0");
        return Err(YoloxError::InvalidStride(stride));
      }
      let scale = ScaleDescriptor::from_input(self.input_width, self.input_height, stride);
      if scale.cells() == 0 {
        error!(
          "步长 {} 对于输入 {}x{} 过大",
          stride, self.input_width, self.input_height
        );
        return Err(YoloxError::InvalidStride(stride));
      }
      scales.push(scale);
    }

    if self.num_classes == 0 {
      error!("类别数量不能为 0");
      return Err(YoloxError::InvalidClassCount(0));
    }

    if labels.len() != self.num_classes {
      error!(
        "标签数量与模型类别数不匹配: 期望 {}, 实际 {}",
        self.num_classes,
        labels.len()
      );
      return Err(YoloxError::LabelCountMismatch {
        expected: self.num_classes,
        actual: labels.len(),
      });
    }

    let yolox = Yolox {
      input: ModelInput {
        width: self.input_width,
        height: self.input_height,
        aspect_mode: self.aspect_mode,
      },
      scales: scales.into(),
      channels: CLASS_OFFSET + self.num_classes,
      min_score: self.min_score,
      max_iou: self.max_iou,
      labels,
      mapper: None,
    };

    info!(
      "YOLOX 预测器就绪: 输入 {}x{}, 尺度 {:?}, 类别 {}, min_score {}, max_iou {}",
      self.input_width, self.input_height, self.strides, self.num_classes, self.min_score, self.max_iou
    );
    debug!("期望张量长度: {}", yolox.expected_len());

    Ok(yolox)
  }
}

/// YOLOX 输出解码器，不持有任何推理引擎句柄
#[derive(Clone)]
pub struct Yolox {
  input: ModelInput,
  scales: Arc<[ScaleDescriptor]>,
  channels: usize,
  min_score: f32,
  max_iou: f32,
  labels: LabelTable,
  mapper: Option<Arc<dyn CoordinateMapper + Send + Sync>>,
}

impl fmt::Debug for Yolox {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Yolox")
      .field("input", &self.input)
      .field("scales", &self.scales)
      .field("channels", &self.channels)
      .field("min_score", &self.min_score)
      .field("max_iou", &self.max_iou)
      .field("labels", &self.labels.len())
      .field("mapper", &self.mapper.is_some())
      .finish()
  }
}

impl Yolox {
  pub fn builder() -> YoloxBuilder {
    YoloxBuilder::default()
  }

  /// 附加坐标映射器，[`Yolox::decode`] 与 [`Model::infer`] 均使用它
  pub fn with_mapper<M>(mut self, mapper: M) -> Self
  where
    M: CoordinateMapper + Send + Sync + 'static,
  {
    self.mapper = Some(Arc::new(mapper));
    self
  }

  pub fn input(&self) -> &ModelInput {
    &self.input
  }

  pub fn scales(&self) -> &[ScaleDescriptor] {
    &self.scales
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn min_score(&self) -> f32 {
    self.min_score
  }

  pub fn max_iou(&self) -> f32 {
    self.max_iou
  }

  /// 与尺度描述一致的张量元素数
  pub fn expected_len(&self) -> usize {
    self.scales.iter().map(|s| s.cells() * self.channels).sum()
  }

  /// 使用附加的映射器（若有）解码；需要其他映射方式时使用 [`Yolox::decode_with`]
  pub fn decode(&self, tensor: &RawTensor) -> Result<DetectResult, YoloxError> {
    let mapper = self
      .mapper
      .as_deref()
      .map(|m| m as &dyn CoordinateMapper);
    self.decode_with(tensor, mapper)
  }

  pub fn decode_with(
    &self,
    tensor: &RawTensor,
    mapper: Option<&dyn CoordinateMapper>,
  ) -> Result<DetectResult, YoloxError> {
    let views = split_scales(tensor.as_ref(), &self.scales, self.channels).inspect_err(|e| {
      error!("拒绝解码: {}", e);
    })?;

    let candidates = decode_candidates(&views, &self.scales, &self.input, self.min_score, mapper);

    let (rects, scores): (Vec<_>, Vec<_>) = candidates.iter().map(|c| (c.rect, c.score)).unzip();
    let keep = non_max_suppression(&rects, &scores, self.max_iou);
    debug!(
      "候选框 {} 个, 非极大值抑制后保留 {} 个",
      candidates.len(),
      keep.len()
    );

    let items = keep
      .into_iter()
      .map(|idx| {
        let candidate = &candidates[idx];
        let label = self
          .labels
          .get(candidate.class_index)
          .ok_or(YoloxError::LabelOutOfRange {
            index: candidate.class_index,
            len: self.labels.len(),
          })?;
        Ok(Detection {
          rect: candidate.rect,
          label: label.to_string(),
          class_id: candidate.class_index,
          score: candidate.score,
        })
      })
      .collect::<Result<Vec<_>, YoloxError>>()?;

    Ok(DetectResult::from(items))
  }
}

impl Model for Yolox {
  type Input = RawTensor;
  type Output = DetectResult;
  type Error = YoloxError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.decode(input)
  }
}
