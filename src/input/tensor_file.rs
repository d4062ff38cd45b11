// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/tensor_file.rs - 张量文件输入
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, tensor::RawTensor, url_path};

const F32_BYTES: usize = std::mem::size_of::<f32>();

#[derive(Error, Debug)]
pub enum TensorFileInputError {
  #[error("URI schema mismatch: {0}")]
  SchemaMismatch(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("File {path} has {len} bytes, not a multiple of 4")]
  Misaligned { path: String, len: usize },
  #[error("No tensor file found under {0}")]
  Empty(String),
}

/// 读取一个小端序 f32 张量文件
pub fn read_tensor_file<P: AsRef<Path>>(path: P) -> Result<RawTensor, TensorFileInputError> {
  let path = path.as_ref();
  let bytes = std::fs::read(path)?;
  if bytes.len() % F32_BYTES != 0 {
    return Err(TensorFileInputError::Misaligned {
      path: path.display().to_string(),
      len: bytes.len(),
    });
  }

  let data: Vec<f32> = bytes
    .chunks_exact(F32_BYTES)
    .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    .collect();
  debug!("读取张量文件 {}: {} 个元素", path.display(), data.len());

  Ok(RawTensor::from(data))
}

/// 以小端序 f32 写出张量文件
pub fn write_tensor_file<P: AsRef<Path>>(
  path: P,
  tensor: &RawTensor,
) -> Result<(), TensorFileInputError> {
  let path = path.as_ref();
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  let bytes: Vec<u8> = tensor
    .as_ref()
    .iter()
    .flat_map(|value| value.to_le_bytes())
    .collect();
  std::fs::write(path, bytes)?;
  Ok(())
}

/// 单个张量文件，或目录中按文件名排序的一组张量文件
pub struct TensorFileInput {
  files: Vec<PathBuf>,
  // 单个文件在打开时即读取
  loaded: Option<RawTensor>,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileInput {
  type Error = TensorFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorFileInputError::SchemaMismatch(url.scheme().to_string()));
    }

    Self::open(url_path(url))
  }
}

impl TensorFileInput {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TensorFileInputError> {
    let path = path.as_ref();
    if !path.is_dir() {
      let tensor = read_tensor_file(path).inspect_err(|e| {
        error!("读取张量文件失败: {}", e);
      })?;
      info!("张量输入: 单个文件 {}", path.display());
      return Ok(Self {
        files: vec![path.to_path_buf()],
        loaded: Some(tensor),
      });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
      let entry = entry?;
      let metadata = entry.metadata()?;
      if !metadata.is_file() {
        continue;
      }
      let len = metadata.len() as usize;
      if len % F32_BYTES != 0 {
        error!("张量文件长度不是 4 的倍数: {}", entry.path().display());
        return Err(TensorFileInputError::Misaligned {
          path: entry.path().display().to_string(),
          len,
        });
      }
      files.push(entry.path());
    }
    files.sort();

    if files.is_empty() {
      error!("目录中没有张量文件: {}", path.display());
      return Err(TensorFileInputError::Empty(path.display().to_string()));
    }

    info!("张量输入: {} 个文件, 来源 {}", files.len(), path.display());
    Ok(Self {
      files,
      loaded: None,
    })
  }

  pub fn files(&self) -> &[PathBuf] {
    &self.files
  }
}

impl IntoIterator for TensorFileInput {
  type Item = RawTensor;
  type IntoIter = TensorFileIter;

  fn into_iter(self) -> Self::IntoIter {
    let mut files = self.files.into_iter();
    if self.loaded.is_some() {
      files.next();
    }
    TensorFileIter {
      loaded: self.loaded,
      files,
    }
  }
}

/// 逐个读取张量文件，遇到读取失败时记录错误并结束
pub struct TensorFileIter {
  loaded: Option<RawTensor>,
  files: std::vec::IntoIter<PathBuf>,
}

impl Iterator for TensorFileIter {
  type Item = RawTensor;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(tensor) = self.loaded.take() {
      return Some(tensor);
    }

    let path = self.files.next()?;
    match read_tensor_file(&path) {
      Ok(tensor) => Some(tensor),
      Err(e) => {
        error!("读取张量文件 {} 失败, 停止输入: {}", path.display(), e);
        self.files = Vec::new().into_iter();
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shanan-yolox-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn file_round_trip() {
    let dir = scratch_dir("roundtrip");
    let path = dir.join("frame.f32");
    let tensor = RawTensor::from(vec![0.0, -1.5, 3.25, f32::MAX]);
    write_tensor_file(&path, &tensor).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 16);
    assert_eq!(read_tensor_file(&path).unwrap(), tensor);
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn misaligned_file_is_rejected() {
    let dir = scratch_dir("misaligned");
    let path = dir.join("bad.f32");
    std::fs::write(&path, [0u8; 7]).unwrap();
    assert!(matches!(
      read_tensor_file(&path),
      Err(TensorFileInputError::Misaligned { len: 7, .. })
    ));
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn misaligned_single_file_fails_at_open() {
    let dir = scratch_dir("single-misaligned");
    let path = dir.join("frame.f32");
    std::fs::write(&path, [0u8; 7]).unwrap();

    let url = Url::parse(&format!("tensor://{}", path.display())).unwrap();
    assert!(matches!(
      TensorFileInput::from_url(&url),
      Err(TensorFileInputError::Misaligned { len: 7, .. })
    ));
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn missing_single_file_fails_at_open() {
    let dir = scratch_dir("single-missing");
    assert!(matches!(
      TensorFileInput::open(dir.join("absent.f32")),
      Err(TensorFileInputError::IoError(_))
    ));
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn single_file_yields_one_tensor() {
    let dir = scratch_dir("single");
    let path = dir.join("frame.f32");
    let tensor = RawTensor::from(vec![1.0, 2.0]);
    write_tensor_file(&path, &tensor).unwrap();

    let input = TensorFileInput::open(&path).unwrap();
    // 打开后删除文件，张量已在打开时读取
    std::fs::remove_file(&path).unwrap();
    let tensors: Vec<RawTensor> = input.into_iter().collect();
    assert_eq!(tensors, vec![tensor]);
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn directory_is_read_in_name_order() {
    let dir = scratch_dir("directory");
    write_tensor_file(dir.join("b.f32"), &RawTensor::from(vec![2.0])).unwrap();
    write_tensor_file(dir.join("a.f32"), &RawTensor::from(vec![1.0])).unwrap();
    write_tensor_file(dir.join("c.f32"), &RawTensor::from(vec![3.0])).unwrap();

    let url = Url::parse(&format!("tensor://{}", dir.display())).unwrap();
    let input = TensorFileInput::from_url(&url).unwrap();
    assert_eq!(input.files().len(), 3);

    let values: Vec<f32> = input.into_iter().map(|t| t.as_ref()[0]).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn misaligned_file_in_directory_fails_at_open() {
    let dir = scratch_dir("directory-misaligned");
    write_tensor_file(dir.join("a.f32"), &RawTensor::from(vec![1.0])).unwrap();
    std::fs::write(dir.join("b.f32"), [0u8; 3]).unwrap();

    assert!(matches!(
      TensorFileInput::open(&dir),
      Err(TensorFileInputError::Misaligned { len: 3, .. })
    ));
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn read_failure_ends_directory_stream() {
    let dir = scratch_dir("directory-vanished");
    write_tensor_file(dir.join("a.f32"), &RawTensor::from(vec![1.0])).unwrap();
    write_tensor_file(dir.join("b.f32"), &RawTensor::from(vec![2.0])).unwrap();
    write_tensor_file(dir.join("c.f32"), &RawTensor::from(vec![3.0])).unwrap();

    let input = TensorFileInput::open(&dir).unwrap();
    std::fs::remove_file(dir.join("b.f32")).unwrap();

    let values: Vec<f32> = input.into_iter().map(|t| t.as_ref()[0]).collect();
    assert_eq!(values, vec![1.0]);
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("image:///tmp/frame.png").unwrap();
    assert!(matches!(
      TensorFileInput::from_url(&url),
      Err(TensorFileInputError::SchemaMismatch(_))
    ));
  }
}
