//! 帧源接口与图片序列帧源
//! Frame sources: the container decoding itself stays an external collaborator
//!
//! 容器解封装/解码不在本系统范围内, 流水线只消费已解码的RGB帧。
//! 内置的ImageDirSource按文件名顺序读取目录中的静态图片帧。

use anyhow::{bail, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// 帧源统一接口: 顺序产出已解码帧, 耗尽返回None
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// 图片序列帧源 (目录内按文件名排序的静态图片)
pub struct ImageDirSource {
    paths: Vec<PathBuf>,
    index: usize,
}

impl ImageDirSource {
    const FRAME_EXTENSIONS: [&'static str; 4] = ["jpg", "jpeg", "png", "bmp"];

    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to open frame directory {}", dir.display()))?
        {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| Self::FRAME_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if is_frame {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            bail!("no frames found in {}", dir.display());
        }
        paths.sort();
        Ok(Self { paths, index: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.index) else {
            return Ok(None);
        };
        self.index += 1;

        // 单帧解码失败视为源级错误 (不可恢复), 向上传播
        let img = image::open(path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?;
        Ok(Some(img.to_rgb8()))
    }
}

/// 打开路径对应的帧源。目录按图片序列处理;
/// 视频容器需要外部解码器, 这里直接拒绝。
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>> {
    if path.is_dir() {
        return Ok(Box::new(ImageDirSource::open(path)?));
    }
    bail!(
        "no decoder available for {}; provide a directory of decoded frames",
        path.display()
    )
}
