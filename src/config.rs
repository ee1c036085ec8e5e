//! 服务配置参数
use crate::counting::types::{
    DEFAULT_CONF_THRESHOLD, DEFAULT_LINE_POSITION, DEFAULT_MAX_DISTANCE,
};
use crate::pipeline::PipelineConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "vcs-server", about = "Vehicle counting stream server")]
pub struct Args {
    /// 监听地址
    #[arg(long, default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// 计数线位置 (像素Y坐标)
    #[arg(long, default_value_t = DEFAULT_LINE_POSITION)]
    pub line_position: i32,

    /// 检测置信度阈值
    #[arg(long, default_value_t = DEFAULT_CONF_THRESHOLD)]
    pub conf_threshold: f32,

    /// 最大关联距离 (像素)
    #[arg(long, default_value_t = DEFAULT_MAX_DISTANCE)]
    pub max_distance: f32,

    /// JPEG编码质量 (1-100)
    #[arg(long, default_value_t = 85)]
    pub jpeg_quality: u8,

    /// 上传文件存放目录
    #[arg(long, default_value = "uploads")]
    pub upload_dir: PathBuf,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            conf_threshold: self.conf_threshold,
            max_distance: self.max_distance,
            line_position: self.line_position,
            jpeg_quality: self.jpeg_quality,
        }
    }
}
