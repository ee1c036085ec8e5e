pub mod annotate; // 帧标注与JPEG编码
pub mod broadcast; // 计数快照广播
pub mod config; // 服务配置参数
pub mod counting; // 车辆跟踪计数引擎
pub mod detector; // 外部检测器接口
pub mod pipeline; // 帧处理流水线
pub mod server; // HTTP/WebSocket服务
pub mod source; // 帧源接口

pub use crate::broadcast::BroadcastHub;
pub use crate::counting::{
    CountSnapshot, Detection, RawDetection, SessionState, VehicleClass,
};
pub use crate::pipeline::{FrameOutput, FramePipeline, PipelineConfig, PipelineState, SessionGate};
pub use crate::server::AppState;

/// 生成时间串 (上传文件命名用)
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Utc::now().format(&fmt).to_string()
}
