//! 外部检测器接口
//! External detector seam: the model and its weights are opaque to this crate
//!
//! 流水线对每帧同步调用detect, 检测器延迟是每帧的主要开销。

use crate::counting::RawDetection;
use anyhow::Result;
use image::RgbImage;

/// 车辆检测器统一接口
///
/// 所有检测后端 (ONNX模型、远程推理服务等) 都应实现此接口
pub trait VehicleDetector: Send {
    /// 对一帧运行检测, 返回原始检测序列 (可能为空)
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<RawDetection>>;
}

/// 空检测器: 不产生任何检测。
/// 未接入真实模型时的默认后端, 服务照常推流但不计数。
pub struct NullDetector;

impl VehicleDetector for NullDetector {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }
}
