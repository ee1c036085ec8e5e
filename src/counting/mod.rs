//! 跟踪计数引擎
//! Tracking-and-counting engine:
//! 检测规范化 → 跨帧关联 → 过线计数 → 会话状态
pub mod adapter;
pub mod session;
pub mod tracker;
pub mod types;

pub use session::{Observation, SessionState};
pub use tracker::TrackedVehicle;
pub use types::{BoundingBox, CountSnapshot, Detection, RawDetection, VehicleClass};
