//! 帧处理流水线 (Frame Processing Pipeline)
//!
//! 每个视频会话一条流水线, 帧严格顺序处理:
//! 读帧 → 检测 → 规范化 → 关联计数 → 标注 → JPEG编码 → 产出
//!
//! 状态机: Started (已重置) → Streaming → Ended | Failed
//! 单帧检测错误只降级为未标注帧, 只有帧源级错误才终止会话。

use crate::annotate;
use crate::broadcast::BroadcastHub;
use crate::counting::{adapter, CountSnapshot, SessionState};
use crate::detector::VehicleDetector;
use crate::source::FrameSource;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

// ========== 配置与输出类型 ==========

/// 流水线参数 (来自服务配置)
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub conf_threshold: f32,
    pub max_distance: f32,
    pub line_position: i32,
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        use crate::counting::types::{
            DEFAULT_CONF_THRESHOLD, DEFAULT_LINE_POSITION, DEFAULT_MAX_DISTANCE,
        };
        Self {
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            max_distance: DEFAULT_MAX_DISTANCE,
            line_position: DEFAULT_LINE_POSITION,
            jpeg_quality: 85,
        }
    }
}

/// 会话状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// 会话已重置, 尚未处理第一帧
    Started,
    /// 正在逐帧处理
    Streaming,
    /// 帧源耗尽, 正常结束
    Ended,
    /// 帧源级错误, 异常结束
    Failed,
}

/// 一帧的产出: 编码帧 + 计数变化时的快照
pub struct FrameOutput {
    pub jpeg: Vec<u8>,
    /// 本帧至少改变了一个计数器时为Some (广播触发条件)
    pub snapshot: Option<CountSnapshot>,
}

/// 会话通行证: 创建时的纪元令牌与共享纪元一致则会话仍为当前。
/// 取代检查发生在帧边界, 以及持会话锁的写入点之前 —
/// 被取代流水线的在途帧不会写入重置后的会话。
#[derive(Clone)]
pub struct SessionGate {
    epoch: Arc<AtomicU64>,
    token: u64,
}

impl SessionGate {
    pub fn new(epoch: Arc<AtomicU64>, token: u64) -> Self {
        Self { epoch, token }
    }

    /// 无纪元管理的场景 (单会话工具) 用的常真通行证
    pub fn always_current() -> Self {
        Self {
            epoch: Arc::new(AtomicU64::new(0)),
            token: 0,
        }
    }

    pub fn is_current(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.token
    }
}

// ========== 流水线 ==========

pub struct FramePipeline {
    source: Box<dyn FrameSource>,
    detector: Box<dyn VehicleDetector>,
    session: Arc<Mutex<SessionState>>,
    config: PipelineConfig,
    gate: SessionGate,
    state: PipelineState,

    // 统计
    frame_count: u64,
    /// 上一帧的处理耗时 (检测→编码), 首帧前为None
    last_step_secs: Option<f64>,
}

impl FramePipeline {
    /// 创建流水线并重置会话状态 (每个新视频请求恰好重置一次, 先于第一帧)
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn VehicleDetector>,
        session: Arc<Mutex<SessionState>>,
        config: PipelineConfig,
        gate: SessionGate,
    ) -> Self {
        session.lock().unwrap_or_else(|e| e.into_inner()).reset();
        Self {
            source,
            detector,
            session,
            config,
            gate,
            state: PipelineState::Started,
            frame_count: 0,
            last_step_secs: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// 处理下一帧。Ok(None)表示帧源耗尽或会话被取代 (终态后调用也返回None)。
    /// 同步阻塞, 调用方负责放到阻塞线程上执行。
    pub fn step(&mut self) -> Result<Option<FrameOutput>> {
        if matches!(self.state, PipelineState::Ended | PipelineState::Failed) {
            return Ok(None);
        }

        // 1. 读取下一帧 (源级错误是会话致命错误)
        let mut frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(frames = self.frame_count, "frame source exhausted");
                self.state = PipelineState::Ended;
                return Ok(None);
            }
            Err(err) => {
                self.state = PipelineState::Failed;
                return Err(err);
            }
        };
        self.state = PipelineState::Streaming;
        self.frame_count += 1;

        // 2. FPS取上一帧处理耗时 (检测→编码区间, 不含读帧等待与下游背压)
        let fps = fps_from(self.last_step_secs);
        let step_start = Instant::now();

        // 3. 检测 (单帧失败不终止会话, 该帧不标注直接透传)
        let raw = match self.detector.detect(&frame) {
            Ok(raw) => Some(raw),
            Err(err) => {
                warn!(frame = self.frame_count, error = %err, "detector failed, passing frame through");
                None
            }
        };

        let snapshot = match raw {
            Some(raw) => {
                // 4. 规范化 + 关联 + 过线计数 (单次持锁保证帧内原子性)
                let detections = adapter::normalize(&raw, self.config.conf_threshold);
                let (changed, snapshot) = {
                    let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
                    // 持锁复核纪元: 会话已被取代则丢弃本帧全部效果
                    if !self.gate.is_current() {
                        info!(frame = self.frame_count, "session superseded, discarding frame");
                        self.state = PipelineState::Ended;
                        return Ok(None);
                    }
                    let mut changed = false;
                    for det in &detections {
                        let obs = session.observe(
                            det,
                            self.config.max_distance,
                            self.config.line_position,
                        );
                        changed |= obs.counted_now;
                    }
                    (changed, session.snapshot())
                };

                // 5. 标注
                annotate::annotate_frame(
                    &mut frame,
                    &detections,
                    &snapshot,
                    self.config.line_position,
                    fps,
                );

                changed.then_some(snapshot)
            }
            None => None,
        };

        // 6. 编码
        let jpeg = annotate::encode_jpeg(&frame, self.config.jpeg_quality)?;
        self.last_step_secs = Some(step_start.elapsed().as_secs_f64());

        Ok(Some(FrameOutput { jpeg, snapshot }))
    }
}

/// 处理耗时 → 展示FPS, 无历史耗时或耗时为零时显示0
fn fps_from(step_secs: Option<f64>) -> f64 {
    match step_secs {
        Some(secs) if secs > 0.0 => 1.0 / secs,
        _ => 0.0,
    }
}

/// 快照广播策略: 仅当本帧改变了计数器时投递 (避免无变化的空转流量)
pub fn publish_if_changed(hub: &BroadcastHub, output: &FrameOutput) {
    if let Some(snapshot) = &output.snapshot {
        hub.publish(snapshot);
    }
}
