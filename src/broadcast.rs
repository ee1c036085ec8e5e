//! 计数快照广播中心
//! Broadcast hub: fans count snapshots out to all live subscribers
//!
//! 订阅者注册表独立加锁, 与会话状态的同步完全解耦。
//! publish使用有界通道的try_send: 慢订阅者跳过本次投递,
//! 已断开的订阅者自动移除, 任何情况下都不会阻塞帧流水线。

use crate::counting::CountSnapshot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// 每个订阅者的通道容量 (积压超过即丢弃本次快照)
const SUBSCRIBER_CAPACITY: usize = 16;

/// 订阅者句柄, 断开时用于注销
pub type SubscriberId = u64;

#[derive(Default)]
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<CountSnapshot>>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册表锁, 中毒时恢复内部数据继续使用
    fn registry(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<CountSnapshot>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 注册一个新订阅者, 返回其ID与接收端
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<CountSnapshot>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry().insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.registry().remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    /// 向所有订阅者投递快照。
    /// 单个订阅者投递失败不影响其他订阅者, 也不向调用方传播错误。
    pub fn publish(&self, snapshot: &CountSnapshot) {
        let mut subscribers = self.registry();

        let mut dead = Vec::new();
        for (id, tx) in subscribers.iter() {
            match tx.try_send(snapshot.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // 慢订阅者: 跳过本次投递, 保留订阅
                    debug!(subscriber = id, "subscriber backlog full, skipping snapshot");
                }
                Err(TrySendError::Closed(_)) => {
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            debug!(subscriber = id, "removing disconnected subscriber");
            subscribers.remove(&id);
        }
    }
}
