//! 批次延迟清理
//!
//! 每个批次最多一个待执行的清理定时器；重复调度会替换旧的定时器。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::orchestrator::registry::JobRegistry;
use crate::utils::short_id;

struct Timer {
    generation: u64,
    cancel: CancellationToken,
}

pub struct RetentionScheduler {
    registry: Arc<JobRegistry>,
    timers: Arc<Mutex<HashMap<Uuid, Timer>>>,
    next_generation: Mutex<u64>,
    shutdown: CancellationToken,
}

impl RetentionScheduler {
    pub fn new(registry: Arc<JobRegistry>, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Mutex::new(0),
            shutdown,
        }
    }

    /// `delay` 之后从注册表移除批次
    pub fn schedule(&self, batch_id: Uuid, delay: Duration) {
        let generation = {
            let mut next = self.next_generation.lock();
            *next += 1;
            *next
        };
        let cancel = self.shutdown.child_token();
        if let Some(old) = self.timers.lock().insert(
            batch_id,
            Timer {
                generation,
                cancel: cancel.clone(),
            },
        ) {
            old.cancel.cancel();
        }

        let registry = self.registry.clone();
        let timers = self.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("批次 {} 的清理已取消", short_id(&batch_id));
                }
                _ = sleep(delay) => {
                    if registry.remove_batch(batch_id).await {
                        info!("🧹 批次 {} 已过保留期，已清理", short_id(&batch_id));
                    }
                }
            }
            let mut timers = timers.lock();
            if timers.get(&batch_id).map(|t| t.generation) == Some(generation) {
                timers.remove(&batch_id);
            }
        });
    }

    /// 取消尚未执行的清理，返回是否存在
    pub fn cancel(&self, batch_id: Uuid) -> bool {
        match self.timers.lock().remove(&batch_id) {
            Some(timer) => {
                timer.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// 尚未执行的清理数量
    pub fn pending(&self) -> usize {
        self.timers.lock().len()
    }
}
