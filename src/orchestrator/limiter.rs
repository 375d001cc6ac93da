//! 并发槽位限制
//!
//! 槽位是信号量许可，丢弃即归还；等待队列按 FIFO 排队。
//! 等待中的测试还各持一张排队票，用于限制积压数量。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{AppError, AppResult};

pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    /// 0 表示不限制
    max_pending: usize,
    pending: Arc<AtomicUsize>,
}

/// 排队票：从提交到拿到槽位（或放弃）期间持有
#[derive(Debug)]
pub struct PendingTicket {
    pending: Arc<AtomicUsize>,
}

impl Drop for PendingTicket {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 执行槽位，丢弃时归还
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize, max_pending: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            max_pending,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 一次性预留 `n` 张排队票，超过上限时一张都不发
    pub fn reserve(&self, n: usize) -> AppResult<Vec<PendingTicket>> {
        let mut current = self.pending.load(Ordering::Acquire);
        loop {
            let next = current + n;
            if self.max_pending > 0 && next > self.max_pending {
                return Err(AppError::Capacity {
                    pending: current,
                    limit: self.max_pending,
                });
            }
            match self.pending.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        Ok((0..n)
            .map(|_| PendingTicket {
                pending: self.pending.clone(),
            })
            .collect())
    }

    /// 等待空闲槽位；拿到槽位后排队票作废
    pub async fn acquire(&self, ticket: PendingTicket) -> AppResult<Slot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Other("concurrency limiter closed".to_string()))?;
        drop(ticket);
        Ok(Slot { _permit: permit })
    }

    /// 关闭后所有等待者立即失败
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.semaphore.available_permits())
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}
