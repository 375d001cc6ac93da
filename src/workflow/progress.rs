//! 流程进度上报
//!
//! 流程层只声明"到了哪个阶段"，由编排层决定写到哪里（注册表、持久化）。

use async_trait::async_trait;

use crate::models::Phase;

#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// 进入新阶段，写入该阶段的检查点进度和描述
    async fn phase(&self, phase: Phase);

    /// 阶段内的细粒度进度（只写内存）
    async fn progress(&self, phase: Phase, progress: u8);

    /// 记录软失败警告
    async fn warning(&self, phase: Phase, warning: &str);
}
