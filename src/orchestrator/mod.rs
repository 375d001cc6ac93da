//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责提交、排队、并发控制和批次汇总，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用根对象
//! - 组装注册表、限制器、清理调度器、持久化
//! - 对外提供提交、查询、取消、健康检查
//! - 命令行批量模式
//!
//! ### `test_processor` - 单个测试处理器
//! - 等待槽位（可取消）
//! - maxDuration 超时、panic 隔离
//! - 终态写入注册表和持久化
//!
//! ### `batch_processor` - 批次监控
//! - 定期汇总子测试状态
//! - 终态后交给清理调度器
//!
//! ### `limiter` / `registry` / `retention`
//! - 槽位信号量与排队票
//! - 任务注册表（读写锁）
//! - 批次延迟清理
//!
//! ## 层次关系
//!
//! ```text
//! app (提交 / 查询 / 取消)
//!     ↓
//! test_processor (一个测试一个任务)     batch_processor (一个批次一个监控任务)
//!     ↓                                      ↓
//! workflow::GameFlow (单个游戏的阶段流程)   retention (延迟清理)
//!     ↓
//! services (能力层：会话 / 截图 / 评估 / 报告)
//!     ↓
//! infrastructure (基础设施：JsExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **提交不阻塞**：提交只登记任务并启动后台任务
//! 2. **资源隔离**：每个测试独占一个浏览器会话
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **失败隔离**：单个测试的失败只体现在它自己的状态和批次计数里

pub mod app;
pub mod batch_processor;
pub mod limiter;
pub mod registry;
pub mod retention;
pub mod test_processor;

// 重新导出主要类型
pub use app::{App, BatchSubmission, HealthSnapshot, RunSummary};
pub use batch_processor::BatchMonitor;
pub use limiter::{ConcurrencyLimiter, PendingTicket, Slot};
pub use registry::{JobRegistry, StatusCounts};
pub use retention::RetentionScheduler;
pub use test_processor::{TestProcessor, INTERNAL_ERROR_MESSAGE};
