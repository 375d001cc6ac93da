//! # Game QA Runner
//!
//! 浏览器小游戏的并发自动化测试服务
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `browser/` - 为每个测试启动独立的浏览器实例
//! - `infrastructure/` - `JsExecutor` 持有 Page，只暴露 eval() / 截图能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个测试会话
//! - `contracts` - 会话、控制台、界面、截图、录屏、评估、报告的 trait
//! - `ChromeLauncher` / `ChromeSession` - 基于 chromiumoxide 的实现
//! - `LlmEvaluator` - 视觉模型评估可玩性
//! - `ArtifactReportFactory` - 截图和报告落盘
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个游戏"的完整测试流程
//! - `TestCtx` - 上下文封装（test_id + 请求）
//! - `GameFlow` - 阶段编排（导航 → 开始 → 操作 → 评估 → 报告）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 应用根对象，提交、查询、取消
//! - `orchestrator/test_processor` - 单个测试：槽位、超时、panic 隔离
//! - `orchestrator/batch_processor` - 批次监控与延迟清理
//!
//! 外围还有 `api/`（axum 网关）和 `persistence/`（SQLite / 内存存储）。
//!
//! ## 模块结构
//!
//! - `api` - HTTP 路由：提交、查询、取消、批次、报告、健康检查
//! - `browser` - Chrome 启动参数与进程管理
//! - `config` - 环境变量配置与校验
//! - `error` - 错误类型
//! - `infrastructure` - JS 执行与截图
//! - `models` - 测试、批次、报告的数据结构，以及游戏列表加载
//! - `orchestrator` - 并发限流、状态表、测试与批次处理
//! - `persistence` - 测试记录的存储接口与实现
//! - `services` - 单个会话内的各项能力
//! - `utils` - 日志初始化
//! - `workflow` - 单个游戏的测试流程

pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use models::{BatchRequest, Report, TestJobView, TestRequest, TestStatus};
pub use orchestrator::App;
pub use services::Collaborators;
pub use workflow::{GameFlow, TestCtx};
