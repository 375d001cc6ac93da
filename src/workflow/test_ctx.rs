//! 测试执行上下文
//!
//! 封装"我正在执行哪个测试"这一信息

use std::fmt::Display;

use uuid::Uuid;

use crate::models::TestRequest;
use crate::utils::short_id;

/// 单个测试的执行上下文
#[derive(Debug, Clone)]
pub struct TestCtx {
    /// 测试ID
    pub test_id: Uuid,

    /// 所属批次（仅用于日志显示）
    pub batch_id: Option<Uuid>,

    pub request: TestRequest,

    short: String,
}

impl TestCtx {
    pub fn new(test_id: Uuid, batch_id: Option<Uuid>, request: TestRequest) -> Self {
        Self {
            test_id,
            batch_id,
            request,
            short: short_id(&test_id),
        }
    }
}

impl Display for TestCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[测试 {}]", self.short)
    }
}
