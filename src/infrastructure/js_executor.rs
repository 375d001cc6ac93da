//! JS 执行器 - 基础设施层
//!
//! 持有一个测试会话的 Page，只暴露"执行 JS"和"截图"的能力

use std::sync::Arc;

use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::AppResult;

/// JS 执行器
///
/// 职责：
/// - 持有会话的 Page 资源
/// - 暴露 eval() / screenshot() 能力
/// - 不认识游戏、阶段和测试任务
#[derive(Clone)]
pub struct JsExecutor {
    page: Arc<Page>,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self {
            page: Arc::new(page),
        }
    }

    /// 获取 page 的引用（用于导航、查找元素等操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 注册在每个新文档加载前执行的脚本
    pub async fn eval_on_new_document(&self, js_code: impl Into<String>) -> AppResult<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(js_code.into()))
            .await?;
        Ok(())
    }

    /// 截取当前视口的 PNG
    pub async fn screenshot_png(&self) -> AppResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        Ok(self.page.screenshot(params).await?)
    }
}
