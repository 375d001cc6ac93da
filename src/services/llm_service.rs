//! LLM 评估服务 - 业务能力层
//!
//! 只负责"看截图打分"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 截图以 base64 data URL 形式随用户消息发送（Vision API）
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use std::sync::OnceLock;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, EvaluatorError};
use crate::models::{LogEntry, Score, Screenshot};
use crate::services::contracts::Evaluator;
use crate::utils::logging::truncate_text;

/// 未给出 passed 时的及格线
const PASS_THRESHOLD: u8 = 60;
/// 提示词中最多附带的控制台错误条数
const MAX_ERRORS_IN_PROMPT: usize = 10;

const SYSTEM_MESSAGE: &str = "你是一名专业的网页游戏 QA 测试员。\
    你会看到同一个游戏在不同阶段的截图（加载后、游戏过程中、结束前）以及浏览器控制台错误。\
    请判断游戏是否能正常加载、是否对输入有响应、画面是否有明显异常，并给出可玩性评分。";

/// 基于 LLM 的可玩性评估器
pub struct LlmEvaluator {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmEvaluator {
    /// 创建新的评估器
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `image_urls`: 图片 URL（可以是 data URL），会追加到用户消息中
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
        image_urls: &[String],
    ) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!(
            "用户消息长度: {} 字符，包含 {} 张图片",
            user_message.len(),
            image_urls.len()
        );

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| AppError::evaluator_failed(&self.model_name, e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = if image_urls.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()
        } else {
            // Vision API：文本 + 多张图片
            let mut content_parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: user_message.to_string(),
                },
            )];
            for url in image_urls {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::Low),
                        },
                    },
                ));
            }
            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
        }
        .map_err(|e| AppError::evaluator_failed(&self.model_name, e))?;

        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.2)
            .max_tokens(1024u32)
            .build()
            .map_err(|e| AppError::evaluator_failed(&self.model_name, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::evaluator_failed(&self.model_name, e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| EvaluatorError::EmptyResponse {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(&self, images: &[Screenshot], logs: &[LogEntry]) -> AppResult<Score> {
        if images.is_empty() {
            return Err(EvaluatorError::NoImages.into());
        }

        let image_urls: Vec<String> = images.iter().map(to_data_url).collect();
        let user_message = build_evaluation_message(images, logs);

        let response = self
            .send_to_llm(&user_message, Some(SYSTEM_MESSAGE), &image_urls)
            .await?;

        let score = parse_score(&response)?;
        debug!(
            "LLM 评分: {} (passed: {})",
            score.playability, score.passed
        );
        Ok(score)
    }
}

fn to_data_url(shot: &Screenshot) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(&shot.png))
}

/// 构建评估提示词：截图顺序说明 + 控制台错误摘要
fn build_evaluation_message(images: &[Screenshot], logs: &[LogEntry]) -> String {
    let order: Vec<String> = images
        .iter()
        .enumerate()
        .map(|(i, s)| format!("  截图 {}: {}", i + 1, s.phase_tag))
        .collect();

    let errors: Vec<&LogEntry> = logs.iter().filter(|l| l.is_error()).collect();
    let error_info = if errors.is_empty() {
        "  无".to_string()
    } else {
        let mut lines: Vec<String> = errors
            .iter()
            .take(MAX_ERRORS_IN_PROMPT)
            .map(|l| format!("  [{}] {}", l.level, truncate_text(&l.text, 200)))
            .collect();
        if errors.len() > MAX_ERRORS_IN_PROMPT {
            lines.push(format!("  ……另有 {} 条错误", errors.len() - MAX_ERRORS_IN_PROMPT));
        }
        lines.join("\n")
    };

    format!(
        r#"请评估这个网页游戏的可玩性。

截图顺序：
{}

控制台日志共 {} 条，其中错误：
{}

【判断标准】
1. 游戏是否成功加载（不是空白页、错误页或一直在加载）
2. 游戏过程中的截图之间画面是否有变化（说明游戏对输入有响应）
3. 是否有明显的渲染错误、遮挡弹窗或崩溃
4. 控制台错误是否影响游戏运行

只返回一个 JSON 对象，不要返回任何其他内容：
{{"playability": 0-100 的整数, "passed": true 或 false, "summary": "一句话总结", "issues": ["发现的问题"]}}"#,
        order.join("\n"),
        logs.len(),
        error_info
    )
}

#[derive(Debug, Deserialize)]
struct RawScore {
    #[serde(alias = "score")]
    playability: f64,
    passed: Option<bool>,
    summary: Option<String>,
    #[serde(default)]
    issues: Vec<String>,
}

fn json_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"))
}

fn bare_score() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})\s*(?:/\s*100|分|%)").expect("valid regex"))
}

/// 解析评估响应
///
/// 优先解析 JSON（允许被 markdown 代码块包裹），否则从文本中提取 "NN/100" 形式的分数。
fn parse_score(response: &str) -> AppResult<Score> {
    let response = response.trim();

    if let Some(block) = json_block().find(response) {
        match serde_json::from_str::<RawScore>(block.as_str()) {
            Ok(raw) => {
                let playability = raw.playability.round().clamp(0.0, 100.0) as u8;
                return Ok(Score {
                    playability,
                    passed: raw.passed.unwrap_or(playability >= PASS_THRESHOLD),
                    summary: raw.summary.unwrap_or_default(),
                    issues: raw.issues,
                });
            }
            Err(e) => debug!("评估响应中的 JSON 无法解析: {}", e),
        }
    }

    if let Some(caps) = bare_score().captures(response) {
        if let Ok(value) = caps[1].parse::<u16>() {
            let playability = value.min(100) as u8;
            warn!("评估响应不是 JSON，从文本中提取到分数: {}", playability);
            return Ok(Score {
                playability,
                passed: playability >= PASS_THRESHOLD,
                summary: truncate_text(response, 200),
                issues: Vec::new(),
            });
        }
    }

    Err(EvaluatorError::UnparseableScore {
        response: truncate_text(response, 200),
    }
    .into())
}
