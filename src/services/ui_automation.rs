//! 页面交互服务 - 业务能力层
//!
//! 只负责"点按钮、发按键、看渲染方式"，不关心流程顺序

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::JsExecutor;
use crate::models::RenderMode;
use crate::services::contracts::UiAutomation;

/// cookie 同意按钮上常见的文案
const CONSENT_WORDS: &[&str] = &[
    "accept", "i accept", "agree", "i agree", "allow all", "got it", "i understand", "ok", "okay",
    "同意", "接受", "我知道了",
];

/// 常见 CMP 的同意按钮，优先于文案匹配
const CONSENT_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    ".fc-cta-consent",
    "#didomi-notice-agree-button",
    "#truste-consent-button",
    ".cc-allow",
    "[data-testid=\"uc-accept-all-button\"]",
];

/// 开始按钮上常见的文案
const START_WORDS: &[&str] = &[
    "play", "start", "begin", "play now", "start game", "tap to play", "开始", "开始游戏",
];

const START_SELECTORS: &[&str] = &[".play-button", "#play", "#start", "#start-button"];

/// 文案前缀匹配时允许的最大词数
const MAX_LABEL_WORDS: usize = 4;

/// 基于 JS 探测的页面交互
///
/// 最近一次探测到的渲染方式决定按键发往 canvas 还是 body。
pub struct ChromeUi {
    executor: JsExecutor,
    render_mode: Mutex<RenderMode>,
}

/// 第一步：命中专用选择器直接点击，否则返回候选按钮文案
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateScan {
    clicked: bool,
    label: Option<String>,
    #[serde(default)]
    candidates: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderProbe {
    canvas_count: usize,
    largest_canvas_area: f64,
    viewport_area: f64,
}

impl ChromeUi {
    pub fn new(executor: JsExecutor) -> Self {
        Self {
            executor,
            render_mode: Mutex::new(RenderMode::Dom),
        }
    }

    /// 先试专用选择器，再按文案匹配候选按钮，点击第一个命中的可见元素
    async fn click_matching(&self, words: &[&str], selectors: &[&str]) -> AppResult<bool> {
        let selectors_json = serde_json::to_string(selectors)?;
        let js = format!(
            r#"
            (() => {{
                const preferred = {selectors_json};
                const visible = (el) => {{
                    const r = el.getBoundingClientRect();
                    const s = window.getComputedStyle(el);
                    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
                }};
                for (const sel of preferred) {{
                    const el = document.querySelector(sel);
                    if (el && visible(el)) {{
                        el.click();
                        return {{ clicked: true, label: sel, candidates: [] }};
                    }}
                }}
                // 会跳转页面的链接不算按钮
                const navigates = (el) => {{
                    if (el.tagName !== 'A') return false;
                    const href = (el.getAttribute('href') || '').trim();
                    return href !== '' && href !== '#' && !href.startsWith('javascript:');
                }};
                const candidates = [];
                const all = 'button, a, [role="button"], input[type="button"], input[type="submit"]';
                for (const el of document.querySelectorAll(all)) {{
                    el.removeAttribute('data-qa-candidate');
                    if (navigates(el) || !visible(el)) continue;
                    const label = (el.innerText || el.value || el.getAttribute('aria-label') || '').trim();
                    if (!label) continue;
                    el.setAttribute('data-qa-candidate', String(candidates.length));
                    candidates.push(label);
                }}
                return {{ clicked: false, label: null, candidates }};
            }})()
            "#
        );
        let scan: CandidateScan = self.executor.eval_as(js).await?;
        if scan.clicked {
            debug!("点击了按钮: {}", scan.label.as_deref().unwrap_or_default());
            return Ok(true);
        }

        let Some(index) = scan
            .candidates
            .iter()
            .position(|label| matches_label(label, words))
        else {
            return Ok(false);
        };
        let js = format!(
            r#"
            (() => {{
                const el = document.querySelector('[data-qa-candidate="{index}"]');
                if (!el) return false;
                el.click();
                return true;
            }})()
            "#
        );
        let clicked: bool = self.executor.eval_as(js).await?;
        if clicked {
            debug!("点击了按钮: {}", scan.candidates[index]);
        }
        Ok(clicked)
    }
}

#[async_trait]
impl UiAutomation for ChromeUi {
    async fn accept_consent(&self) -> AppResult<bool> {
        self.click_matching(CONSENT_WORDS, CONSENT_SELECTORS).await
    }

    async fn click_start(&self) -> AppResult<bool> {
        self.click_matching(START_WORDS, START_SELECTORS).await
    }

    async fn detect_render_mode(&self) -> AppResult<RenderMode> {
        let probe: RenderProbe = self
            .executor
            .eval_as(
                r#"
                (() => {
                    const canvases = Array.from(document.querySelectorAll('canvas'));
                    const areas = canvases.map((c) => {
                        const r = c.getBoundingClientRect();
                        return r.width * r.height;
                    });
                    return {
                        canvasCount: canvases.length,
                        largestCanvasArea: areas.length ? Math.max(...areas) : 0,
                        viewportArea: window.innerWidth * window.innerHeight,
                    };
                })()
                "#,
            )
            .await?;
        let mode = classify_render_mode(&probe);
        *self.render_mode.lock() = mode;
        Ok(mode)
    }

    async fn send_key(&self, key: &str) -> AppResult<bool> {
        let mode = *self.render_mode.lock();
        let selector = match mode {
            RenderMode::Canvas => "canvas",
            RenderMode::Dom => "body",
        };
        let element = match self.executor.page().find_element(selector).await {
            Ok(element) => element,
            Err(e) => {
                debug!("未找到 {} 元素: {}", selector, e);
                return Ok(false);
            }
        };
        element.press_key(key).await?;
        Ok(true)
    }
}

/// 标点视为分隔符，统一小写并压缩空白
fn normalize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 文案与某个短语完全一致，或以该短语整词开头且足够短
fn matches_label(label: &str, words: &[&str]) -> bool {
    let label = normalize_label(label);
    if label.is_empty() || label.split(' ').count() > MAX_LABEL_WORDS {
        return false;
    }
    words.iter().any(|word| {
        if label == *word {
            return true;
        }
        if word.is_ascii() {
            label
                .strip_prefix(word)
                .is_some_and(|rest| rest.starts_with(' '))
        } else {
            // 中文没有空格分词，只接受短文案的前缀
            label.starts_with(word) && label.chars().count() <= word.chars().count() + 4
        }
    })
}

/// 最大的 canvas 占视口 25% 以上视为画布渲染
fn classify_render_mode(probe: &RenderProbe) -> RenderMode {
    if probe.canvas_count > 0
        && probe.viewport_area > 0.0
        && probe.largest_canvas_area / probe.viewport_area >= 0.25
    {
        RenderMode::Canvas
    } else {
        RenderMode::Dom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(canvas_count: usize, largest: f64) -> RenderProbe {
        RenderProbe {
            canvas_count,
            largest_canvas_area: largest,
            viewport_area: 1280.0 * 720.0,
        }
    }

    #[test]
    fn test_large_canvas_is_canvas_mode() {
        assert_eq!(classify_render_mode(&probe(1, 800.0 * 600.0)), RenderMode::Canvas);
    }

    #[test]
    fn test_small_or_missing_canvas_is_dom_mode() {
        assert_eq!(classify_render_mode(&probe(0, 0.0)), RenderMode::Dom);
        assert_eq!(classify_render_mode(&probe(2, 100.0 * 100.0)), RenderMode::Dom);
    }

    #[test]
    fn test_consent_labels_match_whole_words_only() {
        for label in ["Accept all", "ACCEPT ALL COOKIES", "OK", "Ok, got it!", "I agree", "同意并继续"] {
            assert!(matches_label(label, CONSENT_WORDS), "{label}");
        }
        for label in ["Cookie policy", "Facebook", "Book now", "Acceptable use", "Manage options"] {
            assert!(!matches_label(label, CONSENT_WORDS), "{label}");
        }
    }

    #[test]
    fn test_start_labels_match_whole_words_only() {
        for label in ["Play", "  play  now ", "Start Game", "Tap to play", "开始游戏"] {
            assert!(matches_label(label, START_WORDS), "{label}");
        }
        for label in ["display settings", "Replay", "Playlists", "Restart", ""] {
            assert!(!matches_label(label, START_WORDS), "{label}");
        }
    }

    #[test]
    fn test_long_labels_are_not_buttons() {
        assert!(!matches_label(
            "Play the best free online games with your friends today",
            START_WORDS
        ));
    }

    #[test]
    fn test_candidate_scan_defaults_to_no_candidates() {
        let scan: CandidateScan =
            serde_json::from_str(r##"{"clicked":true,"label":"#onetrust-accept-btn-handler"}"##)
                .unwrap();
        assert!(scan.clicked);
        assert!(scan.candidates.is_empty());
    }

    #[test]
    fn test_probe_deserializes_from_camel_case() {
        let probe: RenderProbe = serde_json::from_str(
            r#"{"canvasCount":1,"largestCanvasArea":921600,"viewportArea":921600}"#,
        )
        .unwrap();
        assert_eq!(classify_render_mode(&probe), RenderMode::Canvas);
    }
}
