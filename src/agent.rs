//! Fallback for fields the fixed selectors could not fill: a chat model is
//! shown the editable elements on the page and picks the one to use.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::browser::{FieldCandidate, FillMethod, PageDriver};
use crate::config::AgentSettings;
use crate::platforms::common::value_matches;

const SYSTEM_PROMPT: &str = "You operate a video publishing web form. You receive a JSON list of \
editable elements and the field the user wants to fill. Reply with a JSON object \
{\"index\": <number>} naming the element to fill, or {\"index\": null} if none fits. \
Reply with JSON only.";

/// Fills one described field. `true` only when the text was verified in place.
#[async_trait]
pub trait SemanticAgent: Send + Sync {
    async fn act(&self, page: &dyn PageDriver, field: &str, text: &str) -> bool;
}

/// Used when no API key is configured.
pub struct DisabledAgent;

#[async_trait]
impl SemanticAgent for DisabledAgent {
    async fn act(&self, _page: &dyn PageDriver, field: &str, _text: &str) -> bool {
        info!("[智能填写] 未配置 OPENAI_API_KEY，跳过 {}", field);
        false
    }
}

/// OpenAI-compatible chat-completions agent.
pub struct LlmAgent {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct Choice {
    index: Option<usize>,
}

impl LlmAgent {
    pub fn new(settings: &AgentSettings, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build agent HTTP client")?;
        Ok(Self {
            client,
            api_url: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
        })
    }

    async fn choose(&self, candidates: &[FieldCandidate], field: &str) -> Result<Option<usize>> {
        let listing = serde_json::to_string(candidates)?;
        let request = Request {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user",
                    content: format!("Field to fill: {}\nElements: {}", field, listing),
                },
            ],
            temperature: 0.0,
        };

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            bail!("agent endpoint returned {}: {}", status, body);
        }

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("missing choices[0].message.content"))?;
        debug!("[智能填写] 模型回复: {}", content);
        parse_agent_reply(content)
    }
}

#[async_trait]
impl SemanticAgent for LlmAgent {
    async fn act(&self, page: &dyn PageDriver, field: &str, text: &str) -> bool {
        let candidates = match page.field_candidates().await {
            Ok(c) if !c.is_empty() => c,
            Ok(_) => {
                warn!("[智能填写] 页面上没有可编辑元素");
                return false;
            }
            Err(e) => {
                warn!("[智能填写] 读取可编辑元素失败: {}", e);
                return false;
            }
        };

        let index = match self.choose(&candidates, field).await {
            Ok(Some(index)) => index,
            Ok(None) => {
                info!("[智能填写] 模型认为没有适合 {} 的元素", field);
                return false;
            }
            Err(e) => {
                warn!("[智能填写] 调用模型失败: {:#}", e);
                return false;
            }
        };

        match candidates.iter().find(|c| c.index == index) {
            Some(candidate) => fill_candidate(page, candidate, field, text).await,
            None => {
                warn!("[智能填写] 模型返回了不存在的元素序号 {}", index);
                false
            }
        }
    }
}

/// Pull `{"index": n}` out of a reply, tolerating code fences and chatter.
pub fn parse_agent_reply(content: &str) -> Result<Option<usize>> {
    let start = content.find('{').ok_or_else(|| anyhow!("no JSON object in reply"))?;
    let end = content.rfind('}').ok_or_else(|| anyhow!("no JSON object in reply"))?;
    if end < start {
        bail!("no JSON object in reply");
    }
    let choice: Choice = serde_json::from_str(&content[start..=end])
        .with_context(|| format!("unexpected agent reply: {}", content))?;
    Ok(choice.index)
}

async fn fill_candidate(page: &dyn PageDriver, candidate: &FieldCandidate, field: &str, text: &str) -> bool {
    let method = if candidate.tag == "input" || candidate.tag == "textarea" {
        FillMethod::Fill
    } else {
        FillMethod::TypeChars
    };
    match page.fill(&candidate.selector, text, method).await {
        Ok(true) => {}
        Ok(false) => return false,
        Err(e) => {
            warn!("[智能填写] 填写 {} 失败: {}", field, e);
            return false;
        }
    }
    let ok = matches!(
        page.read_value(&candidate.selector).await,
        Ok(Some(actual)) if value_matches(&actual, text)
    );
    info!(
        "[智能填写] {} -> 元素 #{} <{}> {}",
        field,
        candidate.index,
        candidate.tag,
        if ok { "成功" } else { "校验失败" }
    );
    ok
}

pub fn agent_from_config(settings: &AgentSettings) -> Result<Box<dyn SemanticAgent>> {
    match &settings.api_key {
        Some(key) => {
            info!("[智能填写] 已启用，模型 {}", settings.model);
            Ok(Box::new(LlmAgent::new(settings, key.clone())?))
        }
        None => Ok(Box::new(DisabledAgent)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakePage;
    use axum::{routing::post, Json, Router};

    fn candidate(index: usize, tag: &str, placeholder: &str) -> FieldCandidate {
        FieldCandidate {
            index,
            selector: format!("[data-dyup-agent=\"{}\"]", index),
            tag: tag.into(),
            placeholder: placeholder.into(),
            label: String::new(),
            class_name: String::new(),
            text: String::new(),
        }
    }

    async fn mock_endpoint(reply: &'static str) -> AgentSettings {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || async move {
                Json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": reply}}]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        AgentSettings {
            api_key: Some("test-key".into()),
            base_url: format!("http://{}/v1", addr),
            model: "test-model".into(),
        }
    }

    #[test]
    fn parses_fenced_and_null_replies() {
        assert_eq!(parse_agent_reply("```json\n{\"index\": 2}\n```").unwrap(), Some(2));
        assert_eq!(parse_agent_reply("{\"index\": null}").unwrap(), None);
        assert!(parse_agent_reply("I cannot help").is_err());
    }

    #[tokio::test]
    async fn disabled_agent_never_succeeds() {
        let page = FakePage::new("about:blank");
        let agent = agent_from_config(&AgentSettings {
            api_key: None,
            base_url: "http://127.0.0.1:9".into(),
            model: "m".into(),
        })
        .unwrap();
        assert!(!agent.act(&page, "作品标题", "hello").await);
    }

    #[tokio::test]
    async fn llm_agent_fills_chosen_field() {
        let settings = mock_endpoint("```json\n{\"index\": 1}\n```").await;
        let agent = agent_from_config(&settings).unwrap();
        let page = FakePage::new("about:blank");
        page.set_candidates(vec![
            candidate(0, "input", "搜索"),
            candidate(1, "input", "填写作品标题"),
        ]);

        assert!(agent.act(&page, "作品标题", "周末 vlog").await);
        assert_eq!(page.value("[data-dyup-agent=\"1\"]").as_deref(), Some("周末 vlog"));
        assert_eq!(page.value("[data-dyup-agent=\"0\"]"), None);
    }

    #[tokio::test]
    async fn llm_agent_rejects_unknown_index() {
        let settings = mock_endpoint("{\"index\": 7}").await;
        let agent = agent_from_config(&settings).unwrap();
        let page = FakePage::new("about:blank");
        page.set_candidates(vec![candidate(0, "textarea", "简介")]);
        assert!(!agent.act(&page, "作品描述", "text").await);
    }
}
