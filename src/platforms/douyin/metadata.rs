use log::{info, warn};

use super::completion::{wait_for_completion, CompletionState};
use super::selectors::{DESCRIPTION_SELECTORS, TITLE_MAX_CHARS, TITLE_SELECTORS};
use crate::agent::SemanticAgent;
use crate::browser::{FillMethod, PageDriver, Probe};
use crate::config::Timings;
use crate::error::UploadError;
use crate::platforms::common::value_matches;

const RICH_TEXT_METHODS: [FillMethod; 4] = [
    FillMethod::SetValue,
    FillMethod::TypeChars,
    FillMethod::KeyStrokes,
    FillMethod::ClipboardPaste,
];
const PLAIN_METHODS: [FillMethod; 1] = [FillMethod::SetValue];

/// Description followed by the tags as `#tag` hashtags.
pub fn compose_description(description: &str, tags: &[String]) -> String {
    let hashtags: Vec<String> = tags
        .iter()
        .map(|t| t.trim().trim_start_matches('#').trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("#{}", t))
        .collect();
    let description = description.trim();
    match (description.is_empty(), hashtags.is_empty()) {
        (_, true) => description.to_string(),
        (true, false) => hashtags.join(" "),
        (false, false) => format!("{} {}", description, hashtags.join(" ")),
    }
}

pub fn truncate_title(title: &str) -> String {
    title.trim().chars().take(TITLE_MAX_CHARS).collect()
}

/// Fill title and description. Transcoding must have completed first; pass the
/// poller's result when it already ran, otherwise it is run here.
pub async fn fill_metadata(
    page: &dyn PageDriver,
    agent: &dyn SemanticAgent,
    title: &str,
    description: &str,
    tags: &[String],
    completion: Option<CompletionState>,
    timings: &Timings,
) -> Result<(), UploadError> {
    let state = match completion {
        Some(state) => state,
        None => wait_for_completion(page, timings).await,
    };
    state.into_result(timings)?;

    let title = truncate_title(title);
    if !title.is_empty() && !fill_title(page, agent, &title).await {
        return Err(UploadError::FillFailed(format!("标题未能填写: {}", title)));
    }

    let text = compose_description(description, tags);
    if !text.is_empty() && !fill_description(page, agent, &text).await {
        return Err(UploadError::FillFailed("作品描述未能填写".to_string()));
    }
    Ok(())
}

async fn fill_title(page: &dyn PageDriver, agent: &dyn SemanticAgent, title: &str) -> bool {
    let mut target = None;
    for selector in TITLE_SELECTORS {
        if page.probe(&Probe::VisibleSelector(selector)).await.unwrap_or(false) {
            target = Some(selector);
            break;
        }
    }

    match target {
        Some(selector) => {
            if fill_and_verify(page, selector, title, FillMethod::Fill).await {
                info!("[抖音填写] 标题已填写 ({})", selector);
                return true;
            }
            warn!("[抖音填写] 标题回读不一致，交给智能填写");
        }
        None => warn!("[抖音填写] 没有可见的标题输入框，交给智能填写"),
    }
    agent.act(page, "作品标题", title).await
}

async fn fill_description(page: &dyn PageDriver, agent: &dyn SemanticAgent, text: &str) -> bool {
    let mut target = None;
    for selector in DESCRIPTION_SELECTORS {
        if page.probe(&Probe::Selector(selector)).await.unwrap_or(false) {
            target = Some(selector);
            break;
        }
    }
    let Some(selector) = target else {
        warn!("[抖音填写] 没有找到描述输入区域，交给智能填写");
        return agent.act(page, "作品描述", text).await;
    };

    let methods: &[FillMethod] = if page.is_rich_text(selector).await.unwrap_or(false) {
        &RICH_TEXT_METHODS
    } else {
        &PLAIN_METHODS
    };
    for method in methods {
        if fill_and_verify(page, selector, text, *method).await {
            info!("[抖音填写] 描述已填写 ({} via {})", selector, method.as_str());
            return true;
        }
        warn!("[抖音填写] {} 填写描述未生效", method.as_str());
    }
    agent.act(page, "作品描述", text).await
}

async fn fill_and_verify(page: &dyn PageDriver, selector: &str, text: &str, method: FillMethod) -> bool {
    match page.fill(selector, text, method).await {
        Ok(true) => {}
        Ok(false) => return false,
        Err(e) => {
            warn!("[抖音填写] {} 失败: {}", method.as_str(), e);
            return false;
        }
    }
    matches!(page.read_value(selector).await, Ok(Some(actual)) if value_matches(&actual, text))
}
