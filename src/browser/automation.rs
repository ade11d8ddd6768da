use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::dom::{
    GetDocumentParams, QuerySelectorParams, SetFileInputFilesParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, SetCookiesParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::{debug, info};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::page::{ClickTarget, FieldCandidate, FillMethod, PageDriver, Probe};
use crate::session::store::{CookieRecord, SameSite};

const CLICK_MARK_ATTR: &str = "data-dyup-click";
const AGENT_MARK_ATTR: &str = "data-dyup-agent";

/// Connect to an already-running Chrome instance via CDP
pub async fn connect_to_chrome(port: u16) -> Result<(Browser, JoinHandle<()>, Page)> {
    let debug_url = format!("http://127.0.0.1:{}", port);

    let (browser, mut handler) = Browser::connect(&debug_url)
        .await
        .context(format!("Failed to connect to Chrome on port {}", port))?;

    // Spawn the handler to process CDP events
    let handle = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    // Get the first page
    let pages = browser.pages().await.context("Failed to get pages")?;
    let page = match pages.into_iter().next() {
        Some(page) => page,
        None => browser
            .new_page("about:blank")
            .await
            .context("No pages found in Chrome")?,
    };

    info!("Connected to Chrome CDP on port {}", port);
    Ok((browser, handle, page))
}

/// JSON-encode a string so it can be spliced into a script as a literal.
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

const IS_VISIBLE_JS: &str = r#"
    const isVisible = (el) => {
        if (!el) return false;
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        return rect.width > 0 && rect.height > 0
            && style.visibility !== 'hidden'
            && style.display !== 'none';
    };
"#;

/// Script answering a `Probe` with a boolean.
pub fn probe_script(probe: &Probe) -> String {
    let body = match probe {
        Probe::Selector(sel) => format!(
            "try {{ return document.querySelector({}) !== null; }} catch (_) {{ return false; }}",
            js_string(sel)
        ),
        Probe::VisibleSelector(sel) => format!(
            "let nodes = []; try {{ nodes = Array.from(document.querySelectorAll({})); }} catch (_) {{ return false; }}
             return nodes.some(isVisible);",
            js_string(sel)
        ),
        Probe::SelectorText(sel, text) => format!(
            "let nodes = []; try {{ nodes = Array.from(document.querySelectorAll({})); }} catch (_) {{ return false; }}
             const needle = {};
             return nodes.some(el => (el.innerText || el.textContent || '').includes(needle));",
            js_string(sel),
            js_string(text)
        ),
        Probe::PageText(text) => format!(
            "const body = document.body ? (document.body.innerText || '') : '';
             return body.includes({});",
            js_string(text)
        ),
        Probe::VisibleText(text) => format!(
            "const needle = {};
             const nodes = document.body ? Array.from(document.body.querySelectorAll('*')) : [];
             return nodes.some(el => {{
                 const own = Array.from(el.childNodes)
                     .filter(n => n.nodeType === 3)
                     .map(n => n.textContent)
                     .join('');
                 return own.includes(needle) && isVisible(el);
             }});",
            js_string(text)
        ),
    };
    format!("(function() {{ {} {} }})()", IS_VISIBLE_JS, body)
}

/// Script marking the element a `ClickTarget` refers to, or clicking it
/// directly for `DomText`. Returns a boolean.
pub fn click_script(target: &ClickTarget) -> String {
    let (scope, text, mode) = match target {
        ClickTarget::Selector(sel) => (*sel, "", "any"),
        ClickTarget::ExactText { scope, text } => (*scope, *text, "exact"),
        ClickTarget::PartialText { scope, text } => (*scope, *text, "partial"),
        ClickTarget::DomText(text) => {
            return format!(
                r#"
                (function(text) {{
                    const all = document.body ? Array.from(document.body.querySelectorAll('*')) : [];
                    const hits = all.filter(el => (el.textContent || '').trim() === text);
                    if (hits.length === 0) return false;
                    const deepest = hits.filter(el => !hits.some(o => o !== el && el.contains(o)));
                    (deepest[0] || hits[0]).click();
                    return true;
                }})({})
                "#,
                js_string(text)
            );
        }
    };
    format!(
        r#"
        (function(scope, text, mode, attr) {{
            {}
            document.querySelectorAll('[' + attr + ']').forEach(n => n.removeAttribute(attr));
            let nodes = [];
            try {{ nodes = Array.from(document.querySelectorAll(scope)); }} catch (_) {{ return false; }}
            for (const el of nodes) {{
                if (!isVisible(el)) continue;
                if (el.disabled || el.getAttribute('aria-disabled') === 'true') continue;
                const t = (el.innerText || el.textContent || '').trim();
                const hit = mode === 'any'
                    || (mode === 'exact' && t === text)
                    || (mode === 'partial' && t.includes(text));
                if (hit) {{
                    el.setAttribute(attr, '1');
                    el.scrollIntoView({{ block: 'center' }});
                    return true;
                }}
            }}
            return false;
        }})({}, {}, {}, {})
        "#,
        IS_VISIBLE_JS,
        js_string(scope),
        js_string(text),
        js_string(mode),
        js_string(CLICK_MARK_ATTR)
    )
}

fn fill_script(selector: &str, text: &str, method: FillMethod) -> String {
    let mode = match method {
        FillMethod::Fill => "fill",
        FillMethod::SetValue => "set",
        FillMethod::ClipboardPaste => "paste",
        // typed methods only need focus and an empty field here
        FillMethod::TypeChars | FillMethod::KeyStrokes => "clear",
    };
    format!(
        r#"
        (function(sel, text, mode) {{
            let el = null;
            try {{ el = document.querySelector(sel); }} catch (_) {{ return false; }}
            if (!el) return false;
            el.focus();
            const isField = el.tagName === 'INPUT' || el.tagName === 'TEXTAREA';
            const fire = () => {{
                el.dispatchEvent(new InputEvent('input', {{ bubbles: true, inputType: 'insertText', data: text }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            }};
            const clear = () => {{
                if (isField) {{
                    el.value = '';
                }} else {{
                    const range = document.createRange();
                    range.selectNodeContents(el);
                    const selection = window.getSelection();
                    selection.removeAllRanges();
                    selection.addRange(range);
                    document.execCommand('delete');
                }}
            }};
            if (mode === 'clear') {{
                clear();
                return true;
            }}
            if (mode === 'fill' && isField) {{
                const proto = Object.getPrototypeOf(el);
                const desc = Object.getOwnPropertyDescriptor(proto, 'value');
                if (desc && desc.set) {{ desc.set.call(el, text); }} else {{ el.value = text; }}
                fire();
                return true;
            }}
            if (mode === 'paste') {{
                clear();
                const data = new DataTransfer();
                data.setData('text/plain', text);
                const evt = new ClipboardEvent('paste', {{ clipboardData: data, bubbles: true, cancelable: true }});
                const handled = !el.dispatchEvent(evt);
                if (!handled) {{
                    document.execCommand('insertText', false, text);
                }}
                return true;
            }}
            if (isField) {{
                el.value = text;
            }} else {{
                el.innerText = text;
            }}
            fire();
            return true;
        }})({}, {}, {})
        "#,
        js_string(selector),
        js_string(text),
        js_string(mode)
    )
}

/// Chrome page driven over CDP.
pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("Failed to execute JavaScript")?;
        result
            .into_value()
            .map_err(|e| anyhow!("Unexpected JavaScript result: {}", e))
    }

    async fn type_chars(&self, text: &str) -> Result<()> {
        for ch in text.chars() {
            self.page
                .execute(InsertTextParams::new(ch.to_string()))
                .await
                .context("Input.insertText failed")?;
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        Ok(())
    }

    async fn key_strokes(&self, text: &str) -> Result<()> {
        for ch in text.chars() {
            let key = ch.to_string();
            let down = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyDown)
                .text(key.clone())
                .key(key.clone())
                .build()
                .map_err(|e| anyhow!("Failed to build key event: {}", e))?;
            self.page.execute(down).await.context("keyDown failed")?;
            let up = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyUp)
                .key(key)
                .build()
                .map_err(|e| anyhow!("Failed to build key event: {}", e))?;
            self.page.execute(up).await.context("keyUp failed")?;
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn url(&self) -> Result<String> {
        self.eval("window.location.href").await
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }

    async fn probe(&self, probe: &Probe) -> Result<bool> {
        self.eval(&probe_script(probe)).await
    }

    async fn reveal(&self, selector: &str) -> Result<bool> {
        let js = format!(
            r#"
            (function(sel) {{
                let el = null;
                try {{ el = document.querySelector(sel); }} catch (_) {{ el = null; }}
                if (el) {{
                    el.scrollIntoView({{ block: 'center' }});
                    return true;
                }}
                window.scrollTo(0, 0);
                return false;
            }})({})
            "#,
            js_string(selector)
        );
        self.eval(&js).await
    }

    async fn click(&self, target: &ClickTarget) -> Result<bool> {
        let marked: bool = self.eval(&click_script(target)).await?;
        if !marked || matches!(target, ClickTarget::DomText(_)) {
            return Ok(marked);
        }

        let marker = format!("[{}=\"1\"]", CLICK_MARK_ATTR);
        let real_click = async {
            let element = self.page.find_element(marker.as_str()).await?;
            element.click().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        }
        .await;

        if let Err(e) = real_click {
            debug!("Mouse click on {} failed ({}), falling back to element.click()", target, e);
            let js = format!(
                "(function() {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
                js_string(&marker)
            );
            return self.eval(&js).await;
        }
        Ok(true)
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<bool> {
        let count_js = format!(
            "(function() {{ try {{ return document.querySelectorAll({}).length; }} catch (_) {{ return 0; }} }})()",
            js_string(selector)
        );
        let count: i64 = self.eval(&count_js).await.unwrap_or(0);
        if count == 0 {
            return Ok(false);
        }

        let absolute = std::fs::canonicalize(path)
            .with_context(|| format!("Cannot resolve {}", path.display()))?;

        // Get the DOM document root
        let doc = self
            .page
            .execute(GetDocumentParams::builder().depth(0).build())
            .await
            .context("Failed to get document")?;
        let root_node_id = doc.result.root.node_id;

        let query = QuerySelectorParams::new(root_node_id, selector);
        let query_result = self
            .page
            .execute(query)
            .await
            .context("Failed to query selector for file input")?;

        let mut set_files =
            SetFileInputFilesParams::new(vec![absolute.to_string_lossy().to_string()]);
        set_files.node_id = Some(query_result.result.node_id);
        self.page
            .execute(set_files)
            .await
            .context("Failed to set file via CDP")?;

        info!("File set successfully: {} -> {}", absolute.display(), selector);

        // Trigger change event
        let trigger_js = format!(
            r#"
            (function(sel) {{
                const input = document.querySelector(sel);
                if (input) {{
                    input.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    return true;
                }}
                return false;
            }})({})
            "#,
            js_string(selector)
        );
        self.page.evaluate(trigger_js.as_str()).await.ok();
        Ok(true)
    }

    async fn is_rich_text(&self, selector: &str) -> Result<bool> {
        let js = format!(
            "(function() {{ try {{ const el = document.querySelector({}); return !!el && el.isContentEditable; }} catch (_) {{ return false; }} }})()",
            js_string(selector)
        );
        self.eval(&js).await
    }

    async fn fill(&self, selector: &str, text: &str, method: FillMethod) -> Result<bool> {
        let ready: bool = self.eval(&fill_script(selector, text, method)).await?;
        if !ready {
            return Ok(false);
        }
        match method {
            FillMethod::TypeChars => self.type_chars(text).await?,
            FillMethod::KeyStrokes => self.key_strokes(text).await?,
            _ => {}
        }
        Ok(true)
    }

    async fn read_value(&self, selector: &str) -> Result<Option<String>> {
        let js = format!(
            r#"
            (function(sel) {{
                let el = null;
                try {{ el = document.querySelector(sel); }} catch (_) {{ return null; }}
                if (!el) return null;
                if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') return el.value;
                return el.innerText || el.textContent || '';
            }})({})
            "#,
            js_string(selector)
        );
        self.eval(&js).await
    }

    async fn field_candidates(&self) -> Result<Vec<FieldCandidate>> {
        let js = format!(
            r#"
            (function(attr) {{
                {}
                const query = 'input:not([type=hidden]):not([type=file]):not([type=checkbox]):not([type=radio]), textarea, [contenteditable="true"]';
                const nodes = Array.from(document.querySelectorAll(query)).filter(isVisible);
                const out = [];
                nodes.slice(0, 40).forEach((el, index) => {{
                    el.setAttribute(attr, String(index));
                    const label = el.getAttribute('aria-label')
                        || (el.labels && el.labels[0] ? el.labels[0].innerText : '')
                        || el.getAttribute('data-placeholder')
                        || '';
                    out.push({{
                        index,
                        selector: '[' + attr + '="' + index + '"]',
                        tag: el.tagName.toLowerCase(),
                        placeholder: el.getAttribute('placeholder') || '',
                        label: label.slice(0, 80),
                        class_name: (typeof el.className === 'string' ? el.className : '').slice(0, 120),
                        text: ((el.value !== undefined ? el.value : el.innerText) || '').slice(0, 80)
                    }});
                }});
                return JSON.stringify(out);
            }})({})
            "#,
            IS_VISIBLE_JS,
            js_string(AGENT_MARK_ATTR)
        );
        let raw: String = self.eval(&js).await?;
        serde_json::from_str(&raw).context("Failed to parse field candidates")
    }

    async fn set_cookies(&self, cookies: &[CookieRecord]) -> Result<()> {
        if cookies.is_empty() {
            return Ok(());
        }
        let params = cookies
            .iter()
            .map(to_cookie_param)
            .collect::<Result<Vec<_>>>()?;
        self.page
            .execute(SetCookiesParams::new(params))
            .await
            .context("Network.setCookies failed")?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .context("Failed to read browser cookies")?;
        Ok(cookies.iter().map(from_cdp_cookie).collect())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.page
            .save_screenshot(CaptureScreenshotParams::default(), path)
            .await
            .context("Failed to capture screenshot")?;
        Ok(())
    }
}

fn to_cookie_param(cookie: &CookieRecord) -> Result<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only)
        .same_site(match cookie.same_site {
            SameSite::Strict => CookieSameSite::Strict,
            SameSite::Lax => CookieSameSite::Lax,
            SameSite::None => CookieSameSite::None,
        });
    if let Some(expires) = cookie.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    builder
        .build()
        .map_err(|e| anyhow!("Failed to build cookie {}: {}", cookie.name, e))
}

fn from_cdp_cookie(cookie: &Cookie) -> CookieRecord {
    CookieRecord {
        name: cookie.name.clone(),
        value: cookie.value.clone(),
        domain: cookie.domain.clone(),
        path: cookie.path.clone(),
        expires: Some(cookie.expires).filter(|v| *v > 0.0),
        http_only: cookie.http_only,
        secure: cookie.secure,
        same_site: match cookie.same_site {
            Some(CookieSameSite::Strict) => SameSite::Strict,
            Some(CookieSameSite::None) => SameSite::None,
            _ => SameSite::Lax,
        },
    }
}
