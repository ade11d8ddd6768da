//! Everything the Douyin creator portal is recognised by. Kept together so a
//! portal redesign only touches this file.

use crate::browser::{ClickTarget, Probe};
use crate::platforms::common::{ClickStrategy, Strategy};
use crate::session::validator::LoginCheck;

pub const HOST: &str = "creator.douyin.com";
pub const LOGIN_URL: &str = "https://creator.douyin.com/";
pub const UPLOAD_URL: &str = "https://creator.douyin.com/creator-micro/content/upload";
pub const MANAGE_URL: &str = "https://creator.douyin.com/creator-micro/content/manage";
pub const MANAGE_PATH: &str = "creator-micro/content/manage";
pub const PUBLISH_VIEW_PATHS: [&str; 2] = [
    "/creator-micro/content/publish",
    "/creator-micro/content/post/video",
];

pub const LOGIN_MARKERS: [Strategy; 2] = [
    Strategy::new("phone_login", Probe::VisibleText("手机号登录")),
    Strategy::new("qr_login", Probe::VisibleText("扫码登录")),
];

pub const LOGIN_CHECK: LoginCheck<'static> = LoginCheck {
    url: UPLOAD_URL,
    markers: &LOGIN_MARKERS,
};

// upload page
pub const PRIMARY_FILE_INPUT: &str = "div[class^='container'] input[type='file']";
pub const GENERIC_FILE_INPUT: &str = "input[type='file']";

// completion
pub const CARD_REGION: &str = "[class^=\"long-card\"]";
pub const COMPLETION: [Strategy; 3] = [
    Strategy::new("long_card_reupload", Probe::SelectorText(CARD_REGION, "重新上传")),
    Strategy::new("visible_reupload", Probe::VisibleText("重新上传")),
    Strategy::new("page_text_reupload", Probe::PageText("重新上传")),
];
pub const UPLOAD_FAILED: [Strategy; 2] = [
    Strategy::new("progress_failed", Probe::SelectorText("div.progress-div > div", "上传失败")),
    Strategy::new("visible_failed", Probe::VisibleText("上传失败")),
];

// metadata
pub const TITLE_MAX_CHARS: usize = 30;
pub const TITLE_SELECTORS: [&str; 3] = [
    "input[placeholder*=\"填写作品标题\"]",
    "input[placeholder*=\"标题\"]",
    ".title-input input",
];
pub const DESCRIPTION_SELECTORS: [&str; 4] = [
    ".zone-container[contenteditable=\"true\"]",
    ".notranslate",
    "textarea[placeholder*=\"简介\"]",
    "textarea[placeholder*=\"描述\"]",
];

// publish
pub const PUBLISH_BUTTON: [ClickStrategy; 3] = [
    ClickStrategy::new("exact_button", ClickTarget::ExactText { scope: "button", text: "发布" }),
    ClickStrategy::new(
        "partial_button",
        ClickTarget::PartialText { scope: "button, [role=\"button\"]", text: "发布" },
    ),
    ClickStrategy::new("dom_text", ClickTarget::DomText("发布")),
];
pub const VERIFICATION: [Strategy; 4] = [
    Strategy::new("sms_verify", Probe::VisibleText("短信验证")),
    Strategy::new("sms_code", Probe::VisibleText("接收短信验证码")),
    Strategy::new("code_input", Probe::VisibleText("请输入验证码")),
    Strategy::new("identity_verify", Probe::VisibleText("身份验证")),
];
pub const CONFIRM_DIALOG: [Strategy; 1] =
    [Strategy::new("confirm_publish", Probe::VisibleText("确认发布"))];
pub const CONFIRM_BUTTON: [ClickStrategy; 2] = [
    ClickStrategy::new("confirm_publish", ClickTarget::ExactText { scope: "button", text: "确认发布" }),
    ClickStrategy::new("modal_confirm", ClickTarget::ExactText { scope: ".semi-modal button", text: "确认" }),
];
pub const MISSING_COVER: [Strategy; 1] =
    [Strategy::new("cover_required", Probe::VisibleText("请设置封面后再发布"))];
pub const RECOMMENDED_COVER: ClickTarget = ClickTarget::Selector("[class^=\"recommendCover-\"]");
pub const COVER_APPLY_PROMPT: Probe = Probe::VisibleText("是否确认应用此封面");
pub const COVER_APPLY_CONFIRM: ClickTarget = ClickTarget::ExactText { scope: "button", text: "确定" };

// cover modal
pub const OPEN_COVER: ClickTarget = ClickTarget::ExactText { scope: "div, span", text: "选择封面" };
pub const COVER_MODAL: Probe = Probe::VisibleSelector("div.dy-creator-content-modal");
pub const VERTICAL_COVER: ClickTarget = ClickTarget::ExactText {
    scope: "div.dy-creator-content-modal div, div.dy-creator-content-modal button",
    text: "设置竖封面",
};
pub const COVER_FILE_INPUT: &str = "div[class^='semi-upload upload'] input.semi-upload-hidden-input";
pub const COVER_DONE: ClickTarget = ClickTarget::ExactText {
    scope: "div.dy-creator-content-modal button",
    text: "完成",
};
