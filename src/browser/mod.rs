pub mod automation;
pub mod chrome;
pub mod page;

#[cfg(test)]
pub mod fake;

pub use chrome::ChromeLauncher;
pub use page::{BrowserContext, ClickTarget, ContextLauncher, FieldCandidate, FillMethod, PageDriver, Probe};
