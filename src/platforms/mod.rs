pub mod common;
pub mod douyin;
pub mod traits;

pub use traits::PlatformInfo;
