pub mod login;
pub mod store;
pub mod validator;

pub use validator::{validate, LoginCheck, SessionValidity};
