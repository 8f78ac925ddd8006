pub mod check;
pub mod config;
pub mod engine;
pub mod equality;
pub mod i18n;
pub mod registry;
pub mod report;
pub mod session;
pub mod source;
pub mod types;

// Re-export the localization macros
pub use crate::i18n::{t, t_with_args};
