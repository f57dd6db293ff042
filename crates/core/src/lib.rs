//! Shared building blocks for `comfyctl`: job description templates and
//! their error type.

pub mod error;
pub mod template;

pub use error::CoreError;
pub use template::JobTemplate;
