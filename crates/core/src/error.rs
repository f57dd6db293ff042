use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Failed to read template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No value supplied for template placeholder '{0}'")]
    MissingValue(String),

    #[error("Rendered job description is not valid JSON: {0}")]
    InvalidJob(#[from] serde_json::Error),

    #[error("Job description must be a JSON object")]
    NotAnObject,
}
