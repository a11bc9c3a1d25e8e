use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid workflow template: {0}")]
    InvalidTemplate(String),

    #[error("Failed to read workflow template {path}: {source}")]
    TemplateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
