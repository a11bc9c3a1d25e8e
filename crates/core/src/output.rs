use serde::{Deserialize, Serialize};

/// A finished job's output: inline image data or a remote reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OutputImage {
    /// Bare base64 body (or an already-prefixed data URL).
    Base64(String),
    Url(String),
}

impl OutputImage {
    /// Pick the output from a status report, preferring inline data.
    pub fn prefer_inline(base64: Option<String>, url: Option<String>) -> Option<Self> {
        base64.map(OutputImage::Base64).or(url.map(OutputImage::Url))
    }

    /// The string a viewer loads: a PNG data URL or the remote URL as-is.
    pub fn display_src(&self) -> String {
        match self {
            OutputImage::Base64(body) if body.starts_with("data:") => body.clone(),
            OutputImage::Base64(body) => format!("data:image/png;base64,{body}"),
            OutputImage::Url(url) => url.clone(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, OutputImage::Base64(_))
    }
}
