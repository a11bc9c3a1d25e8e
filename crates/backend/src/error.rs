use retouch_core::error::CoreError;

/// Errors from the backend HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The HTTP request itself failed (network, DNS, TLS, body decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("{operation} request failed ({status}): {body}")]
    Api {
        /// Which call failed (`Generate`, `Status`, `Cancel`, ...).
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, or the reason phrase when the body was empty.
        body: String,
    },

    /// A successful response did not carry a usable job id.
    #[error("{0} response missing id")]
    MissingJobId(&'static str),

    /// The input image could not be turned into upload bytes.
    #[error("Invalid input image: {0}")]
    InvalidImage(String),

    #[error("Base URL cannot carry a path: {0}")]
    InvalidBaseUrl(String),

    #[error("Deployment backend requires a deployment id")]
    MissingDeploymentId,

    #[error(transparent)]
    Template(#[from] CoreError),
}
