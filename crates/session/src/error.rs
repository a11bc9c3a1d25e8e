use retouch_backend::BackendError;

/// Errors returned by [`JobController`](crate::controller::JobController)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Submit was called without an image. No request was made.
    #[error("No image to submit")]
    EmptyImage,

    /// The backend rejected or failed the request.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Another submit, cancel or reset happened while this submit was in
    /// flight; its response was discarded.
    #[error("Submission superseded by a newer operation")]
    Superseded,
}
