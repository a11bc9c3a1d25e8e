use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

/// Which backend integration to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// `/run` + `/status/{id}` + `/cancel/{id}` job queue.
    JobQueue,
    /// ComfyUI server (`/prompt`, `/history/{id}`, `/queue`).
    ComfyUi,
    /// Hosted deployment runner (`/run/deployment/queue`, `/run/{id}`).
    Deployment,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::JobQueue => "job-queue",
            BackendKind::ComfyUi => "comfyui",
            BackendKind::Deployment => "deployment",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "job-queue" | "jobqueue" | "queue" => Ok(BackendKind::JobQueue),
            "comfyui" | "comfy" => Ok(BackendKind::ComfyUi),
            "deployment" => Ok(BackendKind::Deployment),
            other => Err(format!(
                "unknown backend '{other}' (expected job-queue, comfyui or deployment)"
            )),
        }
    }
}

/// Configuration errors raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Backend connection settings.
///
/// Supplied at deploy time through the environment; there is no runtime
/// configuration surface.
#[derive(Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: Url,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub auth_token: Option<String>,
    /// Required by [`BackendKind::Deployment`].
    pub deployment_id: Option<String>,
    /// Transport timeout per request. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Alternate workflow template file. `None` uses the built-in graph.
    pub workflow_template: Option<PathBuf>,
}

impl BackendConfig {
    /// Minimal unauthenticated configuration.
    pub fn new(kind: BackendKind, base_url: Url) -> Self {
        Self {
            kind,
            base_url,
            auth_token: None,
            deployment_id: None,
            request_timeout: None,
            workflow_template: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                        | Default       |
    /// |--------------------------------|---------------|
    /// | `RETOUCH_BACKEND`              | `job-queue`   |
    /// | `RETOUCH_API_BASE_URL`         | required      |
    /// | `RETOUCH_API_AUTH_TOKEN`       | none          |
    /// | `RETOUCH_DEPLOYMENT_ID`        | none (required for `deployment`) |
    /// | `RETOUCH_REQUEST_TIMEOUT_SECS` | none          |
    /// | `RETOUCH_WORKFLOW_TEMPLATE`    | built-in      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let kind = match get("RETOUCH_BACKEND") {
            Some(raw) => raw.parse::<BackendKind>().map_err(|reason| ConfigError::Invalid {
                var: "RETOUCH_BACKEND",
                value: raw.clone(),
                reason,
            })?,
            None => BackendKind::JobQueue,
        };

        let raw_url =
            get("RETOUCH_API_BASE_URL").ok_or(ConfigError::Missing("RETOUCH_API_BASE_URL"))?;
        let base_url =
            Url::parse(raw_url.trim_end_matches('/')).map_err(|e| ConfigError::Invalid {
                var: "RETOUCH_API_BASE_URL",
                value: raw_url.clone(),
                reason: e.to_string(),
            })?;

        let deployment_id = get("RETOUCH_DEPLOYMENT_ID");
        if kind == BackendKind::Deployment && deployment_id.is_none() {
            return Err(ConfigError::Missing("RETOUCH_DEPLOYMENT_ID"));
        }

        let request_timeout = match get("RETOUCH_REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::Invalid {
                        var: "RETOUCH_REQUEST_TIMEOUT_SECS",
                        value: raw.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            kind,
            base_url,
            auth_token: get("RETOUCH_API_AUTH_TOKEN"),
            deployment_id,
            request_timeout,
            workflow_template: get("RETOUCH_WORKFLOW_TEMPLATE").map(PathBuf::from),
        })
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("deployment_id", &self.deployment_id)
            .field("request_timeout", &self.request_timeout)
            .field("workflow_template", &self.workflow_template)
            .finish()
    }
}
