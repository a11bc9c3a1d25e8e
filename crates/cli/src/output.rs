use std::path::Path;

use anyhow::Context;
use base64::Engine as _;
use retouch_core::payload::strip_data_url_prefix;

/// Bytes of a data URL, or `None` when `output` is not one.
pub fn decode_data_url(output: &str) -> Option<anyhow::Result<Vec<u8>>> {
    if !output.starts_with("data:") {
        return None;
    }
    Some(
        base64::engine::general_purpose::STANDARD
            .decode(strip_data_url_prefix(output))
            .context("output data URL is not valid base64"),
    )
}

/// Write the job output to `path`, downloading it when it is a URL.
///
/// `auth_token` is sent only to URLs under `backend_base`.
pub async fn save_output(
    client: &reqwest::Client,
    output: &str,
    path: &Path,
    backend_base: &str,
    auth_token: Option<&str>,
) -> anyhow::Result<usize> {
    let bytes = match decode_data_url(output) {
        Some(decoded) => decoded?,
        None => {
            let mut request = client.get(output);
            if let Some(token) = auth_token.filter(|_| output.starts_with(backend_base)) {
                request = request.bearer_auth(token);
            }
            let response = request
                .send()
                .await
                .with_context(|| format!("failed to download {output}"))?
                .error_for_status()?;
            response.bytes().await?.to_vec()
        }
    };

    tokio::fs::write(path, &bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(bytes.len())
}
