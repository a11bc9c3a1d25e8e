use std::path::Path;

use anyhow::Context;
use base64::Engine as _;

/// Read an image file and encode it as a `data:image/...;base64,` URL.
pub fn load_image(path: &Path) -> anyhow::Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    encode_data_url(&bytes).with_context(|| format!("{} is not a usable image", path.display()))
}

/// Sniff the image format from its header and build a data URL.
pub fn encode_data_url(bytes: &[u8]) -> anyhow::Result<String> {
    anyhow::ensure!(!bytes.is_empty(), "image is empty");
    let format = image::guess_format(bytes).context("unrecognized image format")?;
    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}
