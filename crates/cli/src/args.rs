use std::path::PathBuf;

use clap::Parser;
use retouch_core::options::{ProcessingOptions, ProcessingSettings};

/// Submit a portrait for retouching and wait for the result.
///
/// Backend connection and timer settings come from `RETOUCH_*`
/// environment variables (a `.env` file is honored).
#[derive(Debug, Parser)]
#[command(name = "retouch", version)]
pub struct Args {
    /// Input image: a local file, or an http(s) URL (deployment backend only).
    pub image: String,

    /// Use the higher-quality sampler and scheduler.
    #[arg(long)]
    pub pro: bool,

    /// Override one mask flag, e.g. `--mask hair=true`. Repeatable.
    #[arg(long = "mask", value_name = "KEY=BOOL", value_parser = parse_mask)]
    pub masks: Vec<(String, bool)>,

    /// Sampling steps.
    #[arg(long)]
    pub steps: Option<u32>,

    /// Denoise strength.
    #[arg(long)]
    pub denoise: Option<f64>,

    /// Classifier-free guidance scale.
    #[arg(long)]
    pub cfg: Option<f64>,

    /// Where to write the result image.
    #[arg(long, short, default_value = "retouched.png")]
    pub output: PathBuf,
}

impl Args {
    /// Default masks with the `--mask` overrides applied.
    pub fn options(&self) -> ProcessingOptions {
        let mut options = ProcessingOptions::default();
        for (key, enabled) in &self.masks {
            options.set(key.clone(), *enabled);
        }
        options
    }

    /// Default settings with the command-line overrides applied.
    pub fn settings(&self) -> ProcessingSettings {
        let mut settings = ProcessingSettings::default();
        if let Some(steps) = self.steps {
            settings.sampling_steps = steps;
        }
        if let Some(denoise) = self.denoise {
            settings.denoise = denoise;
        }
        if let Some(cfg) = self.cfg {
            settings.cfg = cfg;
        }
        settings
    }

    pub fn is_remote_image(&self) -> bool {
        self.image.starts_with("http://") || self.image.starts_with("https://")
    }
}

/// Parse `key=bool`.
fn parse_mask(raw: &str) -> Result<(String, bool), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=BOOL, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("mask key is empty".to_string());
    }
    let enabled = match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        other => return Err(format!("'{other}' is not a boolean")),
    };
    Ok((key.to_string(), enabled))
}
