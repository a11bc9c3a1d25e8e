//! User-facing processing choices: mask toggles and tuning settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mask flags exposed by the default deployment, with their initial values.
pub const DEFAULT_MASKS: &[(&str, bool)] = &[
    ("skin", false),
    ("nose", false),
    ("eye_g", false),
    ("r_eye", true),
    ("l_eye", true),
    ("r_brow", false),
    ("l_brow", false),
    ("r_ear", false),
    ("l_ear", false),
    ("mouth", true),
    ("u_lip", true),
    ("l_lip", true),
    ("hair", false),
    ("hat", false),
    ("ear_r", false),
    ("neck_l", false),
    ("neck", false),
    ("cloth", false),
    ("background", false),
];

/// Named boolean mask flags selecting which regions get processed.
///
/// Backed by a map so that deployments can expose a different key set;
/// every key present always carries a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingOptions(BTreeMap<String, bool>);

impl ProcessingOptions {
    /// An option set with no flags at all.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Set a flag, inserting it if the key is new.
    pub fn set(&mut self, key: impl Into<String>, enabled: bool) {
        self.0.insert(key.into(), enabled);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, enabled: bool) -> Self {
        self.set(key, enabled);
        self
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.0.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        DEFAULT_MASKS
            .iter()
            .map(|(key, enabled)| ((*key).to_string(), *enabled))
            .collect()
    }
}

impl FromIterator<(String, bool)> for ProcessingOptions {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Numeric and text tuning parameters.
///
/// Ranges are enforced by whatever collects the input. Values here are
/// passed through to the backend untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub cfg: f64,
    pub sampling_steps: u32,
    pub denoise: f64,
    pub lora_strength_model: f64,
    pub lora_strength_clip: f64,
    pub confidence: f64,
    pub detail_method: String,
    pub detail_erode: i32,
    pub detail_dilate: i32,
    pub black_point: f64,
    pub white_point: f64,
    pub positive_prompt: String,
    pub negative_prompt: String,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            cfg: 0.7,
            sampling_steps: 30,
            denoise: 0.3,
            lora_strength_model: 1.0,
            lora_strength_clip: 1.0,
            confidence: 0.2,
            detail_method: "VITMatte(local)".to_string(),
            detail_erode: 6,
            detail_dilate: 6,
            black_point: 0.1,
            white_point: 0.99,
            positive_prompt: String::new(),
            negative_prompt: String::new(),
        }
    }
}
