//! Request payload construction.
//!
//! The workflow template is an opaque node graph owned by the backend
//! deployment. This module only knows the handful of node ids it patches;
//! when a node is missing from a template the patch is skipped.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::options::{ProcessingOptions, ProcessingSettings};

/// Face-parsing node whose inputs are the mask flags.
pub const MASK_NODE: &str = "63";
/// KSampler node carrying steps / denoise / cfg / sampler / scheduler.
pub const SAMPLER_NODE: &str = "52";
/// Image loader node that reads the uploaded input file.
pub const LOAD_IMAGE_NODE: &str = "36";
/// File name the input image is registered under.
pub const INPUT_IMAGE_NAME: &str = "sample.jpg";

const PRO_SAMPLER_NAME: &str = "res_multistep_ancestral";
const PRO_SCHEDULER: &str = "kl_optimal";

const BUILTIN_TEMPLATE_JSON: &str = include_str!("../templates/retouch_workflow.json");

static DATA_URL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:(image/[A-Za-z0-9.+-]+);base64,").expect("data URL prefix regex is valid")
});

static BUILTIN_TEMPLATE: LazyLock<WorkflowTemplate> = LazyLock::new(|| {
    WorkflowTemplate::from_json(BUILTIN_TEMPLATE_JSON).expect("built-in workflow template is valid")
});

/// A workflow node graph keyed by node id.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTemplate {
    graph: Map<String, Value>,
}

impl WorkflowTemplate {
    /// The template shipped with the crate.
    pub fn builtin() -> &'static WorkflowTemplate {
        &BUILTIN_TEMPLATE
    }

    /// Parse a template from JSON text. The root must be an object.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CoreError::InvalidTemplate(e.to_string()))?;
        match value {
            Value::Object(graph) => Ok(Self { graph }),
            other => Err(CoreError::InvalidTemplate(format!(
                "expected a JSON object of nodes, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::TemplateIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn graph(&self) -> &Map<String, Value> {
        &self.graph
    }
}

/// Body of a job-queue `POST /run` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobQueuePayload {
    pub input: WorkflowInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub workflow: Map<String, Value>,
    pub images: Vec<InputImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputImage {
    pub name: String,
    /// Bare base64 body, no data URL prefix.
    pub image: String,
}

/// Remove a leading `data:image/<fmt>;base64,` if present.
pub fn strip_data_url_prefix(image: &str) -> &str {
    match DATA_URL_PREFIX.find(image) {
        Some(prefix) => &image[prefix.end()..],
        None => image,
    }
}

/// Mime type named by a leading `data:image/<fmt>;base64,`, lowercased.
pub fn data_url_mime(image: &str) -> Option<String> {
    DATA_URL_PREFIX
        .captures(image)
        .map(|caps| caps[1].to_ascii_lowercase())
}

/// Merge options and settings into a copy of the template graph.
pub fn build_workflow(
    template: &WorkflowTemplate,
    options: Option<&ProcessingOptions>,
    settings: Option<&ProcessingSettings>,
    pro_mode: bool,
) -> Map<String, Value> {
    let mut graph = template.graph.clone();

    if pro_mode {
        if let Some(inputs) = node_inputs_mut(&mut graph, SAMPLER_NODE) {
            inputs.insert("sampler_name".into(), PRO_SAMPLER_NAME.into());
            inputs.insert("scheduler".into(), PRO_SCHEDULER.into());
        }
    }

    if let Some(options) = options {
        if let Some(inputs) = node_inputs_mut(&mut graph, MASK_NODE) {
            for (key, enabled) in options.iter() {
                if let Some(slot) = inputs.get_mut(key) {
                    *slot = Value::Bool(enabled);
                }
            }
        }
    }

    if let Some(settings) = settings {
        if let Some(inputs) = node_inputs_mut(&mut graph, SAMPLER_NODE) {
            inputs.insert("steps".into(), settings.sampling_steps.into());
            inputs.insert("denoise".into(), settings.denoise.into());
            inputs.insert("cfg".into(), settings.cfg.into());
        }
    }

    graph
}

/// Build the full job-queue request body.
pub fn build_payload(
    template: &WorkflowTemplate,
    image: &str,
    options: Option<&ProcessingOptions>,
    settings: Option<&ProcessingSettings>,
    pro_mode: bool,
) -> JobQueuePayload {
    JobQueuePayload {
        input: WorkflowInput {
            workflow: build_workflow(template, options, settings, pro_mode),
            images: vec![InputImage {
                name: INPUT_IMAGE_NAME.to_string(),
                image: strip_data_url_prefix(image).to_string(),
            }],
        },
    }
}

/// Flat input map for hosted deployments.
///
/// The image is passed through unchanged; hosted runners accept URLs and
/// data URLs alike.
pub fn build_deployment_inputs(
    image: &str,
    options: Option<&ProcessingOptions>,
    settings: Option<&ProcessingSettings>,
) -> Map<String, Value> {
    let mut inputs = Map::new();
    inputs.insert("input_image".into(), image.into());

    if let Some(options) = options {
        for (key, enabled) in options.iter() {
            inputs.insert(key.to_string(), Value::Bool(enabled));
        }
    }

    if let Some(s) = settings {
        let fields: [(&str, Value); 13] = [
            ("cfg", s.cfg.into()),
            ("sampling_steps", s.sampling_steps.into()),
            ("denoise", s.denoise.into()),
            ("lora_strength_model", s.lora_strength_model.into()),
            ("lora_strength_clip", s.lora_strength_clip.into()),
            ("confidence", s.confidence.into()),
            ("detail_method", s.detail_method.clone().into()),
            ("detail_erode", s.detail_erode.into()),
            ("detail_dilate", s.detail_dilate.into()),
            ("black_point", s.black_point.into()),
            ("white_point", s.white_point.into()),
            ("positive_prompt", s.positive_prompt.clone().into()),
            ("negative_prompt", s.negative_prompt.clone().into()),
        ];
        for (key, value) in fields {
            inputs.insert(key.to_string(), value);
        }
    }

    inputs
}

/// Point the image loader node at an uploaded file name.
pub fn set_input_image_name(graph: &mut Map<String, Value>, name: &str) {
    if let Some(inputs) = node_inputs_mut(graph, LOAD_IMAGE_NODE) {
        inputs.insert("image".into(), name.into());
    }
}

fn node_inputs_mut<'a>(
    graph: &'a mut Map<String, Value>,
    node: &str,
) -> Option<&'a mut Map<String, Value>> {
    graph.get_mut(node)?.get_mut("inputs")?.as_object_mut()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
