use crate::types::{AppraiserError, Result, VertexConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static MODEL_RESOURCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^projects/([^/]+)/locations/([^/]+)/models/(.+)$").unwrap());

/// The model a `generateContent` call is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTarget {
    /// A deployed endpoint (e.g. a tuned model).
    Endpoint {
        project_id: String,
        location: String,
        endpoint_id: String,
    },
    /// A model resource in the project's model registry.
    Model {
        project_id: String,
        location: String,
        model_id: String,
    },
    /// A Google-published foundation model.
    Publisher {
        project_id: String,
        location: String,
        model_id: String,
    },
}

/// Pick the model target from configuration.
///
/// An endpoint ID wins when project and location are also set, then a full
/// `VERTEX_MODEL` resource name, then `GEMINI_MODEL` with project and
/// location. Returns `None` when none of these shapes is complete.
pub fn resolve_target(config: &VertexConfig) -> Option<ModelTarget> {
    if let (Some(endpoint_id), Some(project_id), Some(location)) =
        (&config.endpoint_id, &config.project_id, &config.location)
    {
        return Some(ModelTarget::Endpoint {
            project_id: project_id.clone(),
            location: location.clone(),
            endpoint_id: endpoint_id.clone(),
        });
    }

    if let Some(caps) = config
        .vertex_model
        .as_deref()
        .map(str::trim)
        .and_then(|model| MODEL_RESOURCE.captures(model))
    {
        return Some(ModelTarget::Model {
            project_id: caps[1].to_string(),
            location: caps[2].to_string(),
            model_id: caps[3].to_string(),
        });
    }

    if let (Some(model_id), Some(project_id), Some(location)) =
        (&config.gemini_model, &config.project_id, &config.location)
    {
        return Some(ModelTarget::Publisher {
            project_id: project_id.clone(),
            location: location.clone(),
            model_id: model_id.clone(),
        });
    }

    None
}

impl ModelTarget {
    pub fn location(&self) -> &str {
        match self {
            ModelTarget::Endpoint { location, .. }
            | ModelTarget::Model { location, .. }
            | ModelTarget::Publisher { location, .. } => location,
        }
    }

    /// Resource path below `/v1/`.
    pub fn resource_path(&self) -> String {
        match self {
            ModelTarget::Endpoint { project_id, location, endpoint_id } => {
                format!("projects/{}/locations/{}/endpoints/{}", project_id, location, endpoint_id)
            }
            ModelTarget::Model { project_id, location, model_id } => {
                format!("projects/{}/locations/{}/models/{}", project_id, location, model_id)
            }
            ModelTarget::Publisher { project_id, location, model_id } => format!(
                "projects/{}/locations/{}/publishers/google/models/{}",
                project_id, location, model_id
            ),
        }
    }

    pub fn generate_content_url(&self) -> String {
        format!(
            "https://{}-aiplatform.googleapis.com/v1/{}:generateContent",
            self.location(),
            self.resource_path()
        )
    }
}

/// Resolve configuration straight to a validated invocation URL.
pub fn generate_content_url(config: &VertexConfig) -> Result<Url> {
    let target = resolve_target(config).ok_or(AppraiserError::MissingModelConfig)?;
    Ok(Url::parse(&target.generate_content_url())?)
}
