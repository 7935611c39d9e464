use crate::types::{AppraiserError, Result};
use appraisal_core::AppraisalError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Instructions sent with an image when the user gives no note of their own.
pub const AUCTION_PROMPT: &str = "\
You are an auction specialist. Analyze this image in detail and respond ONLY in this format (include every bold label; write N/A if not visible):

**Item name:** (What is this object? One clear line.)
**Condition:** (Overall condition: wear, scratches, chips, cracks, repairs, completeness, authenticity cues.)
**Materials:** (What it is made of: e.g. wood, ceramic, metal, fabric, glass.)
**Dimensions:** (Size if visible or estimable: height, width, depth, weight if relevant.)
**Age/Period:** (Approximate age, era, or period if identifiable.)
**Maker/Origin:** (Manufacturer, artist, region, or origin if visible.)
**Details:** (Full description: style, design, markings, inscriptions, notable features, quality.)
**Damage/Flaws:** (Any damage, restoration, missing parts, or flaws.)
**Market notes:** (Why it might sell, comparable sales, demand, or caveats.)
**Price:** (Most important: clear estimate or range in currency, e.g. $50–$80 or €120. Be specific and brief reasoning.)

Price is mandatory. Be thorough but concise. Use N/A only when truly not visible.";

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";
pub const MAX_OUTPUT_TOKENS: u32 = 4096;
pub const IMAGE_TEMPERATURE: f32 = 0.2;
pub const CHAT_TEMPERATURE: f32 = 0.3;

/// Category note a user can send along with a photo.
#[derive(Debug, Clone, Serialize)]
pub struct PromptTemplate {
    pub label: &'static str,
    pub note: &'static str,
}

pub const PROMPT_TEMPLATES: &[PromptTemplate] = &[
    PromptTemplate {
        label: "Furniture",
        note: "Category: Furniture. Focus on joinery, wood type, condition, and period.",
    },
    PromptTemplate {
        label: "Ceramics",
        note: "Category: Ceramics. Note maker marks, glaze, chips, and age.",
    },
    PromptTemplate {
        label: "Jewelry",
        note: "Category: Jewelry. Describe metals, stones, hallmarks, and wear.",
    },
    PromptTemplate {
        label: "Art / Paintings",
        note: "Category: Art. Describe medium, signature, condition, and provenance if visible.",
    },
    PromptTemplate {
        label: "General",
        note: "General antique or collectible. Full condition and value assessment.",
    },
];

/// Find a template by label, ignoring case. "art" also finds "Art / Paintings".
pub fn find_template(name: &str) -> Option<&'static PromptTemplate> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return None;
    }
    PROMPT_TEMPLATES
        .iter()
        .find(|t| t.label.to_lowercase() == name)
        .or_else(|| PROMPT_TEMPLATES.iter().find(|t| t.label.to_lowercase().starts_with(&name)))
}

#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    /// A missing or empty MIME type falls back to `image/jpeg`.
    pub fn new(bytes: Vec<u8>, mime_type: Option<&str>) -> Self {
        let mime_type = mime_type
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();
        Self { bytes, mime_type }
    }
}

/// What the user asked for: an optional note and an optional photo.
#[derive(Debug, Clone)]
pub struct AppraisalRequest {
    pub text: String,
    pub image: Option<ImagePayload>,
}

impl AppraisalRequest {
    /// Trims the note; an image with no bytes counts as no image.
    pub fn new(text: &str, image: Option<ImagePayload>) -> Result<Self> {
        let text = text.trim().to_string();
        let image = image.filter(|image| !image.bytes.is_empty());
        if text.is_empty() && image.is_none() {
            return Err(AppraiserError::Appraisal(AppraisalError::InvalidInput));
        }
        Ok(Self { text, image })
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    /// Standard base64.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Build the `generateContent` body for a request.
///
/// With a photo, the user's note replaces the auction prompt when present.
pub fn build_generate_request(request: &AppraisalRequest) -> GenerateContentRequest {
    let (parts, temperature) = match &request.image {
        Some(image) => {
            let prompt = if request.text.is_empty() {
                AUCTION_PROMPT.to_string()
            } else {
                request.text.clone()
            };
            debug!("Building image request ({} bytes, {})", image.bytes.len(), image.mime_type);
            let parts = vec![
                Part::Text { text: prompt },
                Part::InlineData {
                    inline_data: Blob {
                        mime_type: image.mime_type.clone(),
                        data: STANDARD.encode(&image.bytes),
                    },
                },
            ];
            (parts, IMAGE_TEMPERATURE)
        }
        None => (
            vec![Part::Text {
                text: request.text.clone(),
            }],
            CHAT_TEMPERATURE,
        ),
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: "user".to_string(),
            parts,
        }],
        generation_config: GenerationConfig {
            temperature,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    }
}

/// MIME type for an image file, from its extension.
pub fn image_mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    };
    Some(mime)
}

/// Read an image file for upload.
pub async fn load_image(path: &Path) -> Result<ImagePayload> {
    let mime_type = image_mime_for_path(path).ok_or_else(|| AppraiserError::UnsupportedImage {
        path: path.display().to_string(),
    })?;
    let bytes = tokio::fs::read(path).await?;
    debug!("Loaded image {} ({} bytes)", path.display(), bytes.len());
    Ok(ImagePayload::new(bytes, Some(mime_type)))
}
