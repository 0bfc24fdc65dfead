use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::token::TicketData;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrFormat {
    #[default]
    Png,
    Svg,
    /// Text payload, for renderers that do not produce images.
    Text,
}

impl QrFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            QrFormat::Png => "png",
            QrFormat::Svg => "svg",
            QrFormat::Text => "txt",
        }
    }
}

/// QR rendering parameters from the batch request's renderer options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRenderOptions {
    #[serde(default = "default_qr_size")]
    pub size: u32,
    #[serde(default)]
    pub format: QrFormat,
}

fn default_qr_size() -> u32 {
    300
}

impl Default for QrRenderOptions {
    fn default() -> Self {
        Self {
            size: default_qr_size(),
            format: QrFormat::default(),
        }
    }
}

/// Input for a document renderer.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRequest<'a> {
    pub ticket: &'a TicketData,
    pub event: &'a Value,
    pub user: &'a Value,
    pub template: &'a str,
    /// Encoded signed token, for renderers that embed the QR code.
    pub token: &'a str,
    pub options: &'a Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Qr,
    Document,
}

/// Rendered bytes, before they are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedArtifact {
    pub kind: ArtifactKind,
    pub content_type: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Reference to a stored artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub uri: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_options_defaults() {
        let options: QrRenderOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, QrRenderOptions::default());
        assert_eq!(options.size, 300);

        let options: QrRenderOptions = serde_json::from_str(r#"{"size":512,"format":"svg"}"#).unwrap();
        assert_eq!(options.format.extension(), "svg");
    }
}
