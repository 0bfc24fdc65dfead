//! Renderers that emit structured data instead of images.
//!
//! The server uses these when no image or PDF renderer is deployed: the QR
//! artifact is the encoded token itself and the document is JSON.

use async_trait::async_trait;
use serde_json::json;

use super::error::RenderError;
use super::traits::{DocumentRenderer, QrRenderer};
use super::types::{ArtifactKind, DocumentRequest, QrFormat, QrRenderOptions, RenderedArtifact};

/// Emits the QR payload as plain text.
#[derive(Debug, Default, Clone)]
pub struct RawPayloadRenderer;

#[async_trait]
impl QrRenderer for RawPayloadRenderer {
    fn name(&self) -> &str {
        "raw"
    }

    async fn render_qr(
        &self,
        payload: &str,
        _options: &QrRenderOptions,
    ) -> Result<RenderedArtifact, RenderError> {
        if payload.is_empty() {
            return Err(RenderError::InvalidInput("empty QR payload".to_string()));
        }
        Ok(RenderedArtifact {
            kind: ArtifactKind::Qr,
            content_type: "text/plain".to_string(),
            extension: QrFormat::Text.extension().to_string(),
            bytes: payload.as_bytes().to_vec(),
        })
    }
}

/// Emits the document inputs as a JSON document.
#[derive(Debug, Default, Clone)]
pub struct JsonDocumentRenderer;

#[async_trait]
impl DocumentRenderer for JsonDocumentRenderer {
    fn name(&self) -> &str {
        "json"
    }

    async fn render_document(
        &self,
        request: &DocumentRequest<'_>,
    ) -> Result<RenderedArtifact, RenderError> {
        let document = json!({
            "template": request.template,
            "ticket": request.ticket,
            "event": request.event,
            "user": request.user,
            "token": request.token,
            "options": request.options,
        });
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| RenderError::Failed(e.to_string()))?;

        Ok(RenderedArtifact {
            kind: ArtifactKind::Document,
            content_type: "application/json".to_string(),
            extension: "json".to_string(),
            bytes,
        })
    }
}
