use async_trait::async_trait;

use super::error::RenderError;
use super::types::{ArtifactRef, DocumentRequest, QrRenderOptions, RenderedArtifact};

/// Renders a token payload into a QR image.
#[async_trait]
pub trait QrRenderer: Send + Sync {
    fn name(&self) -> &str;

    async fn render_qr(
        &self,
        payload: &str,
        options: &QrRenderOptions,
    ) -> Result<RenderedArtifact, RenderError>;
}

/// Renders a ticket document (PDF or similar) from a template.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    fn name(&self) -> &str;

    async fn render_document(
        &self,
        request: &DocumentRequest<'_>,
    ) -> Result<RenderedArtifact, RenderError>;
}

/// Persists rendered artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `artifact` as `name` within the batch's namespace.
    async fn store(
        &self,
        batch_id: &str,
        name: &str,
        artifact: &RenderedArtifact,
    ) -> Result<ArtifactRef, RenderError>;
}
