//! Rendering collaborators.
//!
//! QR images and ticket documents are produced by external renderers behind
//! the [`QrRenderer`] and [`DocumentRenderer`] traits. Rendered bytes are
//! persisted through an [`ArtifactStore`] and referenced from batch results.

mod error;
mod fs_store;
mod passthrough;
mod traits;
mod types;

pub use error::RenderError;
pub use fs_store::FsArtifactStore;
pub use passthrough::{JsonDocumentRenderer, RawPayloadRenderer};
pub use traits::{ArtifactStore, DocumentRenderer, QrRenderer};
pub use types::{
    ArtifactKind, ArtifactRef, DocumentRequest, QrFormat, QrRenderOptions, RenderedArtifact,
};
