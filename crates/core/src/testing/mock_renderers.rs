//! Mock renderers and artifact storage.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::render::{
    ArtifactKind, ArtifactRef, ArtifactStore, DocumentRenderer, DocumentRequest, QrRenderOptions,
    QrRenderer, RenderError, RenderedArtifact,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Ticket id inside an encoded token payload.
fn ticket_id_of(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value.get("id")?.as_str().map(str::to_string)
}

/// Mock QR renderer.
///
/// Emits the payload bytes. Can fail for specific ticket ids (read from the
/// token payload) or for everything.
#[derive(Debug, Default)]
pub struct MockQrRenderer {
    calls: AtomicUsize,
    fail_all: AtomicBool,
    fail_ids: Mutex<HashSet<String>>,
}

impl MockQrRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, ticket_id: &str) {
        lock(&self.fail_ids).insert(ticket_id.to_string());
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QrRenderer for MockQrRenderer {
    fn name(&self) -> &str {
        "mock-qr"
    }

    async fn render_qr(
        &self,
        payload: &str,
        options: &QrRenderOptions,
    ) -> Result<RenderedArtifact, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ticket_id = ticket_id_of(payload).unwrap_or_default();
        if self.fail_all.load(Ordering::SeqCst) || lock(&self.fail_ids).contains(&ticket_id) {
            return Err(RenderError::Failed(format!(
                "mock renderer failure for {ticket_id}"
            )));
        }
        Ok(RenderedArtifact {
            kind: ArtifactKind::Qr,
            content_type: "text/plain".to_string(),
            extension: options.format.extension().to_string(),
            bytes: payload.as_bytes().to_vec(),
        })
    }
}

/// Mock document renderer. Fails for configured ticket ids.
#[derive(Debug, Default)]
pub struct MockDocumentRenderer {
    calls: AtomicUsize,
    fail_ids: Mutex<HashSet<String>>,
}

impl MockDocumentRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, ticket_id: &str) {
        lock(&self.fail_ids).insert(ticket_id.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentRenderer for MockDocumentRenderer {
    fn name(&self) -> &str {
        "mock-document"
    }

    async fn render_document(
        &self,
        request: &DocumentRequest<'_>,
    ) -> Result<RenderedArtifact, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.fail_ids).contains(&request.ticket.id) {
            return Err(RenderError::Failed(format!(
                "template {} failed for {}",
                request.template, request.ticket.id
            )));
        }
        Ok(RenderedArtifact {
            kind: ArtifactKind::Document,
            content_type: "application/pdf".to_string(),
            extension: "pdf".to_string(),
            bytes: format!("%PDF-mock {} {}", request.ticket.id, request.token).into_bytes(),
        })
    }
}

/// Keeps artifacts in memory, keyed by `batch_id/name`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<String, RenderedArtifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.artifacts).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, batch_id: &str, name: &str) -> Option<RenderedArtifact> {
        lock(&self.artifacts)
            .get(&format!("{batch_id}/{name}"))
            .cloned()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn store(
        &self,
        batch_id: &str,
        name: &str,
        artifact: &RenderedArtifact,
    ) -> Result<ArtifactRef, RenderError> {
        let key = format!("{batch_id}/{name}");
        let reference = ArtifactRef {
            kind: artifact.kind,
            uri: format!("memory://{key}.{}", artifact.extension),
            content_type: artifact.content_type.clone(),
            size_bytes: artifact.bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(&artifact.bytes)),
        };
        lock(&self.artifacts).insert(key, artifact.clone());
        Ok(reference)
    }
}
