#![allow(dead_code)]

use async_trait::async_trait;
use doc_decoder::{
    DecodedDocument, DecoderError, DocumentDecoder, PageSize, RgbaImage, Rotation,
};
use image::Rgba;
use parking_lot::Mutex;
use secrecy::SecretString;
use std::sync::Arc;
use viewer_core::key_gate::normalized_key;
use viewer_core::{
    Authorization, CallerIdentity, DecoyArtifact, DenialNotice, DocumentId, DocumentViewer,
    Grant, HostContext, KeyGate, KeyGateError, ProtectionSink, ViewerConfig,
};

pub const FAKE_WIDTH_PT: f32 = 100.0;
pub const FAKE_HEIGHT_PT: f32 = 140.0;
pub const CONTENT_MARKER: &[u8] = b"CONFIDENTIAL-CONTENT-7f3a";

/// Decodes anything into `page_count` blank pages; renders of `failing` pages error out.
#[derive(Debug, Clone)]
pub struct FakeDecoder {
    pub page_count: u32,
    pub failing: Vec<u32>,
}

impl FakeDecoder {
    pub fn new(page_count: u32) -> Self {
        Self { page_count, failing: Vec::new() }
    }

    pub fn failing(mut self, page: u32) -> Self {
        self.failing.push(page);
        self
    }
}

impl DocumentDecoder for FakeDecoder {
    fn decode(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodedDocument>, DecoderError> {
        if bytes.is_empty() {
            return Err(DecoderError::Empty);
        }
        Ok(Box::new(self.clone()))
    }
}

impl DecodedDocument for FakeDecoder {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, DecoderError> {
        if page_index >= self.page_count {
            return Err(DecoderError::PageOutOfRange { page_index, page_count: self.page_count });
        }
        Ok(PageSize { width_pt: FAKE_WIDTH_PT, height_pt: FAKE_HEIGHT_PT })
    }

    fn render_page(
        &self,
        page_index: u32,
        scale: f32,
        rotation: Rotation,
    ) -> Result<RgbaImage, DecoderError> {
        if self.failing.contains(&(page_index + 1)) {
            return Err(DecoderError::Backend(format!("corrupt page stream {}", page_index + 1)));
        }
        let (width, height) = self.page_size(page_index)?.rotated(rotation).pixel_dimensions(scale);
        Ok(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
    }
}

/// Accepts exactly one key.
pub struct StaticGate {
    pub accepted: &'static str,
    pub grant: Grant,
    pub calls: Mutex<usize>,
}

impl StaticGate {
    pub fn new(accepted: &'static str, grant: Grant) -> Self {
        Self { accepted, grant, calls: Mutex::new(0) }
    }
}

#[async_trait]
impl KeyGate for StaticGate {
    async fn authorize(
        &self,
        _document_id: &DocumentId,
        key: SecretString,
    ) -> Result<Authorization, KeyGateError> {
        *self.calls.lock() += 1;
        if normalized_key(&key)? != self.accepted {
            return Err(KeyGateError::InvalidKey("key rejected".to_string()));
        }
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.extend_from_slice(CONTENT_MARKER);
        Ok(Authorization::new(bytes, self.grant))
    }
}

/// Always fails with the given error.
pub struct FailingGate(pub KeyGateError);

#[async_trait]
impl KeyGate for FailingGate {
    async fn authorize(
        &self,
        _document_id: &DocumentId,
        _key: SecretString,
    ) -> Result<Authorization, KeyGateError> {
        Err(self.0.clone())
    }
}

/// Never answers.
pub struct StalledGate;

#[async_trait]
impl KeyGate for StalledGate {
    async fn authorize(
        &self,
        _document_id: &DocumentId,
        _key: SecretString,
    ) -> Result<Authorization, KeyGateError> {
        std::future::pending().await
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub notices: Mutex<Vec<DenialNotice>>,
    pub decoys: Mutex<Vec<DecoyArtifact>>,
}

impl ProtectionSink for RecordingSink {
    fn notify_denied(&self, notice: &DenialNotice) {
        self.notices.lock().push(notice.clone());
    }

    fn offer_decoy(&self, artifact: DecoyArtifact) {
        self.decoys.lock().push(artifact);
    }
}

pub fn viewer_with(
    decoder: impl DocumentDecoder + 'static,
    config: ViewerConfig,
) -> (DocumentViewer, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let host = HostContext::new(CallerIdentity::new("user-17", "Ada Lovelace"))
        .with_sink(sink.clone());
    let viewer =
        DocumentViewer::new(config, Arc::new(decoder), host).expect("config should be valid");
    (viewer, sink)
}

pub fn key(value: &str) -> SecretString {
    SecretString::from(value)
}
