//! The viewer session that ties the pipeline together.
//!
//! [`DocumentViewer`] owns everything that exists for an open document: the decoded
//! document, the page cache, the viewport controller, in-flight renders and the
//! protection listeners. Renders run as independent tasks, but their results are only
//! ever committed here, through `&mut self`.

use crate::config::ViewerConfig;
use crate::document::{
    Action, CallerIdentity, Document, DocumentRef, DocumentState, PageNumber,
};
use crate::error::ViewerError;
use crate::key_gate::{KeyGate, KeyGateError, RetryAdvice};
use crate::protection::{InputHub, ProtectionGate, ProtectionGuard, ProtectionSink, TracingSink};
use crate::render::{PageRenderer, RenderCompletion, RenderJob};
use crate::viewport::{PageGeometry, ViewportCommand, ViewportController, ViewportInput};
use crate::watermark::WatermarkStyle;
use crate::window::{
    CommitReport, PageView, PageWindowManager, RenderEpoch, WindowState, WindowStats,
    WindowUpdate,
};
use doc_decoder::{DecodedDocument, DecoderError, DocumentDecoder, PageSize, Rotation};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What the embedding application provides to a viewer.
#[derive(Clone)]
pub struct HostContext {
    pub identity: CallerIdentity,
    pub input: InputHub,
    pub sink: Arc<dyn ProtectionSink>,
}

impl HostContext {
    /// A context with a fresh input hub that logs protection events.
    pub fn new(identity: CallerIdentity) -> Self {
        Self { identity, input: InputHub::new(), sink: Arc::new(TracingSink) }
    }

    pub fn with_input(mut self, input: InputHub) -> Self {
        self.input = input;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProtectionSink>) -> Self {
        self.sink = sink;
        self
    }
}

struct Session {
    document: Document,
    page_sizes: Vec<Option<PageSize>>,
    pages: PageWindowManager,
    renderer: Arc<PageRenderer>,
    viewport: ViewportController,
    in_flight: JoinSet<RenderCompletion>,
    max_in_flight: usize,
    _protection: Option<ProtectionGuard>,
}

impl Session {
    /// Runs the key exchange and decode for `reference`. Errors carry the state the
    /// viewer should move to.
    async fn open(
        config: &ViewerConfig,
        style: &WatermarkStyle,
        decoder: &Arc<dyn DocumentDecoder>,
        host: &HostContext,
        gate: &dyn KeyGate,
        reference: DocumentRef,
        key: SecretString,
    ) -> Result<Self, (ViewerError, DocumentState)> {
        let authorization = match gate.authorize(&reference.id, key).await {
            Ok(authorization) => authorization,
            Err(err) => {
                let next = match err.retry_advice() {
                    RetryAdvice::Abort => DocumentState::Closed,
                    RetryAdvice::NewKey | RetryAdvice::Unchanged => DocumentState::Unloaded,
                };
                warn!(document_id = %reference.id, error = %err, state = %next, "unlock failed");
                return Err((err.into(), next));
            }
        };

        let (bytes, grant) = authorization.into_parts();
        if !grant.can_view {
            let err = KeyGateError::Forbidden("grant does not include view access".into());
            return Err((err.into(), DocumentState::Closed));
        }

        let decoder = Arc::clone(decoder);
        let decoded = match tokio::task::spawn_blocking(move || decoder.decode(bytes)).await {
            Ok(Ok(decoded)) => Arc::<dyn DecodedDocument>::from(decoded),
            Ok(Err(err)) => return Err(decode_failure(&reference, err)),
            Err(err) => {
                return Err(decode_failure(&reference, DecoderError::Backend(err.to_string())))
            }
        };

        let page_count = decoded.page_count();
        if page_count == 0 {
            return Err(decode_failure(&reference, DecoderError::Empty));
        }
        let page_sizes = (0..page_count).map(|index| decoded.page_size(index).ok()).collect();

        let protection = grant.requires_protection().then(|| {
            ProtectionGate::install(&host.input, &reference, Arc::clone(&host.sink), &config.protection)
        });

        let renderer =
            Arc::new(PageRenderer::new(decoded, grant, host.identity.clone(), style.clone()));
        let document = Document::new(reference, page_count, config.default_scale, grant);
        let placeholder = PageGeometry::new(Vec::new(), config.page_gap_px);

        let mut session = Session {
            document,
            page_sizes,
            pages: PageWindowManager::new(page_count, config.window_radius),
            renderer,
            viewport: ViewportController::new(placeholder, config.debounce()),
            in_flight: JoinSet::new(),
            max_in_flight: config.max_concurrent_renders,
            _protection: protection,
        };
        let geometry = session.geometry(config);
        session.viewport.set_geometry(geometry);
        session.viewport.jump_to_page(1);
        session.pages.set_current_page(1);
        session.dispatch_ready();

        info!(
            document_id = %session.document.id(),
            page_count,
            can_download = grant.can_download,
            "document opened"
        );
        Ok(session)
    }

    /// Starts pending renders until the concurrency limit is reached.
    fn dispatch_ready(&mut self) {
        while self.in_flight.len() < self.max_in_flight {
            let Some(ticket) = self.pages.next_dispatch() else {
                break;
            };
            let job = RenderJob {
                ticket,
                scale: self.document.scale(),
                rotation: self.document.rotation(),
            };
            debug!(page = ticket.page, epoch = ticket.epoch, "render dispatched");
            self.in_flight.spawn(Arc::clone(&self.renderer).render_async(job));
        }
    }

    fn geometry(&self, config: &ViewerConfig) -> PageGeometry {
        PageGeometry::from_page_sizes(
            &self.page_sizes,
            self.document.scale(),
            self.document.rotation(),
            config.estimated_page_height_px,
            config.page_gap_px,
        )
    }
}

fn decode_failure(reference: &DocumentRef, err: DecoderError) -> (ViewerError, DocumentState) {
    warn!(document_id = %reference.id, error = %err, "document could not be decoded");
    (ViewerError::Decode(err), DocumentState::Closed)
}

/// Holds the viewer in `KeyPending` while an unlock is in progress and puts it back to
/// `Unloaded` if the unlock is abandoned before it finishes.
struct PendingUnlock<'a> {
    state: &'a mut DocumentState,
    finished: bool,
}

impl<'a> PendingUnlock<'a> {
    fn enter(state: &'a mut DocumentState) -> Self {
        *state = DocumentState::KeyPending;
        Self { state, finished: false }
    }

    fn finish(mut self, next: DocumentState) {
        *self.state = next;
        self.finished = true;
    }
}

impl Drop for PendingUnlock<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("unlock abandoned before completion");
            *self.state = DocumentState::Unloaded;
        }
    }
}

/// A secure, windowed viewer for one document at a time.
pub struct DocumentViewer {
    config: ViewerConfig,
    style: WatermarkStyle,
    decoder: Arc<dyn DocumentDecoder>,
    host: HostContext,
    state: DocumentState,
    session: Option<Session>,
}

impl DocumentViewer {
    pub fn new(
        config: ViewerConfig,
        decoder: Arc<dyn DocumentDecoder>,
        host: HostContext,
    ) -> Result<Self, ViewerError> {
        config.validate()?;
        let style = WatermarkStyle::from_config(&config.watermark)?;
        Ok(Self { config, style, decoder, host, state: DocumentState::Unloaded, session: None })
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn input(&self) -> &InputHub {
        &self.host.input
    }

    pub fn document(&self) -> Option<&Document> {
        self.session.as_ref().map(|session| &session.document)
    }

    /// Exchanges `key` for the document and opens it at page 1.
    ///
    /// On `InvalidKey` or a network failure the viewer returns to `Unloaded` and may be
    /// unlocked again. A forbidden or undecodable document closes the viewer. Dropping the
    /// returned future before it completes also leaves the viewer `Unloaded`.
    pub async fn unlock(
        &mut self,
        gate: &dyn KeyGate,
        reference: DocumentRef,
        key: SecretString,
    ) -> Result<(), ViewerError> {
        self.expect_state(DocumentState::Unloaded)?;
        info!(document_id = %reference.id, "unlocking document");

        let pending = PendingUnlock::enter(&mut self.state);
        let opened = Session::open(
            &self.config,
            &self.style,
            &self.decoder,
            &self.host,
            gate,
            reference,
            key,
        )
        .await;

        match opened {
            Ok(session) => {
                pending.finish(DocumentState::Loaded);
                self.session = Some(session);
                Ok(())
            }
            Err((err, next)) => {
                pending.finish(next);
                Err(err)
            }
        }
    }

    /// Navigates to `page` (clamped into the document).
    pub fn set_current_page(&mut self, page: PageNumber) -> Result<WindowUpdate, ViewerError> {
        let session = self.loaded_mut()?;
        let page = session.document.clamp_page(page);
        session.viewport.jump_to_page(page);
        Ok(session.pages.set_current_page(page))
    }

    /// Changes the render scale. Returns `None` when the clamped scale is unchanged or the
    /// requested scale is not a finite number.
    pub fn set_scale(&mut self, scale: f32) -> Result<Option<WindowUpdate>, ViewerError> {
        let document = self.loaded_mut()?.document.clone();
        if !scale.is_finite() {
            warn!(scale, "ignoring non-finite scale");
            return Ok(None);
        }
        let scale = self.config.clamp_scale(scale);
        if (document.scale() - scale).abs() < f32::EPSILON {
            return Ok(None);
        }
        self.reconfigure(scale, document.rotation()).map(Some)
    }

    pub fn set_rotation(&mut self, rotation: Rotation) -> Result<Option<WindowUpdate>, ViewerError> {
        let document = self.loaded_mut()?.document.clone();
        if document.rotation() == rotation {
            return Ok(None);
        }
        self.reconfigure(document.scale(), rotation).map(Some)
    }

    pub fn zoom_in(&mut self) -> Result<Option<WindowUpdate>, ViewerError> {
        let scale = self.loaded_mut()?.document.scale();
        self.set_scale(scale + self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> Result<Option<WindowUpdate>, ViewerError> {
        let scale = self.loaded_mut()?.document.scale();
        self.set_scale(scale - self.config.zoom_step)
    }

    pub fn rotate_clockwise(&mut self) -> Result<Option<WindowUpdate>, ViewerError> {
        let rotation = self.loaded_mut()?.document.rotation();
        self.set_rotation(rotation.clockwise())
    }

    fn reconfigure(&mut self, scale: f32, rotation: Rotation) -> Result<WindowUpdate, ViewerError> {
        self.expect_state(DocumentState::Loaded)?;
        self.state = DocumentState::Invalidated;

        let config = &self.config;
        let session = self.session.as_mut().ok_or(ViewerError::InvalidState {
            expected: DocumentState::Loaded,
            actual: DocumentState::Unloaded,
        })?;
        session.document.set_scale(scale);
        session.document.set_rotation(rotation);
        let update = session.pages.invalidate();
        let geometry = session.geometry(config);
        session.viewport.set_geometry(geometry);

        info!(scale, rotation = %rotation, epoch = session.pages.epoch(), "render configuration changed");
        self.state = DocumentState::Loaded;
        Ok(update)
    }

    /// Feeds one viewport input. Nothing happens until [`flush_viewport`](Self::flush_viewport).
    pub fn observe(&mut self, input: ViewportInput, now: Instant) -> Result<(), ViewerError> {
        self.loaded_mut()?.viewport.observe(input, now);
        Ok(())
    }

    pub fn viewport_deadline(&self) -> Option<Instant> {
        self.session.as_ref().and_then(|session| session.viewport.deadline())
    }

    /// Applies every viewport decision due at `now`.
    pub fn flush_viewport(&mut self, now: Instant) -> Result<Vec<WindowUpdate>, ViewerError> {
        let mut updates = Vec::new();
        loop {
            let commands = self.loaded_mut()?.viewport.poll(now);
            if commands.is_empty() {
                return Ok(updates);
            }
            for command in commands {
                let update = match command {
                    ViewportCommand::SetCurrentPage(page) => {
                        Some(self.loaded_mut()?.pages.set_current_page(page))
                    }
                    ViewportCommand::SetScale(scale) => self.set_scale(scale)?,
                    ViewportCommand::SetRotation(rotation) => self.set_rotation(rotation)?,
                };
                updates.extend(update);
            }
        }
    }

    pub fn scroll_offset_for_page(&self, page: PageNumber) -> Option<f32> {
        self.session.as_ref().map(|session| session.viewport.scroll_offset_for_page(page))
    }

    /// Waits for the next render to finish and commits it.
    ///
    /// Returns `None` once nothing is pending or in flight.
    pub async fn next_commit(&mut self) -> Option<CommitReport> {
        let session = self.session.as_mut()?;
        session.dispatch_ready();

        loop {
            match session.in_flight.join_next().await? {
                Ok(completion) => {
                    let report = session.pages.commit(completion);
                    session.dispatch_ready();
                    return Some(report);
                }
                Err(err) => {
                    // Renders turn their own failures into completions, so only an
                    // aborted or panicked task lands here; its page stays Rendering
                    // until the window moves past it.
                    warn!(error = %err, "render task lost");
                    session.dispatch_ready();
                }
            }
        }
    }

    /// Drives renders until the window is settled. Returns how many results were applied.
    pub async fn settle(&mut self) -> usize {
        let mut applied = 0;
        while self.next_commit().await.is_some() {
            applied += 1;
        }
        applied
    }

    pub fn page(&self, page: PageNumber) -> PageView<'_> {
        self.session.as_ref().map_or(PageView::Absent, |session| session.pages.page(page))
    }

    pub fn resident_pages(&self) -> Vec<PageNumber> {
        self.session.as_ref().map(|session| session.pages.resident_pages()).unwrap_or_default()
    }

    pub fn window(&self) -> Option<WindowState> {
        self.session.as_ref().map(|session| session.pages.window())
    }

    pub fn current_page(&self) -> Option<PageNumber> {
        self.window().map(|window| window.current_page)
    }

    pub fn displayed_page(&self) -> Option<PageNumber> {
        self.session.as_ref().and_then(|session| session.pages.displayed_page())
    }

    pub fn epoch(&self) -> Option<RenderEpoch> {
        self.session.as_ref().map(|session| session.pages.epoch())
    }

    pub fn stats(&self) -> WindowStats {
        self.session.as_ref().map(|session| session.pages.stats()).unwrap_or_default()
    }

    pub fn in_flight(&self) -> usize {
        self.session.as_ref().map_or(0, |session| session.in_flight.len())
    }

    pub fn is_settled(&self) -> bool {
        self.session
            .as_ref()
            .map_or(true, |session| session.in_flight.is_empty() && session.pages.is_settled())
    }

    /// Whether the open document's grant allows `action`. Nothing is allowed when closed.
    pub fn permits(&self, action: Action) -> bool {
        self.document().is_some_and(|document| document.permits(action))
    }

    /// Releases the document, its cached pages and the protection listeners.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.in_flight.abort_all();
            let released = session.pages.clear();
            info!(document_id = %session.document.id(), released, "document closed");
        }
        self.state = DocumentState::Closed;
    }

    fn expect_state(&self, expected: DocumentState) -> Result<(), ViewerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ViewerError::InvalidState { expected, actual: self.state })
        }
    }

    fn loaded_mut(&mut self) -> Result<&mut Session, ViewerError> {
        let actual = self.state;
        match self.session.as_mut() {
            Some(session) if actual == DocumentState::Loaded => Ok(session),
            _ => Err(ViewerError::InvalidState { expected: DocumentState::Loaded, actual }),
        }
    }
}

impl Drop for DocumentViewer {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.close();
        }
    }
}
