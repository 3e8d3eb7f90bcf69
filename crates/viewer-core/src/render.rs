use crate::document::{CallerIdentity, Grant, PageNumber};
use crate::watermark::{stamp, WatermarkSpec, WatermarkStyle};
use crate::window::{RenderEpoch, RenderTicket};
use doc_decoder::{DecodedDocument, RgbaImage, Rotation};
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a single page could not be produced. Never affects other pages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("page {page} could not be rendered: {message}")]
    Decoder { page: PageNumber, message: String },
    #[error("render task for page {page} ended abnormally: {message}")]
    Interrupted { page: PageNumber, message: String },
}

/// A rendered page raster, owned by exactly one cache entry.
#[derive(Debug, Clone)]
pub struct Surface {
    pub page: PageNumber,
    pub epoch: RenderEpoch,
    pub image: RgbaImage,
    pub watermark: Option<WatermarkSpec>,
}

impl Surface {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn memory_size(&self) -> usize {
        self.image.as_raw().len()
    }

    pub fn is_watermarked(&self) -> bool {
        self.watermark.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderJob {
    pub ticket: RenderTicket,
    pub scale: f32,
    pub rotation: Rotation,
}

#[derive(Debug)]
pub struct RenderCompletion {
    pub ticket: RenderTicket,
    pub result: Result<Surface, RenderError>,
}

/// Produces page surfaces for one document.
///
/// The renderer only reads: it holds the decoded document, the grant and the caller
/// identity, and hands results back to the window manager for commit.
pub struct PageRenderer {
    document: Arc<dyn DecodedDocument>,
    grant: Grant,
    identity: CallerIdentity,
    style: WatermarkStyle,
}

impl PageRenderer {
    pub fn new(
        document: Arc<dyn DecodedDocument>,
        grant: Grant,
        identity: CallerIdentity,
        style: WatermarkStyle,
    ) -> Self {
        Self { document, grant, identity, style }
    }

    pub fn grant(&self) -> Grant {
        self.grant
    }

    /// Renders `job` on the current thread.
    pub fn render(&self, job: &RenderJob) -> Result<Surface, RenderError> {
        let page = job.ticket.page;
        let mut image = self
            .document
            .render_page(page.saturating_sub(1), job.scale, job.rotation)
            .map_err(|err| RenderError::Decoder { page, message: err.to_string() })?;

        let watermark = if self.grant.requires_protection() {
            let spec = WatermarkSpec::for_page(&self.identity, page, &self.style);
            stamp(&mut image, &spec, &self.style);
            Some(spec)
        } else {
            None
        };

        debug!(
            page,
            epoch = job.ticket.epoch,
            width = image.width(),
            height = image.height(),
            watermarked = watermark.is_some(),
            "page rendered"
        );
        Ok(Surface { page, epoch: job.ticket.epoch, image, watermark })
    }

    /// Renders `job` on the blocking pool. Always yields a completion for the ticket.
    pub async fn render_async(self: Arc<Self>, job: RenderJob) -> RenderCompletion {
        let ticket = job.ticket;
        let result = match tokio::task::spawn_blocking(move || self.render(&job)).await {
            Ok(result) => result,
            Err(err) => {
                warn!(page = ticket.page, error = %err, "render task failed");
                Err(RenderError::Interrupted { page: ticket.page, message: err.to_string() })
            }
        };
        RenderCompletion { ticket, result }
    }
}
