use crate::document::PageNumber;
use doc_decoder::{PageSize, Rotation};
use std::time::{Duration, Instant};

/// Vertical layout of a document in continuous scroll mode, in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    page_heights_px: Vec<f32>,
    page_spacing_px: f32,
}

impl PageGeometry {
    pub fn new(page_heights_px: Vec<f32>, page_spacing_px: f32) -> Self {
        Self { page_heights_px, page_spacing_px: page_spacing_px.max(0.0) }
    }

    /// Lays out pages from their decoded sizes. Unknown sizes use `estimated_height_px`.
    pub fn from_page_sizes(
        sizes: &[Option<PageSize>],
        scale: f32,
        rotation: Rotation,
        estimated_height_px: f32,
        page_spacing_px: f32,
    ) -> Self {
        let page_heights_px = sizes
            .iter()
            .map(|size| match size {
                Some(size) => size.rotated(rotation).height_pt * scale,
                None => estimated_height_px * scale,
            })
            .collect();
        Self::new(page_heights_px, page_spacing_px)
    }

    pub fn page_count(&self) -> u32 {
        self.page_heights_px.len() as u32
    }

    pub fn page_height(&self, page: PageNumber) -> Option<f32> {
        let index = page.checked_sub(1)? as usize;
        self.page_heights_px.get(index).copied()
    }

    pub fn total_height(&self) -> f32 {
        let pages: f32 = self.page_heights_px.iter().sum();
        let gaps = self.page_heights_px.len().saturating_sub(1) as f32 * self.page_spacing_px;
        pages + gaps
    }

    /// The page covering `offset`; gaps belong to the page above them.
    pub fn page_at_offset(&self, offset: f32) -> PageNumber {
        let mut cursor = 0.0;

        for (index, page_height) in self.page_heights_px.iter().enumerate() {
            let page_end = cursor + page_height;
            if offset <= page_end {
                return index as PageNumber + 1;
            }

            cursor = page_end + self.page_spacing_px;
        }

        self.page_count().max(1)
    }

    pub fn page_start_offset(&self, page: PageNumber) -> f32 {
        let mut cursor = 0.0;

        for (index, page_height) in self.page_heights_px.iter().enumerate() {
            if index as PageNumber + 1 >= page {
                return cursor;
            }
            cursor += page_height + self.page_spacing_px;
        }

        cursor
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportInput {
    Scroll { offset_px: f32 },
    Resize { width_px: f32, height_px: f32 },
    Zoom { scale: f32 },
    Rotate { rotation: Rotation },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportCommand {
    SetCurrentPage(PageNumber),
    SetScale(f32),
    SetRotation(Rotation),
}

/// Turns raw viewport input into debounced page and render-configuration changes.
///
/// The controller never reads a clock. Hosts pass the instant of every input and poll
/// once [`deadline`](Self::deadline) has passed. Bursts of input collapse into a single
/// decision taken after a quiet period of `debounce`.
#[derive(Debug, Clone)]
pub struct ViewportController {
    geometry: PageGeometry,
    debounce: Duration,
    scroll_offset_px: f32,
    viewport_width_px: f32,
    viewport_height_px: f32,
    current_page: PageNumber,
    last_input: Option<Instant>,
    position_dirty: bool,
    pending_scale: Option<f32>,
    pending_rotation: Option<Rotation>,
}

impl ViewportController {
    pub fn new(geometry: PageGeometry, debounce: Duration) -> Self {
        Self {
            geometry,
            debounce,
            scroll_offset_px: 0.0,
            viewport_width_px: 1280.0,
            viewport_height_px: 800.0,
            current_page: 1,
            last_input: None,
            position_dirty: false,
            pending_scale: None,
            pending_rotation: None,
        }
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn current_page(&self) -> PageNumber {
        self.current_page
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset_px
    }

    pub fn viewport_size(&self) -> (f32, f32) {
        (self.viewport_width_px, self.viewport_height_px)
    }

    pub fn observe(&mut self, input: ViewportInput, now: Instant) {
        match input {
            ViewportInput::Scroll { offset_px } => {
                self.scroll_offset_px = offset_px.max(0.0);
                self.position_dirty = true;
            }
            ViewportInput::Resize { width_px, height_px } => {
                self.viewport_width_px = width_px.max(0.0);
                self.viewport_height_px = height_px.max(0.0);
                self.position_dirty = true;
            }
            ViewportInput::Zoom { scale } => self.pending_scale = Some(scale),
            ViewportInput::Rotate { rotation } => self.pending_rotation = Some(rotation),
        }
        self.last_input = Some(now);
    }

    /// When the pending input becomes actionable, if any is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_input.map(|last| last + self.debounce)
    }

    /// Emits the commands that are due at `now`.
    ///
    /// Render-configuration changes come out first and on their own; the page estimate
    /// follows on the next poll so it is taken against the updated geometry.
    pub fn poll(&mut self, now: Instant) -> Vec<ViewportCommand> {
        let Some(deadline) = self.deadline() else {
            return Vec::new();
        };
        if now < deadline {
            return Vec::new();
        }

        let mut commands = Vec::new();
        if let Some(rotation) = self.pending_rotation.take() {
            commands.push(ViewportCommand::SetRotation(rotation));
        }
        if let Some(scale) = self.pending_scale.take() {
            commands.push(ViewportCommand::SetScale(scale));
        }
        if !commands.is_empty() {
            return commands;
        }

        self.last_input = None;
        if std::mem::take(&mut self.position_dirty) {
            let page = self.estimate_current_page();
            if page != self.current_page {
                self.current_page = page;
                commands.push(ViewportCommand::SetCurrentPage(page));
            }
        }
        commands
    }

    /// The page under the vertical center of the viewport.
    pub fn estimate_current_page(&self) -> PageNumber {
        let center_offset = (self.scroll_offset_px + self.viewport_height_px / 2.0).max(0.0);
        self.geometry.page_at_offset(center_offset)
    }

    pub fn scroll_offset_for_page(&self, page: PageNumber) -> f32 {
        self.geometry.page_start_offset(page)
    }

    /// Moves to the top of `page` without waiting for input. Returns the new offset.
    pub fn jump_to_page(&mut self, page: PageNumber) -> f32 {
        self.current_page = page;
        self.scroll_offset_px = self.scroll_offset_for_page(page);
        self.position_dirty = false;
        self.scroll_offset_px
    }

    /// Replaces the layout, keeping the viewport center at the same relative spot of
    /// the current page.
    pub fn set_geometry(&mut self, geometry: PageGeometry) {
        let anchor = self.current_page;
        let center = self.scroll_offset_px + self.viewport_height_px / 2.0;
        let old_start = self.geometry.page_start_offset(anchor);
        let old_height = self.geometry.page_height(anchor).unwrap_or(0.0);
        let fraction = if old_height > 0.0 { (center - old_start) / old_height } else { 0.0 };

        let new_start = geometry.page_start_offset(anchor);
        let new_height = geometry.page_height(anchor).unwrap_or(0.0);
        let new_center = new_start + fraction * new_height;

        self.scroll_offset_px = (new_center - self.viewport_height_px / 2.0).max(0.0);
        self.geometry = geometry;
    }
}
