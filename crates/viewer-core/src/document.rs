use doc_decoder::Rotation;
use serde::Serialize;
use std::fmt;

/// One-based page number.
pub type PageNumber = u32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What a host asks the viewer to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: DocumentId,
    pub file_name: String,
}

impl DocumentRef {
    pub fn new(id: impl Into<DocumentId>, file_name: impl Into<String>) -> Self {
        Self { id: id.into(), file_name: file_name.into() }
    }
}

/// The authenticated user on whose behalf a document is shown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallerIdentity {
    pub user_id: String,
    pub display_name: String,
}

impl CallerIdentity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), display_name: display_name.into() }
    }

    /// Display name, or `fallback` when the host supplied none.
    pub fn name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        let name = self.display_name.trim();
        if name.is_empty() {
            fallback
        } else {
            name
        }
    }
}

/// Capabilities granted by the content service. Never derived from the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Grant {
    pub can_view: bool,
    pub can_download: bool,
}

impl Grant {
    pub const fn none() -> Self {
        Self { can_view: false, can_download: false }
    }

    pub const fn view_only() -> Self {
        Self { can_view: true, can_download: false }
    }

    pub const fn full() -> Self {
        Self { can_view: true, can_download: true }
    }

    pub fn permits(&self, action: Action) -> bool {
        match action {
            Action::View => self.can_view,
            Action::Download => self.can_download,
        }
    }

    pub fn requires_protection(&self) -> bool {
        !self.can_download
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Download,
}

/// Lifecycle of the document held by a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Unloaded,
    KeyPending,
    Loaded,
    Invalidated,
    Closed,
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::KeyPending => "key-pending",
            Self::Loaded => "loaded",
            Self::Invalidated => "invalidated",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// An unlocked document. Exists only between a successful key exchange and close.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: DocumentId,
    file_name: String,
    page_count: u32,
    scale: f32,
    rotation: Rotation,
    grant: Grant,
}

impl Document {
    pub(crate) fn new(reference: DocumentRef, page_count: u32, scale: f32, grant: Grant) -> Self {
        Self {
            id: reference.id,
            file_name: reference.file_name,
            page_count,
            scale,
            rotation: Rotation::Deg0,
            grant,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn grant(&self) -> Grant {
        self.grant
    }

    pub fn permits(&self, action: Action) -> bool {
        self.grant.permits(action)
    }

    /// Clamps a requested page into `[1, page_count]`.
    pub fn clamp_page(&self, page: PageNumber) -> PageNumber {
        page.clamp(1, self.page_count.max(1))
    }

    pub(crate) fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    pub(crate) fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }
}
