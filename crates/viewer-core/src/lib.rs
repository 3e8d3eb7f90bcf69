pub mod config;
pub mod decoy;
pub mod document;
pub mod error;
pub mod key_gate;
pub mod protection;
pub mod render;
pub mod session;
pub mod viewport;
pub mod watermark;
pub mod window;

pub use config::{ConfigError, KeyGateConfig, ProtectionConfig, ViewerConfig, WatermarkConfig};
pub use decoy::{DecoyArtifact, DecoyKind};
pub use document::{
    Action, CallerIdentity, Document, DocumentId, DocumentRef, DocumentState, Grant, PageNumber,
};
pub use error::ViewerError;
pub use key_gate::{Authorization, HttpKeyGate, KeyGate, KeyGateError, RetryAdvice};
pub use protection::{
    DenialNotice, Disposition, InputEvent, InputHub, InputTarget, InterceptedAction, KeyChord,
    ProtectionGate, ProtectionGuard, ProtectionSink, Subscription, TracingSink,
};
pub use render::{PageRenderer, RenderCompletion, RenderError, RenderJob, Surface};
pub use session::{DocumentViewer, HostContext};
pub use viewport::{PageGeometry, ViewportCommand, ViewportController, ViewportInput};
pub use watermark::{WatermarkSpec, WatermarkStyle};
pub use window::{
    CommitOutcome, CommitReport, PageState, PageView, PageWindowManager, RenderEpoch,
    RenderTicket, WindowState, WindowStats, WindowUpdate,
};

pub use doc_decoder::{PageSize, Rotation};
