//! Input interception for documents that may not be downloaded.
//!
//! The host forwards raw input to an [`InputHub`]. While a protected document is open,
//! [`ProtectionGate`] listens on that hub: the save shortcut and the document context
//! menu are prevented, a denial notice is raised and a decoy file may be offered in
//! place of the real one. This is a deterrent. It cannot stop screen capture or a
//! modified client.

use crate::config::ProtectionConfig;
use crate::decoy::DecoyArtifact;
use crate::document::{DocumentId, DocumentRef};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    pub key: char,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyChord {
    pub fn plain(key: char) -> Self {
        Self { key, ctrl: false, meta: false, shift: false, alt: false }
    }

    pub fn ctrl(key: char) -> Self {
        Self { ctrl: true, ..Self::plain(key) }
    }

    pub fn meta(key: char) -> Self {
        Self { meta: true, ..Self::plain(key) }
    }

    /// Ctrl+S or Cmd+S, with or without Shift.
    pub fn is_save_shortcut(&self) -> bool {
        (self.ctrl || self.meta) && !self.alt && self.key.eq_ignore_ascii_case(&'s')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTarget {
    /// The rendered pages
    DocumentSurface,
    /// Toolbars and anything else owned by the host
    Chrome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(KeyChord),
    ContextMenu { target: InputTarget },
    SelectStart { target: InputTarget },
    DragStart { target: InputTarget },
}

/// Whether the host should carry out the default action for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Proceed,
    Prevented,
}

type Listener = Arc<dyn Fn(&InputEvent) -> Disposition + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Fan-out point for host input events.
#[derive(Clone, Default)]
pub struct InputHub {
    registry: Arc<Mutex<Registry>>,
}

impl InputHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` until the returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&InputEvent) -> Disposition + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push((id, Arc::new(listener)));
        Subscription { registry: Arc::downgrade(&self.registry), id }
    }

    /// Delivers `event` to every listener. Prevented if any listener prevents it.
    pub fn dispatch(&self, event: &InputEvent) -> Disposition {
        // Listeners run outside the lock so they may subscribe or drop subscriptions.
        let listeners: Vec<Listener> =
            self.registry.lock().listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect();

        let mut disposition = Disposition::Proceed;
        for listener in listeners {
            if listener(event) == Disposition::Prevented {
                disposition = Disposition::Prevented;
            }
        }
        disposition
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

impl std::fmt::Debug for InputHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputHub").field("listeners", &self.listener_count()).finish()
    }
}

/// Removes its listener from the hub when dropped.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptedAction {
    SaveShortcut,
    ContextMenu,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenialNotice {
    pub document_id: DocumentId,
    pub action: InterceptedAction,
    pub message: String,
}

/// Host-side presentation of protection events.
pub trait ProtectionSink: Send + Sync {
    fn notify_denied(&self, notice: &DenialNotice);

    fn offer_decoy(&self, artifact: DecoyArtifact);
}

/// Logs protection events instead of showing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProtectionSink for TracingSink {
    fn notify_denied(&self, notice: &DenialNotice) {
        info!(document_id = %notice.document_id, action = ?notice.action, "{}", notice.message);
    }

    fn offer_decoy(&self, artifact: DecoyArtifact) {
        info!(
            file_name = %artifact.file_name,
            kind = ?artifact.kind,
            bytes = artifact.bytes.len(),
            "decoy offered"
        );
    }
}

pub struct ProtectionGate;

impl ProtectionGate {
    /// Starts intercepting input for `document`. Interception stops when the guard drops.
    pub fn install(
        hub: &InputHub,
        document: &DocumentRef,
        sink: Arc<dyn ProtectionSink>,
        config: &ProtectionConfig,
    ) -> ProtectionGuard {
        let deny = Arc::new(Denial {
            document: document.clone(),
            sink,
            message: config.denial_notice.clone(),
            decoy_enabled: config.decoy_enabled,
        });

        let keyboard = {
            let deny = Arc::clone(&deny);
            hub.subscribe(move |event| match event {
                InputEvent::KeyDown(chord) if chord.is_save_shortcut() => {
                    deny.intercept(InterceptedAction::SaveShortcut)
                }
                _ => Disposition::Proceed,
            })
        };

        let pointer = {
            let deny = Arc::clone(&deny);
            hub.subscribe(move |event| match event {
                InputEvent::ContextMenu { target: InputTarget::DocumentSurface } => {
                    deny.intercept(InterceptedAction::ContextMenu)
                }
                InputEvent::SelectStart { target: InputTarget::DocumentSurface }
                | InputEvent::DragStart { target: InputTarget::DocumentSurface } => {
                    Disposition::Prevented
                }
                _ => Disposition::Proceed,
            })
        };

        debug!(document_id = %document.id, "protection listeners installed");
        ProtectionGuard { document_id: document.id.clone(), subscriptions: vec![keyboard, pointer] }
    }
}

struct Denial {
    document: DocumentRef,
    sink: Arc<dyn ProtectionSink>,
    message: String,
    decoy_enabled: bool,
}

impl Denial {
    fn intercept(&self, action: InterceptedAction) -> Disposition {
        self.sink.notify_denied(&DenialNotice {
            document_id: self.document.id.clone(),
            action,
            message: self.message.clone(),
        });
        if self.decoy_enabled {
            self.sink.offer_decoy(DecoyArtifact::random(&self.document.file_name));
        }
        Disposition::Prevented
    }
}

/// Keeps the gate's listeners registered.
#[derive(Debug)]
pub struct ProtectionGuard {
    document_id: DocumentId,
    subscriptions: Vec<Subscription>,
}

impl ProtectionGuard {
    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Drop for ProtectionGuard {
    fn drop(&mut self) {
        self.subscriptions.clear();
        debug!(document_id = %self.document_id, "protection listeners removed");
    }
}
