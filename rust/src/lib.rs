mod actions;
pub mod backend;
mod core;
pub mod error;
mod logging;
pub mod memory;
pub mod model;
pub mod outbox;
pub mod pager;
pub mod realtime;
pub mod scroll;
mod state;
pub mod stream;
pub mod typing;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use backend::ChatBackend;
pub use error::BackendError;
pub use model::{ConversationPage, Message, MessagePatch, Profile};
pub use realtime::{RealtimeChannel, RealtimeEvent, RealtimeTopic};
pub use scroll::{ScrollAnchor, ViewportMetrics};
pub use state::*;
pub use updates::*;

/// Return the default `chatsync_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    crate::core::default_app_config_json()
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl FfiApp {
    /// Collaborators are Rust trait objects, so construction happens on the
    /// Rust side of the host integration; everything after it goes through
    /// the exported methods.
    pub fn new(
        data_dir: String,
        viewer_id: String,
        backend: Arc<dyn ChatBackend>,
        realtime: Arc<dyn RealtimeChannel>,
    ) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, viewer_id = %viewer_id, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty(&viewer_id)));

        // Actor loop thread (single threaded "app actor"). Every stream
        // mutation happens here, one message at a time.
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                viewer_id,
                shared_for_core,
                backend,
                realtime,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }
}

#[uniffi::export]
impl FfiApp {
    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Call from the layout pass that first renders a prepended page, with the
    /// new total content extent. Returns the offset to apply in that same pass
    /// (computed here, without a round trip through the actor), or `None` when
    /// no prepend is waiting.
    pub fn restore_scroll_anchor(&self, content_extent: f64) -> Option<f64> {
        let anchor = match self.shared_state.read() {
            Ok(g) => g.conversation.as_ref().and_then(|c| c.scroll_anchor),
            Err(poison) => poison
                .into_inner()
                .conversation
                .as_ref()
                .and_then(|c| c.scroll_anchor),
        }?;
        let _ = self
            .core_tx
            .send(CoreMsg::Action(AppAction::ScrollAnchorRestored));
        Some(anchor.restored_offset(content_extent))
    }
}
