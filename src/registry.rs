//! Document → preview session routing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::session::PreviewSession;

/// Pick the session an event from `document` should go to.
///
/// An exact match wins. Otherwise, when exactly one session exists, it is the
/// target: with a single preview open, events from any file of a multi-file
/// project reach it. With several previews and no exact match the event has
/// no target.
pub fn resolve_by_policy<'a, S>(sessions: &'a HashMap<PathBuf, S>, document: &Path) -> Option<&'a S> {
    if let Some(session) = sessions.get(document) {
        return Some(session);
    }
    if sessions.len() == 1 {
        return sessions.values().next();
    }
    None
}

/// The single owner of document → session bindings.
///
/// Every operation holds the map lock only for the map update itself;
/// sessions are disposed after it is released, so dispose hooks may call
/// back into the registry.
#[derive(Default)]
pub struct TaskRegistry {
    sessions: Mutex<HashMap<PathBuf, Arc<PreviewSession>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `session` to its document, disposing any session it replaces.
    ///
    /// A replaced session is not reported as ended: the document keeps a
    /// live preview.
    pub fn register(&self, session: Arc<PreviewSession>) {
        let document = session.document().to_path_buf();
        let replaced = self.sessions.lock().insert(document, Arc::clone(&session));
        if let Some(old) = replaced {
            if old.id() != session.id() {
                tracing::info!(
                    old = %old.id(),
                    new = %session.id(),
                    document = %session.document().display(),
                    "Replacing preview session"
                );
                old.dispose();
            }
        }
    }

    pub fn resolve(&self, document: &Path) -> Option<Arc<PreviewSession>> {
        let sessions = self.sessions.lock();
        resolve_by_policy(&*sessions, document).cloned()
    }

    /// Exact lookup without the single-session fallback.
    pub fn get(&self, document: &Path) -> Option<Arc<PreviewSession>> {
        self.sessions.lock().get(document).cloned()
    }

    /// Remove the binding for `document`. Idempotent.
    pub fn unregister(&self, document: &Path) -> Option<Arc<PreviewSession>> {
        self.sessions.lock().remove(document)
    }

    /// Remove the binding only if it still belongs to session `id`, so a
    /// late teardown never removes the session that replaced it.
    pub fn unregister_session(&self, document: &Path, id: Uuid) -> Option<Arc<PreviewSession>> {
        let mut sessions = self.sessions.lock();
        match sessions.get(document) {
            Some(session) if session.id() == id => sessions.remove(document),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn documents(&self) -> Vec<PathBuf> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Remove every binding and hand the sessions back for disposal.
    pub fn drain(&self) -> Vec<Arc<PreviewSession>> {
        self.sessions.lock().drain().map(|(_, session)| session).collect()
    }
}
