// Login redirect side effect

use tokio::sync::watch;

/// Sends the user to the login entry point after an unrecoverable auth failure.
/// Fire-and-forget.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Navigator that publishes the requested path on a watch channel
pub struct LoginRedirect {
    tx: watch::Sender<Option<String>>,
}

impl LoginRedirect {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Last path a redirect was requested to, if any
    pub fn requested(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Receiver that observes redirect requests
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for LoginRedirect {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator for LoginRedirect {
    fn redirect(&self, path: &str) {
        tracing::warn!("Session expired, redirecting to {}", path);
        self.tx.send_replace(Some(path.to_string()));
    }
}
