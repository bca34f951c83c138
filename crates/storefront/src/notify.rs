//! UI notification channel.
//!
//! Fire-and-forget toasts surfaced on login, logout, and persistence
//! failures. Presentation-only: nothing in the state contract depends on a
//! listener being attached, and a dropped receiver never blocks the core.

use tokio::sync::mpsc;

/// A single toast notification for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toast {
    /// Operation succeeded (e.g. "Logged out successfully!").
    Success(String),
    /// Recoverable problem; the store remains usable.
    Warning(String),
    /// Operation failed outright.
    Error(String),
}

impl Toast {
    /// The user-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Success(msg) | Self::Warning(msg) | Self::Error(msg) => msg,
        }
    }
}

/// Sending half of the notification channel.
///
/// Cheap to clone; every component that needs to surface a toast holds one.
#[derive(Debug, Clone)]
pub struct ToastSender {
    tx: mpsc::UnboundedSender<Toast>,
}

/// Receiving half of the notification channel, consumed by the UI shell.
pub type ToastReceiver = mpsc::UnboundedReceiver<Toast>;

impl ToastSender {
    /// Send a toast, ignoring the absence of a listener.
    pub fn send(&self, toast: Toast) {
        if self.tx.send(toast).is_err() {
            tracing::debug!("toast dropped: no UI listener attached");
        }
    }

    /// Send a success toast.
    pub fn success(&self, message: impl Into<String>) {
        self.send(Toast::Success(message.into()));
    }

    /// Send a warning toast.
    pub fn warning(&self, message: impl Into<String>) {
        self.send(Toast::Warning(message.into()));
    }

    /// Send an error toast.
    pub fn error(&self, message: impl Into<String>) {
        self.send(Toast::Error(message.into()));
    }
}

/// Create a new notification channel.
#[must_use]
pub fn toast_channel() -> (ToastSender, ToastReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ToastSender { tx }, rx)
}
