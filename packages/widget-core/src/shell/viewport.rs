//! Host viewport width and the responsive bubble rule.

use std::sync::Arc;

use tokio::sync::watch;

/// Width (px) below which an open panel hides the chat bubble
pub const DEFAULT_MOBILE_BREAKPOINT: u32 = 700;

/// The host window's width, published to every mounted widget.
///
/// Each mounted shell holds one subscription and releases it on unmount.
#[derive(Debug, Clone)]
pub struct Viewport {
    width: Arc<watch::Sender<u32>>,
}

impl Viewport {
    pub fn new(width: u32) -> Self {
        let (tx, _rx) = watch::channel(width);
        Self { width: Arc::new(tx) }
    }

    /// Current window width
    pub fn width(&self) -> u32 {
        *self.width.borrow()
    }

    /// Publish a resize event
    pub fn resize(&self, width: u32) {
        self.width.send_replace(width);
    }

    /// Register a resize listener
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.width.subscribe()
    }

    /// Number of live resize listeners
    pub fn listener_count(&self) -> usize {
        self.width.receiver_count()
    }
}

/// Whether the chat bubble is shown for a window width and panel state.
///
/// On narrow screens the open panel covers the page and is closed from its own
/// header, so the bubble is hidden.
pub fn bubble_visible(width: u32, is_open: bool, breakpoint: u32) -> bool {
    !(is_open && width < breakpoint)
}
