//! Viewport size tracking.
//!
//! The host window reports resize events through a [`WindowHost`]. A
//! [`ViewportSizeTracker`] activation registers exactly one listener, captures
//! the current size immediately, and removes the listener again when the
//! returned [`ViewportSubscription`] is dropped.

use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Last measured size of the host viewport, unmeasured until the first event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportSize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ViewportSize {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }

    /// Both dimensions, if measured
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_measured(&self) -> bool {
        self.dimensions().is_some()
    }
}

/// Callback invoked with the new `(width, height)` on every resize
pub type ResizeListener = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// Handle identifying one registered resize listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The windowing environment hosting the capture view
pub trait WindowHost: Send + Sync {
    /// Whether a windowing environment exists at all
    fn has_windowing(&self) -> bool;

    /// Current inner size of the window
    fn inner_size(&self) -> Option<(u32, u32)>;

    /// Register a resize listener
    fn add_resize_listener(&self, listener: ResizeListener) -> ListenerId;

    /// Remove a previously registered listener, returning whether it existed
    fn remove_resize_listener(&self, id: ListenerId) -> bool;
}

/// Listener registry hosts embed to deliver resize events in order
#[derive(Default)]
pub struct ResizeDispatcher {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, ResizeListener)>>,
}

impl ResizeDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: ResizeListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver a resize event to every listener
    pub fn dispatch(&self, width: u32, height: u32) {
        // Listeners run outside the lock so they may (un)register
        let listeners: Vec<ResizeListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(width, height);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Host for environments without any window (headless runs)
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessHost;

impl WindowHost for HeadlessHost {
    fn has_windowing(&self) -> bool {
        false
    }

    fn inner_size(&self) -> Option<(u32, u32)> {
        None
    }

    fn add_resize_listener(&self, _listener: ResizeListener) -> ListenerId {
        ListenerId(u64::MAX)
    }

    fn remove_resize_listener(&self, _id: ListenerId) -> bool {
        false
    }
}

/// Tracks the host viewport size
pub struct ViewportSizeTracker;

impl ViewportSizeTracker {
    /// Start tracking `host`.
    ///
    /// Registers one resize listener and records the current size before
    /// returning, so readers never wait for the first event.
    #[must_use]
    pub fn activate(host: Arc<dyn WindowHost>) -> ViewportSubscription {
        let (tx, rx) = watch::channel(ViewportSize::default());
        let tx = Arc::new(tx);

        let listener_id = if host.has_windowing() {
            let sender = Arc::clone(&tx);
            let id = host.add_resize_listener(Arc::new(move |width, height| {
                sender.send_replace(ViewportSize::new(width, height));
            }));
            if let Some((width, height)) = host.inner_size() {
                tx.send_replace(ViewportSize::new(width, height));
            }
            debug!("Viewport tracking active, initial size {:?}", *rx.borrow());
            Some(id)
        } else {
            debug!("No windowing environment, viewport stays unmeasured");
            None
        };

        ViewportSubscription {
            host,
            listener_id,
            _tx: tx,
            rx,
        }
    }
}

/// Active viewport tracking; dropping it removes the resize listener
pub struct ViewportSubscription {
    host: Arc<dyn WindowHost>,
    listener_id: Option<ListenerId>,
    _tx: Arc<watch::Sender<ViewportSize>>,
    rx: watch::Receiver<ViewportSize>,
}

impl ViewportSubscription {
    /// Latest known size
    #[must_use]
    pub fn current(&self) -> ViewportSize {
        *self.rx.borrow()
    }

    /// Receiver that observes every size update
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewportSize> {
        self.rx.clone()
    }

    /// Whether a listener is currently registered on the host
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listener_id.is_some()
    }

    /// Remove the resize listener. Idempotent.
    pub fn deactivate(&mut self) {
        if let Some(id) = self.listener_id.take() {
            self.host.remove_resize_listener(id);
            debug!("Viewport tracking stopped");
        }
    }
}

impl Drop for ViewportSubscription {
    fn drop(&mut self) {
        self.deactivate();
    }
}
