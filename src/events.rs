//! Lifecycle events
//!
//! Everything that can happen to a running bridge arrives as a [`BridgeEvent`]
//! on one unbounded queue, consumed in order by the lifecycle loop.

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The OS delivered a protocol URL to the running process (macOS open-url)
    OpenUrl(String),

    /// A later launch forwarded its full argument list
    SecondInstance(Vec<String>),

    /// Startup work is finished; the initial arguments may be handled
    Ready,

    /// The attached UI surface finished loading
    UiLoaded,

    /// Stop the event loop
    Shutdown,
}

impl BridgeEvent {
    /// Short name for log fields
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::OpenUrl(_) => "open_url",
            BridgeEvent::SecondInstance(_) => "second_instance",
            BridgeEvent::Ready => "ready",
            BridgeEvent::UiLoaded => "ui_loaded",
            BridgeEvent::Shutdown => "shutdown",
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<BridgeEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<BridgeEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
