use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

/// Single-slot mailbox for state snapshots. A newer frame overwrites an
/// unsent one, so a slow socket only ever sees the freshest state.
#[derive(Debug)]
pub struct LatestFrame {
    frame: StdMutex<Option<Vec<u8>>>,
    notify: Notify,
}

impl LatestFrame {
    pub(crate) fn new() -> Self {
        Self {
            frame: StdMutex::new(None),
            notify: Notify::new(),
        }
    }

    pub(crate) fn store(&self, payload: Vec<u8>) {
        *self.frame.lock().unwrap() = Some(payload);
        self.notify.notify_one();
    }

    pub(crate) fn take_latest(&self) -> Option<Vec<u8>> {
        self.frame.lock().unwrap().take()
    }

    pub(crate) async fn wait_for_update(&self) {
        self.notify.notified().await;
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OutboundError {
    #[error("outbound queue is full")]
    Full,
    #[error("outbound queue is closed")]
    Closed,
}

impl<T> From<mpsc::error::TrySendError<T>> for OutboundError {
    fn from(error: mpsc::error::TrySendError<T>) -> Self {
        match error {
            mpsc::error::TrySendError::Full(_) => OutboundError::Full,
            mpsc::error::TrySendError::Closed(_) => OutboundError::Closed,
        }
    }
}

/// Room-side handle of one connection: two bounded lanes plus the snapshot slot.
#[derive(Debug)]
pub(crate) struct SessionOutbound {
    hi: mpsc::Sender<Vec<u8>>,
    lo: mpsc::Sender<Vec<u8>>,
    state: Arc<LatestFrame>,
}

impl SessionOutbound {
    pub(crate) fn send_hi(&self, payload: Vec<u8>) -> Result<(), OutboundError> {
        self.hi.try_send(payload).map_err(OutboundError::from)
    }

    pub(crate) fn send_lo(&self, payload: Vec<u8>) -> Result<(), OutboundError> {
        self.lo.try_send(payload).map_err(OutboundError::from)
    }

    pub(crate) fn store_state(&self, payload: Vec<u8>) {
        self.state.store(payload);
    }
}

/// Socket-side half handed to the writer task.
pub struct SessionIo {
    pub session_id: String,
    pub outbound_state: Arc<LatestFrame>,
    pub outbound_hi_rx: mpsc::Receiver<Vec<u8>>,
    pub outbound_lo_rx: mpsc::Receiver<Vec<u8>>,
}

pub(crate) fn session_channels(session_id: &str, capacity: usize) -> (SessionOutbound, SessionIo) {
    let (hi, outbound_hi_rx) = mpsc::channel(capacity.max(1));
    let (lo, outbound_lo_rx) = mpsc::channel(capacity.max(1));
    let state = Arc::new(LatestFrame::new());
    (
        SessionOutbound {
            hi,
            lo,
            state: Arc::clone(&state),
        },
        SessionIo {
            session_id: session_id.to_string(),
            outbound_state: state,
            outbound_hi_rx,
            outbound_lo_rx,
        },
    )
}
