//! Scripted media backend for tests and demos.
//!
//! Every request and every release is written to a shared
//! [`DeviceLedger`], so callers can check ordering and leak-freedom
//! after the fact.

use super::backend::{
    DeviceError, FacingMode, MediaConstraints, MediaDevices, MediaStream, StreamSettings,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tokio::sync::Notify;

/// One observable device operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A stream was requested, whatever the outcome.
    Acquire {
        /// Requested camera.
        facing: FacingMode,
    },
    /// A stream's tracks were stopped.
    Release {
        /// Stream that was stopped.
        stream: String,
    },
}

#[derive(Debug, Default)]
struct LedgerState {
    events: Vec<DeviceEvent>,
    active: Vec<String>,
    next_id: u64,
}

/// Shared record of device operations.
#[derive(Debug, Clone, Default)]
pub struct DeviceLedger {
    inner: Rc<RefCell<LedgerState>>,
}

impl DeviceLedger {
    fn record(&self, event: DeviceEvent) {
        self.inner.borrow_mut().events.push(event);
    }

    fn open_stream(&self) -> String {
        let mut state = self.inner.borrow_mut();
        state.next_id += 1;
        let id = format!("mock-stream-{}", state.next_id);
        state.active.push(id.clone());
        id
    }

    fn close_stream(&self, id: &str) {
        let mut state = self.inner.borrow_mut();
        state.active.retain(|s| s != id);
        state.events.push(DeviceEvent::Release {
            stream: id.to_string(),
        });
    }

    /// All events so far, oldest first.
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.inner.borrow().events.clone()
    }

    /// Number of streams requested.
    pub fn acquire_count(&self) -> usize {
        self.inner
            .borrow()
            .events
            .iter()
            .filter(|e| matches!(e, DeviceEvent::Acquire { .. }))
            .count()
    }

    /// Number of streams stopped.
    pub fn release_count(&self) -> usize {
        self.inner
            .borrow()
            .events
            .iter()
            .filter(|e| matches!(e, DeviceEvent::Release { .. }))
            .count()
    }

    /// Streams granted and not yet stopped.
    pub fn open_streams(&self) -> usize {
        self.inner.borrow().active.len()
    }

    /// Forgets recorded events. Open streams stay open.
    pub fn clear_events(&self) {
        self.inner.borrow_mut().events.clear();
    }
}

/// Stream handed out by [`MockDevices`].
#[derive(Debug)]
pub struct MockStream {
    id: String,
    settings: StreamSettings,
    running_tracks: usize,
    ledger: DeviceLedger,
}

impl MediaStream for MockStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> StreamSettings {
        self.settings
    }

    fn is_active(&self) -> bool {
        self.running_tracks > 0
    }

    fn stop_tracks(&mut self) -> usize {
        let stopped = std::mem::take(&mut self.running_tracks);
        if stopped > 0 {
            self.ledger.close_stream(&self.id);
        }
        stopped
    }
}

/// In-process camera backend with scripted outcomes.
#[derive(Debug)]
pub struct MockDevices {
    ledger: DeviceLedger,
    supported: bool,
    modes: Vec<(u32, u32)>,
    failures: RefCell<VecDeque<DeviceError>>,
    gate: Option<Rc<Notify>>,
}

impl Default for MockDevices {
    fn default() -> Self {
        Self {
            ledger: DeviceLedger::default(),
            supported: true,
            modes: vec![(640, 480), (1280, 720), (1920, 1080)],
            failures: RefCell::new(VecDeque::new()),
            gate: None,
        }
    }
}

impl MockDevices {
    /// Creates a backend that grants every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that reports no media capability.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::default()
        }
    }

    /// Replaces the list of modes the fake camera can deliver.
    pub fn with_modes(mut self, modes: Vec<(u32, u32)>) -> Self {
        self.modes = modes;
        self
    }

    /// Holds every request until `gate` is notified once per request.
    ///
    /// Stands in for a permission prompt the user has not answered yet.
    pub fn with_gate(mut self, gate: Rc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Makes the next request fail with `error`. Calls queue up.
    pub fn fail_next(&self, error: DeviceError) {
        self.failures.borrow_mut().push_back(error);
    }

    /// Shared ledger of device operations.
    pub fn ledger(&self) -> &DeviceLedger {
        &self.ledger
    }
}

impl MediaDevices for MockDevices {
    type Stream = MockStream;

    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MockStream, DeviceError> {
        self.ledger.record(DeviceEvent::Acquire {
            facing: constraints.facing,
        });

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let failure = self.failures.borrow_mut().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let hint = constraints.resolution;
        let (width, height) = hint.closest(&self.modes).unwrap_or((hint.width, hint.height));

        Ok(MockStream {
            id: self.ledger.open_stream(),
            settings: StreamSettings {
                width,
                height,
                facing: constraints.facing,
            },
            running_tracks: 1,
            ledger: self.ledger.clone(),
        })
    }
}
