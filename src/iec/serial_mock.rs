//! Mock meter port for testing
//!
//! [`MockMeterPort`] implements [`MeterTransport`] without hardware. Tests
//! either queue bytes directly with [`queue_rx_data`](MockMeterPort::queue_rx_data)
//! or script the meter: [`respond_to`](MockMeterPort::respond_to) registers a
//! reply that is queued whenever the session writes a matching request.

use crate::error::IecError;
use crate::iec::transport::MeterTransport;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Something the session did to the port, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    Baud(u32),
    Write(Vec<u8>),
}

#[derive(Debug, Default)]
struct Script {
    request: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MockState {
    baud: u32,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    events: Vec<PortEvent>,
    scripts: Vec<Script>,
    next_error: Option<IecError>,
}

/// Scriptable in-memory meter link. Clones share the same state, so a test
/// can keep one handle while the session owns the other.
#[derive(Debug, Clone)]
pub struct MockMeterPort {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockMeterPort {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMeterPort {
    pub fn new() -> Self {
        MockMeterPort {
            state: Arc::new(Mutex::new(MockState {
                baud: crate::constants::IEC_BAUD_INITIAL,
                ..MockState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue data to be read from the port
    pub fn queue_rx_data(&self, data: &[u8]) {
        self.lock().rx.extend(data);
    }

    /// Reply with `response` each time `request` is written. Several replies
    /// for one request are used in order; the last one repeats.
    pub fn respond_to(&self, request: &[u8], response: &[u8]) {
        let mut state = self.lock();
        if let Some(script) = state.scripts.iter_mut().find(|s| s.request == request) {
            script.replies.push_back(response.to_vec());
        } else {
            state.scripts.push(Script {
                request: request.to_vec(),
                replies: VecDeque::from([response.to_vec()]),
            });
        }
    }

    /// Get all data that was written to the port
    pub fn get_tx_data(&self) -> Vec<u8> {
        self.lock().tx.clone()
    }

    /// Individual writes, oldest first.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                PortEvent::Write(data) => Some(data.clone()),
                PortEvent::Baud(_) => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<PortEvent> {
        self.lock().events.clone()
    }

    pub fn current_baud(&self) -> u32 {
        self.lock().baud
    }

    pub fn pending_rx(&self) -> usize {
        self.lock().rx.len()
    }

    /// Clear buffers and recorded events; scripts are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.rx.clear();
        state.tx.clear();
        state.events.clear();
    }

    /// Set an error to be returned on the next operation
    pub fn set_next_error(&self, error: IecError) {
        self.lock().next_error = Some(error);
    }

    fn take_error(&self) -> Result<(), IecError> {
        match self.lock().next_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MeterTransport for MockMeterPort {
    async fn set_baud_rate(&mut self, baud: u32) -> Result<(), IecError> {
        self.take_error()?;
        let mut state = self.lock();
        if state.baud != baud {
            state.baud = baud;
            state.events.push(PortEvent::Baud(baud));
        }
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.current_baud()
    }

    fn bytes_available(&mut self) -> Result<usize, IecError> {
        self.take_error()?;
        Ok(self.lock().rx.len())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, IecError> {
        self.take_error()?;
        Ok(self.lock().rx.pop_front())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), IecError> {
        self.take_error()?;
        let mut state = self.lock();
        state.tx.extend_from_slice(data);
        state.events.push(PortEvent::Write(data.to_vec()));

        let reply = state
            .scripts
            .iter_mut()
            .find(|s| s.request == data)
            .and_then(|s| {
                if s.replies.len() > 1 {
                    s.replies.pop_front()
                } else {
                    s.replies.front().cloned()
                }
            });
        if let Some(reply) = reply {
            state.rx.extend(reply);
        }
        Ok(())
    }
}
