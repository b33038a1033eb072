//! midir-backed MIDI ports
//!
//! midir exposes neither manufacturer strings nor device-change callbacks, so
//! the port name doubles as endpoint id and hot-plug is detected by polling
//! the port lists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ::midir::{MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{
    diff_endpoints, HotplugEvent, InputEndpoint, NoteEvent, NoteHandler, NoteSubscription,
    OutputEndpoint, Port,
};
use crate::device::{Classifier, Direction, Endpoint};
use crate::error::TransportError;
use crate::midi::{find_port_by_substring, format_hex, MidiMessage};

/// Open output port
pub struct MidirOutput {
    endpoint: Endpoint,
    conn: Mutex<MidiOutputConnection>,
}

// midir connections are only touched behind the mutex
unsafe impl Send for MidirOutput {}
unsafe impl Sync for MidirOutput {}

impl OutputEndpoint for MidirOutput {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut conn = self.conn.lock();
        conn.send(bytes).map_err(|e| TransportError::SendFailed {
            endpoint: self.endpoint.id.clone(),
            reason: e.to_string(),
        })?;
        trace!("-> {}: {}", self.endpoint.id, format_hex(bytes));
        Ok(())
    }
}

type HandlerList = Arc<Mutex<Vec<(u64, NoteHandler)>>>;

/// Open input port fanning notes out to subscribed handlers
pub struct MidirInput {
    endpoint: Endpoint,
    handlers: HandlerList,
    next_id: AtomicU64,
    _conn: Mutex<MidiInputConnection<()>>,
}

unsafe impl Send for MidirInput {}
unsafe impl Sync for MidirInput {}

impl InputEndpoint for MidirInput {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn on_note(&self, handler: NoteHandler) -> Result<NoteSubscription, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, handler));

        let handlers = Arc::downgrade(&self.handlers);
        Ok(NoteSubscription::new(move || {
            if let Some(handlers) = handlers.upgrade() {
                handlers.lock().retain(|(h, _)| *h != id);
            }
        }))
    }
}

/// Port enumeration and connection factory
pub struct MidirTransport {
    client_name: String,
    classifier: Classifier,
}

impl MidirTransport {
    pub fn new(client_name: impl Into<String>, classifier: Classifier) -> Self {
        Self {
            client_name: client_name.into(),
            classifier,
        }
    }

    fn port_names<T: MidiIO>(&self, io: &T) -> Vec<String> {
        io.ports()
            .iter()
            .filter_map(|port| io.port_name(port).ok())
            // Skip the ports midir creates for our own connections
            .filter(|name| !name.contains(&self.client_name))
            .collect()
    }

    /// Every input and output port currently on the bus
    pub fn enumerate(&self) -> Result<Vec<Endpoint>, TransportError> {
        let open_failed = |e: ::midir::InitError| TransportError::OpenFailed {
            endpoint: self.client_name.clone(),
            reason: e.to_string(),
        };
        let midi_in = MidiInput::new(&format!("{}-scan", self.client_name)).map_err(open_failed)?;
        let midi_out =
            MidiOutput::new(&format!("{}-scan", self.client_name)).map_err(open_failed)?;

        let inputs = self.port_names(&midi_in).into_iter().map(|name| {
            self.classifier
                .describe(name.clone(), name, "", Direction::Input)
        });
        let outputs = self.port_names(&midi_out).into_iter().map(|name| {
            self.classifier
                .describe(name.clone(), name, "", Direction::Output)
        });

        Ok(inputs.chain(outputs).collect())
    }

    pub fn open_output(&self, name: &str) -> Result<Arc<MidirOutput>, TransportError> {
        let open_failed = |reason: String| TransportError::OpenFailed {
            endpoint: name.to_string(),
            reason,
        };

        let midi_out = MidiOutput::new(&format!("{}-out", self.client_name))
            .map_err(|e| open_failed(e.to_string()))?;
        let port = find_port_by_substring(&midi_out, name)
            .ok_or_else(|| TransportError::Disconnected(name.to_string()))?;
        let port_name = midi_out
            .port_name(&port)
            .map_err(|e| open_failed(e.to_string()))?;

        let conn = midi_out
            .connect(&port, &self.client_name)
            .map_err(|e| open_failed(e.to_string()))?;

        info!("🎹 Output connected: {}", port_name);
        Ok(Arc::new(MidirOutput {
            endpoint: self
                .classifier
                .describe(port_name.clone(), port_name, "", Direction::Output),
            conn: Mutex::new(conn),
        }))
    }

    pub fn open_input(&self, name: &str) -> Result<Arc<MidirInput>, TransportError> {
        let open_failed = |reason: String| TransportError::OpenFailed {
            endpoint: name.to_string(),
            reason,
        };

        let midi_in = MidiInput::new(&format!("{}-in", self.client_name))
            .map_err(|e| open_failed(e.to_string()))?;
        let port = find_port_by_substring(&midi_in, name)
            .ok_or_else(|| TransportError::Disconnected(name.to_string()))?;
        let port_name = midi_in
            .port_name(&port)
            .map_err(|e| open_failed(e.to_string()))?;

        let handlers: HandlerList = Arc::new(Mutex::new(Vec::new()));
        let dispatch = handlers.clone();
        let endpoint_id = port_name.clone();

        let conn = midi_in
            .connect(
                &port,
                &self.client_name,
                move |_stamp, data, _| {
                    let Some((note, velocity, on)) =
                        MidiMessage::parse(data).and_then(|msg| msg.as_note())
                    else {
                        return;
                    };
                    let event = NoteEvent {
                        endpoint_id: endpoint_id.clone(),
                        note,
                        velocity,
                        on,
                        timestamp: Instant::now(),
                    };
                    // Handlers run outside the lock so they may unsubscribe
                    let current: Vec<NoteHandler> =
                        dispatch.lock().iter().map(|(_, h)| h.clone()).collect();
                    for handler in current {
                        handler(event.clone());
                    }
                },
                (),
            )
            .map_err(|e| open_failed(e.to_string()))?;

        info!("🎹 Input connected: {}", port_name);
        Ok(Arc::new(MidirInput {
            endpoint: self
                .classifier
                .describe(port_name.clone(), port_name, "", Direction::Input),
            handlers,
            next_id: AtomicU64::new(0),
            _conn: Mutex::new(conn),
        }))
    }

    /// Open an enumerated endpoint in its own direction
    pub fn open(&self, endpoint: &Endpoint) -> Result<Port, TransportError> {
        match endpoint.direction {
            Direction::Input => Ok(Port::Input(self.open_input(&endpoint.id)?)),
            Direction::Output => Ok(Port::Output(self.open_output(&endpoint.id)?)),
        }
    }

    /// Open every listed endpoint, logging and skipping failures
    pub fn open_all(&self, endpoints: &[Endpoint]) -> Vec<Port> {
        endpoints
            .iter()
            .filter_map(|ep| match self.open(ep) {
                Ok(port) => Some(port),
                Err(e) => {
                    warn!("⚠️ Skipping {}: {}", ep.id, e);
                    None
                }
            })
            .collect()
    }

    /// Poll the port lists and report arrivals and removals
    ///
    /// `known` is the list the caller already opened. The task ends when the
    /// receiver is dropped.
    pub fn watch(
        self: Arc<Self>,
        poll_interval: Duration,
        known: Vec<Endpoint>,
    ) -> (mpsc::Receiver<HotplugEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);

        let handle = tokio::spawn(async move {
            let mut previous = known;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let current = match self.enumerate() {
                    Ok(list) => list,
                    Err(e) => {
                        debug!("Port scan failed: {}", e);
                        continue;
                    }
                };

                let (added, removed) = diff_endpoints(&previous, &current);

                for endpoint in removed {
                    info!("🔌 Disconnected: {} ({:?})", endpoint.id, endpoint.direction);
                    if tx.send(HotplugEvent::Disconnected(endpoint)).await.is_err() {
                        return;
                    }
                }

                let mut unopened = Vec::new();
                for endpoint in added {
                    match self.open(&endpoint) {
                        Ok(port) => {
                            if tx.send(HotplugEvent::Connected(port)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            // Retried on the next scan
                            warn!("⚠️ Could not open new port {}: {}", endpoint.id, e);
                            unopened.push(endpoint);
                        }
                    }
                }

                previous = current
                    .into_iter()
                    .filter(|ep| !unopened.contains(ep))
                    .collect();
            }
        });

        (rx, handle)
    }
}
