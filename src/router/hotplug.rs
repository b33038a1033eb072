//! Hot-plug resync
//!
//! Connecting registers the port and re-resolves the session from the
//! preferred ids; a lighting output that becomes active gets the display
//! state replayed. Disconnecting unregisters it. Repeating either event
//! changes nothing.

use std::sync::Arc;

use tracing::{debug, info};

use super::routing::{broadcast, Delivery};
use super::SessionRouter;
use crate::device::{Direction, Endpoint};
use crate::transport::{HotplugEvent, InputEndpoint, OutputEndpoint, Port};

fn same_port<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl SessionRouter {
    /// Apply a hot-plug event; returns the replay delivery for a new lighting output
    pub fn handle_hotplug(&self, event: HotplugEvent) -> Delivery {
        match event {
            HotplugEvent::Connected(port) => self.attach(port),
            HotplugEvent::Disconnected(endpoint) => {
                self.detach(&endpoint);
                Delivery::default()
            }
        }
    }

    /// Register a connected port
    pub fn attach(&self, port: Port) -> Delivery {
        match port {
            Port::Input(input) => {
                self.attach_input(input);
                Delivery::default()
            }
            Port::Output(output) => self.attach_output(output),
        }
    }

    fn attach_input(&self, input: Arc<dyn InputEndpoint>) {
        let endpoint = input.endpoint().clone();
        let auto_join = self.settings.read().auto_join;
        let mut state = self.state.lock();

        if let Some(pos) = state.inputs.iter().position(|i| i.endpoint().id == endpoint.id) {
            if same_port(&state.inputs[pos], &input) {
                return;
            }
            // New connection for a known id: the old subscription is dead
            state.inputs[pos] = input;
            state.subscriptions.remove(&endpoint.id);
        } else {
            state.inputs.push(input);
        }

        if auto_join && !state.session.preferred_inputs.contains(&endpoint.id) {
            state.session.preferred_inputs.push(endpoint.id.clone());
        }

        state.resolve_session();
        self.sync_subscriptions(&mut state);
        info!(
            "🔌 Input {} connected{}",
            endpoint,
            if state.session.is_active_input(&endpoint.id) { ", active" } else { "" }
        );
    }

    fn attach_output(&self, output: Arc<dyn OutputEndpoint>) -> Delivery {
        let endpoint = output.endpoint().clone();
        let auto_join = self.settings.read().auto_join;
        let device_id = self.settings.read().device_id;

        let replay = {
            let mut state = self.state.lock();

            if let Some(pos) = state.outputs.iter().position(|o| o.endpoint().id == endpoint.id) {
                if same_port(&state.outputs[pos], &output) {
                    return Delivery::default();
                }
                state.outputs[pos] = output.clone();
            } else {
                state.outputs.push(output.clone());
            }

            if auto_join && !state.session.preferred_outputs.contains(&endpoint.id) {
                state.session.preferred_outputs.push(endpoint.id.clone());
            }
            state.resolve_session();

            let active = state.session.is_active_output(&endpoint.id);
            info!(
                "🔌 Output {} connected{}",
                endpoint,
                if active { ", active" } else { "" }
            );

            if active && endpoint.shows_lighting() {
                state.display.replay(device_id)
            } else {
                Vec::new()
            }
        };

        if replay.is_empty() {
            return Delivery::default();
        }
        debug!("💡 Replaying {} message(s) to {}", replay.len(), endpoint.id);
        broadcast(&[output], &replay)
    }

    /// Forget a disconnected endpoint; preferences are kept for its return
    pub fn detach(&self, endpoint: &Endpoint) {
        let mut state = self.state.lock();
        let before = (state.inputs.len(), state.outputs.len());

        match endpoint.direction {
            Direction::Input => {
                state.inputs.retain(|i| i.endpoint().id != endpoint.id);
                state.subscriptions.remove(&endpoint.id);
            }
            Direction::Output => state.outputs.retain(|o| o.endpoint().id != endpoint.id),
        }

        if before == (state.inputs.len(), state.outputs.len()) {
            return;
        }

        state.resolve_session();
        info!(
            "🔌 {:?} {} disconnected, primary lighting output: {}",
            endpoint.direction,
            endpoint.id,
            state
                .session
                .primary_lighting_output()
                .map(|ep| ep.id.as_str())
                .unwrap_or("none")
        );
    }
}
