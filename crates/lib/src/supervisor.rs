//! Connection supervisor: owns the transport and decides when to connect or reconnect.
//!
//! State machine: `Idle -> Connecting -> Connected`; `Connected | Connecting -> Idle` on
//! disconnect; `Connected -> Connecting` when the transport reports an error. Only the
//! supervisor touches raw connection state; callers just ask for [`ensure_connected`].
//!
//! [`ensure_connected`]: ConnectionSupervisor::ensure_connected

use tokio::sync::mpsc;

use crate::transport::{EventSink, TaggedEvent, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
}

pub struct ConnectionSupervisor<T: Transport> {
    transport: T,
    events: mpsc::UnboundedSender<TaggedEvent>,
    /// Bumped on every disconnect; only events stamped with the current value are live.
    generation: u64,
    state: ConnectionState,
    /// Listener installed and first connect issued; cleared by disconnect.
    initialized: bool,
    /// A connect request is outstanding (no session id or error observed since).
    connect_in_flight: bool,
}

impl<T: Transport> ConnectionSupervisor<T> {
    pub fn new(transport: T, events: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self {
            transport,
            events,
            generation: 0,
            state: ConnectionState::Idle,
            initialized: false,
            connect_in_flight: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when an event stamped `generation` belongs to the live connection.
    pub fn is_current(&self, generation: u64) -> bool {
        self.initialized && generation == self.generation
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn can_send(&self) -> bool {
        self.initialized && self.transport.can_send_message()
    }

    /// Idempotent connect. Returns the new state when it changed.
    pub fn ensure_connected(&mut self) -> Option<ConnectionState> {
        if !self.initialized {
            let sink = EventSink::new(self.generation, self.events.clone());
            self.transport.install_listener(sink);
            self.initialized = true;
            self.connect_in_flight = true;
            log::info!("opening connection");
            self.transport.connect();
            return self.set_state(ConnectionState::Connecting);
        }
        if self.transport.is_connected() {
            return self.set_state(ConnectionState::Connected);
        }
        if self.connect_in_flight {
            log::debug!("connect already in flight");
            return None;
        }
        self.connect_in_flight = true;
        log::info!("requesting reconnect");
        self.transport.connect();
        self.set_state(ConnectionState::Connecting)
    }

    /// Tear down the transport; the next `ensure_connected` re-installs the listener.
    pub fn disconnect(&mut self) -> Option<ConnectionState> {
        if self.initialized {
            log::info!("disconnecting");
        }
        self.transport.disconnect();
        self.initialized = false;
        self.generation += 1;
        self.connect_in_flight = false;
        self.set_state(ConnectionState::Idle)
    }

    /// The remote side accepted the connection.
    pub fn session_established(&mut self) -> Option<ConnectionState> {
        if !self.initialized {
            return None;
        }
        self.connect_in_flight = false;
        self.set_state(ConnectionState::Connected)
    }

    /// Re-read the transport: a live link means Connected even if an earlier error moved
    /// us to Connecting.
    pub fn sync_with_transport(&mut self) -> Option<ConnectionState> {
        if self.initialized && self.transport.is_connected() {
            self.connect_in_flight = false;
            return self.set_state(ConnectionState::Connected);
        }
        None
    }

    /// The transport reported an error; it owns recovery, we only stop assuming a live link.
    pub fn transport_failed(&mut self) -> Option<ConnectionState> {
        if !self.initialized {
            return None;
        }
        self.connect_in_flight = false;
        self.set_state(ConnectionState::Connecting)
    }

    fn set_state(&mut self, state: ConnectionState) -> Option<ConnectionState> {
        if self.state == state {
            return None;
        }
        log::debug!("connection state {:?} -> {:?}", self.state, state);
        self.state = state;
        Some(state)
    }
}
