//! Session orchestrator: one conversation over one streaming connection.
//!
//! Owns topic/session identity, decides when to rotate to a fresh topic (idle timeout or a
//! history load for another topic), and routes transport events to the stream assembler.
//! Everything runs on a single logical loop: transport tasks only push events into the
//! controller's queue, and the host drains them with [`ChatController::pump`] or
//! [`ChatController::next_event`] + [`ChatController::handle_event`].

use std::time::Duration;
use tokio::sync::mpsc;

use crate::assembler::StreamAssembler;
use crate::clock::{Clock, Freshness, SessionClock, SystemClock, DEFAULT_IDLE_TIMEOUT};
use crate::history::{self, HistoryExchange, HistoryRecord};
use crate::message::{Message, MessageStore, StoreChange};
use crate::observer::{ChatObserver, NoopObserver};
use crate::supervisor::{ConnectionState, ConnectionSupervisor};
use crate::transport::{TaggedEvent, Transport, TransportError, TransportEvent};

pub struct ChatController<T: Transport> {
    supervisor: ConnectionSupervisor<T>,
    assembler: StreamAssembler,
    store: MessageStore,
    session_clock: SessionClock,
    clock: Box<dyn Clock>,
    observer: Box<dyn ChatObserver>,
    idle_timeout: Duration,
    topic_id: String,
    session_id: Option<String>,
    /// Inbound text that arrived before the connection was ready.
    pending_input: Option<String>,
    last_user_id_ms: i64,
    events: mpsc::UnboundedReceiver<TaggedEvent>,
}

impl<T: Transport> ChatController<T> {
    pub fn new(transport: T) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            supervisor: ConnectionSupervisor::new(transport, tx),
            assembler: StreamAssembler::new(),
            store: MessageStore::new(),
            session_clock: SessionClock::new(),
            clock: Box::new(SystemClock),
            observer: Box::new(NoopObserver),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            topic_id: new_topic_id(),
            session_id: None,
            pending_input: None,
            last_user_id_ms: 0,
            events: rx,
        }
    }

    pub fn with_observer(mut self, observer: impl ChatObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn pending_input(&self) -> Option<&str> {
        self.pending_input.as_deref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn is_streaming(&self) -> bool {
        self.assembler.is_streaming()
    }

    pub fn freshness(&self) -> Freshness {
        self.session_clock
            .classify(self.clock.now(), self.idle_timeout)
    }

    pub fn transport(&self) -> &T {
        self.supervisor.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.supervisor.transport_mut()
    }

    /// Connect if needed. An expired conversation is rotated first, so the connection is
    /// opened for the new topic.
    pub fn ensure_connected(&mut self) {
        if self.freshness() == Freshness::Expired {
            log::info!("session idle past {:?}, rotating topic", self.idle_timeout);
            self.rotate_session();
        }
        let change = self.supervisor.ensure_connected();
        self.notify_state(change);
    }

    /// Start a new conversation: new topic, no session, no history, no connection.
    pub fn rotate_session(&mut self) {
        self.reset_session(new_topic_id());
        let change = self.store.clear();
        self.notify_store(change);
    }

    pub fn send_user_message(&mut self, text: &str) {
        self.send(text, None);
    }

    /// Rate the latest bot answer, then send `text`.
    pub fn send_user_message_by_feedback(&mut self, text: &str, rating: i32) {
        self.send(text, Some(rating));
    }

    /// Forward feedback and mirror it on the local bot message when present. A local miss
    /// is not an error: the remote side may know messages this store does not.
    pub fn submit_feedback(&mut self, message_id: &str, rating: i32) {
        if let Err(e) = self.supervisor.transport_mut().send_feedback(message_id, rating) {
            log::warn!("sending feedback for {} failed: {}", message_id, e);
        }
        match self.store.set_rating(message_id, rating) {
            Some(change) => self.notify_store(change),
            None => log::debug!("feedback for {} has no local bot message", message_id),
        }
    }

    /// Replace identity and history with a past conversation and connect to it. Passive:
    /// does not count as an interaction.
    pub fn load_history(
        &mut self,
        topic_id: &str,
        session_id: Option<&str>,
        records: &[HistoryRecord],
    ) {
        if topic_id != self.topic_id {
            log::info!("loading history for topic {}", topic_id);
            self.reset_session(topic_id.to_string());
        } else if self.freshness() == Freshness::Expired {
            // Adopt the loaded conversation as a fresh one rather than letting the connect
            // below rotate it away.
            log::info!("reloading idle topic {}", topic_id);
            self.reset_session(topic_id.to_string());
        }
        self.assembler.reset();
        let change = self.store.replace_all(history::to_messages(records));
        self.notify_store(change);

        self.session_id = session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        if let Some(id) = &self.session_id {
            log::debug!("resuming session {}", id);
            self.supervisor
                .transport_mut()
                .set_session_id(Some(id.clone()));
        }
        self.ensure_connected();
    }

    pub fn load_exchange(&mut self, exchange: &HistoryExchange) {
        self.load_history(
            &exchange.topic_id,
            exchange.session_id.as_deref(),
            &exchange.messages,
        );
    }

    /// Text pushed from outside the chat (e.g. a notification). Held until the connection
    /// reports its session when not yet connected.
    pub fn handle_external_incoming(&mut self, text: &str) {
        self.pending_input = Some(text.to_string());
        self.observer.show_chat_surface();
        let change = self.supervisor.sync_with_transport();
        self.notify_state(change);
        if self.supervisor.state() == ConnectionState::Connected {
            self.flush_pending_input();
        } else {
            log::debug!("connection not ready, holding incoming text");
        }
    }

    /// Disconnect without rotating. The interaction time is kept so the next connect still
    /// measures idleness from the last real interaction.
    pub fn close(&mut self) {
        let change = self.supervisor.disconnect();
        self.notify_state(change);
        self.observer.hide_chat_surface();
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Start { id } => {
                let change = self.assembler.on_start(&mut self.store, &id);
                self.notify_store(change);
            }
            TransportEvent::Chunk { text } => {
                if let Some(change) = self.assembler.on_chunk(&mut self.store, &text) {
                    self.notify_store(change);
                    self.observer.scroll_to_bottom();
                }
            }
            TransportEvent::End { id } => {
                if self.assembler.on_end(&id) {
                    let now = self.clock.now();
                    self.session_clock.record_interaction(now);
                }
            }
            TransportEvent::SessionId { id } => {
                log::info!("session {} assigned for topic {}", id, self.topic_id);
                self.session_id = Some(id);
                let change = self.supervisor.session_established();
                self.notify_state(change);
                self.flush_pending_input();
            }
            TransportEvent::Error(e) => self.on_transport_error(e),
        }
    }

    /// Handle every queued event from the live connection. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(tagged) = self.events.try_recv() {
            if let Some(event) = self.live(tagged) {
                self.handle_event(event);
                handled += 1;
            }
        }
        handled
    }

    /// Wait for the next event from the live connection. Events from connections torn
    /// down by a disconnect or rotation are skipped. The supervisor holds a sender, so
    /// this only yields None if the queue is somehow closed.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            let tagged = self.events.recv().await?;
            if let Some(event) = self.live(tagged) {
                return Some(event);
            }
        }
    }

    fn live(&self, tagged: TaggedEvent) -> Option<TransportEvent> {
        if self.supervisor.is_current(tagged.generation) {
            Some(tagged.event)
        } else {
            log::debug!("dropping event from closed connection: {:?}", tagged.event);
            None
        }
    }

    fn send(&mut self, text: &str, rating: Option<i32>) {
        if text.trim().is_empty() {
            return;
        }
        let now = self.clock.now();
        self.session_clock.record_interaction(now);
        if !self.supervisor.can_send() {
            log::warn!("transport cannot send yet, message dropped");
            return;
        }
        if let Some(rating) = rating {
            if let Some(id) = self.store.last_bot().map(|m| m.id.clone()) {
                self.submit_feedback(&id, rating);
            }
        }

        let id = self.next_user_message_id();
        let change = self.store.push(Message::user(id.clone(), text));
        self.notify_store(change);
        self.observer.scroll_to_bottom();
        self.observer.clear_input();

        let topic_id = self.topic_id.clone();
        if let Err(e) = self.supervisor.transport_mut().ask(&id, text, &topic_id) {
            log::warn!("sending message {} failed: {}", id, e);
        }
    }

    fn flush_pending_input(&mut self) {
        if let Some(text) = self.pending_input.take() {
            log::debug!("sending held incoming text");
            self.send_user_message(&text);
        }
    }

    fn on_transport_error(&mut self, error: TransportError) {
        log::warn!("transport error: {}", error);
        self.observer.transport_error(&error);
        let change = self.supervisor.transport_failed();
        self.notify_state(change);
    }

    /// Shared by rotation and history loads for another topic. Leaves the store to the caller.
    fn reset_session(&mut self, topic_id: String) {
        let change = self.supervisor.disconnect();
        self.notify_state(change);
        self.supervisor.transport_mut().set_session_id(None);
        self.session_id = None;
        self.session_clock.reset();
        self.assembler.reset();
        log::info!("topic {} -> {}", self.topic_id, topic_id);
        self.topic_id = topic_id;
    }

    /// Wall-clock millis, bumped when the clock has not advanced since the last id.
    fn next_user_message_id(&mut self) -> String {
        let mut ms = self.clock.now().timestamp_millis();
        if ms <= self.last_user_id_ms {
            ms = self.last_user_id_ms + 1;
        }
        self.last_user_id_ms = ms;
        ms.to_string()
    }

    fn notify_store(&mut self, change: StoreChange) {
        self.observer.messages_changed(&change, self.store.messages());
    }

    fn notify_state(&mut self, change: Option<ConnectionState>) {
        if let Some(state) = change {
            self.observer.connection_state_changed(state);
        }
    }
}

fn new_topic_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
