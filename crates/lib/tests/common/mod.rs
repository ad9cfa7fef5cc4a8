//! Fake transport and recording observer shared by the controller tests.

#![allow(dead_code)]

use chatline::clock::ManualClock;
use chatline::{
    ChatController, ChatObserver, ConnectionState, EventSink, Message, StoreChange, Transport,
    TransportError, TransportEvent,
};
use chrono::{TimeZone, Utc};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Disconnect,
    Ask {
        user_message_id: String,
        message: String,
        topic_id: String,
    },
    Feedback {
        message_id: String,
        rating: i32,
    },
    SetSessionId(Option<String>),
}

/// In-memory transport: records calls, connects only when the test says so.
#[derive(Default)]
pub struct FakeTransport {
    pub sink: Option<EventSink>,
    pub listeners_installed: usize,
    pub connected: bool,
    pub calls: Vec<Call>,
}

impl FakeTransport {
    /// Complete the pending connect and report a session id.
    pub fn open(&mut self, session_id: &str) {
        self.connected = true;
        self.emit(TransportEvent::SessionId {
            id: session_id.to_string(),
        });
    }

    pub fn drop_link(&mut self) {
        self.connected = false;
        self.emit(TransportEvent::Error(TransportError::Closed));
    }

    pub fn emit(&self, event: TransportEvent) {
        let sink = self.sink.as_ref().expect("listener installed");
        sink.send(event).expect("controller receiver alive");
    }

    pub fn connects(&self) -> usize {
        self.calls.iter().filter(|c| **c == Call::Connect).count()
    }

    pub fn asks(&self) -> Vec<(String, String, String)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Ask {
                    user_message_id,
                    message,
                    topic_id,
                } => Some((user_message_id.clone(), message.clone(), topic_id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn feedback(&self) -> Vec<(String, i32)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Feedback { message_id, rating } => Some((message_id.clone(), *rating)),
                _ => None,
            })
            .collect()
    }
}

impl Transport for FakeTransport {
    fn install_listener(&mut self, sink: EventSink) {
        self.listeners_installed += 1;
        self.sink = Some(sink);
    }

    fn connect(&mut self) {
        self.calls.push(Call::Connect);
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.calls.push(Call::Disconnect);
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn can_send_message(&self) -> bool {
        self.connected
    }

    fn ask(
        &mut self,
        user_message_id: &str,
        message: &str,
        topic_id: &str,
    ) -> Result<(), TransportError> {
        self.calls.push(Call::Ask {
            user_message_id: user_message_id.to_string(),
            message: message.to_string(),
            topic_id: topic_id.to_string(),
        });
        Ok(())
    }

    fn send_feedback(&mut self, message_id: &str, rating: i32) -> Result<(), TransportError> {
        self.calls.push(Call::Feedback {
            message_id: message_id.to_string(),
            rating,
        });
        Ok(())
    }

    fn set_session_id(&mut self, session_id: Option<String>) {
        self.calls.push(Call::SetSessionId(session_id));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Messages(StoreChange, usize),
    Scroll,
    Show,
    Hide,
    ClearInput,
    State(ConnectionState),
    Error(TransportError),
}

/// Observer that appends every hook call to a shared log.
#[derive(Clone, Default)]
pub struct Recorder {
    pub log: Rc<RefCell<Vec<Observed>>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<Observed> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn count(&self, wanted: &Observed) -> usize {
        self.log.borrow().iter().filter(|o| *o == wanted).count()
    }
}

impl ChatObserver for Recorder {
    fn messages_changed(&mut self, change: &StoreChange, messages: &[Message]) {
        self.log
            .borrow_mut()
            .push(Observed::Messages(change.clone(), messages.len()));
    }

    fn scroll_to_bottom(&mut self) {
        self.log.borrow_mut().push(Observed::Scroll);
    }

    fn show_chat_surface(&mut self) {
        self.log.borrow_mut().push(Observed::Show);
    }

    fn hide_chat_surface(&mut self) {
        self.log.borrow_mut().push(Observed::Hide);
    }

    fn clear_input(&mut self) {
        self.log.borrow_mut().push(Observed::ClearInput);
    }

    fn connection_state_changed(&mut self, state: ConnectionState) {
        self.log.borrow_mut().push(Observed::State(state));
    }

    fn transport_error(&mut self, error: &TransportError) {
        self.log.borrow_mut().push(Observed::Error(error.clone()));
    }
}

pub struct Harness {
    pub controller: ChatController<FakeTransport>,
    pub clock: ManualClock,
    pub recorder: Recorder,
}

pub fn harness() -> Harness {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
    let recorder = Recorder::default();
    let controller = ChatController::new(FakeTransport::default())
        .with_clock(clock.clone())
        .with_observer(recorder.clone());
    Harness {
        controller,
        clock,
        recorder,
    }
}

/// Harness already connected with session "s1".
pub fn connected() -> Harness {
    let mut h = harness();
    h.controller.ensure_connected();
    h.controller.transport_mut().open("s1");
    h.controller.pump();
    h.recorder.take();
    h
}

pub fn stream_answer(controller: &mut ChatController<FakeTransport>, id: &str, chunks: &[&str]) {
    let transport = controller.transport();
    transport.emit(TransportEvent::Start { id: id.to_string() });
    for c in chunks {
        transport.emit(TransportEvent::Chunk {
            text: c.to_string(),
        });
    }
    transport.emit(TransportEvent::End { id: id.to_string() });
    controller.pump();
}
