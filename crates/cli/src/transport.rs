//! WebSocket transport: one background task per connection, retried with backoff.
//!
//! The task owns the socket. Outbound frames go through an mpsc queue; inbound frames are
//! mapped to [`TransportEvent`]s and pushed into the controller's sink. On socket loss the
//! task reports an error and reconnects on its own until `disconnect` aborts it.

use chatline::{EventSink, Transport, TransportError, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    session_id: Mutex<Option<String>>,
}

impl Shared {
    fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|g| g.clone())
    }

    fn set_session_id(&self, id: Option<String>) {
        if let Ok(mut g) = self.session_id.lock() {
            *g = id;
        }
    }
}

pub struct WsTransport {
    url: String,
    sink: Option<EventSink>,
    shared: Arc<Shared>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    task: Option<JoinHandle<()>>,
    next_request_id: u64,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sink: None,
            shared: Arc::new(Shared::default()),
            outbound: None,
            task: None,
            next_request_id: 1,
        }
    }

    fn send_request(&mut self, method: &str, params: serde_json::Value) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotConnected)?;
        let id = self.next_request_id;
        self.next_request_id += 1;
        let frame = protocol::request(id, method, params)?;
        outbound.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl Transport for WsTransport {
    fn install_listener(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    fn connect(&mut self) {
        if self.task.as_ref().is_some_and(|t| !t.is_finished()) {
            log::debug!("connection task already running");
            return;
        }
        let Some(sink) = self.sink.clone() else {
            log::warn!("connect requested before a listener was installed");
            return;
        };
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        let url = self.url.clone();
        let shared = Arc::clone(&self.shared);
        self.task = Some(tokio::spawn(async move {
            run_connection(url, sink, shared, rx).await;
        }));
    }

    fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.outbound = None;
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn can_send_message(&self) -> bool {
        self.is_connected() && self.outbound.is_some()
    }

    fn ask(
        &mut self,
        user_message_id: &str,
        message: &str,
        topic_id: &str,
    ) -> Result<(), TransportError> {
        let params = serde_json::json!({
            "userId": user_message_id,
            "message": message,
            "topicId": topic_id,
            "sessionId": self.shared.session_id(),
        });
        self.send_request("ask", params)
    }

    fn send_feedback(&mut self, message_id: &str, rating: i32) -> Result<(), TransportError> {
        self.send_request("feedback", serde_json::json!({ "id": message_id, "rating": rating }))
    }

    fn set_session_id(&mut self, session_id: Option<String>) {
        self.shared.set_session_id(session_id);
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Connect, pump frames both ways, and on loss report an error and retry with backoff.
/// Returns when the controller's sink or our outbound queue is gone.
async fn run_connection(
    url: String,
    sink: EventSink,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let error = match tokio_tungstenite::connect_async(&url).await {
            Ok((ws, _)) => {
                log::info!("connected to {}", url);
                backoff = INITIAL_BACKOFF;
                let (mut write, mut read) = ws.split();
                shared.connected.store(true, Ordering::SeqCst);

                let params = serde_json::json!({ "sessionId": shared.session_id() });
                let mut failure = match protocol::request(0, "connect", params) {
                    Ok(hello) => match write.send(Message::Text(hello)).await {
                        Ok(()) => None,
                        Err(e) => Some(TransportError::Io(e.to_string())),
                    },
                    Err(e) => Some(e),
                };
                while failure.is_none() {
                    tokio::select! {
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(event) = protocol::parse_frame(&text) {
                                    if let TransportEvent::SessionId { id } = &event {
                                        shared.set_session_id(Some(id.clone()));
                                    }
                                    if sink.send(event).is_err() {
                                        shared.connected.store(false, Ordering::SeqCst);
                                        return;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => failure = Some(TransportError::Closed),
                            Some(Ok(_)) => {}
                            Some(Err(e)) => failure = Some(TransportError::Io(e.to_string())),
                        },
                        out = outbound.recv() => match out {
                            Some(text) => {
                                if let Err(e) = write.send(Message::Text(text)).await {
                                    failure = Some(TransportError::Io(e.to_string()));
                                }
                            }
                            None => {
                                let _ = write.close().await;
                                shared.connected.store(false, Ordering::SeqCst);
                                return;
                            }
                        },
                    }
                }
                shared.connected.store(false, Ordering::SeqCst);
                failure.unwrap_or(TransportError::Closed)
            }
            Err(e) => TransportError::Io(e.to_string()),
        };

        if sink.send(TransportEvent::Error(error)).is_err() {
            return;
        }
        log::debug!("reconnecting to {} in {:?}", url, backoff);
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
