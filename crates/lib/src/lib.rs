//! Chatline core library — session identity, connection supervision, and streamed-answer
//! assembly for one chat conversation. Shared by the CLI and any UI host.

pub mod assembler;
pub mod clock;
pub mod config;
pub mod controller;
pub mod history;
pub mod message;
pub mod observer;
pub mod supervisor;
pub mod transport;

pub use controller::ChatController;
pub use message::{Message, StoreChange};
pub use observer::ChatObserver;
pub use supervisor::ConnectionState;
pub use transport::{EventSink, TaggedEvent, Transport, TransportError, TransportEvent};
