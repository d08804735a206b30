//! Wire protocol and request handling.
//!
//! [`message`] defines the JSON frames exchanged over the WebSocket and
//! [`dispatch`] applies them: one shared [`Dispatcher`] serves every
//! connection, while each connection task owns its session state and
//! feeds frames through in arrival order.

pub mod dispatch;
pub mod message;

pub use dispatch::Dispatcher;
pub use message::{PushEvent, RequestFrame, ResponseFrame};
