//! # Live Feed
//!
//! Client for the persistent vehicle position feed: channel abstraction,
//! frame decoding, the connection state machine, and the runtime task that
//! keeps every registry vehicle subscribed across reconnects. Also hosts the
//! update injector, which writes through the same store.

mod channel;
mod client;
mod config;
mod decode;
mod injector;
mod state;

pub use self::channel::{Channel, Frame, Session};
pub use self::client::{LiveFeedClient, LiveFeedHandle};
pub use self::config::{DEFAULT_TOPIC_PREFIX, FeedConfig, HeartbeatConfig, ReconnectPolicy};
pub use self::decode::{DecodeError, VehicleUpdate, decode};
pub use self::injector::UpdateInjector;
pub use self::state::{Action, ConnectionMachine, ConnectionState, Event};
