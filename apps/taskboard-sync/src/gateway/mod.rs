//! Real-time gateway client: a STOMP-over-WebSocket channel with topic
//! subscriptions, automatic reconnect and heartbeats.

pub mod channel;
pub mod connector;
pub mod events;
pub mod frame;
pub mod registry;
pub mod session;
pub mod topic;

pub use channel::{Channel, ChannelCallbacks, ChannelConfig};
pub use connector::{Connector, Link, LinkEvent, WsConnector};
pub use events::{InboundEvent, Payload};
pub use registry::SubscriptionHandle;
pub use session::ConnectionState;
pub use topic::Topic;
