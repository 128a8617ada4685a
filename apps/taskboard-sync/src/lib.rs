//! Real-time synchronization core for the taskboard client.
//!
//! A [`session::SessionManager`] owns one gateway [`gateway::Channel`] per
//! login. Pushed messages are routed by [`router::TopicRouter`] into the
//! [`store::SyncStore`], which REST [`commands`] also reconcile into.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod router;
pub mod session;
pub mod store;

pub use api::{ApiClient, TaskApi};
pub use config::Config;
pub use error::{ApiError, GatewayError};
pub use router::TopicRouter;
pub use session::SessionManager;
pub use store::{StoreChange, SyncStore, TaskScope};
