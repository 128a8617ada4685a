//! Typed inbound events decoded from MESSAGE frame bodies.

use taskboard_common::{Comment, Notification, TaskChangeSignal};

use crate::error::GatewayError;

use super::topic::Topic;

/// The payload of one inbound message. Which variant a body decodes to is
/// fixed by the topic it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Notification(Notification),
    Comment(Comment),
    TaskChange(TaskChangeSignal),
}

/// A decoded message: the topic it arrived on and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub topic: Topic,
    pub payload: Payload,
}

impl InboundEvent {
    pub fn decode(topic: Topic, body: &str) -> Result<Self, GatewayError> {
        let decode_err = |e: serde_json::Error| GatewayError::Decode(format!("{topic}: {e}"));
        let payload = match topic {
            Topic::UserNotifications(_) => {
                Payload::Notification(serde_json::from_str(body).map_err(decode_err)?)
            }
            Topic::TaskComments(_) => Payload::Comment(serde_json::from_str(body).map_err(decode_err)?),
            Topic::TasksGlobal | Topic::ProjectTasks(_) => {
                Payload::TaskChange(serde_json::from_str(body).map_err(decode_err)?)
            }
        };
        Ok(Self { topic, payload })
    }
}
