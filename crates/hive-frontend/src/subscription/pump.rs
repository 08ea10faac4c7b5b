//! Per-subscription fan-out task.
//!
//! Merges the reply streams of every device in a subscription, counts down
//! the subscribe barrier as acknowledgements arrive, and forwards framed
//! events to the session sink.

use std::collections::HashSet;
use std::sync::Arc;

use hive_core::model::Command;
use hive_proto::ResponseBody;
use hive_proto::envelope::{
    command_insert_message, command_update_message, notification_insert_message,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_stream::{StreamExt, StreamMap};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use super::registry::SubscriptionKind;
use crate::rpc::{ReplyStream, RpcError, StreamHandle};
use crate::session::SessionSink;

/// Outcome handed to the subscribe caller once every device has answered.
pub type BarrierResult = Result<Option<Command>, RpcError>;

/// What a reply means for the subscription.
#[derive(Debug, PartialEq)]
pub enum Translated {
    /// A device acknowledged. `backlog` is already framed for the client.
    Ack {
        backlog: Vec<Value>,
        snapshot: Option<Command>,
    },
    Event(Value),
    Ignore,
}

pub fn translate(kind: SubscriptionKind, subscription_id: Uuid, body: ResponseBody) -> Translated {
    match (kind, body) {
        (SubscriptionKind::Command, ResponseBody::CommandSubscribeResponse(r)) => Translated::Ack {
            backlog: r
                .commands
                .iter()
                .map(|c| command_insert_message(subscription_id, c))
                .collect(),
            snapshot: None,
        },
        (SubscriptionKind::Command, ResponseBody::CommandEvent(e)) => {
            Translated::Event(command_insert_message(subscription_id, &e.command))
        }
        (SubscriptionKind::Notification, ResponseBody::NotificationSubscribeResponse(r)) => {
            Translated::Ack {
                backlog: r
                    .notifications
                    .iter()
                    .map(|n| notification_insert_message(subscription_id, n))
                    .collect(),
                snapshot: None,
            }
        }
        (SubscriptionKind::Notification, ResponseBody::NotificationEvent(e)) => {
            Translated::Event(notification_insert_message(subscription_id, &e.notification))
        }
        (SubscriptionKind::CommandUpdate, ResponseBody::CommandUpdateSubscribeResponse(r)) => {
            Translated::Ack {
                backlog: Vec::new(),
                snapshot: r.command,
            }
        }
        (SubscriptionKind::CommandUpdate, ResponseBody::CommandEvent(e)) => {
            Translated::Event(command_update_message(subscription_id, &e.command))
        }
        (kind, other) => {
            warn!(
                subscription_id = %subscription_id,
                kind = kind.as_str(),
                action = %other.action(),
                "Discarding unexpected reply"
            );
            Translated::Ignore
        }
    }
}

pub struct Pump {
    id: Uuid,
    kind: SubscriptionKind,
    sink: Arc<dyn SessionSink>,
    cancel: CancellationToken,
    /// Fires `stopped` when the pump is dropped, after its last delivery.
    _stopped: DropGuard,
    streams: StreamMap<String, ReplyStream>,
    handles: Vec<StreamHandle>,
    barrier: Option<oneshot::Sender<BarrierResult>>,
    remaining: usize,
    acked: HashSet<String>,
    snapshot: Option<Command>,
}

impl Pump {
    pub fn new(
        id: Uuid,
        kind: SubscriptionKind,
        sink: Arc<dyn SessionSink>,
        cancel: CancellationToken,
        stopped: CancellationToken,
        streams: Vec<(String, ReplyStream)>,
        barrier: oneshot::Sender<BarrierResult>,
    ) -> Self {
        let handles = streams.iter().map(|(_, s)| s.handle().clone()).collect();
        let remaining = streams.len();
        let mut map = StreamMap::with_capacity(remaining);
        for (device, stream) in streams {
            map.insert(device, stream);
        }
        Self {
            id,
            kind,
            sink,
            cancel,
            _stopped: stopped.drop_guard(),
            streams: map,
            handles,
            barrier: Some(barrier),
            remaining,
            acked: HashSet::new(),
            snapshot: None,
        }
    }

    /// Run until cancelled, the sink goes away, or every stream has ended.
    pub async fn run(mut self) {
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = self.streams.next() => next,
            };
            match next {
                None => {
                    self.release_barrier(Err(RpcError::ResponseDropped(format!(
                        "subscription {}",
                        self.id
                    ))));
                    break;
                }
                Some((device, Ok(body))) => {
                    if !self.on_reply(device, body) {
                        break;
                    }
                }
                Some((device, Err(e))) => {
                    warn!(
                        subscription_id = %self.id,
                        device_guid = %device,
                        error = %e,
                        "Subscription stream failed"
                    );
                    if self.barrier.is_some() {
                        self.release_barrier(Err(e));
                        break;
                    }
                }
            }
        }

        self.cancel.cancel();
        for handle in &self.handles {
            handle.release().await;
        }
        debug!(subscription_id = %self.id, "Subscription pump stopped");
    }

    fn on_reply(&mut self, device: String, body: ResponseBody) -> bool {
        match translate(self.kind, self.id, body) {
            Translated::Ack { backlog, snapshot } => {
                if !self.acked.insert(device.clone()) {
                    warn!(
                        subscription_id = %self.id,
                        device_guid = %device,
                        "Duplicate subscribe acknowledgement"
                    );
                    return true;
                }
                // Backlog goes out before anything else on this device's stream
                for message in backlog {
                    if !self.deliver(message) {
                        return false;
                    }
                }
                if snapshot.is_some() {
                    self.snapshot = snapshot;
                }
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    let snapshot = self.snapshot.take();
                    self.release_barrier(Ok(snapshot));
                }
                true
            }
            Translated::Event(message) => self.deliver(message),
            Translated::Ignore => true,
        }
    }

    fn deliver(&self, message: Value) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        match self.sink.send_message(message) {
            Ok(()) => true,
            Err(e) => {
                debug!(subscription_id = %self.id, error = %e, "Sink rejected message");
                self.cancel.cancel();
                false
            }
        }
    }

    fn release_barrier(&mut self, result: BarrierResult) {
        if let Some(tx) = self.barrier.take() {
            let _ = tx.send(result);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hive_proto::messages::{
        CommandEvent, CommandSubscribeResponse, CommandUpdateSubscribeResponse,
        NotificationSearchResponse,
    };

    fn command(name: &str) -> Command {
        let mut c = Command::new("dev-1", Utc::now());
        c.command = Some(name.into());
        c
    }

    #[test]
    fn command_ack_frames_backlog() {
        let id = Uuid::new_v4();
        let body = ResponseBody::CommandSubscribeResponse(CommandSubscribeResponse {
            subscription_id: id,
            commands: vec![command("c0")],
        });
        let Translated::Ack { backlog, snapshot } = translate(SubscriptionKind::Command, id, body)
        else {
            panic!("expected ack");
        };
        assert!(snapshot.is_none());
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0]["action"], "command/insert");
        assert_eq!(backlog[0]["subscriptionId"], id.to_string());
    }

    #[test]
    fn update_subscription_frames_events_as_updates() {
        let id = Uuid::new_v4();
        let ack = ResponseBody::CommandUpdateSubscribeResponse(CommandUpdateSubscribeResponse {
            subscription_id: id,
            command: Some(command("reboot")),
        });
        assert!(matches!(
            translate(SubscriptionKind::CommandUpdate, id, ack),
            Translated::Ack { snapshot: Some(_), .. }
        ));

        let event = ResponseBody::CommandEvent(CommandEvent {
            command: command("reboot"),
        });
        let Translated::Event(msg) = translate(SubscriptionKind::CommandUpdate, id, event) else {
            panic!("expected event");
        };
        assert_eq!(msg["action"], "command/update");
    }

    #[test]
    fn mismatched_reply_is_ignored() {
        let body = ResponseBody::NotificationSearchResponse(NotificationSearchResponse::default());
        assert_eq!(
            translate(SubscriptionKind::Notification, Uuid::new_v4(), body),
            Translated::Ignore
        );
    }
}
