//! End-to-end behaviour through a websocket client, the frontend and
//! websocket backend shards.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use hive_core::model::Command;
use hive_proto::messages::{
    CommandEvent, CommandInsertResponse, CommandSearchResponse, CommandSubscribeResponse,
    CommandUpdateResponse,
};
use hive_proto::{ReplyMode, RequestBody, ResponseBody};
use serde_json::json;

use common::{ADMIN_TOKEN, FakeBackend, Frontend, WsClient};

fn command(id: i64, guid: &str) -> Command {
    let mut c = Command::new(guid, Utc::now());
    c.id = Some(id);
    c.command = Some("set-temperature".into());
    c
}

fn subscribe_ack(frame: &hive_proto::OutboundFrame, backlog: Vec<Command>) -> ResponseBody {
    let RequestBody::CommandSubscribeRequest(r) = &frame.body else {
        panic!("expected command subscribe, got {:?}", frame.body);
    };
    ResponseBody::CommandSubscribeResponse(CommandSubscribeResponse {
        subscription_id: r.subscription_id,
        commands: backlog,
    })
}

#[tokio::test]
async fn backlog_is_delivered_before_live_commands() {
    let mut backend = FakeBackend::start().await;
    let frontend = Frontend::start(&[&backend], 5).await;
    let addr = frontend.serve().await;
    let mut client = WsClient::connect(&addr, ADMIN_TOKEN).await;

    client
        .send(json!({"action": "command/subscribe", "requestId": 1, "deviceGuid": "dev-1"}))
        .await;
    let frame = backend.next_frame().await;
    assert_eq!(frame.reply, ReplyMode::Stream);
    assert_eq!(frame.partition_key.as_deref(), Some("dev-1"));
    backend.reply(frame.correlation_id, subscribe_ack(&frame, vec![command(0, "dev-1")]));

    let (reply, early) = client.reply_to(1).await;
    assert_eq!(reply["status"], "success");
    assert!(early.is_empty(), "frames ahead of the subscribe reply: {early:?}");
    let subscription_id = reply["subscriptionId"].as_str().unwrap().to_string();

    let mut events = Vec::new();

    for id in [1, 2] {
        backend.reply(
            frame.correlation_id,
            ResponseBody::CommandEvent(CommandEvent {
                command: command(id, "dev-1"),
            }),
        );
    }
    while events.len() < 3 {
        events.push(client.next().await);
    }

    let ids: Vec<_> = events.iter().map(|e| e["command"]["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    for event in &events {
        assert_eq!(event["action"], "command/insert");
        assert_eq!(event["subscriptionId"], subscription_id.as_str());
    }
}

#[tokio::test]
async fn missing_acknowledgement_fails_subscribe_and_cleans_up() {
    let mut backend = FakeBackend::start().await;
    let frontend = Frontend::start(&[&backend], 1).await;
    let addr = frontend.serve().await;
    let mut client = WsClient::connect(&addr, ADMIN_TOKEN).await;

    client
        .send(json!({
            "action": "command/subscribe",
            "requestId": 1,
            "deviceGuids": ["dev-1", "dev-2", "dev-3"],
        }))
        .await;
    let frames = [
        backend.next_frame().await,
        backend.next_frame().await,
        backend.next_frame().await,
    ];
    for frame in frames.iter().filter(|f| f.partition_key.as_deref() != Some("dev-3")) {
        backend.reply(frame.correlation_id, subscribe_ack(frame, Vec::new()));
    }

    let (reply, _) = client.reply_to(1).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], 503);
    assert_eq!(frontend.state.subscriptions.len().await, 0);

    let mut unsubscribed = BTreeSet::new();
    while let Some(frame) = backend.frame_within(Duration::from_millis(300)).await {
        if let RequestBody::CommandUnsubscribeRequest(_) = frame.body {
            unsubscribed.insert(frame.partition_key.unwrap());
        }
    }
    let expected: BTreeSet<String> = ["dev-1", "dev-2", "dev-3"].map(String::from).into();
    assert_eq!(unsubscribed, expected);
}

#[tokio::test]
async fn insert_then_update_reach_the_same_shard() {
    let mut backends = [FakeBackend::start().await, FakeBackend::start().await];
    let frontend = Frontend::start(&[&backends[0], &backends[1]], 5).await;
    let addr = frontend.serve().await;
    let mut client = WsClient::connect(&addr, ADMIN_TOKEN).await;
    let shard = frontend.shard_of("dev-2");

    client
        .send(json!({
            "action": "command/insert",
            "requestId": 1,
            "deviceGuid": "dev-2",
            "command": {"command": "turn-on"},
        }))
        .await;
    let frame = backends[shard].next_frame().await;
    let RequestBody::CommandInsertRequest(r) = frame.body else {
        panic!("expected command insert");
    };
    let mut created = r.command;
    created.id = Some(77);
    backends[shard].reply(
        frame.correlation_id,
        ResponseBody::CommandInsertResponse(CommandInsertResponse {
            command: created.clone(),
        }),
    );
    let (reply, _) = client.reply_to(1).await;
    assert_eq!(reply["command"]["id"], 77);

    client
        .send(json!({
            "action": "command/update",
            "requestId": 2,
            "deviceGuid": "dev-2",
            "commandId": 77,
            "command": {"status": "done", "result": {"ok": true}},
        }))
        .await;
    let search = backends[shard].next_frame().await;
    assert!(matches!(search.body, RequestBody::CommandSearchRequest(_)));
    backends[shard].reply(
        search.correlation_id,
        ResponseBody::CommandSearchResponse(CommandSearchResponse {
            commands: vec![created],
        }),
    );
    let update = backends[shard].next_frame().await;
    assert_eq!(update.partition_key.as_deref(), Some("dev-2"));
    let RequestBody::CommandUpdateRequest(u) = &update.body else {
        panic!("expected command update");
    };
    assert!(u.command.is_updated);
    assert_eq!(u.command.status.as_deref(), Some("done"));
    backends[shard].reply(
        update.correlation_id,
        ResponseBody::CommandUpdateResponse(CommandUpdateResponse {}),
    );
    let (reply, _) = client.reply_to(2).await;
    assert_eq!(reply["status"], "success");

    let other = &mut backends[1 - shard];
    assert!(other.frame_within(Duration::from_millis(100)).await.is_none());
}

#[tokio::test]
async fn update_of_unknown_command_is_not_found() {
    let mut backend = FakeBackend::start().await;
    let frontend = Frontend::start(&[&backend], 5).await;
    let addr = frontend.serve().await;
    let mut client = WsClient::connect(&addr, ADMIN_TOKEN).await;

    client
        .send(json!({
            "action": "command/update",
            "requestId": 4,
            "deviceGuid": "dev-1",
            "commandId": 999,
            "command": {"status": "done"},
        }))
        .await;
    let search = backend.next_frame().await;
    backend.reply(
        search.correlation_id,
        ResponseBody::CommandSearchResponse(CommandSearchResponse::default()),
    );

    let (reply, _) = client.reply_to(4).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], 404);
    assert!(backend.frame_within(Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn both_device_forms_are_rejected() {
    let mut backend = FakeBackend::start().await;
    let frontend = Frontend::start(&[&backend], 5).await;
    let addr = frontend.serve().await;
    let mut client = WsClient::connect(&addr, ADMIN_TOKEN).await;

    client
        .send(json!({
            "action": "command/subscribe",
            "requestId": 5,
            "deviceGuids": ["dev-1"],
            "deviceGuid": "dev-2",
        }))
        .await;
    let (reply, _) = client.reply_to(5).await;
    assert_eq!(reply["code"], 400);
    assert!(backend.frame_within(Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn events_after_unsubscribe_are_dropped() {
    let mut backend = FakeBackend::start().await;
    let frontend = Frontend::start(&[&backend], 5).await;
    let addr = frontend.serve().await;
    let mut client = WsClient::connect(&addr, ADMIN_TOKEN).await;

    client
        .send(json!({"action": "command/subscribe", "requestId": 1, "deviceGuid": "dev-1"}))
        .await;
    let frame = backend.next_frame().await;
    backend.reply(frame.correlation_id, subscribe_ack(&frame, Vec::new()));
    let (reply, _) = client.reply_to(1).await;
    let subscription_id = reply["subscriptionId"].as_str().unwrap().to_string();

    client
        .send(json!({
            "action": "command/unsubscribe",
            "requestId": 2,
            "subscriptionId": subscription_id,
        }))
        .await;
    let (reply, _) = client.reply_to(2).await;
    assert_eq!(reply["status"], "success");
    let push = backend.next_frame().await;
    assert_eq!(push.reply, ReplyMode::None);
    assert!(matches!(push.body, RequestBody::CommandUnsubscribeRequest(_)));

    backend.reply(
        frame.correlation_id,
        ResponseBody::CommandEvent(CommandEvent {
            command: command(5, "dev-1"),
        }),
    );
    assert!(client.within(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn shard_disconnect_fails_in_flight_requests() {
    let mut backend = FakeBackend::start().await;
    let frontend = Frontend::start(&[&backend], 5).await;
    let addr = frontend.serve().await;
    let mut client = WsClient::connect(&addr, ADMIN_TOKEN).await;

    client
        .send(json!({
            "action": "command/get",
            "requestId": 9,
            "deviceGuid": "dev-1",
            "commandId": 1,
        }))
        .await;
    backend.next_frame().await;
    backend.disconnect();

    let (reply, _) = client.reply_to(9).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], 503);

    // The transport reconnects on its own
    frontend.wait_connected(1).await;
}

#[tokio::test]
async fn unknown_reply_action_is_ignored() {
    let mut backend = FakeBackend::start().await;
    let frontend = Frontend::start(&[&backend], 5).await;
    let addr = frontend.serve().await;
    let mut client = WsClient::connect(&addr, ADMIN_TOKEN).await;

    client
        .send(json!({"action": "command/subscribe", "requestId": 1, "deviceGuid": "dev-1"}))
        .await;
    let frame = backend.next_frame().await;
    backend.reply(frame.correlation_id, subscribe_ack(&frame, Vec::new()));
    client.reply_to(1).await;

    backend.send_raw(
        json!({
            "correlationId": frame.correlation_id,
            "body": {"action": "DEVICE_DELETE_EVENT", "guid": "dev-1"},
        })
        .to_string(),
    );
    backend.reply(
        frame.correlation_id,
        ResponseBody::CommandEvent(CommandEvent {
            command: command(3, "dev-1"),
        }),
    );
    let event = client.next().await;
    assert_eq!(event["command"]["id"], 3);
}
