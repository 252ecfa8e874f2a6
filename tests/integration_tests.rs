// Integration tests for the bot panel

use std::time::Duration;

use botpanel::connection::Transport;
use botpanel::model::{ChatOrigin, LogLevel, ServerEvent, StatsSnapshot};
use botpanel::reconciler::{LinkStatus, NoticeKind};
use botpanel::voice::Unsupported;
use botpanel::wire::{self, Packet};
use botpanel::{
    App, BackendClient, ClientStore, CommandDispatcher, ConnectionEvent, ConnectionManager,
    ConnectionSettings, Outcome, Reconciler, ReconcilerConfig, Submitted, UserCommand,
    VoiceSession,
};
use tokio::sync::mpsc;

fn stats(channels: &[&str]) -> StatsSnapshot {
    StatsSnapshot {
        connected_channels: channels.iter().map(|c| c.to_string()).collect(),
        total_users: 7,
        total_messages: 70,
        total_points: 700,
    }
}

#[test]
fn test_selection_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("botpanel").join("state.json");

    // First session: the only connected channel is picked and remembered.
    {
        let mut rec = Reconciler::new(ReconcilerConfig::default(), ClientStore::open(&state_file));
        rec.apply_stats(stats(&["alpha"]));
        assert_eq!(rec.selected_channel(), Some("alpha"));
    }
    assert!(state_file.exists());

    // Second session: more channels, the remembered one wins.
    let mut rec = Reconciler::new(ReconcilerConfig::default(), ClientStore::open(&state_file));
    rec.apply_stats(stats(&["beta", "alpha", "gamma"]));
    assert_eq!(rec.selected_channel(), Some("alpha"));
    assert_eq!(rec.state().selector.options(), ["beta", "alpha", "gamma"]);

    // An explicit pick replaces the remembered value.
    assert!(rec.select_channel("gamma"));
    let reopened = ClientStore::open(&state_file);
    assert_eq!(reopened.selected_channel(), Some("gamma"));
}

#[test]
fn test_socket_frames_drive_the_dashboard() {
    let frames = [
        r#"0{"sid":"abc","pingInterval":25000,"pingTimeout":20000}"#,
        "40",
        r#"42["stats_update",{"connected_channels":["alpha"],"total_users":3,"total_messages":9,"total_points":1}]"#,
        r#"42["chat_message",{"channel":"alpha","username":"viewer","message":"oi","timestamp":"10:00:00","isOwn":false}]"#,
        r#"42["connected",{"status":"ok"}]"#,
        r#"42["raid_received",{"channel":"alpha","raider":"friend","viewers":25,"timestamp":"10:00:05"}]"#,
        r#"42["log_message",{"level":"bot","message":"!discord answered","timestamp":"10:00:06"}]"#,
        "2",
    ];

    let mut rec = Reconciler::new(ReconcilerConfig::default(), ClientStore::in_memory());
    for frame in frames {
        match wire::decode(frame).unwrap() {
            Packet::Connect => rec.apply_connection(ConnectionEvent::Connected),
            Packet::Event(event) => rec.apply_event(event),
            _ => {}
        }
    }

    let state = rec.state();
    assert_eq!(state.link, LinkStatus::Online);
    assert_eq!(rec.selected_channel(), Some("alpha"));
    assert_eq!(state.stats.total_users, 3);
    assert_eq!(state.chat.entries().len(), 2);
    assert_eq!(state.chat.entries().back().unwrap().origin, ChatOrigin::Raid);
    assert_eq!(state.raids.get(0).unwrap().viewer_count, 25);
    assert_eq!(state.logs.back().unwrap().level, LogLevel::Bot);
    assert!(state.notices.iter().any(|n| n.kind == NoticeKind::Raid));
}

#[tokio::test]
async fn test_dispatcher_against_backend() {
    let mut server = mockito::Server::new_async().await;
    let send = server
        .mock("POST", "/api/bot/send")
        .with_status(200)
        .with_body(r#"{"status":"success"}"#)
        .expect(1)
        .create_async()
        .await;
    let remove = server
        .mock("POST", "/api/auto-response/remove")
        .with_status(404)
        .with_body(r#"{"error":"Trigger não encontrado"}"#)
        .create_async()
        .await;

    let client = BackendClient::new(&server.url(), Duration::from_secs(5));
    let dispatcher = CommandDispatcher::new(client, Default::default());
    let mut rec = Reconciler::new(ReconcilerConfig::default(), ClientStore::in_memory());

    assert_eq!(
        dispatcher.send_chat_message(&mut rec, "alpha", "hello").await,
        Outcome::Done
    );
    assert_eq!(
        dispatcher
            .remove_auto_response(&mut rec, "!nope", &mut true)
            .await,
        Outcome::Failed
    );
    let notice = rec.state().notices.last().unwrap();
    assert_eq!(notice.message, "Trigger não encontrado");

    send.assert_async().await;
    remove.assert_async().await;
}

#[tokio::test]
async fn test_app_with_polling_connection() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/stats")
        .with_status(200)
        .with_body(r#"{"connected_channels":["alpha"],"total_users":12}"#)
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("GET", "/api/auto-response/list")
        .with_status(200)
        .with_body(r#"{"responses":{"!discord":"join!"}}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/integrations/status")
        .with_status(200)
        .with_body(r#"{"email":{"enabled":false,"configured":false,"available":false}}"#)
        .create_async()
        .await;
    let stop = server
        .mock("POST", "/api/streamers/remove")
        .with_status(200)
        .with_body(r#"{"status":"success"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = BackendClient::new(&server.url(), Duration::from_secs(5));
    let settings = ConnectionSettings {
        base_url: server.url(),
        transport: Transport::Polling,
        poll_interval: Duration::from_millis(50),
        ..Default::default()
    };
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let connection = ConnectionManager::new(settings, client.clone(), event_tx).spawn();

    let mut app = App::new(
        Reconciler::new(ReconcilerConfig::default(), ClientStore::in_memory()),
        CommandDispatcher::new(client, Default::default()),
        VoiceSession::new(Box::new(Unsupported)),
        Duration::from_secs(60),
    );
    let driver = tokio::spawn(async move {
        app.run(event_rx, command_rx).await.unwrap();
        app
    });

    command_tx
        .send(Submitted::confirmed(UserCommand::RemoveStreamer("old".into())))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    command_tx.send(Submitted::new(UserCommand::Quit)).unwrap();

    let app = driver.await.unwrap();
    connection.abort();

    let state = app.reconciler().state();
    assert_eq!(state.link, LinkStatus::Online);
    assert_eq!(app.reconciler().selected_channel(), Some("alpha"));
    assert_eq!(state.stats.total_users, 12);
    assert_eq!(state.auto_responses["!discord"], "join!");
    assert_eq!(
        state.notices.iter().filter(|n| n.persistent).count(),
        1,
        "missing email library should warn once"
    );
    assert!(app.metrics().events_received >= 2);
    stop.assert_async().await;
}

#[test]
fn test_unknown_events_are_skipped() {
    assert_eq!(
        wire::decode(r#"42["connected",{"status":"ok"}]"#).unwrap(),
        Packet::Unhandled("connected".into())
    );
    let payload = serde_json::json!({"channel": "a", "status": "online"});
    let event = ServerEvent::from_parts("status_change", payload)
        .unwrap()
        .unwrap();
    assert!(matches!(event, ServerEvent::StatusChange(_)));
}
