//! Integration tests for the push channel
//!
//! Covers the push refresh route and its fallback timer, connection
//! supervision and reconnects, event dispatch and server notices.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use livesync_core::domain::{
    ConnectionStatus, OutboundMessage, PushCompletion, ReconnectPolicy, RefreshOutcome,
    RouteKind, SessionId, SkipReason, SourceSpec, SyncConfig, TimerKey, TransportPreference,
};
use livesync_core::ports::NotificationLevel;
use tokio::time::Instant;

use crate::common::{self, key, settle, Setup};

fn pushed_config() -> SyncConfig {
    SyncConfig::builder()
        .source(SourceSpec::new(key("stats"), "/stats").with_pushed_event("stats_update"))
        .build()
        .unwrap()
}

fn with_push() -> Setup {
    Setup {
        push: true,
        ..Setup::default()
    }
}

// ============================================================================
// Push refresh route
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_push_refresh_times_out() {
    let h = common::start(pushed_config(), with_push()).await;
    assert!(h.manager.connection_state().is_connected());

    let started = Instant::now();
    let outcome = h.manager.manual_refresh().await;
    let report = outcome.report().unwrap();

    assert_eq!(report.route, RouteKind::Push);
    assert_eq!(report.push_completion, Some(PushCompletion::TimedOut));
    assert!(started.elapsed() >= Duration::from_millis(2000));
    assert!(h.pull.calls().is_empty());
    assert!(h
        .push
        .sent()
        .contains(&OutboundMessage::request_refresh_all()));
    assert!(!h.manager.state().in_flight);
}

#[tokio::test(start_paused = true)]
async fn test_acknowledged_push_refresh_completes_early() {
    let setup = with_push();
    setup.channel.set_auto_ack(true);
    let h = common::start(pushed_config(), setup).await;

    let started = Instant::now();
    let outcome = h.manager.manual_refresh().await;

    assert_eq!(
        outcome.report().unwrap().push_completion,
        Some(PushCompletion::Acknowledged)
    );
    assert!(started.elapsed() < Duration::from_millis(2000));
    assert!(h.pull.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_late_ack_does_not_complete_next_cycle() {
    let h = common::start(pushed_config(), with_push()).await;

    let first = h.manager.manual_refresh().await;
    assert_eq!(
        first.report().unwrap().push_completion,
        Some(PushCompletion::TimedOut)
    );

    // Arrives after the fallback fired
    h.push
        .frame(r#"{"type":"refresh_acknowledged","success":true}"#);
    settle().await;

    let started = Instant::now();
    let second = h.manager.manual_refresh().await;
    assert_eq!(
        second.report().unwrap().push_completion,
        Some(PushCompletion::TimedOut)
    );
    assert!(started.elapsed() >= Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_failed_push_request_falls_back_to_pull() {
    let setup = with_push();
    setup.channel.set_fail_send(true);
    let h = common::start(pushed_config(), setup).await;

    let outcome = h.manager.manual_refresh().await;
    let report = outcome.report().unwrap();

    assert_eq!(report.route, RouteKind::Pull);
    assert_eq!(report.succeeded, vec![key("stats")]);
    assert_eq!(h.pull.calls(), vec!["/stats".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_pull_preference_never_connects() {
    let config = SyncConfig::builder()
        .source(SourceSpec::new(key("stats"), "/stats"))
        .transport_preference(TransportPreference::Pull)
        .build()
        .unwrap();
    let h = common::start(config, with_push()).await;

    assert_eq!(h.push.connects(), 0);
    let outcome = h.manager.manual_refresh().await;
    assert_eq!(outcome.report().unwrap().route, RouteKind::Pull);
}

#[tokio::test(start_paused = true)]
async fn test_pushed_source_tick_skipped_while_connected() {
    let config = SyncConfig::builder()
        .source(SourceSpec::new(key("stats"), "/stats").with_pushed_event("stats_update"))
        .source(SourceSpec::new(key("jobs"), "/jobs"))
        .build()
        .unwrap();
    let h = common::start(
        config,
        Setup {
            push: true,
            auto_refresh: true,
            interval_ms: 5_000,
            ..Setup::default()
        },
    )
    .await;

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(h.pull.calls(), vec!["/jobs".to_string()]);

    assert_eq!(
        h.manager.refresh_source(&key("stats")).await,
        RefreshOutcome::Skipped(SkipReason::PushDelivered)
    );

    // Without the channel the source is pulled again
    h.manager.disconnect_push().await;
    let outcome = h.manager.refresh_source(&key("stats")).await;
    assert_eq!(outcome.report().unwrap().succeeded, vec![key("stats")]);
    assert!(matches!(
        outcome.report().unwrap().trigger,
        livesync_core::domain::CycleTrigger::Timer(TimerKey::Source(_))
    ));
}

// ============================================================================
// Connection supervision
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_open_shows_indicator_and_toast() {
    let h = common::start(SyncConfig::default(), with_push()).await;

    assert_eq!(h.push.connects(), 1);
    assert_eq!(h.ui.last_indicator(), Some(true));
    let toasts = h.ui.toasts.lock().unwrap().clone();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].message, "Real-time updates connected");
    assert_eq!(toasts[0].level, NotificationLevel::Success);
}

#[tokio::test(start_paused = true)]
async fn test_session_is_authenticated_on_open() {
    let config = SyncConfig::builder()
        .session_id(SessionId::new("sess-1").unwrap())
        .build()
        .unwrap();
    let h = common::start(config, with_push()).await;

    assert_eq!(
        h.push.sent(),
        vec![OutboundMessage::Authenticate {
            session_id: SessionId::new("sess-1").unwrap()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_server_close_schedules_reconnect() {
    let h = common::start(SyncConfig::default(), with_push()).await;

    h.push.close("server restart");

    let state = h.manager.connection_state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.attempts, 1);
    let remaining = state.reconnect_deadline.unwrap() - Utc::now();
    assert!(remaining > chrono::Duration::seconds(4));
    assert!(remaining <= chrono::Duration::seconds(5));
    assert_eq!(h.ui.last_indicator(), Some(false));

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(h.push.connects(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.push.connects(), 2);
    let state = h.manager.connection_state();
    assert!(state.is_connected());
    assert_eq!(state.attempts, 0);
    assert_eq!(state.reconnect_deadline, None);
    assert_eq!(h.ui.last_indicator(), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_cancels_pending_reconnect() {
    let h = common::start(SyncConfig::default(), with_push()).await;

    h.push.close("server restart");
    h.manager.connect_push().await.unwrap();
    assert_eq!(h.push.connects(), 2);
    assert!(h.manager.connection_state().is_connected());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.push.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_user_disconnect_does_not_reconnect() {
    let h = common::start(SyncConfig::default(), with_push()).await;

    h.manager.disconnect_push().await;

    let state = h.manager.connection_state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.reconnect_deadline, None);
    assert_eq!(h.ui.last_indicator(), Some(false));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.push.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_max_attempts() {
    let setup = Setup {
        push: true,
        deps: |deps| {
            deps.with_reconnect(ReconnectPolicy::fixed(Duration::from_secs(1)).with_max_attempts(2))
        },
        ..Setup::default()
    };
    setup.channel.set_refuse(true);
    let h = common::start(SyncConfig::default(), setup).await;
    assert_eq!(h.push.connects(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;

    // The initial attempt plus two reconnects
    assert_eq!(h.push.connects(), 3);
    let state = h.manager.connection_state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.reconnect_deadline, None);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_idempotent() {
    let h = common::start(
        pushed_config(),
        Setup {
            push: true,
            auto_refresh: true,
            ..Setup::default()
        },
    )
    .await;

    h.manager.shutdown().await;
    h.manager.shutdown().await;

    assert!(h.manager.active_timers().is_empty());
    assert!(!h.manager.connection_state().is_connected());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(h.pull.calls().is_empty());
    assert_eq!(h.push.connects(), 1);
}

// ============================================================================
// Inbound frames
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_event_handlers_and_freshness() {
    let h = common::start(SyncConfig::default(), with_push()).await;
    let named = Arc::new(Mutex::new(Vec::new()));
    let any = Arc::new(Mutex::new(Vec::new()));
    {
        let named = named.clone();
        h.manager
            .on_event("stats_update", move |payload| {
                named.lock().unwrap().push(payload.clone())
            })
            .unwrap();
        let any = any.clone();
        h.manager
            .on_any(move |event, _| any.lock().unwrap().push(event.to_string()))
            .unwrap();
    }
    let texts_before = h.ui.texts.lock().unwrap().len();

    h.push
        .frame(r#"{"event":"stats_update","data":{"cpu":12}}"#);
    h.push.frame(r#"{"type":"job_finished","id":7}"#);
    settle().await;

    assert_eq!(*named.lock().unwrap(), vec![serde_json::json!({"cpu": 12})]);
    assert_eq!(*any.lock().unwrap(), vec!["job_finished".to_string()]);
    assert_eq!(h.ui.texts.lock().unwrap().len(), texts_before + 2);
    assert_eq!(h.manager.freshness_text(), "just now");
}

#[tokio::test(start_paused = true)]
async fn test_unhandled_event_leaves_freshness_alone() {
    let h = common::start(SyncConfig::default(), with_push()).await;
    let before = h.manager.state().last_refreshed_at;
    let texts_before = h.ui.texts.lock().unwrap().len();

    h.push.frame(r#"{"event":"nobody_listens","data":{}}"#);
    settle().await;

    assert_eq!(h.manager.state().last_refreshed_at, before);
    assert_eq!(h.ui.texts.lock().unwrap().len(), texts_before);
}

#[tokio::test(start_paused = true)]
async fn test_pushed_source_receives_payload() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = {
        let seen = seen.clone();
        SyncConfig::builder()
            .source(
                SourceSpec::new(key("stats"), "/stats")
                    .with_pushed_event("stats_update")
                    .on_success(move |body| seen.lock().unwrap().push(body.clone())),
            )
            .build()
            .unwrap()
    };
    let h = common::start(config, with_push()).await;

    h.push
        .frame(r#"{"event":"stats_update","data":{"cpu":99}}"#);
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec![serde_json::json!({"cpu": 99})]);
    assert!(h.pull.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_is_dropped() {
    let h = common::start(SyncConfig::default(), with_push()).await;
    let toasts_before = h.ui.toasts.lock().unwrap().len();

    h.push.frame("not json at all");
    h.push.frame(r#"["an", "array"]"#);
    h.push.frame(r#"{"no_tag":true}"#);
    settle().await;

    assert!(h.manager.connection_state().is_connected());
    assert_eq!(h.ui.toasts.lock().unwrap().len(), toasts_before);
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_is_sent_to_server() {
    let h = common::start(SyncConfig::default(), with_push()).await;

    h.manager.set_interval(60_000).await.unwrap();

    assert!(h
        .push
        .sent()
        .contains(&OutboundMessage::set_refresh_interval_all(60_000)));
}

#[tokio::test(start_paused = true)]
async fn test_server_interval_notices() {
    let h = common::start(SyncConfig::default(), with_push()).await;

    h.push.frame(
        r#"{"type":"refresh_interval_updated","data":{"refresh_type":"all","interval":60000}}"#,
    );
    h.push.frame(
        r#"{"type":"refresh_interval_error","data":{"message":"Interval too short"}}"#,
    );

    let toasts = h.ui.toasts.lock().unwrap().clone();
    let last_two = &toasts[toasts.len() - 2..];
    assert_eq!(last_two[0].message, "Refresh interval updated");
    assert_eq!(last_two[0].level, NotificationLevel::Info);
    assert_eq!(last_two[1].message, "Interval too short");
    assert_eq!(last_two[1].level, NotificationLevel::Error);
}
