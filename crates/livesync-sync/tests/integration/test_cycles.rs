//! Integration tests for refresh cycles
//!
//! Covers route selection over the pull transport and the global callback,
//! cycle exclusivity, freshness monotonicity and timer-driven refresh.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use livesync_core::domain::{
    PullError, RefreshOutcome, RouteKind, SkipReason, SourceSpec, SyncConfig, TimerKey,
};
use livesync_core::ports::NotificationLevel;
use livesync_sync::SyncError;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;

use crate::common::{self, key, Setup};

#[tokio::test]
async fn test_no_sources_no_callback_completes_immediately() {
    let h = common::start(SyncConfig::default(), Setup::default()).await;
    let mut reports = h.manager.subscribe();

    let outcome = h.manager.manual_refresh().await;

    let report = outcome.report().expect("cycle should complete");
    assert_eq!(report.route, RouteKind::Noop);
    assert!(h.pull.calls().is_empty());
    assert!(!h.manager.state().in_flight);
    assert_eq!(reports.try_recv().unwrap().cycle_id, report.cycle_id);
    assert_eq!(reports.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_reports_each_source() {
    let successes = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));

    let config = {
        let successes = successes.clone();
        let errors = errors.clone();
        SyncConfig::builder()
            .source(
                SourceSpec::new(key("a"), "/a")
                    .on_success(move |body| successes.lock().unwrap().push(body.clone())),
            )
            .source(
                SourceSpec::new(key("b"), "/b")
                    .on_error(move |err| errors.lock().unwrap().push(err.clone())),
            )
            .build()
            .unwrap()
    };

    let setup = Setup::default();
    setup.pull.route(
        "/a",
        Duration::from_millis(10),
        Ok(serde_json::json!({"cpu": 42})),
    );
    setup
        .pull
        .route("/b", Duration::ZERO, Err(PullError::Status { status: 500 }));
    let h = common::start(config, setup).await;
    let mut reports = h.manager.subscribe();

    let outcome = h.manager.manual_refresh().await;
    let report = outcome.report().unwrap();

    assert_eq!(report.route, RouteKind::Pull);
    assert_eq!(report.succeeded, vec![key("a")]);
    assert_eq!(
        report.failure_for(&key("b")),
        Some(&PullError::Status { status: 500 })
    );
    assert_eq!(*successes.lock().unwrap(), vec![serde_json::json!({"cpu": 42})]);
    assert_eq!(*errors.lock().unwrap(), vec![PullError::Status { status: 500 }]);

    // Pulls of one cycle run concurrently
    assert_eq!(h.pull.peak(), 2);

    // Exactly one completion signal
    assert!(reports.try_recv().is_ok());
    assert_eq!(reports.try_recv(), Err(TryRecvError::Empty));

    let toasts = h.ui.toasts.lock().unwrap().clone();
    assert!(toasts
        .iter()
        .any(|t| t.level == NotificationLevel::Error && t.message == "Failed to refresh b"));
    assert!(toasts
        .iter()
        .any(|t| t.level == NotificationLevel::Success
            && t.message == "Data refreshed successfully"));
}

#[tokio::test(start_paused = true)]
async fn test_custom_error_message_is_shown() {
    let config = SyncConfig::builder()
        .source(SourceSpec::new(key("jobs"), "/jobs").with_error_message("Jobs are unavailable"))
        .build()
        .unwrap();
    let setup = Setup::default();
    setup
        .pull
        .route("/jobs", Duration::ZERO, Err(PullError::Transport("reset".into())));
    let h = common::start(config, setup).await;

    h.manager.manual_refresh().await;

    assert!(h
        .ui
        .toast_messages()
        .contains(&"Jobs are unavailable".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_cycles_never_overlap() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    let config = {
        let (running, peak, runs) = (running.clone(), peak.clone(), runs.clone());
        SyncConfig::builder()
            .global_refresh(move || {
                let (running, peak, runs) = (running.clone(), peak.clone(), runs.clone());
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(25)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                }
                .boxed()
            })
            .build()
            .unwrap()
    };

    let h = common::start(
        config,
        Setup {
            auto_refresh: true,
            interval_ms: 10_000,
            ..Setup::default()
        },
    )
    .await;
    assert_eq!(h.manager.active_timers(), vec![TimerKey::General]);

    // First tick at t=10s starts a 25s cycle
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert!(h.manager.state().in_flight);
    let before = h.manager.state();
    assert_eq!(
        h.manager.manual_refresh().await,
        RefreshOutcome::Skipped(SkipReason::InFlight)
    );
    assert_eq!(h.manager.state(), before);

    tokio::time::sleep(Duration::from_secs(90)).await;

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    // Ticks at 10, 40, 70, 100 start cycles; the ones in between are dropped
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_freshness_is_monotonic() {
    let config = SyncConfig::builder()
        .source(SourceSpec::new(key("a"), "/a"))
        .build()
        .unwrap();
    let h = common::start(config, Setup::default()).await;

    let mut last = h.manager.state().last_refreshed_at;
    for _ in 0..5 {
        let outcome = h.manager.manual_refresh().await;
        let report = outcome.report().unwrap();
        let state = h.manager.state();
        assert!(state.last_refreshed_at >= last);
        assert!(state.last_refreshed_at >= report.completed_at);
        last = state.last_refreshed_at;
    }
    assert_eq!(h.manager.freshness_text(), "just now");
}

#[tokio::test(start_paused = true)]
async fn test_loading_affordance_cleared_after_min_loading() {
    let h = common::start(SyncConfig::default(), Setup::default()).await;

    h.manager.manual_refresh().await;
    assert_eq!(
        *h.ui.loading.lock().unwrap(),
        vec![("#refresh-now-btn".to_string(), true)]
    );

    tokio::time::sleep(Duration::from_millis(301)).await;
    assert_eq!(
        h.ui.loading.lock().unwrap().last(),
        Some(&("#refresh-now-btn".to_string(), false))
    );
}

#[tokio::test(start_paused = true)]
async fn test_timer_refresh_is_silent() {
    let config = SyncConfig::builder()
        .source(SourceSpec::new(key("a"), "/a").with_target_selector("#stats"))
        .source(SourceSpec::new(key("b"), "/b"))
        .build()
        .unwrap();
    let h = common::start(
        config,
        Setup {
            auto_refresh: true,
            interval_ms: 5_000,
            ..Setup::default()
        },
    )
    .await;
    assert_eq!(
        h.manager.active_timers(),
        vec![TimerKey::Source(key("a")), TimerKey::Source(key("b"))]
    );

    let mut reports = h.manager.subscribe();
    tokio::time::sleep(Duration::from_millis(5_100)).await;

    // Ticks that fire together refresh every source
    let mut refreshed = vec![
        reports.try_recv().unwrap().succeeded,
        reports.try_recv().unwrap().succeeded,
    ];
    refreshed.sort();
    assert_eq!(refreshed, vec![vec![key("a")], vec![key("b")]]);
    assert!(!h.manager.state().in_flight);

    let mut calls = h.pull.calls();
    calls.sort();
    assert_eq!(calls, vec!["/a".to_string(), "/b".to_string()]);
    assert!(h.ui.toasts.lock().unwrap().is_empty());
    // Per-source loading only; the refresh button is untouched
    assert!(h
        .ui
        .loading
        .lock()
        .unwrap()
        .iter()
        .all(|(selector, _)| selector == "#stats"));
}

#[tokio::test(start_paused = true)]
async fn test_set_interval_restarts_timers() {
    let config = SyncConfig::builder()
        .source(SourceSpec::new(key("a"), "/a"))
        .build()
        .unwrap();
    let h = common::start(
        config,
        Setup {
            auto_refresh: true,
            interval_ms: 30_000,
            ..Setup::default()
        },
    )
    .await;

    tokio::time::sleep(Duration::from_secs(20)).await;
    let changed_at = Instant::now();
    h.manager.set_interval(60_000).await.unwrap();

    // The old 30s tick (due at t=30) never fires
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(h.pull.calls().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.pull.calls().len(), 1);
    assert!(Instant::now() - changed_at >= Duration::from_secs(60));

    assert_eq!(h.manager.state().interval_ms, 60_000);
    assert!(h
        .ui
        .toast_messages()
        .contains(&"Refresh interval set to 1 minute".to_string()));
}

#[tokio::test]
async fn test_zero_interval_is_rejected() {
    let h = common::start(SyncConfig::default(), Setup::default()).await;

    let err = h.manager.set_interval(0).await.unwrap_err();

    assert!(matches!(err, SyncError::DomainError(_)));
    assert_eq!(h.manager.state().interval_ms, 30_000);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_auto_refresh() {
    let config = SyncConfig::builder()
        .source(SourceSpec::new(key("a"), "/a"))
        .build()
        .unwrap();
    let h = common::start(config, Setup::default()).await;
    assert!(h.manager.active_timers().is_empty());

    h.manager.set_auto_refresh(true).await;
    assert_eq!(h.manager.active_timers(), vec![TimerKey::Source(key("a"))]);
    assert!(h.manager.freshness_text().ends_with(" • live"));

    h.manager.set_auto_refresh(false).await;
    assert!(h.manager.active_timers().is_empty());
    assert!(!h.manager.freshness_text().contains("live"));

    assert_eq!(
        h.ui.toast_messages(),
        vec![
            "Auto-refresh enabled".to_string(),
            "Auto-refresh disabled".to_string()
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconfigure_replaces_sources() {
    let h = common::start(
        SyncConfig::builder()
            .source(SourceSpec::new(key("a"), "/a"))
            .build()
            .unwrap(),
        Setup {
            auto_refresh: true,
            ..Setup::default()
        },
    )
    .await;

    h.manager.reconfigure(
        SyncConfig::builder()
            .source(SourceSpec::new(key("b"), "/b"))
            .source(SourceSpec::new(key("c"), "/c"))
            .build()
            .unwrap(),
    );

    assert_eq!(
        h.manager.active_timers(),
        vec![TimerKey::Source(key("b")), TimerKey::Source(key("c"))]
    );
    let report = h.manager.manual_refresh().await.report().cloned().unwrap();
    assert_eq!(report.succeeded, vec![key("b"), key("c")]);
}

#[tokio::test(start_paused = true)]
async fn test_source_tick_dropped_during_full_cycle() {
    let config = SyncConfig::builder()
        .source(SourceSpec::new(key("a"), "/a"))
        .build()
        .unwrap();
    let setup = Setup::default();
    setup
        .pull
        .route("/a", Duration::from_secs(2), Ok(serde_json::json!({})));
    let h = common::start(config, setup).await;

    let manager = &h.manager;
    let (manual, tick) = tokio::join!(manager.manual_refresh(), async {
        tokio::task::yield_now().await;
        manager.refresh_source(&key("a")).await
    });

    assert!(manual.report().is_some());
    assert_eq!(tick, RefreshOutcome::Skipped(SkipReason::InFlight));
    assert_eq!(h.pull.calls().len(), 1);
}

#[tokio::test]
async fn test_full_cycle_leaves_running_source_to_its_tick() {
    let config = SyncConfig::builder()
        .source(SourceSpec::new(key("a"), "/a"))
        .source(SourceSpec::new(key("b"), "/b"))
        .build()
        .unwrap();
    let setup = Setup::default();
    setup
        .pull
        .route("/a", Duration::from_secs(2), Ok(serde_json::json!({})));
    let h = common::start(config, setup).await;

    let manager = &h.manager;
    let key_a = key("a");
    let (tick, manual) = tokio::join!(manager.refresh_source(&key_a), async {
        tokio::task::yield_now().await;
        manager.manual_refresh().await
    });

    assert_eq!(tick.report().unwrap().succeeded, vec![key("a")]);
    let report = manual.report().unwrap();
    assert_eq!(report.succeeded, vec![key("b")]);
    assert!(report.failed.is_empty());

    let mut calls = h.pull.calls();
    calls.sort();
    assert_eq!(calls, vec!["/a".to_string(), "/b".to_string()]);
    assert!(!manager.state().in_flight);
}

#[tokio::test]
async fn test_unknown_source_pull() {
    let h = common::start(SyncConfig::default(), Setup::default()).await;

    let err = h.manager.pull_one(&key("ghost")).await.unwrap_err();

    assert_eq!(err, PullError::UnknownSource("ghost".to_string()));
    assert_eq!(h.ui.toast_messages(), vec!["Failed to refresh ghost".to_string()]);
}
