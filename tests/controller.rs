use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use flowvisor::{
    BridgeState, CONFIG_KEY, Config, ConfigError, ControlTunnel, Controller, ControllerError,
    Directive, Event, EventKind, RegisterOptions, Reply, ServiceContext, ServiceError, ServiceFn,
    ServiceRef, Sid, Signal,
};

fn controller() -> Arc<Controller> {
    Controller::builder(Config::default())
        .with_signal_listener(false)
        .build()
        .expect("controller")
}

fn ok_service(name: &'static str) -> ServiceRef {
    ServiceFn::arc(name, |mut tunnel: ControlTunnel| async move {
        tunnel.serve(|_signal| Reply::Ok).await?;
        Ok::<_, ServiceError>(())
    })
}

/// Service that reports every signal it reads before answering with `reply`.
fn recording_service(
    name: &'static str,
    reply: Reply,
) -> (ServiceRef, mpsc::UnboundedReceiver<Signal>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let svc: ServiceRef = ServiceFn::arc(name, move |mut tunnel: ControlTunnel| {
        let tx = tx.clone();
        async move {
            while let Ok((signal, replier)) = tunnel.read_message().await {
                let _ = tx.send(signal);
                replier.reply(reply).await?;
            }
            Ok::<_, ServiceError>(())
        }
    });
    (svc, rx)
}

async fn next_event(
    rx: &mut broadcast::Receiver<Event>,
    mut pred: impl FnMut(&Event) -> bool,
) -> Event {
    loop {
        match rx.recv().await {
            Ok(ev) if pred(&ev) => return ev,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => panic!("bus closed"),
        }
    }
}

fn is(kind: EventKind, sid: Sid) -> impl FnMut(&Event) -> bool {
    move |ev| ev.kind == kind && ev.sid == Some(sid)
}

#[tokio::test]
async fn registrations_get_distinct_sids_and_metadata() {
    let ctl = controller();
    assert_eq!(ctl.registered_count(), 1);
    let own = ctl.self_sid().expect("self registered");
    assert!(ctl.metadata(own).is_ok());

    let a = ctl.register(ok_service("a")).expect("register a");
    let b = ctl.register(ok_service("b")).expect("register b");

    assert_ne!(a, b);
    assert_ne!(a, own);
    assert_eq!(ctl.registered_count(), 3);
    assert_eq!(ctl.live_count(), 3);
    assert_eq!(ctl.metadata(a).expect("meta a").config(), ctl.config());
    assert_eq!(ctl.bridge_state(b), Some(BridgeState::Idle));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_during_broadcasts() {
    const TASKS: usize = 8;
    const PER_TASK: usize = 16;

    let ctl = controller();

    let broadcaster = {
        let ctl = Arc::clone(&ctl);
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..20 {
                let report = ctl.broadcast(Directive::MetadataUpdated).await;
                seen.push(
                    report.delivered + report.skipped_dead + report.failed.len() + report.busy.len(),
                );
                tokio::task::yield_now().await;
            }
            seen
        })
    };

    let registrars: Vec<_> = (0..TASKS)
        .map(|_| {
            let ctl = Arc::clone(&ctl);
            tokio::spawn(async move {
                let mut sids = Vec::with_capacity(PER_TASK);
                for _ in 0..PER_TASK {
                    sids.push(ctl.register(ok_service("worker")).expect("register"));
                    tokio::task::yield_now().await;
                }
                sids
            })
        })
        .collect();

    let mut sids = Vec::new();
    for r in registrars {
        sids.extend(r.await.expect("registrar"));
    }
    let snapshots = broadcaster.await.expect("broadcaster");

    let total = TASKS * PER_TASK;
    let unique: HashSet<_> = sids.iter().copied().collect();
    assert_eq!(unique.len(), total);
    assert_eq!(ctl.registered_count(), total + 1);
    for sid in &sids {
        assert!(ctl.metadata(*sid).is_ok());
    }

    // Every broadcast saw a whole prefix of the registry, never shrinking.
    assert!(snapshots.iter().all(|&n| (1..=total + 1).contains(&n)));
    assert!(snapshots.windows(2).all(|w| w[0] <= w[1]));

    let report = ctl.broadcast(Directive::MetadataUpdated).await;
    assert_eq!(report.delivered, total + 1);
}

#[tokio::test]
async fn unknown_sid_has_no_metadata() {
    let ctl = controller();
    let stranger = Sid::from(uuid::Uuid::nil());
    assert!(matches!(
        ctl.metadata(stranger),
        Err(ControllerError::MetadataNotFound { sid }) if sid == stranger
    ));
    assert_eq!(ctl.bridge_state(stranger), None);
}

#[tokio::test]
async fn same_service_registered_twice_runs_twice() {
    let ctl = controller();
    let runs = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let counted = Arc::clone(&runs);
    let svc: ServiceRef = ServiceFn::arc("twice", move |mut tunnel: ControlTunnel| {
        counted.fetch_add(1, Ordering::SeqCst);
        let tx = tx.clone();
        async move {
            let _ = tx.send(());
            tunnel.serve(|_signal| Reply::Ok).await?;
            Ok::<_, ServiceError>(())
        }
    });

    let first = ctl.register(Arc::clone(&svc)).expect("first");
    let second = ctl.register(svc).expect("second");
    assert_ne!(first, second);

    rx.recv().await.expect("first run");
    rx.recv().await.expect("second run");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(ctl.registered_count(), 3);
}

#[tokio::test]
async fn graceful_shutdown_reaches_every_service() {
    let ctl = controller();
    let mut events = ctl.subscribe();

    let mut flags = Vec::new();
    let mut sids = Vec::new();
    for name in ["db", "cache"] {
        let flag = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&flag);
        let svc: ServiceRef = ServiceFn::arc(name, move |mut tunnel: ControlTunnel| {
            let seen = Arc::clone(&seen);
            async move {
                while let Ok((signal, replier)) = tunnel.read_message().await {
                    if signal == Signal::GracefulShutdown {
                        seen.store(true, Ordering::SeqCst);
                    }
                    replier.reply(Reply::Ok).await?;
                }
                Ok::<_, ServiceError>(())
            }
        });
        sids.push(ctl.register(svc).expect("register"));
        flags.push(flag);
    }

    let report = ctl.broadcast(Directive::GracefulShutdown).await;
    assert_eq!(report.delivered, 3);
    assert!(report.is_complete());

    for sid in &sids {
        let ev = next_event(&mut events, is(EventKind::ReplyOk, *sid)).await;
        assert_eq!(ev.signal, Some(Signal::GracefulShutdown));
        assert_eq!(ev.probes, Some(0));
    }
    assert!(flags.iter().all(|f| f.load(Ordering::SeqCst)));
}

#[tokio::test]
async fn controller_answers_its_own_broadcasts() {
    let ctl = controller();
    let own = ctl.self_sid().expect("self registered");
    let mut events = ctl.subscribe();

    ctl.broadcast(Directive::MetadataUpdated).await;
    let ev = next_event(&mut events, is(EventKind::ReplyOk, own)).await;
    assert_eq!(ev.signal, Some(Signal::MetadataUpdated));
    assert_eq!(ctl.bridge_state(own), Some(BridgeState::Idle));
}

#[tokio::test(start_paused = true)]
async fn silent_service_is_declared_dead() {
    let ctl = controller();
    let mut events = ctl.subscribe();

    let mute: ServiceRef = ServiceFn::arc("mute", |mut tunnel: ControlTunnel| async move {
        let (_signal, replier) = tunnel.read_message().await?;
        drop(replier);
        std::future::pending::<()>().await;
        Ok::<_, ServiceError>(())
    });
    let sid = ctl.register(mute).expect("register");

    let start = Instant::now();
    ctl.broadcast(Directive::GracefulShutdown).await;
    let ev = next_event(&mut events, is(EventKind::DeadClient, sid)).await;

    assert!(start.elapsed() >= flowvisor::DEAD_CLIENT_TIMEOUT);
    assert_eq!(ev.reason.as_deref(), Some("timeout"));
    assert_eq!(ctl.bridge_state(sid), Some(BridgeState::Dead));
    assert_eq!(ctl.live_count(), 1);

    let report = ctl.broadcast(Directive::GracefulShutdown).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.skipped_dead, 1);
}

#[tokio::test(start_paused = true)]
async fn pending_replies_are_probed_with_status() {
    const PENDING: u32 = 3;

    let ctl = controller();
    let mut events = ctl.subscribe();
    let (tx, mut seen) = mpsc::unbounded_channel();

    let slow: ServiceRef = ServiceFn::arc("slow", move |mut tunnel: ControlTunnel| {
        let tx = tx.clone();
        async move {
            let mut left = PENDING;
            while let Ok((signal, replier)) = tunnel.read_message().await {
                let _ = tx.send(signal);
                let reply = if left > 0 {
                    left -= 1;
                    Reply::Pending
                } else {
                    Reply::Ok
                };
                replier.reply(reply).await?;
            }
            Ok::<_, ServiceError>(())
        }
    });
    let sid = ctl.register(slow).expect("register");

    let start = Instant::now();
    ctl.broadcast(Directive::GracefulShutdown).await;
    let ev = next_event(&mut events, is(EventKind::ReplyOk, sid)).await;

    assert_eq!(ev.probes, Some(PENDING));
    assert_eq!(ev.signal, Some(Signal::GracefulShutdown));
    assert!(start.elapsed() >= flowvisor::STATUS_INTERVAL * PENDING);

    let mut signals = Vec::new();
    while let Ok(signal) = seen.try_recv() {
        signals.push(signal);
    }
    assert_eq!(
        signals,
        vec![
            Signal::GracefulShutdown,
            Signal::Status,
            Signal::Status,
            Signal::Status
        ]
    );
}

#[tokio::test]
async fn two_services_acknowledge_without_dead_clients() {
    let ctl = controller();
    let mut events = ctl.subscribe();

    let (first, mut first_seen) = recording_service("first", Reply::Ok);
    let (second, mut second_seen) = recording_service("second", Reply::Ok);
    let a = ctl.register(first).expect("first");
    let b = ctl.register(second).expect("second");

    ctl.broadcast(Directive::GracefulShutdown).await;
    assert_eq!(first_seen.recv().await, Some(Signal::GracefulShutdown));
    assert_eq!(second_seen.recv().await, Some(Signal::GracefulShutdown));

    next_event(&mut events, is(EventKind::ReplyOk, a)).await;
    next_event(&mut events, is(EventKind::ReplyOk, b)).await;
    while let Ok(ev) = events.try_recv() {
        assert_ne!(ev.kind, EventKind::DeadClient);
    }
    assert_eq!(ctl.live_count(), 3);
}

#[tokio::test]
async fn wait_for_is_followed_by_continue() {
    let ctl = controller();
    let (svc, mut seen) = recording_service("paused", Reply::Ok);
    ctl.register(svc).expect("register");

    ctl.broadcast(Directive::WaitFor).await;
    assert_eq!(seen.recv().await, Some(Signal::WaitFor));
    assert_eq!(seen.recv().await, Some(Signal::Continue));
}

#[tokio::test]
async fn client_errors_are_reported_not_fatal() {
    let ctl = controller();
    let mut events = ctl.subscribe();
    let (failing, _seen_f) = recording_service("failing", Reply::Error);
    let (partial, _seen_p) = recording_service("partial", Reply::Unimplemented);
    let f = ctl.register(failing).expect("failing");
    let p = ctl.register(partial).expect("partial");

    ctl.broadcast(Directive::MetadataUpdated).await;
    let ev = next_event(&mut events, is(EventKind::ClientsideError, f)).await;
    assert_eq!(ev.reason.as_deref(), Some("clientside_error"));
    next_event(&mut events, is(EventKind::ClientsideUnimplemented, p)).await;

    assert_eq!(ctl.bridge_state(f), Some(BridgeState::Idle));
    assert_eq!(ctl.bridge_state(p), Some(BridgeState::Idle));
}

#[tokio::test]
async fn unknown_reply_code_is_reported() {
    let ctl = controller();
    let mut events = ctl.subscribe();

    let odd: ServiceRef = ServiceFn::arc("odd", |tunnel: ControlTunnel| async move {
        let mut raw = tunnel.into_raw();
        while raw.signals.recv().await.is_some() {
            if raw.replies.send(flowvisor::ReplyCode(777)).await.is_err() {
                break;
            }
        }
        Ok::<_, ServiceError>(())
    });
    let sid = ctl.register(odd).expect("register");

    ctl.broadcast(Directive::GracefulShutdown).await;
    let ev = next_event(&mut events, is(EventKind::UnknownReply, sid)).await;
    assert_eq!(ev.reply, Some(flowvisor::ReplyCode(777)));
}

#[tokio::test]
async fn register_opt_applies_overrides() {
    let ctl = controller();
    let mut events = ctl.subscribe();
    let opts = RegisterOptions::new()
        .with_name("ingest")
        .with_dead_client_timeout(Duration::from_secs(3))
        .with_max_polling(Duration::from_secs(1));

    let sid = ctl
        .register_opt(ok_service("raw-name"), opts)
        .expect("register_opt");

    let meta = ctl.metadata(sid).expect("metadata");
    assert_eq!(meta.config().dead_client_timeout, Duration::from_secs(3));
    assert_eq!(meta.config().max_polling, Some(Duration::from_secs(1)));
    assert_eq!(ctl.config().dead_client_timeout, flowvisor::DEAD_CLIENT_TIMEOUT);

    let ev = next_event(&mut events, is(EventKind::ServiceRegistered, sid)).await;
    assert_eq!(ev.service.as_deref(), Some("ingest"));
}

#[tokio::test]
async fn register_opt_default_behaves_like_register() {
    let ctl = controller();
    let sid = ctl
        .register_opt(ok_service("plain"), RegisterOptions::default())
        .expect("register_opt");
    assert_eq!(ctl.metadata(sid).expect("metadata").config(), ctl.config());
}

#[tokio::test]
async fn invalid_override_registers_nothing() {
    let ctl = controller();
    let opts = RegisterOptions::new()
        .with_dead_client_timeout(Duration::from_millis(50))
        .with_status_interval(Duration::from_millis(100));

    let err = ctl
        .register_opt(ok_service("broken"), opts)
        .expect_err("interval above timeout");
    assert!(matches!(
        err,
        ControllerError::Config(ConfigError::Invalid { .. })
    ));
    assert_eq!(ctl.registered_count(), 1);
}

#[tokio::test]
async fn foreign_config_key_is_rejected() {
    let cfg = Config {
        key: "someone-else/v3".into(),
        ..Config::default()
    };
    let err = Controller::builder(cfg)
        .with_signal_listener(false)
        .build()
        .err()
        .expect("key mismatch");
    assert!(matches!(
        err,
        ControllerError::ConfigKeyMismatch { expected, ref found }
            if expected == CONFIG_KEY && found == "someone-else/v3"
    ));
}

#[test]
fn building_outside_a_runtime_fails() {
    let err = Controller::builder(Config::default())
        .with_signal_listener(false)
        .build()
        .err()
        .expect("no runtime");
    assert!(matches!(err, ControllerError::NoRuntime));
}

#[tokio::test]
async fn update_metadata_replaces_and_notifies_only_target() {
    let ctl = controller();
    let mut events = ctl.subscribe();
    let (target, mut target_seen) = recording_service("target", Reply::Ok);
    let (bystander, mut bystander_seen) = recording_service("bystander", Reply::Ok);
    let sid = ctl.register(target).expect("target");
    let other = ctl.register(bystander).expect("bystander");

    let before = ctl.metadata(sid).expect("metadata");
    let cfg = Config {
        status_interval: Duration::from_millis(250),
        ..Config::default()
    };
    let report = ctl.update_metadata(sid, cfg).await.expect("update");
    assert_eq!(report.delivered, 1);

    assert_eq!(target_seen.recv().await, Some(Signal::MetadataUpdated));
    next_event(&mut events, is(EventKind::ReplyOk, sid)).await;
    assert!(bystander_seen.try_recv().is_err());

    let after = ctl.metadata(sid).expect("metadata");
    assert_eq!(after.config().status_interval, Duration::from_millis(250));
    assert_eq!(before.config().status_interval, flowvisor::STATUS_INTERVAL);
    assert_eq!(
        ctl.metadata(other).expect("metadata").config().status_interval,
        flowvisor::STATUS_INTERVAL
    );
}

#[tokio::test]
async fn update_metadata_for_unknown_sid_fails() {
    let ctl = controller();
    let err = ctl
        .update_metadata(Sid::from(uuid::Uuid::nil()), Config::default())
        .await
        .expect_err("unknown sid");
    assert!(matches!(err, ControllerError::MetadataNotFound { .. }));
}

#[tokio::test]
async fn services_share_the_base_context() {
    #[derive(Debug, PartialEq)]
    struct Region(&'static str);

    let ctl = Controller::builder(Config::default())
        .with_context(ServiceContext::new().with_value(Region("eu-west")))
        .with_signal_listener(false)
        .build()
        .expect("controller");
    let sid = ctl.register(ok_service("regional")).expect("register");

    let meta = ctl.metadata(sid).expect("metadata");
    assert_eq!(meta.context().get::<Region>(), Some(&Region("eu-west")));
}

#[tokio::test]
async fn failing_manager_is_reported_on_exit() {
    let ctl = controller();
    let mut events = ctl.subscribe();

    let crashy: ServiceRef = ServiceFn::arc("crashy", |_tunnel: ControlTunnel| async move {
        Err::<(), _>(ServiceError::fail("boot failed"))
    });
    let sid = ctl.register(crashy).expect("register");

    let ev = next_event(&mut events, is(EventKind::ServiceExited, sid)).await;
    assert_eq!(ev.reason.as_deref(), Some("service_failed"));
}

#[tokio::test]
async fn dropped_service_tunnel_kills_bridge_immediately() {
    let ctl = controller();
    let mut events = ctl.subscribe();

    let quitter: ServiceRef = ServiceFn::arc("quitter", |tunnel: ControlTunnel| async move {
        drop(tunnel);
        Ok::<_, ServiceError>(())
    });
    let sid = ctl.register(quitter).expect("register");
    next_event(&mut events, is(EventKind::ServiceExited, sid)).await;

    ctl.broadcast(Directive::GracefulShutdown).await;
    let ev = next_event(&mut events, is(EventKind::DeadClient, sid)).await;
    assert_eq!(ev.reason.as_deref(), Some("tunnel_closed"));
    assert_eq!(ctl.bridge_state(sid), Some(BridgeState::Dead));
}
