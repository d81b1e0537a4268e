//! Termination signals sent to this test process.
//!
//! Lives in its own test binary: signals hit the whole process.
#![cfg(unix)]

use std::process::Command;
use std::time::Duration;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use flowvisor::{
    Config, ControlTunnel, Controller, Event, EventKind, Reply, ServiceError, ServiceFn,
    ServiceRef, Signal,
};

const WAIT: Duration = Duration::from_secs(5);

fn send_sigterm() {
    let status = Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .expect("run kill");
    assert!(status.success());
}

async fn next_shutdown_request(events: &mut broadcast::Receiver<Event>) -> Option<Event> {
    loop {
        match events.recv().await {
            Ok(ev) if ev.kind == EventKind::ShutdownRequested => return Some(ev),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_sigterm_broadcasts_graceful_shutdown() {
    // Keeps the process alive should a signal arrive before the listener registers.
    let mut guard = signal(SignalKind::terminate()).expect("sigterm handler");

    let ctl = Controller::new(Config::default()).expect("controller");
    let mut events = ctl.subscribe();

    let (tx, mut seen) = mpsc::unbounded_channel();
    let svc: ServiceRef = ServiceFn::arc("watcher", move |mut tunnel: ControlTunnel| {
        let tx = tx.clone();
        async move {
            while let Ok((signal, replier)) = tunnel.read_message().await {
                let _ = tx.send(signal);
                replier.reply(Reply::Ok).await?;
            }
            Ok::<_, ServiceError>(())
        }
    });
    ctl.register(svc).expect("register");

    // Let the listener task install its handlers.
    tokio::time::sleep(Duration::from_millis(200)).await;

    for round in 1..=2 {
        send_sigterm();
        timeout(WAIT, guard.recv()).await.expect("sigterm delivered");

        let ev = timeout(WAIT, next_shutdown_request(&mut events))
            .await
            .expect("shutdown requested")
            .expect("bus open");
        assert_eq!(ev.reason.as_deref(), Some("SIGTERM"), "round {round}");

        let got = timeout(WAIT, seen.recv()).await.expect("delivery");
        assert_eq!(got, Some(Signal::GracefulShutdown), "round {round}");
    }
    assert!(seen.try_recv().is_err());

    ctl.stop_signal_listener();
    tokio::time::sleep(Duration::from_millis(50)).await;
    send_sigterm();
    timeout(WAIT, guard.recv()).await.expect("sigterm delivered");

    assert!(
        timeout(Duration::from_millis(300), next_shutdown_request(&mut events))
            .await
            .is_err()
    );
    assert!(seen.try_recv().is_err());
}
