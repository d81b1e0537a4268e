//! # Example: Basic Services
//!
//! Registers two services, pauses and resumes them, then shuts them down
//! on Ctrl-C (or after a few seconds if nobody presses it).
//!
//! ```text
//! cargo run --example basic_services
//! ```

use std::time::Duration;

use flowvisor::{
    Config, ControlTunnel, Controller, Directive, EventKind, Reply, ServiceError, ServiceFn,
    ServiceRef, Signal,
};

/// Service that logs every signal and acknowledges it.
fn make_service(name: &'static str) -> ServiceRef {
    ServiceFn::arc(name, move |mut tunnel: ControlTunnel| async move {
        while let Ok((signal, replier)) = tunnel.read_message().await {
            let reply = match signal {
                Signal::GracefulShutdown => {
                    println!("[{name}] flushing before shutdown");
                    Reply::Ok
                }
                Signal::WaitFor => {
                    println!("[{name}] pausing intake");
                    Reply::Ok
                }
                Signal::Continue => {
                    println!("[{name}] resuming intake");
                    Reply::Ok
                }
                Signal::MetadataUpdated | Signal::Status => Reply::Unimplemented,
            };
            replier.reply(reply).await?;
        }
        Ok::<_, ServiceError>(())
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // The built-in listener broadcasts GracefulShutdown on SIGINT/SIGTERM.
    let controller = Controller::new(Config::from_env()?)?;
    let mut events = controller.subscribe();

    let db = controller.register(make_service("db"))?;
    let cache = controller.register(make_service("cache"))?;
    println!("[main] registered db={db} cache={cache}");

    let report = controller.broadcast(Directive::WaitFor).await;
    println!("[main] wait-for delivered to {} bridges", report.delivered);

    tokio::select! {
        res = flowvisor::wait_for_termination() => res?,
        _ = tokio::time::sleep(Duration::from_secs(3)) => {
            controller.broadcast(Directive::GracefulShutdown).await;
        }
    }

    // Let the bridges report the shutdown replies.
    let drain = async {
        while let Ok(ev) = events.recv().await {
            if ev.kind == EventKind::ReplyOk && ev.signal == Some(Signal::GracefulShutdown) {
                println!("[main] {} acknowledged shutdown", ev.service.as_deref().unwrap_or("?"));
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_millis(500), drain).await;
    Ok(())
}
