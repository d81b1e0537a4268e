//! # Example: Pending Status
//!
//! A slow service answers `Pending` while it drains; the bridge keeps probing
//! it with `Status` until it finally answers `Ok`. A second service never
//! answers and is declared dead after its (shortened) dead-client timeout.
//!
//! ```text
//! FLOWVISOR_LOG=flowvisor=debug cargo run --example pending_status --features logging
//! ```

use std::time::Duration;

use flowvisor::{
    Config, ControlTunnel, Controller, Directive, EventKind, RegisterOptions, Reply, ServiceError,
    ServiceFn, ServiceRef,
};

fn make_draining(steps: u32) -> ServiceRef {
    ServiceFn::arc("draining", move |mut tunnel: ControlTunnel| async move {
        let mut left = steps;
        while let Ok((signal, replier)) = tunnel.read_message().await {
            let reply = if left > 0 {
                println!("[draining] {signal}: {left} batches left");
                left -= 1;
                Reply::Pending
            } else {
                println!("[draining] {signal}: done");
                Reply::Ok
            };
            replier.reply(reply).await?;
        }
        Ok::<_, ServiceError>(())
    })
}

fn make_mute() -> ServiceRef {
    ServiceFn::arc("mute", |mut tunnel: ControlTunnel| async move {
        // Read once and never answer.
        let (_signal, _replier) = tunnel.read_message().await?;
        std::future::pending::<()>().await;
        Ok::<_, ServiceError>(())
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    flowvisor::logging::init(&cfg.log)?;

    let controller = Controller::builder(cfg)
        .with_signal_listener(false)
        .build()?;
    let mut events = controller.subscribe();

    controller.register(make_draining(5))?;
    controller.register_opt(
        make_mute(),
        RegisterOptions::new().with_dead_client_timeout(Duration::from_secs(1)),
    )?;

    controller.broadcast(Directive::GracefulShutdown).await;

    let mut outstanding = 2;
    while outstanding > 0 {
        let ev = events.recv().await?;
        let service = ev.service.as_deref().unwrap_or("?");
        match ev.kind {
            EventKind::StatusProbed => println!("[main] probe #{:?} -> {service}", ev.probes),
            EventKind::ReplyOk if service == "draining" => {
                println!("[main] {service} finished after {:?} probes", ev.probes);
                outstanding -= 1;
            }
            EventKind::DeadClient => {
                println!("[main] {service} declared dead ({:?})", ev.reason);
                outstanding -= 1;
            }
            _ => {}
        }
    }

    println!(
        "[main] live bridges: {}/{}",
        controller.live_count(),
        controller.registered_count()
    );
    Ok(())
}
