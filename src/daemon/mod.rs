mod api;

use anyhow::{Context, Result};
use colored::Colorize;
use macros_rs::crashln;
use std::{fs, process, sync::Arc, time::Duration};

use botpanel::{
    config::structs::Config,
    control::Control,
    helpers, log, oplog,
    panel::Panel,
    process::{dump::Registry, Supervisor},
};

/// How often exited children are reaped
const REAP_INTERVAL: Duration = Duration::from_secs(10);

pub fn serve(config: Config) {
    if let Err(err) = config.credentials() {
        crashln!("{} {err}", *helpers::FAIL);
    }

    for dir in [&config.paths.uploads, &config.paths.logs] {
        if let Err(err) = fs::create_dir_all(dir) {
            crashln!("{} Cannot create {}: {err}", *helpers::FAIL, dir.display());
        }
    }

    oplog::init(&config.paths.panel_log);
    log!("[daemon] starting", "pid" => process::id());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => crashln!("{} Failed to create tokio runtime: {err}", *helpers::FAIL),
    };

    if let Err(err) = runtime.block_on(run(config)) {
        log!("[daemon] stopped with error", "error" => format!("{err:#}"));
        crashln!("{} {err:#}", *helpers::FAIL);
    }

    log!("[daemon] stopped");
}

async fn run(config: Config) -> Result<()> {
    let registry = Registry::load(&config.paths.registry);
    let supervisor = Supervisor::new(&config.paths.logs, &config.runner);
    let panel = Arc::new(Panel::new(registry, supervisor));

    restore(&panel);

    let control = Arc::new(Control::new(&config, Arc::clone(&panel)).context("failed to set up the chat panel")?);
    tokio::spawn(control.run());
    tokio::spawn(reap_zombie_processes(Arc::clone(&panel)));

    println!("{} Health endpoint on {}:{}", *helpers::SUCCESS, config.web.address, config.web.port);
    api::start(panel, &config.web).await
}

/// Relaunch what the registry recorded before the chat panel starts
/// accepting operations
fn restore(panel: &Panel) {
    match panel.reconcile() {
        Ok(report) => {
            for (name, pid) in report.relaunched() {
                println!("{} Restarted {name} (pid={pid})", *helpers::SUCCESS);
            }
            for name in report.dropped() {
                println!("{} Missing file for {name}, removed", *helpers::WARN);
            }
            for (name, err) in report.failed() {
                println!("{} Failed to restart {name}: {err}", *helpers::FAIL);
            }
            if report.outcomes.is_empty() {
                println!("{} {}", *helpers::INFO, "No saved programs to restart".white());
            }
        }
        // processes were relaunched; only persisting their new ids failed
        Err(err) => println!("{} Restored programs but could not save the registry: {err}", *helpers::WARN),
    }
}

async fn reap_zombie_processes(panel: Arc<Panel>) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    loop {
        interval.tick().await;
        let reaped = panel.reap();
        if reaped > 0 {
            ::log::debug!("[daemon] reaped {reaped} exited children");
        }
    }
}
