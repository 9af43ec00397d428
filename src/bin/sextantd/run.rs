// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

use std::fmt::Write;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use sextant::analytics::{self, Analytics};
use sextant::io::TokioIoProvider;
use sextant::server::Server;
use sextant::zone::ZoneStore;

use crate::args::RunArgs;
use crate::config;
use crate::zones::{self, PersistListener};

/// How many analytics events may wait for the sink before new ones are
/// dropped.
const ANALYTICS_QUEUE_SIZE: usize = 1024;

pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(args) {
        error!("{}", describe_error("Failed to run:", &e));
        error!("Exiting with failure.");
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(run_args: RunArgs) -> Result<()> {
    info!(
        "Sextant daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    // Get the configuration, either from the file system or from the
    // command line arguments, as appropriate.
    let (config, reload_source) = if let Some(ref config_path) = run_args.config {
        info!("Loading the configuration from {}.", config_path.display());
        let config =
            config::load_from_path(config_path).context("failed to load the configuration")?;
        (config, ReloadSource::Config(config_path.clone()))
    } else {
        info!("Loading the configuration from the command line.");
        let config =
            config::load_from_args(run_args).context("failed to load the configuration")?;
        let reload_source = ReloadSource::ZoneFile(config.zone_file.clone());
        (config, reload_source)
    };

    // Start the runtime and bind the sockets before loading the zone,
    // so that we fail fast.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the Tokio runtime")?;
    let bind = config.bind_addr();
    let io_provider = runtime
        .block_on(TokioIoProvider::bind([bind], [bind]))
        .with_context(|| format!("failed to bind sockets to {}", bind))?;

    // Load the zone.
    let zone_store = Arc::new(ZoneStore::new());
    let count = zones::load(&zone_store, &config.zone_file).context("failed to load the zone")?;
    info!("Loaded {} records from {}.", count, config.zone_file.display());
    zone_store.set_listener(Some(Arc::new(PersistListener::new(
        config.zone_file.clone(),
    ))));

    // Set up the server and the analytics sink.
    let mut server = Server::new(zone_store);
    server.set_transfer_config(config.transfer_config());
    let (analytics, receiver) = Analytics::channel(ANALYTICS_QUEUE_SIZE);
    let sink = analytics::spawn_sink(receiver, config.analytics_file.clone())
        .context("failed to start the analytics sink")?;
    server.set_analytics(analytics);

    // Set up signal handling.
    let mut signals = set_up_signal_handling().context("failed to set up signal handling")?;

    // Start the I/O provider.
    info!("Set-up is complete; serving on {}.", bind);
    let server = Arc::new(server);
    let shutdown_controller = {
        let _guard = runtime.enter();
        io_provider.start(&server)
    };

    // Process incoming signals.
    for signal in signals.forever() {
        match signal {
            SIGINT => {
                info!("Received SIGINT; shutting down.");
                break;
            }
            SIGTERM => {
                info!("Received SIGTERM; shutting down.");
                break;
            }
            SIGHUP => {
                info!("Received SIGHUP; reloading the zone.");
                if let Err(e) = reload(&reload_source, &server) {
                    error!("{}", describe_error("Failed to reload:", &e));
                }
            }
            _ => (),
        }
    }

    // Shut down the server. Once the server is gone, so is the last
    // analytics handle, and the sink drains and exits.
    shutdown_controller.blocking_shut_down();
    runtime.shutdown_timeout(Duration::from_secs(1));
    drop(server);
    if sink.join().is_err() {
        error!("The analytics sink panicked.");
    }
    info!("Shutdown complete.");
    Ok(())
}

fn set_up_signal_handling() -> Result<Signals> {
    let all_signals = &[SIGHUP, SIGINT, SIGTERM];
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // This sets up signal handlers to exit immediately if a second
    // termination signal arrives before the process finishes shutting
    // down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    Signals::new(all_signals).map_err(Into::into)
}

/// Where a reload gets its settings from.
enum ReloadSource {
    /// The zone file named on the command line. The other settings
    /// stay as they are.
    ZoneFile(PathBuf),

    /// The configuration file, which is read again in full.
    Config(PathBuf),
}

/// Replaces the zone content (and, when running from a configuration
/// file, the zone-transfer settings). On failure, nothing changes.
fn reload(source: &ReloadSource, server: &Server) -> Result<()> {
    let (zone_file, transfer_config) = match source {
        ReloadSource::ZoneFile(path) => (path.clone(), None),
        ReloadSource::Config(path) => {
            let config =
                config::load_from_path(path).context("failed to reload the configuration")?;
            let transfer_config = config.transfer_config();
            (config.zone_file, Some(transfer_config))
        }
    };

    let records = zones::read(&zone_file).context("failed to reload the zone")?;
    let count = records.len();
    let store = server.zones();
    store.set_listener(Some(Arc::new(PersistListener::new(zone_file.clone()))));
    store.load(records);
    if let Some(transfer_config) = transfer_config {
        server.set_transfer_config(transfer_config);
    }
    info!("Reloaded {} records from {}.", count, zone_file.display());
    Ok(())
}

/// Formats an error and its causes as a numbered list under `heading`.
fn describe_error(heading: &str, e: &anyhow::Error) -> String {
    let mut message = String::from(heading);
    for (i, cause) in e.chain().enumerate() {
        let _ = write!(message, "\n[{}] {}", i + 1, cause);
    }
    message
}
