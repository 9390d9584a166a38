use std::sync::Arc;

use color_eyre::eyre;
use tokio::{signal, sync::watch, task::JoinSet};
use tracing::{info, warn};

use opsdash::{
	backend, config, logging,
	notify::{LogNotifier, SharedNotifier},
	server::{self, AppState},
	state::{refetch_channel, RefetchTrigger},
	sync::{ListResource, ListSynchronizer, SyncSettings},
};

/// Resolves once the shutdown flag flips.
async fn stopped(mut shutdown: watch::Receiver<bool>) {
	// a dropped sender also counts as stopped
	let _ = shutdown.wait_for(|stop| *stop).await;
}

fn spawn_synchronizer<S: ListResource>(
	tasks: &mut JoinSet<()>,
	sync: &Arc<ListSynchronizer<S>>,
	trigger: &RefetchTrigger,
	shutdown: &watch::Receiver<bool>,
) {
	tasks.spawn(Arc::clone(sync).run(trigger.listener(), stopped(shutdown.clone())));
}

#[cfg(unix)]
async fn reload_signal() -> eyre::Result<()> {
	signal::unix::signal(signal::unix::SignalKind::hangup())?
		.recv()
		.await;
	Ok(())
}

#[cfg(not(unix))]
async fn reload_signal() -> eyre::Result<()> {
	std::future::pending().await
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
	color_eyre::install()?;
	logging::init();

	let config = config::new()?;
	info!(base_url = %config.base_url, auth_reads = config.auth_reads, "starting opsdash");

	let client = Arc::new(backend::new(&config)?);
	let notifier: SharedNotifier = Arc::new(LogNotifier);
	let settings = SyncSettings::from(&config);

	let app_state = Arc::new(AppState {
		probes: Arc::new(ListSynchronizer::new(client.clone(), notifier.clone(), settings.clone())),
		tasks: Arc::new(ListSynchronizer::new(client.clone(), notifier.clone(), settings.clone())),
		slos: Arc::new(ListSynchronizer::new(client, notifier, settings)),
	});

	// one trigger per list so an expectation is only polled where it can hold
	let (probe_trigger, _) = refetch_channel();
	let (task_trigger, _) = refetch_channel();
	let (slo_trigger, _) = refetch_channel();

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let mut tasks = JoinSet::new();
	spawn_synchronizer(&mut tasks, &app_state.probes, &probe_trigger, &shutdown_rx);
	spawn_synchronizer(&mut tasks, &app_state.tasks, &task_trigger, &shutdown_rx);
	spawn_synchronizer(&mut tasks, &app_state.slos, &slo_trigger, &shutdown_rx);

	let server = tokio::spawn(server::serve(
		config.listen,
		app_state,
		stopped(shutdown_rx.clone()),
	));

	loop {
		tokio::select! {
			result = signal::ctrl_c() => {
				result?;
				info!("shutdown requested");
				break;
			},
			result = reload_signal() => {
				match result {
					Ok(()) => {
						info!("reload requested, refetching every list");
						for trigger in [&probe_trigger, &task_trigger, &slo_trigger] {
							trigger.request(None);
						}
					},
					Err(e) => {
						warn!(error = %e, "cannot listen for reload signals");
						break;
					},
				}
			},
		}
	}

	shutdown_tx.send_replace(true);
	while let Some(joined) = tasks.join_next().await {
		if let Err(e) = joined {
			warn!(error = %e, "list synchronizer ended abnormally");
		}
	}
	server.await??;
	Ok(())
}
