//! Keeps one paginated remote list in sync and mediates its row actions.
//!
//! Every fetch is numbered. A response is only applied if no newer one has
//! been applied already, and only the newest request may clear the table
//! when the watchdog fires.

use std::{
	future::Future,
	marker::PhantomData,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};

use reqwest::Method;
use serde::Serialize;
use tokio::{sync::RwLock, time::MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::{
	backend::{
		api_types::{FilterModel, ListPage, SortModel},
		Client,
	},
	config::Config,
	error::{Error, Result},
	notify::{Notification, SharedNotifier},
	state::{selection_channel, Expectation, RefetchListener, SelectionReader, SelectionWriter},
};

pub mod dialog;
pub mod resource;
pub mod search;

pub use dialog::{ConfirmDialog, RowAction};
pub use resource::{ListResource, ListRow, Probes, Slos, Tasks};
use search::Matcher;

/// Where the grid's filter model is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
	#[default]
	Server,
	/// The filter model is not sent; the search text narrows the loaded rows
	Client,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
	pub page: u32,
	pub page_size: u32,
	pub sort: Option<SortModel>,
	pub filter: FilterModel,
	pub mode: FilterMode,
	pub search: String,
}

impl ListQuery {
	pub fn new(page_size: u32) -> Self {
		Self {
			page: 0,
			page_size,
			sort: None,
			filter: FilterModel::default(),
			mode: FilterMode::default(),
			search: String::new(),
		}
	}

	fn params(&self) -> Result<Vec<(&'static str, String)>> {
		let mut params = vec![
			("skip", (u64::from(self.page) * u64::from(self.page_size)).to_string()),
			("limit", self.page_size.to_string()),
		];
		if let Some(sort) = &self.sort {
			let direction = serde_json::to_value(sort.sort)?;
			params.push(("sort", direction.as_str().unwrap_or("asc").to_string()));
			params.push(("column", sort.field.clone()));
		}
		if self.mode == FilterMode::Server && !self.filter.is_empty() {
			params.push(("filter", serde_json::to_string(&self.filter)?));
		}
		Ok(params)
	}
}

/// Timings a synchronizer runs with.
#[derive(Debug, Clone)]
pub struct SyncSettings {
	pub watchdog: Duration,
	pub refresh_interval: Duration,
	pub refetch_attempts: u32,
	pub refetch_backoff: Duration,
	pub page_size: u32,
}

impl From<&Config> for SyncSettings {
	fn from(config: &Config) -> Self {
		Self {
			watchdog: config.watchdog,
			refresh_interval: config.refresh_interval,
			refetch_attempts: config.refetch_attempts.max(1),
			refetch_backoff: config.refetch_backoff,
			page_size: config.page_size,
		}
	}
}

/// What a list view renders: the visible rows and the count shown under them.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<R> {
	pub rows: Vec<R>,
	pub total: u64,
	pub loading: bool,
}

#[derive(Debug)]
struct ListState<R> {
	rows: Vec<R>,
	total: u64,
	loading: bool,
	loaded: bool,
	newest_issued: u64,
	newest_applied: u64,
	query: ListQuery,
}

pub struct ListSynchronizer<S: ListResource> {
	client: Arc<Client>,
	notifier: SharedNotifier,
	settings: SyncSettings,
	state: RwLock<ListState<S::Row>>,
	sequence: AtomicU64,
	selection: SelectionWriter,
	_resource: PhantomData<S>,
}

impl<S: ListResource> ListSynchronizer<S> {
	pub fn new(client: Arc<Client>, notifier: SharedNotifier, settings: SyncSettings) -> Self {
		let (selection, _) = selection_channel();
		let query = ListQuery::new(settings.page_size);
		Self {
			client,
			notifier,
			settings,
			state: RwLock::new(ListState {
				rows: Vec::new(),
				total: 0,
				loading: false,
				loaded: false,
				newest_issued: 0,
				newest_applied: 0,
				query,
			}),
			sequence: AtomicU64::new(0),
			selection,
			_resource: PhantomData,
		}
	}

	/// Loads the current page. Failures are notified here and returned for the caller's bookkeeping.
	#[instrument(skip(self), fields(resource = S::NAME))]
	pub async fn fetch(&self) -> Result<()> {
		let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
		let params = {
			let mut state = self.state.write().await;
			state.loading = true;
			state.newest_issued = seq;
			state.query.params()?
		};

		let outcome = tokio::time::timeout(
			self.settings.watchdog,
			self.client.get_json::<ListPage<S::Row>>(S::PATH, &params),
		)
		.await;

		let mut state = self.state.write().await;
		let is_newest = seq == state.newest_issued;
		match outcome {
			Ok(Ok(page)) => {
				if seq < state.newest_applied {
					debug!(seq, newest = state.newest_applied, "discarding stale list response");
					return Ok(());
				}
				state.newest_applied = seq;
				state.total = page.total.unwrap_or(page.data.len() as u64);
				state.rows = page.data;
				state.loaded = true;
				if is_newest {
					state.loading = false;
				}
				debug!(rows = state.rows.len(), total = state.total, "list updated");
				Ok(())
			},
			Ok(Err(e)) => {
				if is_newest {
					state.loading = false;
				}
				drop(state);
				warn!(error = %e, "list fetch failed");
				self.notifier
					.notify(Notification::error(format!("Could not load {}: {e}", S::NAME)));
				Err(e)
			},
			Err(_elapsed) => {
				if is_newest {
					// an empty table, not a stale one behind a spinner
					state.rows.clear();
					state.total = 0;
					state.loading = false;
				}
				drop(state);
				let e = Error::Watchdog {
					path: S::PATH.to_string(),
					after: self.settings.watchdog,
				};
				warn!(error = %e, "list fetch timed out");
				self.notifier
					.notify(Notification::error(format!("Loading {} timed out", S::NAME)));
				Err(e)
			},
		}
	}

	pub async fn set_page(&self, page: u32, page_size: u32) -> Result<()> {
		{
			let mut state = self.state.write().await;
			state.query.page = page;
			state.query.page_size = page_size.max(1);
		}
		self.fetch().await
	}

	pub async fn set_sort(&self, sort: Option<SortModel>) -> Result<()> {
		self.state.write().await.query.sort = sort;
		self.fetch().await
	}

	/// Replaces the grid filter. Only server mode refetches.
	pub async fn set_filter(&self, filter: FilterModel) -> Result<()> {
		let mode = {
			let mut state = self.state.write().await;
			state.query.filter = filter;
			state.query.mode
		};
		match mode {
			FilterMode::Server => self.fetch().await,
			FilterMode::Client => Ok(()),
		}
	}

	pub async fn set_filter_mode(&self, mode: FilterMode) -> Result<()> {
		let changed = {
			let mut state = self.state.write().await;
			let changed = state.query.mode != mode;
			state.query.mode = mode;
			changed && !state.query.filter.is_empty()
		};
		if changed {
			self.fetch().await
		} else {
			Ok(())
		}
	}

	/// Client-side search text. Never touches the loaded rows.
	pub async fn set_search(&self, search: impl Into<String>) {
		self.state.write().await.query.search = search.into();
	}

	pub async fn query(&self) -> ListQuery {
		self.state.read().await.query.clone()
	}

	/// Rows and count as displayed, with the client-side search applied.
	pub async fn snapshot(&self) -> Snapshot<S::Row> {
		let state = self.state.read().await;
		let matcher = match state.query.mode {
			FilterMode::Client => Matcher::parse(&state.query.search),
			FilterMode::Server => None,
		};
		match matcher {
			Some(matcher) => {
				let rows: Vec<_> = state
					.rows
					.iter()
					.filter(|row| matcher.matches(&row.search_fields()))
					.cloned()
					.collect();
				Snapshot {
					total: rows.len() as u64,
					rows,
					loading: state.loading,
				}
			},
			None => Snapshot {
				rows: state.rows.clone(),
				total: state.total,
				loading: state.loading,
			},
		}
	}

	/// Whether any fetch has completed yet.
	pub async fn has_loaded(&self) -> bool {
		self.state.read().await.loaded
	}

	pub fn selection(&self) -> SelectionReader {
		self.selection.reader()
	}

	pub fn select(&self, ids: impl IntoIterator<Item = String>) {
		self.selection.set(ids);
	}

	pub fn toggle_selected(&self, id: &str) {
		self.selection.toggle(id);
	}

	/// Binds a confirmation dialog to one loaded row.
	pub async fn open_dialog(&self, action: RowAction, row_id: &str) -> Result<ConfirmDialog> {
		if !S::ACTIONS.contains(&action) {
			return Err(Error::UnsupportedAction {
				action: action.name(),
				resource: S::NAME,
			});
		}
		let state = self.state.read().await;
		let row = state
			.rows
			.iter()
			.find(|row| row.row_id() == row_id)
			.ok_or_else(|| Error::UnknownRow(row_id.to_string()))?;
		Ok(ConfirmDialog::new(
			action,
			row.row_id(),
			row.row_name().to_string(),
			row.status(),
			row.prompts(),
		))
	}

	/// Sends the dialog's action. Local state changes only after a 2xx.
	#[instrument(skip(self, dialog), fields(resource = S::NAME, action = dialog.action.name(), row = %dialog.row_id))]
	pub async fn confirm(&self, dialog: &ConfirmDialog) -> Result<()> {
		let (method, path) = dialog.endpoint(S::PATH);
		let sent = match dialog.action {
			RowAction::Run => {
				self.client
					.send_json(method, &path, &dialog.run_request())
					.await
			},
			_ => self.client.send_empty(method, &path).await,
		};
		if let Err(e) = sent {
			warn!(error = %e, "row action failed");
			self.notifier.notify(Notification::error(format!(
				"{} of {} failed: {e}",
				dialog.label, dialog.row_name
			)));
			return Err(e);
		}

		match dialog.action {
			RowAction::Toggle => {
				if let Some(status) = dialog.target_status {
					let mut state = self.state.write().await;
					if let Some(row) = state.rows.iter_mut().find(|row| row.row_id() == dialog.row_id) {
						row.set_status(status);
					}
				}
				self.notifier
					.notify(Notification::success(format!("{} {}d", dialog.row_name, dialog.label.to_lowercase())));
			},
			RowAction::Delete => {
				{
					let mut state = self.state.write().await;
					let before = state.rows.len();
					state.rows.retain(|row| row.row_id() != dialog.row_id);
					if state.rows.len() < before {
						state.total = state.total.saturating_sub(1);
					}
				}
				self.selection.forget(&dialog.row_id);
				self.notifier
					.notify(Notification::success(format!("{} deleted", dialog.row_name)));
			},
			RowAction::Run | RowAction::Schedule => {
				self.notifier.notify(Notification::info(format!(
					"{} requested for {}",
					dialog.label, dialog.row_name
				)));
			},
		}
		info!("row action applied");
		Ok(())
	}

	async fn holds(&self, expectation: &Expectation) -> bool {
		let state = self.state.read().await;
		match expectation {
			Expectation::Present(key) => state
				.rows
				.iter()
				.any(|row| row.row_id() == *key || row.row_name() == key.as_str()),
		}
	}

	/// Refetches until `expect` holds or the attempts run out.
	#[instrument(skip(self), fields(resource = S::NAME))]
	pub async fn refetch_until(&self, expect: Option<Expectation>) {
		let attempts = self.settings.refetch_attempts.max(1);
		for attempt in 1..=attempts {
			if self.fetch().await.is_ok() {
				match &expect {
					None => return,
					Some(expectation) if self.holds(expectation).await => {
						debug!(attempt, "expectation observed");
						return;
					},
					Some(_) => {},
				}
			}
			if attempt < attempts {
				tokio::time::sleep(self.settings.refetch_backoff).await;
			}
		}
		debug!(attempts, "gave up waiting for expected list state");
	}

	/// Drives passive refresh and refetch signals until `shutdown` resolves.
	/// The first tick loads the list immediately.
	pub async fn run(self: Arc<Self>, mut refetch: RefetchListener, shutdown: impl Future<Output = ()>) {
		let mut ticker = tokio::time::interval(self.settings.refresh_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		tokio::pin!(shutdown);
		let mut listening = true;
		info!(resource = S::NAME, "list synchronizer started");
		loop {
			tokio::select! {
				() = &mut shutdown => break,
				_ = ticker.tick() => {
					let _ = self.fetch().await;
				},
				signal = refetch.changed(), if listening => match signal {
					Some(signal) => {
						self.refetch_until(signal.expect).await;
						ticker.reset();
					},
					None => listening = false,
				},
			}
		}
		info!(resource = S::NAME, "list synchronizer stopped");
	}
}

impl ListSynchronizer<Tasks> {
	/// Asks the backend to re-register task definitions. Only notifies.
	#[instrument(skip(self))]
	pub async fn register(&self) -> Result<()> {
		let path = format!("{}/register", Tasks::PATH);
		match self.client.send_empty(Method::POST, &path).await {
			Ok(_) => {
				self.notifier
					.notify(Notification::info("Task registration requested"));
				Ok(())
			},
			Err(e) => {
				warn!(error = %e, "task registration failed");
				self.notifier
					.notify(Notification::error(format!("Task registration failed: {e}")));
				Err(e)
			},
		}
	}
}
