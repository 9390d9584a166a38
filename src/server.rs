//! Small HTTP surface over the synchronized lists.

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
	extract::State,
	http::StatusCode,
	routing::get,
	Json, Router,
};
use color_eyre::eyre;
use tracing::info;

use crate::sync::{ListResource, ListSynchronizer, Probes, Slos, Snapshot, Tasks};

pub struct AppState {
	pub probes: Arc<ListSynchronizer<Probes>>,
	pub tasks: Arc<ListSynchronizer<Tasks>>,
	pub slos: Arc<ListSynchronizer<Slos>>,
}

async fn health_handler() -> &'static str {
	"ok"
}

/// Ready once every list has been loaded at least once.
async fn ready_handler(State(app_state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
	let ready = app_state.probes.has_loaded().await
		&& app_state.tasks.has_loaded().await
		&& app_state.slos.has_loaded().await;
	if ready {
		(StatusCode::OK, "ready")
	} else {
		(StatusCode::SERVICE_UNAVAILABLE, "loading")
	}
}

async fn snapshot_of<S: ListResource>(sync: &ListSynchronizer<S>) -> Json<Snapshot<S::Row>> {
	Json(sync.snapshot().await)
}

async fn probes_handler(
	State(app_state): State<Arc<AppState>>,
) -> Json<Snapshot<<Probes as ListResource>::Row>> {
	snapshot_of(&app_state.probes).await
}

async fn tasks_handler(
	State(app_state): State<Arc<AppState>>,
) -> Json<Snapshot<<Tasks as ListResource>::Row>> {
	snapshot_of(&app_state.tasks).await
}

async fn slos_handler(
	State(app_state): State<Arc<AppState>>,
) -> Json<Snapshot<<Slos as ListResource>::Row>> {
	snapshot_of(&app_state.slos).await
}

pub fn router(app_state: Arc<AppState>) -> Router {
	Router::new()
		.route("/health", get(health_handler))
		.route("/ready", get(ready_handler))
		.route("/snapshot/probes", get(probes_handler))
		.route("/snapshot/tasks", get(tasks_handler))
		.route("/snapshot/slos", get(slos_handler))
		.with_state(app_state)
}

pub async fn serve(
	listen: SocketAddr,
	app_state: Arc<AppState>,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> eyre::Result<()> {
	let listener = tokio::net::TcpListener::bind(listen).await?;
	info!(%listen, "serving list snapshots");
	axum::serve(listener, router(app_state))
		.with_graceful_shutdown(shutdown)
		.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use serde_json::{json, Value};
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	use super::*;
	use crate::{backend, config::Config, notify::LogNotifier, sync::SyncSettings};

	async fn app_state(server: &MockServer) -> Arc<AppState> {
		let config = Config {
			base_url: server.uri(),
			..Config::default()
		};
		let client = Arc::new(backend::new(&config).unwrap());
		let notifier: crate::notify::SharedNotifier = Arc::new(LogNotifier);
		let settings = SyncSettings::from(&config);
		Arc::new(AppState {
			probes: Arc::new(ListSynchronizer::new(client.clone(), notifier.clone(), settings.clone())),
			tasks: Arc::new(ListSynchronizer::new(client.clone(), notifier.clone(), settings.clone())),
			slos: Arc::new(ListSynchronizer::new(client, notifier, settings)),
		})
	}

	async fn get_json(app: Router, uri: &str) -> (StatusCode, Option<Value>) {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
		let response = reqwest::get(format!("http://{addr}{uri}")).await.unwrap();
		let status = response.status();
		(status, response.json().await.ok())
	}

	#[tokio::test]
	async fn ready_only_after_every_list_loaded() {
		let server = MockServer::start().await;
		for list in ["probes", "tasks", "sli"] {
			Mock::given(method("GET"))
				.and(path(format!("/api/{list}")))
				.respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [], "total": 0})))
				.mount(&server)
				.await;
		}
		let state = app_state(&server).await;

		let (status, _) = get_json(router(state.clone()), "/ready").await;
		assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

		state.probes.fetch().await.unwrap();
		state.tasks.fetch().await.unwrap();
		state.slos.fetch().await.unwrap();
		let (status, _) = get_json(router(state), "/ready").await;
		assert_eq!(status, StatusCode::OK);
	}

	#[tokio::test]
	async fn snapshot_serves_visible_rows() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/probes"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"data": [{"id": 1, "name": "web", "type": "URL", "target": "https://example.com"}],
				"total": 40
			})))
			.mount(&server)
			.await;
		let state = app_state(&server).await;
		state.probes.fetch().await.unwrap();

		let (status, body) = get_json(router(state), "/snapshot/probes").await;
		assert_eq!(status, StatusCode::OK);
		let body = body.unwrap();
		assert_eq!(body["total"], 40);
		assert_eq!(body["loading"], false);
		assert_eq!(body["rows"][0]["name"], "web");
	}
}
