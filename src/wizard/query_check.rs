//! Live checking of SLO good/total queries while they are typed.
//!
//! Input is debounced; once the user has been idle for the configured delay the
//! query is posted to the backend and the result becomes a [`QueryHint`]. The
//! hint only colours the field. It never blocks submission.

use std::{sync::Arc, time::Duration};

use reqwest::Method;
use serde_json::Value;
use tokio::{
	sync::{mpsc, watch},
	task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
	backend::{self, api_types::QueryCheckRequest},
	config::Config,
};

const QUERY_PATH: &str = "api/query";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryHint {
	Idle,
	Pending,
	Results(usize),
	Empty,
	Error(String),
}

fn array_len(value: &Value) -> Option<usize> {
	value.as_array().map(Vec::len)
}

/// Reads result cardinality out of the shapes the query endpoint is known to return.
pub fn hint_from_response(value: &Value) -> QueryHint {
	let count = array_len(value)
		.or_else(|| value.get("data").and_then(array_len))
		.or_else(|| value.pointer("/data/result").and_then(array_len))
		.or_else(|| value.get("result").and_then(array_len))
		.or_else(|| value.get("results").and_then(array_len))
		.or_else(|| value.get("rows").and_then(array_len));
	match count {
		Some(0) => QueryHint::Empty,
		Some(n) => QueryHint::Results(n),
		None => match value.get("error") {
			Some(Value::String(message)) => QueryHint::Error(message.clone()),
			Some(other) => QueryHint::Error(other.to_string()),
			None => QueryHint::Error("unrecognized response".into()),
		},
	}
}

pub async fn check(client: &backend::Client, request: &QueryCheckRequest) -> QueryHint {
	let response = match client.send_json(Method::POST, QUERY_PATH, request).await {
		Ok(response) => response,
		Err(e) => {
			warn!(error = %e, "query check failed");
			return QueryHint::Error(e.to_string());
		},
	};
	match backend::decode::<Value>(QUERY_PATH, response).await {
		Ok(body) => hint_from_response(&body),
		Err(e) => QueryHint::Error(e.to_string()),
	}
}

/// Background debouncer for one query field.
pub struct QueryChecker {
	input: mpsc::UnboundedSender<Option<QueryCheckRequest>>,
	hints: watch::Receiver<QueryHint>,
	task: JoinHandle<()>,
}

impl QueryChecker {
	/// Spawns a checker that waits `query_debounce` of idle input.
	pub fn from_config(client: Arc<backend::Client>, config: &Config) -> Self {
		Self::spawn(client, config.query_debounce)
	}

	pub fn spawn(client: Arc<backend::Client>, debounce: Duration) -> Self {
		let (input, mut inputs) = mpsc::unbounded_channel::<Option<QueryCheckRequest>>();
		let (hint_tx, hints) = watch::channel(QueryHint::Idle);

		let task = tokio::spawn(async move {
			let mut pending: Option<QueryCheckRequest> = None;
			loop {
				let waiting = pending.is_some();
				let idle = async move {
					if waiting {
						tokio::time::sleep(debounce).await;
					} else {
						std::future::pending::<()>().await;
					}
				};
				tokio::select! {
					next = inputs.recv() => match next {
						// every keystroke restarts the idle timer
						Some(Some(request)) => {
							pending = Some(request);
							hint_tx.send_replace(QueryHint::Pending);
						},
						Some(None) => {
							pending = None;
							hint_tx.send_replace(QueryHint::Idle);
						},
						None => break,
					},
					() = idle => {
						if let Some(request) = pending.take() {
							debug!(querytype = ?request.querytype, "checking query after idle");
							hint_tx.send_replace(check(&client, &request).await);
						}
					},
				}
			}
		});

		Self { input, hints, task }
	}

	/// Feeds the latest field content. `None` (empty field) resets the hint.
	pub fn input(&self, request: Option<QueryCheckRequest>) {
		let _ = self.input.send(request);
	}

	pub fn hints(&self) -> watch::Receiver<QueryHint> {
		self.hints.clone()
	}

	pub fn current(&self) -> QueryHint {
		self.hints.borrow().clone()
	}
}

impl Drop for QueryChecker {
	fn drop(&mut self) {
		self.task.abort();
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use wiremock::matchers::{body_partial_json, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	use super::*;
	use crate::backend::api_types::QueryKind;

	#[test]
	fn cardinality_is_read_from_known_shapes() {
		assert_eq!(hint_from_response(&json!([1, 2])), QueryHint::Results(2));
		assert_eq!(hint_from_response(&json!({"data": []})), QueryHint::Empty);
		assert_eq!(
			hint_from_response(&json!({"status": "success", "data": {"result": [{}]}})),
			QueryHint::Results(1)
		);
		assert_eq!(
			hint_from_response(&json!({"error": "parse error"})),
			QueryHint::Error("parse error".into())
		);
		assert!(matches!(hint_from_response(&json!({"weird": true})), QueryHint::Error(_)));
	}

	fn request(query: &str) -> QueryCheckRequest {
		QueryCheckRequest {
			query: query.into(),
			querytype: QueryKind::Prometheus,
			connection_id: None,
			connection_type: None,
		}
	}

	#[tokio::test]
	async fn only_the_last_input_after_idle_is_checked() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/query"))
			.and(body_partial_json(json!({"query": "up", "querytype": "prometheus"})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"result": [{}, {}]}})))
			.expect(1)
			.mount(&server)
			.await;

		let config = Config {
			base_url: server.uri(),
			query_debounce: Duration::from_millis(150),
			..Config::default()
		};
		let client = Arc::new(backend::new(&config).unwrap());
		let checker = QueryChecker::from_config(client, &config);
		let mut hints = checker.hints();

		checker.input(Some(request("u")));
		tokio::time::sleep(Duration::from_millis(30)).await;
		checker.input(Some(request("up")));

		let hint = tokio::time::timeout(Duration::from_secs(5), async {
			loop {
				hints.changed().await.unwrap();
				let hint = hints.borrow().clone();
				if hint != QueryHint::Pending {
					break hint;
				}
			}
		})
		.await
		.unwrap();
		assert_eq!(hint, QueryHint::Results(2));
	}

	#[tokio::test]
	async fn clearing_the_field_cancels_the_check() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
			.expect(0)
			.mount(&server)
			.await;

		let client = Arc::new(
			backend::new(&Config {
				base_url: server.uri(),
				..Config::default()
			})
			.unwrap(),
		);
		let checker = QueryChecker::spawn(client, Duration::from_millis(100));
		checker.input(Some(request("rate(x[5m])")));
		checker.input(None);
		tokio::time::sleep(Duration::from_millis(250)).await;
		assert_eq!(checker.current(), QueryHint::Idle);
	}
}
