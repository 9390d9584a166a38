use color_eyre::eyre;
use redact::Secret;
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, field, instrument, warn, Span};
use uuid::Uuid;

use crate::{
	config,
	error::{Error, Result},
};

pub mod api_types;

/// Thin wrapper around `reqwest` that knows the backend's base url and auth scheme.
pub struct Client {
	client: reqwest::Client,
	base_url: String,
	api_token: Option<Secret<String>>,
	auth_reads: bool,
}

impl Client {
	const fn new(
		client: reqwest::Client,
		base_url: String,
		api_token: Option<Secret<String>>,
		auth_reads: bool,
	) -> Self {
		Self {
			client,
			base_url,
			api_token,
			auth_reads,
		}
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
		// whether list endpoints expect a token is unknown, so reads follow the config
		let authenticate = method != Method::GET || self.auth_reads;
		let builder = self
			.client
			.request(method, format!("{}/{}", self.base_url, endpoint));
		match (&self.api_token, authenticate) {
			(Some(token), true) => builder.bearer_auth(token.expose_secret()),
			_ => builder,
		}
	}

	/// Sends the request and turns anything but a 2xx into [`Error::Status`].
	#[instrument(skip(self, builder), fields(request_id = field::Empty))]
	async fn dispatch(
		&self,
		method: Method,
		endpoint: &str,
		builder: RequestBuilder,
	) -> Result<Response> {
		let request_id = Uuid::new_v4();
		Span::current().record("request_id", field::display(request_id));
		let response = builder
			.header("X-Request-Id", request_id.to_string())
			.send()
			.await
			.map_err(|source| Error::Transport {
				path: endpoint.to_string(),
				source,
			})?;

		let status = response.status();
		if !status.is_success() {
			warn!(%status, "backend rejected request");
			return Err(Error::Status {
				method,
				path: endpoint.to_string(),
				status,
			});
		}
		debug!(%status, "backend request completed");
		Ok(response)
	}

	pub async fn get_json<T: DeserializeOwned>(
		&self,
		endpoint: &str,
		query: &[(&str, String)],
	) -> Result<T> {
		let response = self
			.dispatch(Method::GET, endpoint, self.request(Method::GET, endpoint).query(query))
			.await?;
		decode(endpoint, response).await
	}

	pub async fn send_json<B: Serialize + ?Sized>(
		&self,
		method: Method,
		endpoint: &str,
		body: &B,
	) -> Result<Response> {
		let builder = self.request(method.clone(), endpoint).json(body);
		self.dispatch(method, endpoint, builder).await
	}

	pub async fn send_empty(&self, method: Method, endpoint: &str) -> Result<Response> {
		let builder = self.request(method.clone(), endpoint);
		self.dispatch(method, endpoint, builder).await
	}
}

pub async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T> {
	response.json::<T>().await.map_err(|source| {
		if source.is_decode() {
			Error::UnexpectedShape {
				path: endpoint.to_string(),
				detail: source.to_string(),
			}
		} else {
			Error::Transport {
				path: endpoint.to_string(),
				source,
			}
		}
	})
}

pub fn new(config: &config::Config) -> eyre::Result<Client> {
	if let Some(token) = &config.api_token {
		if reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
			.is_err()
		{
			eyre::bail!("Failed at constructing the bearer token header")
		}
	}

	let client = reqwest::Client::builder()
		.timeout(config.request_timeout)
		.build()?;
	let conf = config.clone();
	Ok(Client::new(
		client,
		conf.base_url,
		conf.api_token,
		conf.auth_reads,
	))
}

#[cfg(test)]
mod tests {
	use wiremock::matchers::{header, header_exists, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	use super::*;

	fn client_for(server: &MockServer, auth_reads: bool) -> Client {
		let config = config::Config {
			base_url: server.uri(),
			api_token: Some(Secret::new("tok".to_string())),
			auth_reads,
			..config::Config::default()
		};
		new(&config).unwrap()
	}

	#[tokio::test]
	async fn mutating_calls_carry_bearer_and_request_id() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/probes/enable/7"))
			.and(header("authorization", "Bearer tok"))
			.and(header_exists("x-request-id"))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		let client = client_for(&server, false);
		client
			.send_empty(Method::POST, "api/probes/enable/7")
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn reads_skip_token_when_configured() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/connections"))
			.and(query_param("limit", "5"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
			.expect(1)
			.mount(&server)
			.await;

		let client = client_for(&server, false);
		let rows: Vec<serde_json::Value> = client
			.get_json("api/connections", &[("limit", "5".into())])
			.await
			.unwrap();
		assert!(rows.is_empty());

		let received = server.received_requests().await.unwrap();
		assert!(received[0].headers.get("authorization").is_none());
	}

	#[tokio::test]
	async fn non_success_status_is_an_error() {
		let server = MockServer::start().await;
		Mock::given(method("DELETE"))
			.respond_with(ResponseTemplate::new(409))
			.mount(&server)
			.await;

		let client = client_for(&server, true);
		let err = client
			.send_empty(Method::DELETE, "api/tasks/delete/3")
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			Error::Status { status, .. } if status == reqwest::StatusCode::CONFLICT
		));
		assert!(err.is_remote());
	}

	#[tokio::test]
	async fn malformed_body_is_unexpected_shape() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
			.mount(&server)
			.await;

		let client = client_for(&server, true);
		let err = client
			.get_json::<Vec<String>>("api/sli", &[])
			.await
			.unwrap_err();
		assert!(matches!(err, Error::UnexpectedShape { .. }));
	}
}
