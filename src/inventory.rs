//! Read-only reference data: connections and the datacenter inventory.

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
	backend::{
		api_types::{ConnectionDto, ConnectionTypeDto, InventoryItemDto, ListPage, TargetTypeDto},
		Client,
	},
	error::Result,
};

/// Reference endpoints answer with either a bare array or a list page.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
	Plain(Vec<T>),
	Page(ListPage<T>),
}

impl<T> ListBody<T> {
	fn into_rows(self) -> Vec<T> {
		match self {
			Self::Plain(rows) => rows,
			Self::Page(page) => page.data,
		}
	}
}

async fn fetch_rows<T: serde::de::DeserializeOwned>(client: &Client, endpoint: &str) -> Result<Vec<T>> {
	let body: ListBody<T> = client.get_json(endpoint, &[]).await?;
	Ok(body.into_rows())
}

#[instrument(skip(client))]
pub async fn fetch_connections(client: &Client) -> Result<Vec<ConnectionDto>> {
	let connections: Vec<ConnectionDto> = fetch_rows(client, "api/connections").await?;
	debug!(count = connections.len(), "fetched connections");
	Ok(connections)
}

#[instrument(skip(client))]
pub async fn fetch_connection(client: &Client, id: &str) -> Result<ConnectionDto> {
	client.get_json(&format!("api/connections/{id}"), &[]).await
}

/// Connection types a target type can query through. Empty for `internal`.
pub const fn compatible_types(target_type: TargetTypeDto) -> &'static [ConnectionTypeDto] {
	match target_type {
		TargetTypeDto::Internal => &[],
		TargetTypeDto::Prometheus => &[ConnectionTypeDto::Http, ConnectionTypeDto::Https],
		TargetTypeDto::Sql => &[
			ConnectionTypeDto::Mysql,
			ConnectionTypeDto::Oracle,
			ConnectionTypeDto::Postgresql,
			ConnectionTypeDto::Sqlite,
		],
		TargetTypeDto::Elasticsearch => &[ConnectionTypeDto::Elasticsearch],
	}
}

pub fn compatible_connections(
	connections: &[ConnectionDto],
	target_type: TargetTypeDto,
) -> Vec<&ConnectionDto> {
	let allowed = compatible_types(target_type);
	connections
		.iter()
		.filter(|c| allowed.contains(&c.connection_type))
		.collect()
}

/// The four inventory levels, each entry naming its parent one level up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryCatalog {
	pub datacenters: Vec<InventoryItemDto>,
	pub environments: Vec<InventoryItemDto>,
	pub components: Vec<InventoryItemDto>,
	pub subcomponents: Vec<InventoryItemDto>,
}

fn children<'a>(items: &'a [InventoryItemDto], parents: &[String]) -> Vec<&'a str> {
	items
		.iter()
		.filter(|item| {
			item.parent
				.as_ref()
				.is_some_and(|parent| parents.contains(parent))
		})
		.map(|item| item.name.as_str())
		.collect()
}

impl InventoryCatalog {
	#[instrument(skip(client))]
	pub async fn fetch(client: &Client) -> Result<Self> {
		let (datacenters, environments, components, subcomponents) = futures::try_join!(
			fetch_rows(client, "api/inventory/datacenters"),
			fetch_rows(client, "api/inventory/environments"),
			fetch_rows(client, "api/inventory/components"),
			fetch_rows(client, "api/inventory/subcomponents"),
		)?;
		Ok(Self {
			datacenters,
			environments,
			components,
			subcomponents,
		})
	}

	pub fn datacenter_options(&self) -> Vec<&str> {
		self.datacenters.iter().map(|d| d.name.as_str()).collect()
	}

	pub fn environment_options(&self, datacenter: Option<&str>) -> Vec<&str> {
		match datacenter {
			Some(datacenter) => children(&self.environments, &[datacenter.to_string()]),
			None => Vec::new(),
		}
	}

	pub fn component_options(&self, environments: &[String]) -> Vec<&str> {
		children(&self.components, environments)
	}

	pub fn subcomponent_options(&self, components: &[String]) -> Vec<&str> {
		children(&self.subcomponents, components)
	}
}

/// Hierarchical target pick of a task. Each level only keeps names the level
/// above still offers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSelection {
	pub datacenter: Option<String>,
	pub environments: Vec<String>,
	pub components: Vec<String>,
	pub subcomponents: Vec<String>,
}

fn retain_offered(selected: &mut Vec<String>, offered: &[&str]) {
	selected.retain(|name| offered.contains(&name.as_str()));
}

impl TargetSelection {
	pub fn select_datacenter(&mut self, catalog: &InventoryCatalog, datacenter: Option<String>) {
		self.datacenter = datacenter;
		self.prune(catalog);
	}

	pub fn set_environments(&mut self, catalog: &InventoryCatalog, environments: Vec<String>) {
		self.environments = environments;
		self.prune(catalog);
	}

	pub fn set_components(&mut self, catalog: &InventoryCatalog, components: Vec<String>) {
		self.components = components;
		self.prune(catalog);
	}

	pub fn set_subcomponents(&mut self, catalog: &InventoryCatalog, subcomponents: Vec<String>) {
		self.subcomponents = subcomponents;
		self.prune(catalog);
	}

	/// Drops selections no longer offered, top level first.
	pub fn prune(&mut self, catalog: &InventoryCatalog) {
		if self
			.datacenter
			.as_deref()
			.is_some_and(|dc| !catalog.datacenter_options().contains(&dc))
		{
			self.datacenter = None;
		}
		retain_offered(
			&mut self.environments,
			&catalog.environment_options(self.datacenter.as_deref()),
		);
		retain_offered(
			&mut self.components,
			&catalog.component_options(&self.environments),
		);
		retain_offered(
			&mut self.subcomponents,
			&catalog.subcomponent_options(&self.components),
		);
	}

	pub fn is_empty(&self) -> bool {
		self.datacenter.is_none()
			&& self.environments.is_empty()
			&& self.components.is_empty()
			&& self.subcomponents.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	use super::*;
	use crate::{backend, config::Config};

	fn item(name: &str, parent: Option<&str>) -> InventoryItemDto {
		InventoryItemDto {
			name: name.into(),
			parent: parent.map(Into::into),
		}
	}

	fn catalog() -> InventoryCatalog {
		InventoryCatalog {
			datacenters: vec![item("ams1", None), item("osl2", None)],
			environments: vec![item("prod", Some("ams1")), item("dev", Some("osl2"))],
			components: vec![item("web", Some("prod")), item("batch", Some("dev"))],
			subcomponents: vec![item("nginx", Some("web")), item("cron", Some("batch"))],
		}
	}

	#[test]
	fn each_level_filters_the_next() {
		let catalog = catalog();
		assert!(catalog.environment_options(None).is_empty());
		assert_eq!(catalog.environment_options(Some("ams1")), ["prod"]);
		assert_eq!(catalog.component_options(&["dev".into()]), ["batch"]);
		assert_eq!(catalog.subcomponent_options(&["web".into(), "batch".into()]), ["nginx", "cron"]);
	}

	#[test]
	fn changing_datacenter_prunes_everything_below() {
		let catalog = catalog();
		let mut selection = TargetSelection::default();
		selection.select_datacenter(&catalog, Some("ams1".into()));
		selection.set_environments(&catalog, vec!["prod".into(), "dev".into()]);
		assert_eq!(selection.environments, ["prod"]);
		selection.set_components(&catalog, vec!["web".into()]);
		selection.set_subcomponents(&catalog, vec!["nginx".into()]);

		selection.select_datacenter(&catalog, Some("osl2".into()));
		assert!(selection.environments.is_empty());
		assert!(selection.components.is_empty());
		assert!(selection.subcomponents.is_empty());
		assert!(!selection.is_empty());
	}

	#[test]
	fn connections_are_filtered_by_target_type() {
		let connections: Vec<ConnectionDto> = serde_json::from_value(json!([
			{"id": 1, "name": "prom", "type": "https"},
			{"id": 2, "name": "pg", "connection_type": "postgresql"},
			{"id": 3, "name": "es", "connection_type": "elasticsearch"}
		]))
		.unwrap();
		let names = |t| {
			compatible_connections(&connections, t)
				.into_iter()
				.map(|c| c.name.as_str())
				.collect::<Vec<_>>()
		};
		assert_eq!(names(TargetTypeDto::Prometheus), ["prom"]);
		assert_eq!(names(TargetTypeDto::Sql), ["pg"]);
		assert_eq!(names(TargetTypeDto::Elasticsearch), ["es"]);
		assert!(names(TargetTypeDto::Internal).is_empty());
	}

	#[tokio::test]
	async fn catalog_is_loaded_from_all_four_levels() {
		let server = MockServer::start().await;
		for (level, body) in [
			("datacenters", json!([{"name": "ams1"}])),
			("environments", json!({"data": [{"name": "prod", "datacenter": "ams1"}]})),
			("components", json!([{"name": "web", "environment": "prod"}])),
			("subcomponents", json!({"items": [{"name": "nginx", "component": "web"}], "count": 1})),
		] {
			Mock::given(method("GET"))
				.and(path(format!("/api/inventory/{level}")))
				.respond_with(ResponseTemplate::new(200).set_body_json(body))
				.expect(1)
				.mount(&server)
				.await;
		}

		let client = backend::new(&Config {
			base_url: server.uri(),
			..Config::default()
		})
		.unwrap();
		let catalog = InventoryCatalog::fetch(&client).await.unwrap();
		assert_eq!(catalog.environment_options(Some("ams1")), ["prod"]);
		assert_eq!(catalog.subcomponent_options(&["web".into()]), ["nginx"]);
	}

	#[tokio::test]
	async fn one_failing_level_fails_the_catalog() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/inventory/components"))
			.respond_with(ResponseTemplate::new(502))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
			.mount(&server)
			.await;

		let client = backend::new(&Config {
			base_url: server.uri(),
			..Config::default()
		})
		.unwrap();
		assert!(InventoryCatalog::fetch(&client).await.unwrap_err().is_remote());
	}
}
