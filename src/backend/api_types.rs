use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusDto {
	Enabled,
	Disabled,
}

impl StatusDto {
	pub const fn toggled(self) -> Self {
		match self {
			Self::Enabled => Self::Disabled,
			Self::Disabled => Self::Enabled,
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeTypeDto {
	#[default]
	Url,
	Port,
	Ping,
	Api,
}

impl ProbeTypeDto {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Url => "URL",
			Self::Port => "PORT",
			Self::Ping => "PING",
			Self::Api => "API",
		}
	}
}

/// Cron-like schedule shared by probes and tasks. Every field is optional.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleDto {
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub year: Option<String>,
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub month: Option<String>,
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub day: Option<String>,
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub hour: Option<String>,
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub minute: Option<String>,
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub second: Option<String>,
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub day_of_week: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start_date: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_date: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timezone: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub jitter: Option<u32>,
}

impl ScheduleDto {
	pub fn is_empty(&self) -> bool {
		self == &Self::default()
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeDto {
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub name: String,
	#[serde(rename = "type")]
	pub probe_type: ProbeTypeDto,
	#[serde(default)]
	pub target: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<StatusDto>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub operational_status: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ssl_status: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub http_status_code: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tls_version: Option<String>,
	#[serde(default)]
	pub description: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub schedule: Option<ScheduleDto>,
	#[serde(default)]
	pub kwargs: Map<String, Value>,
	#[serde(default, deserialize_with = "de::lenient_timestamp", skip_serializing_if = "Option::is_none")]
	pub created_at: Option<DateTime<Utc>>,
	#[serde(default, deserialize_with = "de::lenient_timestamp", skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
}

/// The part of a probe the backend accepts on create/update.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeWrite {
	pub name: String,
	#[serde(rename = "type")]
	pub probe_type: ProbeTypeDto,
	pub target: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
	pub description: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schedule: Option<ScheduleDto>,
	pub kwargs: Map<String, Value>,
}

impl ProbeDto {
	pub fn writable(&self) -> ProbeWrite {
		ProbeWrite {
			name: self.name.clone(),
			probe_type: self.probe_type,
			target: self.target.clone(),
			port: self.port,
			description: self.description.clone(),
			schedule: self.schedule.clone().filter(|s| !s.is_empty()),
			kwargs: self.kwargs.clone(),
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetTypeDto {
	#[default]
	Internal,
	Prometheus,
	Sql,
	Elasticsearch,
}

impl TargetTypeDto {
	pub const ALL: [Self; 4] = [Self::Internal, Self::Prometheus, Self::Sql, Self::Elasticsearch];

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Internal => "internal",
			Self::Prometheus => "prometheus",
			Self::Sql => "sql",
			Self::Elasticsearch => "elasticsearch",
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionTypeDto {
	Http,
	Https,
	Mysql,
	Oracle,
	Postgresql,
	Sqlite,
	Elasticsearch,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SloTargetDto {
	pub target_value: f64,
	pub period: u32,
	pub calculation_method: String,
	pub time_window: String,
	pub target_type: TargetTypeDto,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target_index: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filter_query: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub good_query: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_query: Option<String>,
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub connection_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub connection_type: Option<ConnectionTypeDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SloDto {
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub name: String,
	#[serde(default)]
	pub description: String,
	pub target: SloTargetDto,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SloWrite {
	pub name: String,
	pub description: String,
	pub target: SloTargetDto,
}

impl SloDto {
	pub fn writable(&self) -> SloWrite {
		SloWrite {
			name: self.name.clone(),
			description: self.description.clone(),
			target: self.target.clone(),
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskTypeDto {
	#[default]
	Invoke,
	Fabric,
	Ansible,
	Script,
}

impl TaskTypeDto {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Invoke => "invoke",
			Self::Fabric => "fabric",
			Self::Ansible => "ansible",
			Self::Script => "script",
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptDto {
	pub prompt: String,
	#[serde(default)]
	pub default_value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskDto {
	#[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub name: String,
	#[serde(rename = "type")]
	pub task_type: TaskTypeDto,
	#[serde(default)]
	pub owner: String,
	#[serde(default)]
	pub organization: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<StatusDto>,
	#[serde(default)]
	pub description: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub schedule: Option<ScheduleDto>,
	#[serde(default)]
	pub args: Vec<String>,
	#[serde(default)]
	pub kwargs: BTreeMap<String, String>,
	#[serde(default)]
	pub metadata: BTreeMap<String, String>,
	#[serde(default)]
	pub prompts: Vec<PromptDto>,
	#[serde(default)]
	pub hosts: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub datacenter: Option<String>,
	#[serde(default)]
	pub environments: Vec<String>,
	#[serde(default)]
	pub components: Vec<String>,
	#[serde(default)]
	pub subcomponents: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskWrite {
	pub name: String,
	#[serde(rename = "type")]
	pub task_type: TaskTypeDto,
	pub owner: String,
	pub organization: String,
	pub description: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schedule: Option<ScheduleDto>,
	pub args: Vec<String>,
	pub kwargs: BTreeMap<String, String>,
	pub metadata: BTreeMap<String, String>,
	pub prompts: Vec<PromptDto>,
	pub hosts: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub datacenter: Option<String>,
	pub environments: Vec<String>,
	pub components: Vec<String>,
	pub subcomponents: Vec<String>,
}

impl TaskDto {
	pub fn writable(&self) -> TaskWrite {
		TaskWrite {
			name: self.name.clone(),
			task_type: self.task_type,
			owner: self.owner.clone(),
			organization: self.organization.clone(),
			description: self.description.clone(),
			schedule: self.schedule.clone().filter(|s| !s.is_empty()),
			args: self.args.clone(),
			kwargs: self.kwargs.clone(),
			metadata: self.metadata.clone(),
			prompts: self.prompts.clone(),
			hosts: self.hosts.clone(),
			datacenter: self.datacenter.clone(),
			environments: self.environments.clone(),
			components: self.components.clone(),
			subcomponents: self.subcomponents.clone(),
		}
	}
}

/// Answer to one of a task's prompts, sent along with a run request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PromptAnswer {
	pub prompt: String,
	pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
	pub prompts: Vec<PromptAnswer>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDto {
	#[serde(deserialize_with = "de::string")]
	pub id: String,
	#[serde(default)]
	pub name: String,
	#[serde(alias = "type")]
	pub connection_type: ConnectionTypeDto,
}

/// One inventory level entry; `parent` names the entry one level up.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InventoryItemDto {
	pub name: String,
	#[serde(
		default,
		alias = "datacenter",
		alias = "environment",
		alias = "component",
		skip_serializing_if = "Option::is_none"
	)]
	pub parent: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
	Prometheus,
	Sql,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QueryCheckRequest {
	pub query: String,
	pub querytype: QueryKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub connection_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub connection_type: Option<ConnectionTypeDto>,
}

/// One page of a list endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ListPage<T> {
	#[serde(alias = "items", alias = "rows")]
	pub data: Vec<T>,
	#[serde(default, alias = "count", alias = "total_count")]
	pub total: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
	Asc,
	Desc,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SortModel {
	pub field: String,
	pub sort: SortDirection,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterItem {
	pub field: String,
	pub operator: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
}

/// Data-grid filter model, forwarded JSON-encoded in the `filter` query parameter.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterModel {
	#[serde(default)]
	pub items: Vec<FilterItem>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logic_operator: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub quick_filter_values: Vec<String>,
}

impl FilterModel {
	pub fn is_empty(&self) -> bool {
		self.items.is_empty() && self.quick_filter_values.is_empty()
	}
}

pub(crate) mod de {
	use chrono::{DateTime, NaiveDateTime, Utc};
	use serde::{Deserialize, Deserializer};
	use serde_json::Value;

	fn stringify<E: serde::de::Error>(value: Value) -> Result<Option<String>, E> {
		match value {
			Value::Null => Ok(None),
			Value::String(s) => Ok(Some(s)),
			Value::Number(n) => Ok(Some(n.to_string())),
			other => Err(E::custom(format!("expected string or number, got {other}"))),
		}
	}

	/// Backend ids and cron fields arrive as either strings or numbers.
	pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
		stringify(Value::deserialize(d)?)
	}

	pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
		stringify(Value::deserialize(d)?)?
			.ok_or_else(|| serde::de::Error::custom("expected string or number, got null"))
	}

	/// RFC 3339, or a naive timestamp taken as UTC. Anything else reads as absent.
	pub fn lenient_timestamp<'de, D: Deserializer<'de>>(
		d: D,
	) -> Result<Option<DateTime<Utc>>, D::Error> {
		let Some(raw) = Option::<String>::deserialize(d)? else {
			return Ok(None);
		};
		if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
			return Ok(Some(ts.with_timezone(&Utc)));
		}
		Ok(NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
			.or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
			.ok()
			.map(|naive| naive.and_utc()))
	}
}
