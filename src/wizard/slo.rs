//! SLO wizard.

use reqwest::Method;

use super::{
	repeated::{Section, SectionOps},
	validation::{Check, FieldValue, FormFields, Rule, TIME_WINDOW},
	Mode, Step, WizardForm,
};
use crate::{
	backend::api_types::{
		ConnectionDto, ConnectionTypeDto, QueryCheckRequest, QueryKind, SloDto, SloTargetDto,
		SloWrite, TargetTypeDto,
	},
	error::{Error, FieldErrors, Result},
	state::Expectation,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRef {
	pub id: String,
	pub connection_type: Option<ConnectionTypeDto>,
}

/// Where an SLO's good/total events come from. Each variant owns only the
/// fields meaningful for its target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SloSource {
	Internal {
		filter_query: Option<String>,
	},
	Prometheus {
		good_query: String,
		total_query: String,
		filter_query: Option<String>,
		connection: Option<ConnectionRef>,
	},
	Sql {
		good_query: String,
		total_query: String,
		connection: ConnectionRef,
	},
	Elasticsearch {
		index: String,
		good_query: String,
		total_query: String,
		filter_query: Option<String>,
		connection: ConnectionRef,
	},
}

fn connection_of(target: &SloTargetDto) -> Option<ConnectionRef> {
	target.connection_id.clone().map(|id| ConnectionRef {
		id,
		connection_type: target.connection_type,
	})
}

impl SloSource {
	pub fn from_target(target: &SloTargetDto) -> Self {
		let query = |q: &Option<String>| q.clone().unwrap_or_default();
		let connection = || {
			connection_of(target).unwrap_or(ConnectionRef {
				id: String::new(),
				connection_type: None,
			})
		};
		match target.target_type {
			TargetTypeDto::Internal => Self::Internal {
				filter_query: target.filter_query.clone(),
			},
			TargetTypeDto::Prometheus => Self::Prometheus {
				good_query: query(&target.good_query),
				total_query: query(&target.total_query),
				filter_query: target.filter_query.clone(),
				connection: connection_of(target),
			},
			TargetTypeDto::Sql => Self::Sql {
				good_query: query(&target.good_query),
				total_query: query(&target.total_query),
				connection: connection(),
			},
			TargetTypeDto::Elasticsearch => Self::Elasticsearch {
				index: query(&target.target_index),
				good_query: query(&target.good_query),
				total_query: query(&target.total_query),
				filter_query: target.filter_query.clone(),
				connection: connection(),
			},
		}
	}

	pub const fn target_type(&self) -> TargetTypeDto {
		match self {
			Self::Internal { .. } => TargetTypeDto::Internal,
			Self::Prometheus { .. } => TargetTypeDto::Prometheus,
			Self::Sql { .. } => TargetTypeDto::Sql,
			Self::Elasticsearch { .. } => TargetTypeDto::Elasticsearch,
		}
	}

	/// Writes this source's fields into `target`, clearing every field it does not own.
	pub fn apply(&self, target: &mut SloTargetDto) {
		target.target_type = self.target_type();
		target.target_index = None;
		target.filter_query = None;
		target.good_query = None;
		target.total_query = None;
		target.connection_id = None;
		target.connection_type = None;

		fn set_connection(target: &mut SloTargetDto, connection: &ConnectionRef) {
			target.connection_id = Some(connection.id.clone());
			target.connection_type = connection.connection_type;
		}
		match self {
			Self::Internal { filter_query } => {
				target.filter_query = filter_query.clone();
			},
			Self::Prometheus {
				good_query,
				total_query,
				filter_query,
				connection,
			} => {
				if let Some(connection) = connection {
					set_connection(target, connection);
				}
				target.good_query = Some(good_query.clone());
				target.total_query = Some(total_query.clone());
				target.filter_query = filter_query.clone();
			},
			Self::Sql {
				good_query,
				total_query,
				connection,
			} => {
				set_connection(target, connection);
				target.good_query = Some(good_query.clone());
				target.total_query = Some(total_query.clone());
			},
			Self::Elasticsearch {
				index,
				good_query,
				total_query,
				filter_query,
				connection,
			} => {
				set_connection(target, connection);
				target.target_index = Some(index.clone());
				target.good_query = Some(good_query.clone());
				target.total_query = Some(total_query.clone());
				target.filter_query = filter_query.clone();
			},
		}
	}
}

/// Which of the two live-checked query inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryField {
	Good,
	Total,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SloForm {
	pub name: String,
	pub description: String,
	pub target_value: String,
	pub period: String,
	pub calculation_method: String,
	pub time_window: String,
	target_type: TargetTypeDto,
	pub target_index: String,
	pub filter_query: String,
	pub good_query: String,
	pub total_query: String,
	pub connection_id: String,
	pub connection_type: Option<ConnectionTypeDto>,
}

fn blank_to_none(s: &str) -> Option<String> {
	let s = s.trim();
	(!s.is_empty()).then(|| s.to_string())
}

impl SloForm {
	pub fn new(target_type: TargetTypeDto) -> Self {
		Self {
			target_type,
			..Self::default()
		}
	}

	pub fn target_type(&self) -> TargetTypeDto {
		self.target_type
	}

	/// Switching target type drops every query and connection input, so nothing
	/// typed for one backend leaks into another.
	pub fn set_target_type(&mut self, target_type: TargetTypeDto) {
		if self.target_type == target_type {
			return;
		}
		self.target_type = target_type;
		self.good_query.clear();
		self.total_query.clear();
		self.filter_query.clear();
		self.target_index.clear();
		self.connection_id.clear();
		self.connection_type = None;
	}

	pub fn select_connection(&mut self, connection: &ConnectionDto) {
		self.connection_id = connection.id.clone();
		self.connection_type = Some(connection.connection_type);
	}

	/// Request for the live query check, if this target type supports one.
	pub fn query_check(&self, field: QueryField) -> Option<QueryCheckRequest> {
		let querytype = match self.target_type {
			TargetTypeDto::Prometheus => QueryKind::Prometheus,
			TargetTypeDto::Sql => QueryKind::Sql,
			TargetTypeDto::Internal | TargetTypeDto::Elasticsearch => return None,
		};
		let query = match field {
			QueryField::Good => &self.good_query,
			QueryField::Total => &self.total_query,
		};
		Some(QueryCheckRequest {
			query: blank_to_none(query)?,
			querytype,
			connection_id: blank_to_none(&self.connection_id),
			connection_type: self.connection_type,
		})
	}

	fn source(&self) -> SloSource {
		let connection = || ConnectionRef {
			id: self.connection_id.trim().to_string(),
			connection_type: self.connection_type,
		};
		let good_query = self.good_query.trim().to_string();
		let total_query = self.total_query.trim().to_string();
		match self.target_type {
			TargetTypeDto::Internal => SloSource::Internal {
				filter_query: blank_to_none(&self.filter_query),
			},
			TargetTypeDto::Prometheus => SloSource::Prometheus {
				good_query,
				total_query,
				filter_query: blank_to_none(&self.filter_query),
				connection: blank_to_none(&self.connection_id).map(|_| connection()),
			},
			TargetTypeDto::Sql => SloSource::Sql {
				good_query,
				total_query,
				connection: connection(),
			},
			TargetTypeDto::Elasticsearch => SloSource::Elasticsearch {
				index: self.target_index.trim().to_string(),
				good_query,
				total_query,
				filter_query: blank_to_none(&self.filter_query),
				connection: connection(),
			},
		}
	}
}

fn number_error(step: &'static str, field: &str, message: &str) -> Error {
	Error::Validation {
		step,
		errors: FieldErrors::from([(field.to_string(), message.to_string())]),
	}
}

impl FormFields for SloForm {
	fn field(&self, name: &str) -> FieldValue {
		let value = match name {
			"name" => &self.name,
			"description" => &self.description,
			"target_value" => &self.target_value,
			"period" => &self.period,
			"calculation_method" => &self.calculation_method,
			"time_window" => &self.time_window,
			"target_type" => return FieldValue::Text(self.target_type.as_str().into()),
			"target_index" => &self.target_index,
			"filter_query" => &self.filter_query,
			"good_query" => &self.good_query,
			"total_query" => &self.total_query,
			"connection_id" => &self.connection_id,
			_ => return FieldValue::Absent,
		};
		FieldValue::Text(value.clone())
	}
}

fn uses_external_source(target_type: TargetTypeDto) -> bool {
	target_type != TargetTypeDto::Internal
}

impl WizardForm for SloForm {
	type Discriminant = TargetTypeDto;
	type Entity = SloDto;
	type Payload = SloWrite;

	const ENTITY: &'static str = "SLO";

	fn steps() -> Vec<Step<TargetTypeDto>> {
		vec![
			Step::new("basics", "General", vec![Rule::required("name")]),
			Step::new(
				"objective",
				"Objective",
				vec![
					Rule::required("target_value"),
					Rule::new("target_value", Check::FloatRange { min: 0.0, max: 100.0 }),
					Rule::required("period"),
					Rule::int_range("period", 1, 365),
					Rule::required("calculation_method"),
					Rule::required("time_window"),
					Rule::pattern("time_window", &TIME_WINDOW, "Use a number and unit, e.g. 5m or 1h"),
				],
			),
			Step::new("source", "Source", vec![Rule::required("target_type")]),
			Step::new(
				"connection",
				"Connection",
				vec![
					Rule::required("connection_id").when("target_type", &["sql", "elasticsearch"]),
					Rule::required("target_index").when("target_type", &["elasticsearch"]),
				],
			)
			.visible_when(uses_external_source),
			Step::new(
				"queries",
				"Queries",
				vec![Rule::required("good_query"), Rule::required("total_query")],
			)
			.visible_when(uses_external_source),
		]
	}

	fn discriminant(&self) -> TargetTypeDto {
		self.target_type
	}

	fn from_entity(entity: &SloDto) -> Self {
		let target = &entity.target;
		let mut form = Self {
			name: entity.name.clone(),
			description: entity.description.clone(),
			target_value: target.target_value.to_string(),
			period: target.period.to_string(),
			calculation_method: target.calculation_method.clone(),
			time_window: target.time_window.clone(),
			target_type: target.target_type,
			..Self::default()
		};
		match SloSource::from_target(target) {
			SloSource::Internal { filter_query } => {
				form.filter_query = filter_query.unwrap_or_default();
			},
			SloSource::Prometheus {
				good_query,
				total_query,
				filter_query,
				connection,
			} => {
				form.good_query = good_query;
				form.total_query = total_query;
				form.filter_query = filter_query.unwrap_or_default();
				if let Some(connection) = connection {
					form.connection_id = connection.id;
					form.connection_type = connection.connection_type;
				}
			},
			SloSource::Sql {
				good_query,
				total_query,
				connection,
			} => {
				form.good_query = good_query;
				form.total_query = total_query;
				form.connection_id = connection.id;
				form.connection_type = connection.connection_type;
			},
			SloSource::Elasticsearch {
				index,
				good_query,
				total_query,
				filter_query,
				connection,
			} => {
				form.target_index = index;
				form.good_query = good_query;
				form.total_query = total_query;
				form.filter_query = filter_query.unwrap_or_default();
				form.connection_id = connection.id;
				form.connection_type = connection.connection_type;
			},
		}
		form
	}

	fn entity_key(entity: &SloDto) -> Option<String> {
		entity.id.clone()
	}

	fn section_mut(&mut self, _section: Section) -> Option<&mut dyn SectionOps> {
		None
	}

	fn build_payload(&self) -> Result<SloWrite> {
		let target_value = self
			.target_value
			.trim()
			.parse::<f64>()
			.map_err(|_| number_error("objective", "target_value", "Must be a number"))?;
		let period = self
			.period
			.trim()
			.parse::<u32>()
			.map_err(|_| number_error("objective", "period", "Must be a whole number"))?;
		let mut target = SloTargetDto {
			target_value,
			period,
			calculation_method: self.calculation_method.trim().to_string(),
			time_window: self.time_window.trim().to_string(),
			target_type: self.target_type,
			target_index: None,
			filter_query: None,
			good_query: None,
			total_query: None,
			connection_id: None,
			connection_type: None,
		};
		self.source().apply(&mut target);
		Ok(SloWrite {
			name: self.name.trim().to_string(),
			description: self.description.clone(),
			target,
		})
	}

	fn route(mode: &Mode, _payload: &SloWrite) -> (Method, String) {
		match mode {
			Mode::Edit(id) => (Method::PUT, format!("api/sli/{id}")),
			Mode::Create | Mode::Clone => (Method::POST, "api/sli".to_string()),
		}
	}

	fn expectation(mode: &Mode, payload: &SloWrite) -> Expectation {
		match mode {
			Mode::Edit(id) => Expectation::Present(id.clone()),
			Mode::Create | Mode::Clone => Expectation::Present(payload.name.clone()),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use wiremock::matchers::{body_partial_json, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	use super::*;
	use crate::{
		backend,
		config::Config,
		notify::ChannelNotifier,
		state::refetch_channel,
		wizard::{validation::validate, Progress, Wizard, WizardContext},
	};

	fn stored(target: serde_json::Value) -> SloDto {
		serde_json::from_value(json!({
			"id": "slo-3",
			"name": "checkout availability",
			"description": "99.9% of checkouts succeed",
			"target": target,
		}))
		.unwrap()
	}

	fn filled(target_type: TargetTypeDto) -> SloForm {
		SloForm {
			name: "n".into(),
			target_value: "99.5".into(),
			period: "30".into(),
			calculation_method: "events".into(),
			time_window: "5m".into(),
			target_index: "logs-*".into(),
			filter_query: "env:prod".into(),
			good_query: "good".into(),
			total_query: "total".into(),
			connection_id: "c-1".into(),
			connection_type: Some(ConnectionTypeDto::Postgresql),
			..SloForm::new(target_type)
		}
	}

	#[test]
	fn every_target_type_switch_clears_query_fields() {
		for from in TargetTypeDto::ALL {
			for to in TargetTypeDto::ALL {
				if from == to {
					continue;
				}
				let mut form = filled(from);
				form.set_target_type(to);
				assert_eq!(form.target_type(), to);
				assert!(form.good_query.is_empty(), "{from:?} -> {to:?}");
				assert!(form.total_query.is_empty(), "{from:?} -> {to:?}");
				assert!(form.filter_query.is_empty(), "{from:?} -> {to:?}");
				assert!(form.target_index.is_empty(), "{from:?} -> {to:?}");
				assert!(form.connection_id.is_empty(), "{from:?} -> {to:?}");
				assert_eq!(form.connection_type, None, "{from:?} -> {to:?}");
				assert_eq!(form.name, "n");
			}
		}
	}

	#[test]
	fn payload_only_carries_fields_of_its_target_type() {
		let payload = filled(TargetTypeDto::Sql).build_payload().unwrap();
		assert_eq!(payload.target.target_index, None);
		assert_eq!(payload.target.filter_query, None);
		assert_eq!(payload.target.connection_id.as_deref(), Some("c-1"));

		let payload = filled(TargetTypeDto::Internal).build_payload().unwrap();
		assert_eq!(payload.target.good_query, None);
		assert_eq!(payload.target.connection_id, None);
		assert_eq!(payload.target.filter_query.as_deref(), Some("env:prod"));
	}

	#[test]
	fn sql_slo_round_trips() {
		let slo = stored(json!({
			"target_value": 99.9,
			"period": 28,
			"calculation_method": "events",
			"time_window": "1h",
			"target_type": "sql",
			"good_query": "select count(*) from orders where ok",
			"total_query": "select count(*) from orders",
			"connection_id": 12,
			"connection_type": "postgresql"
		}));
		assert_eq!(SloForm::from_entity(&slo).build_payload().unwrap(), slo.writable());
	}

	#[test]
	fn elasticsearch_and_internal_slos_round_trip() {
		let es = stored(json!({
			"target_value": 99.0,
			"period": 7,
			"calculation_method": "timeslices",
			"time_window": "5m",
			"target_type": "elasticsearch",
			"target_index": "access-*",
			"filter_query": "service:web",
			"good_query": "status:<500",
			"total_query": "*",
			"connection_id": "es-1",
			"connection_type": "elasticsearch"
		}));
		assert_eq!(SloForm::from_entity(&es).build_payload().unwrap(), es.writable());

		let internal = stored(json!({
			"target_value": 95.0,
			"period": 30,
			"calculation_method": "events",
			"time_window": "1d",
			"target_type": "internal"
		}));
		assert_eq!(
			SloForm::from_entity(&internal).build_payload().unwrap(),
			internal.writable()
		);
	}

	#[test]
	fn connection_requirements_depend_on_target_type() {
		let steps = SloForm::steps();
		let mut form = filled(TargetTypeDto::Elasticsearch);
		form.connection_id.clear();
		form.target_index.clear();
		let errors = validate(&form, &steps[3].rules).unwrap_err();
		assert!(errors.contains_key("connection_id"));
		assert!(errors.contains_key("target_index"));

		let mut form = filled(TargetTypeDto::Prometheus);
		form.connection_id.clear();
		assert!(validate(&form, &steps[3].rules).is_ok());
	}

	#[test]
	fn internal_slos_skip_connection_and_query_steps() {
		let wizard = Wizard::create(SloForm::new(TargetTypeDto::Internal));
		let ids: Vec<_> = wizard.visible_steps().iter().map(|s| s.id).collect();
		assert_eq!(ids, ["basics", "objective", "source"]);
	}

	#[test]
	fn target_value_must_be_a_percentage() {
		let steps = SloForm::steps();
		let mut form = filled(TargetTypeDto::Internal);
		for bad in ["0", "100.5", "abc"] {
			form.target_value = bad.into();
			assert!(validate(&form, &steps[1].rules).is_err(), "{bad}");
		}
		form.target_value = "100".into();
		assert!(validate(&form, &steps[1].rules).is_ok());
	}

	#[test]
	fn query_checks_follow_target_type() {
		let form = filled(TargetTypeDto::Prometheus);
		let request = form.query_check(QueryField::Good).unwrap();
		assert_eq!(request.querytype, QueryKind::Prometheus);
		assert_eq!(request.query, "good");
		assert_eq!(request.connection_id.as_deref(), Some("c-1"));
		assert!(filled(TargetTypeDto::Elasticsearch).query_check(QueryField::Total).is_none());

		let mut blank = filled(TargetTypeDto::Sql);
		blank.total_query = "  ".into();
		assert!(blank.query_check(QueryField::Total).is_none());
	}

	fn sql_slo() -> SloDto {
		stored(json!({
			"target_value": 99.9,
			"period": 28,
			"calculation_method": "events",
			"time_window": "1h",
			"target_type": "sql",
			"good_query": "select count(*) from orders where ok",
			"total_query": "select count(*) from orders",
			"connection_id": 12,
			"connection_type": "postgresql"
		}))
	}

	async fn submit_all(server: &MockServer, mut wizard: Wizard<SloForm>) -> Option<Expectation> {
		let client = backend::new(&Config {
			base_url: server.uri(),
			..Config::default()
		})
		.unwrap();
		let (notifier, _toasts) = ChannelNotifier::new();
		let (trigger, listener) = refetch_channel();
		let ctx = WizardContext {
			client: &client,
			notifier: &notifier,
			trigger: &trigger,
		};
		while wizard.next(&ctx).await.unwrap() != Progress::Submitted {}
		listener.current().expect
	}

	#[tokio::test]
	async fn edit_puts_to_the_stored_id() {
		let server = MockServer::start().await;
		Mock::given(method("PUT"))
			.and(path("/api/sli/slo-3"))
			.and(body_partial_json(json!({"target": {"target_type": "sql", "connection_id": "12"}})))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		let expect = submit_all(&server, Wizard::<SloForm>::edit(&sql_slo())).await;
		assert_eq!(expect, Some(Expectation::Present("slo-3".into())));
	}

	#[tokio::test]
	async fn create_posts_to_the_collection() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/sli"))
			.and(body_partial_json(json!({"name": "checkout availability"})))
			.respond_with(ResponseTemplate::new(201))
			.expect(1)
			.mount(&server)
			.await;

		let form = SloForm::from_entity(&sql_slo());
		let expect = submit_all(&server, Wizard::create(form)).await;
		assert_eq!(expect, Some(Expectation::Present("checkout availability".into())));
	}
}
