//! Probe wizard and the typed probe model behind it.
//!
//! API checks travel to the backend inside the generic `kwargs` bag under
//! reserved `__name__` keys. That encoding is confined to [`ApiCheck::encode`]
//! and [`ApiCheck::decode`]; everything else works with [`ProbeKind`].

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Method;
use serde::{
	de::{MapAccess, Visitor},
	ser::SerializeMap,
	Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::{Map, Value};

use super::{
	repeated::{Entry, KeyValue, Repeated, Section, SectionOps},
	schedule::{self, ScheduleForm},
	validation::{Check, FieldValue, FormFields, Rule, HOST, HTTP_METHOD, HTTP_URL, IPV4, SLUG},
	Mode, Step, WizardForm,
};
use crate::{
	backend::api_types::{ProbeDto, ProbeTypeDto, ProbeWrite, ScheduleDto},
	error::{Error, FieldErrors, Result},
	state::Expectation,
};

lazy_static! {
	static ref PAYLOAD_TYPE: Regex = Regex::new(r"^(json|text|xml|form)$").unwrap();
}

const HTTP_METHOD_KEY: &str = "__http_method__";
const PAYLOAD_KEY: &str = "__payload__";
const PAYLOAD_TYPE_KEY: &str = "__payload_type__";
const SSL_VERIFICATION_KEY: &str = "__ssl_verification__";
const HTTP_HEADERS_KEY: &str = "__http_headers__";
const VALIDATION_RULES_KEY: &str = "__validation_rules__";

pub const RESERVED_KWARGS: [&str; 6] = [
	HTTP_METHOD_KEY,
	PAYLOAD_KEY,
	PAYLOAD_TYPE_KEY,
	SSL_VERIFICATION_KEY,
	HTTP_HEADERS_KEY,
	VALIDATION_RULES_KEY,
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ValidationRule {
	#[serde(rename = "type")]
	pub rule_type: String,
	pub value: String,
}

/// HTTP headers in the order they were stored or entered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(pub Vec<(String, String)>);

impl HeaderList {
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn position(&self, name: &str) -> Option<usize> {
		self.0.iter().position(|(k, _)| k == name)
	}
}

impl Serialize for HeaderList {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.0.len()))?;
		for (k, v) in &self.0 {
			map.serialize_entry(k, v)?;
		}
		map.end()
	}
}

struct HeaderListVisitor;

impl<'de> Visitor<'de> for HeaderListVisitor {
	type Value = HeaderList;

	fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str("an object of header names to values")
	}

	fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<HeaderList, A::Error> {
		let mut headers = Vec::new();
		while let Some((k, v)) = access.next_entry::<String, Value>()? {
			headers.push((k, value_text(v)));
		}
		Ok(HeaderList(headers))
	}
}

impl<'de> Deserialize<'de> for HeaderList {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		deserializer.deserialize_map(HeaderListVisitor)
	}
}

fn value_text(v: Value) -> String {
	match v {
		Value::String(s) => s,
		other => other.to_string(),
	}
}

/// Request details of an `API` probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCheck {
	pub http_method: String,
	pub payload: Option<String>,
	pub payload_type: Option<String>,
	/// `None` leaves the backend default in place
	pub ssl_verification: Option<bool>,
	pub http_headers: HeaderList,
	pub validation_rules: Vec<ValidationRule>,
}

impl Default for ApiCheck {
	fn default() -> Self {
		Self {
			http_method: "GET".into(),
			payload: None,
			payload_type: None,
			ssl_verification: None,
			http_headers: HeaderList::default(),
			validation_rules: Vec::new(),
		}
	}
}

fn kwarg_text(kwargs: &Map<String, Value>, key: &str) -> Option<String> {
	match kwargs.get(key)? {
		Value::String(s) if s.is_empty() => None,
		Value::String(s) => Some(s.clone()),
		Value::Null => None,
		other => Some(other.to_string()),
	}
}

impl ApiCheck {
	pub fn encode(&self, kwargs: &mut Map<String, Value>) -> Result<()> {
		kwargs.insert(HTTP_METHOD_KEY.into(), Value::from(self.http_method.clone()));
		if let Some(payload) = &self.payload {
			kwargs.insert(PAYLOAD_KEY.into(), Value::from(payload.clone()));
		}
		if let Some(payload_type) = &self.payload_type {
			kwargs.insert(PAYLOAD_TYPE_KEY.into(), Value::from(payload_type.clone()));
		}
		if let Some(verify) = self.ssl_verification {
			kwargs.insert(SSL_VERIFICATION_KEY.into(), Value::Bool(verify));
		}
		if !self.http_headers.is_empty() {
			// the backend wants the header object as a JSON string
			kwargs.insert(
				HTTP_HEADERS_KEY.into(),
				Value::String(serde_json::to_string(&self.http_headers)?),
			);
		}
		if !self.validation_rules.is_empty() {
			kwargs.insert(
				VALIDATION_RULES_KEY.into(),
				serde_json::to_value(&self.validation_rules)?,
			);
		}
		Ok(())
	}

	/// Tolerates both the string-encoded and the inline JSON forms.
	pub fn decode(kwargs: &Map<String, Value>) -> Self {
		let http_headers = match kwargs.get(HTTP_HEADERS_KEY) {
			Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_default(),
			Some(Value::Object(map)) => HeaderList(
				map.iter().map(|(k, v)| (k.clone(), value_text(v.clone()))).collect(),
			),
			_ => HeaderList::default(),
		};

		let validation_rules = match kwargs.get(VALIDATION_RULES_KEY) {
			Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_default(),
			Some(value @ Value::Array(_)) => serde_json::from_value(value.clone()).unwrap_or_default(),
			_ => Vec::new(),
		};

		let ssl_verification = match kwargs.get(SSL_VERIFICATION_KEY) {
			Some(Value::Bool(b)) => Some(*b),
			Some(Value::String(s)) => Some(!s.eq_ignore_ascii_case("false")),
			_ => None,
		};

		Self {
			http_method: kwarg_text(kwargs, HTTP_METHOD_KEY).unwrap_or_else(|| "GET".into()),
			payload: kwarg_text(kwargs, PAYLOAD_KEY),
			payload_type: kwarg_text(kwargs, PAYLOAD_TYPE_KEY),
			ssl_verification,
			http_headers,
			validation_rules,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeKind {
	Url,
	Port { port: u16 },
	Ping,
	Api(ApiCheck),
}

impl ProbeKind {
	pub const fn probe_type(&self) -> ProbeTypeDto {
		match self {
			Self::Url => ProbeTypeDto::Url,
			Self::Port { .. } => ProbeTypeDto::Port,
			Self::Ping => ProbeTypeDto::Ping,
			Self::Api(_) => ProbeTypeDto::Api,
		}
	}
}

/// Writable part of a probe, typed by kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSpec {
	pub name: String,
	pub description: String,
	pub target: String,
	pub schedule: Option<ScheduleDto>,
	pub kind: ProbeKind,
	/// User kwargs, reserved keys excluded
	pub extra_kwargs: Map<String, Value>,
}

impl ProbeSpec {
	pub fn from_wire(dto: &ProbeDto) -> Self {
		let kind = match dto.probe_type {
			ProbeTypeDto::Url => ProbeKind::Url,
			ProbeTypeDto::Port => ProbeKind::Port {
				port: dto.port.unwrap_or_default(),
			},
			ProbeTypeDto::Ping => ProbeKind::Ping,
			ProbeTypeDto::Api => ProbeKind::Api(ApiCheck::decode(&dto.kwargs)),
		};
		let extra_kwargs = dto
			.kwargs
			.iter()
			.filter(|(k, _)| !RESERVED_KWARGS.contains(&k.as_str()))
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect();
		Self {
			name: dto.name.clone(),
			description: dto.description.clone(),
			target: dto.target.clone(),
			schedule: dto.schedule.clone().filter(|s| !s.is_empty()),
			kind,
			extra_kwargs,
		}
	}

	pub fn into_wire(self) -> Result<ProbeWrite> {
		let mut kwargs = self.extra_kwargs;
		for key in RESERVED_KWARGS {
			kwargs.remove(key);
		}
		let port = match &self.kind {
			ProbeKind::Port { port } => Some(*port),
			_ => None,
		};
		if let ProbeKind::Api(check) = &self.kind {
			check.encode(&mut kwargs)?;
		}
		Ok(ProbeWrite {
			name: self.name,
			probe_type: self.kind.probe_type(),
			target: self.target,
			port,
			description: self.description,
			schedule: self.schedule,
			kwargs,
		})
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleEntry {
	pub rule_type: String,
	pub value: String,
}

impl Entry for RuleEntry {
	fn is_blank(&self) -> bool {
		self.rule_type.trim().is_empty() && self.value.trim().is_empty()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeForm {
	pub name: String,
	pub probe_type: ProbeTypeDto,
	pub target: String,
	pub port: String,
	pub description: String,
	pub http_method: String,
	pub payload_type: String,
	pub payload: String,
	pub ssl_verification: Option<bool>,
	/// Sent as an `Authorization: Bearer` header
	pub token: String,
	/// Where the token header sat among the stored headers
	pub token_index: Option<usize>,
	pub http_headers: Repeated<KeyValue>,
	pub validation_rules: Repeated<RuleEntry>,
	pub schedule: ScheduleForm,
	pub extra_kwargs: Map<String, Value>,
}

impl Default for ProbeForm {
	fn default() -> Self {
		Self {
			name: String::new(),
			probe_type: ProbeTypeDto::Url,
			target: String::new(),
			port: String::new(),
			description: String::new(),
			http_method: "GET".into(),
			payload_type: String::new(),
			payload: String::new(),
			ssl_verification: Some(true),
			token: String::new(),
			token_index: None,
			http_headers: Repeated::new(Section::Headers),
			validation_rules: Repeated::new(Section::ValidationRules),
			schedule: ScheduleForm::default(),
			extra_kwargs: Map::new(),
		}
	}
}

fn blank_to_none(s: &str) -> Option<String> {
	let s = s.trim();
	(!s.is_empty()).then(|| s.to_string())
}

impl ProbeForm {
	pub fn from_spec(spec: ProbeSpec) -> Self {
		let mut form = Self {
			name: spec.name,
			probe_type: spec.kind.probe_type(),
			target: spec.target,
			description: spec.description,
			schedule: ScheduleForm::from_dto(spec.schedule.as_ref()),
			extra_kwargs: spec.extra_kwargs,
			..Self::default()
		};
		match spec.kind {
			ProbeKind::Port { port } => form.port = port.to_string(),
			ProbeKind::Api(mut check) => {
				if let Some(index) = check.http_headers.position("Authorization") {
					if let Some(token) = check.http_headers.0[index].1.strip_prefix("Bearer ") {
						form.token = token.to_string();
						form.token_index = Some(index);
						check.http_headers.0.remove(index);
					}
				}
				form.http_method = check.http_method;
				form.payload = check.payload.unwrap_or_default();
				form.payload_type = check.payload_type.unwrap_or_default();
				form.ssl_verification = check.ssl_verification;
				form.http_headers = Repeated::from_pairs(Section::Headers, &check.http_headers.0);
				form.validation_rules = Repeated::from_entries(
					Section::ValidationRules,
					check
						.validation_rules
						.into_iter()
						.map(|r| RuleEntry {
							rule_type: r.rule_type,
							value: r.value,
						})
						.collect(),
				);
			},
			ProbeKind::Url | ProbeKind::Ping => {},
		}
		form
	}

	/// Switches the probe type. API-only inputs are kept so switching back restores them;
	/// they are dropped from the payload for every other type.
	pub fn set_type(&mut self, probe_type: ProbeTypeDto) {
		self.probe_type = probe_type;
	}

	pub fn to_spec(&self) -> Result<ProbeSpec> {
		let kind = match self.probe_type {
			ProbeTypeDto::Url => ProbeKind::Url,
			ProbeTypeDto::Ping => ProbeKind::Ping,
			ProbeTypeDto::Port => {
				let port = self.port.trim().parse::<u16>().ok().filter(|p| *p > 0).ok_or_else(|| {
					Error::Validation {
						step: "target",
						errors: FieldErrors::from([(
							"port".to_string(),
							"Must be between 1 and 65535".to_string(),
						)]),
					}
				})?;
				ProbeKind::Port { port }
			},
			ProbeTypeDto::Api => {
				let mut http_headers = self.http_headers.to_pairs();
				if let Some(token) = blank_to_none(&self.token) {
					http_headers.retain(|(k, _)| k != "Authorization");
					let index = self.token_index.unwrap_or(http_headers.len()).min(http_headers.len());
					http_headers.insert(index, ("Authorization".into(), format!("Bearer {token}")));
				}
				ProbeKind::Api(ApiCheck {
					http_method: self.http_method.trim().to_uppercase(),
					payload: blank_to_none(&self.payload),
					payload_type: blank_to_none(&self.payload_type),
					ssl_verification: self.ssl_verification,
					http_headers: HeaderList(http_headers),
					validation_rules: self
						.validation_rules
						.filled()
						.map(|r| ValidationRule {
							rule_type: r.rule_type.trim().to_string(),
							value: r.value.trim().to_string(),
						})
						.collect(),
				})
			},
		};
		Ok(ProbeSpec {
			name: self.name.trim().to_string(),
			description: self.description.clone(),
			target: self.target.trim().to_string(),
			schedule: self.schedule.to_dto(),
			kind,
			extra_kwargs: self.extra_kwargs.clone(),
		})
	}
}

impl FormFields for ProbeForm {
	fn field(&self, name: &str) -> FieldValue {
		let text = |s: &String| FieldValue::Text(s.clone());
		match name {
			"name" => text(&self.name),
			"type" => FieldValue::Text(self.probe_type.as_str().into()),
			"target" => text(&self.target),
			"port" => text(&self.port),
			"description" => text(&self.description),
			"http_method" => text(&self.http_method),
			"payload_type" => text(&self.payload_type),
			"payload" => text(&self.payload),
			"ssl_verification" => FieldValue::Flag(self.ssl_verification.unwrap_or(true)),
			"token" => text(&self.token),
			"http_headers" => FieldValue::Pairs(self.http_headers.pairs()),
			"validation_rules" => FieldValue::Pairs(
				self.validation_rules
					.entries()
					.iter()
					.map(|r| (r.rule_type.clone(), r.value.clone()))
					.collect(),
			),
			other => self.schedule.field(other),
		}
	}
}

fn is_api(probe_type: ProbeTypeDto) -> bool {
	probe_type == ProbeTypeDto::Api
}

impl WizardForm for ProbeForm {
	type Discriminant = ProbeTypeDto;
	type Entity = ProbeDto;
	type Payload = ProbeWrite;

	const ENTITY: &'static str = "Probe";

	fn steps() -> Vec<Step<ProbeTypeDto>> {
		vec![
			Step::new(
				"basics",
				"General",
				vec![
					Rule::required("name"),
					Rule::pattern("name", &SLUG, "Letters, digits, `_`, `.` and `-` only"),
					Rule::required("type"),
				],
			),
			Step::new(
				"target",
				"Target",
				vec![
					Rule::required("target"),
					Rule::pattern("target", &IPV4, "Must be an IPv4 address").when("type", &["PORT"]),
					Rule::pattern("target", &HTTP_URL, "Must be an http(s) URL").when("type", &["URL", "API"]),
					Rule::pattern("target", &HOST, "Must be a hostname or IPv4 address").when("type", &["PING"]),
					Rule::required("port").when("type", &["PORT"]),
					Rule::int_range("port", 1, 65535).when("type", &["PORT"]),
				],
			),
			Step::new(
				"request",
				"Request",
				vec![
					Rule::required("http_method"),
					Rule::pattern("http_method", &HTTP_METHOD, "Unsupported HTTP method"),
					Rule::pattern("payload_type", &PAYLOAD_TYPE, "Use json, text, xml or form"),
					Rule::new("payload", Check::Json).when("payload_type", &["json"]),
				],
			)
			.visible_when(is_api),
			Step::new("headers", "HTTP headers", vec![Rule::new("http_headers", Check::PairsComplete)])
				.visible_when(is_api),
			Step::new("token", "Token", vec![]).visible_when(is_api),
			Step::new(
				"validation",
				"Validation rules",
				vec![Rule::new("validation_rules", Check::PairsComplete)],
			)
			.visible_when(is_api),
			Step::new("schedule", "Schedule", schedule::rules()),
		]
	}

	fn discriminant(&self) -> ProbeTypeDto {
		self.probe_type
	}

	fn from_entity(entity: &ProbeDto) -> Self {
		Self::from_spec(ProbeSpec::from_wire(entity))
	}

	fn entity_key(entity: &ProbeDto) -> Option<String> {
		entity.id.clone()
	}

	fn section_mut(&mut self, section: Section) -> Option<&mut dyn SectionOps> {
		match section {
			Section::Headers => Some(&mut self.http_headers),
			Section::ValidationRules => Some(&mut self.validation_rules),
			_ => None,
		}
	}

	fn build_payload(&self) -> Result<ProbeWrite> {
		self.to_spec()?.into_wire()
	}

	fn route(mode: &Mode, payload: &ProbeWrite) -> (Method, String) {
		match mode {
			Mode::Edit(id) => (Method::PUT, format!("api/probes/update/{id}")),
			Mode::Create | Mode::Clone => (Method::POST, format!("api/probes/update/{}", payload.name)),
		}
	}

	fn expectation(mode: &Mode, payload: &ProbeWrite) -> Expectation {
		match mode {
			Mode::Edit(id) => Expectation::Present(id.clone()),
			Mode::Create | Mode::Clone => Expectation::Present(payload.name.clone()),
		}
	}
}
