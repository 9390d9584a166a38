//! Task wizard: create, clone and update of scheduled tasks.

use reqwest::Method;

use super::{
	repeated::{Entry, Item, KeyValue, Repeated, Section, SectionOps},
	schedule::{self, ScheduleForm},
	validation::{Check, FieldValue, FormFields, Rule, HOST, SLUG},
	Mode, Step, WizardForm,
};
use crate::{
	backend::api_types::{PromptDto, TaskDto, TaskTypeDto, TaskWrite},
	error::Result,
	inventory::{InventoryCatalog, TargetSelection},
	state::Expectation,
};

const CLONE_SUFFIX: &str = "-copy";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptEntry {
	pub prompt: String,
	pub default_value: String,
	/// Last answer the backend stored; not editable here
	pub value: Option<String>,
}

impl Entry for PromptEntry {
	fn is_blank(&self) -> bool {
		self.prompt.trim().is_empty() && self.default_value.trim().is_empty()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskForm {
	pub name: String,
	pub task_type: TaskTypeDto,
	pub owner: String,
	pub organization: String,
	pub description: String,
	pub args: Repeated<Item>,
	pub kwargs: Repeated<KeyValue>,
	pub metadata: Repeated<KeyValue>,
	pub prompts: Repeated<PromptEntry>,
	pub hosts: Repeated<Item>,
	pub targets: TargetSelection,
	pub schedule: ScheduleForm,
}

impl Default for TaskForm {
	fn default() -> Self {
		Self {
			name: String::new(),
			task_type: TaskTypeDto::default(),
			owner: String::new(),
			organization: String::new(),
			description: String::new(),
			args: Repeated::new(Section::Args),
			kwargs: Repeated::new(Section::Kwargs),
			metadata: Repeated::new(Section::Metadata),
			prompts: Repeated::new(Section::Prompts),
			hosts: Repeated::new(Section::Hosts),
			targets: TargetSelection::default(),
			schedule: ScheduleForm::default(),
		}
	}
}

/// Only remote-execution tasks offer the targets step. Stored targets of
/// other task types are carried through unchanged.
fn runs_on_targets(task_type: TaskTypeDto) -> bool {
	matches!(task_type, TaskTypeDto::Fabric | TaskTypeDto::Ansible)
}

impl TaskForm {
	/// Removes a host row outright. Unlike [`SectionOps::remove_at`] this may
	/// leave the host list empty.
	pub fn clear_host(&mut self, index: usize) -> Result<()> {
		self.hosts.take(index).map(|_| ())
	}

	/// Re-applies the inventory hierarchy once the catalog has loaded, dropping
	/// stored picks it no longer offers.
	pub fn sync_targets(&mut self, catalog: &InventoryCatalog) {
		self.targets.prune(catalog);
	}
}

impl FormFields for TaskForm {
	fn field(&self, name: &str) -> FieldValue {
		let text = |s: &String| FieldValue::Text(s.clone());
		match name {
			"name" => text(&self.name),
			"type" => FieldValue::Text(self.task_type.as_str().into()),
			"owner" => text(&self.owner),
			"organization" => text(&self.organization),
			"description" => text(&self.description),
			"args" => FieldValue::Items(self.args.values()),
			"kwargs" => FieldValue::Pairs(self.kwargs.pairs()),
			"metadata" => FieldValue::Pairs(self.metadata.pairs()),
			"prompts" => FieldValue::Pairs(
				self.prompts
					.entries()
					.iter()
					.map(|p| (p.prompt.clone(), p.default_value.clone()))
					.collect(),
			),
			"hosts" => FieldValue::Items(self.hosts.values()),
			"datacenter" => FieldValue::Text(self.targets.datacenter.clone().unwrap_or_default()),
			other => self.schedule.field(other),
		}
	}
}

impl WizardForm for TaskForm {
	type Discriminant = TaskTypeDto;
	type Entity = TaskDto;
	type Payload = TaskWrite;

	const ENTITY: &'static str = "Task";

	fn steps() -> Vec<Step<TaskTypeDto>> {
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
				"targets",
				"Targets",
				vec![Rule::new(
					"hosts",
					Check::EachItem {
						regex: &HOST,
						message: "Every host must be a hostname or IPv4 address",
					},
				)],
			)
			.visible_when(runs_on_targets),
			Step::new("arguments", "Arguments", vec![Rule::new("kwargs", Check::PairsComplete)]),
			Step::new("metadata", "Metadata", vec![Rule::new("metadata", Check::PairsComplete)]),
			Step::new("prompts", "Prompts", vec![Rule::new("prompts", Check::KeysPresent)]),
			Step::new("schedule", "Schedule", schedule::rules()),
		]
	}

	fn discriminant(&self) -> TaskTypeDto {
		self.task_type
	}

	fn from_entity(task: &TaskDto) -> Self {
		Self {
			name: task.name.clone(),
			task_type: task.task_type,
			owner: task.owner.clone(),
			organization: task.organization.clone(),
			description: task.description.clone(),
			args: Repeated::from_values(Section::Args, &task.args),
			kwargs: Repeated::from_map(Section::Kwargs, &task.kwargs),
			metadata: Repeated::from_map(Section::Metadata, &task.metadata),
			prompts: Repeated::from_entries(
				Section::Prompts,
				task.prompts
					.iter()
					.map(|p| PromptEntry {
						prompt: p.prompt.clone(),
						default_value: p.default_value.clone(),
						value: p.value.clone(),
					})
					.collect(),
			),
			hosts: Repeated::from_values(Section::Hosts, &task.hosts),
			targets: TargetSelection {
				datacenter: task.datacenter.clone(),
				environments: task.environments.clone(),
				components: task.components.clone(),
				subcomponents: task.subcomponents.clone(),
			},
			schedule: ScheduleForm::from_dto(task.schedule.as_ref()),
		}
	}

	/// Tasks are addressed by name on update.
	fn entity_key(task: &TaskDto) -> Option<String> {
		Some(task.name.clone())
	}

	fn section_mut(&mut self, section: Section) -> Option<&mut dyn SectionOps> {
		match section {
			Section::Args => Some(&mut self.args),
			Section::Kwargs => Some(&mut self.kwargs),
			Section::Metadata => Some(&mut self.metadata),
			Section::Prompts => Some(&mut self.prompts),
			Section::Hosts => Some(&mut self.hosts),
			Section::Headers | Section::ValidationRules => None,
		}
	}

	fn build_payload(&self) -> Result<TaskWrite> {
		let targets = self.targets.clone();
		Ok(TaskWrite {
			name: self.name.trim().to_string(),
			task_type: self.task_type,
			owner: self.owner.trim().to_string(),
			organization: self.organization.trim().to_string(),
			description: self.description.clone(),
			schedule: self.schedule.to_dto(),
			args: self.args.to_values(),
			kwargs: self.kwargs.to_map(),
			metadata: self.metadata.to_map(),
			prompts: self
				.prompts
				.filled()
				.map(|p| PromptDto {
					prompt: p.prompt.trim().to_string(),
					default_value: p.default_value.clone(),
					value: p.value.clone(),
				})
				.collect(),
			hosts: self.hosts.to_values(),
			datacenter: targets.datacenter,
			environments: targets.environments,
			components: targets.components,
			subcomponents: targets.subcomponents,
		})
	}

	fn prepare_clone(&mut self) {
		self.name.push_str(CLONE_SUFFIX);
		for prompt in self.prompts.filled_mut() {
			prompt.value = None;
		}
	}

	fn route(mode: &Mode, payload: &TaskWrite) -> (Method, String) {
		match mode {
			Mode::Edit(name) => (Method::PUT, format!("api/tasks/config/{name}")),
			Mode::Create | Mode::Clone => (Method::POST, format!("api/tasks/config/{}", payload.name)),
		}
	}

	fn expectation(_mode: &Mode, payload: &TaskWrite) -> Expectation {
		Expectation::Present(payload.name.clone())
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
		error::Error,
		notify::ChannelNotifier,
		state::refetch_channel,
		wizard::{validation::validate, Progress, Wizard, WizardContext},
	};

	fn stored_task() -> TaskDto {
		serde_json::from_value(json!({
			"id": 17,
			"name": "rotate-logs",
			"type": "fabric",
			"owner": "ops",
			"organization": "infra",
			"status": "enabled",
			"description": "rotates web logs",
			"schedule": {"hour": 3, "minute": "0"},
			"args": ["--compress", "--keep=7"],
			"kwargs": {"path": "/var/log/nginx"},
			"metadata": {"ticket": "OPS-12"},
			"prompts": [{"prompt": "confirm", "default_value": "yes", "value": "no"}],
			"hosts": ["web-1.internal", "10.0.0.4"],
			"datacenter": "ams1",
			"environments": ["prod"],
			"components": ["web"],
			"subcomponents": []
		}))
		.unwrap()
	}

	#[test]
	fn fabric_task_round_trips() {
		let task = stored_task();
		let form = TaskForm::from_entity(&task);
		assert_eq!(form.build_payload().unwrap(), task.writable());
	}

	#[test]
	fn invoke_task_round_trips_with_stored_targets() {
		let mut task = stored_task();
		task.task_type = TaskTypeDto::Invoke;
		task.hosts = vec!["10.0.0.1".into()];
		let form = TaskForm::from_entity(&task);
		let payload = form.build_payload().unwrap();
		assert_eq!(payload.hosts, ["10.0.0.1"]);
		assert_eq!(payload.datacenter.as_deref(), Some("ams1"));
		assert_eq!(payload, task.writable());
	}

	#[test]
	fn local_tasks_hide_the_targets_step() {
		let mut form = TaskForm::from_entity(&stored_task());
		form.task_type = TaskTypeDto::Script;
		let ids: Vec<_> = Wizard::create(form).visible_steps().iter().map(|s| s.id).collect();
		assert_eq!(ids, ["basics", "arguments", "metadata", "prompts", "schedule"]);
	}

	#[test]
	fn sections_keep_their_last_entry_but_hosts_can_be_cleared() {
		let mut wizard = Wizard::create(TaskForm::default());
		for section in [Section::Args, Section::Kwargs, Section::Metadata, Section::Prompts, Section::Hosts] {
			assert!(matches!(
				wizard.remove_entry(section, 0),
				Err(Error::LastEntry { .. })
			));
		}
		wizard.form_mut().clear_host(0).unwrap();
		assert_eq!(wizard.form().hosts.len(), 0);
		assert!(wizard.form_mut().clear_host(0).is_err());
	}

	#[test]
	fn clone_suffixes_the_name_and_forgets_answers() {
		let wizard = Wizard::<TaskForm>::clone_of(&stored_task());
		assert_eq!(wizard.mode(), &Mode::Clone);
		assert_eq!(wizard.form().name, "rotate-logs-copy");
		let payload = wizard.form().build_payload().unwrap();
		assert_eq!(payload.prompts[0].value, None);
		assert_eq!(
			TaskForm::route(wizard.mode(), &payload),
			(Method::POST, "api/tasks/config/rotate-logs-copy".to_string())
		);
	}

	#[test]
	fn hosts_and_prompts_are_checked() {
		let steps = TaskForm::steps();
		let mut form = TaskForm::from_entity(&stored_task());
		form.hosts.push_blank();
		if let Some(host) = form.hosts.get_mut(2) {
			host.value = "not a host!".into();
		}
		assert!(validate(&form, &steps[1].rules).unwrap_err().contains_key("hosts"));

		form.prompts.push_blank();
		if let Some(prompt) = form.prompts.get_mut(1) {
			prompt.default_value = "orphan".into();
		}
		assert!(validate(&form, &steps[4].rules).unwrap_err().contains_key("prompts"));
	}

	#[tokio::test]
	async fn update_puts_to_the_stored_name() {
		let server = MockServer::start().await;
		Mock::given(method("PUT"))
			.and(path("/api/tasks/config/rotate-logs"))
			.and(body_partial_json(json!({"name": "rotate-logs", "args": ["--compress", "--keep=7"]})))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

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

		let mut wizard = Wizard::<TaskForm>::edit(&stored_task());
		loop {
			if wizard.next(&ctx).await.unwrap() == Progress::Submitted {
				break;
			}
		}
		assert_eq!(
			listener.current().expect,
			Some(Expectation::Present("rotate-logs".into()))
		);
	}
}
