//! The three list endpoints and what a row of each looks like.

use serde::{de::DeserializeOwned, Serialize};

use super::dialog::RowAction;
use crate::backend::api_types::{ProbeDto, PromptDto, SloDto, StatusDto, TaskDto};

pub trait ListRow: DeserializeOwned + Serialize + Clone + Send + Sync + 'static {
	/// Key used in action endpoints and the selection. Falls back to the name.
	fn row_id(&self) -> String;
	fn row_name(&self) -> &str;
	fn status(&self) -> Option<StatusDto> {
		None
	}
	fn set_status(&mut self, _status: StatusDto) {}
	/// Fields the client-side search looks at.
	fn search_fields(&self) -> Vec<&str>;
	fn prompts(&self) -> &[PromptDto] {
		&[]
	}
}

fn id_or_name(id: &Option<String>, name: &str) -> String {
	id.clone().unwrap_or_else(|| name.to_string())
}

impl ListRow for ProbeDto {
	fn row_id(&self) -> String {
		id_or_name(&self.id, &self.name)
	}

	fn row_name(&self) -> &str {
		&self.name
	}

	fn status(&self) -> Option<StatusDto> {
		self.status
	}

	fn set_status(&mut self, status: StatusDto) {
		self.status = Some(status);
	}

	fn search_fields(&self) -> Vec<&str> {
		let mut fields = vec![
			self.name.as_str(),
			self.probe_type.as_str(),
			self.target.as_str(),
			self.description.as_str(),
		];
		fields.extend(self.operational_status.as_deref());
		fields
	}
}

impl ListRow for TaskDto {
	fn row_id(&self) -> String {
		id_or_name(&self.id, &self.name)
	}

	fn row_name(&self) -> &str {
		&self.name
	}

	fn status(&self) -> Option<StatusDto> {
		self.status
	}

	fn set_status(&mut self, status: StatusDto) {
		self.status = Some(status);
	}

	fn search_fields(&self) -> Vec<&str> {
		vec![
			self.name.as_str(),
			self.task_type.as_str(),
			self.owner.as_str(),
			self.organization.as_str(),
			self.description.as_str(),
		]
	}

	fn prompts(&self) -> &[PromptDto] {
		&self.prompts
	}
}

impl ListRow for SloDto {
	fn row_id(&self) -> String {
		id_or_name(&self.id, &self.name)
	}

	fn row_name(&self) -> &str {
		&self.name
	}

	fn search_fields(&self) -> Vec<&str> {
		vec![
			self.name.as_str(),
			self.description.as_str(),
			self.target.target_type.as_str(),
		]
	}
}

/// A remote list and the row actions it offers.
pub trait ListResource: Send + Sync + 'static {
	type Row: ListRow;
	const NAME: &'static str;
	/// Base path; action endpoints hang off it, e.g. `{PATH}/enable/{id}`.
	const PATH: &'static str;
	const ACTIONS: &'static [RowAction];
}

#[derive(Debug, Clone, Copy)]
pub struct Probes;

impl ListResource for Probes {
	type Row = ProbeDto;
	const NAME: &'static str = "probes";
	const PATH: &'static str = "api/probes";
	const ACTIONS: &'static [RowAction] = &[RowAction::Toggle, RowAction::Delete];
}

#[derive(Debug, Clone, Copy)]
pub struct Tasks;

impl ListResource for Tasks {
	type Row = TaskDto;
	const NAME: &'static str = "tasks";
	const PATH: &'static str = "api/tasks";
	const ACTIONS: &'static [RowAction] = &[
		RowAction::Toggle,
		RowAction::Delete,
		RowAction::Run,
		RowAction::Schedule,
	];
}

#[derive(Debug, Clone, Copy)]
pub struct Slos;

impl ListResource for Slos {
	type Row = SloDto;
	const NAME: &'static str = "slos";
	const PATH: &'static str = "api/sli";
	const ACTIONS: &'static [RowAction] = &[];
}
