//! Confirmation dialogs for single-row actions.

use reqwest::Method;

use crate::backend::api_types::{PromptAnswer, PromptDto, RunRequest, StatusDto};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
	/// Enable or disable, depending on the row's current status
	Toggle,
	Delete,
	Run,
	Schedule,
}

impl RowAction {
	pub const fn name(self) -> &'static str {
		match self {
			Self::Toggle => "toggle",
			Self::Delete => "delete",
			Self::Run => "run",
			Self::Schedule => "schedule",
		}
	}
}

/// A pending action bound to one row. Nothing is sent until it is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmDialog {
	pub action: RowAction,
	pub row_id: String,
	pub row_name: String,
	pub label: &'static str,
	pub icon: &'static str,
	/// Status the row ends up in once a toggle succeeds
	pub target_status: Option<StatusDto>,
	pub prompts: Vec<PromptAnswer>,
}

impl ConfirmDialog {
	pub(crate) fn new(
		action: RowAction,
		row_id: String,
		row_name: String,
		status: Option<StatusDto>,
		prompts: &[PromptDto],
	) -> Self {
		let target_status = match action {
			// a row without a status reads as disabled
			RowAction::Toggle => Some(status.unwrap_or(StatusDto::Disabled).toggled()),
			_ => None,
		};
		let (label, icon) = match (action, target_status) {
			(RowAction::Toggle, Some(StatusDto::Disabled)) => ("Disable", "pause"),
			(RowAction::Toggle, _) => ("Enable", "play_arrow"),
			(RowAction::Delete, _) => ("Delete", "delete"),
			(RowAction::Run, _) => ("Run", "rocket_launch"),
			(RowAction::Schedule, _) => ("Schedule", "schedule"),
		};
		let prompts = match action {
			RowAction::Run => prompts
				.iter()
				.map(|p| PromptAnswer {
					prompt: p.prompt.clone(),
					value: p.default_value.clone(),
				})
				.collect(),
			_ => Vec::new(),
		};
		Self {
			action,
			row_id,
			row_name,
			label,
			icon,
			target_status,
			prompts,
		}
	}

	/// Sets the run-time answer for `prompt`. Returns false if the task has no such prompt.
	pub fn answer(&mut self, prompt: &str, value: impl Into<String>) -> bool {
		match self.prompts.iter_mut().find(|p| p.prompt == prompt) {
			Some(answer) => {
				answer.value = value.into();
				true
			},
			None => false,
		}
	}

	pub(crate) fn endpoint(&self, base: &str) -> (Method, String) {
		let id = &self.row_id;
		match (self.action, self.target_status) {
			(RowAction::Toggle, Some(StatusDto::Enabled)) => (Method::POST, format!("{base}/enable/{id}")),
			(RowAction::Toggle, _) => (Method::POST, format!("{base}/disable/{id}")),
			(RowAction::Delete, _) => (Method::DELETE, format!("{base}/delete/{id}")),
			(RowAction::Run, _) => (Method::POST, format!("{base}/run/{id}")),
			(RowAction::Schedule, _) => (Method::POST, format!("{base}/schedule/{id}")),
		}
	}

	pub(crate) fn run_request(&self) -> RunRequest {
		RunRequest {
			prompts: self.prompts.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn toggle_label_and_icon_follow_status() {
		let enabled = ConfirmDialog::new(RowAction::Toggle, "7".into(), "web".into(), Some(StatusDto::Enabled), &[]);
		assert_eq!((enabled.label, enabled.icon), ("Disable", "pause"));
		assert_eq!(enabled.endpoint("api/probes"), (Method::POST, "api/probes/disable/7".into()));

		let disabled = ConfirmDialog::new(RowAction::Toggle, "7".into(), "web".into(), Some(StatusDto::Disabled), &[]);
		assert_eq!((disabled.label, disabled.icon), ("Enable", "play_arrow"));
		assert_eq!(disabled.endpoint("api/probes"), (Method::POST, "api/probes/enable/7".into()));
	}

	#[test]
	fn run_dialog_prefills_prompt_defaults() {
		let prompts = [PromptDto {
			prompt: "branch".into(),
			default_value: "main".into(),
			value: Some("release".into()),
		}];
		let mut dialog = ConfirmDialog::new(RowAction::Run, "3".into(), "deploy".into(), None, &prompts);
		assert_eq!(dialog.prompts[0].value, "main");
		assert!(dialog.answer("branch", "hotfix"));
		assert!(!dialog.answer("region", "eu"));
		assert_eq!(dialog.run_request().prompts[0].value, "hotfix");
	}
}
