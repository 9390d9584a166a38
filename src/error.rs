use std::{collections::BTreeMap, time::Duration};

/// Field name -> message, as attached to a form input's error state.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("validation failed for step `{step}`: {} field(s) invalid", errors.len())]
	Validation {
		step: &'static str,
		errors: FieldErrors,
	},

	#[error("{method} {path} returned HTTP {status}")]
	Status {
		method: reqwest::Method,
		path: String,
		status: reqwest::StatusCode,
	},

	#[error("request to {path} failed: {source}")]
	Transport {
		path: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("{path} did not resolve within {:?}", after)]
	Watchdog { path: String, after: Duration },

	#[error("unexpected response shape from {path}: {detail}")]
	UnexpectedShape { path: String, detail: String },

	#[error("section `{section}` must keep at least one entry")]
	LastEntry { section: &'static str },

	#[error("section `{section}` has no entry at index {index}")]
	NoSuchEntry { section: &'static str, index: usize },

	#[error("no visible wizard step at index {index}")]
	NoSuchStep { index: usize },

	#[error("section `{section}` does not exist on this form")]
	NoSuchSection { section: &'static str },

	#[error("no row with id `{0}` in the current list")]
	UnknownRow(String),

	#[error("`{action}` is not offered for {resource}")]
	UnsupportedAction {
		action: &'static str,
		resource: &'static str,
	},

	#[error("wizard is closed")]
	WizardClosed,

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
	/// Errors that reached the network layer, i.e. the ones surfaced as notifications.
	pub fn is_remote(&self) -> bool {
		matches!(
			self,
			Self::Status { .. } | Self::Transport { .. } | Self::Watchdog { .. } | Self::UnexpectedShape { .. }
		)
	}
}
