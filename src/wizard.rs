//! The multi-step form engine behind the probe, SLO and task wizards.
//!
//! A [`Wizard`] walks an ordered list of [`Step`] descriptors. Each step carries
//! its own rules and its own visibility predicate, so hiding a step can never
//! shift another step's rules onto the wrong page.

use std::{collections::BTreeMap, fmt};

use reqwest::Method;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
	backend,
	error::{Error, FieldErrors, Result},
	notify::{Notification, Notifier},
	state::{Expectation, RefetchTrigger},
};

pub mod probe;
pub mod query_check;
pub mod repeated;
pub mod schedule;
pub mod slo;
pub mod task;
pub mod validation;

use repeated::{Section, SectionOps};
use validation::{FormFields, Rule};

pub struct Step<D> {
	pub id: &'static str,
	pub title: &'static str,
	pub visible: fn(D) -> bool,
	pub rules: Vec<Rule>,
}

impl<D> Step<D> {
	pub fn new(id: &'static str, title: &'static str, rules: Vec<Rule>) -> Self {
		Self {
			id,
			title,
			visible: |_| true,
			rules,
		}
	}

	pub fn visible_when(mut self, visible: fn(D) -> bool) -> Self {
		self.visible = visible;
		self
	}
}

impl<D> fmt::Debug for Step<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Step")
			.field("id", &self.id)
			.field("title", &self.title)
			.field("rules", &self.rules.len())
			.finish()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
	Create,
	/// Editing the stored entity with this key
	Edit(String),
	/// New entity seeded from an existing one
	Clone,
}

/// Form state of one entity kind.
pub trait WizardForm: FormFields + Clone + Send + Sync {
	/// Field whose value decides which steps are shown.
	type Discriminant: Copy + PartialEq + fmt::Debug;
	/// Server representation loaded for edit.
	type Entity;
	/// What gets submitted.
	type Payload: Serialize + fmt::Debug + Send + Sync;

	const ENTITY: &'static str;

	fn steps() -> Vec<Step<Self::Discriminant>>;
	fn discriminant(&self) -> Self::Discriminant;
	fn from_entity(entity: &Self::Entity) -> Self;
	/// Key the entity is stored under, used for [`Mode::Edit`].
	fn entity_key(entity: &Self::Entity) -> Option<String>;
	fn section_mut(&mut self, section: Section) -> Option<&mut dyn SectionOps>;
	fn build_payload(&self) -> Result<Self::Payload>;
	/// Adjusts a form loaded from an existing entity before it is saved as a new one.
	fn prepare_clone(&mut self) {}
	fn route(mode: &Mode, payload: &Self::Payload) -> (Method, String);
	/// What the list should show once the write has landed.
	fn expectation(mode: &Mode, payload: &Self::Payload) -> Expectation;
}

/// What happened on [`Wizard::advance`].
#[derive(Debug)]
pub enum Advance<P> {
	Moved(usize),
	/// The last step passed; the payload is ready to submit.
	Submit(P),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Progress {
	Moved(usize),
	Submitted,
}

/// Collaborators a wizard needs to submit.
pub struct WizardContext<'a> {
	pub client: &'a backend::Client,
	pub notifier: &'a dyn Notifier,
	pub trigger: &'a RefetchTrigger,
}

#[derive(Debug)]
pub struct Wizard<F: WizardForm> {
	form: F,
	mode: Mode,
	steps: Vec<Step<F::Discriminant>>,
	active: usize,
	errors: BTreeMap<&'static str, FieldErrors>,
	open: bool,
}

impl<F: WizardForm> Wizard<F> {
	pub fn create(form: F) -> Self {
		Self::with_mode(form, Mode::Create)
	}

	/// Opens the wizard on an existing entity.
	pub fn edit(entity: &F::Entity) -> Self {
		let mode = F::entity_key(entity).map_or(Mode::Create, Mode::Edit);
		Self::with_mode(F::from_entity(entity), mode)
	}

	/// Opens the wizard on a copy of an existing entity, to be saved as a new one.
	pub fn clone_of(entity: &F::Entity) -> Self {
		let mut form = F::from_entity(entity);
		form.prepare_clone();
		Self::with_mode(form, Mode::Clone)
	}

	pub fn with_mode(form: F, mode: Mode) -> Self {
		Self {
			form,
			mode,
			steps: F::steps(),
			active: 0,
			errors: BTreeMap::new(),
			open: true,
		}
	}

	pub fn form(&self) -> &F {
		&self.form
	}

	pub fn form_mut(&mut self) -> &mut F {
		&mut self.form
	}

	pub fn mode(&self) -> &Mode {
		&self.mode
	}

	pub fn is_open(&self) -> bool {
		self.open
	}

	pub fn visible_steps(&self) -> Vec<&Step<F::Discriminant>> {
		let discriminant = self.form.discriminant();
		self.steps
			.iter()
			.filter(|step| (step.visible)(discriminant))
			.collect()
	}

	/// Index into [`Self::visible_steps`]. Stays in range when a discriminant change hides steps.
	pub fn active_step(&self) -> usize {
		self.active
			.min(self.visible_steps().len().saturating_sub(1))
	}

	pub fn active_step_id(&self) -> Option<&'static str> {
		self.visible_steps().get(self.active_step()).map(|s| s.id)
	}

	pub fn is_last_step(&self) -> bool {
		self.active_step() + 1 >= self.visible_steps().len()
	}

	pub fn errors(&self, step_id: &str) -> Option<&FieldErrors> {
		self.errors.get(step_id)
	}

	/// Checks one visible step, recording (or clearing) its field errors.
	pub fn validate_step(&mut self, index: usize) -> Result<()> {
		let (id, outcome) = {
			let steps = self.visible_steps();
			let step = steps.get(index).ok_or(Error::NoSuchStep { index })?;
			(step.id, validation::validate(&self.form, &step.rules))
		};
		match outcome {
			Ok(()) => {
				self.errors.remove(id);
				Ok(())
			},
			Err(errors) => {
				debug!(step = id, ?errors, "step failed validation");
				self.errors.insert(id, errors.clone());
				Err(Error::Validation { step: id, errors })
			},
		}
	}

	/// Validates the active step, then moves forward. On the last step every
	/// visible step is checked and the payload is handed back for submission.
	pub fn advance(&mut self) -> Result<Advance<F::Payload>> {
		if !self.open {
			return Err(Error::WizardClosed);
		}
		let current = self.active_step();
		if let Err(e) = self.validate_step(current) {
			self.active = current;
			return Err(e);
		}
		if !self.is_last_step() {
			self.active = current + 1;
			return Ok(Advance::Moved(self.active));
		}
		for index in 0..self.visible_steps().len() {
			if let Err(e) = self.validate_step(index) {
				self.active = index;
				return Err(e);
			}
		}
		self.active = current;
		Ok(Advance::Submit(self.form.build_payload()?))
	}

	/// Steps back without validating.
	pub fn retreat(&mut self) -> usize {
		self.active = self.active_step().saturating_sub(1);
		self.active
	}

	pub fn add_entry(&mut self, section: Section) -> Result<()> {
		self.form
			.section_mut(section)
			.ok_or(Error::NoSuchSection {
				section: section.name(),
			})?
			.push_blank();
		Ok(())
	}

	pub fn remove_entry(&mut self, section: Section, index: usize) -> Result<()> {
		self.form
			.section_mut(section)
			.ok_or(Error::NoSuchSection {
				section: section.name(),
			})?
			.remove_at(index)
	}

	/// Sends the payload. Success closes the wizard and signals list views to
	/// reload; failure keeps the wizard open with its state untouched.
	#[instrument(skip_all, fields(entity = F::ENTITY, mode = ?self.mode))]
	pub async fn submit(&mut self, ctx: &WizardContext<'_>, payload: &F::Payload) -> Result<()> {
		if !self.open {
			return Err(Error::WizardClosed);
		}
		let (method, path) = F::route(&self.mode, payload);
		let verb = if self.mode == Mode::Create || self.mode == Mode::Clone {
			"created"
		} else {
			"updated"
		};
		match ctx.client.send_json(method, &path, payload).await {
			Ok(_) => {
				info!(%path, "entity submitted");
				ctx.notifier
					.notify(Notification::success(format!("{} {verb}", F::ENTITY)));
				ctx.trigger
					.request(Some(F::expectation(&self.mode, payload)));
				self.open = false;
				Ok(())
			},
			Err(e) => {
				warn!(error = %e, %path, "submission failed");
				ctx.notifier.notify(Notification::error(format!(
					"Could not save {}: {e}",
					F::ENTITY
				)));
				Err(e)
			},
		}
	}

	/// `advance`, submitting when the last step passes.
	pub async fn next(&mut self, ctx: &WizardContext<'_>) -> Result<Progress> {
		match self.advance()? {
			Advance::Moved(index) => Ok(Progress::Moved(index)),
			Advance::Submit(payload) => {
				self.submit(ctx, &payload).await?;
				Ok(Progress::Submitted)
			},
		}
	}

	pub fn close(&mut self) {
		self.open = false;
	}
}

#[cfg(test)]
mod tests {
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	use super::probe::ProbeForm;
	use super::*;
	use crate::{
		backend::api_types::ProbeTypeDto,
		config::Config,
		notify::{ChannelNotifier, Level},
		state::refetch_channel,
	};

	fn filled_url_probe() -> ProbeForm {
		ProbeForm {
			name: "homepage".into(),
			target: "https://example.com".into(),
			..ProbeForm::default()
		}
	}

	#[test]
	fn advance_is_blocked_by_validation_and_retreat_is_free() {
		let mut wizard = Wizard::create(ProbeForm::default());
		let err = wizard.advance().unwrap_err();
		assert!(matches!(err, Error::Validation { step: "basics", .. }));
		assert_eq!(wizard.active_step(), 0);
		assert!(wizard.errors("basics").unwrap().contains_key("name"));

		wizard.form_mut().name = "homepage".into();
		assert!(matches!(wizard.advance().unwrap(), Advance::Moved(1)));
		assert!(wizard.errors("basics").is_none());

		assert_eq!(wizard.retreat(), 0);
		assert_eq!(wizard.retreat(), 0);
	}

	#[test]
	fn steps_follow_the_discriminant() {
		let mut wizard = Wizard::create(filled_url_probe());
		let ids: Vec<_> = wizard.visible_steps().iter().map(|s| s.id).collect();
		assert_eq!(ids, ["basics", "target", "schedule"]);

		wizard.form_mut().probe_type = ProbeTypeDto::Api;
		let ids: Vec<_> = wizard.visible_steps().iter().map(|s| s.id).collect();
		assert_eq!(
			ids,
			["basics", "target", "request", "headers", "token", "validation", "schedule"]
		);
	}

	#[test]
	fn hidden_or_missing_steps_cannot_be_validated() {
		let mut wizard = Wizard::create(filled_url_probe());
		assert!(matches!(
			wizard.validate_step(4),
			Err(Error::NoSuchStep { index: 4 })
		));

		wizard.form_mut().probe_type = ProbeTypeDto::Api;
		assert_eq!(wizard.visible_steps()[4].id, "token");
		wizard.validate_step(4).unwrap();
	}

	#[test]
	fn last_step_yields_payload_instead_of_moving_past_the_end() {
		let mut wizard = Wizard::create(filled_url_probe());
		assert!(matches!(wizard.advance().unwrap(), Advance::Moved(1)));
		assert!(matches!(wizard.advance().unwrap(), Advance::Moved(2)));
		assert!(wizard.is_last_step());
		match wizard.advance().unwrap() {
			Advance::Submit(payload) => assert_eq!(payload.name, "homepage"),
			Advance::Moved(i) => panic!("moved to {i}"),
		}
		assert_eq!(wizard.active_step(), 2);
	}

	#[test]
	fn active_step_is_clamped_when_steps_disappear() {
		let mut form = filled_url_probe();
		form.probe_type = ProbeTypeDto::Api;
		let mut wizard = Wizard::create(form);
		for _ in 0..6 {
			let _ = wizard.advance();
		}
		wizard.form_mut().probe_type = ProbeTypeDto::Url;
		assert_eq!(wizard.active_step(), 2);
		assert_eq!(wizard.active_step_id(), Some("schedule"));
	}

	#[test]
	fn sections_unknown_to_a_form_are_rejected() {
		let mut wizard = Wizard::create(filled_url_probe());
		assert!(matches!(
			wizard.add_entry(Section::Hosts),
			Err(Error::NoSuchSection { section: "hosts" })
		));
		wizard.add_entry(Section::Headers).unwrap();
		wizard.remove_entry(Section::Headers, 1).unwrap();
		assert!(wizard.remove_entry(Section::Headers, 0).is_err());
	}

	#[tokio::test]
	async fn successful_submit_closes_and_signals_refetch() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/probes/update/homepage"))
			.respond_with(ResponseTemplate::new(201))
			.expect(1)
			.mount(&server)
			.await;

		let client = backend::new(&Config {
			base_url: server.uri(),
			..Config::default()
		})
		.unwrap();
		let (notifier, mut toasts) = ChannelNotifier::new();
		let (trigger, listener) = refetch_channel();
		let ctx = WizardContext {
			client: &client,
			notifier: &notifier,
			trigger: &trigger,
		};

		let mut wizard = Wizard::create(filled_url_probe());
		assert_eq!(wizard.next(&ctx).await.unwrap(), Progress::Moved(1));
		assert_eq!(wizard.next(&ctx).await.unwrap(), Progress::Moved(2));
		assert_eq!(wizard.next(&ctx).await.unwrap(), Progress::Submitted);

		assert!(!wizard.is_open());
		assert_eq!(toasts.recv().await.unwrap().level, Level::Success);
		let signal = listener.current();
		assert_eq!(signal.generation, 1);
		assert_eq!(signal.expect, Some(Expectation::Present("homepage".into())));
	}

	#[tokio::test]
	async fn failed_submit_keeps_the_wizard_open() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(500))
			.mount(&server)
			.await;

		let client = backend::new(&Config {
			base_url: server.uri(),
			..Config::default()
		})
		.unwrap();
		let (notifier, mut toasts) = ChannelNotifier::new();
		let (trigger, listener) = refetch_channel();
		let ctx = WizardContext {
			client: &client,
			notifier: &notifier,
			trigger: &trigger,
		};

		let mut wizard = Wizard::create(filled_url_probe());
		let payload = wizard.form().build_payload().unwrap();
		let before = wizard.form().clone();
		assert!(wizard.submit(&ctx, &payload).await.is_err());

		assert!(wizard.is_open());
		assert_eq!(wizard.form(), &before);
		assert_eq!(toasts.recv().await.unwrap().level, Level::Error);
		assert_eq!(listener.current().generation, 0);
	}
}
