use crate::backend::api_types::ScheduleDto;

use super::validation::{Check, FieldValue, Rule, CRON_FIELD, DATE, DAY_OF_WEEK, TIMEZONE};

/// Schedule inputs as typed into the form. Blank means "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleForm {
	pub year: String,
	pub month: String,
	pub day: String,
	pub hour: String,
	pub minute: String,
	pub second: String,
	pub day_of_week: String,
	pub start_date: String,
	pub end_date: String,
	pub timezone: String,
	pub jitter: String,
}

fn opt(value: &str) -> Option<String> {
	let value = value.trim();
	(!value.is_empty()).then(|| value.to_string())
}

impl ScheduleForm {
	pub fn from_dto(dto: Option<&ScheduleDto>) -> Self {
		let Some(dto) = dto else {
			return Self::default();
		};
		let text = |v: &Option<String>| v.clone().unwrap_or_default();
		Self {
			year: text(&dto.year),
			month: text(&dto.month),
			day: text(&dto.day),
			hour: text(&dto.hour),
			minute: text(&dto.minute),
			second: text(&dto.second),
			day_of_week: text(&dto.day_of_week),
			start_date: text(&dto.start_date),
			end_date: text(&dto.end_date),
			timezone: text(&dto.timezone),
			jitter: dto.jitter.map(|j| j.to_string()).unwrap_or_default(),
		}
	}

	/// `None` when every field is blank. `jitter` must already have passed validation.
	pub fn to_dto(&self) -> Option<ScheduleDto> {
		let dto = ScheduleDto {
			year: opt(&self.year),
			month: opt(&self.month),
			day: opt(&self.day),
			hour: opt(&self.hour),
			minute: opt(&self.minute),
			second: opt(&self.second),
			day_of_week: opt(&self.day_of_week).map(|d| d.to_lowercase()),
			start_date: opt(&self.start_date),
			end_date: opt(&self.end_date),
			timezone: opt(&self.timezone),
			jitter: self.jitter.trim().parse().ok(),
		};
		(!dto.is_empty()).then_some(dto)
	}

	/// Resolves `schedule.<name>` field lookups.
	pub fn field(&self, name: &str) -> FieldValue {
		let value = match name {
			"schedule.year" => &self.year,
			"schedule.month" => &self.month,
			"schedule.day" => &self.day,
			"schedule.hour" => &self.hour,
			"schedule.minute" => &self.minute,
			"schedule.second" => &self.second,
			"schedule.day_of_week" => &self.day_of_week,
			"schedule.start_date" => &self.start_date,
			"schedule.end_date" => &self.end_date,
			"schedule.timezone" => &self.timezone,
			"schedule.jitter" => &self.jitter,
			_ => return FieldValue::Absent,
		};
		FieldValue::Text(value.clone())
	}
}

fn cron_range(field: &'static str, min: u32, max: u32) -> Rule {
	Rule::new(field, Check::CronRange { min, max })
}

pub fn rules() -> Vec<Rule> {
	const CRON: &str = "Use *, */n, n, a-b or a comma list";
	let mut rules: Vec<Rule> = [
		"schedule.year",
		"schedule.month",
		"schedule.day",
		"schedule.hour",
		"schedule.minute",
		"schedule.second",
	]
	.into_iter()
	.map(|field| Rule::pattern(field, &CRON_FIELD, CRON))
	.collect();
	rules.extend([
		cron_range("schedule.year", 1970, 9999),
		cron_range("schedule.month", 1, 12),
		cron_range("schedule.day", 1, 31),
		cron_range("schedule.hour", 0, 23),
		cron_range("schedule.minute", 0, 59),
		cron_range("schedule.second", 0, 59),
		Rule::pattern("schedule.day_of_week", &DAY_OF_WEEK, "Use mon-sun, 0-6, ranges or a comma list"),
		Rule::pattern("schedule.start_date", &DATE, "Use YYYY-MM-DD or YYYY-MM-DD HH:MM[:SS]"),
		Rule::pattern("schedule.end_date", &DATE, "Use YYYY-MM-DD or YYYY-MM-DD HH:MM[:SS]"),
		Rule::pattern("schedule.timezone", &TIMEZONE, "Use an IANA zone such as Europe/Oslo"),
		Rule::int_range("schedule.jitter", 0, 86_400),
	]);
	rules
}
