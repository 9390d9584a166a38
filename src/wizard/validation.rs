//! Declarative per-field rules, checked one wizard step at a time.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::FieldErrors;

lazy_static! {
	pub static ref IPV4: Regex = Regex::new(
		r"^((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)$"
	).unwrap();
	pub static ref HOST: Regex = Regex::new(
		r"^(((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)|[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*)$"
	).unwrap();
	pub static ref HTTP_URL: Regex = Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap();
	pub static ref HTTP_METHOD: Regex = Regex::new(r"^(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)$").unwrap();
	pub static ref SLUG: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").unwrap();
	/// `*`, `*/n`, `n`, `a-b`, and comma lists of those
	pub static ref CRON_FIELD: Regex = Regex::new(
		r"^(\*(/\d+)?|\d+(-\d+)?(/\d+)?(,\d+(-\d+)?(/\d+)?)*)$"
	).unwrap();
	pub static ref DAY_OF_WEEK: Regex = Regex::new(
		r"^(\*|((mon|tue|wed|thu|fri|sat|sun|[0-6])(-(mon|tue|wed|thu|fri|sat|sun|[0-6]))?)(,((mon|tue|wed|thu|fri|sat|sun|[0-6])(-(mon|tue|wed|thu|fri|sat|sun|[0-6]))?))*)$"
	).unwrap();
	pub static ref DATE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}([ T]\d{2}:\d{2}(:\d{2})?)?$").unwrap();
	pub static ref TIMEZONE: Regex = Regex::new(r"^(UTC|[A-Za-z_]+(/[A-Za-z0-9_+-]+)+)$").unwrap();
	pub static ref TIME_WINDOW: Regex = Regex::new(r"^\d+[smhdw]$").unwrap();
}

/// What a rule sees of a form field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
	Text(String),
	Flag(bool),
	/// Rows of a `{key, value}`-shaped repeated section
	Pairs(Vec<(String, String)>),
	/// Rows of a `{value}`-shaped repeated section
	Items(Vec<String>),
	Absent,
}

impl FieldValue {
	fn text(&self) -> Option<&str> {
		match self {
			Self::Text(t) => Some(t.trim()),
			_ => None,
		}
	}

	fn is_blank(&self) -> bool {
		match self {
			Self::Text(t) => t.trim().is_empty(),
			Self::Flag(_) => false,
			Self::Pairs(rows) => rows
				.iter()
				.all(|(k, v)| k.trim().is_empty() && v.trim().is_empty()),
			Self::Items(items) => items.iter().all(|i| i.trim().is_empty()),
			Self::Absent => true,
		}
	}
}

/// Read access to a form's fields by name, e.g. `"target"` or `"schedule.hour"`.
pub trait FormFields {
	fn field(&self, name: &str) -> FieldValue;
}

#[derive(Debug, Clone)]
pub enum Check {
	Required,
	Pattern {
		regex: &'static Regex,
		message: &'static str,
	},
	IntRange {
		min: i64,
		max: i64,
	},
	/// `min` is exclusive, `max` inclusive
	FloatRange {
		min: f64,
		max: f64,
	},
	/// Applies `then` only while `field` holds one of `one_of`. Exempt otherwise.
	When {
		field: &'static str,
		one_of: &'static [&'static str],
		then: Box<Check>,
	},
	/// Every non-blank row has both a key and a value
	PairsComplete,
	/// Every non-blank row has a key
	KeysPresent,
	/// Non-blank text parses as JSON
	Json,
	/// Every number in a cron expression (step sizes excluded) lies in `min..=max`
	CronRange {
		min: u32,
		max: u32,
	},
	/// Every non-blank item matches
	EachItem {
		regex: &'static Regex,
		message: &'static str,
	},
}

#[derive(Debug, Clone)]
pub struct Rule {
	pub field: &'static str,
	pub check: Check,
}

impl Rule {
	pub fn required(field: &'static str) -> Self {
		Self {
			field,
			check: Check::Required,
		}
	}

	pub fn pattern(field: &'static str, regex: &'static Regex, message: &'static str) -> Self {
		Self {
			field,
			check: Check::Pattern { regex, message },
		}
	}

	pub fn int_range(field: &'static str, min: i64, max: i64) -> Self {
		Self {
			field,
			check: Check::IntRange { min, max },
		}
	}

	pub fn new(field: &'static str, check: Check) -> Self {
		Self { field, check }
	}

	/// Restricts this rule to forms where `field` holds one of `one_of`.
	pub fn when(self, field: &'static str, one_of: &'static [&'static str]) -> Self {
		Self {
			field: self.field,
			check: Check::When {
				field,
				one_of,
				then: Box::new(self.check),
			},
		}
	}
}

fn check<F: FormFields + ?Sized>(form: &F, value: &FieldValue, rule: &Check) -> Option<String> {
	match rule {
		Check::Required => value.is_blank().then(|| "This field is required".to_string()),
		Check::Pattern { regex, message } => match value.text() {
			Some(t) if !t.is_empty() && !regex.is_match(t) => Some((*message).to_string()),
			_ => None,
		},
		Check::IntRange { min, max } => match value.text() {
			Some("") | None => None,
			Some(t) => match t.parse::<i64>() {
				Ok(n) if (*min..=*max).contains(&n) => None,
				Ok(_) => Some(format!("Must be between {min} and {max}")),
				Err(_) => Some("Must be a whole number".to_string()),
			},
		},
		Check::FloatRange { min, max } => match value.text() {
			Some("") | None => None,
			Some(t) => match t.parse::<f64>() {
				Ok(n) if n > *min && n <= *max => None,
				Ok(_) => Some(format!("Must be greater than {min} and at most {max}")),
				Err(_) => Some("Must be a number".to_string()),
			},
		},
		Check::When { field, one_of, then } => {
			let discriminant = form.field(field);
			let applies = discriminant
				.text()
				.is_some_and(|d| one_of.iter().any(|candidate| candidate.eq_ignore_ascii_case(d)));
			if applies {
				check(form, value, then)
			} else {
				None
			}
		},
		Check::PairsComplete => match value {
			FieldValue::Pairs(rows) => rows
				.iter()
				.filter(|(k, v)| !(k.trim().is_empty() && v.trim().is_empty()))
				.any(|(k, v)| k.trim().is_empty() || v.trim().is_empty())
				.then(|| "Every entry needs both a key and a value".to_string()),
			_ => None,
		},
		Check::KeysPresent => match value {
			FieldValue::Pairs(rows) => rows
				.iter()
				.filter(|(k, v)| !(k.trim().is_empty() && v.trim().is_empty()))
				.any(|(k, _)| k.trim().is_empty())
				.then(|| "Every entry needs a name".to_string()),
			_ => None,
		},
		Check::Json => match value.text() {
			Some(t) if !t.is_empty() => serde_json::from_str::<serde_json::Value>(t)
				.err()
				.map(|e| format!("Not valid JSON: {e}")),
			_ => None,
		},
		Check::CronRange { min, max } => {
			let expr = value.text()?;
			let in_range = expr
				.split(',')
				.filter_map(|part| part.split('/').next())
				.flat_map(|range| range.split('-'))
				.filter(|n| *n != "*")
				.all(|n| n.parse::<u32>().map_or(true, |n| (*min..=*max).contains(&n)));
			(!in_range).then(|| format!("Values must be between {min} and {max}"))
		},
		Check::EachItem { regex, message } => match value {
			FieldValue::Items(items) => items
				.iter()
				.map(|i| i.trim())
				.filter(|i| !i.is_empty())
				.any(|i| !regex.is_match(i))
				.then(|| (*message).to_string()),
			_ => None,
		},
	}
}

/// Runs `rules` against `form`. The first failing rule per field wins.
pub fn validate<F: FormFields + ?Sized>(form: &F, rules: &[Rule]) -> Result<(), FieldErrors> {
	let mut errors = FieldErrors::new();
	for rule in rules {
		if errors.contains_key(rule.field) {
			continue;
		}
		let value = form.field(rule.field);
		if let Some(message) = check(form, &value, &rule.check) {
			errors.insert(rule.field.to_string(), message);
		}
	}
	if errors.is_empty() {
		Ok(())
	} else {
		Err(errors)
	}
}
