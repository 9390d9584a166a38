use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Client-side row matcher. `/pattern/` is a case-insensitive regex; anything
/// else is a case-insensitive substring.
#[derive(Debug, Clone)]
pub enum Matcher {
	Substring(String),
	Regex(Regex),
}

impl Matcher {
	/// `None` for a blank query, which matches everything.
	pub fn parse(query: &str) -> Option<Self> {
		let query = query.trim();
		if query.is_empty() {
			return None;
		}
		if let Some(pattern) = query
			.strip_prefix('/')
			.and_then(|rest| rest.strip_suffix('/'))
			.filter(|pattern| !pattern.is_empty())
		{
			match RegexBuilder::new(pattern).case_insensitive(true).build() {
				Ok(regex) => return Some(Self::Regex(regex)),
				// half-typed patterns search literally until they compile
				Err(e) => debug!(error = %e, "search pattern is not a valid regex"),
			}
		}
		Some(Self::Substring(query.to_lowercase()))
	}

	pub fn matches(&self, fields: &[&str]) -> bool {
		match self {
			Self::Substring(needle) => fields
				.iter()
				.any(|field| field.to_lowercase().contains(needle.as_str())),
			Self::Regex(regex) => fields.iter().any(|field| regex.is_match(field)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blank_query_matches_everything() {
		assert!(Matcher::parse("   ").is_none());
	}

	#[test]
	fn substring_is_case_insensitive() {
		let matcher = Matcher::parse("LOGIN").unwrap();
		assert!(matcher.matches(&["web", "checks Login page"]));
		assert!(!matcher.matches(&["web", "checks home page"]));
	}

	#[test]
	fn slashes_switch_to_regex() {
		let matcher = Matcher::parse("/^db-\\d+$/").unwrap();
		assert!(matches!(matcher, Matcher::Regex(_)));
		assert!(matcher.matches(&["DB-12"]));
		assert!(!matcher.matches(&["db-main"]));
	}

	#[test]
	fn broken_regex_searches_literally() {
		let matcher = Matcher::parse("/db-(/").unwrap();
		assert!(matches!(matcher, Matcher::Substring(_)));
		assert!(matcher.matches(&["backup /db-(/ job"]));
	}
}
