//! Array-valued form sections (args, kwargs, headers, hosts, prompts, rules).

use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
	Args,
	Kwargs,
	Metadata,
	Headers,
	Hosts,
	Prompts,
	ValidationRules,
}

impl Section {
	pub const fn name(self) -> &'static str {
		match self {
			Self::Args => "args",
			Self::Kwargs => "kwargs",
			Self::Metadata => "metadata",
			Self::Headers => "http_headers",
			Self::Hosts => "hosts",
			Self::Prompts => "prompts",
			Self::ValidationRules => "validation_rules",
		}
	}
}

/// A row type with a blank template.
pub trait Entry: Default + Clone {
	fn is_blank(&self) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValue {
	pub key: String,
	pub value: String,
}

impl KeyValue {
	pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			value: value.into(),
		}
	}
}

impl Entry for KeyValue {
	fn is_blank(&self) -> bool {
		self.key.trim().is_empty() && self.value.trim().is_empty()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
	pub value: String,
}

impl Item {
	pub fn new(value: impl Into<String>) -> Self {
		Self {
			value: value.into(),
		}
	}
}

impl Entry for Item {
	fn is_blank(&self) -> bool {
		self.value.trim().is_empty()
	}
}

/// Object-safe handle the wizard uses to edit a section without knowing its row type.
pub trait SectionOps {
	fn len(&self) -> usize;
	fn push_blank(&mut self);
	fn remove_at(&mut self, index: usize) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repeated<T> {
	section: Section,
	entries: Vec<T>,
}

impl<T: Entry> Repeated<T> {
	/// A section holding the single blank template row.
	pub fn new(section: Section) -> Self {
		Self {
			section,
			entries: vec![T::default()],
		}
	}

	/// Loads rows; an empty list still shows one blank row.
	pub fn from_entries(section: Section, entries: Vec<T>) -> Self {
		if entries.is_empty() {
			Self::new(section)
		} else {
			Self { section, entries }
		}
	}

	pub fn entries(&self) -> &[T] {
		&self.entries
	}

	pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
		self.entries.get_mut(index)
	}

	/// Rows the user actually filled in.
	pub fn filled(&self) -> impl Iterator<Item = &T> {
		self.entries.iter().filter(|e| !e.is_blank())
	}

	pub fn filled_mut(&mut self) -> impl Iterator<Item = &mut T> {
		self.entries.iter_mut().filter(|e| !e.is_blank())
	}

	/// Removes a row regardless of how many remain. Only for paths that
	/// deliberately empty a section, such as clearing a host address.
	pub(crate) fn take(&mut self, index: usize) -> Result<T> {
		if index >= self.entries.len() {
			return Err(Error::NoSuchEntry {
				section: self.section.name(),
				index,
			});
		}
		Ok(self.entries.remove(index))
	}
}

impl<T: Entry> SectionOps for Repeated<T> {
	fn len(&self) -> usize {
		self.entries.len()
	}

	fn push_blank(&mut self) {
		self.entries.push(T::default());
	}

	fn remove_at(&mut self, index: usize) -> Result<()> {
		if index >= self.entries.len() {
			return Err(Error::NoSuchEntry {
				section: self.section.name(),
				index,
			});
		}
		if self.entries.len() <= 1 {
			return Err(Error::LastEntry {
				section: self.section.name(),
			});
		}
		self.entries.remove(index);
		Ok(())
	}
}

impl Repeated<KeyValue> {
	pub fn from_map(section: Section, map: &BTreeMap<String, String>) -> Self {
		Self::from_entries(
			section,
			map.iter().map(|(k, v)| KeyValue::new(k, v)).collect(),
		)
	}

	pub fn from_pairs(section: Section, pairs: &[(String, String)]) -> Self {
		Self::from_entries(
			section,
			pairs.iter().map(|(k, v)| KeyValue::new(k, v)).collect(),
		)
	}

	/// Filled rows in entry order. A repeated key replaces the earlier value in place.
	pub fn to_pairs(&self) -> Vec<(String, String)> {
		let mut pairs: Vec<(String, String)> = Vec::new();
		for kv in self.filled() {
			let key = kv.key.trim();
			match pairs.iter_mut().find(|(k, _)| k == key) {
				Some(pair) => pair.1 = kv.value.clone(),
				None => pairs.push((key.to_string(), kv.value.clone())),
			}
		}
		pairs
	}

	/// Joins the filled rows into an object. Later duplicate keys win.
	pub fn to_map(&self) -> BTreeMap<String, String> {
		self.filled()
			.map(|kv| (kv.key.trim().to_string(), kv.value.clone()))
			.collect()
	}

	pub fn pairs(&self) -> Vec<(String, String)> {
		self.entries
			.iter()
			.map(|kv| (kv.key.clone(), kv.value.clone()))
			.collect()
	}
}

impl Repeated<Item> {
	pub fn from_values(section: Section, values: &[String]) -> Self {
		Self::from_entries(section, values.iter().map(Item::new).collect())
	}

	pub fn to_values(&self) -> Vec<String> {
		self.filled().map(|i| i.value.trim().to_string()).collect()
	}

	pub fn values(&self) -> Vec<String> {
		self.entries.iter().map(|i| i.value.clone()).collect()
	}
}
