//! Application-level shared state containers.
//!
//! Each container has exactly one writer. The writer half is handed to the owning
//! module; everyone else only gets the read half.

use std::collections::BTreeSet;

use tokio::sync::watch;

/// What a writer expects the next list read to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
	/// A row whose id or name equals the key is listed
	Present(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefetchSignal {
	pub generation: u64,
	pub expect: Option<Expectation>,
}

/// Writer half of the "my write likely completed, reload" signal.
#[derive(Debug)]
pub struct RefetchTrigger {
	tx: watch::Sender<RefetchSignal>,
}

/// Read half, watched by list views.
#[derive(Debug, Clone)]
pub struct RefetchListener {
	rx: watch::Receiver<RefetchSignal>,
}

pub fn refetch_channel() -> (RefetchTrigger, RefetchListener) {
	let (tx, rx) = watch::channel(RefetchSignal::default());
	(RefetchTrigger { tx }, RefetchListener { rx })
}

impl RefetchTrigger {
	pub fn request(&self, expect: Option<Expectation>) {
		self.tx.send_modify(|signal| {
			signal.generation += 1;
			signal.expect = expect;
		});
	}

	pub fn listener(&self) -> RefetchListener {
		RefetchListener {
			rx: self.tx.subscribe(),
		}
	}
}

impl RefetchListener {
	/// Waits for the next signal. `None` once the trigger is dropped.
	pub async fn changed(&mut self) -> Option<RefetchSignal> {
		self.rx.changed().await.ok()?;
		Some(self.rx.borrow_and_update().clone())
	}

	pub fn current(&self) -> RefetchSignal {
		self.rx.borrow().clone()
	}
}

pub type Selection = BTreeSet<String>;

/// Held only by the list view that owns the selection.
#[derive(Debug)]
pub struct SelectionWriter {
	tx: watch::Sender<Selection>,
}

/// Read-only view for sibling components such as bulk toolbars.
#[derive(Debug, Clone)]
pub struct SelectionReader {
	rx: watch::Receiver<Selection>,
}

pub fn selection_channel() -> (SelectionWriter, SelectionReader) {
	let (tx, rx) = watch::channel(Selection::new());
	(SelectionWriter { tx }, SelectionReader { rx })
}

impl SelectionWriter {
	pub fn set(&self, ids: impl IntoIterator<Item = String>) {
		self.tx.send_replace(ids.into_iter().collect());
	}

	pub fn toggle(&self, id: &str) {
		self.tx.send_modify(|selection| {
			if !selection.remove(id) {
				selection.insert(id.to_string());
			}
		});
	}

	pub fn forget(&self, id: &str) {
		self.tx.send_if_modified(|selection| selection.remove(id));
	}

	pub fn clear(&self) {
		self.tx.send_if_modified(|selection| {
			let had_any = !selection.is_empty();
			selection.clear();
			had_any
		});
	}

	pub fn reader(&self) -> SelectionReader {
		SelectionReader {
			rx: self.tx.subscribe(),
		}
	}

	pub fn get(&self) -> Selection {
		self.tx.borrow().clone()
	}
}

impl SelectionReader {
	pub fn get(&self) -> Selection {
		self.rx.borrow().clone()
	}

	pub async fn changed(&mut self) -> Option<Selection> {
		self.rx.changed().await.ok()?;
		Some(self.rx.borrow_and_update().clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn refetch_generations_increase() {
		let (trigger, mut listener) = refetch_channel();
		trigger.request(None);
		let first = listener.changed().await.unwrap();
		trigger.request(Some(Expectation::Present("web".into())));
		let second = listener.changed().await.unwrap();
		assert_eq!(first.generation, 1);
		assert_eq!(second.generation, 2);
		assert_eq!(second.expect, Some(Expectation::Present("web".into())));
	}

	#[tokio::test]
	async fn listener_ends_when_trigger_dropped() {
		let (trigger, mut listener) = refetch_channel();
		drop(trigger);
		assert!(listener.changed().await.is_none());
	}

	#[test]
	fn readers_see_owner_writes() {
		let (writer, reader) = selection_channel();
		writer.set(["a".to_string(), "b".to_string()]);
		writer.toggle("a");
		writer.toggle("c");
		assert_eq!(reader.get(), Selection::from(["b".to_string(), "c".to_string()]));
		writer.forget("b");
		writer.clear();
		assert!(reader.get().is_empty());
	}
}
