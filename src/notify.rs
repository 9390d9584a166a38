//! User-facing notifications ("toasts").
//!
//! Remote failures end here instead of propagating: every async handler in the
//! wizards and list views reports its outcome through a [`Notifier`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Level {
	Success,
	Info,
	Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
	pub level: Level,
	pub message: String,
}

impl Notification {
	pub fn success(message: impl Into<String>) -> Self {
		Self {
			level: Level::Success,
			message: message.into(),
		}
	}

	pub fn info(message: impl Into<String>) -> Self {
		Self {
			level: Level::Info,
			message: message.into(),
		}
	}

	pub fn error(message: impl Into<String>) -> Self {
		Self {
			level: Level::Error,
			message: message.into(),
		}
	}
}

pub trait Notifier: Send + Sync {
	fn notify(&self, notification: Notification);
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Writes notifications to the log. Used by the headless binary.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
	fn notify(&self, notification: Notification) {
		match notification.level {
			Level::Error => warn!(message = %notification.message, "notification"),
			Level::Success | Level::Info => info!(message = %notification.message, "notification"),
		}
	}
}

/// Forwards notifications to whoever renders them.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
	tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
	pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}
}

impl Notifier for ChannelNotifier {
	fn notify(&self, notification: Notification) {
		// receiver gone means nobody is rendering toasts anymore
		let _ = self.tx.send(notification);
	}
}
