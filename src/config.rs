use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use color_eyre::eyre;
use redact::Secret;

/// Command line / environment surface of the `opsdash` binary.
#[derive(Parser, Debug)]
#[command(name = "opsdash", about = "Synchronizes the ops dashboard lists against its backend")]
pub struct Cli {
	#[arg(long, env = "OPSDASH_BASE_URL", default_value = "http://localhost:8000")]
	pub base_url: String,
	#[arg(long, env = "OPSDASH_API_TOKEN", hide_env_values = true)]
	pub api_token: Option<String>,
	/// Send the bearer token on list/read calls as well as on mutating calls
	#[arg(long, env = "OPSDASH_AUTH_READS", default_value_t = true, action = clap::ArgAction::Set)]
	pub auth_reads: bool,
	#[arg(long, env = "OPSDASH_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
	pub request_timeout_secs: u64,
	#[arg(long, env = "OPSDASH_WATCHDOG_SECS", default_value_t = 20)]
	pub watchdog_secs: u64,
	#[arg(long, env = "OPSDASH_REFRESH_SECS", default_value_t = 300)]
	pub refresh_secs: u64,
	#[arg(long, env = "OPSDASH_QUERY_DEBOUNCE_SECS", default_value_t = 6)]
	pub query_debounce_secs: u64,
	#[arg(long, env = "OPSDASH_REFETCH_ATTEMPTS", default_value_t = 5)]
	pub refetch_attempts: u32,
	#[arg(long, env = "OPSDASH_REFETCH_BACKOFF_MS", default_value_t = 1000)]
	pub refetch_backoff_ms: u64,
	#[arg(long, env = "OPSDASH_PAGE_SIZE", default_value_t = 25)]
	pub page_size: u32,
	#[arg(long, env = "OPSDASH_LISTEN", default_value = "0.0.0.0:8080")]
	pub listen: SocketAddr,
}

#[derive(Clone, Debug)]
pub struct Config {
	pub base_url: String,
	pub api_token: Option<Secret<String>>,
	pub auth_reads: bool,
	pub request_timeout: Duration,
	pub watchdog: Duration,
	pub refresh_interval: Duration,
	pub query_debounce: Duration,
	pub refetch_attempts: u32,
	pub refetch_backoff: Duration,
	pub page_size: u32,
	pub listen: SocketAddr,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			base_url: "http://localhost:8000".into(),
			api_token: None,
			auth_reads: true,
			request_timeout: Duration::from_secs(30),
			watchdog: Duration::from_secs(20),
			refresh_interval: Duration::from_secs(300),
			query_debounce: Duration::from_secs(6),
			refetch_attempts: 5,
			refetch_backoff: Duration::from_millis(1000),
			page_size: 25,
			listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
		}
	}
}

impl TryFrom<Cli> for Config {
	type Error = eyre::Report;

	fn try_from(cli: Cli) -> eyre::Result<Self> {
		if cli.page_size == 0 {
			eyre::bail!("OPSDASH_PAGE_SIZE must be at least 1");
		}
		if cli.watchdog_secs == 0 {
			eyre::bail!("OPSDASH_WATCHDOG_SECS must be at least 1");
		}
		let api_token = cli
			.api_token
			.filter(|token| !token.is_empty())
			.map(Secret::new);
		Ok(Self {
			base_url: cli.base_url.trim_end_matches('/').to_string(),
			api_token,
			auth_reads: cli.auth_reads,
			request_timeout: Duration::from_secs(cli.request_timeout_secs),
			watchdog: Duration::from_secs(cli.watchdog_secs),
			refresh_interval: Duration::from_secs(cli.refresh_secs.max(1)),
			query_debounce: Duration::from_secs(cli.query_debounce_secs),
			refetch_attempts: cli.refetch_attempts,
			refetch_backoff: Duration::from_millis(cli.refetch_backoff_ms),
			page_size: cli.page_size,
			listen: cli.listen,
		})
	}
}

pub fn new() -> eyre::Result<Config> {
	Config::try_from(Cli::parse())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_dashboard_timings() {
		let cli = Cli::parse_from(["opsdash"]);
		let config = Config::try_from(cli).unwrap();
		assert_eq!(config.refresh_interval, Duration::from_secs(300));
		assert_eq!(config.watchdog, Duration::from_secs(20));
		assert_eq!(config.query_debounce, Duration::from_secs(6));
		assert!(config.auth_reads);
		assert!(config.api_token.is_none());
	}

	#[test]
	fn trailing_slash_is_trimmed_and_token_kept() {
		let cli = Cli::parse_from([
			"opsdash",
			"--base-url",
			"https://ops.example.com/",
			"--api-token",
			"s3cr3t",
			"--auth-reads",
			"false",
		]);
		let config = Config::try_from(cli).unwrap();
		assert_eq!(config.base_url, "https://ops.example.com");
		assert_eq!(
			config.api_token.as_ref().map(|t| t.expose_secret().as_str()),
			Some("s3cr3t")
		);
		assert!(!config.auth_reads);
	}

	#[test]
	fn zero_page_size_is_rejected() {
		let cli = Cli::parse_from(["opsdash", "--page-size", "0"]);
		assert!(Config::try_from(cli).is_err());
	}
}
