pub mod commands;
pub mod config;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use hotel_price_scout::proxy::{ProxyDescriptor, ProxyProvider};
use hotel_price_scout::RoomType;

#[derive(Parser)]
#[command(name = "scout", author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a file (defaults to the data directory)
    #[arg(long, global = true)]
    pub log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape prices for one or more hotels
    Scrape(ScrapeArgs),

    /// Manage scraping profiles
    Profile {
        /// Profile name to show or create
        #[arg(required = false)]
        name: Option<String>,

        /// List all available profiles
        #[arg(short, long)]
        list: bool,

        /// Create the profile with defaults when it does not exist
        #[arg(long)]
        init: bool,
    },

    /// Print the preset booking flow as profile steps
    Steps {
        /// Check-in date (defaults to today)
        #[arg(long)]
        check_in: Option<NaiveDate>,

        /// Check-out date (defaults to the day after check-in)
        #[arg(long)]
        check_out: Option<NaiveDate>,

        #[arg(long, default_value_t = 2)]
        adults: u32,
    },

    /// Check that configured proxies can reach a target
    ProxyCheck {
        #[arg(short, long)]
        profile: Option<String>,

        #[arg(short, long, default_value = "https://www.booking.com")]
        target: String,

        /// Per-proxy timeout in seconds
        #[arg(long, default_value_t = 15)]
        timeout: u64,

        #[command(flatten)]
        proxy: ProxyArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeArgs {
    /// Hotel listing pages; the profile's URL is used when none are given
    pub urls: Vec<String>,

    /// Site profile to use
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Number of check-in dates to scrape
    #[arg(short, long)]
    pub days: Option<u32>,

    /// Room types to keep (repeatable)
    #[arg(long = "room-type")]
    pub room_types: Vec<RoomType>,

    /// First check-in date (defaults to today)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Hotel id of the first URL; later URLs count up from it
    #[arg(long, default_value_t = 1)]
    pub hotel_id: i64,

    #[arg(long)]
    pub hotel_name: Option<String>,

    /// Scan id to correlate results with stored history
    #[arg(long)]
    pub run_id: Option<i64>,

    /// Write results here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(long, env = "WEBDRIVER_URL")]
    pub webdriver: Option<String>,

    #[command(flatten)]
    pub proxy: ProxyArgs,
}

/// Proxy given on the command line or through the environment
#[derive(Args, Debug, Clone)]
pub struct ProxyArgs {
    #[arg(long = "proxy-url", env = "PROXY_URL")]
    pub url: Option<String>,

    /// http, socks5, brightdata or oxylabs
    #[arg(long = "proxy-type", env = "PROXY_TYPE", default_value = "http")]
    pub provider: ProxyProvider,

    #[arg(long = "proxy-username", env = "PROXY_USERNAME")]
    pub username: Option<String>,

    #[arg(long = "proxy-password", env = "PROXY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long = "proxy-country", env = "PROXY_COUNTRY")]
    pub country: Option<String>,

    /// Rotate after this many requests
    #[arg(long = "proxy-rotation-interval", env = "PROXY_ROTATION_INTERVAL")]
    pub rotation_interval: Option<u32>,
}

impl ProxyArgs {
    /// Descriptor for the flags, if any proxy was given
    pub fn descriptor(&self) -> Option<ProxyDescriptor> {
        if self.url.is_none() && self.username.is_none() {
            return None;
        }

        let mut proxy = ProxyDescriptor::new(self.provider);
        if let Some(url) = &self.url {
            proxy = proxy.with_url(url.clone());
        }
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            proxy = proxy.with_credentials(username.clone(), password.clone());
        }
        if let Some(country) = &self.country {
            proxy = proxy.with_country(country.clone());
        }
        if let Some(interval) = self.rotation_interval {
            proxy = proxy.rotate_every(interval);
        }
        Some(proxy)
    }
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scrape(args) => {
            info!("Scraping {} hotel(s)", args.urls.len().max(1));
            commands::scrape(args).await
        }
        Commands::Profile { name, list, init } => {
            if list {
                commands::list_profiles()
            } else if let Some(name) = name {
                info!("Managing profile: {}", name);
                commands::manage_profile(&name, init)
            } else {
                commands::show_default_profile()
            }
        }
        Commands::Steps {
            check_in,
            check_out,
            adults,
        } => commands::print_steps(check_in, check_out, adults),
        Commands::ProxyCheck {
            profile,
            target,
            timeout,
            proxy,
        } => {
            info!("Checking proxies against {}", target);
            commands::proxy_check(profile.as_deref(), &proxy, &target, timeout).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn test_scrape_arguments() {
        let cli = Cli::try_parse_from([
            "scout",
            "scrape",
            "https://www.booking.com/hotel/il/a.html",
            "https://www.booking.com/hotel/il/b.html",
            "--days",
            "7",
            "--room-type",
            "with_breakfast",
            "--start",
            "2026-03-01",
            "--proxy-type",
            "socks5",
            "--proxy-url",
            "127.0.0.1:9050",
        ])
        .unwrap();

        let Commands::Scrape(args) = cli.command else {
            panic!("expected scrape command");
        };
        assert_eq!(args.urls.len(), 2);
        assert_eq!(args.days, Some(7));
        assert_eq!(args.room_types, vec![RoomType::WithBreakfast]);
        assert_eq!(args.start, NaiveDate::from_ymd_opt(2026, 3, 1));

        let proxy = args.proxy.descriptor().unwrap();
        assert_eq!(proxy.provider, ProxyProvider::Socks5);
        assert_eq!(proxy.url.as_deref(), Some("127.0.0.1:9050"));
    }

    #[test]
    fn test_rejects_unknown_room_type() {
        assert!(Cli::try_parse_from(["scout", "scrape", "--room-type", "suite"]).is_err());
    }

    #[test]
    fn test_log_file_flag_takes_optional_path() {
        let cli = Cli::try_parse_from(["scout", "profile", "--list", "--log-file"]).unwrap();
        assert_eq!(cli.log_file, Some(None));

        let cli = Cli::try_parse_from(["scout", "steps", "--log-file", "/tmp/scout.log"]).unwrap();
        assert_eq!(cli.log_file, Some(Some(PathBuf::from("/tmp/scout.log"))));
    }
}
