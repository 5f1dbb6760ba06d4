mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use soundbase::config::SoundbaseConfig;

#[derive(Parser)]
#[command(name = "soundbase", version, about = "Storage and analytics for a soundboard bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and apply migrations
    Init,
    /// Check database integrity and print row counts
    Doctor {
        #[arg(long)]
        json: bool,
    },
    /// Fuzzy-search sounds by filename
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Search the view of one guild (its sounds plus shared ones)
        #[arg(long)]
        guild: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Summary of plays, users and voice time
    Stats {
        /// Trailing window in days; 0 for all history
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Users ranked by plays
    TopUsers {
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Sounds ranked by plays
    TopSounds {
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Users (or channels) ranked by voice time
    VoiceTop {
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        limit: Option<usize>,
        /// Rank channels instead of users
        #[arg(long)]
        channels: bool,
        #[arg(long)]
        json: bool,
    },
    /// One user's year in review
    Year {
        username: String,
        year: i32,
        #[arg(long)]
        json: bool,
    },
    /// Sounds played around this date some months ago
    OnThisDay {
        #[arg(long, default_value_t = 12)]
        months: u32,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Close voice sessions left open by a crash
    CloseSessions {
        /// List open sessions without closing them
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = SoundbaseConfig::load()?;

    // Log to stderr so stdout stays clean for --json output.
    let filter = EnvFilter::try_new(&config.logging.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Init => cli::init(&config)?,
        Command::Doctor { json } => cli::doctor::doctor(&config, json)?,
        Command::Search { query, limit, guild, json } => {
            cli::search::search(&config, &query, limit, guild, json)?
        }
        Command::Stats { days, json } => cli::stats::stats(&config, days, json)?,
        Command::TopUsers { days, limit, json } => cli::stats::top_users(&config, days, limit, json)?,
        Command::TopSounds { days, limit, json } => cli::stats::top_sounds(&config, days, limit, json)?,
        Command::VoiceTop { days, limit, channels, json } => {
            cli::stats::voice_top(&config, days, limit, channels, json)?
        }
        Command::Year { username, year, json } => cli::stats::year(&config, &username, year, json)?,
        Command::OnThisDay { months, limit, json } => {
            cli::stats::on_this_day(&config, months, limit, json)?
        }
        Command::CloseSessions { dry_run } => cli::maintenance::close_sessions(&config, dry_run)?,
    }

    Ok(())
}
