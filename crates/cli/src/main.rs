//! Examhub CLI - the portal's session from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (password read from EXAMHUB_PASSWORD or stdin)
//! examhub login -e teacher@school.edu
//!
//! # Show the resolved session
//! examhub whoami
//!
//! # What would the portal do with this path?
//! examhub route /teacher
//!
//! # Generate exam access tokens
//! examhub token generate -n 5
//! ```
//!
//! # Commands
//!
//! - `login` / `logout` / `signup` - Session lifecycle
//! - `whoami` - Print the session snapshot
//! - `refresh` - Refetch the profile, bypassing the cache
//! - `route` - Evaluate the route guard for a path
//! - `passwd` - Change the signed-in user's password
//! - `token` - Generate or check exam access tokens

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "examhub")]
#[command(author, version, about = "Examhub command-line client")]
struct Cli {
    /// Keep the session in memory only (nothing is read from or written to disk)
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
    /// Sign out and expire the cached profile
    Logout,
    /// Create an account
    Signup {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Full name
        #[arg(short, long)]
        name: Option<String>,

        /// Requested role (`school_admin`, `teacher`, `student`)
        #[arg(short, long)]
        role: Option<String>,
    },
    /// Show the current session
    Whoami {
        /// Print the raw session snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Refetch the profile, bypassing the cache
    Refresh,
    /// Show what the portal would do when opening a path
    Route {
        /// Portal path, e.g. `/teacher`
        path: String,
    },
    /// Change the signed-in user's password
    Passwd,
    /// Exam access tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Generate new tokens
    Generate {
        /// How many tokens to generate
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
    /// Normalise and validate a token typed by a student
    Check {
        /// The token as typed
        token: String,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    use commands::session::{self, Portal};

    match cli.command {
        Commands::Token { action } => match action {
            TokenAction::Generate { count } => commands::token::generate(count),
            TokenAction::Check { token } => commands::token::check(&token)?,
        },
        command => {
            let portal = Portal::open(cli.ephemeral).await?;
            let outcome = match command {
                Commands::Login { email } => session::login(&portal, &email).await,
                Commands::Logout => session::logout(&portal).await,
                Commands::Signup { email, name, role } => {
                    session::signup(&portal, &email, name, role.as_deref()).await
                }
                Commands::Whoami { json } => session::whoami(&portal, json).await,
                Commands::Refresh => session::refresh(&portal).await,
                Commands::Route { path } => session::route(&portal, &path).await,
                Commands::Passwd => session::passwd(&portal).await,
                Commands::Token { .. } => Ok(()),
            };
            portal.close();
            outcome?;
        }
    }
    Ok(())
}
