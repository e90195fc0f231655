//! CLI entry and dispatch.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use labtrack_core::AppContext;
use labtrack_core::auth::FileCredentialStore;
use labtrack_core::config;

use crate::{logging, ui};

mod commands;

#[derive(Parser)]
#[command(name = "labtrack")]
#[command(version)]
#[command(about = "Track medical test results from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(long)]
        email: String,

        /// Account password (read from stdin when omitted)
        #[arg(long, env = "LABTRACK_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Ask the service for a longer-lived session
        #[arg(long)]
        remember_me: bool,
    },

    /// Sign out and remove stored credentials
    Logout,

    /// Create a new account
    Register {
        #[arg(long)]
        email: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Account password (read from stdin when omitted)
        #[arg(long, env = "LABTRACK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Confirm an email address with the code that was sent to it
    VerifyEmail {
        #[arg(long)]
        email: String,

        /// Verification code from the email
        #[arg(long)]
        code: String,
    },

    /// Send a new email verification code
    ResendVerification {
        #[arg(long)]
        email: String,
    },

    /// Request password reset instructions
    ForgotPassword {
        #[arg(long)]
        email: String,
    },

    /// Show the signed-in user
    Whoami,

    /// Manage test records
    Records {
        #[command(subcommand)]
        command: RecordsCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum RecordsCommands {
    /// List your test records
    List {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Add a test record
    Add(commands::records::AddArgs),
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load().context("load config")?;
    let _log_guard = logging::init(&config)?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli, &config).await })
}

async fn dispatch(cli: Cli, config: &config::Config) -> Result<()> {
    let context = || build_context(config);

    match cli.command {
        Commands::Login {
            email,
            password,
            remember_me,
        } => commands::auth::login(&context()?, &email, password, remember_me).await,
        Commands::Logout => commands::auth::logout(&context()?),
        Commands::Register {
            email,
            first_name,
            last_name,
            password,
        } => {
            commands::auth::register(&context()?, email, first_name, last_name, password).await
        }
        Commands::VerifyEmail { email, code } => {
            commands::auth::verify_email(&context()?, &email, &code).await
        }
        Commands::ResendVerification { email } => {
            commands::auth::resend_verification(&context()?, &email).await
        }
        Commands::ForgotPassword { email } => {
            commands::auth::forgot_password(&context()?, &email).await
        }
        Commands::Whoami => commands::auth::whoami(&context()?).await,
        Commands::Records { command } => match command {
            RecordsCommands::List { json } => commands::records::list(&context()?, json).await,
            RecordsCommands::Add(args) => commands::records::add(&context()?, &args).await,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}

fn build_context(config: &config::Config) -> Result<AppContext> {
    let settings = config.client_settings().context("resolve API settings")?;
    tracing::debug!(base_url = %settings.base_url, "using records service");
    Ok(AppContext::new(
        &settings,
        Arc::new(FileCredentialStore::open_default()),
        Arc::new(ui::TerminalNavigator),
        Arc::new(ui::TerminalNotifier),
    ))
}
