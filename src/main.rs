use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use patchwork::config::PatchworkConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "patchwork")]
#[command(version, about = "Patch tracking service for mailing-list driven projects")]
pub struct Cli {
    /// Path to the config file (defaults to ./patchwork.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path. Overrides the config file and PATCHWORK_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the REST API
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Absolute URL prefix used in every emitted link
        #[arg(long)]
        base_url: Option<String>,

        /// Send permissive CORS headers
        #[arg(long)]
        cors: bool,
    },
    /// Create or migrate the database
    Init {
        /// Do not insert the stock patch states
        #[arg(long)]
        no_default_states: bool,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Manage patch states
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Manage user accounts and API tokens
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage project maintainers
    Maintainer {
        #[command(subcommand)]
        command: MaintainerCommands,
    },
    /// Manage patch submitters
    Person {
        #[command(subcommand)]
        command: PersonCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ProjectCommands {
    /// Register a project
    Add {
        /// Short name used in URLs and filters
        linkname: String,
        /// Display name
        name: String,
        #[arg(long, default_value = "")]
        listid: String,
        #[arg(long, default_value = "")]
        listemail: String,
        #[arg(long, default_value = "")]
        web_url: String,
        #[arg(long, default_value = "")]
        scm_url: String,
        #[arg(long, default_value = "")]
        webscm_url: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum StateCommands {
    /// Add a patch state
    Add {
        name: String,
        /// Position in the state list
        #[arg(long, default_value = "0")]
        ordering: i32,
        /// Patches in this state need maintainer attention
        #[arg(long)]
        action_required: bool,
    },
    /// List patch states in display order
    List,
}

#[derive(Subcommand, Clone)]
pub enum UserCommands {
    /// Create a user and print its API token
    Add {
        username: String,
        email: String,
        #[arg(long)]
        superuser: bool,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Replace a user's API token and print the new one
    Token {
        /// Username, email or id
        user: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum MaintainerCommands {
    /// Make a user a maintainer of a project
    Add {
        /// Username, email or id
        user: String,
        /// Project linkname or id
        project: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum PersonCommands {
    /// Register a submitter
    Add {
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config =
        PatchworkConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_env()?;
    if let Some(path) = &cli.db_path {
        config.database.path = path.clone();
    }
    patchwork::logging::init(&config.logging)?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            base_url,
            cors,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(base_url) = base_url {
                config.site.base_url = base_url;
            }
            config.server.cors |= cors;
            config.validate()?;
            cmd::cmd_serve(&config).await?;
        }
        Commands::Init { no_default_states } => cmd::cmd_init(&config, !no_default_states)?,
        Commands::Project { command } => cmd::cmd_project(&config, command)?,
        Commands::State { command } => cmd::cmd_state(&config, command)?,
        Commands::User { command } => cmd::cmd_user(&config, command)?,
        Commands::Maintainer { command } => cmd::cmd_maintainer(&config, command)?,
        Commands::Person { command } => cmd::cmd_person(&config, command)?,
    }

    Ok(())
}
