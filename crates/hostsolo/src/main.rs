//! `hostsolo` command-line front-end

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

const DEFAULT_ENV: &str = "prod";

#[derive(Parser)]
#[command(name = "hostsolo")]
#[command(about = "Host Solo - single-host deployments with isolated environments")]
#[command(version)]
struct Cli {
    /// Directory to look for hostsolo.yaml from (searches upward)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    project: PathBuf,

    /// Log external calls
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy, stop and inspect applications
    Deploy {
        #[command(subcommand)]
        command: DeployCommands,
    },

    /// Show every app in every environment
    Status {
        /// Only this environment
        #[arg(short, long)]
        env: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Manage environments
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },

    /// Manage backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Manage DNS records
    Dns {
        #[command(subcommand)]
        command: DnsCommands,
    },

    /// Manage the reverse proxy
    Proxy {
        #[command(subcommand)]
        command: ProxyCommands,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum DeployCommands {
    /// Deploy an application to an environment
    Up {
        /// Application name
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
        /// Image tag to deploy instead of the declared one
        #[arg(short, long)]
        tag: Option<String>,
        /// Pull the image before deploying (default)
        #[arg(long, overrides_with = "no_pull")]
        pull: bool,
        /// Deploy the locally available image without pulling
        #[arg(long, overrides_with = "pull")]
        no_pull: bool,
    },

    /// Stop a deployed application
    Stop {
        /// Application name
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
    },

    /// Restart an application at its running tag
    Restart {
        /// Application name
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
    },

    /// Show application logs
    Logs {
        /// Application name
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
        /// Follow log output
        #[arg(short, long)]
        follow: bool,
        /// Number of lines of history
        #[arg(short = 'n', long, default_value = "100")]
        tail: usize,
    },
}

#[derive(Subcommand)]
enum EnvCommands {
    /// List environments and whether their network exists
    List,

    /// Create an environment's network
    Create {
        /// Environment name
        name: String,
        /// Subdomain (defaults to the declared one, then the name)
        #[arg(short, long)]
        subdomain: Option<String>,
    },

    /// Tear an environment down
    Destroy {
        /// Environment name
        name: String,
        /// Also delete the environment's data directory; irreversible
        #[arg(long)]
        remove_data: bool,
        /// Destroy even with running applications
        #[arg(short, long)]
        force: bool,
        /// Confirm the destroy
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Back up an application's data now
    Now {
        /// Application name
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
    },

    /// List backups, most recent first
    List {
        /// Application name
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
        /// Maximum number of backups to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Restore a backup; the application is left stopped
    Restore {
        /// Application name
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
        /// Backup timestamp
        #[arg(short, long)]
        timestamp: String,
        /// Confirm overwriting the application's data
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete a backup
    Delete {
        /// Application name
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
        /// Backup timestamp
        #[arg(short, long)]
        timestamp: String,
        /// Confirm the delete
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete backups beyond the retention count
    Prune {
        /// Application name
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
        /// Confirm the delete
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum DnsCommands {
    /// Create or update the record for an environment
    Setup {
        /// Application served at the hostname
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
        /// Record target (detected when omitted)
        #[arg(long)]
        ip: Option<String>,
    },

    /// List records in the zone
    List,

    /// Delete the record for an environment
    Delete {
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
        /// Confirm the delete
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ProxyCommands {
    /// Start the reverse proxy
    Up,
    /// Stop the reverse proxy
    Down,
    /// Restart the reverse proxy
    Restart,
    /// Show reverse proxy logs
    Logs {
        /// Follow log output
        #[arg(short, long)]
        follow: bool,
        /// Number of lines of history
        #[arg(short = 'n', long, default_value = "100")]
        tail: usize,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate hostsolo.yaml
    Validate,

    /// Print the effective spec of an application
    Show {
        /// Application name
        app: String,
        /// Target environment
        #[arg(short, long, default_value = DEFAULT_ENV)]
        env: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    smol::block_on(async move {
        let project = &cli.project;
        match cli.command {
            Commands::Deploy { command } => match command {
                DeployCommands::Up {
                    app,
                    env,
                    tag,
                    pull: _,
                    no_pull,
                } => commands::deploy::up(project, &app, &env, tag, !no_pull).await,
                DeployCommands::Stop { app, env } => commands::deploy::stop(project, &app, &env).await,
                DeployCommands::Restart { app, env } => {
                    commands::deploy::restart(project, &app, &env).await
                }
                DeployCommands::Logs {
                    app,
                    env,
                    follow,
                    tail,
                } => commands::deploy::logs(project, &app, &env, follow, tail).await,
            },
            Commands::Status { env, json } => {
                commands::status::run(project, env.as_deref(), json).await
            }
            Commands::Env { command } => match command {
                EnvCommands::List => commands::env::list(project).await,
                EnvCommands::Create { name, subdomain } => {
                    commands::env::create(project, &name, subdomain.as_deref()).await
                }
                EnvCommands::Destroy {
                    name,
                    remove_data,
                    force,
                    yes,
                } => commands::env::destroy(project, &name, remove_data, force, yes).await,
            },
            Commands::Backup { command } => match command {
                BackupCommands::Now { app, env } => commands::backup::now(project, &app, &env).await,
                BackupCommands::List {
                    app,
                    env,
                    limit,
                    json,
                } => commands::backup::list(project, &app, &env, limit, json).await,
                BackupCommands::Restore {
                    app,
                    env,
                    timestamp,
                    yes,
                } => commands::backup::restore(project, &app, &env, &timestamp, yes).await,
                BackupCommands::Delete {
                    app,
                    env,
                    timestamp,
                    yes,
                } => commands::backup::delete(project, &app, &env, &timestamp, yes).await,
                BackupCommands::Prune { app, env, yes } => {
                    commands::backup::prune(project, &app, &env, yes).await
                }
            },
            Commands::Dns { command } => match command {
                DnsCommands::Setup { app, env, ip } => {
                    commands::dns::setup(project, &app, &env, ip.as_deref()).await
                }
                DnsCommands::List => commands::dns::list(project).await,
                DnsCommands::Delete { env, yes } => commands::dns::delete(project, &env, yes).await,
            },
            Commands::Proxy { command } => match command {
                ProxyCommands::Up => commands::proxy::up(project).await,
                ProxyCommands::Down => commands::proxy::down(project).await,
                ProxyCommands::Restart => commands::proxy::restart(project).await,
                ProxyCommands::Logs { follow, tail } => {
                    commands::proxy::logs(project, follow, tail).await
                }
            },
            Commands::Config { command } => match command {
                ConfigCommands::Validate => commands::config::validate(project),
                ConfigCommands::Show { app, env, json } => {
                    commands::config::show(project, &app, &env, json)
                }
            },
        }
    })
}
