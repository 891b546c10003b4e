pub mod run;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5050;

/// rankflow - batch keyword rank tracking over CSV datasets
#[derive(Parser, Debug)]
#[command(
    name = "rankflow",
    version,
    about = "rankflow - batch keyword rank tracking over CSV datasets"
)]
pub struct Cli {
    /// Service host (default 127.0.0.1; overrides config for `serve`)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Service port (default 5050; overrides config for `serve`)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service in the foreground
    Serve {
        /// Path to configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Data directory path
        #[arg(long = "data-dir")]
        data_dir: Option<PathBuf>,
    },

    /// Rank every keyword of a CSV file in place
    Run(run::RunArgs),

    /// Show the state of the job on a running service
    Status {
        /// Session token returned by the upload
        #[arg(long)]
        token: Option<String>,

        /// Device the poller expects
        #[arg(long)]
        device: Option<String>,

        /// Location code the poller expects
        #[arg(long = "location-code")]
        location_code: Option<String>,

        /// Location name the poller expects
        #[arg(long = "location-name")]
        location_name: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cancel the job running on a service
    Cancel {
        /// Session token of the job to cancel
        #[arg(long)]
        token: Option<String>,
    },
}

impl Cli {
    pub fn client_host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn client_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

/// Build the base URL for the service HTTP API.
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

/// Format a connection error message for when the service is not reachable.
pub fn connection_error_message(host: &str, port: u16) -> String {
    format!(
        "Could not connect to rankflow at {}:{}. Is it running? (try: rankflow serve)",
        host, port
    )
}

/// Dispatch the CLI command to the appropriate handler.
pub async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Serve { config, data_dir }) => {
            crate::daemon::start_service(
                config.as_deref(),
                data_dir.as_deref(),
                cli.host.as_deref(),
                cli.port,
            )
            .await
        }
        Some(Commands::Run(args)) => run::cmd_run(args.clone()).await,
        Some(Commands::Status {
            token,
            device,
            location_code,
            location_name,
            json,
        }) => {
            let poller = crate::models::PollerParams {
                session_token: token.clone(),
                device: device.clone(),
                location_code: location_code.clone(),
                location_name: location_name.clone(),
            };
            status::cmd_status(cli.client_host(), cli.client_port(), &poller, *json).await
        }
        Some(Commands::Cancel { token }) => {
            status::cmd_cancel(cli.client_host(), cli.client_port(), token.as_deref()).await
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
