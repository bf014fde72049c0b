use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "azfarm",
    about = "Azure Batch render-farm provider and asset sync",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Cloud provider configuration (flat TOML table)
    #[arg(short, long, global = true, default_value = "azfarm.toml")]
    config: PathBuf,
    /// Asset sync configuration (default: same file as --config)
    #[arg(long, global = true)]
    transfer_config: Option<PathBuf>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the Batch account is reachable with the configured credentials
    Verify,
    /// List the allowed VM sizes as hardware types
    Hardware,
    /// List the selectable OS images
    Images,
    /// List every instance the provider owns
    Instances,
    /// Start instances of a VM size and image
    Create {
        #[arg(long)]
        hardware: String,
        #[arg(long)]
        image: String,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Remove instances from their pools
    Terminate {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Reboot instances
    Reboot {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print the OS hostname of an instance
    Hostname { id: String },
    /// Run the asset sync listener for a job event
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },
}

#[derive(Subcommand)]
enum SyncAction {
    /// Job submitted: upload source folders
    Upload {
        #[command(flatten)]
        job: JobArgs,
    },
    /// Worker starting a job: download the container
    Download {
        /// Name of the worker starting the job
        #[arg(long)]
        slave: String,
        #[command(flatten)]
        job: JobArgs,
    },
}

#[derive(Args)]
struct JobArgs {
    #[arg(long, default_value = "")]
    job_id: String,
    #[arg(long, default_value = "")]
    job_name: String,
    #[arg(long, default_value = "")]
    group: String,
    #[arg(long, default_value = "")]
    pool: String,
    #[arg(long, default_value = "")]
    secondary_pool: String,
}

impl From<JobArgs> for azfarm_core::JobInfo {
    fn from(args: JobArgs) -> Self {
        Self {
            id: args.job_id,
            name: args.job_name,
            group: args.group,
            pool: args.pool,
            secondary_pool: args.secondary_pool,
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let provider = || commands::provider::load(&cli.config);
    let transfer_config = cli.transfer_config.as_deref().unwrap_or(cli.config.as_path());

    match cli.command {
        Commands::Verify => commands::provider::verify(&provider()?),
        Commands::Hardware => commands::provider::hardware(&provider()?),
        Commands::Images => commands::provider::images(&provider()?),
        Commands::Instances => commands::provider::instances(&provider()?),
        Commands::Create { hardware, image, count } => {
            commands::provider::create(&provider()?, &hardware, &image, count)
        }
        Commands::Terminate { ids } => commands::provider::terminate(&provider()?, &ids),
        Commands::Reboot { ids } => commands::provider::reboot(&provider()?, &ids),
        Commands::Hostname { id } => commands::provider::hostname(&provider()?, &id),
        Commands::Sync { action } => match action {
            SyncAction::Upload { job } => commands::sync::upload(transfer_config, job.into()),
            SyncAction::Download { slave, job } => {
                commands::sync::download(transfer_config, &slave, job.into())
            }
        },
    }
}
