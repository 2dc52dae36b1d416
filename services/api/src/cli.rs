use crate::demo::{run_demo, run_time_options, DemoArgs, TimeOptionsArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use vet_dispatch::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Veterinary Dispatch",
    about = "Serve and demonstrate provider availability and emergency dispatch",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect schedule helpers
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },
    /// Run a scripted emergency dispatch against in-memory stores
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum ScheduleCommand {
    /// Print the selectable times of day at a given granularity
    Options(TimeOptionsArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Schedule {
            command: ScheduleCommand::Options(args),
        } => run_time_options(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
