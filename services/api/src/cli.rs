use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use property_closing::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Property Closing",
    about = "Run the property buying workflow service or walk through a scripted purchase",
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
    /// Walk a purchase from reservation to completion and print each step
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Register the sample listing on startup if the store does not hold it yet
    #[arg(long)]
    pub(crate) seed_listing: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["property-closing-api"]).expect("parse");
        assert!(cli.command.is_none());
    }

    #[test]
    fn serve_flags_override_host_and_port() {
        let cli = Cli::try_parse_from([
            "property-closing-api",
            "serve",
            "--host",
            "0.0.0.0",
            "--port",
            "9090",
            "--seed-listing",
        ])
        .expect("parse");
        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
                assert_eq!(args.port, Some(9090));
                assert!(args.seed_listing);
            }
            other => panic!("expected serve command, got {other:?}"),
        }
    }
}
