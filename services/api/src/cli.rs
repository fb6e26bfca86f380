use crate::server;
use crate::stats::{run_stats, StatsArgs};
use admissions::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Admissions Intake Service",
    about = "Run the school admissions intake service or report on stored applications",
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
    /// Print the admissions dashboard counts from a database file
    Stats(StatsArgs),
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
        Command::Stats(args) => run_stats(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["admissions-api"]).expect("parses");
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["admissions-api", "serve", "--port", "8080"])
            .expect("parses");
        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(8080));
                assert_eq!(args.host, None);
            }
            other => panic!("expected serve command, got {other:?}"),
        }
    }

    #[test]
    fn stats_requires_a_database_path() {
        assert!(Cli::try_parse_from(["admissions-api", "stats"]).is_err());

        let cli = Cli::try_parse_from([
            "admissions-api",
            "stats",
            "--database",
            "admissions.db",
            "--today",
            "2025-03-14",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Stats(args)) => {
                assert_eq!(args.database.to_str(), Some("admissions.db"));
                assert!(args.today.is_some());
                assert!(!args.json);
            }
            other => panic!("expected stats command, got {other:?}"),
        }
    }
}
