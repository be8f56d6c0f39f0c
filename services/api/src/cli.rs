use crate::score::{run_score, ScoreArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use hireflow::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "hireflow",
    about = "Run the candidate analysis service and its background workers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service together with the analysis workers (default command)
    Serve(ServeArgs),
    /// Run only the dispatcher and the stale-lease sweeper
    Worker,
    /// Score a stored AI assessment against job criteria without calling the AI service
    Score(ScoreArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Serve the API without running analysis workers in this process
    #[arg(long)]
    pub(crate) no_workers: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Worker => server::run_workers().await,
        Command::Score(args) => run_score(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["hireflow"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn score_collects_repeated_criteria() {
        let cli = Cli::try_parse_from([
            "hireflow",
            "score",
            "--resume",
            "maria.txt",
            "--assessment",
            "maria.json",
            "--criterion",
            "Excel",
            "--criterion",
            "SQL",
            "--eliminatory",
            "English",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Score(args)) => {
                assert_eq!(args.criterion, vec!["Excel", "SQL"]);
                assert_eq!(args.eliminatory, vec!["English"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn serve_accepts_overrides() {
        let cli = Cli::try_parse_from(["hireflow", "serve", "--port", "8081", "--no-workers"])
            .expect("parses");

        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(8081));
                assert!(args.no_workers);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
