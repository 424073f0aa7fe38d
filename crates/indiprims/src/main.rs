mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, ServerArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "indiprims", version, about = "INDI instrument control CLI")]
struct Cli {
    #[command(flatten)]
    server: ServerArgs,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.server, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_with_server() {
        let cli = Cli::try_parse_from([
            "indiprims",
            "--server",
            "observatory.local:7625",
            "watch",
            "--device",
            "Mount",
            "--count",
            "3",
        ])
        .expect("watch args should parse");

        assert_eq!(cli.server.server.to_string(), "observatory.local:7625");
        assert!(matches!(cli.command, Command::Watch(_)));
    }

    #[test]
    fn server_flag_is_global() {
        let cli = Cli::try_parse_from(["indiprims", "get", "Mount", "-s", "[::1]:7624"])
            .expect("global server flag should parse after the subcommand");
        assert_eq!(cli.server.server.host(), "::1");
    }

    #[test]
    fn rejects_conflicting_vector_kinds() {
        let err = Cli::try_parse_from([
            "indiprims",
            "set",
            "Mount",
            "CONNECTION",
            "--switch",
            "--number",
            "CONNECT=On",
        ])
        .expect_err("conflicting kinds should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn set_requires_assignments() {
        let err = Cli::try_parse_from(["indiprims", "set", "Mount", "CONNECTION"])
            .expect_err("missing assignments should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn blobs_require_a_device() {
        let err = Cli::try_parse_from(["indiprims", "watch", "--blobs", "Also"])
            .expect_err("--blobs without --device should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
