//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Live-update coordination for development builds
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Config file path (default: refresh.toml)
    #[arg(short = 'C', long, default_value = "refresh.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the hubs and forward build events read from stdin
    #[command(visible_alias = "s")]
    Serve {
        /// Address to bind (overrides [hub].address)
        #[arg(short, long)]
        address: Option<String>,

        /// Port to bind (overrides [hub].port, 0 picks a free port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a client that follows one channel
    #[command(visible_alias = "l")]
    Listen {
        #[command(flatten)]
        args: ListenArgs,
    },
}

/// Listen command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct ListenArgs {
    /// Page the client runs in; supplies the default scheme and hostname
    #[arg(long, default_value = "http://localhost/", value_hint = clap::ValueHint::Url)]
    pub page: String,

    /// Channel (build variant) to follow
    #[arg(short, long)]
    pub name: String,

    /// Hub port
    #[arg(short, long, default_value_t = crate::config::DEFAULT_PORT)]
    pub port: u16,

    /// Hub address (default: page hostname)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Socket protocol (default: ws for http pages, wss for https)
    #[arg(long)]
    pub protocol: Option<String>,

    /// Shell command applying a hot update; `$REFRESH_HASH` holds the target build
    #[arg(long)]
    pub apply: Option<String>,

    /// Shell command performing a full reload
    #[arg(long)]
    pub reload: Option<String>,
}

#[allow(unused)]
impl Cli {
    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }
    pub const fn is_listen(&self) -> bool {
        matches!(self.command, Commands::Listen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from(["refresh", "serve", "--port", "0", "-a", "127.0.0.1"]);
        assert!(cli.is_serve());
        match cli.command {
            Commands::Serve { address, port } => {
                assert_eq!(address.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(0));
            }
            _ => unreachable!(),
        }
        assert_eq!(cli.config, PathBuf::from("refresh.toml"));
    }

    #[test]
    fn test_listen_defaults() {
        let cli = Cli::parse_from(["refresh", "--verbose", "listen", "--name", "dashboard"]);
        assert!(cli.verbose);
        let Commands::Listen { args } = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.name, "dashboard");
        assert_eq!(args.port, 45678);
        assert_eq!(args.page, "http://localhost/");
        assert!(args.apply.is_none());
    }

    #[test]
    fn test_listen_requires_name() {
        assert!(Cli::try_parse_from(["refresh", "listen"]).is_err());
    }

    #[test]
    fn test_command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_verbose_and_version() {
        let cli = Cli::parse_from(["refresh", "-v", "listen", "-n", "dashboard"]);
        assert!(cli.verbose);

        let err = Cli::try_parse_from(["refresh", "-V"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
