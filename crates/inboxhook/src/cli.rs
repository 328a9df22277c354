//! Command-line arguments.

use clap::Parser;

/// Watches an IMAP mailbox and hands matching action links to automation.
///
/// All connection and filter settings come from the environment; see
/// `--check-config` for what was picked up.
#[derive(Debug, Parser)]
#[command(name = "inboxhook", version, about)]
pub struct Cli {
    /// Connect, run one check cycle, log out and exit
    #[arg(long, conflicts_with = "check_config")]
    pub once: bool,

    /// Validate the configuration, print a redacted summary and exit
    #[arg(long)]
    pub check_config: bool,

    /// Debug logging when RUST_LOG is not set
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_run_the_watcher() {
        let cli = Cli::try_parse_from(["inboxhook"]).unwrap();
        assert!(!cli.once);
        assert!(!cli.check_config);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_once_verbose() {
        let cli = Cli::try_parse_from(["inboxhook", "--once", "-v"]).unwrap();
        assert!(cli.once);
        assert!(cli.verbose);
    }

    #[test]
    fn test_once_conflicts_with_check_config() {
        assert!(Cli::try_parse_from(["inboxhook", "--once", "--check-config"]).is_err());
    }
}
