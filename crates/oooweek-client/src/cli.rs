//! Command-line interface definition.

use std::path::PathBuf;

use chrono::Duration;
use clap::Parser;

/// oooweek - Weekly out-of-office overview for a mailing group
#[derive(Debug, Parser)]
#[command(name = "oooweek")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Group address to expand (e.g. team@example.com)
    #[arg(required_unless_present_any = ["reset_secret", "reset_token"])]
    pub group: Option<String>,

    /// Number of weeks ahead to check, after the current one [default: 8]
    #[arg(long)]
    pub weeks: Option<u32>,

    /// Minimum OOO length to show, e.g. 24h, 48h, 1h30m, 2d [default: 24h]
    #[arg(long, value_parser = oooweek_core::parse_duration)]
    pub min_duration: Option<Duration>,

    /// IANA timezone for day boundaries [default: system timezone]
    #[arg(long, env = "CALENDAR_TIMEZONE")]
    pub timezone: Option<String>,

    /// Delete the stored client registration and OAuth token
    #[arg(long)]
    pub reset_secret: bool,

    /// Delete the stored OAuth token
    #[arg(long)]
    pub reset_token: bool,

    /// Path to configuration file
    #[arg(long, short, env = "OOOWEEK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,
}

impl Cli {
    /// Returns whether any reset flag is set.
    pub fn has_reset(&self) -> bool {
        self.reset_secret || self.reset_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_group_and_options() {
        let cli = Cli::try_parse_from([
            "oooweek",
            "--weeks",
            "4",
            "--min-duration",
            "1h30m",
            "--timezone",
            "Europe/Paris",
            "team@example.com",
        ])
        .unwrap();

        assert_eq!(cli.group.as_deref(), Some("team@example.com"));
        assert_eq!(cli.weeks, Some(4));
        assert_eq!(cli.min_duration, Some(Duration::minutes(90)));
        assert_eq!(cli.timezone.as_deref(), Some("Europe/Paris"));
        assert!(!cli.has_reset());
    }

    #[test]
    fn group_required_without_reset() {
        let err = Cli::try_parse_from(["oooweek"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn reset_flags_make_group_optional() {
        let cli = Cli::try_parse_from(["oooweek", "--reset-token"]).unwrap();
        assert!(cli.group.is_none());
        assert!(cli.has_reset());

        let cli = Cli::try_parse_from(["oooweek", "--reset-secret"]).unwrap();
        assert!(cli.reset_secret);
    }

    #[test]
    fn rejects_bad_duration() {
        let err = Cli::try_parse_from(["oooweek", "--min-duration", "24", "g@example.com"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
