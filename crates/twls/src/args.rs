use clap::Parser;

#[derive(Parser)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct GlobalArgs {
    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use verbose output.
    #[arg(global = true, action = clap::ArgAction::Count, long, short, conflicts_with = "quiet")]
    pub verbose: u8,
}

impl GlobalArgs {
    /// Default log filter for the chosen verbosity.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> GlobalArgs {
        Args::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn test_log_filter_follows_verbosity() {
        assert_eq!(parse(&["twls"]).log_filter(), "info");
        assert_eq!(parse(&["twls", "-v"]).log_filter(), "debug");
        assert_eq!(parse(&["twls", "-vv"]).log_filter(), "trace");
        assert_eq!(parse(&["twls", "--quiet"]).log_filter(), "error");
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Args::try_parse_from(["twls", "-q", "-v"]).is_err());
    }
}
