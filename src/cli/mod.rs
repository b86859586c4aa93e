// CLI module
// Command-line interface and argument parsing

mod args;

pub use args::{
    BucketArg, ClassArg, CliArgs, Command, CurrencyCommand, FilterArgs, MethodCommand,
    RelayCommand, StatusArg, TwoFactorCommand, TypeArg, UserArg,
};

use clap::Parser;

/// Parse command-line arguments using clap
///
/// If parsing fails (e.g., invalid arguments, missing subcommand, or --help
/// flag), clap displays an error message or help text and exits the process.
///
/// # Returns
///
/// Returns a `CliArgs` struct with the parsed command-line arguments.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
