use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// API cost table (.json); the built-in table is used when omitted
    #[arg(long, global = true)]
    pub costs: Option<PathBuf>,
    /// Name of the host the scripts live on
    #[arg(long, global = true, default_value = "home")]
    pub hostname: String,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the static RAM cost of scripts
    Ram(Target),
    /// Resolve imports and write the rewritten module texts
    Compile(Target),
}

#[derive(Args, Debug)]
pub struct Target {
    /// Directory holding the host's .js files
    pub input: PathBuf,
    /// Scripts to process, relative to the input directory (default: all)
    pub files: Vec<String>,
    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Command {
    pub fn target(&self) -> &Target {
        match self {
            Command::Ram(target) | Command::Compile(target) => target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ram_command() {
        let cli = Cli::parse_from(["netscript", "ram", "scripts", "main.js", "--costs", "costs.json"]);
        assert!(matches!(cli.command, Command::Ram(_)));
        let target = cli.command.target();
        assert_eq!(target.input, PathBuf::from("scripts"));
        assert_eq!(target.files, vec!["main.js"]);
        assert_eq!(cli.costs, Some(PathBuf::from("costs.json")));
        assert_eq!(cli.hostname, "home");
        assert!(target.output.is_none());
    }

    #[test]
    fn test_parse_compile_command() {
        let cli = Cli::parse_from(["netscript", "-v", "compile", "scripts", "-o", "out", "--hostname", "n00dles"]);
        assert!(matches!(cli.command, Command::Compile(_)));
        assert_eq!(cli.command.target().output, Some(PathBuf::from("out")));
        assert_eq!(cli.hostname, "n00dles");
        assert!(cli.verbose);
    }
}
