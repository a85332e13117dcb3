use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use strata_types::{MergeBehavior, OnError};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Strata: layered configuration resolution",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum Policy {
    Ignore,
    Warn,
    Fail,
}

impl From<Policy> for OnError {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Ignore => OnError::Ignore,
            Policy::Warn => OnError::Warn,
            Policy::Fail => OnError::Fail,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge and evaluate a configuration, then print the resulting properties
    Resolve(ResolveArgs),
    /// Show what changes between two configuration roots
    Diff(DiffArgs),
    /// Print the resolved value of every variable
    Vars(ResolveArgs),
    /// Report invalid elements and unresolved references
    Check(ResolveArgs),
}

/// Options shared by every command that loads documents.
#[derive(Args, Clone, Debug, Default)]
pub struct LoadOptions {
    /// Schema file (JSON or TOML) describing the known element types
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
    /// Runtime configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Default document loaded before the root, as LOCATION or LOCATION=BEHAVIOR
    #[arg(long = "default", value_name = "LOCATION", value_parser = parse_default)]
    pub defaults: Vec<(String, MergeBehavior)>,
    /// Explicit variable, outranking every document
    #[arg(short = 'D', long = "var", value_name = "NAME=VALUE", value_parser = parse_variable)]
    pub variables: Vec<(String, String)>,
    /// How tolerable errors are handled
    #[arg(long)]
    pub on_error: Option<Policy>,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Root configuration document or directory
    pub root: String,
    #[command(flatten)]
    pub options: LoadOptions,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Root of the current configuration
    pub old: String,
    /// Root of the new configuration
    pub new: String,
    #[command(flatten)]
    pub options: LoadOptions,
}

fn parse_variable(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", text)),
    }
}

fn parse_default(text: &str) -> Result<(String, MergeBehavior), String> {
    let Some((location, behavior)) = text.rsplit_once('=') else {
        return Ok((text.to_string(), MergeBehavior::default()));
    };
    let behavior = match behavior.to_ascii_lowercase().replace('-', "_").as_str() {
        "merge" => MergeBehavior::Merge,
        "replace" => MergeBehavior::Replace,
        "ignore" => MergeBehavior::Ignore,
        "merge_when_exists" => MergeBehavior::MergeWhenExists,
        "merge_when_missing" => MergeBehavior::MergeWhenMissing,
        other => return Err(format!("unknown merge behavior '{}'", other)),
    };
    Ok((location.to_string(), behavior))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resolve() {
        let cli = Cli::try_parse_from(["strata", "resolve", "server.json"]).unwrap();
        if let Command::Resolve(args) = cli.command {
            assert_eq!(args.root, "server.json");
            assert!(args.options.schema.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_resolve_with_options() {
        let cli = Cli::try_parse_from([
            "strata", "resolve", "server.json",
            "--schema", "schema.toml",
            "-D", "httpPort=9443",
            "--default", "defaults/=merge_when_missing",
            "--on-error", "fail",
        ]).unwrap();
        if let Command::Resolve(args) = cli.command {
            assert_eq!(args.options.schema, Some(PathBuf::from("schema.toml")));
            assert_eq!(args.options.variables, vec![("httpPort".to_string(), "9443".to_string())]);
            assert_eq!(args.options.defaults, vec![("defaults/".to_string(), MergeBehavior::MergeWhenMissing)]);
            assert!(matches!(args.options.on_error, Some(Policy::Fail)));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_default_without_behavior() {
        assert_eq!(parse_default("base.json").unwrap(), ("base.json".to_string(), MergeBehavior::Merge));
        assert!(parse_default("base.json=sometimes").is_err());
    }

    #[test]
    fn rejects_bad_variable() {
        assert!(Cli::try_parse_from(["strata", "vars", "server.json", "-D", "novalue"]).is_err());
        assert_eq!(parse_variable("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
    }

    #[test]
    fn parse_diff() {
        let cli = Cli::try_parse_from(["strata", "diff", "old.json", "new.json"]).unwrap();
        if let Command::Diff(args) = cli.command {
            assert_eq!(args.old, "old.json");
            assert_eq!(args.new, "new.json");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_check() {
        let cli = Cli::try_parse_from(["strata", "check", "conf/"]).unwrap();
        assert!(matches!(cli.command, Command::Check(_)));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["strata", "--verbose", "vars", "server.json"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["strata", "--format", "json", "resolve", "server.json"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
