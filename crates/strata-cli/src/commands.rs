use std::sync::Arc;

use anyhow::Context;
use colored::{ColoredString, Colorize};
use serde_json::json;
use strata_diff::{compute_delta, resolved_variables, ConfigDelta, DeltaKind, DeltaReason};
use strata_eval::{EvaluationResult, UnresolvedReference};
use strata_merge::FsDocumentSource;
use strata_runtime::{ConfigRuntime, DefaultDocumentConfig, RuntimeConfig};
use strata_schema::{InMemorySchemaRegistry, SchemaDocument, SchemaRegistry};
use strata_store::InMemoryStore;
use strata_types::ConfigId;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Resolve(args) => cmd_resolve(args, &cli.format).await,
        Command::Diff(args) => cmd_diff(args, &cli.format),
        Command::Vars(args) => cmd_vars(args, &cli.format),
        Command::Check(args) => cmd_check(args, &cli.format).await,
    }
}

fn load_registry(options: &LoadOptions) -> anyhow::Result<Arc<dyn SchemaRegistry>> {
    let Some(path) = &options.schema else {
        return Ok(Arc::new(InMemorySchemaRegistry::new()));
    };
    let document = SchemaDocument::load(path).with_context(|| format!("reading schema {}", path.display()))?;
    let registry = InMemorySchemaRegistry::from_document(document)
        .with_context(|| format!("registering schema {}", path.display()))?;
    Ok(Arc::new(registry))
}

fn runtime_config(root: &str, options: &LoadOptions) -> anyhow::Result<RuntimeConfig> {
    let mut config = match &options.config {
        Some(path) => RuntimeConfig::load(path).with_context(|| format!("reading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    config.root_document = root.to_string();
    config
        .default_documents
        .extend(options.defaults.iter().map(|(location, behavior)| DefaultDocumentConfig {
            location: location.clone(),
            behavior: *behavior,
        }));
    config.variables.extend(options.variables.iter().cloned());
    if let Some(policy) = options.on_error {
        config.on_error = policy.into();
    }
    Ok(config)
}

/// A runtime over the file system with a throwaway in-memory store.
fn build_runtime(root: &str, options: &LoadOptions, registry: Arc<dyn SchemaRegistry>) -> anyhow::Result<ConfigRuntime> {
    Ok(ConfigRuntime::new(
        runtime_config(root, options)?,
        registry,
        Arc::new(InMemoryStore::new()),
        Arc::new(FsDocumentSource::new()),
    ))
}

fn marker(kind: DeltaKind) -> ColoredString {
    match kind {
        DeltaKind::Added => "+".green().bold(),
        DeltaKind::Removed => "-".red().bold(),
        DeltaKind::Modified => "~".yellow().bold(),
    }
}

fn print_result(result: &EvaluationResult) {
    let indent = "  ".repeat(depth(&result.identity));
    println!("{}{} {}", indent, result.identity.to_string().bold(), format!("({})", result.pid).dimmed());
    for (key, value) in &result.properties {
        println!("{}  {} = {}", indent, key.cyan(), value);
    }
}

fn depth(identity: &ConfigId) -> usize {
    let mut depth = 0;
    let mut current = identity;
    while let Some(parent) = current.parent() {
        depth += 1;
        current = parent;
    }
    depth
}

fn print_delta(delta: &ConfigDelta, depth: usize) {
    let note = match (delta.kind, delta.reason) {
        (DeltaKind::Modified, DeltaReason::NestedUpdateOnly) => " (nested only)".dimmed().to_string(),
        _ => String::new(),
    };
    println!("{}{} {}{}", "  ".repeat(depth), marker(delta.kind), delta.identity, note);
    for nested in &delta.nested {
        print_delta(nested, depth + 1);
    }
}

fn describe(unresolved: &UnresolvedReference) -> String {
    match unresolved {
        UnresolvedReference::Reference { attribute, target } => {
            format!("{}: no object for {}", attribute, target)
        }
        UnresolvedReference::Service { attribute, service, count } => {
            format!("{}: {} instances expose service {}", attribute, count, service)
        }
        UnresolvedReference::Wildcard { attribute, target } => format!("{}: every {}", attribute, target),
    }
}

async fn cmd_resolve(args: ResolveArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let registry = load_registry(&args.options)?;
    let runtime = build_runtime(&args.root, &args.options, registry)?;
    let report = runtime
        .refresh()
        .await
        .with_context(|| format!("resolving {}", args.root))?;
    let state = runtime.state();

    match format {
        OutputFormat::Json => {
            let results: Vec<&EvaluationResult> = state.results.values().collect();
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Text => {
            for result in state.results.values() {
                for r in result.walk() {
                    print_result(r);
                }
            }
            for (identity, error) in &report.failed {
                println!("{} {}: {}", "✗".red().bold(), identity, error);
            }
            println!(
                "{} {} objects resolved, {} deferred",
                "✓".green().bold(),
                report.updated.len(),
                report.deferred.len()
            );
        }
    }
    Ok(())
}

fn cmd_diff(args: DiffArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let registry = load_registry(&args.options)?;
    let old = build_runtime(&args.old, &args.options, registry.clone())?;
    let new = build_runtime(&args.new, &args.options, registry.clone())?;
    let (old_snapshot, old_vars) = old.load().with_context(|| format!("loading {}", args.old))?;
    let (new_snapshot, new_vars) = new.load().with_context(|| format!("loading {}", args.new))?;
    let delta = compute_delta(&old_snapshot, &old_vars, &new_snapshot, &new_vars, &*registry)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&delta)?),
        OutputFormat::Text => {
            if delta.is_empty() {
                println!("No changes.");
                return Ok(());
            }
            for (name, kind) in &delta.variables {
                println!("{} variable {}", marker(*kind), name.bold());
            }
            for element in &delta.elements {
                print_delta(element, 0);
            }
        }
    }
    Ok(())
}

fn cmd_vars(args: ResolveArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let registry = load_registry(&args.options)?;
    let runtime = build_runtime(&args.root, &args.options, registry)?;
    let (_, variables) = runtime.load().with_context(|| format!("loading {}", args.root))?;
    let values = resolved_variables(&variables)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&values)?),
        OutputFormat::Text if values.is_empty() => println!("No variables defined."),
        OutputFormat::Text => {
            for (name, value) in &values {
                println!("{} = {}", name.bold(), value);
            }
        }
    }
    Ok(())
}

async fn cmd_check(args: ResolveArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let registry = load_registry(&args.options)?;
    let runtime = build_runtime(&args.root, &args.options, registry)?;
    let report = runtime
        .refresh()
        .await
        .with_context(|| format!("checking {}", args.root))?;
    let state = runtime.state();

    let unresolved: Vec<(&ConfigId, &UnresolvedReference)> = state
        .results
        .values()
        .flat_map(|result| result.walk())
        .flat_map(|r| r.unresolved.iter().map(move |u| (&r.identity, u)))
        .filter(|(_, u)| !u.is_permanent())
        .collect();
    let problems = report.invalid.len() + report.failed.len() + unresolved.len();

    match format {
        OutputFormat::Json => {
            let unresolved: Vec<_> = unresolved
                .iter()
                .map(|(identity, reference)| json!({ "identity": identity, "reference": reference }))
                .collect();
            let output = json!({
                "invalid": report.invalid,
                "failed": report.failed,
                "unresolved": unresolved,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for identity in &report.invalid {
                println!("{} {} is invalid", "✗".red().bold(), identity);
            }
            for (identity, error) in &report.failed {
                println!("{} {}: {}", "✗".red().bold(), identity, error);
            }
            for (identity, reference) in &unresolved {
                println!("{} {} {}", "?".yellow().bold(), identity, describe(reference));
            }
            if problems == 0 {
                println!("{} No issues.", "✓".green().bold());
            }
        }
    }
    if problems > 0 {
        anyhow::bail!("{} problem(s) found", problems);
    }
    Ok(())
}
