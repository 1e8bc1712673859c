use std::sync::Arc;

use anyhow::Context;
use cadpub_cache::LocalArtifactCache;
use cadpub_descriptor::{DescriptorAssembler, ProjectMetadata, ProjectStorage};
use cadpub_sdk::Settings;
use cadpub_store::{FsObjectStore, UrlSigner};
use cadpub_types::{derive_key, parse_project, ArtifactKind, Project, RevisionHash};
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use crate::cli::*;

/// Environment variable holding the secret used to sign download links.
const SIGNING_SECRET_ENV: &str = "CADPUB_SIGNING_SECRET";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Keys(args) => cmd_keys(args, format),
        Command::ParseKey(args) => cmd_parse_key(args, format),
        Command::CheckConfig(args) => cmd_check_config(args, format),
        Command::Describe(args) => cmd_describe(args, format).await,
    }
}

fn cmd_keys(args: KeysArgs, format: OutputFormat) -> anyhow::Result<()> {
    let project = Project::new(args.project)?;
    let hash = RevisionHash::new(args.hash)?;
    let keys = revision_keys(&project, &hash);
    match format {
        OutputFormat::Json => {
            let map: serde_json::Map<_, _> = keys.into_iter().map(|(name, key)| (name, json!(key))).collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        OutputFormat::Text => {
            println!("Keys of {} at {}", project.label().bold(), hash.short().yellow());
            for (name, key) in keys {
                println!("  {:<18} {}", name.cyan(), key);
            }
        }
    }
    Ok(())
}

fn cmd_parse_key(args: ParseKeyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let project = parse_project(&args.key)?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "key": args.key, "project": project.name(), "label": project.label() })
        ),
        OutputFormat::Text => println!("{} {} belongs to {}", "✓".green().bold(), args.key, project.name().bold()),
    }
    Ok(())
}

fn cmd_check_config(args: CheckConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let settings = Settings::load(&args.file)
        .with_context(|| format!("invalid settings file {}", args.file.display()))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
        OutputFormat::Text => {
            println!("{} {} is valid", "✓".green().bold(), args.file.display().to_string().bold());
            for line in config_summary(&settings) {
                println!("  {line}");
            }
        }
    }
    Ok(())
}

async fn cmd_describe(args: DescribeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("invalid settings file {}", path.display()))?,
        None => Settings::default(),
    };
    let secret = std::env::var(SIGNING_SECRET_ENV)
        .with_context(|| format!("{SIGNING_SECRET_ENV} must be set to sign download links"))?;
    let signer = UrlSigner::new(&args.signing_base, secret)?;
    let store = FsObjectStore::open(&args.store, &args.bucket, signer).await?;
    let cache = Arc::new(LocalArtifactCache::open(settings.cache.clone()).await?);
    let assembler = DescriptorAssembler::new(
        cache,
        settings.links.clone(),
        settings.pipeline.mandatory_kinds.iter().copied(),
    )?;
    debug!(store = %args.store.display(), bucket = %args.bucket, "describing revision");

    let storage = ProjectStorage::new(
        Project::new(args.project)?,
        ProjectMetadata {
            hash: RevisionHash::new(args.hash)?,
            is_assembly: args.assembly,
            has_drawings: args.has_drawings,
        },
    );
    let descriptor = assembler.to_descriptor(&storage, &store).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&descriptor)?),
        OutputFormat::Text => {
            let value = serde_json::to_value(&descriptor)?;
            println!("{} {} at {}", "✓".green().bold(), descriptor.label.bold(), descriptor.hash.yellow());
            if let serde_json::Value::Object(fields) = value {
                for (name, field) in fields {
                    println!("  {:<20} {}", name.cyan(), render_field(&field));
                }
            }
        }
    }
    Ok(())
}

/// Every storage key of a revision, labelled by artifact kind, followed by
/// the project-level keys.
fn revision_keys(project: &Project, hash: &RevisionHash) -> Vec<(String, String)> {
    let mut keys: Vec<(String, String)> = ArtifactKind::ALL
        .into_iter()
        .map(|kind| (kind.to_string(), derive_key(project, hash, kind)))
        .collect();
    keys.push(("upload_slot".into(), project.source_storage_key()));
    keys.push(("project_thumbnail".into(), project.thumbnail_storage_key()));
    keys
}

fn config_summary(settings: &Settings) -> Vec<String> {
    let mandatory: Vec<String> = settings
        .pipeline
        .mandatory_kinds
        .iter()
        .map(ToString::to_string)
        .collect();
    vec![
        format!("cache root: {}", settings.cache.root.display()),
        format!("inline limit: {} bytes", settings.cache.inline_limit_bytes),
        format!("job timeout: {}s", settings.pipeline.job_timeout_secs),
        format!("max concurrent jobs: {}", settings.pipeline.max_concurrent_jobs),
        format!("transient retries: {}", settings.pipeline.transient_retry_limit),
        format!("mandatory kinds: {}", mandatory.join(", ")),
        format!(
            "deep link: {}",
            settings
                .links
                .deep_link
                .as_ref()
                .map(|m| format!("{} -> {}", m.from, m.to))
                .unwrap_or_else(|| "none".into())
        ),
    ]
}

fn render_field(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "-".dimmed().to_string(),
        serde_json::Value::String(s) if s.starts_with("data:") => {
            format!("{} ({} chars)", "inline data".green(), s.len())
        }
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_keys_cover_every_kind() {
        let project = Project::new("Wrench").unwrap();
        let hash = RevisionHash::new("h1").unwrap();
        let keys = revision_keys(&project, &hash);
        assert_eq!(keys.len(), ArtifactKind::ALL.len() + 2);
        assert!(keys.contains(&("source_model".into(), "projects-Wrench/h1".into())));
        assert!(keys.contains(&("bom_json".into(), "cache-Wrench/h1/bom.json".into())));
        assert!(keys.contains(&(
            "project_thumbnail".into(),
            "cache-Wrench-original-thumbnail.svg".into()
        )));
        for (_, key) in &keys {
            assert_eq!(parse_project(key).unwrap(), project);
        }
    }

    #[test]
    fn summary_mentions_mandatory_kinds() {
        let lines = config_summary(&Settings::default());
        assert!(lines.iter().any(|l| l == "mandatory kinds: mesh, bom"));
        assert!(lines.iter().any(|l| l == "deep link: none"));
    }

    #[test]
    fn null_fields_render_as_dash() {
        colored::control::set_override(false);
        assert_eq!(render_field(&serde_json::Value::Null), "-");
        assert_eq!(render_field(&json!("https://x/y")), "https://x/y");
        assert_eq!(render_field(&json!(true)), "true");
    }
}
