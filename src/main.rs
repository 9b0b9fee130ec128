use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use package_meta::config::{ResolverConfig, log_path};
use package_meta::license::{extract_identifiers, license_url};
use package_meta::metadata::{MetadataResolver, PackageRequest};
use package_meta::version::VersionRange;

#[derive(Parser)]
#[command(name = "package-meta")]
#[command(version, about = "Resolve package metadata across local, registry and custom sources")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve every metadata property of a package version
    Resolve {
        id: String,
        version: String,
        /// Explicit .nuspec to read instead of the packages directory
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write logs to this file instead of the default log file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Print the candidate versions matching a range, in input order
    Select {
        range: String,
        #[arg(required = true)]
        versions: Vec<String>,
    },
    /// Print the identifiers of a license expression
    Licenses { expression: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Resolve {
            id,
            version,
            manifest,
            config,
            log_file,
        } => {
            let log_file = log_file.unwrap_or_else(log_path);
            let _guard = package_meta::logging::init(Some(log_file.as_path()))
                .with_context(|| format!("Failed to initialise logging at {:?}", log_file))?;

            let config = match config {
                Some(path) => ResolverConfig::load(&path)?,
                None => ResolverConfig::default(),
            };
            let mut request = PackageRequest::new(id, version);
            request.manifest_path = manifest;

            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(resolve(config, request))
        }
        Command::Select { range, versions } => {
            let range = VersionRange::parse(&range)
                .with_context(|| format!("Invalid version range {:?}", range))?;
            let selected = range.select(&versions);
            println!("{}", serde_json::to_string_pretty(&selected)?);
            Ok(())
        }
        Command::Licenses { expression } => {
            let identifiers = extract_identifiers(Some(&expression));
            let output = json!({
                "identifiers": identifiers,
                "url": license_url(&expression),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

async fn resolve(config: ResolverConfig, request: PackageRequest) -> anyhow::Result<()> {
    let resolver = MetadataResolver::from_config(&config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let metadata = resolver.resolve(&request, &cancel).await;
    println!("{}", serde_json::to_string_pretty(&metadata.to_json())?);
    Ok(())
}
