//! Regpack CLI - capture and replicate regtest multisig environments.

use clap::{Parser, Subcommand};
use regpack_common::{Error, NodeMode, Result, SharedConfig};
use regpack_container::DockerManager;
use regpack_node::BitcoindRpcClient;
use regpack_profiles::{InitOutcome, ProfileManager};
use regpack_replicator::archive::read_manifest;
use regpack_replicator::{ExportOptions, ImportMethod, ImportOptions, Importer};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "regpack")]
#[command(
    author,
    version,
    about = "Capture and replicate regtest multisig environments"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Base directory (defaults to ~/.regpack)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the current environment into an archive
    Export {
        /// Snapshot name
        #[arg(long)]
        name: String,

        /// Output archive path
        #[arg(long, short)]
        output: PathBuf,

        /// Snapshot description
        #[arg(long)]
        description: Option<String>,

        /// Author recorded in the manifest
        #[arg(long)]
        author: Option<String>,

        /// Skip the raw blockchain data payload
        #[arg(long)]
        no_blockchain: bool,

        /// Export public descriptors only
        #[arg(long)]
        no_private_keys: bool,

        /// Skip replay script synthesis
        #[arg(long)]
        no_replay: bool,

        /// Export only these wallets (repeatable)
        #[arg(long)]
        wallet: Vec<String>,
    },

    /// Import an archive into the active profile
    Import {
        /// Archive file path
        archive: PathBuf,

        /// Restore method (auto, binary, replay)
        #[arg(long, default_value = "auto")]
        method: String,

        /// Skip checksum verification
        #[arg(long)]
        skip_verification: bool,

        /// Proceed despite manifest validation errors
        #[arg(long)]
        force: bool,
    },

    /// Print an archive's manifest summary
    Inspect {
        /// Archive file path
        archive: PathBuf,
    },

    /// Manage isolated profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create a new profile
    Create {
        name: String,

        /// Node mode (container, external)
        #[arg(long, default_value = "container")]
        mode: String,
    },
    /// List profiles
    List,
    /// Make a profile active
    Use { name: String },
    /// Delete a profile and its data
    Delete { name: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        for suggestion in e.suggestions() {
            eprintln!("  hint: {}", suggestion);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".to_string()))?
            .join(".regpack"),
    };

    let manager = ProfileManager::new(&base_dir);
    if manager.init(prompt_legacy_wipe)? == InitOutcome::Aborted {
        return Err(Error::Config(
            "initialization aborted; legacy data left in place".to_string(),
        ));
    }

    match cli.command {
        Commands::Export {
            name,
            output,
            description,
            author,
            no_blockchain,
            no_private_keys,
            no_replay,
            wallet,
        } => {
            let config = active_config(&manager, &base_dir)?;
            let node = BitcoindRpcClient::new(&config.rpc)?;

            let output = if output.extension().is_none() {
                output.with_extension(regpack_replicator::archive::ARCHIVE_EXTENSION)
            } else {
                output
            };

            let opts = ExportOptions {
                name,
                description,
                author,
                include_blockchain_data: !no_blockchain,
                include_private_keys: !no_private_keys,
                include_replay_script: !no_replay,
                wallet_filter: if wallet.is_empty() { None } else { Some(wallet) },
            };

            let exporter = regpack_replicator::Exporter::new(&node, &config);
            let summary = exporter.export(&opts, &output).await?;

            println!(
                "Exported {:?} at height {} ({} wallet(s)) to {:?}",
                summary.manifest.name,
                summary.manifest.blockchain.block_height,
                summary.manifest.contents.bitcoin_wallets.len(),
                summary.archive_path
            );
            print_warnings(&summary.warnings);
        }

        Commands::Import {
            archive,
            method,
            skip_verification,
            force,
        } => {
            let config = active_config(&manager, &base_dir)?;
            let node = BitcoindRpcClient::new(&config.rpc)?;
            let docker = DockerManager::new();

            let overlay_dir = manager
                .active()?
                .map(|p| p.directory)
                .unwrap_or_else(|| base_dir.clone());

            let opts = ImportOptions {
                method: ImportMethod::from_str(&method)?,
                skip_verification,
                force,
                rpc_override: None,
            };

            let container: Option<&dyn regpack_container::ContainerLifecycle> =
                if config.mode == NodeMode::Container {
                    Some(&docker)
                } else {
                    None
                };

            let mut importer = Importer::new(&node, config, container, overlay_dir);
            let result = importer.import(&archive, &opts).await?;

            // Negotiated ports must be persisted, not the requested ones.
            if let Some(profile) = manager.active()? {
                importer.config().save(&profile.config_path)?;
            }

            println!(
                "Import via {} method: height {}, wallets [{}]",
                result.method_used.as_deref().unwrap_or("none"),
                result.block_height,
                result.wallets_imported.join(", ")
            );
            print_warnings(&result.warnings);

            if !result.success {
                for error in &result.errors {
                    eprintln!("  error: {}", error);
                }
                return Err(Error::Archive("import failed".to_string()));
            }
        }

        Commands::Inspect { archive } => {
            let manifest = read_manifest(&archive)?;
            println!("Name:        {}", manifest.name);
            if let Some(description) = &manifest.description {
                println!("Description: {}", description);
            }
            if let Some(author) = &manifest.author {
                println!("Author:      {}", author);
            }
            println!("Created:     {}", manifest.created_at);
            println!("Network:     {} ({} mode)", manifest.network, manifest.mode);
            println!(
                "Chain:       height {} tip {}",
                manifest.blockchain.block_height, manifest.blockchain.tip_hash
            );
            println!(
                "Contents:    blockchain-data={} replay-script={}",
                manifest.contents.has_blockchain_data, manifest.contents.has_replay_script
            );
            println!("Wallets:     [{}]", manifest.contents.bitcoin_wallets.join(", "));
            if !manifest.contents.multisig_configs.is_empty() {
                println!(
                    "Multisig:    [{}]",
                    manifest.contents.multisig_configs.join(", ")
                );
            }
        }

        Commands::Profile { command } => match command {
            ProfileCommands::Create { name, mode } => {
                let mode = NodeMode::from_str(&mode)?;
                let config = SharedConfig::default_under(&base_dir);
                let profile = manager.create(&name, mode, &config)?;
                info!("Profile {:?} created at {:?}", profile.name, profile.directory);
                println!("Created profile {:?} ({})", profile.name, profile.id);
            }
            ProfileCommands::List => {
                let active = manager.active()?.map(|p| p.id);
                for profile in manager.list()? {
                    let marker = if Some(&profile.id) == active.as_ref() {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{} {}  [{}]  last used {}",
                        marker, profile.name, profile.mode, profile.last_used_at
                    );
                }
            }
            ProfileCommands::Use { name } => {
                let profile = manager.activate(&name)?;
                println!("Active profile: {}", profile.name);
            }
            ProfileCommands::Delete { name } => {
                manager.delete(&name)?;
                println!("Deleted profile {:?}", name);
            }
        },
    }

    Ok(())
}

/// Load the active profile's configuration, or a default one rooted at the
/// base directory when no profile is active.
fn active_config(manager: &ProfileManager, base_dir: &std::path::Path) -> Result<SharedConfig> {
    match manager.active()? {
        Some(profile) => SharedConfig::load(&profile.config_path),
        None => Ok(SharedConfig::default_under(base_dir)),
    }
}

/// Affirmative-consent gate before the legacy layout wipe.
fn prompt_legacy_wipe(findings: &[String]) -> bool {
    eprintln!("A pre-profile data layout was found:");
    for finding in findings {
        eprintln!("  - {}", finding);
    }
    eprintln!("Migrating requires deleting ALL existing regpack data.");
    eprint!("Delete everything and start fresh? [y/N] ");
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("  warning: {}", warning);
    }
}
