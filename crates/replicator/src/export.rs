//! The export pipeline: capture a running regtest environment into a
//! portable archive.

use crate::archive::{pack_blockchain_payload, pack_tree, BLOCKCHAIN_PAYLOAD_FILE};
use regpack_archive_schema::{
    ArchiveContents, BlockchainState, ContainerMeta, DescriptorRecord, Manifest, ReplayAction,
    ReplayScript, WalletExport, WalletRole, MANIFEST_FILE, REPLAY_FILE,
};
use regpack_common::fsutil::{copy_dir_all, StagingDir};
use regpack_common::{hash, Error, NodeMode, Result, RpcConfig, SharedConfig};
use regpack_node::NodeClient;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Blocks needed before coinbase outputs become spendable.
const COINBASE_MATURITY: u64 = 101;

/// What to capture.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub name: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub include_blockchain_data: bool,
    pub include_private_keys: bool,
    pub include_replay_script: bool,
    /// Restrict to these wallet names; `None` exports every loaded wallet.
    pub wallet_filter: Option<Vec<String>>,
}

impl ExportOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            author: None,
            include_blockchain_data: true,
            include_private_keys: true,
            include_replay_script: true,
            wallet_filter: None,
        }
    }
}

/// What an export produced.
#[derive(Debug)]
pub struct ExportSummary {
    pub archive_path: PathBuf,
    pub manifest: Manifest,
    pub warnings: Vec<String>,
}

/// Ordered descriptor-discovery strategies, tried in sequence. The first
/// one that yields descriptors wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DescriptorSource {
    PrivateDescriptors,
    PublicDescriptors,
    WalletInfoOnly,
}

/// The export pipeline.
pub struct Exporter<'a> {
    node: &'a dyn NodeClient,
    config: &'a SharedConfig,
}

impl<'a> Exporter<'a> {
    pub fn new(node: &'a dyn NodeClient, config: &'a SharedConfig) -> Self {
        Self { node, config }
    }

    /// Run the pipeline. Any fatal failure leaves no output archive; the
    /// staging directory is removed on every exit path.
    pub async fn export(&self, opts: &ExportOptions, output: &Path) -> Result<ExportSummary> {
        let mut warnings = Vec::new();
        let staging = StagingDir::create("regpack-export")?;
        info!("Exporting environment {:?}", opts.name);

        // Chain state first: everything else is described relative to it.
        let chain = self.node.get_blockchain_info().await?;
        let node_version = match self.node.get_network_info().await {
            Ok(net) => Some(net.subversion),
            Err(e) => {
                warnings.push(format!("node version not recorded: {}", e));
                None
            }
        };

        let mut wallet_names = self.node.list_wallets().await?;
        if let Some(filter) = &opts.wallet_filter {
            wallet_names.retain(|w| filter.iter().any(|f| f == w));
        }
        debug!("Exporting {} wallet(s)", wallet_names.len());

        // Known side files, for name-prefix association.
        let config_stems = list_stems(&self.config.dirs.wallets, "json");
        let key_names = list_file_names(&self.config.dirs.keys, Some("json"));

        let mut wallet_exports = Vec::new();
        for name in &wallet_names {
            match self.export_wallet(name, opts.include_private_keys).await {
                Ok(mut export) => {
                    export.multisig_config = associate_by_prefix(&config_stems, name);
                    export.key_file = key_names
                        .iter()
                        .find(|k| {
                            let stem = k.trim_end_matches(".json");
                            is_prefix_pair(stem, name)
                        })
                        .cloned();
                    wallet_exports.push(export);
                }
                Err(e) => warnings.push(format!("wallet {:?} not exported: {}", name, e)),
            }
        }

        let descriptors_dir = staging.path().join("descriptors");
        fs::create_dir_all(&descriptors_dir)?;
        for export in &wallet_exports {
            let path = descriptors_dir.join(format!("{}.json", export.wallet_name));
            fs::write(&path, serde_json::to_string_pretty(export)?)?;
        }

        // Side files are copied verbatim; each failure is a warning.
        let multisig_files = copy_files(
            &self.config.dirs.wallets,
            &staging.path().join("caravan-wallets"),
            Some("json"),
            &mut warnings,
        )?;
        let key_files = copy_files(
            &self.config.dirs.keys,
            &staging.path().join("keys"),
            Some("json"),
            &mut warnings,
        )?;
        let scenario_files = copy_files(
            &self.config.dirs.scenarios,
            &staging.path().join("scenarios"),
            None,
            &mut warnings,
        )?;

        let mut payload_hash = None;
        if opts.include_blockchain_data {
            payload_hash = Some(self.capture_blockchain(staging.path())?);
        }

        let mut has_replay_script = false;
        if opts.include_replay_script {
            let configs = load_staged_configs(&staging.path().join("caravan-wallets"));
            let script = build_replay_script(&wallet_exports, &configs, chain.blocks);
            fs::write(
                staging.path().join(REPLAY_FILE),
                serde_json::to_string_pretty(&script)?,
            )?;
            has_replay_script = true;
        }

        // Only network-relevant configuration reaches the manifest.
        let (rpc, container) = sanitize_config(self.config);

        let mut manifest = Manifest {
            name: opts.name.clone(),
            description: opts.description.clone(),
            author: opts.author.clone(),
            node_version,
            network: self.config.network.clone(),
            mode: self.config.mode,
            rpc,
            container,
            ..Default::default()
        };
        manifest.blockchain = BlockchainState {
            block_height: chain.blocks,
            tip_hash: chain.best_block_hash,
            chain_work: chain.chainwork,
        };
        manifest.contents = ArchiveContents {
            has_blockchain_data: payload_hash.is_some(),
            has_replay_script,
            bitcoin_wallets: wallet_exports.iter().map(|w| w.wallet_name.clone()).collect(),
            multisig_configs: multisig_files
                .iter()
                .map(|f| f.trim_end_matches(".json").to_string())
                .collect(),
            key_files,
            scenarios: scenario_files,
        };
        manifest.checksums.blockchain_payload = payload_hash;
        manifest.checksums.files = compute_file_checksums(staging.path())?;

        fs::write(
            staging.path().join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        pack_tree(staging.path(), output)?;
        info!(
            "Archive written to {:?} (height {}, {} wallet(s))",
            output,
            manifest.blockchain.block_height,
            manifest.contents.bitcoin_wallets.len()
        );

        Ok(ExportSummary {
            archive_path: output.to_path_buf(),
            manifest,
            warnings,
        })
    }

    async fn export_wallet(&self, wallet: &str, include_private: bool) -> Result<WalletExport> {
        let strategies = if include_private {
            vec![
                DescriptorSource::PrivateDescriptors,
                DescriptorSource::PublicDescriptors,
                DescriptorSource::WalletInfoOnly,
            ]
        } else {
            vec![
                DescriptorSource::PublicDescriptors,
                DescriptorSource::WalletInfoOnly,
            ]
        };

        let mut last_error = None;
        for strategy in strategies {
            match self.try_strategy(strategy, wallet).await {
                Ok(export) => return Ok(export),
                Err(e) => {
                    debug!("{:?} failed for wallet {:?}: {}", strategy, wallet, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Wallet(format!("wallet {:?} unreadable", wallet))))
    }

    async fn try_strategy(&self, strategy: DescriptorSource, wallet: &str) -> Result<WalletExport> {
        let role = WalletRole::classify(wallet);
        match strategy {
            DescriptorSource::PrivateDescriptors | DescriptorSource::PublicDescriptors => {
                let include_private = strategy == DescriptorSource::PrivateDescriptors;
                let raw = self.node.list_descriptors(wallet, include_private).await?;
                let descriptors: Vec<DescriptorRecord> =
                    serde_json::from_value(raw["descriptors"].clone())?;
                Ok(WalletExport {
                    wallet_name: wallet.to_string(),
                    role,
                    descriptor_based: true,
                    includes_private_keys: include_private,
                    descriptors,
                    multisig_config: None,
                    key_file: None,
                })
            }
            DescriptorSource::WalletInfoOnly => {
                let info = self.node.get_wallet_info(wallet).await?;
                Ok(WalletExport {
                    wallet_name: wallet.to_string(),
                    role,
                    descriptor_based: info["descriptors"].as_bool().unwrap_or(false),
                    includes_private_keys: false,
                    descriptors: Vec::new(),
                    multisig_config: None,
                    key_file: None,
                })
            }
        }
    }

    /// Copy the chain tree into staging, compress it into one payload and
    /// drop the uncompressed copy. Returns the payload hash.
    fn capture_blockchain(&self, staging: &Path) -> Result<String> {
        let chain_dir = self.config.chain_dir();
        if !chain_dir.is_dir() {
            return Err(Error::Filesystem(format!(
                "chain directory {:?} not found; is the node initialized?",
                chain_dir
            )));
        }

        let work = staging.join("chain-data");
        for sub in ["blocks", "chainstate", "wallets"] {
            let src = chain_dir.join(sub);
            if src.is_dir() {
                copy_dir_all(&src, &work.join(sub))?;
            }
        }
        let settings = chain_dir.join("settings.json");
        if settings.is_file() {
            fs::create_dir_all(&work)?;
            fs::copy(&settings, work.join("settings.json"))?;
        }

        let payload = staging.join(BLOCKCHAIN_PAYLOAD_FILE);
        let digest = pack_blockchain_payload(&work, &payload)?;
        fs::remove_dir_all(&work)?;
        Ok(digest)
    }
}

/// Strip machine-specific paths; keep only network-relevant fields.
fn sanitize_config(config: &SharedConfig) -> (RpcConfig, Option<ContainerMeta>) {
    let container = match config.mode {
        NodeMode::Container => Some(ContainerMeta {
            image: config.container.image.clone(),
            container_name: config.container.container_name.clone(),
            proxy_port: config.container.proxy_port,
        }),
        NodeMode::External => None,
    };
    (config.rpc.clone(), container)
}

/// Synthesize the declarative reconstruction script.
///
/// Block hashes produced by replay will differ from the source chain; only
/// the final wallet set and balances are expected to match.
fn build_replay_script(
    wallets: &[WalletExport],
    configs: &[(String, Value)],
    height: u64,
) -> ReplayScript {
    let mut script = ReplayScript::default();

    let initial = height.min(COINBASE_MATURITY);
    if initial > 0 {
        script.push(
            format!("Mine {} blocks to reach coinbase maturity", initial),
            ReplayAction::GenerateBlocks { count: initial },
        );
    }

    for wallet in wallets {
        script.push(
            format!("Create wallet {}", wallet.wallet_name),
            ReplayAction::CreateWallet {
                wallet: wallet.wallet_name.clone(),
                disable_private_keys: wallet.role == WalletRole::WatchOnly,
            },
        );
        if !wallet.descriptors.is_empty() {
            script.push(
                format!(
                    "Import {} descriptor(s) into {}",
                    wallet.descriptors.len(),
                    wallet.wallet_name
                ),
                ReplayAction::ImportDescriptors {
                    wallet: wallet.wallet_name.clone(),
                    descriptors: wallet.descriptors.clone(),
                },
            );
        }
    }

    for (name, config) in configs {
        script.push(
            format!("Import multisig config {}", name),
            ReplayAction::ImportMultisigConfig {
                name: name.clone(),
                config: config.clone(),
            },
        );
    }

    if height > COINBASE_MATURITY {
        script.push(
            format!("Mine {} blocks to reach the exported height", height - COINBASE_MATURITY),
            ReplayAction::GenerateBlocks {
                count: height - COINBASE_MATURITY,
            },
        );
    }

    script
}

fn list_stems(dir: &Path, ext: &str) -> Vec<String> {
    list_file_names(dir, Some(ext))
        .into_iter()
        .map(|name| name.trim_end_matches(&format!(".{}", ext)).to_string())
        .collect()
}

fn list_file_names(dir: &Path, ext: Option<&str>) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return names;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(ext) = ext {
            if path.extension().map(|e| e.to_string_lossy().to_string()) != Some(ext.to_string()) {
                continue;
            }
        }
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    names.sort();
    names
}

/// True when one name is a prefix of the other, case-insensitively.
/// Wallet `team_signer_1` associates with config `team`.
fn is_prefix_pair(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a.starts_with(&b) || b.starts_with(&a)
}

fn associate_by_prefix(stems: &[String], wallet: &str) -> Option<String> {
    stems
        .iter()
        .find(|stem| is_prefix_pair(stem, wallet))
        .cloned()
}

/// Copy matching files from one directory into a staging subfolder,
/// recording the names that succeeded.
fn copy_files(
    src_dir: &Path,
    dst_dir: &Path,
    ext: Option<&str>,
    warnings: &mut Vec<String>,
) -> Result<Vec<String>> {
    let names = list_file_names(src_dir, ext);
    if names.is_empty() {
        return Ok(names);
    }
    fs::create_dir_all(dst_dir)?;

    let mut copied = Vec::new();
    for name in names {
        match fs::copy(src_dir.join(&name), dst_dir.join(&name)) {
            Ok(_) => copied.push(name),
            Err(e) => warnings.push(format!("could not stage {:?}: {}", name, e)),
        }
    }
    Ok(copied)
}

fn load_staged_configs(dir: &Path) -> Vec<(String, Value)> {
    let mut configs = Vec::new();
    for name in list_file_names(dir, Some("json")) {
        if let Ok(content) = fs::read_to_string(dir.join(&name)) {
            if let Ok(value) = serde_json::from_str::<Value>(&content) {
                configs.push((name.trim_end_matches(".json").to_string(), value));
            } else {
                warn!("Skipping unparseable multisig config {:?}", name);
            }
        }
    }
    configs
}

/// Hash every staged file except the manifest itself and the blockchain
/// payload (which has its own content-addressed hash).
fn compute_file_checksums(staging: &Path) -> Result<BTreeMap<String, String>> {
    let mut checksums = BTreeMap::new();
    let mut stack = vec![staging.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let Ok(rel_path) = path.strip_prefix(staging) else {
                continue;
            };
            let rel = rel_path
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if rel == MANIFEST_FILE || rel == BLOCKCHAIN_PAYLOAD_FILE {
                continue;
            }
            checksums.insert(rel, hash::sha256_file(&path)?);
        }
    }
    Ok(checksums)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_config, MockNode};
    use regpack_archive_schema::validation::validate_manifest;

    fn descriptor(desc: &str) -> Value {
        serde_json::json!({
            "descriptors": [{
                "desc": desc,
                "active": true,
                "internal": false,
                "range": [0, 999],
                "timestamp": 1700000000u64,
            }]
        })
    }

    fn seed_side_files(config: &SharedConfig) {
        fs::create_dir_all(&config.dirs.wallets).unwrap();
        fs::write(
            config.dirs.wallets.join("team.json"),
            r#"{"name":"team","quorum":{"requiredSigners":2,"totalSigners":3}}"#,
        )
        .unwrap();
        fs::create_dir_all(&config.dirs.keys).unwrap();
        fs::write(config.dirs.keys.join("team-keys.json"), r#"{"xpubs":[]}"#).unwrap();
    }

    fn seed_chain_dir(config: &SharedConfig) {
        let chain = config.chain_dir();
        fs::create_dir_all(chain.join("blocks")).unwrap();
        fs::create_dir_all(chain.join("chainstate")).unwrap();
        fs::create_dir_all(chain.join("wallets").join("watcher")).unwrap();
        fs::write(chain.join("blocks").join("blk00000.dat"), b"blockdata").unwrap();
        fs::write(chain.join("chainstate").join("CURRENT"), b"utxodata").unwrap();
        fs::write(
            chain.join("wallets").join("watcher").join("wallet.dat"),
            b"walletdata",
        )
        .unwrap();
        fs::write(chain.join("settings.json"), r#"{"wallet":["watcher"]}"#).unwrap();
    }

    #[tokio::test]
    async fn test_export_scenario_alice_env() {
        let (temp, config) = test_config();
        seed_side_files(&config);
        seed_chain_dir(&config);

        let node = MockNode::with_height(150);
        node.add_wallet("watcher");
        node.add_wallet("signer_1");
        node.set_descriptors("watcher", descriptor("wsh(multi(2,tpubA,tpubB,tpubC))#x"));
        node.set_descriptors("signer_1", descriptor("wpkh(tprv.../84h/1h/0h/0/*)#y"));

        let exporter = Exporter::new(&node, &config);
        let output = temp.path().join("alice-env.regpack");
        let summary = exporter
            .export(&ExportOptions::new("alice-env"), &output)
            .await
            .unwrap();

        assert!(output.is_file());
        let manifest = &summary.manifest;
        assert_eq!(manifest.blockchain.block_height, 150);
        assert_eq!(
            manifest.contents.bitcoin_wallets,
            vec!["watcher".to_string(), "signer_1".to_string()]
        );
        assert!(manifest.contents.has_blockchain_data);
        assert!(manifest.checksums.blockchain_payload.is_some());
        assert_eq!(manifest.contents.multisig_configs, vec!["team".to_string()]);
        assert!(validate_manifest(manifest).unwrap().is_valid());

        // Staged JSON files are all checksummed.
        assert!(manifest.checksums.files.contains_key("descriptors/watcher.json"));
        assert!(manifest.checksums.files.contains_key("caravan-wallets/team.json"));
        assert!(manifest.checksums.files.contains_key("replay.json"));
    }

    #[tokio::test]
    async fn test_checksum_determinism() {
        let (temp, config) = test_config();
        seed_side_files(&config);

        let node = MockNode::with_height(10);
        node.add_wallet("watcher");
        node.set_descriptors("watcher", descriptor("wsh(multi(2,a,b,c))#x"));

        let mut opts = ExportOptions::new("twice");
        opts.include_blockchain_data = false;

        let exporter = Exporter::new(&node, &config);
        let first = exporter
            .export(&opts, &temp.path().join("one.regpack"))
            .await
            .unwrap();
        let second = exporter
            .export(&opts, &temp.path().join("two.regpack"))
            .await
            .unwrap();

        assert_eq!(first.manifest.checksums.files, second.manifest.checksums.files);
    }

    #[tokio::test]
    async fn test_manifest_carries_no_absolute_paths() {
        let (temp, config) = test_config();
        let node = MockNode::with_height(5);

        let mut opts = ExportOptions::new("sanitized");
        opts.include_blockchain_data = false;

        let exporter = Exporter::new(&node, &config);
        let summary = exporter
            .export(&opts, &temp.path().join("s.regpack"))
            .await
            .unwrap();

        let json = serde_json::to_string(&summary.manifest).unwrap();
        let base = temp.path().to_string_lossy().to_string();
        assert!(
            !json.contains(&base),
            "manifest leaked a machine-specific path"
        );
    }

    #[tokio::test]
    async fn test_wallet_filter_and_replay_shape() {
        let (temp, config) = test_config();
        let node = MockNode::with_height(150);
        node.add_wallet("watcher");
        node.add_wallet("signer_1");
        node.add_wallet("unrelated");
        node.set_descriptors("watcher", descriptor("wsh(multi(2,a,b,c))#x"));
        node.set_descriptors("signer_1", descriptor("wpkh(k/0/*)#y"));
        node.set_descriptors("unrelated", descriptor("wpkh(z/0/*)#z"));

        let mut opts = ExportOptions::new("filtered");
        opts.include_blockchain_data = false;
        opts.wallet_filter = Some(vec!["watcher".into(), "signer_1".into()]);

        let exporter = Exporter::new(&node, &config);
        let output = temp.path().join("f.regpack");
        let summary = exporter.export(&opts, &output).await.unwrap();
        assert_eq!(summary.manifest.contents.bitcoin_wallets.len(), 2);

        // Inspect the synthesized replay script.
        let extracted = temp.path().join("extracted");
        crate::archive::unpack_archive(&output, &extracted).unwrap();
        let script: ReplayScript =
            serde_json::from_str(&fs::read_to_string(extracted.join(REPLAY_FILE)).unwrap())
                .unwrap();

        match &script.steps.first().unwrap().action {
            ReplayAction::GenerateBlocks { count } => assert_eq!(*count, 101),
            other => panic!("expected initial generation, got {:?}", other),
        }
        match &script.steps.last().unwrap().action {
            ReplayAction::GenerateBlocks { count } => assert_eq!(*count, 49),
            other => panic!("expected final generation, got {:?}", other),
        }
        let create_count = script
            .steps
            .iter()
            .filter(|s| matches!(s.action, ReplayAction::CreateWallet { .. }))
            .count();
        assert_eq!(create_count, 2);
    }

    #[tokio::test]
    async fn test_blockchain_capture_missing_chain_dir_is_fatal() {
        let (temp, config) = test_config();
        let node = MockNode::with_height(5);

        let exporter = Exporter::new(&node, &config);
        let err = exporter
            .export(&ExportOptions::new("broken"), &temp.path().join("b.regpack"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Filesystem(_)));
        assert!(!temp.path().join("b.regpack").exists(), "no partial archive");
    }

    #[test]
    fn test_prefix_association() {
        let stems = vec!["team".to_string(), "solo".to_string()];
        assert_eq!(
            associate_by_prefix(&stems, "team_signer_1"),
            Some("team".to_string())
        );
        assert_eq!(associate_by_prefix(&stems, "watcher"), None);
    }
}
