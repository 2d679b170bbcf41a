//! Rewrite configuration paths into a profile's directory tree.

use regpack_common::{NodeMode, SharedConfig};
use std::path::Path;

/// Rewrite every path-bearing field of `config` to point inside
/// `profile_dir`.
///
/// Idempotent: the rewritten value of each field is a pure function of
/// `profile_dir`, so re-scoping an already-scoped configuration is a no-op.
/// The node datadir of an external-mode profile is left alone: an external
/// node shares one process and cannot be filesystem-isolated.
pub fn scope_config(config: &SharedConfig, profile_dir: &Path) -> SharedConfig {
    let mut scoped = config.clone();

    scoped.dirs.wallets = profile_dir.join("wallets");
    scoped.dirs.keys = profile_dir.join("keys");
    scoped.dirs.snapshots = profile_dir.join("snapshots");
    scoped.dirs.scenarios = profile_dir.join("scenarios");
    scoped.dirs.logs = profile_dir.join("logs");

    scoped.container.bitcoin_data_dir = profile_dir.join("docker-data").join("bitcoin-data");
    scoped.container.nginx_dir = profile_dir.join("docker-data").join("nginx");

    if config.mode == NodeMode::Container {
        scoped.node_data_dir = scoped.container.bitcoin_data_dir.clone();
    }

    scoped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_scoping_moves_all_dirs_inside_profile() {
        let config = SharedConfig::default_under(Path::new("/somewhere/global"));
        let profile_dir = PathBuf::from("/base/profiles/abc");
        let scoped = scope_config(&config, &profile_dir);

        for dir in [
            &scoped.dirs.wallets,
            &scoped.dirs.keys,
            &scoped.dirs.snapshots,
            &scoped.dirs.scenarios,
            &scoped.dirs.logs,
            &scoped.container.bitcoin_data_dir,
            &scoped.container.nginx_dir,
            &scoped.node_data_dir,
        ] {
            assert!(
                dir.starts_with(&profile_dir),
                "{:?} escaped the profile tree",
                dir
            );
        }
    }

    #[test]
    fn test_scoping_is_idempotent() {
        let config = SharedConfig::default_under(Path::new("/somewhere/global"));
        let profile_dir = PathBuf::from("/base/profiles/abc");

        let once = scope_config(&config, &profile_dir);
        let twice = scope_config(&once, &profile_dir);

        let a = serde_json::to_vec(&once).unwrap();
        let b = serde_json::to_vec(&twice).unwrap();
        assert_eq!(a, b, "re-scoping must be byte-identical");
    }

    #[test]
    fn test_external_node_data_dir_untouched() {
        let mut config = SharedConfig::default_under(Path::new("/g"));
        config.mode = NodeMode::External;
        config.node_data_dir = PathBuf::from("/var/lib/bitcoind");

        let scoped = scope_config(&config, Path::new("/base/profiles/abc"));
        assert_eq!(scoped.node_data_dir, PathBuf::from("/var/lib/bitcoind"));
    }
}
