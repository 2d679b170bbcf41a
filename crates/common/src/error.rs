//! Common error types for regpack.
//!
//! Errors form a closed taxonomy. Internal pipeline code constructs variants
//! directly; raw text from external processes (docker stderr, RPC error
//! bodies) goes through [`classify`] at the boundary before being surfaced.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Common error type for regpack operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Container runtime error: {0}")]
    Container(String),

    #[error("Node connection failed: {0}")]
    NodeConnection(String),

    #[error("Port conflict: {0}")]
    PortConflict(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Platform mismatch: {0}")]
    Platform(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("{0}")]
    Unknown(String),
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Unknown(e.to_string())
    }
}

/// Category tag for an [`Error`], used at the CLI boundary to pick
/// remediation suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Container,
    NodeConnection,
    PortConflict,
    Network,
    Config,
    Filesystem,
    Platform,
    Wallet,
    Transaction,
    Archive,
    Script,
    Unknown,
}

impl Error {
    /// The taxonomy category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Filesystem(_) => ErrorKind::Filesystem,
            Error::Json(_) => ErrorKind::Archive,
            Error::Container(_) => ErrorKind::Container,
            Error::NodeConnection(_) => ErrorKind::NodeConnection,
            Error::PortConflict(_) => ErrorKind::PortConflict,
            Error::Network(_) => ErrorKind::Network,
            Error::Config(_) => ErrorKind::Config,
            Error::Platform(_) => ErrorKind::Platform,
            Error::Wallet(_) => ErrorKind::Wallet,
            Error::Transaction(_) => ErrorKind::Transaction,
            Error::Archive(_) => ErrorKind::Archive,
            Error::Script(_) => ErrorKind::Script,
            Error::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Actionable remediation suggestions for the user.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self.kind() {
            ErrorKind::Container => &[
                "Check that Docker is installed and the daemon is running (docker info)",
                "Inspect the container log tail included in the error message",
                "Remove stale containers with `docker rm -f <name>` and retry",
            ],
            ErrorKind::NodeConnection => &[
                "Verify the node is running and RPC is enabled",
                "Check the RPC port, user and password in the active profile",
                "If the node just started, wait a few seconds and retry",
            ],
            ErrorKind::PortConflict => &[
                "Stop the process occupying the port, or let regpack pick the next free one",
                "Persist the resolved ports into the profile configuration",
            ],
            ErrorKind::Network => &[
                "Check local firewall rules and that localhost resolves",
            ],
            ErrorKind::Config => &[
                "Inspect the profile configuration file for missing or invalid fields",
                "Create a fresh profile with `regpack profile create`",
            ],
            ErrorKind::Filesystem => &[
                "Check permissions and free disk space on the target directory",
            ],
            ErrorKind::Platform => &[
                "The node image may not support this CPU architecture",
                "Pull a multi-arch image or run on x86_64/aarch64",
            ],
            ErrorKind::Wallet => &[
                "List loaded wallets with `bitcoin-cli listwallets`",
                "Load the wallet explicitly before retrying",
            ],
            ErrorKind::Transaction => &[
                "Check wallet balance and that enough mature coinbase outputs exist",
            ],
            ErrorKind::Archive => &[
                "Verify the archive file is complete and was produced by regpack export",
                "Re-run with --skip-verification only if you trust the archive source",
            ],
            ErrorKind::Script => &[
                "Inspect replay.json in the archive for the failing step",
            ],
            ErrorKind::Unknown => &[],
        }
    }
}

static CONNECTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(connection refused|econnrefused|could not connect|couldn't connect|timed? ?out.*rpc|rpc.*unreachable|401 unauthorized|authentication failed)").unwrap()
});

static PORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(address already in use|eaddrinuse|port is already allocated|bind.*failed)")
        .unwrap()
});

static CONTAINER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(docker|container|no such image|image.*not found|daemon.*not running|oci runtime)").unwrap()
});

static PLATFORM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(exec format error|platform.*does not match|no matching manifest for)").unwrap()
});

static WALLET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(wallet.*(not found|not loaded|already exists)|descriptor|requested wallet)")
        .unwrap()
});

static TX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(insufficient funds|fee|mempool|transaction rejected|txn?-)").unwrap()
});

static ARCHIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(manifest|checksum|tar|gzip|archive|snapshot)").unwrap()
});

static NETWORK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(network|dns|name resolution|host.*unreachable)").unwrap()
});

/// Classify raw error/stderr text into a taxonomy category.
///
/// Ordered: the first matching pattern wins. Called at the outer boundary,
/// immediately before surfacing to the user, never inside pipelines.
pub fn classify(raw: &str) -> ErrorKind {
    let table: &[(&Regex, ErrorKind)] = &[
        (&PORT_PATTERN, ErrorKind::PortConflict),
        (&CONNECTION_PATTERN, ErrorKind::NodeConnection),
        (&PLATFORM_PATTERN, ErrorKind::Platform),
        (&CONTAINER_PATTERN, ErrorKind::Container),
        (&WALLET_PATTERN, ErrorKind::Wallet),
        (&TX_PATTERN, ErrorKind::Transaction),
        (&ARCHIVE_PATTERN, ErrorKind::Archive),
        (&NETWORK_PATTERN, ErrorKind::Network),
    ];
    for (pattern, kind) in table {
        if pattern.is_match(raw) {
            return *kind;
        }
    }
    ErrorKind::Unknown
}

/// Classify raw text and wrap it in the matching [`Error`] variant.
pub fn classify_raw(raw: impl Into<String>) -> Error {
    let raw = raw.into();
    match classify(&raw) {
        ErrorKind::Container => Error::Container(raw),
        ErrorKind::NodeConnection => Error::NodeConnection(raw),
        ErrorKind::PortConflict => Error::PortConflict(raw),
        ErrorKind::Network => Error::Network(raw),
        ErrorKind::Config => Error::Config(raw),
        ErrorKind::Filesystem => Error::Filesystem(raw),
        ErrorKind::Platform => Error::Platform(raw),
        ErrorKind::Wallet => Error::Wallet(raw),
        ErrorKind::Transaction => Error::Transaction(raw),
        ErrorKind::Archive => Error::Archive(raw),
        ErrorKind::Script => Error::Script(raw),
        ErrorKind::Unknown => Error::Unknown(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_connection() {
        assert_eq!(
            classify("error: Connection refused (os error 111)"),
            ErrorKind::NodeConnection
        );
        assert_eq!(classify("HTTP 401 Unauthorized"), ErrorKind::NodeConnection);
    }

    #[test]
    fn test_classify_port() {
        assert_eq!(
            classify("listen tcp 0.0.0.0:18443: bind: address already in use"),
            ErrorKind::PortConflict
        );
        assert_eq!(
            classify("driver failed: port is already allocated"),
            ErrorKind::PortConflict
        );
    }

    #[test]
    fn test_classify_container_and_platform() {
        assert_eq!(
            classify("Cannot connect to the Docker daemon"),
            ErrorKind::Container
        );
        assert_eq!(classify("exec format error"), ErrorKind::Platform);
    }

    #[test]
    fn test_classify_wallet_before_unknown() {
        assert_eq!(
            classify("Requested wallet does not exist or is not loaded"),
            ErrorKind::Wallet
        );
        assert_eq!(classify("something entirely else"), ErrorKind::Unknown);
    }

    #[test]
    fn test_suggestions_not_empty_for_known_kinds() {
        let err = Error::Container("boom".into());
        assert!(!err.suggestions().is_empty());
        assert!(Error::Unknown("x".into()).suggestions().is_empty());
    }
}
