//! Archive schema: manifest, wallet export and replay script types.
//!
//! Everything in an archive that is not raw blockchain data is described by
//! the types here. The manifest is written once at the end of export and is
//! the sole basis for import decisions.

pub mod manifest;
pub mod replay;
pub mod schema;
pub mod validation;
pub mod wallet;

pub use manifest::{
    ArchiveContents, BlockchainState, ChecksumSet, ContainerMeta, Manifest, MANIFEST_FILE,
};
pub use replay::{ReplayAction, ReplayScript, ReplayStep, REPLAY_FILE};
pub use wallet::{DescriptorRecord, DescriptorTimestamp, WalletExport, WalletRole};
