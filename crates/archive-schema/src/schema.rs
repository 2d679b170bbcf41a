//! JSON schema definitions for manifest validation.

/// JSON Schema for manifest.json.
pub const MANIFEST_SCHEMA: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "$id": "https://regpack.dev/schemas/manifest.json",
  "title": "Regpack Archive Manifest",
  "type": "object",
  "required": ["schema_version", "snapshot_id", "name", "created_at", "network", "mode", "blockchain", "contents", "checksums", "rpc"],
  "properties": {
    "schema_version": {
      "type": "string",
      "pattern": "^\\d+\\.\\d+\\.\\d+$"
    },
    "snapshot_id": {
      "type": "string",
      "format": "uuid"
    },
    "name": { "type": "string", "minLength": 1 },
    "description": { "type": ["string", "null"] },
    "author": { "type": ["string", "null"] },
    "created_at": {
      "type": "string",
      "format": "date-time"
    },
    "tool_version": { "type": "string" },
    "node_version": { "type": ["string", "null"] },
    "network": { "type": "string", "enum": ["regtest"] },
    "mode": { "type": "string", "enum": ["container", "external"] },
    "blockchain": {
      "type": "object",
      "required": ["block_height", "tip_hash"],
      "properties": {
        "block_height": { "type": "integer", "minimum": 0 },
        "tip_hash": { "type": "string" },
        "chain_work": { "type": ["string", "null"] }
      }
    },
    "contents": {
      "type": "object",
      "required": ["has_blockchain_data", "has_replay_script", "bitcoin_wallets"],
      "properties": {
        "has_blockchain_data": { "type": "boolean" },
        "has_replay_script": { "type": "boolean" },
        "bitcoin_wallets": { "type": "array", "items": { "type": "string" } },
        "multisig_configs": { "type": "array", "items": { "type": "string" } },
        "key_files": { "type": "array", "items": { "type": "string" } },
        "scenarios": { "type": "array", "items": { "type": "string" } }
      }
    },
    "checksums": {
      "type": "object",
      "required": ["files"],
      "properties": {
        "blockchain_payload": { "type": ["string", "null"], "pattern": "^[0-9a-f]{64}$" },
        "files": {
          "type": "object",
          "additionalProperties": { "type": "string", "pattern": "^[0-9a-f]{64}$" }
        }
      }
    },
    "rpc": {
      "type": "object",
      "required": ["user", "password", "rpc_port", "p2p_port"],
      "properties": {
        "user": { "type": "string" },
        "password": { "type": "string" },
        "rpc_port": { "type": "integer", "minimum": 1, "maximum": 65535 },
        "p2p_port": { "type": "integer", "minimum": 1, "maximum": 65535 }
      }
    },
    "container": {
      "type": ["object", "null"],
      "required": ["image", "container_name", "proxy_port"],
      "properties": {
        "image": { "type": "string" },
        "container_name": { "type": "string" },
        "proxy_port": { "type": "integer" }
      }
    }
  }
}"#;

/// Parse the embedded manifest schema.
pub fn manifest_schema() -> serde_json::Value {
    serde_json::from_str(MANIFEST_SCHEMA).expect("embedded manifest schema is valid JSON")
}
