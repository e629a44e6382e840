//! # Custom Resource Definitions
//!
//! The `KeychainSecret` resource: a request to materialize one Keychain secret
//! into a Kubernetes Secret in the same namespace and refresh it every `ttl`.

mod status;

pub use status::KeychainSecretStatus;

use crate::constants::DEFAULT_TTL;
use kube::CustomResource;
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// Pattern shared by Keychain secret and group names
pub const KEYCHAIN_NAME_PATTERN: &str = "^[A-Z0-9_]+$";

/// Pattern accepted for TTLs. Days and longer units are not allowed since
/// their length is locale dependent.
pub const TTL_PATTERN: &str = "^[0-9]+[smh]$";

/// KeychainSecret Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: aqueduct.k8s.facebook.com/v1
/// kind: KeychainSecret
/// metadata:
///   name: payments-db
///   namespace: payments
/// spec:
///   name: DB_PASSWORD
///   group: PAYMENTS
///   ttl: 12h
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[kube(
    kind = "KeychainSecret",
    group = "aqueduct.k8s.facebook.com",
    version = "v1",
    namespaced,
    status = "KeychainSecretStatus",
    shortname = "kcs",
    printcolumn = r#"{"name":"Secret", "type":"string", "jsonPath":".spec.name"}, {"name":"TTL", "type":"string", "jsonPath":".spec.ttl"}, {"name":"Last Update", "type":"date", "jsonPath":".status.lastUpdate"}, {"name":"Reason", "type":"string", "jsonPath":".status.reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeychainSecretSpec {
    /// Name of the Keychain secret
    #[schemars(schema_with = "keychain_name_schema")]
    pub name: String,
    /// Keychain group the secret lives in. Not every secret is in a group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "keychain_group_schema")]
    pub group: Option<String>,
    /// How often the secret is refreshed, e.g. "30m" or "24h".
    /// Only seconds (s), minutes (m) and hours (h) are accepted.
    #[serde(default = "default_ttl")]
    #[schemars(schema_with = "ttl_schema")]
    pub ttl: String,
}

fn default_ttl() -> String {
    DEFAULT_TTL.to_string()
}

fn keychain_name_schema(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "string",
        "minLength": 1,
        "maxLength": 150,
        "pattern": KEYCHAIN_NAME_PATTERN
    });
    Schema::try_from(schema_value).expect("Failed to create Schema for keychain name")
}

fn keychain_group_schema(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "string",
        "nullable": true,
        "minLength": 1,
        "maxLength": 150,
        "pattern": KEYCHAIN_NAME_PATTERN
    });
    Schema::try_from(schema_value).expect("Failed to create Schema for keychain group")
}

fn ttl_schema(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "string",
        "default": DEFAULT_TTL,
        "pattern": TTL_PATTERN
    });
    Schema::try_from(schema_value).expect("Failed to create Schema for ttl")
}
