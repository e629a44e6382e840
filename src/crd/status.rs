//! # KeychainSecret Status
//!
//! Observed state of a KeychainSecret.

use k8s_openapi::api::core::v1::SecretReference;
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// Status of the KeychainSecret resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeychainSecretStatus {
    /// The Secret this KeychainSecret created and maintains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "secret_reference_schema")]
    pub secret_ref: Option<SecretReference>,
    /// When the Secret data was last fetched (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    /// Human-readable details about the last reconcile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Brief CamelCase reason for the last outcome, for machine parsing
    /// Values: Created, Rotated, UpToDate, IdentityFailed, FetchFailed,
    /// StoreConflict, StoreFailed, InvalidSpec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn secret_reference_schema(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "object",
        "nullable": true,
        "properties": {
            "name": { "type": "string" },
            "namespace": { "type": "string" }
        }
    });
    Schema::try_from(schema_value).expect("Failed to create Schema for secret reference")
}
