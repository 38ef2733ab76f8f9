//! Serializable view of the connected rigs.
//!
//! The field names match the `report.json` snapshot consumed by existing
//! dashboards: `{ "rigsCount": N, "rigs": [{ id, ip, login, ua, datetime }] }`.

use serde::{Deserialize, Serialize};

/// One logged-in rig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigRecord {
    /// Session identifier.
    pub id: String,
    /// Remote address of the rig.
    pub ip: String,
    /// Login as sent by the rig, before rewriting.
    pub login: String,
    /// User agent as sent by the rig.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
    /// Login time, milliseconds since the Unix epoch.
    pub datetime: u64,
}

/// Point-in-time snapshot of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RigReport {
    pub rigs_count: usize,
    pub rigs: Vec<RigRecord>,
}
