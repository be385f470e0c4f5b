//! Client identity shared by the highway and directory protocols.

use serde::{Deserialize, Serialize};

/// Read-only identity of the client performing uploads and lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientIdentity {
    /// Account number
    pub uin: u64,
    /// Application sub-id of the client build
    pub sub_app_id: u32,
    /// Device identifier
    pub imei: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            uin: 0,
            sub_app_id: 537064989,
            imei: String::new(),
        }
    }
}
