//! Audit record of an OpenAI call.

use serde::{Deserialize, Serialize};

/// One row of the append-only AI audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiGenerated {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    pub response: serde_json::Value,
    pub model: Option<String>,
    pub created_at: String,
}
