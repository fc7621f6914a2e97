//! Ingredient catalogue model.

use serde::{Deserialize, Serialize};

/// A validated ingredient users can pick when generating recipes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub created_by: Option<String>,
    pub created_at: String,
}

/// An ingredient picked by the user for recipe generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientInput {
    pub name: String,
    /// Free text or a bare number, depending on the client
    #[serde(default)]
    pub quantity: Option<serde_json::Value>,
}

impl IngredientInput {
    /// Quantity as prompt text, if one was given.
    pub fn quantity_text(&self) -> Option<String> {
        match self.quantity.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        }
    }
}

/// Normalise user input to the catalogue form: trimmed, first letter upper, rest lower.
pub fn format_ingredient_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    }
}
