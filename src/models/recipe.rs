//! Recipe model and the per-viewer recipe view returned by the API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::UserSummary;

/// Image used whenever generation or upload of a recipe image fails.
pub const FALLBACK_IMAGE: &str = "/logo.svg";

/// One ingredient line of a recipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipeIngredient {
    pub name: String,
    #[serde(default)]
    pub quantity: String,
}

/// Free-form extra sections generated alongside the recipe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalInformation {
    #[serde(default)]
    pub tips: String,
    #[serde(default)]
    pub variations: String,
    #[serde(default)]
    pub serving_suggestions: String,
    #[serde(default)]
    pub nutritional_information: String,
}

/// A search keyword attached to a recipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipeTag {
    pub tag: String,
}

/// A comment left on a recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub user: String,
    pub comment: String,
    pub created_at: String,
}

/// A saved recipe as stored in the database.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub ingredients: Vec<RecipeIngredient>,
    pub instructions: Vec<String>,
    pub dietary_preference: Vec<String>,
    pub additional_information: AdditionalInformation,
    pub categories: Vec<String>,
    pub tags: Vec<RecipeTag>,
    pub openai_prompt_id: String,
    pub owner_id: String,
    pub liked_by: Vec<String>,
    pub comments: Vec<Comment>,
    pub img_link: String,
    pub audio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A generated recipe submitted by the client for saving.
///
/// `dietaryPreference` and `categories` must be present as arrays, possibly empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecipe {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub instructions: Vec<String>,
    pub dietary_preference: Vec<String>,
    #[serde(default)]
    pub additional_information: AdditionalInformation,
    pub categories: Vec<String>,
    #[serde(default)]
    pub openai_prompt_id: String,
}

impl NewRecipe {
    /// Check that every field a saved recipe needs is present and non-blank.
    pub fn is_valid(&self) -> bool {
        let blank = |s: &str| s.trim().is_empty();
        let info = &self.additional_information;

        !blank(&self.name)
            && !self.ingredients.is_empty()
            && self
                .ingredients
                .iter()
                .all(|i| !blank(&i.name) && !blank(&i.quantity))
            && !self.instructions.is_empty()
            && self.instructions.iter().all(|s| !blank(s))
            && !blank(&info.tips)
            && !blank(&info.variations)
            && !blank(&info.serving_suggestions)
            && !blank(&info.nutritional_information)
            && !blank(&self.openai_prompt_id)
    }

    /// Prompt id without the `-<n>` suffix the client appends per recipe.
    pub fn base_prompt_id(&self) -> &str {
        self.openai_prompt_id
            .split('-')
            .next()
            .unwrap_or(&self.openai_prompt_id)
    }
}

/// A recipe as seen by one signed-in user, with references resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeView {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub ingredients: Vec<RecipeIngredient>,
    pub instructions: Vec<String>,
    pub dietary_preference: Vec<String>,
    pub additional_information: AdditionalInformation,
    pub categories: Vec<String>,
    pub tags: Vec<RecipeTag>,
    pub openai_prompt_id: String,
    pub owner: Option<UserSummary>,
    pub liked_by: Vec<UserSummary>,
    pub comments: Vec<Comment>,
    pub img_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Viewer created this recipe
    pub owns: bool,
    /// Viewer liked this recipe
    pub liked: bool,
}

impl RecipeView {
    /// Build the view of `recipe` for `viewer_id`, resolving user ids through `users`.
    pub fn for_viewer(
        recipe: Recipe,
        users: &HashMap<String, UserSummary>,
        viewer_id: &str,
    ) -> Self {
        let owns = recipe.owner_id == viewer_id;
        let liked = recipe.liked_by.iter().any(|id| id == viewer_id);
        let owner = users.get(&recipe.owner_id).cloned();
        let liked_by = recipe
            .liked_by
            .iter()
            .filter_map(|id| users.get(id).cloned())
            .collect();

        Self {
            id: recipe.id,
            name: recipe.name,
            ingredients: recipe.ingredients,
            instructions: recipe.instructions,
            dietary_preference: recipe.dietary_preference,
            additional_information: recipe.additional_information,
            categories: recipe.categories,
            tags: recipe.tags,
            openai_prompt_id: recipe.openai_prompt_id,
            owner,
            liked_by,
            comments: recipe.comments,
            img_link: recipe.img_link,
            audio: recipe.audio,
            created_at: recipe.created_at,
            updated_at: recipe.updated_at,
            owns,
            liked,
        }
    }
}

/// Ingredient frequency across all recipes, shaped for the popular-tags strip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagCount {
    #[serde(rename = "_id")]
    pub name: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_recipe() -> NewRecipe {
        NewRecipe {
            name: "Garlic Butter Chicken".to_string(),
            ingredients: vec![RecipeIngredient {
                name: "Chicken".to_string(),
                quantity: "500g".to_string(),
            }],
            instructions: vec!["Sear the chicken.".to_string()],
            dietary_preference: vec![],
            additional_information: AdditionalInformation {
                tips: "Rest the meat.".to_string(),
                variations: "Use thighs.".to_string(),
                serving_suggestions: "With rice.".to_string(),
                nutritional_information: "High protein.".to_string(),
            },
            categories: vec!["Dinner".to_string()],
            openai_prompt_id: "a1b2c3-0".to_string(),
        }
    }

    #[test]
    fn test_valid_recipe_passes() {
        assert!(valid_recipe().is_valid());
    }

    #[test]
    fn test_blank_fields_fail() {
        let mut r = valid_recipe();
        r.name = "  ".to_string();
        assert!(!r.is_valid());

        let mut r = valid_recipe();
        r.ingredients[0].quantity = String::new();
        assert!(!r.is_valid());

        let mut r = valid_recipe();
        r.instructions.push(" ".to_string());
        assert!(!r.is_valid());

        let mut r = valid_recipe();
        r.additional_information.nutritional_information = String::new();
        assert!(!r.is_valid());

        let mut r = valid_recipe();
        r.openai_prompt_id = String::new();
        assert!(!r.is_valid());
    }

    #[test]
    fn test_base_prompt_id_strips_suffix() {
        assert_eq!(valid_recipe().base_prompt_id(), "a1b2c3");
        let mut r = valid_recipe();
        r.openai_prompt_id = "plain".to_string();
        assert_eq!(r.base_prompt_id(), "plain");
    }

    #[test]
    fn test_view_flags() {
        let recipe = Recipe {
            id: "r1".to_string(),
            name: "Soup".to_string(),
            ingredients: vec![],
            instructions: vec![],
            dietary_preference: vec![],
            additional_information: AdditionalInformation::default(),
            categories: vec![],
            tags: vec![],
            openai_prompt_id: "p".to_string(),
            owner_id: "u1".to_string(),
            liked_by: vec!["u2".to_string(), "ghost".to_string()],
            comments: vec![],
            img_link: FALLBACK_IMAGE.to_string(),
            audio: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let mut users = HashMap::new();
        for id in ["u1", "u2"] {
            users.insert(
                id.to_string(),
                UserSummary {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                    image: None,
                },
            );
        }

        let view = RecipeView::for_viewer(recipe.clone(), &users, "u2");
        assert!(!view.owns);
        assert!(view.liked);
        // Unknown user ids are dropped rather than rendered as holes
        assert_eq!(view.liked_by.len(), 1);
        assert_eq!(view.owner.as_ref().map(|u| u.name.as_str()), Some("U1"));

        let view = RecipeView::for_viewer(recipe, &users, "u1");
        assert!(view.owns);
        assert!(!view.liked);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["_id"], "r1");
        assert!(json.get("audio").is_none());
        assert_eq!(json["imgLink"], "/logo.svg");
    }
}
