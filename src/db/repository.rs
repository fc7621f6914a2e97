//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    AdditionalInformation, AiGenerated, Comment, Ingredient, NewRecipe, PendingPayment, Plan,
    Recipe, RecipeIngredient, RecipeTag, SignInRequest, Subscription, SubscriptionStatus,
    TagCount, User, UserSummary,
};
use crate::pagination::RecipeQuery;

const USER_COLUMNS: &str = "id, name, email, image, email_verified, created_at, subscription_plan, \
     subscription_status, subscription_start, subscription_end, gcash_account, pending_payment";

const RECIPE_COLUMNS: &str = "r.id, r.name, r.instructions, r.dietary_preference, \
     r.additional_information, r.categories, r.comments, r.openai_prompt_id, r.owner_id, \
     r.img_link, r.audio, r.created_at, r.updated_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// Create the user on first sign-in, refresh profile fields afterwards.
    pub async fn upsert_user(&self, request: &SignInRequest) -> Result<User, AppError> {
        let id = new_id();
        let now = timestamp();

        sqlx::query(
            r#"INSERT INTO users (id, name, email, image, email_verified, created_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(email) DO UPDATE SET
                   name = excluded.name,
                   image = COALESCE(excluded.image, users.image),
                   email_verified = COALESCE(excluded.email_verified, users.email_verified)"#,
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.image)
        .bind(&request.email_verified)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(&request.email)
            .fetch_one(&self.pool)
            .await?;

        Ok(user_from_row(&row))
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Public summaries of the given users, keyed by ID.
    pub async fn get_user_summaries(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, UserSummary>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT id, name, image FROM users WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let summary = UserSummary {
                    id: row.get("id"),
                    name: row.get("name"),
                    image: row.get("image"),
                };
                (summary.id.clone(), summary)
            })
            .collect())
    }

    /// Remember a checkout that is waiting for payment confirmation.
    pub async fn set_pending_payment(
        &self,
        user_id: &str,
        pending: &PendingPayment,
    ) -> Result<(), AppError> {
        let pending_json = serde_json::to_string(pending)?;
        let result = sqlx::query("UPDATE users SET pending_payment = ? WHERE id = ?")
            .bind(&pending_json)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    /// Activate a paid subscription and clear the pending payment.
    ///
    /// Returns `None` when the user does not exist.
    pub async fn activate_subscription(
        &self,
        user_id: &str,
        plan: Plan,
        start_date: &str,
        end_date: &str,
    ) -> Result<Option<User>, AppError> {
        let result = sqlx::query(
            r#"UPDATE users SET
                subscription_plan = ?, subscription_status = ?,
                subscription_start = ?, subscription_end = ?, pending_payment = NULL
               WHERE id = ?"#,
        )
        .bind(plan.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .bind(start_date)
        .bind(end_date)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(user_id).await
    }

    // ==================== INGREDIENT OPERATIONS ====================

    /// List all ingredients alphabetically.
    pub async fn list_ingredients(&self) -> Result<Vec<Ingredient>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, created_by, created_at FROM ingredients ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(ingredient_from_row).collect())
    }

    /// Find an ingredient by its exact (formatted) name.
    pub async fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>, AppError> {
        let row = sqlx::query("SELECT id, name, created_by, created_at FROM ingredients WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(ingredient_from_row))
    }

    /// Add an ingredient to the catalogue.
    pub async fn create_ingredient(
        &self,
        name: &str,
        created_by: &str,
    ) -> Result<Ingredient, AppError> {
        let id = new_id();
        let now = timestamp();

        sqlx::query("INSERT INTO ingredients (id, name, created_by, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(created_by)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok(Ingredient {
            id,
            name: name.to_string(),
            created_by: Some(created_by.to_string()),
            created_at: now,
        })
    }

    // ==================== RECIPE OPERATIONS ====================

    /// Insert a batch of recipes for `owner_id` in one transaction.
    ///
    /// Each entry pairs the submitted recipe with its resolved image link.
    pub async fn insert_recipes(
        &self,
        owner_id: &str,
        recipes: &[(NewRecipe, String)],
    ) -> Result<Vec<Recipe>, AppError> {
        let mut saved = Vec::with_capacity(recipes.len());
        let mut tx = self.pool.begin().await?;

        for (recipe, img_link) in recipes {
            let id = new_id();
            let now = timestamp();
            let prompt_id = recipe.base_prompt_id().to_string();

            sqlx::query(
                r#"INSERT INTO recipes (
                    id, name, name_lc, instructions, dietary_preference, additional_information,
                    categories, comments, openai_prompt_id, owner_id, img_link, audio,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, '[]', ?, ?, ?, NULL, ?, ?)"#,
            )
            .bind(&id)
            .bind(&recipe.name)
            .bind(recipe.name.to_lowercase())
            .bind(serde_json::to_string(&recipe.instructions)?)
            .bind(serde_json::to_string(&recipe.dietary_preference)?)
            .bind(serde_json::to_string(&recipe.additional_information)?)
            .bind(serde_json::to_string(&recipe.categories)?)
            .bind(&prompt_id)
            .bind(owner_id)
            .bind(img_link)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            for (position, ingredient) in recipe.ingredients.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO recipe_ingredients (recipe_id, position, name, name_lc, quantity) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(position as i64)
                .bind(&ingredient.name)
                .bind(ingredient.name.to_lowercase())
                .bind(&ingredient.quantity)
                .execute(&mut *tx)
                .await?;
            }

            saved.push(Recipe {
                id,
                name: recipe.name.clone(),
                ingredients: recipe.ingredients.clone(),
                instructions: recipe.instructions.clone(),
                dietary_preference: recipe.dietary_preference.clone(),
                additional_information: recipe.additional_information.clone(),
                categories: recipe.categories.clone(),
                tags: Vec::new(),
                openai_prompt_id: prompt_id,
                owner_id: owner_id.to_string(),
                liked_by: Vec::new(),
                comments: Vec::new(),
                img_link: img_link.clone(),
                audio: None,
                created_at: now.clone(),
                updated_at: now,
            });
        }

        tx.commit().await?;
        Ok(saved)
    }

    /// Get a recipe by ID.
    pub async fn get_recipe(&self, id: &str) -> Result<Option<Recipe>, AppError> {
        let rows = sqlx::query(&format!("SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.id = ?"))
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    /// One page of recipes matching the query.
    pub async fn list_recipes(&self, query: &RecipeQuery) -> Result<Vec<Recipe>, AppError> {
        let (where_sql, binds) = query.where_clause();
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r {where_sql} {} LIMIT ? OFFSET ?",
            query.order_clause()
        );

        let mut q = sqlx::query(&sql);
        for value in &binds {
            q = q.bind(value);
        }
        let rows = q
            .bind(query.limit)
            .bind(query.skip)
            .fetch_all(&self.pool)
            .await?;

        self.hydrate(rows).await
    }

    /// Count all recipes matching the query, ignoring pagination.
    pub async fn count_recipes(&self, query: &RecipeQuery) -> Result<i64, AppError> {
        let (where_sql, binds) = query.where_clause();
        let sql = format!("SELECT COUNT(*) AS total FROM recipes r {where_sql}");

        let mut q = sqlx::query(&sql);
        for value in &binds {
            q = q.bind(value);
        }
        let row = q.fetch_one(&self.pool).await?;
        Ok(row.get("total"))
    }

    /// Most frequent ingredient names over the whole collection.
    pub async fn popular_tags(&self, limit: i64) -> Result<Vec<TagCount>, AppError> {
        let rows = sqlx::query(
            r#"SELECT name, COUNT(*) AS count FROM recipe_ingredients
               GROUP BY name ORDER BY count DESC, name LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TagCount {
                name: row.get("name"),
                count: row.get("count"),
            })
            .collect())
    }

    /// Number of recipes created by a user.
    pub async fn count_owned_recipes(&self, user_id: &str) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM recipes WHERE owner_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    /// Recipes a user owns or has liked, newest first.
    pub async fn list_profile_recipes(&self, user_id: &str) -> Result<Vec<Recipe>, AppError> {
        let rows = sqlx::query(&format!(
            r#"SELECT {RECIPE_COLUMNS} FROM recipes r
               WHERE r.owner_id = ?
                  OR EXISTS (SELECT 1 FROM recipe_likes l WHERE l.recipe_id = r.id AND l.user_id = ?)
               ORDER BY r.created_at DESC, r.id"#
        ))
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    /// Like the recipe if the user has not yet, otherwise remove the like.
    ///
    /// Returns whether the recipe is liked afterwards.
    pub async fn toggle_like(&self, recipe_id: &str, user_id: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM recipe_likes WHERE recipe_id = ? AND user_id = ?")
            .bind(recipe_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let liked = if removed.rows_affected() == 0 {
            sqlx::query("INSERT INTO recipe_likes (recipe_id, user_id, liked_at) VALUES (?, ?, ?)")
                .bind(recipe_id)
                .bind(user_id)
                .bind(timestamp())
                .execute(&mut *tx)
                .await?;
            true
        } else {
            false
        };

        sqlx::query("UPDATE recipes SET updated_at = ? WHERE id = ?")
            .bind(timestamp())
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(liked)
    }

    /// Delete a recipe together with its ingredients, tags and likes.
    pub async fn delete_recipe(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Recipe {} not found", id)));
        }
        Ok(())
    }

    /// Replace the search tags of a recipe.
    pub async fn set_recipe_tags(&self, id: &str, tags: &[String]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for (position, tag) in tags.iter().enumerate() {
            sqlx::query("INSERT INTO recipe_tags (recipe_id, position, tag) VALUES (?, ?, ?)")
                .bind(id)
                .bind(position as i64)
                .bind(tag)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE recipes SET updated_at = ? WHERE id = ?")
            .bind(timestamp())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Store the narration audio link of a recipe.
    pub async fn set_recipe_audio(&self, id: &str, audio: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE recipes SET audio = ?, updated_at = ? WHERE id = ?")
            .bind(audio)
            .bind(timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Recipe {} not found", id)));
        }
        Ok(())
    }

    /// Attach ingredients, tags and likes to base recipe rows, keeping row order.
    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<Recipe>, AppError> {
        let mut recipes: Vec<Recipe> = rows.iter().map(recipe_from_row).collect();
        if recipes.is_empty() {
            return Ok(recipes);
        }

        let ids: Vec<String> = recipes.iter().map(|r| r.id.clone()).collect();
        let marks = placeholders(ids.len());

        let ingredient_sql = format!(
            "SELECT recipe_id, name, quantity FROM recipe_ingredients WHERE recipe_id IN ({marks}) ORDER BY recipe_id, position"
        );
        let tag_sql = format!(
            "SELECT recipe_id, tag FROM recipe_tags WHERE recipe_id IN ({marks}) ORDER BY recipe_id, position"
        );
        let like_sql = format!(
            "SELECT recipe_id, user_id FROM recipe_likes WHERE recipe_id IN ({marks}) ORDER BY recipe_id, liked_at"
        );

        let mut ingredients: HashMap<String, Vec<RecipeIngredient>> = HashMap::new();
        for row in self.fetch_for_ids(&ingredient_sql, &ids).await? {
            ingredients
                .entry(row.get("recipe_id"))
                .or_default()
                .push(RecipeIngredient {
                    name: row.get("name"),
                    quantity: row.get("quantity"),
                });
        }

        let mut tags: HashMap<String, Vec<RecipeTag>> = HashMap::new();
        for row in self.fetch_for_ids(&tag_sql, &ids).await? {
            tags.entry(row.get("recipe_id"))
                .or_default()
                .push(RecipeTag { tag: row.get("tag") });
        }

        let mut likes: HashMap<String, Vec<String>> = HashMap::new();
        for row in self.fetch_for_ids(&like_sql, &ids).await? {
            likes
                .entry(row.get("recipe_id"))
                .or_default()
                .push(row.get("user_id"));
        }

        for recipe in &mut recipes {
            recipe.ingredients = ingredients.remove(&recipe.id).unwrap_or_default();
            recipe.tags = tags.remove(&recipe.id).unwrap_or_default();
            recipe.liked_by = likes.remove(&recipe.id).unwrap_or_default();
        }

        Ok(recipes)
    }

    async fn fetch_for_ids(&self, sql: &str, ids: &[String]) -> Result<Vec<SqliteRow>, AppError> {
        let mut query = sqlx::query(sql);
        for id in ids {
            query = query.bind(id);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    // ==================== AI AUDIT OPERATIONS ====================

    /// Append an OpenAI call to the audit log.
    pub async fn save_ai_response(
        &self,
        user_id: &str,
        prompt: &str,
        response: &serde_json::Value,
        model: Option<&str>,
    ) -> Result<AiGenerated, AppError> {
        let record = AiGenerated {
            id: new_id(),
            user_id: user_id.to_string(),
            prompt: prompt.to_string(),
            response: response.clone(),
            model: model.map(str::to_string),
            created_at: timestamp(),
        };

        sqlx::query(
            "INSERT INTO ai_generated (id, user_id, prompt, response, model, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.prompt)
        .bind(serde_json::to_string(&record.response)?)
        .bind(&record.model)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    /// Number of audited AI calls made on behalf of a user.
    pub async fn count_ai_responses(&self, user_id: &str) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM ai_generated WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }
}

// Helper functions for row conversion

fn user_from_row(row: &SqliteRow) -> User {
    let plan: Option<String> = row.get("subscription_plan");
    let status: String = row.get("subscription_status");
    let pending: Option<String> = row.get("pending_payment");

    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        image: row.get("image"),
        email_verified: row.get("email_verified"),
        created_at: row.get("created_at"),
        subscription: Subscription {
            plan: plan.as_deref().and_then(Plan::parse),
            status: SubscriptionStatus::parse(&status),
            start_date: row.get("subscription_start"),
            end_date: row.get("subscription_end"),
            gcash_account: row.get("gcash_account"),
            pending_payment: pending.and_then(|s| serde_json::from_str(&s).ok()),
        },
    }
}

fn ingredient_from_row(row: &SqliteRow) -> Ingredient {
    Ingredient {
        id: row.get("id"),
        name: row.get("name"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
    }
}

fn recipe_from_row(row: &SqliteRow) -> Recipe {
    let instructions: String = row.get("instructions");
    let dietary_preference: String = row.get("dietary_preference");
    let additional_information: String = row.get("additional_information");
    let categories: String = row.get("categories");
    let comments: String = row.get("comments");

    Recipe {
        id: row.get("id"),
        name: row.get("name"),
        ingredients: Vec::new(),
        instructions: parse_json_array(&instructions),
        dietary_preference: parse_json_array(&dietary_preference),
        additional_information: serde_json::from_str::<AdditionalInformation>(
            &additional_information,
        )
        .unwrap_or_default(),
        categories: parse_json_array(&categories),
        tags: Vec::new(),
        openai_prompt_id: row.get("openai_prompt_id"),
        owner_id: row.get("owner_id"),
        liked_by: Vec::new(),
        comments: serde_json::from_str::<Vec<Comment>>(&comments).unwrap_or_default(),
        img_link: row.get("img_link"),
        audio: row.get("audio"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Hyphen-free UUID; clients append `-<n>` to prompt ids and the server splits on `-`.
fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Fixed-width RFC 3339 so lexical order equals chronological order.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
