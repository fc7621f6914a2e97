//! Pagination, filtering and sorting for recipe listings.
//!
//! Translates the listing controls of the front end (`page`, `limit`, `sortOption`,
//! `filterOption`, `query`) into a typed [`RecipeQuery`] and the SQL fragments the
//! repository splices into its listing statements.

use serde::Deserialize;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 12;
pub const MAX_LIMIT: i64 = 100;

/// Number of entries in the popular-tags strip.
pub const POPULAR_TAGS_LIMIT: i64 = 20;

/// Raw query-string parameters. Everything is a string so bad input degrades to defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_option: Option<String>,
    pub filter_option: Option<String>,
    pub query: Option<String>,
}

/// Listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOption {
    Recent,
    Popular,
}

/// Listing subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOption {
    All,
    Liked,
    /// Saved recipes are the ones the viewer liked
    Saved,
}

/// A fully resolved listing request for one viewer.
#[derive(Debug, Clone)]
pub struct RecipeQuery {
    pub page: i64,
    pub limit: i64,
    /// Rows to skip; saturates for pages far past the end
    pub skip: i64,
    pub sort: SortOption,
    pub filter: FilterOption,
    /// Lower-cased search text
    pub search: Option<String>,
    pub viewer_id: String,
}

impl RecipeQuery {
    /// Resolve raw parameters for `viewer_id`, falling back to defaults on bad input.
    pub fn from_params(params: &PaginationParams, viewer_id: &str) -> Self {
        let page = parse_positive(params.page.as_deref()).unwrap_or(DEFAULT_PAGE);
        let limit = parse_positive(params.limit.as_deref())
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);

        let sort = match params.sort_option.as_deref() {
            Some("popular") => SortOption::Popular,
            _ => SortOption::Recent,
        };

        let filter = match params.filter_option.as_deref() {
            Some("liked") => FilterOption::Liked,
            Some("saved") => FilterOption::Saved,
            _ => FilterOption::All,
        };

        let search = params
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        Self {
            page,
            limit,
            skip: (page - 1).checked_mul(limit).unwrap_or(i64::MAX),
            sort,
            filter,
            search,
            viewer_id: viewer_id.to_string(),
        }
    }

    /// `WHERE` clause over the `recipes r` alias, with its positional bind values.
    ///
    /// Search matches the lower-cased name columns.
    ///
    /// Returns an empty string when no condition applies.
    pub fn where_clause(&self) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();

        if let Some(search) = &self.search {
            let pattern = format!("%{}%", escape_like(search));
            conditions.push(
                "(EXISTS (SELECT 1 FROM recipe_tags t WHERE t.recipe_id = r.id AND t.tag LIKE ? ESCAPE '\\') \
                 OR EXISTS (SELECT 1 FROM recipe_ingredients i WHERE i.recipe_id = r.id AND i.name_lc LIKE ? ESCAPE '\\') \
                 OR r.name_lc LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            binds.extend(std::iter::repeat(pattern).take(3));
        }

        if matches!(self.filter, FilterOption::Liked | FilterOption::Saved) {
            conditions.push(
                "EXISTS (SELECT 1 FROM recipe_likes l WHERE l.recipe_id = r.id AND l.user_id = ?)"
                    .to_string(),
            );
            binds.push(self.viewer_id.clone());
        }

        if conditions.is_empty() {
            (String::new(), binds)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), binds)
        }
    }

    /// `ORDER BY` clause over the `recipes r` alias.
    pub fn order_clause(&self) -> &'static str {
        match self.sort {
            SortOption::Recent => "ORDER BY r.created_at DESC, r.id",
            SortOption::Popular => {
                "ORDER BY (SELECT COUNT(*) FROM recipe_likes l WHERE l.recipe_id = r.id) DESC, r.created_at DESC, r.id"
            }
        }
    }
}

/// Number of pages needed for `total` items at `limit` per page.
pub fn total_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

/// Escape `LIKE` wildcards so user text matches literally.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn parse_positive(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
}
