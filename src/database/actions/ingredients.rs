use std::collections::HashSet;

use sqlx::{Pool, Postgres};

use crate::{
    error::Error,
    form::IngredientForm,
    schema::{Ingredient, Uuid},
};

pub async fn create_ingredient(
    form: &IngredientForm,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, Error> {
    form.validate()?;

    let ingredient: Ingredient = sqlx::query_as(
        "
        INSERT INTO ingredients (name, measurement_unit)
        VALUES ($1, $2)
        RETURNING *
    ",
    )
    .bind(&form.name)
    .bind(&form.measurement_unit)
    .fetch_one(pool)
    .await?;

    Ok(ingredient)
}

pub async fn get_ingredient(
    ingredient_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(ingredient_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Escapes LIKE metacharacters so the search string matches literally.
fn escape_like(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Lists ingredients, optionally narrowed to a case-insensitive name prefix.
pub async fn list_ingredients(
    search: Option<String>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> = match search {
        Some(name) => {
            sqlx::query_as(
                "SELECT * FROM ingredients WHERE name ILIKE $1 || '%' ORDER BY LOWER(name)",
            )
            .bind(escape_like(&name))
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM ingredients ORDER BY LOWER(name)")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows)
}

/// Returns the first id from `ids` that has no matching ingredient row.
pub async fn find_missing_ingredient(
    ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<Option<Uuid>, Error> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ids.to_vec())
        .fetch_all(pool)
        .await?;

    let found: HashSet<Uuid> = rows.into_iter().map(|row| row.0).collect();

    Ok(ids.iter().find(|id| !found.contains(id)).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("salt"), "salt");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("sea_salt"), "sea\\_salt");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
