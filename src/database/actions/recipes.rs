use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    authentication::jwt::SessionData,
    authentication::permissions::{authorize, Policy},
    constants::RECIPE_COUNT_PER_PAGE,
    error::Error,
    form::{IngredientAmount, RecipeForm},
    pagination::PageContext,
    schema::{
        CartLine, Recipe, RecipeIngredientDetail, RecipeRow, RecipeView, ShortRecipe, Tag, Uuid,
    },
    shopping_list::ShoppingList,
};

use super::users::{get_user_by_id, user_view};
use super::{ingredients, tags};

pub async fn get_recipe(recipe_id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Fetches a recipe for modification, verifying the caller is allowed to
/// write it. Admins may modify any recipe, everyone else only their own.
pub async fn get_recipe_mut(
    recipe_id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| Error::NotFound(String::from("No recipe exists with specified id")))?;

    authorize(
        Policy::OwnerOrAdmin {
            owner_id: recipe.author_id,
        },
        Some(session),
        true,
    )?;

    Ok(recipe)
}

/// Lists recipes newest first, optionally narrowed by author and tag slug.
pub async fn fetch_recipes(
    author: Option<Uuid>,
    tag: Option<String>,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<Recipe>, Error> {
    let rows: Vec<RecipeRow> = match (author, tag) {
        (Some(author_id), Some(slug)) => {
            sqlx::query_as(
                "
                SELECT r.*, COUNT(*) OVER() AS count
                FROM recipes r
                WHERE r.author_id = $1 AND EXISTS (
                    SELECT 1 FROM recipe_tags rt
                    INNER JOIN tags t ON t.id = rt.tag_id
                    WHERE rt.recipe_id = r.id AND t.slug = $2
                )
                ORDER BY r.pub_date DESC
                LIMIT $3 OFFSET $4
            ",
            )
            .bind(author_id)
            .bind(slug)
            .bind(RECIPE_COUNT_PER_PAGE)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        (Some(author_id), None) => {
            sqlx::query_as(
                "
                SELECT r.*, COUNT(*) OVER() AS count
                FROM recipes r
                WHERE r.author_id = $1
                ORDER BY r.pub_date DESC
                LIMIT $2 OFFSET $3
            ",
            )
            .bind(author_id)
            .bind(RECIPE_COUNT_PER_PAGE)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        (None, Some(slug)) => {
            sqlx::query_as(
                "
                SELECT r.*, COUNT(*) OVER() AS count
                FROM recipes r
                WHERE EXISTS (
                    SELECT 1 FROM recipe_tags rt
                    INNER JOIN tags t ON t.id = rt.tag_id
                    WHERE rt.recipe_id = r.id AND t.slug = $1
                )
                ORDER BY r.pub_date DESC
                LIMIT $2 OFFSET $3
            ",
            )
            .bind(slug)
            .bind(RECIPE_COUNT_PER_PAGE)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        (None, None) => {
            sqlx::query_as(
                "
                SELECT r.*, COUNT(*) OVER() AS count
                FROM recipes r
                ORDER BY r.pub_date DESC
                LIMIT $1 OFFSET $2
            ",
            )
            .bind(RECIPE_COUNT_PER_PAGE)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
    };

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let recipes: Vec<Recipe> = rows.into_iter().map(Recipe::from).collect();

    Ok(PageContext::from_rows(
        recipes,
        total_count,
        RECIPE_COUNT_PER_PAGE,
        offset,
    ))
}

async fn check_references(form: &RecipeForm, pool: &Pool<Postgres>) -> Result<(), Error> {
    let ingredient_ids: Vec<Uuid> = form.ingredients.iter().map(|part| part.id).collect();
    if let Some(id) = ingredients::find_missing_ingredient(&ingredient_ids, pool).await? {
        return Err(Error::validation(
            "ingredients",
            format!("Ingredient with id {id} doesn't exist"),
        ));
    }

    if let Some(id) = tags::find_missing_tag(&form.tags, pool).await? {
        return Err(Error::validation(
            "tags",
            format!("Tag with id {id} doesn't exist"),
        ));
    }

    Ok(())
}

async fn insert_recipe_ingredients(
    recipe_id: Uuid,
    parts: &[IngredientAmount],
    tr: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");

    query_builder.push_values(parts.iter(), |mut builder, part| {
        builder
            .push_bind(recipe_id)
            .push_bind(part.id)
            .push_bind(part.amount);
    });

    query_builder.build().execute(&mut **tr).await?;

    Ok(())
}

async fn insert_recipe_tags(
    recipe_id: Uuid,
    tag_ids: &[Uuid],
    tr: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");

    query_builder.push_values(tag_ids.iter(), |mut builder, tag_id| {
        builder.push_bind(recipe_id).push_bind(*tag_id);
    });

    query_builder.build().execute(&mut **tr).await?;

    Ok(())
}

/// Creates a recipe with its ingredient amounts and tags in one transaction.
pub async fn create_recipe(
    author_id: Uuid,
    form: &RecipeForm,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    form.validate_create()?;
    check_references(form, pool).await?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| Error::internal("Could not start transaction"))?;

    let recipe: Recipe = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time, pub_date)
        VALUES ($1, $2, $3, $4, $5, NOW())
        RETURNING *
    ",
    )
    .bind(author_id)
    .bind(&form.name)
    .bind(&form.image)
    .bind(&form.text)
    .bind(form.cooking_time)
    .fetch_one(&mut *tr)
    .await?;

    insert_recipe_ingredients(recipe.id, &form.ingredients, &mut tr).await?;
    insert_recipe_tags(recipe.id, &form.tags, &mut tr).await?;

    tr.commit()
        .await
        .map_err(|_| Error::internal("Could not commit transaction"))?;

    Ok(recipe)
}

/// Replaces a recipe's fields and both join sets. The old ingredient amounts
/// and tag links are deleted and the form's are re-inserted, so readers never
/// see a mix of old and new rows.
pub async fn update_recipe(
    recipe: &Recipe,
    form: &RecipeForm,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    form.validate()?;
    check_references(form, pool).await?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| Error::internal("Could not start transaction"))?;

    let updated: Recipe = sqlx::query_as(
        "
        UPDATE recipes SET
        name = $1,
        image = COALESCE($2, image),
        text = $3,
        cooking_time = $4
        WHERE id = $5
        RETURNING *
    ",
    )
    .bind(&form.name)
    .bind(&form.image)
    .bind(&form.text)
    .bind(form.cooking_time)
    .bind(recipe.id)
    .fetch_one(&mut *tr)
    .await?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe.id)
        .execute(&mut *tr)
        .await?;
    insert_recipe_ingredients(recipe.id, &form.ingredients, &mut tr).await?;

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe.id)
        .execute(&mut *tr)
        .await?;
    insert_recipe_tags(recipe.id, &form.tags, &mut tr).await?;

    tr.commit()
        .await
        .map_err(|_| Error::internal("Could not commit transaction"))?;

    Ok(updated)
}

/// Deletes a recipe and every row referencing it.
pub async fn delete_recipe(recipe_id: Uuid, pool: &Pool<Postgres>) -> Result<(), Error> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| Error::internal("Could not start transaction"))?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await?;
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await?;
    sqlx::query("DELETE FROM user_favorites WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await?;
    sqlx::query("DELETE FROM shopping_cart WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await?;
    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await?;

    tr.commit()
        .await
        .map_err(|_| Error::internal("Could not commit transaction"))?;

    Ok(())
}

pub async fn list_recipe_ingredients(
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeIngredientDetail>, Error> {
    let rows: Vec<RecipeIngredientDetail> = sqlx::query_as(
        "
        SELECT i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY i.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_recipe_tags(recipe_id: Uuid, pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let rows: Vec<Tag> = sqlx::query_as(
        "
        SELECT t.*
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = $1
        ORDER BY t.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn is_favorited(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM user_favorites WHERE user_id = $1 AND recipe_id = $2)",
    )
    .bind(user_id)
    .bind(recipe_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

pub async fn is_in_shopping_cart(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM shopping_cart WHERE user_id = $1 AND recipe_id = $2)",
    )
    .bind(user_id)
    .bind(recipe_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

pub async fn add_to_favorites(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<ShortRecipe, Error> {
    let recipe = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| Error::NotFound(String::from("No recipe exists with specified id")))?;

    let result = sqlx::query(
        "INSERT INTO user_favorites (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::AlreadyExists(String::from(
            "Recipe is already in favorites",
        )));
    }

    Ok(ShortRecipe::from(&recipe))
}

pub async fn remove_from_favorites(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM user_favorites WHERE user_id = $1 AND recipe_id = $2")
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(String::from("Recipe is not in favorites")));
    }

    Ok(())
}

pub async fn add_to_cart(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<ShortRecipe, Error> {
    let recipe = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| Error::NotFound(String::from("No recipe exists with specified id")))?;

    let result = sqlx::query(
        "INSERT INTO shopping_cart (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::AlreadyExists(String::from(
            "Recipe is already in the shopping cart",
        )));
    }

    Ok(ShortRecipe::from(&recipe))
}

pub async fn remove_from_cart(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM shopping_cart WHERE user_id = $1 AND recipe_id = $2")
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(String::from(
            "Recipe is not in the shopping cart",
        )));
    }

    Ok(())
}

/// Every (name, unit, amount) line behind the user's cart, one row per
/// ingredient per recipe. Aggregation happens in `ShoppingList`.
pub async fn list_cart_ingredients(
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<CartLine>, Error> {
    let rows: Vec<CartLine> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, ri.amount
        FROM shopping_cart sc
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn build_shopping_list(
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<ShoppingList, Error> {
    let lines = list_cart_ingredients(user_id, pool).await?;

    Ok(ShoppingList::aggregate(lines))
}

/// Assembles the full read representation of a recipe: author profile,
/// tags, ingredient amounts and the viewer's favorite/cart flags.
pub async fn recipe_view(
    recipe: &Recipe,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, Error> {
    let author = get_user_by_id(recipe.author_id, pool)
        .await?
        .ok_or_else(|| Error::internal("Recipe author no longer exists"))?;
    let author = user_view(&author, viewer, pool).await?;

    let tags = list_recipe_tags(recipe.id, pool).await?;
    let ingredients = list_recipe_ingredients(recipe.id, pool).await?;

    let (is_favorited, is_in_shopping_cart) = match viewer {
        Some(viewer_id) => (
            self::is_favorited(recipe.id, viewer_id, pool).await?,
            self::is_in_shopping_cart(recipe.id, viewer_id, pool).await?,
        ),
        None => (false, false),
    };

    Ok(RecipeView {
        id: recipe.id,
        author,
        name: recipe.name.to_owned(),
        image: recipe.image.to_owned(),
        text: recipe.text.to_owned(),
        cooking_time: recipe.cooking_time,
        tags,
        ingredients,
        is_favorited,
        is_in_shopping_cart,
        pub_date: recipe.pub_date,
    })
}
