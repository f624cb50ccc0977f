use sqlx::{Pool, Postgres};

use crate::{
    constants::SUBSCRIPTION_COUNT_PER_PAGE,
    error::Error,
    pagination::PageContext,
    schema::{FollowUserView, Recipe, ShortRecipe, User, UserRow, Uuid},
};

use super::users::get_user_by_id;

pub async fn is_subscribed(
    user_id: Uuid,
    target_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE user_id = $1 AND subscribed_id = $2)",
    )
    .bind(user_id)
    .bind(target_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

pub async fn subscribe(user_id: Uuid, target_id: Uuid, pool: &Pool<Postgres>) -> Result<User, Error> {
    if user_id == target_id {
        return Err(Error::SelfSubscription);
    }

    let target = get_user_by_id(target_id, pool)
        .await?
        .ok_or_else(|| Error::NotFound(String::from("No user exists with specified id")))?;

    let result = sqlx::query(
        "INSERT INTO subscriptions (user_id, subscribed_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(target_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::AlreadyExists(String::from(
            "You are already subscribed to this user",
        )));
    }

    Ok(target)
}

pub async fn unsubscribe(
    user_id: Uuid,
    target_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let result =
        sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND subscribed_id = $2")
            .bind(user_id)
            .bind(target_id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(String::from(
            "You are not subscribed to this user",
        )));
    }

    Ok(())
}

/// Authors the user follows, ordered by username, one page at a time.
pub async fn fetch_subscriptions(
    user_id: Uuid,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<User>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.*, COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.subscribed_id
        WHERE s.user_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(SUBSCRIPTION_COUNT_PER_PAGE)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let users: Vec<User> = rows.into_iter().map(User::from).collect();

    Ok(PageContext::from_rows(
        users,
        total_count,
        SUBSCRIPTION_COUNT_PER_PAGE,
        offset,
    ))
}

/// Builds the subscription representation of an author: profile fields plus
/// their recipes, optionally capped with `recipes_limit`, and the full count.
pub async fn follow_user_view(
    user: &User,
    is_subscribed: bool,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<FollowUserView, Error> {
    let recipes: Vec<Recipe> = match recipes_limit {
        Some(limit) => {
            sqlx::query_as(
                "SELECT * FROM recipes WHERE author_id = $1 ORDER BY pub_date DESC LIMIT $2",
            )
            .bind(user.id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM recipes WHERE author_id = $1 ORDER BY pub_date DESC")
                .bind(user.id)
                .fetch_all(pool)
                .await?
        }
    };

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(user.id)
        .fetch_one(pool)
        .await?;

    Ok(FollowUserView {
        id: user.id,
        username: user.username.to_owned(),
        email: user.email.to_owned(),
        first_name: user.first_name.to_owned(),
        last_name: user.last_name.to_owned(),
        is_subscribed,
        recipes: recipes.iter().map(ShortRecipe::from).collect(),
        recipes_count: count.0,
    })
}
