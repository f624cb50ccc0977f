use std::collections::HashSet;

use sqlx::{Pool, Postgres};

use crate::{
    authentication::cryptography::{hash_password, verify_password},
    authentication::jwt::generate_session_token,
    constants::USER_COUNT_PER_PAGE,
    error::Error,
    form::{ProfileForm, RegisterForm},
    pagination::PageContext,
    schema::{User, UserRow, UserView, Uuid},
};

use super::subscriptions::is_subscribed;

pub async fn get_user_by_id(user_id: Uuid, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_by_username(
    username: &str,
    pool: &Pool<Postgres>,
) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_by_email(email: &str, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Creates a user from a validated registration form. The password is
/// stored as an argon2 hash, never in the clear.
pub async fn register_user(form: &RegisterForm, pool: &Pool<Postgres>) -> Result<User, Error> {
    form.validate()?;

    // Friendly pre-checks; the unique constraints remain the authoritative
    // guard against racing registrations.
    if get_user_by_username(&form.username, pool).await?.is_some() {
        return Err(Error::AlreadyExists(String::from(
            "A user with this username already exists",
        )));
    }
    if get_user_by_email(&form.email, pool).await?.is_some() {
        return Err(Error::AlreadyExists(String::from(
            "A user with this email already exists",
        )));
    }

    let password = hash_password(&form.password)?;

    let user: User = sqlx::query_as(
        "
        INSERT INTO users (username, email, first_name, last_name, password, is_staff, is_superuser)
        VALUES ($1, $2, $3, $4, $5, false, false)
        RETURNING *
    ",
    )
    .bind(&form.username)
    .bind(&form.email)
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(password)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

pub async fn login_user(
    email: &str,
    password: &str,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let user = match get_user_by_email(email, pool).await? {
        Some(user) => user,
        None => return Err(Error::InvalidCredentials),
    };

    if !verify_password(password, &user.password)? {
        return Err(Error::InvalidCredentials);
    }

    generate_session_token(&user)
}

pub async fn update_profile(
    user_id: Uuid,
    form: &ProfileForm,
    pool: &Pool<Postgres>,
) -> Result<User, Error> {
    let user: User = sqlx::query_as(
        "
        UPDATE users SET
        first_name = COALESCE($1, first_name),
        last_name = COALESCE($2, last_name)
        WHERE id = $3
        RETURNING *
    ",
    )
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

pub async fn user_view(
    user: &User,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<UserView, Error> {
    let subscribed = match viewer {
        Some(viewer_id) => is_subscribed(viewer_id, user.id, pool).await?,
        None => false,
    };

    Ok(UserView::new(user, subscribed))
}

pub async fn fetch_users(
    viewer: Option<Uuid>,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserView>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "SELECT u.*, COUNT(*) OVER() AS count FROM users u ORDER BY u.username LIMIT $1 OFFSET $2",
    )
    .bind(USER_COUNT_PER_PAGE)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let subscribed = subscribed_ids(viewer, pool).await?;

    let views: Vec<UserView> = rows
        .into_iter()
        .map(|row| {
            let user = User::from(row);
            let is_subscribed = subscribed.contains(&user.id);
            UserView::new(&user, is_subscribed)
        })
        .collect();

    Ok(PageContext::from_rows(
        views,
        total_count,
        USER_COUNT_PER_PAGE,
        offset,
    ))
}

/// Everyone the viewer is subscribed to, for bulk `is_subscribed` flags.
pub async fn subscribed_ids(
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<HashSet<Uuid>, Error> {
    let viewer_id = match viewer {
        Some(id) => id,
        None => return Ok(HashSet::new()),
    };

    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT subscribed_id FROM subscriptions WHERE user_id = $1")
            .bind(viewer_id)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}
