use std::collections::HashSet;

use sqlx::{Pool, Postgres};

use crate::{
    error::Error,
    form::TagForm,
    schema::{Tag, Uuid},
};

pub async fn create_tag(form: &TagForm, pool: &Pool<Postgres>) -> Result<Tag, Error> {
    form.validate()?;

    // Unique violations on name, color or slug surface as `AlreadyExists`.
    let tag: Tag = sqlx::query_as(
        "
        INSERT INTO tags (name, color, slug)
        VALUES ($1, $2, $3)
        RETURNING *
    ",
    )
    .bind(&form.name)
    .bind(&form.color)
    .bind(&form.slug)
    .fetch_one(pool)
    .await?;

    Ok(tag)
}

pub async fn get_tag(tag_id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Tag>, Error> {
    let row: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(tag_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let rows: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns the first id from `ids` that has no matching tag row.
pub async fn find_missing_tag(ids: &[Uuid], pool: &Pool<Postgres>) -> Result<Option<Uuid>, Error> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(ids.to_vec())
        .fetch_all(pool)
        .await?;

    let found: HashSet<Uuid> = rows.into_iter().map(|row| row.0).collect();

    Ok(ids.iter().find(|id| !found.contains(id)).copied())
}
