use std::convert::Infallible;

use serde::Deserialize;
use serde_json::json;
use sqlx::{Pool, Postgres};
use warp::{http::StatusCode, reject::Rejection, reply::Reply, Filter};

use crate::{
    actions::{ingredients, recipes, subscriptions, tags, users},
    authentication::jwt::SessionData,
    authentication::middleware::{with_possible_session, with_session},
    authentication::permissions::{authorize, Policy},
    error::{handle_rejection, Error},
    form::{IngredientForm, LoginForm, ProfileForm, RecipeForm, RegisterForm, TagForm},
    pagination::PageContext,
    schema::{RecipeView, UserView, Uuid},
};

#[derive(Deserialize, Debug)]
struct PageQuery {
    #[serde(default)]
    offset: i64,
}

#[derive(Deserialize, Debug)]
struct RecipeQuery {
    #[serde(default)]
    offset: i64,
    author: Option<Uuid>,
    tag: Option<String>,
}

#[derive(Deserialize, Debug)]
struct NameQuery {
    name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SubscriptionQuery {
    #[serde(default)]
    offset: i64,
    recipes_limit: Option<i64>,
}

fn with_pool(
    pool: Pool<Postgres>,
) -> impl Filter<Extract = (Pool<Postgres>,), Error = Infallible> + Clone {
    warp::any().map(move || pool.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(1024 * 1024 * 4).and(warp::body::json())
}

fn replace_rows<T, U>(page: PageContext<T>, rows: Vec<U>) -> PageContext<U> {
    PageContext {
        rows,
        total_rows: page.total_rows,
        next_offset: page.next_offset,
        prev_offset: page.prev_offset,
        page_list: page.page_list,
        message: page.message,
    }
}

// ---- users ----

async fn register_handler(
    form: RegisterForm,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let user = users::register_user(&form, &pool).await?;
    let view = UserView::new(&user, false);

    Ok(warp::reply::with_status(
        warp::reply::json(&view),
        StatusCode::CREATED,
    ))
}

async fn list_users_handler(
    query: PageQuery,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let viewer = session.map(|s| s.user_id);
    let page = users::fetch_users(viewer, query.offset, &pool).await?;

    Ok(warp::reply::json(&page))
}

async fn current_user_handler(
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let user = users::get_user_by_id(session.user_id, &pool)
        .await?
        .ok_or_else(|| Error::NotFound(String::from("No user exists with specified id")))?;
    let view = users::user_view(&user, Some(session.user_id), &pool).await?;

    Ok(warp::reply::json(&view))
}

async fn get_user_handler(
    user_id: Uuid,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let user = users::get_user_by_id(user_id, &pool)
        .await?
        .ok_or_else(|| Error::NotFound(String::from("No user exists with specified id")))?;
    let view = users::user_view(&user, session.map(|s| s.user_id), &pool).await?;

    Ok(warp::reply::json(&view))
}

async fn update_profile_handler(
    user_id: Uuid,
    session: SessionData,
    form: ProfileForm,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    authorize(Policy::SelfOrAdmin { user_id }, Some(&session), true)?;

    let user = users::update_profile(user_id, &form, &pool).await?;
    let view = users::user_view(&user, Some(session.user_id), &pool).await?;

    Ok(warp::reply::json(&view))
}

// ---- auth ----

async fn login_handler(form: LoginForm, pool: Pool<Postgres>) -> Result<impl Reply, Rejection> {
    let token = users::login_user(&form.email, &form.password, &pool).await?;

    Ok(token_reply(&token))
}

fn token_reply(token: &str) -> warp::reply::Json {
    warp::reply::json(&json!({ "auth_token": token }))
}

async fn logout_handler(_session: SessionData) -> Result<impl Reply, Rejection> {
    // Tokens are stateless; the client discards its copy.
    Ok(warp::reply::with_status(
        warp::reply::reply(),
        StatusCode::NO_CONTENT,
    ))
}

// ---- subscriptions ----

async fn list_subscriptions_handler(
    query: SubscriptionQuery,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let page = subscriptions::fetch_subscriptions(session.user_id, query.offset, &pool).await?;

    let mut views = Vec::with_capacity(page.rows.len());
    for user in page.rows.iter() {
        views
            .push(subscriptions::follow_user_view(user, true, query.recipes_limit, &pool).await?);
    }

    Ok(warp::reply::json(&replace_rows(page, views)))
}

async fn subscribe_handler(
    target_id: Uuid,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let target = subscriptions::subscribe(session.user_id, target_id, &pool).await?;
    let view = subscriptions::follow_user_view(&target, true, None, &pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&view),
        StatusCode::CREATED,
    ))
}

async fn unsubscribe_handler(
    target_id: Uuid,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    subscriptions::unsubscribe(session.user_id, target_id, &pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::reply(),
        StatusCode::NO_CONTENT,
    ))
}

// ---- tags ----

async fn create_tag_handler(
    session: SessionData,
    form: TagForm,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    authorize(Policy::AdminOnly, Some(&session), true)?;

    let tag = tags::create_tag(&form, &pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&tag),
        StatusCode::CREATED,
    ))
}

async fn list_tags_handler(pool: Pool<Postgres>) -> Result<impl Reply, Rejection> {
    let tags = tags::list_tags(&pool).await?;

    Ok(warp::reply::json(&tags))
}

async fn get_tag_handler(tag_id: Uuid, pool: Pool<Postgres>) -> Result<impl Reply, Rejection> {
    let tag = tags::get_tag(tag_id, &pool)
        .await?
        .ok_or_else(|| Error::NotFound(String::from("No tag exists with specified id")))?;

    Ok(warp::reply::json(&tag))
}

// ---- ingredients ----

async fn create_ingredient_handler(
    session: SessionData,
    form: IngredientForm,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    authorize(Policy::AdminOnly, Some(&session), true)?;

    let ingredient = ingredients::create_ingredient(&form, &pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&ingredient),
        StatusCode::CREATED,
    ))
}

async fn list_ingredients_handler(
    query: NameQuery,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let ingredients = ingredients::list_ingredients(query.name, &pool).await?;

    Ok(warp::reply::json(&ingredients))
}

async fn get_ingredient_handler(
    ingredient_id: Uuid,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let ingredient = ingredients::get_ingredient(ingredient_id, &pool)
        .await?
        .ok_or_else(|| Error::NotFound(String::from("No ingredient exists with specified id")))?;

    Ok(warp::reply::json(&ingredient))
}

// ---- recipes ----

async fn recipe_page_views(
    page: PageContext<crate::schema::Recipe>,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeView>, Error> {
    let mut views = Vec::with_capacity(page.rows.len());
    for recipe in page.rows.iter() {
        views.push(recipes::recipe_view(recipe, viewer, pool).await?);
    }

    Ok(replace_rows(page, views))
}

async fn list_recipes_handler(
    query: RecipeQuery,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let viewer = session.map(|s| s.user_id);
    let page = recipes::fetch_recipes(query.author, query.tag, query.offset, &pool).await?;
    let page = recipe_page_views(page, viewer, &pool).await?;

    Ok(warp::reply::json(&page))
}

async fn create_recipe_handler(
    session: SessionData,
    form: RecipeForm,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::create_recipe(session.user_id, &form, &pool).await?;
    let view = recipes::recipe_view(&recipe, Some(session.user_id), &pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&view),
        StatusCode::CREATED,
    ))
}

async fn get_recipe_handler(
    recipe_id: Uuid,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::get_recipe(recipe_id, &pool)
        .await?
        .ok_or_else(|| Error::NotFound(String::from("No recipe exists with specified id")))?;
    let view = recipes::recipe_view(&recipe, session.map(|s| s.user_id), &pool).await?;

    Ok(warp::reply::json(&view))
}

async fn update_recipe_handler(
    recipe_id: Uuid,
    session: SessionData,
    form: RecipeForm,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::get_recipe_mut(recipe_id, &session, &pool).await?;
    let updated = recipes::update_recipe(&recipe, &form, &pool).await?;
    let view = recipes::recipe_view(&updated, Some(session.user_id), &pool).await?;

    Ok(warp::reply::json(&view))
}

async fn delete_recipe_handler(
    recipe_id: Uuid,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::get_recipe_mut(recipe_id, &session, &pool).await?;
    recipes::delete_recipe(recipe.id, &pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::reply(),
        StatusCode::NO_CONTENT,
    ))
}

async fn favorite_handler(
    recipe_id: Uuid,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let short = recipes::add_to_favorites(recipe_id, session.user_id, &pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&short),
        StatusCode::CREATED,
    ))
}

async fn unfavorite_handler(
    recipe_id: Uuid,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    recipes::remove_from_favorites(recipe_id, session.user_id, &pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::reply(),
        StatusCode::NO_CONTENT,
    ))
}

async fn add_to_cart_handler(
    recipe_id: Uuid,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let short = recipes::add_to_cart(recipe_id, session.user_id, &pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::json(&short),
        StatusCode::CREATED,
    ))
}

async fn remove_from_cart_handler(
    recipe_id: Uuid,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    recipes::remove_from_cart(recipe_id, session.user_id, &pool).await?;

    Ok(warp::reply::with_status(
        warp::reply::reply(),
        StatusCode::NO_CONTENT,
    ))
}

async fn download_shopping_cart_handler(
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let list = recipes::build_shopping_list(session.user_id, &pool).await?;
    let body: String = list.into();

    let reply = warp::reply::with_header(body, "content-type", "text/plain; charset=utf-8");
    let reply = warp::reply::with_header(
        reply,
        "content-disposition",
        "attachment; filename=\"shopping_list.txt\"",
    );

    Ok(reply)
}

/// The full route table, without rejection recovery.
pub fn api(
    pool: Pool<Postgres>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(register_handler);

    let list_users = warp::path!("users")
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and(with_possible_session())
        .and(with_pool(pool.clone()))
        .and_then(list_users_handler);

    let current_user = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session())
        .and(with_pool(pool.clone()))
        .and_then(current_user_handler);

    let list_subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(warp::query::<SubscriptionQuery>())
        .and(with_session())
        .and(with_pool(pool.clone()))
        .and_then(list_subscriptions_handler);

    let get_user = warp::path!("users" / Uuid)
        .and(warp::get())
        .and(with_possible_session())
        .and(with_pool(pool.clone()))
        .and_then(get_user_handler);

    let update_profile = warp::path!("users" / Uuid)
        .and(warp::patch())
        .and(with_session())
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(update_profile_handler);

    let subscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::post())
        .and(with_session())
        .and(with_pool(pool.clone()))
        .and_then(subscribe_handler);

    let unsubscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::delete())
        .and(with_session())
        .and(with_pool(pool.clone()))
        .and_then(unsubscribe_handler);

    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(login_handler);

    let logout = warp::path!("auth" / "token" / "logout")
        .and(warp::post())
        .and(with_session())
        .and_then(logout_handler);

    let create_tag = warp::path!("tags")
        .and(warp::post())
        .and(with_session())
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(create_tag_handler);

    let list_tags = warp::path!("tags")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(list_tags_handler);

    let get_tag = warp::path!("tags" / Uuid)
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(get_tag_handler);

    let create_ingredient = warp::path!("ingredients")
        .and(warp::post())
        .and(with_session())
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(create_ingredient_handler);

    let list_ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(warp::query::<NameQuery>())
        .and(with_pool(pool.clone()))
        .and_then(list_ingredients_handler);

    let get_ingredient = warp::path!("ingredients" / Uuid)
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(get_ingredient_handler);

    let list_recipes = warp::path!("recipes")
        .and(warp::get())
        .and(warp::query::<RecipeQuery>())
        .and(with_possible_session())
        .and(with_pool(pool.clone()))
        .and_then(list_recipes_handler);

    let create_recipe = warp::path!("recipes")
        .and(warp::post())
        .and(with_session())
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(create_recipe_handler);

    // Must stay ahead of the `recipes / Uuid` routes in the chain.
    let download_shopping_cart = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session())
        .and(with_pool(pool.clone()))
        .and_then(download_shopping_cart_handler);

    let get_recipe = warp::path!("recipes" / Uuid)
        .and(warp::get())
        .and(with_possible_session())
        .and(with_pool(pool.clone()))
        .and_then(get_recipe_handler);

    let update_recipe = warp::path!("recipes" / Uuid)
        .and(warp::patch())
        .and(with_session())
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(update_recipe_handler);

    let delete_recipe = warp::path!("recipes" / Uuid)
        .and(warp::delete())
        .and(with_session())
        .and(with_pool(pool.clone()))
        .and_then(delete_recipe_handler);

    let favorite = warp::path!("recipes" / Uuid / "favorite")
        .and(warp::post())
        .and(with_session())
        .and(with_pool(pool.clone()))
        .and_then(favorite_handler);

    let unfavorite = warp::path!("recipes" / Uuid / "favorite")
        .and(warp::delete())
        .and(with_session())
        .and(with_pool(pool.clone()))
        .and_then(unfavorite_handler);

    let add_to_cart = warp::path!("recipes" / Uuid / "shopping_cart")
        .and(warp::post())
        .and(with_session())
        .and(with_pool(pool.clone()))
        .and_then(add_to_cart_handler);

    let remove_from_cart = warp::path!("recipes" / Uuid / "shopping_cart")
        .and(warp::delete())
        .and(with_session())
        .and(with_pool(pool))
        .and_then(remove_from_cart_handler);

    current_user
        .or(list_subscriptions)
        .or(register)
        .or(list_users)
        .or(subscribe)
        .or(unsubscribe)
        .or(get_user)
        .or(update_profile)
        .or(login)
        .or(logout)
        .or(create_tag)
        .or(list_tags)
        .or(get_tag)
        .or(create_ingredient)
        .or(list_ingredients)
        .or(get_ingredient)
        .or(download_shopping_cart)
        .or(list_recipes)
        .or(create_recipe)
        .or(get_recipe)
        .or(update_recipe)
        .or(delete_recipe)
        .or(favorite)
        .or(unfavorite)
        .or(add_to_cart)
        .or(remove_from_cart)
}

/// Route table with error recovery attached; ready for `warp::serve`.
pub fn routes(
    pool: Pool<Postgres>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    api(pool).recover(handle_rejection)
}

/// Binds the API on the given port and serves until the process exits.
pub async fn run_server(pool: Pool<Postgres>, port: u16) {
    log::info!("listening on port {port}");
    warp::serve(routes(pool)).run(([0, 0, 0, 0], port)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_replies_ok_with_the_token() {
        let response = token_reply("abc").into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
