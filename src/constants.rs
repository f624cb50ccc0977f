pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const USER_COUNT_PER_PAGE: i64 = 10;
pub const SUBSCRIPTION_COUNT_PER_PAGE: i64 = 10;

pub const MIN_COOKING_TIME: i32 = 1;
pub const MAX_COOKING_TIME: i32 = 32_000;

pub const MIN_INGREDIENT_AMOUNT: i32 = 1;
pub const MAX_INGREDIENT_AMOUNT: i32 = 32_000;

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MAX_EMAIL_LENGTH: usize = 254;

/* letters, digits and @/./+/-/_ */
pub const USERNAME_PATTERN: &str = r"^[\w.@+-]+$";
pub const TAG_SLUG_PATTERN: &str = r"^[-a-zA-Z0-9_]+$";
pub const TAG_COLOR_PATTERN: &str = r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$";

/// Usernames that collide with API routes and can never be registered.
pub const RESERVED_USERNAMES: &[&str] = &["me"];

pub const SHOPPING_LIST_HEADER: &str = "Shopping list\n=============\n\n";
pub const SHOPPING_LIST_FOOTER: &str = "\nGenerated by recipebook\n";
