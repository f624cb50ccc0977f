use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::Deserialize;

use crate::constants::{
    MAX_COOKING_TIME, MAX_EMAIL_LENGTH, MAX_INGREDIENT_AMOUNT, MAX_NAME_LENGTH,
    MAX_USERNAME_LENGTH, MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT, RESERVED_USERNAMES,
    TAG_COLOR_PATTERN, TAG_SLUG_PATTERN, USERNAME_PATTERN,
};

use super::error::Error;
use super::schema::Uuid;

fn matches_pattern(pattern: &str, value: &str) -> bool {
    Regex::new(pattern)
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

#[derive(Deserialize, Debug, Clone)]
pub struct IngredientAmount {
    pub id: Uuid,
    pub amount: i32,
}

/// Write shape for recipe creation and update. Tags and ingredients are
/// referenced by id; the image arrives as a base64 data URL.
#[derive(Deserialize, Debug, Clone)]
pub struct RecipeForm {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: Option<String>,
    pub tags: Vec<Uuid>,
    pub ingredients: Vec<IngredientAmount>,
}

impl RecipeForm {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() || self.name.len() > MAX_NAME_LENGTH {
            return Err(Error::validation(
                "name",
                format!("Name must be between 1 and {MAX_NAME_LENGTH} characters"),
            ));
        }

        if self.ingredients.is_empty() {
            return Err(Error::validation(
                "ingredients",
                "Recipe must have at least 1 ingredient",
            ));
        }
        let mut seen_ingredients: HashSet<Uuid> = HashSet::new();
        for part in self.ingredients.iter() {
            if !seen_ingredients.insert(part.id) {
                return Err(Error::validation(
                    "ingredients",
                    "Ingredients must not repeat",
                ));
            }
            if part.amount < MIN_INGREDIENT_AMOUNT || part.amount > MAX_INGREDIENT_AMOUNT {
                return Err(Error::validation(
                    "ingredients",
                    format!(
                        "Amount must be between {MIN_INGREDIENT_AMOUNT} and {MAX_INGREDIENT_AMOUNT}"
                    ),
                ));
            }
        }

        if self.tags.is_empty() {
            return Err(Error::validation("tags", "Recipe must have at least 1 tag"));
        }
        let mut seen_tags: HashSet<Uuid> = HashSet::new();
        for tag in self.tags.iter() {
            if !seen_tags.insert(*tag) {
                return Err(Error::validation("tags", "Tags must not repeat"));
            }
        }

        if self.cooking_time < MIN_COOKING_TIME || self.cooking_time > MAX_COOKING_TIME {
            return Err(Error::validation(
                "cooking_time",
                format!("Cooking time must be between {MIN_COOKING_TIME} and {MAX_COOKING_TIME}"),
            ));
        }

        if let Some(image) = &self.image {
            decode_base64_image(image)?;
        }

        Ok(())
    }

    /// Create-time validation: everything `validate` checks, plus the image,
    /// which may only be omitted on update (the stored image is kept).
    pub fn validate_create(&self) -> Result<(), Error> {
        self.validate()?;

        if self.image.is_none() {
            return Err(Error::validation("image", "Image is required"));
        }

        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), Error> {
        if !matches_pattern(USERNAME_PATTERN, &self.username)
            || self.username.len() > MAX_USERNAME_LENGTH
        {
            return Err(Error::validation(
                "username",
                "Invalid character in username",
            ));
        }
        if RESERVED_USERNAMES.contains(&self.username.as_str()) {
            return Err(Error::validation("username", "This username is reserved"));
        }
        if !self.email.contains('@') || self.email.len() > MAX_EMAIL_LENGTH {
            return Err(Error::validation("email", "Invalid email address"));
        }
        if self.password.is_empty() {
            return Err(Error::validation("password", "Password must not be empty"));
        }
        Ok(())
    }
}

/// Partial profile update; absent fields are left untouched.
#[derive(Deserialize, Debug, Clone)]
pub struct ProfileForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TagForm {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl TagForm {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() || self.name.len() > MAX_NAME_LENGTH {
            return Err(Error::validation(
                "name",
                format!("Name must be between 1 and {MAX_NAME_LENGTH} characters"),
            ));
        }
        if !matches_pattern(TAG_COLOR_PATTERN, &self.color) {
            return Err(Error::validation("color", "Color must be a hex value"));
        }
        if !matches_pattern(TAG_SLUG_PATTERN, &self.slug) {
            return Err(Error::validation("slug", "Invalid character in slug"));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct IngredientForm {
    pub name: String,
    pub measurement_unit: String,
}

impl IngredientForm {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() || self.name.len() > MAX_NAME_LENGTH {
            return Err(Error::validation(
                "name",
                format!("Name must be between 1 and {MAX_NAME_LENGTH} characters"),
            ));
        }
        if self.measurement_unit.trim().is_empty() {
            return Err(Error::validation(
                "measurement_unit",
                "Measurement unit must not be empty",
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub extension: String,
}

/// Decodes a `data:image/<ext>;base64,<payload>` data URL. Storage of the
/// decoded bytes is the hosting application's concern.
pub fn decode_base64_image(data: &str) -> Result<ImageUpload, Error> {
    let rest = data
        .strip_prefix("data:image/")
        .ok_or_else(|| Error::validation("image", "Expected a data:image base64 payload"))?;
    let (extension, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| Error::validation("image", "Expected a data:image base64 payload"))?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| Error::validation("image", "Invalid base64 image data"))?;

    Ok(ImageUpload {
        bytes,
        extension: extension.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe_form() -> RecipeForm {
        RecipeForm {
            name: "Pancakes".to_string(),
            text: "Mix and fry".to_string(),
            cooking_time: 20,
            image: None,
            tags: vec![1, 2],
            ingredients: vec![
                IngredientAmount { id: 1, amount: 200 },
                IngredientAmount { id: 2, amount: 2 },
            ],
        }
    }

    fn field_of(err: Error) -> &'static str {
        match err {
            Error::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_recipe_form_passes() {
        assert!(recipe_form().validate().is_ok());
    }

    #[test]
    fn create_requires_an_image() {
        let mut form = recipe_form();
        assert!(form.validate().is_ok());
        assert_eq!(field_of(form.validate_create().unwrap_err()), "image");

        form.image = Some("data:image/png;base64,aGVsbG8=".to_string());
        assert!(form.validate_create().is_ok());
    }

    #[test]
    fn empty_ingredients_are_rejected() {
        let mut form = recipe_form();
        form.ingredients.clear();
        assert_eq!(field_of(form.validate().unwrap_err()), "ingredients");
    }

    #[test]
    fn duplicate_ingredients_are_rejected_regardless_of_other_fields() {
        let mut form = recipe_form();
        form.ingredients = vec![
            IngredientAmount { id: 7, amount: 100 },
            IngredientAmount { id: 7, amount: 50 },
        ];
        assert_eq!(field_of(form.validate().unwrap_err()), "ingredients");

        form.cooking_time = 1;
        form.tags = vec![3];
        assert_eq!(field_of(form.validate().unwrap_err()), "ingredients");
    }

    #[test]
    fn empty_tags_are_rejected() {
        let mut form = recipe_form();
        form.tags.clear();
        assert_eq!(field_of(form.validate().unwrap_err()), "tags");
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let mut form = recipe_form();
        form.tags = vec![4, 4];
        assert_eq!(field_of(form.validate().unwrap_err()), "tags");
    }

    #[test]
    fn cooking_time_must_stay_in_range() {
        let mut form = recipe_form();
        form.cooking_time = 0;
        assert_eq!(field_of(form.validate().unwrap_err()), "cooking_time");

        form.cooking_time = MAX_COOKING_TIME + 1;
        assert_eq!(field_of(form.validate().unwrap_err()), "cooking_time");

        form.cooking_time = MAX_COOKING_TIME;
        assert!(form.validate().is_ok());
    }

    #[test]
    fn ingredient_amount_must_stay_in_range() {
        let mut form = recipe_form();
        form.ingredients[0].amount = 0;
        assert_eq!(field_of(form.validate().unwrap_err()), "ingredients");
    }

    #[test]
    fn username_charset_is_enforced() {
        let mut form = RegisterForm {
            email: "ada@example.com".to_string(),
            username: "ada.lovelace".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password: "engine".to_string(),
        };
        assert!(form.validate().is_ok());

        form.username = "ada lovelace".to_string();
        assert_eq!(field_of(form.validate().unwrap_err()), "username");
    }

    #[test]
    fn reserved_username_is_rejected() {
        let form = RegisterForm {
            email: "me@example.com".to_string(),
            username: "me".to_string(),
            first_name: "M".to_string(),
            last_name: "E".to_string(),
            password: "secret".to_string(),
        };
        assert_eq!(field_of(form.validate().unwrap_err()), "username");
    }

    #[test]
    fn tag_color_must_be_hex() {
        let mut form = TagForm {
            name: "Breakfast".to_string(),
            color: "#E26C2D".to_string(),
            slug: "breakfast".to_string(),
        };
        assert!(form.validate().is_ok());

        form.color = "orange".to_string();
        assert_eq!(field_of(form.validate().unwrap_err()), "color");
    }

    #[test]
    fn tag_slug_must_be_url_safe() {
        let form = TagForm {
            name: "Breakfast".to_string(),
            color: "#fff".to_string(),
            slug: "break fast!".to_string(),
        };
        assert_eq!(field_of(form.validate().unwrap_err()), "slug");
    }

    #[test]
    fn base64_image_round_trip() {
        let upload = decode_base64_image("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(upload.extension, "png");
        assert_eq!(upload.bytes, b"hello");
    }

    #[test]
    fn malformed_image_payload_is_rejected() {
        assert!(decode_base64_image("not-an-image").is_err());
        assert!(decode_base64_image("data:image/png;base64,???").is_err());
    }
}
