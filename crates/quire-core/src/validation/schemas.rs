//! Per-endpoint schemas.
//!
//! Each schema is built once and shared for the lifetime of the process.

use std::sync::OnceLock;

use serde_json::Value;

use super::{Rule, Schema};

/// Role names accepted in role assignments and invites.
pub const ROLE_NAMES: &[&str] = &["admin", "editor", "author"];

/// Setting keys that may be written through the settings endpoint.
pub const SETTING_KEYS: &[&str] = &[
    "site_title",
    "site_description",
    "registration_open",
    "records_per_page",
];

const LOGIN_PATTERN: &str = r"^[A-Za-z0-9_.\-]+$";
const SLUG_PATTERN: &str = r"^[a-z0-9]+(?:-[a-z0-9]+)*$";
const THEME_NAME_PATTERN: &str = r"^[A-Za-z0-9 _\-]+$";
const URL_PATTERN: &str = r"^https?://\S+$";

fn pattern(source: &str, message: &str) -> Rule {
    Rule::pattern(source, message).expect("built-in schema pattern is a valid regex")
}

fn integer_between(min: i64, max: i64) -> Rule {
    Rule::custom(move |value, field| match value.as_i64() {
        Some(n) if (min..=max).contains(&n) => None,
        _ => Some(format!("{field} must be an integer between {min} and {max}")),
    })
}

fn role_name() -> Rule {
    Rule::custom(|value, field| match value.as_str() {
        Some(r) if ROLE_NAMES.contains(&r) => None,
        _ => Some(format!("{field} must be one of: {}", ROLE_NAMES.join(", "))),
    })
}

fn role_list() -> Rule {
    Rule::custom(|value, field| {
        let Value::Array(items) = value else {
            return Some(format!("{field} must be an array"));
        };
        let unknown: Vec<String> = items
            .iter()
            .filter(|v| !v.as_str().is_some_and(|r| ROLE_NAMES.contains(&r)))
            .map(|v| v.to_string())
            .collect();
        if unknown.is_empty() {
            None
        } else {
            Some(format!("{field} contains unknown roles: {}", unknown.join(", ")))
        }
    })
}

fn login_rules() -> Vec<Rule> {
    vec![
        Rule::Required,
        Rule::MinLength(3),
        Rule::MaxLength(50),
        pattern(
            LOGIN_PATTERN,
            "login may only contain letters, digits, '.', '_' and '-'",
        ),
    ]
}

fn password_rules() -> Vec<Rule> {
    vec![Rule::Required, Rule::MinLength(6), Rule::MaxLength(128)]
}

/// `POST /register`
pub fn register() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| {
        Schema::new()
            .field("login", login_rules())
            .field("password", password_rules())
            .field("email", [Rule::Email, Rule::MaxLength(254)])
            .field("invite_code", [Rule::MaxLength(64)])
    })
}

/// `POST /login`
pub fn login() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| {
        Schema::new()
            .field("login", login_rules())
            .field("password", password_rules())
    })
}

/// `PUT /me`: nested `profile` object.
pub fn profile_update() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| {
        Schema::new()
            .field("display_name", [Rule::MaxLength(80)])
            .field("email", [Rule::Email, Rule::MaxLength(254)])
            .field("profile.bio", [Rule::MaxLength(1000)])
            .field(
                "profile.website",
                [
                    Rule::MaxLength(200),
                    pattern(URL_PATTERN, "profile.website must be an http(s) URL"),
                ],
            )
    })
}

/// `PUT /me/password`
pub fn password_change() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| {
        Schema::new()
            .field("current_password", [Rule::Required])
            .field("new_password", password_rules())
    })
}

/// `PUT /users/:id/roles`
pub fn role_assignment() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| Schema::new().field("roles", [Rule::Required, role_list()]))
}

/// `PUT /users/:id/status`
pub fn user_status() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| Schema::new().field("is_active", [Rule::Required, Rule::Boolean]))
}

fn record_fields(schema: Schema, title_required: bool) -> Schema {
    let mut title = vec![Rule::MaxLength(200)];
    if title_required {
        title.insert(0, Rule::Required);
    }
    schema
        .field("title", title)
        .field(
            "slug",
            [
                Rule::MaxLength(200),
                pattern(
                    SLUG_PATTERN,
                    "slug must be lowercase letters and digits separated by single hyphens",
                ),
            ],
        )
        .field("excerpt", [Rule::MaxLength(500)])
        .field("content", [Rule::MaxLength(100_000)])
        .field("is_published", [Rule::Boolean])
}

/// `POST /records`
pub fn record_create() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| record_fields(Schema::new(), true))
}

/// `PUT /records/:id`
pub fn record_update() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| record_fields(Schema::new(), false))
}

/// `POST /themes`
pub fn theme_create() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| {
        Schema::new()
            .field(
                "name",
                [
                    Rule::Required,
                    Rule::MinLength(2),
                    Rule::MaxLength(50),
                    pattern(
                        THEME_NAME_PATTERN,
                        "name may only contain letters, digits, spaces, '_' and '-'",
                    ),
                ],
            )
            .field("description", [Rule::MaxLength(500)])
    })
}

/// `PUT /settings`
pub fn settings_update() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| {
        Schema::new()
            .field("site_title", [Rule::MaxLength(120)])
            .field("site_description", [Rule::MaxLength(500)])
            .field("registration_open", [Rule::Boolean])
            .field("records_per_page", [integer_between(1, 100)])
    })
}

/// `POST /invites`
pub fn invite_create() -> &'static Schema {
    static S: OnceLock<Schema> = OnceLock::new();
    S.get_or_init(|| {
        Schema::new()
            .field("role", [role_name()])
            .field("expires_in_hours", [integer_between(1, 720)])
    })
}
