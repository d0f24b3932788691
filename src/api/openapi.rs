use super::handlers::{auth, health, notes, users};
use axum::middleware;
use utoipa::openapi::{
    security::{ApiKey, ApiKeyValue, SecurityScheme},
    Contact, InfoBuilder, License, OpenApiBuilder, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Public routes are registered directly; notes and users go through
/// [`protected_router`] so the authentication gate wraps exactly those.
/// Routes added outside (like `/` or `OPTIONS /health`) are not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::github::github_login))
        .routes(routes!(auth::github::github_callback))
        .routes(routes!(auth::github::auth_failure))
        .routes(routes!(auth::session::profile))
        .routes(routes!(auth::session::logout))
        .merge(protected_router())
}

fn protected_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(notes::list_notes, notes::create_note))
        .routes(routes!(notes::get_note, notes::update_note, notes::delete_note))
        .routes(routes!(users::list_users, users::create_user))
        .routes(routes!(users::get_user, users::update_user, users::delete_user))
        .route_layer(middleware::from_fn(auth::require_principal))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    let mut openapi = OpenApiBuilder::new().info(info).build();

    let mut notes_tag = Tag::new("notes");
    notes_tag.description = Some("Notes owned by the logged-in user".to_string());

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("User records created by GitHub login".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("GitHub login and sessions".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness and build info".to_string());

    openapi.tags = Some(vec![notes_tag, users_tag, auth_tag, health_tag]);

    // Routes registered later extend these components with their schemas.
    let components = openapi.components.get_or_insert_with(Default::default);
    components.add_security_scheme(
        "session_cookie",
        SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
            auth::SESSION_COOKIE_NAME,
        ))),
    );

    openapi
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    let (name, email) = match primary.split_once('<') {
        Some((name, email)) => (
            optional_str(name),
            optional_str(email.trim_end_matches('>')),
        ),
        None => (optional_str(primary), None),
    };
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
