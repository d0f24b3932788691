//! Authenticated principal and the authentication gate.
//!
//! Flow Overview: the session resolver (see `session.rs`) runs on every
//! request and, when the session is live, inserts a [`Principal`] into the
//! request extensions. [`require_principal`] is layered on the protected
//! routes only and short-circuits with 401 when no principal was attached, so
//! the protected handler never runs for anonymous callers.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{api::handlers::error_response, store::User};

pub(crate) const LOGIN_REQUIRED: &str = "You must be logged in to perform this action";

/// The user on whose behalf a request is made.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user: User,
}

impl Principal {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

/// Authentication gate for protected routes.
pub async fn require_principal(request: Request, next: Next) -> Response {
    if request.extensions().get::<Principal>().is_none() {
        return error_response(StatusCode::UNAUTHORIZED, LOGIN_REQUIRED);
    }
    next.run(request).await
}
