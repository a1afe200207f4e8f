use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use uuid::Uuid;

/// Cookie holding the opaque ID of the caller's chat session
pub const SESSION_COOKIE: &str = "balrog_session";

/// Returns the session ID carried by the request, if any.
pub fn existing_session(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|id| !id.is_empty())
}

/// Returns the caller's session ID, minting a new one and adding its
/// cookie to the jar when the request didn't carry one.
pub fn ensure_session(jar: CookieJar) -> (CookieJar, String) {
    if let Some(id) = existing_session(&jar) {
        return (jar, id);
    }

    let id = Uuid::new_v4().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    tracing::debug!("Starting new session {}", id);

    (jar.add(cookie), id)
}
