use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration as CookieDuration;
use uuid::Uuid;

pub const CLIENT_COOKIE: &str = "essay_client";
pub const CLIENT_TTL_DAYS: i64 = 365;

/// Opaque id history is partitioned by. A missing or unreadable cookie gets a
/// fresh id; the cookie is re-issued either way to extend its lifetime.
pub fn client_identity(jar: CookieJar) -> (CookieJar, Uuid) {
    let client_id = jar
        .get(CLIENT_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut cookie = Cookie::new(CLIENT_COOKIE, client_id.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(CLIENT_TTL_DAYS));

    (jar.add(cookie), client_id)
}
