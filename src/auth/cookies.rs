use std::time::Duration;

use axum::http::{header, HeaderMap};

use super::tokens::TokenPair;

pub const ACCESS_COOKIE_NAME: &str = "accessToken";
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Flags every session cookie is written with.
#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
}

impl CookieOptions {
    pub fn new(secure: bool) -> Self {
        Self {
            http_only: true,
            secure,
        }
    }

    fn render(&self, name: &str, value: &str, max_age: u64) -> String {
        let mut cookie = format!("{name}={value}; Path=/; SameSite=Strict; Max-Age={max_age}");
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` values that install both tokens.
    pub fn set_session(
        &self,
        pair: &TokenPair,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> [String; 2] {
        [
            self.render(ACCESS_COOKIE_NAME, &pair.access_token, access_ttl.as_secs()),
            self.render(REFRESH_COOKIE_NAME, &pair.refresh_token, refresh_ttl.as_secs()),
        ]
    }

    /// `Set-Cookie` values that expire both tokens.
    pub fn clear_session(&self) -> [String; 2] {
        [
            self.render(ACCESS_COOKIE_NAME, "", 0),
            self.render(REFRESH_COOKIE_NAME, "", 0),
        ]
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_header
        .split(';')
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
