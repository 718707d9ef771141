//! Minimal HTML pages for browser-facing failures.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use maven_core::auth::AuthError;
use tracing::{error, warn};

/// A terminal error shown to the browser with a single way forward.
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub title: &'static str,
    pub message: &'static str,
    pub action_href: String,
    pub action_label: &'static str,
}

impl ErrorPage {
    /// Expired or tampered SSO handshake.
    pub fn login_again() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            title: "Login failed",
            message: "Your login link is invalid or has expired. Please log in again.",
            action_href: "/login".into(),
            action_label: "Log in",
        }
    }

    /// Failure that only an operator can fix.
    pub fn unavailable() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            title: "Login unavailable",
            message: "Login is temporarily unavailable. Please try again later.",
            action_href: "/".into(),
            action_label: "Back to home",
        }
    }

    /// Map a flow failure onto a page, logging what the page does not show.
    pub fn from_auth_error(e: &AuthError) -> Self {
        match e {
            AuthError::Configuration(_) | AuthError::DbError(_) | AuthError::Internal(_) => {
                error!("browser flow failed: {e}");
                Self::unavailable()
            }
            _ => {
                warn!("browser flow rejected: {e}");
                Self::login_again()
            }
        }
    }
}

impl IntoResponse for ErrorPage {
    fn into_response(self) -> Response {
        let body = format!(
            "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
             <body>\n<main>\n<h1>{title}</h1>\n<p>{message}</p>\n<a href=\"{href}\">{label}</a>\n</main>\n</body>\n</html>\n",
            title = escape_html(self.title),
            message = escape_html(self.message),
            href = escape_html(&self.action_href),
            label = escape_html(self.action_label),
        );
        (self.status, Html(body)).into_response()
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<a href=\"x\">&'"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn token_errors_ask_for_login() {
        let page = ErrorPage::from_auth_error(&AuthError::TokenInvalid("expired".into()));
        assert_eq!(page.status, StatusCode::UNAUTHORIZED);
        let page = ErrorPage::from_auth_error(&AuthError::Configuration("missing".into()));
        assert_eq!(page.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
