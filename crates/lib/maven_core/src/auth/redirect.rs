//! Redirect-target allow-listing for cross-domain and post-login navigation.

use url::{Host, Url};

/// Path used whenever a requested target is rejected.
pub const SAFE_DEFAULT: &str = "/";

/// Parse `input` as an absolute http(s) URL whose host is `root_domain` or a
/// subdomain of it. Returns `None` for anything else, including malformed
/// input.
pub fn safe_redirect_url(input: &str, root_domain: &str) -> Option<Url> {
    let target = Url::parse(input).ok()?;
    if !matches!(target.scheme(), "http" | "https") {
        return None;
    }
    let root = root_domain.trim().trim_start_matches('.').to_ascii_lowercase();
    if root.is_empty() {
        return None;
    }
    match target.host()? {
        Host::Domain(host) if host == root || host.ends_with(&format!(".{root}")) => Some(target),
        _ => None,
    }
}

/// Accept only site-relative paths; everything else collapses to `/`.
pub fn safe_next_path(next: Option<&str>) -> String {
    match next {
        Some(path) if is_site_relative(path) => path.to_string(),
        _ => SAFE_DEFAULT.to_string(),
    }
}

fn is_site_relative(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}
