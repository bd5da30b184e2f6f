use axum::Router;

use crate::state::AppState;

pub mod handlers;

/// Hyphen-case slug of a display name.
///
/// Lowercases, turns every run of characters outside `[a-z0-9]` into one `-`
/// and trims `-` from both ends. Non-ASCII letters are not folded, so they act
/// as separators. A name with no ASCII letters or digits yields `""`.
pub fn derive_organization_name(display_name: &str) -> String {
    let lowered = display_name.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_separator = false;
    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else {
            pending_separator = true;
        }
    }

    slug
}

pub fn router() -> Router<AppState> {
    handlers::organization_routes()
}
