use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Agent profile; `id` is the owning identity's id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub display_name: String,
    pub slug: String,
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Lowercase ASCII slug from a display name, e.g. "María López" -> "mar-a-l-pez".
pub fn slugify(display_name: &str) -> String {
    let mut slug = String::with_capacity(display_name.len());
    let mut last_dash = true;
    for c in display_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("agent");
    }
    slug
}

/// First free slug among `base`, `base-2`, `base-3`, ...
pub fn unique_slug<'a>(base: &str, taken: impl Iterator<Item = &'a str> + Clone) -> String {
    if !taken.clone().any(|s| s == base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.clone().any(|s| s == candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Jane  Doe"), "jane-doe");
        assert_eq!(slugify("  O'Brien, Pat "), "o-brien-pat");
        assert_eq!(slugify("!!!"), "agent");
    }

    #[test]
    fn unique_slug_appends_counter() {
        let taken = ["jane-doe", "jane-doe-2"];
        assert_eq!(unique_slug("jane-doe", taken.iter().copied()), "jane-doe-3");
        assert_eq!(unique_slug("john", taken.iter().copied()), "john");
    }
}
