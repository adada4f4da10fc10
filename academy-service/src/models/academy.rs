//! Academy model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tenant's gymnastics club.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Academy {
    pub academy_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub slug: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub currency: String,
    pub is_public: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Filter parameters for the public directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryFilter {
    pub city: Option<String>,
    pub query: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl DirectoryFilter {
    /// Case-insensitive match used by the in-memory store.
    pub fn matches(&self, academy: &Academy) -> bool {
        if !academy.is_public {
            return false;
        }
        if let Some(city) = &self.city {
            let same_city = academy
                .city
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(city));
            if !same_city {
                return false;
            }
        }
        if let Some(query) = &self.query {
            let query = query.to_lowercase();
            let in_name = academy.name.to_lowercase().contains(&query);
            let in_description = academy
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&query));
            if !in_name && !in_description {
                return false;
            }
        }
        true
    }
}

/// Lower-case, hyphen separated slug derived from a name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Club Gimnasia  Norte!"), "club-gimnasia-norte");
        assert_eq!(slugify("  --Flip & Twist-- "), "flip-twist");
        assert_eq!(slugify("ÁÉ"), "");
    }
}
