use crate::models::Academy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAcademyRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    /// Derived from the name when omitted.
    #[validate(length(min = 1, max = 100))]
    pub slug: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    #[validate(email(message = "Invalid contact email"))]
    pub contact_email: Option<String>,
    pub currency: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAcademyRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub slug: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    #[validate(email(message = "Invalid contact email"))]
    pub contact_email: Option<String>,
    pub currency: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DirectoryParams {
    pub city: Option<String>,
    pub q: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Public view of an academy.
#[derive(Debug, Serialize)]
pub struct DirectoryAcademy {
    pub academy_id: Uuid,
    pub name: String,
    pub slug: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub contact_email: Option<String>,
}

impl From<Academy> for DirectoryAcademy {
    fn from(academy: Academy) -> Self {
        Self {
            academy_id: academy.academy_id,
            name: academy.name,
            slug: academy.slug,
            city: academy.city,
            country: academy.country,
            description: academy.description,
            contact_email: academy.contact_email,
        }
    }
}
