use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;

/// Upper bound on `title`, in characters. Mirrors the `VARCHAR(100)` column.
pub const TITLE_MAX_CHARS: usize = 100;
/// Upper bound on `description`, in characters. Mirrors the `VARCHAR(300)` column.
pub const DESCRIPTION_MAX_CHARS: usize = 300;
/// Upper bound on `creator`, in characters. Mirrors the `VARCHAR(300)` column.
pub const CREATOR_MAX_CHARS: usize = 300;

// --- Core Application Schemas (Mapped to Database) ---

/// Advertisement
///
/// A classified advertisement row from the `advertisements` table.
/// `id` and `creator` are fixed at creation; only `title`, `description` and
/// the timestamp change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Advertisement {
    pub id: i64,
    pub title: String,
    pub description: String,
    // Stamped on creation and refreshed on every successful update.
    #[ts(type = "string")]
    pub created_or_updated_at: DateTime<Utc>,
    // Username of the author. The only key used for ownership checks.
    pub creator: String,
}

impl Advertisement {
    /// The single-line summary used by the listing endpoint.
    pub fn listing_line(&self) -> String {
        format!(
            "Advertisement #{} \"{}\": {}\n",
            self.id, self.title, self.description
        )
    }
}

impl fmt::Display for Advertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Advertisement #{} \"{}\": {} (by {}, {})",
            self.id,
            self.title,
            self.description,
            self.creator,
            self.created_or_updated_at.to_rfc3339()
        )
    }
}

/// NewAdvertisement
///
/// Internal insert payload. `creator` always comes from the authenticated
/// principal, never from the request body.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAdvertisement {
    pub title: String,
    pub description: String,
    pub creator: String,
}

impl NewAdvertisement {
    /// Checks the required-field and length rules shared by every repository.
    pub fn validate(&self) -> Result<(), String> {
        validate_title(&self.title)?;
        validate_description(&self.description)?;
        if self.creator.is_empty() {
            return Err("creator must not be empty".to_string());
        }
        Ok(())
    }
}

/// AdvertisementChanges
///
/// Partial update. `None` keeps the stored value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdvertisementChanges {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl AdvertisementChanges {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("title is required".to_string());
    }
    if title.contains('\0') {
        return Err("title must not contain NUL characters".to_string());
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(format!("title must be at most {TITLE_MAX_CHARS} characters"));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), String> {
    if description.trim().is_empty() {
        return Err("description is required".to_string());
    }
    if description.contains('\0') {
        return Err("description must not contain NUL characters".to_string());
    }
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(format!(
            "description must be at most {DESCRIPTION_MAX_CHARS} characters"
        ));
    }
    Ok(())
}

// --- Request Payloads (Input Schemas) ---

/// CreateAdvertisementRequest
///
/// Input payload for `POST /create-adv/`. Missing fields deserialize as empty
/// strings so they are reported as validation failures rather than parse errors.
/// Unknown fields (including a client-sent `creator`) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateAdvertisementRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl CreateAdvertisementRequest {
    pub fn into_new(self, creator: String) -> NewAdvertisement {
        NewAdvertisement {
            title: self.title,
            description: self.description,
            creator,
        }
    }
}

/// UpdateAdvertisementRequest
///
/// Partial update payload for `PATCH /advertisements/{id}/update`.
/// An absent, `null` or empty field leaves the stored value untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAdvertisementRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<UpdateAdvertisementRequest> for AdvertisementChanges {
    fn from(req: UpdateAdvertisementRequest) -> Self {
        AdvertisementChanges {
            title: req.title.filter(|t| !t.is_empty()),
            description: req.description.filter(|d| !d.is_empty()),
        }
    }
}
