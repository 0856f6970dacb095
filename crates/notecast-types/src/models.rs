use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Account role. Stored as lowercase text in the `users.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Accepted upload content types.
pub mod mime {
    pub const PNG: &str = "image/png";
    pub const JPEG: &str = "image/jpeg";
    pub const PDF: &str = "application/pdf";

    pub const IMAGES: &[&str] = &[PNG, JPEG];
    pub const NOTE_MEDIA: &[&str] = &[PNG, JPEG, PDF];

    pub fn extension(content_type: &str) -> Option<&'static str> {
        match content_type {
            PNG => Some("png"),
            JPEG => Some("jpg"),
            PDF => Some("pdf"),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<&'static str> {
        match ext {
            "png" => Some(PNG),
            "jpg" | "jpeg" => Some(JPEG),
            "pdf" => Some(PDF),
            _ => None,
        }
    }
}
