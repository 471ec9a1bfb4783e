//! Seed catalog loading from formflow.toml
//!
//! The catalog lists the reference data a fresh installation needs: roles,
//! directorates, entitas, marketing companies and an optional bootstrap admin.
//! `core::seed` inserts whatever is missing on `init-db` and on server start.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire formflow.toml file
#[derive(Debug, Default, Deserialize)]
pub struct Catalog {
    /// Roles to create
    #[serde(default)]
    pub roles: Vec<RoleSeed>,
    /// Directorates to create
    #[serde(default)]
    pub directorates: Vec<DirectorateSeed>,
    /// Entitas to create
    #[serde(default)]
    pub entitas: Vec<EntitasSeed>,
    /// Marketing companies to create
    #[serde(default)]
    pub mkt_companies: Vec<MktCompanySeed>,
    /// Account created when no admin exists yet
    pub admin: Option<AdminSeed>,
}

/// A role entry
#[derive(Debug, Deserialize, Clone)]
pub struct RoleSeed {
    /// Role name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
}

/// A directorate entry
#[derive(Debug, Deserialize, Clone)]
pub struct DirectorateSeed {
    /// Unique code
    pub code: String,
    /// Display name
    pub name: String,
}

/// An entitas entry
#[derive(Debug, Deserialize, Clone)]
pub struct EntitasSeed {
    /// Unique code
    pub code: String,
    /// Display name
    pub name: String,
    /// Code of the parent directorate
    pub directorate: Option<String>,
}

/// A marketing company entry
#[derive(Debug, Deserialize, Clone)]
pub struct MktCompanySeed {
    /// Unique code
    pub code: String,
    /// Display name
    pub name: String,
}

/// The bootstrap administrator
#[derive(Debug, Deserialize, Clone)]
pub struct AdminSeed {
    /// Login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Display name
    #[serde(default = "default_admin_name")]
    pub full_name: String,
    /// Initial password, hashed before storage
    pub password: String,
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

/// Loads the seed catalog from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!(
            "Failed to read seed catalog {}: {e}",
            path.as_ref().display()
        ),
    })?;

    toml::from_str(&contents).map_err(Into::into)
}

/// Loads the catalog if the file exists, otherwise returns an empty catalog.
pub fn load_catalog_if_present<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    if path.as_ref().exists() {
        load_catalog(path)
    } else {
        tracing::warn!(
            "Seed catalog {} not found, skipping reference data",
            path.as_ref().display()
        );
        Ok(Catalog::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_catalog() {
        let toml_str = r#"
            [[roles]]
            name = "admin"
            description = "Full access"

            [[roles]]
            name = "user"

            [[directorates]]
            code = "DIR-OPS"
            name = "Operations"

            [[entitas]]
            code = "ENT-HQ"
            name = "Head Office"
            directorate = "DIR-OPS"

            [[mkt_companies]]
            code = "MKT-A"
            name = "Alpha Marketing"

            [admin]
            username = "admin"
            email = "admin@example.com"
            password = "change-me-now"
        "#;

        let catalog: Catalog = toml::from_str(toml_str).unwrap();
        assert_eq!(catalog.roles.len(), 2);
        assert_eq!(catalog.roles[1].description, None);
        assert_eq!(catalog.entitas[0].directorate.as_deref(), Some("DIR-OPS"));
        assert_eq!(catalog.mkt_companies[0].code, "MKT-A");

        let admin = catalog.admin.unwrap();
        assert_eq!(admin.full_name, "Administrator");
    }

    #[test]
    fn test_empty_catalog() {
        let catalog: Catalog = toml::from_str("").unwrap();
        assert!(catalog.roles.is_empty());
        assert!(catalog.admin.is_none());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let catalog = load_catalog_if_present("does/not/exist.toml").unwrap();
        assert!(catalog.mkt_companies.is_empty());
    }

    #[test]
    fn test_load_catalog_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formflow.toml");
        std::fs::write(&path, "[[roles]]\nname = ").unwrap();
        assert!(matches!(load_catalog(&path), Err(Error::Toml(_))));
    }
}
