//! Environment marker validation.
//!
//! Each database carries a one-row marker table saying which environment it
//! belongs to. Before anything is written the engine checks that the source
//! says `production` and the sink says `qa`, so swapped connection strings
//! abort the run instead of overwriting production data.

use tracing::{info, warn};

use crate::core::traits::EnvironmentProbe;
use crate::error::{Result, SyncError};

/// Marker table created in both databases.
pub const MARKER_TABLE: &str = "datamask_environment";

/// Key of the marker row.
pub const MARKER_KEY: &str = "env";

/// Role a database plays in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseRole {
    Source,
    Target,
}

impl DatabaseRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseRole::Source => "source",
            DatabaseRole::Target => "target",
        }
    }
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentStatus {
    /// No marker present; proceeding with a warning.
    Unmarked,
    /// Marker present and matching.
    Match,
}

/// Check a database's marker against the expected environment.
///
/// A mismatch returns [`SyncError::EnvironmentMismatch`], which is fatal for
/// the whole run.
pub async fn validate<P>(probe: &P, role: DatabaseRole, expected: &str) -> Result<EnvironmentStatus>
where
    P: EnvironmentProbe + ?Sized,
{
    match probe.environment_tag().await? {
        None => {
            warn!(
                "{} database has no environment marker (expected '{}'); proceeding",
                role.as_str(),
                expected
            );
            Ok(EnvironmentStatus::Unmarked)
        }
        Some(found) if found.trim().eq_ignore_ascii_case(expected) => {
            info!("{} database environment verified: {}", role.as_str(), found);
            Ok(EnvironmentStatus::Match)
        }
        Some(found) => Err(SyncError::EnvironmentMismatch {
            role: role.as_str().to_string(),
            expected: expected.to_string(),
            found,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(Option<&'static str>);

    #[async_trait]
    impl EnvironmentProbe for Fixed {
        async fn environment_tag(&self) -> Result<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    #[tokio::test]
    async fn test_unmarked_proceeds() {
        let status = validate(&Fixed(None), DatabaseRole::Target, "qa").await.unwrap();
        assert_eq!(status, EnvironmentStatus::Unmarked);
    }

    #[tokio::test]
    async fn test_match() {
        let status = validate(&Fixed(Some("QA")), DatabaseRole::Target, "qa")
            .await
            .unwrap();
        assert_eq!(status, EnvironmentStatus::Match);
    }

    #[tokio::test]
    async fn test_mismatch_is_fatal() {
        let err = validate(&Fixed(Some("production")), DatabaseRole::Target, "qa")
            .await
            .unwrap_err();
        match &err {
            SyncError::EnvironmentMismatch {
                role,
                expected,
                found,
            } => {
                assert_eq!(role, "target");
                assert_eq!(expected, "qa");
                assert_eq!(found, "production");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!err.is_retryable());
    }
}
