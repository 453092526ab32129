//! Sign-in for students and administrators, and the session file that keeps
//! the current identity between CLI invocations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use sejong_core::credentials::{verify_admin_code, verify_password};
use sejong_core::domain::student::StudentProfile;
use sejong_core::errors::ApplicationError;
use sejong_db::repositories::ProfileRepository;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Session {
    Student { profile: StudentProfile, signed_in_at: DateTime<Utc> },
    Admin { signed_in_at: DateTime<Utc> },
}

impl Session {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin { .. })
    }

    /// Recorded as the reviewer on admin decisions.
    pub fn actor(&self) -> String {
        match self {
            Self::Student { profile, .. } => profile.id.0.clone(),
            Self::Admin { .. } => "admin".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not write session `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("could not remove session `{path}`: {source}")]
    Remove { path: PathBuf, source: std::io::Error },
    #[error("could not encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file means signed out. A corrupt one is treated the same and
    /// logged, so a damaged file never blocks signing in again.
    pub fn load(&self) -> Option<Session> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(error) => {
                warn!(
                    event_name = "session.load.corrupt",
                    path = %self.path.display(),
                    error = %error,
                    "ignoring unreadable session file"
                );
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let encoded = serde_json::to_string_pretty(session)?;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| SessionError::Write { path: self.path.clone(), source })?;
        }
        fs::write(&self.path, encoded)
            .map_err(|source| SessionError::Write { path: self.path.clone(), source })
    }

    pub fn clear(&self) -> Result<bool, SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SessionError::Remove { path: self.path.clone(), source }),
        }
    }
}

pub struct AuthService {
    profiles: Arc<dyn ProfileRepository>,
    admin_code: SecretString,
}

impl AuthService {
    pub fn new(profiles: Arc<dyn ProfileRepository>, admin_code: SecretString) -> Self {
        Self { profiles, admin_code }
    }

    /// Matches on name and birth date; the password is only checked when the
    /// profile has one set.
    pub async fn student_login(
        &self,
        name: &str,
        birth_date: NaiveDate,
        password: Option<&str>,
    ) -> Result<Session, ApplicationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApplicationError::Unauthorized("name is required".to_string()));
        }
        let candidates = self
            .profiles
            .find_by_name_and_birth_date(name, birth_date)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        let Some(profile) = candidates
            .into_iter()
            .find(|profile| verify_password(profile.password_hash.as_deref(), password))
        else {
            warn!(event_name = "session.student_login.rejected", "no matching student profile");
            return Err(ApplicationError::Unauthorized(
                "no student matches that name, birth date and password".to_string(),
            ));
        };

        info!(
            event_name = "session.student_login.accepted",
            user_id = %profile.id,
            "student signed in"
        );
        Ok(Session::Student { profile, signed_in_at: Utc::now() })
    }

    pub fn admin_login(&self, code: &str) -> Result<Session, ApplicationError> {
        if self.admin_code.expose_secret().is_empty() {
            return Err(ApplicationError::Configuration(
                "admin.access_code is not configured".to_string(),
            ));
        }
        if !verify_admin_code(&self.admin_code, code) {
            warn!(event_name = "session.admin_login.rejected", "admin access code mismatch");
            return Err(ApplicationError::Unauthorized("invalid admin access code".to_string()));
        }
        info!(event_name = "session.admin_login.accepted", "administrator signed in");
        Ok(Session::Admin { signed_in_at: Utc::now() })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use sejong_core::credentials::hash_password;
    use sejong_core::domain::student::{StudentProfile, UserId};
    use sejong_core::errors::ApplicationError;
    use sejong_db::repositories::InMemoryProfileRepository;
    use tempfile::TempDir;

    use super::{AuthService, Session, SessionStore};

    fn birth_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2001, 4, 9).expect("date")
    }

    async fn auth(password_hash: Option<String>) -> AuthService {
        let profiles = Arc::new(InMemoryProfileRepository::default());
        profiles
            .insert(StudentProfile {
                id: UserId("u-1".to_string()),
                name: "김세종".to_string(),
                birth_date: Some(birth_date()),
                field: Some("한국어교육".to_string()),
                sejong_institute: None,
                password_hash,
            })
            .await;
        AuthService::new(profiles, "letmein".to_string().into())
    }

    #[tokio::test]
    async fn student_without_password_signs_in_by_name_and_birth_date() {
        let auth = auth(None).await;
        let session = auth.student_login(" 김세종 ", birth_date(), None).await.expect("login");

        assert!(!session.is_admin());
        assert_eq!(session.actor(), "u-1");
    }

    #[tokio::test]
    async fn stored_password_must_match() {
        let auth = auth(Some(hash_password("pw-1234"))).await;

        let wrong = auth.student_login("김세종", birth_date(), Some("nope")).await;
        assert!(matches!(wrong, Err(ApplicationError::Unauthorized(_))));
        let missing = auth.student_login("김세종", birth_date(), None).await;
        assert!(matches!(missing, Err(ApplicationError::Unauthorized(_))));
        assert!(auth.student_login("김세종", birth_date(), Some("pw-1234")).await.is_ok());
    }

    #[tokio::test]
    async fn admin_code_is_checked() {
        let auth = auth(None).await;

        assert!(matches!(auth.admin_login("wrong"), Err(ApplicationError::Unauthorized(_))));
        assert!(auth.admin_login("letmein").expect("admin").is_admin());
    }

    #[test]
    fn empty_admin_code_is_a_configuration_error() {
        let auth = AuthService::new(
            Arc::new(InMemoryProfileRepository::default()),
            String::new().into(),
        );
        assert!(matches!(auth.admin_login(""), Err(ApplicationError::Configuration(_))));
    }

    #[test]
    fn session_round_trips_and_clears() {
        let dir = TempDir::new().expect("tempdir");
        let store = SessionStore::new(dir.path().join("nested/session.json"));
        assert_eq!(store.load(), None);

        let session = Session::Admin { signed_in_at: chrono::Utc::now() };
        store.save(&session).expect("save");
        assert_eq!(store.load(), Some(session));

        assert!(store.clear().expect("clear"));
        assert!(!store.clear().expect("clear again"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn corrupt_session_reads_as_signed_out() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").expect("write");

        assert_eq!(SessionStore::new(path).load(), None);
    }
}
