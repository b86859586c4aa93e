//! User directory and credentials
//!
//! Registration, login, profile edits and two-factor enrollment. Passwords
//! are stored as Argon2id PHC strings only.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, PasswordHash,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::registry::CurrencyRegistry;
use crate::core::traits::UserRepository;
use crate::core::two_factor;
use crate::types::{Balances, TwoFactor, User, UserId, WalletError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_SAVE_ATTEMPTS: usize = 3;

/// Registration input
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub telegram: Option<String>,
    pub phone: Option<String>,
}

/// Editable profile fields; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub telegram: Option<String>,
    pub phone: Option<String>,
}

/// Hash a password with Argon2id
pub fn hash_password(password: &str) -> Result<String, WalletError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| WalletError::storage(format!("password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), WalletError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        })
        && !email.chars().any(char::is_whitespace);
    if !valid {
        return Err(WalletError::invalid_field("email", "not a valid address"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), WalletError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(WalletError::invalid_field(
            "password",
            &format!("must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn now_unix() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

#[derive(Clone)]
pub struct UserDirectory {
    repo: Arc<dyn UserRepository>,
    currencies: CurrencyRegistry,
}

impl UserDirectory {
    pub fn new(repo: Arc<dyn UserRepository>, currencies: CurrencyRegistry) -> Self {
        UserDirectory { repo, currencies }
    }

    /// Create an account
    ///
    /// Balances start at zero for every active currency.
    ///
    /// # Errors
    ///
    /// * `MissingField` / `InvalidField` - blank name, malformed email, short
    ///   password
    /// * `Duplicate` - the email is taken (case-insensitive); nothing is stored
    pub fn register(&self, input: NewUser) -> Result<User, WalletError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(WalletError::missing_field("name"));
        }
        let email = normalize_email(&input.email);
        if email.is_empty() {
            return Err(WalletError::missing_field("email"));
        }
        validate_email(&email)?;
        validate_password(&input.password)?;

        if self.repo.find_user_by_email(&email)?.is_some() {
            return Err(WalletError::duplicate("User", &email));
        }

        let mut balances = Balances::new();
        for currency in self.currencies.active()? {
            balances.touch(&currency.code);
        }

        let user = self.repo.insert_user(User {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash: hash_password(&input.password)?,
            telegram: non_blank(input.telegram),
            phone: non_blank(input.phone),
            balances,
            two_factor: None,
            created_at: Utc::now(),
            version: 0,
        })?;

        info!(user = %user.id, "user registered");
        Ok(user)
    }

    /// Check credentials and, when enrolled, the two-factor code
    ///
    /// # Errors
    ///
    /// * `InvalidCredentials` - unknown email or wrong password
    /// * `TwoFactorRequired` - enrolled and no code supplied
    /// * `InvalidTwoFactorCode` - the code does not verify
    pub fn authenticate(
        &self,
        email: &str,
        password: &str,
        code: Option<&str>,
    ) -> Result<User, WalletError> {
        let user = self
            .repo
            .find_user_by_email(&normalize_email(email))?
            .ok_or(WalletError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            debug!(user = %user.id, "password mismatch");
            return Err(WalletError::InvalidCredentials);
        }

        if let Some(tf) = user.two_factor.as_ref().filter(|tf| tf.enabled) {
            let code = code.ok_or(WalletError::TwoFactorRequired)?;
            if !two_factor::verify(&tf.secret, code, now_unix())? {
                return Err(WalletError::InvalidTwoFactorCode);
            }
        }

        Ok(user)
    }

    pub fn get(&self, id: UserId) -> Result<User, WalletError> {
        self.repo
            .find_user(id)?
            .ok_or_else(|| WalletError::not_found("User", id))
    }

    pub fn find_by_email(&self, email: &str) -> Result<User, WalletError> {
        let email = normalize_email(email);
        self.repo
            .find_user_by_email(&email)?
            .ok_or_else(|| WalletError::not_found("User", email))
    }

    pub fn list(&self) -> Result<Vec<User>, WalletError> {
        self.repo.list_users()
    }

    pub fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User, WalletError> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(WalletError::missing_field("name"));
        }
        self.modify(id, |user| {
            if let Some(name) = &update.name {
                user.name = name.trim().to_string();
            }
            if update.telegram.is_some() {
                user.telegram = non_blank(update.telegram.clone());
            }
            if update.phone.is_some() {
                user.phone = non_blank(update.phone.clone());
            }
            Ok(())
        })
    }

    pub fn change_password(
        &self,
        id: UserId,
        current: &str,
        new_password: &str,
    ) -> Result<User, WalletError> {
        validate_password(new_password)?;
        let user = self.get(id)?;
        if !verify_password(current, &user.password_hash) {
            return Err(WalletError::InvalidCredentials);
        }

        let hash = hash_password(new_password)?;
        let saved = self.modify(id, |user| {
            user.password_hash = hash.clone();
            Ok(())
        })?;
        info!(user = %id, "password changed");
        Ok(saved)
    }

    /// Enroll a secret after proving possession with a valid code
    pub fn enable_two_factor(
        &self,
        id: UserId,
        secret: &str,
        code: &str,
    ) -> Result<User, WalletError> {
        if !two_factor::verify(secret, code, now_unix())? {
            return Err(WalletError::InvalidTwoFactorCode);
        }
        let saved = self.modify(id, |user| {
            user.two_factor = Some(TwoFactor {
                secret: secret.trim().to_string(),
                enabled: true,
            });
            Ok(())
        })?;
        info!(user = %id, "two-factor enabled");
        Ok(saved)
    }

    /// Turn two-factor off; requires a current code
    pub fn disable_two_factor(&self, id: UserId, code: &str) -> Result<User, WalletError> {
        let user = self.get(id)?;
        let Some(tf) = user.two_factor.filter(|tf| tf.enabled) else {
            return Err(WalletError::disabled("Two-factor authentication"));
        };
        if !two_factor::verify(&tf.secret, code, now_unix())? {
            return Err(WalletError::InvalidTwoFactorCode);
        }

        let saved = self.modify(id, |user| {
            user.two_factor = None;
            Ok(())
        })?;
        info!(user = %id, "two-factor disabled");
        Ok(saved)
    }

    fn modify<F>(&self, id: UserId, change: F) -> Result<User, WalletError>
    where
        F: Fn(&mut User) -> Result<(), WalletError>,
    {
        let mut attempt = 1;
        loop {
            let mut user = self.get(id)?;
            change(&mut user)?;
            match self.repo.save_user(&user) {
                Ok(saved) => return Ok(saved),
                Err(WalletError::ConcurrentModification { .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::CurrencyCode;
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn directory() -> UserDirectory {
        let store = Arc::new(MemoryStore::new());
        let registry = CurrencyRegistry::new(store.clone());
        registry.seed_defaults().unwrap();
        UserDirectory::new(store, registry)
    }

    fn input(email: &str) -> NewUser {
        NewUser {
            name: "Omar".to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
            telegram: Some("@omar".to_string()),
            phone: None,
        }
    }

    #[test]
    fn test_register_hashes_and_normalizes() {
        let user = directory().register(input("  Omar@Example.COM ")).unwrap();

        assert_eq!(user.email, "omar@example.com");
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert_ne!(user.password_hash, "correct horse");
        assert_eq!(
            user.balances.get(&CurrencyCode::parse("syp").unwrap()),
            Decimal::ZERO
        );
        assert_eq!(user.balances.iter().count(), 2);
    }

    #[test]
    fn test_duplicate_email_case_insensitive() {
        let directory = directory();
        directory.register(input("omar@example.com")).unwrap();

        let result = directory.register(input("OMAR@example.com"));

        assert!(matches!(result, Err(WalletError::Duplicate { .. })));
        assert_eq!(directory.list().unwrap().len(), 1);
    }

    #[rstest]
    #[case::no_at("omar.example.com")]
    #[case::no_domain_dot("omar@example")]
    #[case::space("om ar@example.com")]
    fn test_invalid_email(#[case] email: &str) {
        assert!(matches!(
            directory().register(input(email)),
            Err(WalletError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_short_password() {
        let mut new_user = input("omar@example.com");
        new_user.password = "short".to_string();
        assert!(matches!(
            directory().register(new_user),
            Err(WalletError::InvalidField { .. })
        ));
    }

    #[rstest]
    #[case::wrong_password("omar@example.com", "wrong password")]
    #[case::unknown_email("nobody@example.com", "correct horse")]
    fn test_authenticate_failures(#[case] email: &str, #[case] password: &str) {
        let directory = directory();
        directory.register(input("omar@example.com")).unwrap();
        assert_eq!(
            directory.authenticate(email, password, None),
            Err(WalletError::InvalidCredentials)
        );
    }

    #[test]
    fn test_two_factor_flow() {
        let directory = directory();
        let user = directory.register(input("omar@example.com")).unwrap();
        let secret = two_factor::generate_secret();

        assert_eq!(
            directory.enable_two_factor(user.id, &secret, "000000x"),
            Err(WalletError::InvalidTwoFactorCode)
        );

        let code = two_factor::code_at(&secret, now_unix()).unwrap();
        directory.enable_two_factor(user.id, &secret, &code).unwrap();

        assert_eq!(
            directory.authenticate("omar@example.com", "correct horse", None),
            Err(WalletError::TwoFactorRequired)
        );
        let code = two_factor::code_at(&secret, now_unix()).unwrap();
        assert!(directory
            .authenticate("omar@example.com", "correct horse", Some(&code))
            .is_ok());

        directory.disable_two_factor(user.id, &code).unwrap();
        assert!(directory
            .authenticate("omar@example.com", "correct horse", None)
            .is_ok());
    }

    #[test]
    fn test_change_password() {
        let directory = directory();
        let user = directory.register(input("omar@example.com")).unwrap();

        assert_eq!(
            directory.change_password(user.id, "not it at all", "brand new secret"),
            Err(WalletError::InvalidCredentials)
        );
        directory
            .change_password(user.id, "correct horse", "brand new secret")
            .unwrap();

        assert!(directory
            .authenticate("omar@example.com", "brand new secret", None)
            .is_ok());
    }

    #[test]
    fn test_update_profile_bumps_version() {
        let directory = directory();
        let user = directory.register(input("omar@example.com")).unwrap();

        let updated = directory
            .update_profile(
                user.id,
                ProfileUpdate {
                    name: Some("Omar K".to_string()),
                    telegram: Some(String::new()),
                    phone: Some("+963 999".to_string()),
                },
            )
            .unwrap();

        assert_eq!(updated.name, "Omar K");
        assert_eq!(updated.telegram, None);
        assert_eq!(updated.phone.as_deref(), Some("+963 999"));
        assert_eq!(updated.version, user.version + 1);
    }
}
