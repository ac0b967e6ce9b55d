use crate::domain::models::AuthTokens;
use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

pub trait CredentialStore: Send + Sync {
    fn save_tokens(&self, tokens: &AuthTokens) -> Result<(), InfraError>;
    fn load_tokens(&self) -> Result<Option<AuthTokens>, InfraError>;
    fn clear_tokens(&self) -> Result<(), InfraError>;
}

/// Half of the token pair; each half is its own keyring entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenSlot {
    Access,
    Refresh,
}

impl TokenSlot {
    const ALL: [TokenSlot; 2] = [TokenSlot::Access, TokenSlot::Refresh];

    fn account(self, user: &str) -> String {
        match self {
            TokenSlot::Access => format!("{user}.access-token"),
            TokenSlot::Refresh => format!("{user}.refresh-token"),
        }
    }
}

/// Keeps the session tokens in the platform keyring. A session with no
/// refresh token has no refresh entry.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    user: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            user: user.into(),
        }
    }

    fn entry(&self, slot: TokenSlot) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &slot.account(&self.user))
            .map_err(|error| InfraError::Credential(format!("{slot:?} token entry: {error}")))
    }

    fn read(&self, slot: TokenSlot) -> Result<Option<String>, InfraError> {
        match self.entry(slot)?.get_password() {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(InfraError::Credential(format!("reading {slot:?} token: {error}"))),
        }
    }

    fn write(&self, slot: TokenSlot, value: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return self.delete(slot);
        }
        self.entry(slot)?
            .set_password(value)
            .map_err(|error| InfraError::Credential(format!("writing {slot:?} token: {error}")))
    }

    fn delete(&self, slot: TokenSlot) -> Result<(), InfraError> {
        match self.entry(slot)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(format!("deleting {slot:?} token: {error}"))),
        }
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new("dayplan", "session")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_tokens(&self, tokens: &AuthTokens) -> Result<(), InfraError> {
        tokens.validate().map_err(InfraError::Credential)?;
        self.write(TokenSlot::Refresh, &tokens.refresh_token)?;
        self.write(TokenSlot::Access, &tokens.access_token)
    }

    /// No access token means no session, whatever the refresh entry holds.
    fn load_tokens(&self) -> Result<Option<AuthTokens>, InfraError> {
        let Some(access_token) = self.read(TokenSlot::Access)? else {
            return Ok(None);
        };
        Ok(Some(AuthTokens {
            access_token,
            refresh_token: self.read(TokenSlot::Refresh)?.unwrap_or_default(),
        }))
    }

    /// Removes every entry, reporting the first failure after trying all.
    fn clear_tokens(&self) -> Result<(), InfraError> {
        TokenSlot::ALL
            .into_iter()
            .map(|slot| self.delete(slot))
            .fold(Ok(()), |first, next| first.and(next))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    tokens: Mutex<Option<AuthTokens>>,
}

impl InMemoryCredentialStore {
    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Option<AuthTokens>>, InfraError> {
        self.tokens
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_tokens(&self, tokens: &AuthTokens) -> Result<(), InfraError> {
        tokens.validate().map_err(InfraError::Credential)?;
        *self.guard()? = Some(tokens.clone());
        Ok(())
    }

    fn load_tokens(&self) -> Result<Option<AuthTokens>, InfraError> {
        Ok(self.guard()?.clone())
    }

    fn clear_tokens(&self) -> Result<(), InfraError> {
        *self.guard()? = None;
        Ok(())
    }
}
