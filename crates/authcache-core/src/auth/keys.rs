use std::fmt;
use std::str::FromStr;

/// Signup marker written alongside any update that doesn't name one.
pub const DEFAULT_SIGNUP_TYPE: &str = "Auth_0";

/// The fixed set of keys this crate owns in the host application's item table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthKey {
    CachedEmail,
    AccessToken,
    RefreshToken,
    CachedSignUpType,
}

impl AuthKey {
    pub const ALL: [AuthKey; 4] = [
        AuthKey::CachedEmail,
        AuthKey::AccessToken,
        AuthKey::RefreshToken,
        AuthKey::CachedSignUpType,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuthKey::CachedEmail => "cursorAuth/cachedEmail",
            AuthKey::AccessToken => "cursorAuth/accessToken",
            AuthKey::RefreshToken => "cursorAuth/refreshToken",
            AuthKey::CachedSignUpType => "cursorAuth/cachedSignUpType",
        }
    }

    /// Whether the value under this key is a secret that shouldn't be displayed in full
    pub fn is_secret(self) -> bool {
        matches!(self, AuthKey::AccessToken | AuthKey::RefreshToken)
    }
}

impl fmt::Display for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuthKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("Unknown auth key: {}", s))
    }
}
