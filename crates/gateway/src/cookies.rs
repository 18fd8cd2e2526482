//! Cookie names, jar access and HMAC cookie signing.
//!
//! Signed cookies travel with a companion cookie `<name>_signature` holding
//! the lower-case hex HMAC-SHA256 of the cookie name immediately followed by
//! its value, keyed with the process-wide signing key.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice};
use sha2::Sha256;

/// Session identifier cookie.
pub const SESSION_ID: &str = "session_id";

/// Role name cookie.
pub const USERNAME: &str = "username";

/// Open transaction identifier cookie.
pub const TRANSACTION_ID: &str = "transaction_id";

/// Open transaction flag cookie.
pub const TRANSACTION_ACTIVE: &str = "transaction_active";

/// Double-submit anti-forgery cookie.
pub const CSRF_TOKEN: &str = "csrf_token";

/// Suffix naming a companion signature cookie.
pub const SIGNATURE_SUFFIX: &str = "_signature";

type HmacSha256 = Hmac<Sha256>;

/// Parse the request's `Cookie` headers.
#[must_use]
pub fn jar(headers: &HeaderMap) -> CookieJar {
    CookieJar::from_headers(headers)
}

/// Value of cookie `name`, ignoring empty values.
#[must_use]
pub fn value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(Cookie::value)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Name of the companion signature cookie for `name`.
#[must_use]
pub fn signature_name(name: &str) -> String {
    format!("{name}{SIGNATURE_SUFFIX}")
}

/// Signs and verifies cookie values. The key is never logged.
pub struct CookieSigner {
    key: SecretSlice<u8>,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CookieSigner {
    /// Create a signer for `key`.
    #[must_use]
    pub fn new(key: &[u8]) -> Self {
        Self {
            key: SecretSlice::from(key.to_vec()),
        }
    }

    fn mac(&self, name: &str, value: &str) -> Option<HmacSha256> {
        // HMAC accepts keys of any length; this only fails for zero-sized
        // key types, never for byte slices.
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret()).ok()?;
        mac.update(name.as_bytes());
        mac.update(value.as_bytes());
        Some(mac)
    }

    /// Hex signature for cookie `name` carrying `value`.
    #[must_use]
    pub fn sign(&self, name: &str, value: &str) -> String {
        self.mac(name, value)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default()
    }

    /// Constant-time check of a hex signature.
    #[must_use]
    pub fn verify(&self, name: &str, value: &str, signature_hex: &str) -> bool {
        let Ok(signature) = hex::decode(signature_hex.trim()) else {
            return false;
        };
        self.mac(name, value)
            .is_some_and(|mac| mac.verify_slice(&signature).is_ok())
    }

    /// Build a cookie and its companion signature cookie.
    #[must_use]
    pub fn signed_cookie(&self, name: &str, value: &str) -> (Cookie<'static>, Cookie<'static>) {
        let signature = self.sign(name, value);
        let mut cookie = Cookie::new(name.to_string(), value.to_string());
        let mut companion = Cookie::new(signature_name(name), signature);
        for c in [&mut cookie, &mut companion] {
            c.set_path("/");
            c.set_http_only(true);
        }
        (cookie, companion)
    }
}
