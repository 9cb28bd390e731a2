//! OCI request signing and config-file profiles.
//!
//! OCI authenticates API calls with HTTP signatures. Each request carries a
//! `date` header and an `authorization` header holding an RSA-SHA256
//! signature over the date, the request target, and the host:
//!
//! ```text
//! date: Thu, 05 Jan 2014 21:31:40 GMT
//! (request-target): get /20210201/queues/ocid1.queue.../messages?limit=1
//! host: cell-1.queue.messaging.us-phoenix-1.oci.oraclecloud.com
//! ```
//!
//! The signing key and its key ID (`tenancy/user/fingerprint`) come from a
//! profile in the OCI config file (`~/.oci/config` by default).

use crate::error::AuthError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use config::{Config, File, FileFormat, Map, Value};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::path::{Path, PathBuf};
use url::{Position, Url};

#[cfg(test)]
#[path = "oci_auth_tests.rs"]
mod tests;

/// Headers covered by the signature, in signing order
const SIGNED_HEADERS: &str = "date (request-target) host";

const REQUIRED_PROFILE_KEYS: [&str; 4] = ["user", "fingerprint", "key_file", "tenancy"];

// ============================================================================
// Request Signing
// ============================================================================

/// Headers a signer adds to an outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub date: String,
    pub authorization: String,
}

/// Interface for signing OCI API requests.
///
/// [`ApiKeySigner`] covers user principals. Other identities, such as
/// instance principals, are supplied by implementing this trait.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// Produce the authentication headers for `method url`
    async fn sign(&self, method: &str, url: &Url) -> Result<SignedHeaders, AuthError>;
}

/// RSA-SHA256 signer for API-key (user principal) authentication
pub struct ApiKeySigner {
    key_id: String,
    signing_key: SigningKey<Sha256>,
}

impl ApiKeySigner {
    /// Create a signer from key ID parts and a parsed private key
    pub fn new(tenancy: &str, user: &str, fingerprint: &str, private_key: RsaPrivateKey) -> Self {
        Self {
            key_id: format!("{}/{}/{}", tenancy, user, fingerprint),
            signing_key: SigningKey::<Sha256>::new(private_key),
        }
    }

    /// Create a signer for a profile, reading its key file
    pub fn from_profile(profile: &OciProfile) -> Result<Self, AuthError> {
        let path = profile.key_file.display().to_string();

        if profile.has_pass_phrase {
            return Err(AuthError::PrivateKey {
                path,
                message: "encrypted private keys are not supported".to_string(),
            });
        }

        let pem = std::fs::read_to_string(&profile.key_file).map_err(|e| AuthError::PrivateKey {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let private_key = parse_private_key(&pem)
            .map_err(|message| AuthError::PrivateKey { path, message })?;

        Ok(Self::new(
            &profile.tenancy,
            &profile.user,
            &profile.fingerprint,
            private_key,
        ))
    }

    /// Key ID sent in the `keyId` signature parameter
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign a request as if it were sent at `now`
    pub fn sign_at(
        &self,
        method: &str,
        url: &Url,
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders, AuthError> {
        let date = format_http_date(now);
        let signing_string = signing_string(method, url, &date);

        let signature = self
            .signing_key
            .try_sign(signing_string.as_bytes())
            .map_err(|e| AuthError::Signing {
                message: e.to_string(),
            })?;

        let authorization = format!(
            "Signature version=\"1\",keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            self.key_id,
            SIGNED_HEADERS,
            STANDARD.encode(signature.to_bytes())
        );

        Ok(SignedHeaders {
            date,
            authorization,
        })
    }
}

impl std::fmt::Debug for ApiKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeySigner")
            .field("key_id", &self.key_id)
            .field("signing_key", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl RequestSigner for ApiKeySigner {
    async fn sign(&self, method: &str, url: &Url) -> Result<SignedHeaders, AuthError> {
        self.sign_at(method, url, Utc::now())
    }
}

/// RFC 7231 date as OCI expects it in the `date` header
pub(crate) fn format_http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// String covered by the signature for `method url` sent at `date`
pub(crate) fn signing_string(method: &str, url: &Url, date: &str) -> String {
    let target = &url[Position::BeforePath..Position::AfterQuery];
    let host = &url[Position::BeforeHost..Position::AfterPort];

    format!(
        "date: {}\n(request-target): {} {}\nhost: {}",
        date,
        method.to_lowercase(),
        target,
        host
    )
}

/// Parse a PEM private key in PKCS#8 or PKCS#1 form
fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, String> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| format!("not a PKCS#8 or PKCS#1 RSA private key: {}", e))
}

// ============================================================================
// Config File Profiles
// ============================================================================

/// One profile of an OCI config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciProfile {
    pub name: String,
    pub user: String,
    pub fingerprint: String,
    pub key_file: PathBuf,
    pub tenancy: String,
    pub region: Option<String>,
    /// The key file is encrypted with a pass phrase
    pub has_pass_phrase: bool,
}

impl OciProfile {
    /// Location of the OCI config file when none is configured
    pub fn default_config_file() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".oci").join("config"))
    }

    /// Load `profile` from the INI config file at `path`.
    ///
    /// Keys missing from a named profile are taken from `[DEFAULT]`.
    pub fn load(path: &Path, profile: &str) -> Result<Self, AuthError> {
        let display_path = path.display().to_string();

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini))
            .build()
            .map_err(|e| AuthError::ConfigFile {
                path: display_path.clone(),
                message: e.to_string(),
            })?;

        let section = profile_section(&settings, profile).ok_or_else(|| {
            AuthError::ProfileNotFound {
                profile: profile.to_string(),
                path: display_path.clone(),
            }
        })?;
        let defaults = if profile.eq_ignore_ascii_case("DEFAULT") {
            Map::new()
        } else {
            profile_section(&settings, "DEFAULT").unwrap_or_default()
        };

        let lookup = |key: &str| -> Option<String> {
            section
                .get(key)
                .or_else(|| defaults.get(key))
                .and_then(|value| value.clone().into_string().ok())
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let missing: Vec<String> = REQUIRED_PROFILE_KEYS
            .iter()
            .filter(|key| lookup(**key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AuthError::IncompleteProfile {
                profile: profile.to_string(),
                keys: missing,
            });
        }

        Ok(Self {
            name: profile.to_string(),
            user: lookup("user").unwrap_or_default(),
            fingerprint: lookup("fingerprint").unwrap_or_default(),
            key_file: expand_home(&lookup("key_file").unwrap_or_default()),
            tenancy: lookup("tenancy").unwrap_or_default(),
            region: lookup("region"),
            has_pass_phrase: lookup("pass_phrase").is_some(),
        })
    }

    /// Replace the profile region, e.g. with the region a source is configured for
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

fn profile_section(settings: &Config, profile: &str) -> Option<Map<String, Value>> {
    settings
        .get_table(profile)
        .or_else(|_| settings.get_table(&profile.to_lowercase()))
        .ok()
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    }
}
