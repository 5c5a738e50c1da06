//! Resume and page tokens.
//!
//! Resume tokens are `base64url(data) + "." + base64url(hmac)` where
//! `data = "<virtual path>:<offset>"` and the MAC is HMAC-SHA256 under the
//! server secret. They are tamper-evident, not encrypted, and stateless.
//! Both halves use the padded URL-safe alphabet so tokens minted by earlier
//! deployments under the same secret keep validating.
//!
//! Page tokens are `base64url(start index)`. They are not signed: a forged
//! page token can only select a different slice of a listing the caller may
//! already read.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{FsError, FsResult};

type HmacSha256 = Hmac<Sha256>;

/// Decoded contents of a valid resume token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub virtual_path: String,
    pub offset: i64,
}

/// Mints and verifies resume tokens.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("secret", &"<redacted>").finish()
    }
}

impl TokenSigner {
    /// Create a signer keyed with `secret`.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    /// Create a token for resuming `virtual_path` at `offset`.
    pub fn create_resume_token(&self, virtual_path: &str, offset: i64) -> String {
        let data = format!("{virtual_path}:{offset}");
        let mut mac = self.mac();
        mac.update(data.as_bytes());
        let signature = mac.finalize().into_bytes();
        format!("{}.{}", URL_SAFE.encode(data), URL_SAFE.encode(signature))
    }

    /// Verify and decode a resume token.
    ///
    /// Every failure (format, encoding, signature, parse) yields the same
    /// [`FsError::InvalidResume`]. The signature check is constant-time.
    pub fn validate_resume_token(&self, token: &str) -> FsResult<ResumePoint> {
        let (data_part, sig_part) = token.split_once('.').ok_or(FsError::InvalidResume)?;
        if sig_part.contains('.') {
            return Err(FsError::InvalidResume);
        }

        let data = URL_SAFE.decode(data_part).map_err(|_| FsError::InvalidResume)?;
        let signature = URL_SAFE.decode(sig_part).map_err(|_| FsError::InvalidResume)?;

        let mut mac = self.mac();
        mac.update(&data);
        mac.verify_slice(&signature)
            .map_err(|_| FsError::InvalidResume)?;

        let data = String::from_utf8(data).map_err(|_| FsError::InvalidResume)?;
        let (virtual_path, offset) = data.rsplit_once(':').ok_or(FsError::InvalidResume)?;
        let offset: i64 = offset.parse().map_err(|_| FsError::InvalidResume)?;

        Ok(ResumePoint {
            virtual_path: virtual_path.to_string(),
            offset,
        })
    }
}

/// Encode a listing start index.
pub fn encode_page_token(start: usize) -> String {
    URL_SAFE.encode(start.to_string())
}

/// Decode a listing start index. An empty token means the first page.
pub fn decode_page_token(token: &str) -> FsResult<usize> {
    if token.is_empty() {
        return Ok(0);
    }
    let raw = URL_SAFE.decode(token).map_err(|_| FsError::InvalidPageToken)?;
    let text = std::str::from_utf8(&raw).map_err(|_| FsError::InvalidPageToken)?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FsError::InvalidPageToken);
    }
    text.parse().map_err(|_| FsError::InvalidPageToken)
}
