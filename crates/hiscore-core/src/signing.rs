//! SharedKey request signing.
//!
//! The string-to-sign is
//! `VERB\n\nContentType\nDate\nx-ms-date:<date>\nx-ms-version:<version>\nCanonicalizedResource`
//! and the signature is the base64 HMAC-SHA256 of it under the account key.
//! Content-MD5 is always empty.

use std::fmt;

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ConfigError;

type HmacSha256 = Hmac<Sha256>;

pub const SHARED_KEY_SCHEME: &str = "SharedKey";
pub const JSON_CONTENT_TYPE: &str = "application/json";

const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Merge,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Head => "HEAD",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Merge => "MERGE",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    pub fn carries_body(&self) -> bool {
        matches!(self, Verb::Post | Verb::Put | Verb::Merge | Verb::Patch)
    }

    /// Content type as it appears in the string-to-sign: empty for bodiless verbs.
    pub fn signed_content_type(&self) -> &'static str {
        if self.carries_body() {
            JSON_CONTENT_TYPE
        } else {
            ""
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats a timestamp the way the `x-ms-date` header expects it.
pub fn rfc1123(at: DateTime<Utc>) -> String {
    at.format(RFC1123_FORMAT).to_string()
}

pub fn canonical_headers(date: &str, api_version: &str) -> String {
    format!("x-ms-date:{date}\nx-ms-version:{api_version}")
}

/// `resource` is the encoded path-and-query relative to the endpoint and starts with `/`.
pub fn canonical_resource(account: &str, resource: &str) -> String {
    format!("/{account}{resource}")
}

#[derive(Clone, Copy, Debug)]
pub struct StringToSign<'a> {
    pub verb: Verb,
    pub date: &'a str,
    pub api_version: &'a str,
    pub canonical_resource: &'a str,
}

impl fmt::Display for StringToSign<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n\n{}\n{}\n{}\n{}",
            self.verb,
            self.verb.signed_content_type(),
            self.date,
            canonical_headers(self.date, self.api_version),
            self.canonical_resource
        )
    }
}

/// Account secret prepared for HMAC. The raw key never leaves this type.
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
}

impl SigningKey {
    pub fn from_base64(encoded: &str) -> Result<Self, ConfigError> {
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::Missing("account key"));
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(trimmed)
            .map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let mac = HmacSha256::new_from_slice(bytes)
            .map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Base64 HMAC-SHA256 over `string_to_sign`.
    pub fn sign(&self, string_to_sign: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(string_to_sign.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Full `Authorization` header value for `account`.
    pub fn authorization(&self, account: &str, string_to_sign: &StringToSign<'_>) -> String {
        let signature = self.sign(&string_to_sign.to_string());
        format!("{SHARED_KEY_SCHEME} {account}:{signature}")
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const KEY: &str =
        "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
    const DATE: &str = "Tue, 01 Jan 2030 00:00:00 GMT";

    fn sts<'a>(verb: Verb, resource: &'a str) -> StringToSign<'a> {
        StringToSign {
            verb,
            date: DATE,
            api_version: "2019-07-07",
            canonical_resource: resource,
        }
    }

    #[test]
    fn rfc1123_matches_header_format() {
        let at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(rfc1123(at), DATE);
    }

    #[test]
    fn get_signs_with_empty_content_type() {
        let text = sts(Verb::Get, "/devstoreaccount1/highscores()").to_string();
        assert_eq!(
            text,
            "GET\n\n\nTue, 01 Jan 2030 00:00:00 GMT\nx-ms-date:Tue, 01 Jan 2030 00:00:00 GMT\nx-ms-version:2019-07-07\n/devstoreaccount1/highscores()"
        );
    }

    #[test]
    fn post_signs_with_json_content_type() {
        let text = sts(Verb::Post, "/devstoreaccount1/Tables").to_string();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines[0], "POST");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "application/json");
        assert_eq!(lines[3], DATE);
        assert_eq!(lines[6], "/devstoreaccount1/Tables");
    }

    #[test]
    fn fixed_vectors_are_reproducible() {
        let key = SigningKey::from_base64(KEY).unwrap();
        let query = sts(
            Verb::Get,
            "/devstoreaccount1/highscores()?$filter=PartitionKey%20eq%20%27Scores%27&$top=10",
        );
        assert_eq!(
            key.authorization("devstoreaccount1", &query),
            "SharedKey devstoreaccount1:mNAdzazi74TcEBsQSRcckpcWUUXXWcexXRyjuO7X90I="
        );
        let create = sts(Verb::Post, "/devstoreaccount1/Tables");
        assert_eq!(
            key.sign(&create.to_string()),
            "kiSI1padbhQ/a9ZqPazwjhz+c8PWAe8fcdXBAMkr5CI="
        );
        let insert = sts(Verb::Post, "/devstoreaccount1/highscores");
        assert_eq!(
            key.sign(&insert.to_string()),
            "Ru0+l+9UA1a6+rc7Q/1uQnC2rK/JOJjyqsTq1DDf2p8="
        );
        // no hidden state between calls
        assert_eq!(
            key.sign(&insert.to_string()),
            "Ru0+l+9UA1a6+rc7Q/1uQnC2rK/JOJjyqsTq1DDf2p8="
        );
    }

    #[test]
    fn rejects_empty_and_malformed_keys() {
        assert!(matches!(
            SigningKey::from_base64("  "),
            Err(ConfigError::Missing("account key"))
        ));
        assert!(matches!(
            SigningKey::from_base64("not base64!"),
            Err(ConfigError::InvalidKey(_))
        ));
    }

    #[test]
    fn debug_output_redacts_key() {
        let key = SigningKey::from_base64(KEY).unwrap();
        assert_eq!(format!("{key:?}"), "SigningKey(<redacted>)");
    }

    #[test]
    fn only_body_verbs_sign_a_content_type() {
        for verb in [Verb::Post, Verb::Put, Verb::Merge, Verb::Patch] {
            assert_eq!(verb.signed_content_type(), JSON_CONTENT_TYPE, "{verb}");
        }
        for verb in [Verb::Get, Verb::Head, Verb::Delete] {
            assert_eq!(verb.signed_content_type(), "", "{verb}");
        }
    }

    #[test]
    fn canonical_resource_prefixes_account() {
        assert_eq!(canonical_resource("acct", "/Tables"), "/acct/Tables");
    }
}
