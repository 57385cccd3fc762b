// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP Basic authentication.
//!
//! Credentials are compared as plain text; storing them hashed is up to the
//! embedding application.

use super::response::HttpResponse;
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fmt;

pub const DEFAULT_REALM: &str = "ONVIF Server";
pub const MAX_USERNAME_LEN: usize = 64;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_REALM_LEN: usize = 128;
pub const MAX_AUTH_HEADER_LEN: usize = 1024;

const BASIC_PREFIX: &str = "Basic ";

/// Username and password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.username.is_empty() || self.username.len() > MAX_USERNAME_LEN {
            return Err(Error::invalid("username length out of range"));
        }
        if self.username.contains(':') {
            return Err(Error::invalid("username may not contain ':'"));
        }
        if self.password.is_empty() || self.password.len() > MAX_PASSWORD_LEN {
            return Err(Error::invalid("password length out of range"));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Decode an `Authorization: Basic <base64(user:pass)>` header value.
pub fn parse_basic(header: &str) -> Result<Credentials> {
    if header.len() > MAX_AUTH_HEADER_LEN {
        return Err(Error::auth_failed("Authorization header too long"));
    }
    let encoded = header
        .trim()
        .strip_prefix(BASIC_PREFIX)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| Error::auth_failed("not a Basic authorization"))?;
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| Error::auth_failed("malformed Basic credentials"))?;
    let decoded =
        String::from_utf8(decoded).map_err(|_| Error::auth_failed("credentials are not UTF-8"))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| Error::auth_failed("credentials lack ':' separator"))?;
    Ok(Credentials::new(username, password))
}

/// Equality whose running time does not depend on where inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Basic authentication against one configured account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    realm: String,
    credentials: Credentials,
}

impl BasicAuth {
    /// Fails with INVALID on empty or oversized fields, or a realm that
    /// cannot be quoted in a header.
    pub fn new(credentials: Credentials, realm: impl Into<String>) -> Result<Self> {
        let realm = realm.into();
        if realm.is_empty() || realm.len() > MAX_REALM_LEN {
            return Err(Error::invalid("realm length out of range"));
        }
        if realm.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
            return Err(Error::invalid("realm contains quote, backslash or control characters"));
        }
        credentials.validate()?;
        Ok(Self { realm, credentials })
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Value of the `WWW-Authenticate` header.
    pub fn challenge(&self) -> String {
        format!("Basic realm=\"{}\"", self.realm)
    }

    /// Check the request's `Authorization` header. AUTH_FAILED when it is
    /// missing, malformed or does not match.
    pub fn verify(&self, authorization: Option<&str>) -> Result<()> {
        let header = authorization.ok_or_else(|| Error::auth_failed("no Authorization header"))?;
        let offered = parse_basic(header)?;
        let user_ok = constant_time_eq(
            offered.username.as_bytes(),
            self.credentials.username.as_bytes(),
        );
        let pass_ok = constant_time_eq(
            offered.password.as_bytes(),
            self.credentials.password.as_bytes(),
        );
        if user_ok && pass_ok {
            Ok(())
        } else {
            Err(Error::auth_failed(format!(
                "invalid credentials for user '{}'",
                offered.username
            )))
        }
    }

    /// 401 carrying the challenge.
    pub fn unauthorized(&self) -> HttpResponse {
        let body = format!(
            "<html><body><h1>401 Unauthorized</h1><p>Authentication required for realm: {}</p></body></html>",
            self.realm
        );
        let mut resp = HttpResponse::new(401, "text/html", body.into_bytes());
        resp.headers
            .push(("WWW-Authenticate".to_string(), self.challenge()));
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn auth() -> BasicAuth {
        BasicAuth::new(Credentials::new("admin", "s3cret"), DEFAULT_REALM).expect("valid")
    }

    fn header(user_pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(user_pass))
    }

    #[test]
    fn test_parse_basic() {
        let creds = parse_basic(&header("admin:pa:ss")).expect("valid");
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "pa:ss");

        assert!(parse_basic("Bearer abc").is_err());
        assert!(parse_basic("Basic ").is_err());
        assert!(parse_basic("Basic !!!").is_err());
        assert!(parse_basic(&header("no-colon")).is_err());
    }

    #[test]
    fn test_verify() {
        let auth = auth();
        assert!(auth.verify(Some(&header("admin:s3cret"))).is_ok());

        for bad in [None, Some(header("admin:wrong")), Some(header("root:s3cret"))] {
            let err = auth.verify(bad.as_deref()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AuthFailed);
        }
    }

    #[test]
    fn test_unauthorized_response() {
        let resp = auth().unauthorized();
        assert_eq!(resp.status, 401);
        assert_eq!(resp.header("www-authenticate"), Some("Basic realm=\"ONVIF Server\""));
        assert!(String::from_utf8_lossy(&resp.to_bytes()).starts_with("HTTP/1.1 401 Unauthorized\r\n"));
    }

    #[test]
    fn test_construction_rules() {
        let creds = Credentials::new("admin", "pw");
        assert!(BasicAuth::new(creds.clone(), "").is_err());
        assert!(BasicAuth::new(creds.clone(), "bad\"realm").is_err());
        assert!(BasicAuth::new(Credentials::new("", "pw"), "r").is_err());
        assert!(BasicAuth::new(Credentials::new("a:b", "pw"), "r").is_err());
        assert!(BasicAuth::new(Credentials::new("admin", ""), "r").is_err());
        assert!(!format!("{:?}", creds).contains("pw"));
    }
}
