//! Request signing.
//!
//! Every request carries `base64(HMAC(HMAC(method) || HMAC(path) || HMAC(body)))`
//! in the `X-Ycm-Hmac` header, keyed with the secret the editor put in the
//! options file. Responses are signed with `HMAC(body)` the same way.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use semd_core::{Error, Result};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature, matched case-insensitively.
pub const HMAC_HEADER: &str = "X-Ycm-Hmac";

fn keyed(secret: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret).map_err(|_| Error::Unauthorized)
}

/// `HMAC_SHA256(secret, content)`.
pub fn create_hmac(content: &[u8], secret: &[u8]) -> Result<Vec<u8>> {
    let mut mac = keyed(secret)?;
    mac.update(content);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn request_hmac_input(method: &[u8], path: &[u8], body: &[u8], secret: &[u8]) -> Result<Vec<u8>> {
    let mut joined = create_hmac(method, secret)?;
    joined.extend(create_hmac(path, secret)?);
    joined.extend(create_hmac(body, secret)?);
    Ok(joined)
}

/// Signature a client must send for a request.
pub fn create_request_hmac(method: &[u8], path: &[u8], body: &[u8], secret: &[u8]) -> Result<Vec<u8>> {
    create_hmac(&request_hmac_input(method, path, body, secret)?, secret)
}

/// Checks host and signature of incoming requests.
pub struct AuthGate {
    secret: Vec<u8>,
}

impl AuthGate {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Verifies a request. Every failure is the same `Unauthorized`.
    pub fn verify(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        host: Option<&str>,
        signature: Option<&str>,
    ) -> Result<()> {
        if !host_allowed(host) {
            log::info!("Dropping request with bad Host header");
            return Err(Error::Unauthorized);
        }
        let Some(signature) = signature else {
            log::info!("Dropping request with no HMAC");
            return Err(Error::Unauthorized);
        };
        let provided = STANDARD
            .decode(signature.trim())
            .map_err(|_| Error::Unauthorized)?;

        let mut mac = keyed(&self.secret)?;
        mac.update(&request_hmac_input(
            method.as_bytes(),
            path.as_bytes(),
            body,
            &self.secret,
        )?);
        mac.verify_slice(&provided).map_err(|_| {
            log::info!("Dropping request with bad HMAC");
            Error::Unauthorized
        })
    }

    /// Header value signing a response body.
    pub fn sign(&self, body: &[u8]) -> Result<String> {
        Ok(STANDARD.encode(create_hmac(body, &self.secret)?))
    }

    /// Header value a client would send for this request.
    pub fn sign_request(&self, method: &str, path: &str, body: &[u8]) -> Result<String> {
        Ok(STANDARD.encode(create_request_hmac(
            method.as_bytes(),
            path.as_bytes(),
            body,
            &self.secret,
        )?))
    }
}

/// Accepts `127.0.0.1` and `localhost`, with or without a port. A missing
/// header is accepted for callers that bypass HTTP.
fn host_allowed(host: Option<&str>) -> bool {
    let Some(host) = host else {
        return true;
    };
    let name = host.rsplit_once(':').map_or(host, |(name, port)| {
        if port.chars().all(|c| c.is_ascii_digit()) {
            name
        } else {
            host
        }
    });
    name == "127.0.0.1" || name.eq_ignore_ascii_case("localhost")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef";

    fn gate() -> AuthGate {
        AuthGate::new(SECRET.to_vec())
    }

    #[test]
    fn test_valid_signature_passes() {
        let gate = gate();
        let signature = gate.sign_request("POST", "/completions", b"{}").unwrap();
        assert!(gate
            .verify("POST", "/completions", b"{}", Some("127.0.0.1:1234"), Some(&signature))
            .is_ok());
    }

    #[test]
    fn test_tampering_is_rejected() {
        let gate = gate();
        let signature = gate.sign_request("POST", "/completions", b"{}").unwrap();
        for (method, path, body) in [
            ("GET", "/completions", &b"{}"[..]),
            ("POST", "/debug_info", &b"{}"[..]),
            ("POST", "/completions", &b"{ }"[..]),
        ] {
            assert!(matches!(
                gate.verify(method, path, body, None, Some(&signature)),
                Err(Error::Unauthorized)
            ));
        }
    }

    #[test]
    fn test_missing_or_garbage_header_is_rejected() {
        let gate = gate();
        assert!(gate.verify("GET", "/healthy", b"", None, None).is_err());
        assert!(gate.verify("GET", "/healthy", b"", None, Some("not base64!")).is_err());
    }

    #[test]
    fn test_host_header() {
        assert!(host_allowed(Some("localhost")));
        assert!(host_allowed(Some("127.0.0.1:8080")));
        assert!(host_allowed(None));
        assert!(!host_allowed(Some("evil.example.com")));
        assert!(!host_allowed(Some("192.168.0.1:80")));

        let gate = gate();
        let signature = gate.sign_request("GET", "/healthy", b"").unwrap();
        assert!(matches!(
            gate.verify("GET", "/healthy", b"", Some("example.com"), Some(&signature)),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn test_request_hmac_matches_nested_construction() {
        let inner = [
            create_hmac(b"POST", SECRET).unwrap(),
            create_hmac(b"/x", SECRET).unwrap(),
            create_hmac(b"body", SECRET).unwrap(),
        ]
        .concat();
        assert_eq!(
            create_request_hmac(b"POST", b"/x", b"body", SECRET).unwrap(),
            create_hmac(&inner, SECRET).unwrap()
        );
    }
}
