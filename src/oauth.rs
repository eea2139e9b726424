//! Request signing for the X API.
//!
//! Two schemes are supported: OAuth 2.0 bearer tokens (delegated user tokens
//! or app-only tokens), where the header is the token itself, and OAuth 1.0a
//! HMAC-SHA1 signatures, computed per request from a canonical form of the
//! method, URL and parameters. The token endpoint uses HTTP Basic auth.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha1::Sha1;

use crate::config::{Credentials, SignedCredentials};
use crate::error::{XApiError, XApiResult};

/// `oauth_signature_method` sent with every signed request.
pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
/// `oauth_version` sent with every signed request.
pub const OAUTH_VERSION: &str = "1.0";

/// Builds the Authorization header for OAuth 2.0 bearer authentication.
///
/// # Example
///
/// ```rust
/// use postrank::oauth::build_bearer_header;
///
/// assert_eq!(build_bearer_header("abc"), "Bearer abc");
/// ```
pub fn build_bearer_header(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Builds the HTTP Basic Authorization header used against the token endpoint.
pub fn build_basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let credentials = format!("{}:{}", client_id, client_secret);
    format!("Basic {}", BASE64.encode(credentials))
}

/// Percent-encodes a string with the RFC 3986 unreserved set.
///
/// Only `A-Z`, `a-z`, `0-9`, `-`, `.`, `_` and `~` pass through; every other
/// byte of the UTF-8 encoding, including `!*'()`, becomes `%XX`.
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Generates a request nonce: 16 bytes from the OS RNG, hex encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn unix_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Signs a request with OAuth 1.0a using a fresh nonce and the current time.
///
/// `url` must be the absolute URL without query string; query and form
/// parameters go in `params`. Returns the full header value (`OAuth ...`).
pub fn sign_request(
    method: &str,
    url: &str,
    params: &[(String, String)],
    creds: &SignedCredentials,
) -> XApiResult<String> {
    sign_request_with(
        method,
        url,
        params,
        creds,
        &generate_nonce(),
        unix_timestamp(),
    )
}

/// Signs a request with OAuth 1.0a using the given nonce and timestamp.
///
/// The output is byte-for-byte reproducible for identical inputs.
pub fn sign_request_with(
    method: &str,
    url: &str,
    params: &[(String, String)],
    creds: &SignedCredentials,
    nonce: &str,
    timestamp: u64,
) -> XApiResult<String> {
    let mut all_params: Vec<(String, String)> = vec![
        ("oauth_consumer_key".to_string(), creds.consumer_key.clone()),
        ("oauth_nonce".to_string(), nonce.to_string()),
        (
            "oauth_signature_method".to_string(),
            SIGNATURE_METHOD.to_string(),
        ),
        ("oauth_timestamp".to_string(), timestamp.to_string()),
        ("oauth_token".to_string(), creds.token.clone()),
        ("oauth_version".to_string(), OAUTH_VERSION.to_string()),
    ];
    all_params.extend(params.iter().cloned());

    let base_string = signature_base_string(method, url, &all_params);
    let signing_key = format!(
        "{}&{}",
        percent_encode(&creds.consumer_secret),
        percent_encode(&creds.token_secret)
    );
    let signature = hmac_sha1_base64(&signing_key, &base_string)?;
    all_params.push(("oauth_signature".to_string(), signature));

    let header = encode_sorted(&all_params)
        .into_iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {}", header))
}

/// Builds the Authorization header for `credentials`.
///
/// Delegated credentials produce a bearer header; signed credentials are
/// signed over `method`, `url` and `params`.
pub fn authorization_header(
    credentials: &Credentials,
    method: &str,
    url: &str,
    params: &[(String, String)],
) -> XApiResult<String> {
    match credentials {
        Credentials::Delegated(delegated) => Ok(build_bearer_header(&delegated.access_token)),
        Credentials::Signed(signed) => sign_request(method, url, params, signed),
    }
}

/// Percent-encodes every pair and sorts by encoded key, then encoded value.
fn encode_sorted(params: &[(String, String)]) -> Vec<(String, String)> {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    encoded
}

/// `METHOD&enc(url)&enc(k1=v1&k2=v2...)`
pub(crate) fn signature_base_string(
    method: &str,
    url: &str,
    params: &[(String, String)],
) -> String {
    let param_string = encode_sorted(params)
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

fn hmac_sha1_base64(key: &str, data: &str) -> XApiResult<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|e| XApiError::Signing(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelegatedCredentials;

    // Published OAuth 1.0a signing example for POST statuses/update.
    fn reference_credentials() -> SignedCredentials {
        SignedCredentials {
            consumer_key: "xvz1evFS4wEEPTGEFPHBog".into(),
            consumer_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".into(),
            token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".into(),
            token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".into(),
        }
    }

    fn reference_params() -> Vec<(String, String)> {
        vec![
            (
                "status".to_string(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".to_string(),
            ),
            ("include_entities".to_string(), "true".to_string()),
        ]
    }

    const REFERENCE_URL: &str = "https://api.twitter.com/1.1/statuses/update.json";
    const REFERENCE_NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const REFERENCE_TIMESTAMP: u64 = 1318622958;

    #[test]
    fn test_percent_encode_unreserved_set() {
        assert_eq!(percent_encode("hello world"), "hello%20world");
        assert_eq!(percent_encode("foo=bar&baz"), "foo%3Dbar%26baz");
        assert_eq!(percent_encode("test-value_123.txt~"), "test-value_123.txt~");
        assert_eq!(percent_encode("!*'()"), "%21%2A%27%28%29");
        assert_eq!(percent_encode("a+b/c"), "a%2Bb%2Fc");
        assert_eq!(percent_encode("☃"), "%E2%98%83");
    }

    #[test]
    fn test_generate_nonce() {
        let nonce1 = generate_nonce();
        let nonce2 = generate_nonce();

        assert_ne!(nonce1, nonce2);
        assert_eq!(nonce1.len(), 32);
        assert!(nonce1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_base_string_reference_vector() {
        let mut params = vec![
            ("oauth_consumer_key".to_string(), "xvz1evFS4wEEPTGEFPHBog".to_string()),
            ("oauth_nonce".to_string(), REFERENCE_NONCE.to_string()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), REFERENCE_TIMESTAMP.to_string()),
            (
                "oauth_token".to_string(),
                "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".to_string(),
            ),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        params.extend(reference_params());

        let base = signature_base_string("post", REFERENCE_URL, &params);
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&include_entities%3Dtrue%26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg%26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1318622958%26oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb%26oauth_version%3D1.0%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn test_signature_matches_reference_vector() {
        let header = sign_request_with(
            "POST",
            REFERENCE_URL,
            &reference_params(),
            &reference_credentials(),
            REFERENCE_NONCE,
            REFERENCE_TIMESTAMP,
        )
        .unwrap();

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
    }

    #[test]
    fn test_signature_is_deterministic_and_sorted() {
        let sign = || {
            sign_request_with(
                "POST",
                REFERENCE_URL,
                &reference_params(),
                &reference_credentials(),
                REFERENCE_NONCE,
                REFERENCE_TIMESTAMP,
            )
            .unwrap()
        };
        let header = sign();
        assert_eq!(header, sign());

        let keys: Vec<&str> = header
            .trim_start_matches("OAuth ")
            .split(", ")
            .map(|pair| pair.split('=').next().unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys.len(), 9);
        assert!(header.contains(
            "status=\"Hello%20Ladies%20%2B%20Gentlemen%2C%20a%20signed%20OAuth%20request%21\""
        ));
    }

    #[test]
    fn test_signature_changes_with_nonce() {
        let creds = reference_credentials();
        let a = sign_request_with("GET", REFERENCE_URL, &[], &creds, "n1", 1).unwrap();
        let b = sign_request_with("GET", REFERENCE_URL, &[], &creds, "n2", 1).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_authorization_header_dispatch() {
        let delegated = Credentials::Delegated(DelegatedCredentials::bearer_only("tok"));
        assert_eq!(
            authorization_header(&delegated, "GET", REFERENCE_URL, &[]).unwrap(),
            "Bearer tok"
        );

        let signed = Credentials::Signed(reference_credentials());
        let header = authorization_header(&signed, "GET", REFERENCE_URL, &[]).unwrap();
        assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\""));
    }

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(
            build_basic_auth_header("client", "secret"),
            "Basic Y2xpZW50OnNlY3JldA=="
        );
    }
}
