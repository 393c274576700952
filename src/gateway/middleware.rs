//! Gateway Middleware
//! Mission: Enforce HTTPS and mTLS transport headers ahead of every handler

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

use super::error::ApiError;

/// Identity headers supplied by the TLS terminator.
#[derive(Debug, Clone)]
pub struct TransportIdentity {
    pub client_identity: String,
    pub cert_fingerprint: String,
}

/// Raw signature headers before timestamp parsing.
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    pub signature: String,
    pub timestamp: i64,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// Reject non-HTTPS requests.
///
/// TLS terminates at the edge proxy; the forwarded proto header is the only
/// record of the original scheme. CORS preflight requests are exempt.
pub fn enforce_https(method: &Method, headers: &HeaderMap) -> Result<(), ApiError> {
    if method == Method::OPTIONS {
        return Ok(());
    }
    let forwarded_proto =
        header_value(headers, "x-forwarded-proto").unwrap_or_else(|| "http".to_string());
    if !forwarded_proto.eq_ignore_ascii_case("https") {
        return Err(ApiError::bad_request("https_required"));
    }
    Ok(())
}

/// Require the transport-supplied identity headers.
pub fn require_transport_identity(headers: &HeaderMap) -> Result<TransportIdentity, ApiError> {
    let client_identity = header_value(headers, "x-client-identity");
    let cert_fingerprint = header_value(headers, "x-client-cert-sha256");
    match (client_identity, cert_fingerprint) {
        (Some(client_identity), Some(cert_fingerprint))
            if !client_identity.is_empty() && !cert_fingerprint.is_empty() =>
        {
            Ok(TransportIdentity {
                client_identity,
                cert_fingerprint,
            })
        }
        _ => Err(ApiError::bad_request("missing_transport_identity")),
    }
}

/// Require mTLS termination to be flagged by the edge proxy.
pub fn require_mtls(headers: &HeaderMap) -> Result<(), ApiError> {
    match header_value(headers, "x-client-mtls") {
        Some(state) if state.eq_ignore_ascii_case("success") => Ok(()),
        _ => Err(ApiError::bad_request("mtls_required")),
    }
}

/// Extract and parse the request signature headers.
///
/// `timestamp_error_code` lets callers keep their historical rejection code
/// for a malformed timestamp header.
pub fn require_signature_headers(
    headers: &HeaderMap,
    timestamp_error_code: &'static str,
) -> Result<SignatureHeaders, ApiError> {
    let signature = header_value(headers, "x-request-signature");
    let timestamp = header_value(headers, "x-request-timestamp");
    let (signature, timestamp) = match (signature, timestamp) {
        (Some(signature), Some(timestamp))
            if !signature.is_empty() && !timestamp.is_empty() =>
        {
            (signature, timestamp)
        }
        _ => return Err(ApiError::bad_request("missing_signature_headers")),
    };
    let timestamp = timestamp
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request(timestamp_error_code))?;
    Ok(SignatureHeaders {
        signature,
        timestamp,
    })
}

/// Middleware that logs HTTP requests with timing information.
///
/// Logs at INFO level for successful requests, WARN level for 5xx.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Skip logging for health checks to reduce noise
    if path == "/health" {
        return next.run(request).await;
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let latency = start.elapsed();
    let status = response.status().as_u16();

    if status >= 500 {
        warn!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency.as_millis(),
            "Request failed (5xx)"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency.as_millis(),
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_https_required_without_forwarded_proto() {
        let headers = HeaderMap::new();
        let error = enforce_https(&Method::POST, &headers).unwrap_err();
        assert_eq!(error.code, "https_required");
    }

    #[test]
    fn test_https_accepts_forwarded_https() {
        let headers = headers_with(&[("x-forwarded-proto", "HTTPS")]);
        assert!(enforce_https(&Method::POST, &headers).is_ok());
    }

    #[test]
    fn test_options_preflight_exempt() {
        let headers = HeaderMap::new();
        assert!(enforce_https(&Method::OPTIONS, &headers).is_ok());
    }

    #[test]
    fn test_transport_identity_required() {
        let headers = headers_with(&[("x-client-identity", "agent-00000001")]);
        let error = require_transport_identity(&headers).unwrap_err();
        assert_eq!(error.code, "missing_transport_identity");

        let headers = headers_with(&[
            ("x-client-identity", "agent-00000001"),
            ("x-client-cert-sha256", "ab12cd34"),
        ]);
        let identity = require_transport_identity(&headers).unwrap();
        assert_eq!(identity.cert_fingerprint, "ab12cd34");
    }

    #[test]
    fn test_mtls_flag_required() {
        let headers = headers_with(&[("x-client-mtls", "attempted")]);
        assert_eq!(require_mtls(&headers).unwrap_err().code, "mtls_required");

        let headers = headers_with(&[("x-client-mtls", "success")]);
        assert!(require_mtls(&headers).is_ok());
    }

    #[test]
    fn test_signature_headers_parse() {
        let headers = headers_with(&[
            ("x-request-signature", "c2lnbmF0dXJl"),
            ("x-request-timestamp", "1700000000"),
        ]);
        let parsed = require_signature_headers(&headers, "invalid_timestamp").unwrap();
        assert_eq!(parsed.timestamp, 1_700_000_000);

        let headers = headers_with(&[("x-request-signature", "c2ln")]);
        let error = require_signature_headers(&headers, "invalid_timestamp").unwrap_err();
        assert_eq!(error.code, "missing_signature_headers");

        let headers = headers_with(&[
            ("x-request-signature", "c2ln"),
            ("x-request-timestamp", "not-a-number"),
        ]);
        let error = require_signature_headers(&headers, "invalid_timestamp").unwrap_err();
        assert_eq!(error.code, "invalid_timestamp");
    }
}
