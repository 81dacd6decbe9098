//! AuthResolver - outbound `Authorization` header per target service

use crate::error::{Error, Result};
use crate::model::{AuthType, Service};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

const BEARER_PREFIX: &str = "Bearer ";

/// Header value for a call to `service`, or `None` when no header is sent.
///
/// `forwarded` is the caller's inbound Authorization value; only `bearer`
/// services use it.
pub fn resolve_authorization(service: &Service, forwarded: Option<&str>) -> Result<Option<String>> {
    match service.auth_type() {
        AuthType::None => Ok(None),
        AuthType::Basic => {
            let (username, password) = service
                .auth
                .as_ref()
                .map(|auth| (auth.username.as_str(), auth.password.as_str()))
                .unwrap_or_default();
            if username.is_empty() || password.is_empty() {
                return Err(Error::config(format!(
                    "basic auth for {} requires both username and password",
                    service.base_url
                )));
            }
            Ok(Some(basic_header(username, password)))
        }
        AuthType::Bearer => {
            let header = forwarded.and_then(normalize_bearer).ok_or_else(|| {
                Error::missing_credential(format!(
                    "{} expects a bearer token but the request carried none",
                    service.base_url
                ))
            })?;
            Ok(Some(header))
        }
    }
}

/// `Basic base64(username:password)`
pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Ensure exactly one `Bearer ` prefix. `None` when no token remains.
pub fn normalize_bearer(token: &str) -> Option<String> {
    let mut rest = token.trim();
    while rest
        .get(..BEARER_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(BEARER_PREFIX))
    {
        rest = rest[BEARER_PREFIX.len()..].trim_start();
    }
    (!rest.is_empty()).then(|| format!("{BEARER_PREFIX}{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceAuth;

    fn service(auth_type: AuthType, username: &str, password: &str) -> Service {
        Service {
            version: "0.11.13".into(),
            base_url: "http://cb-tumblebug:1323/tumblebug".into(),
            auth: Some(ServiceAuth {
                auth_type,
                username: username.into(),
                password: password.into(),
            }),
        }
    }

    #[test]
    fn test_none_sends_no_header() {
        let svc = Service {
            auth: None,
            ..service(AuthType::None, "", "")
        };
        assert_eq!(resolve_authorization(&svc, Some("Bearer abc")).unwrap(), None);
    }

    #[test]
    fn test_basic() {
        let svc = service(AuthType::Basic, "default", "default");
        assert_eq!(
            resolve_authorization(&svc, None).unwrap().as_deref(),
            Some("Basic ZGVmYXVsdDpkZWZhdWx0")
        );
    }

    #[test]
    fn test_basic_missing_credentials() {
        let svc = service(AuthType::Basic, "default", "");
        assert!(matches!(resolve_authorization(&svc, None), Err(Error::Config(_))));
        let svc = service(AuthType::Basic, "", "secret");
        assert!(matches!(resolve_authorization(&svc, None), Err(Error::Config(_))));
    }

    #[test]
    fn test_bearer_forwarding() {
        let svc = service(AuthType::Bearer, "", "");
        assert_eq!(
            resolve_authorization(&svc, Some("abc.def")).unwrap().as_deref(),
            Some("Bearer abc.def")
        );
        assert_eq!(
            resolve_authorization(&svc, Some("Bearer abc.def")).unwrap().as_deref(),
            Some("Bearer abc.def")
        );
    }

    #[test]
    fn test_bearer_missing_token() {
        let svc = service(AuthType::Bearer, "", "");
        assert!(matches!(
            resolve_authorization(&svc, None),
            Err(Error::MissingCredential(_))
        ));
        assert!(matches!(
            resolve_authorization(&svc, Some("  ")),
            Err(Error::MissingCredential(_))
        ));
        assert!(matches!(
            resolve_authorization(&svc, Some("Bearer ")),
            Err(Error::MissingCredential(_))
        ));
    }

    #[test]
    fn test_normalize_bearer_is_idempotent() {
        assert_eq!(normalize_bearer("tok").as_deref(), Some("Bearer tok"));
        assert_eq!(normalize_bearer("Bearer tok").as_deref(), Some("Bearer tok"));
        assert_eq!(normalize_bearer("Bearer Bearer tok").as_deref(), Some("Bearer tok"));
        assert_eq!(normalize_bearer("bearer tok").as_deref(), Some("Bearer tok"));
        assert_eq!(normalize_bearer(""), None);
    }
}
