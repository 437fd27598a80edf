use karto_errors::{AppError, AppResult};

/// Whatever the caller could pull out of the inbound request - at most one
/// of these ends up mattering, but both are accepted so classification can
/// pick the right one rather than forcing the caller to guess first.
#[derive(Debug, Clone, Default)]
pub struct CredentialInput {
    pub bearer_token: Option<String>,
    pub api_key_secret: Option<String>,
    pub tenant_header: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Credential {
    Token(String),
    ApiKey(String),
}

/// Stage 1 - routes to token or API-key validation, or fails fast.
///
/// A bearer token is recognized by shape (three dot-separated segments,
/// matching a compact JWT), not by calling out to the verifier - that way
/// an API key that happens to arrive in the `Authorization` header still
/// gets a chance at `api_key_secret` classification.
pub fn classify(input: &CredentialInput, api_key_tag: &str) -> AppResult<Credential> {
    if let Some(token) = &input.bearer_token {
        if looks_like_jwt(token) {
            return Ok(Credential::Token(token.clone()));
        }
    }

    if let Some(secret) = &input.api_key_secret {
        if secret.starts_with(api_key_tag) {
            return Ok(Credential::ApiKey(secret.clone()));
        }
    }

    Err(AppError::unauthenticated("no recognized credential in request"))
}

fn looks_like_jwt(token: &str) -> bool {
    token.split('.').count() == 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_with_three_segments_classifies_as_token() {
        let input = CredentialInput {
            bearer_token: Some("aaa.bbb.ccc".to_string()),
            ..Default::default()
        };
        assert!(matches!(classify(&input, "karto_").unwrap(), Credential::Token(_)));
    }

    #[test]
    fn tagged_secret_classifies_as_api_key() {
        let input = CredentialInput {
            api_key_secret: Some("karto_abcdef123456".to_string()),
            ..Default::default()
        };
        assert!(matches!(classify(&input, "karto_").unwrap(), Credential::ApiKey(_)));
    }

    #[test]
    fn untagged_secret_is_rejected() {
        let input = CredentialInput {
            api_key_secret: Some("notthetag_abcdef".to_string()),
            ..Default::default()
        };
        assert!(classify(&input, "karto_").is_err());
    }

    #[test]
    fn neither_credential_present_fails_unauthenticated() {
        assert!(classify(&CredentialInput::default(), "karto_").is_err());
    }
}
