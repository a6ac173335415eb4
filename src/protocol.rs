//! Protocol URL parsing
//!
//! Turns `outlookbridge://<ignored>?email=..&subject=..&body=..&attachments=..`
//! into a [`MailDraftRequest`].
//!
//! The whole URL is percent-decoded once before it is parsed, then the query
//! is read with form semantics (`+` is a space, the last duplicate key wins).
//! Launchers differ in how much of the URL they encode, and decoding up front
//! gives the same request for all of them.

use crate::compose::MailDraftRequest;
use crate::config::BridgeConfig;
use crate::{BridgeError, Result};
use reqwest::Url;
use std::collections::HashMap;

/// Parses protocol URLs for one scheme
#[derive(Debug, Clone)]
pub struct ProtocolParser {
    scheme: String,
    default_subject: String,
}

impl ProtocolParser {
    pub fn new(scheme: impl Into<String>, default_subject: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            default_subject: default_subject.into(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.scheme.clone(), config.default_subject.clone())
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Parse and validate one protocol URL
    pub fn parse(&self, raw: &str) -> Result<MailDraftRequest> {
        let decoded = urlencoding::decode(raw.trim())
            .map_err(|e| BridgeError::ProtocolParse(format!("URL is not valid UTF-8: {}", e)))?;
        let url = Url::parse(&decoded)
            .map_err(|e| BridgeError::ProtocolParse(format!("{}: {}", e, decoded)))?;

        if !url.scheme().eq_ignore_ascii_case(&self.scheme) {
            return Err(BridgeError::ProtocolParse(format!(
                "expected a {}:// URL, got {}://",
                self.scheme,
                url.scheme()
            )));
        }

        let mut params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        let to = params.remove("email").unwrap_or_default();
        let subject = params
            .remove("subject")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.default_subject.clone());
        let body = params.remove("body").unwrap_or_default();
        let attachments = params
            .remove("attachments")
            .map(|list| split_attachments(&list))
            .unwrap_or_default();

        let request = MailDraftRequest::new(to, subject, body, attachments)?;
        tracing::debug!(
            to = %request.to(),
            subject = %request.subject(),
            attachments = request.attachments().len(),
            "Parsed protocol URL"
        );
        Ok(request)
    }
}

/// Comma-separated attachment list, trimmed, blanks dropped
fn split_attachments(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(String::from)
        .collect()
}

/// First argument that is a protocol URL for `prefix` (e.g. `outlookbridge://`)
pub fn find_protocol_arg<S: AsRef<str>>(args: &[S], prefix: &str) -> Option<String> {
    args.iter()
        .map(AsRef::as_ref)
        .find(|arg| arg.starts_with(prefix))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_SCHEME, DEFAULT_SUBJECT};

    fn parser() -> ProtocolParser {
        ProtocolParser::new(DEFAULT_SCHEME, DEFAULT_SUBJECT)
    }

    #[test]
    fn test_parse_full_url() {
        let request = parser()
            .parse("outlookbridge://x?email=a%40b.com&subject=Hi&body=Hello&attachments=https://ex.com/f.png")
            .unwrap();
        assert_eq!(request.to(), "a@b.com");
        assert_eq!(request.subject(), "Hi");
        assert_eq!(request.body(), "Hello");
        assert_eq!(request.attachments(), ["https://ex.com/f.png"]);
    }

    #[test]
    fn test_defaults() {
        let request = parser().parse("outlookbridge://open?email=a@b.com").unwrap();
        assert_eq!(request.subject(), DEFAULT_SUBJECT);
        assert_eq!(request.body(), "");
        assert!(request.attachments().is_empty());

        let request = parser()
            .parse("outlookbridge://open?email=a@b.com&subject=&attachments=")
            .unwrap();
        assert_eq!(request.subject(), DEFAULT_SUBJECT);
        assert!(request.attachments().is_empty());
    }

    #[test]
    fn test_missing_or_blank_email() {
        for url in [
            "outlookbridge://open?subject=Hi",
            "outlookbridge://open?email=",
            "outlookbridge://open?email=%20%20",
        ] {
            let err = parser().parse(url).unwrap_err();
            assert!(
                matches!(err, BridgeError::Validation(ref m) if m == "missing recipient"),
                "{url}: {err}"
            );
        }
    }

    #[test]
    fn test_attachment_list_trimmed() {
        let request = parser()
            .parse("outlookbridge://x?email=a@b.com&attachments=a.jpg, b.png ,,")
            .unwrap();
        assert_eq!(request.attachments(), ["a.jpg", "b.png"]);
    }

    #[test]
    fn test_form_decoding_and_last_key_wins() {
        let request = parser()
            .parse("outlookbridge://x?email=a@b.com&subject=First&subject=Hello+there%21")
            .unwrap();
        assert_eq!(request.subject(), "Hello there!");
    }

    #[test]
    fn test_utf8_values() {
        let request = parser()
            .parse("outlookbridge://x?email=a@b.com&subject=%E6%97%A0%E4%B8%BB%E9%A2%98")
            .unwrap();
        assert_eq!(request.subject(), "无主题");
    }

    #[test]
    fn test_wrong_scheme() {
        let err = parser().parse("mailto:a@b.com").unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolParse(_)));
    }

    #[test]
    fn test_not_a_url() {
        let err = parser().parse("just some text").unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolParse(_)));
    }

    #[test]
    fn test_invalid_utf8() {
        let err = parser().parse("outlookbridge://x?email=%FF").unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolParse(_)));
    }

    #[test]
    fn test_find_protocol_arg() {
        let args = vec![
            "/Applications/OutlookBridge".to_string(),
            "--flag".to_string(),
            "outlookbridge://x?email=a@b.com".to_string(),
            "outlookbridge://second".to_string(),
        ];
        assert_eq!(
            find_protocol_arg(&args, "outlookbridge://").as_deref(),
            Some("outlookbridge://x?email=a@b.com")
        );
        assert_eq!(find_protocol_arg(&["app", "x"], "outlookbridge://"), None);
    }
}
