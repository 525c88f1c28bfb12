//! Curl-style template parsing.
//!
//! Flow documents describe each HTTP operation as the curl command an
//! operator would run by hand. After substitution the engine parses that
//! command into a structured [`RenderedRequest`]. The lexer is a small
//! shell-like tokenizer: single and double quotes, backslash escapes, and
//! backslash-newline line continuations.

use serde::Serialize;
use serde_json::Value;

use crate::error::SubstitutionError;

/// Fully substituted HTTP request, ready for execution. Contains no
/// unresolved placeholder tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRequest {
    /// HTTP method, uppercase.
    pub method: String,
    /// Absolute request URL.
    pub url: String,
    /// Header name/value pairs in declaration order.
    pub headers: Vec<(String, String)>,
    /// Optional request payload.
    pub body: Option<RequestBody>,
    /// Optional basic-auth credentials from `-u user:pass`.
    pub basic_auth: Option<(String, String)>,
}

/// Request payload classified by how it should be sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RequestBody {
    /// JSON payload, sent with a JSON body writer.
    Json(Value),
    /// URL-encoded form payload, sent verbatim.
    Form(String),
    /// Anything else, sent verbatim.
    Text(String),
}

impl RenderedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Parses a substituted curl command into a [`RenderedRequest`].
pub fn parse_curl_command(command: &str) -> Result<RenderedRequest, SubstitutionError> {
    let tokens = lex_command(command);
    let mut tokens = tokens.into_iter();

    match tokens.next() {
        Some(first) if first == "curl" => {}
        _ => return Err(malformed("template does not start with 'curl'")),
    }

    let mut method: Option<String> = None;
    let mut url: Option<String> = None;
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut data_parts: Vec<String> = Vec::new();
    let mut basic_auth: Option<(String, String)> = None;

    while let Some(token) = tokens.next() {
        match token.as_str() {
            "-X" | "--request" => {
                let value = tokens.next().ok_or_else(|| malformed("missing method after -X"))?;
                method = Some(value.to_ascii_uppercase());
            }
            "-H" | "--header" => {
                let value = tokens.next().ok_or_else(|| malformed("missing header after -H"))?;
                let (name, header_value) = value
                    .split_once(':')
                    .ok_or_else(|| malformed(format!("header '{value}' has no ':'")))?;
                headers.push((name.trim().to_string(), header_value.trim().to_string()));
            }
            "-d" | "--data" | "--data-raw" | "--data-urlencode" => {
                let value = tokens.next().ok_or_else(|| malformed("missing payload after -d"))?;
                data_parts.push(value);
            }
            "-u" | "--user" => {
                let value = tokens.next().ok_or_else(|| malformed("missing credentials after -u"))?;
                let (user, password) = value
                    .split_once(':')
                    .ok_or_else(|| malformed(format!("credentials '{value}' have no ':'")))?;
                basic_auth = Some((user.to_string(), password.to_string()));
            }
            flag if flag.starts_with('-') => {
                return Err(malformed(format!("unsupported curl flag '{flag}'")));
            }
            other => {
                if url.replace(other.to_string()).is_some() {
                    return Err(malformed("template contains more than one URL"));
                }
            }
        }
    }

    let url = url.ok_or_else(|| malformed("template has no URL"))?;
    // curl switches to POST when a payload is given without -X.
    let method = method.unwrap_or_else(|| if data_parts.is_empty() { "GET".into() } else { "POST".into() });
    let body = if data_parts.is_empty() {
        None
    } else {
        let content_type = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.to_ascii_lowercase());
        Some(classify_body(data_parts.join("&"), content_type.as_deref()))
    };

    Ok(RenderedRequest {
        method,
        url,
        headers,
        body,
        basic_auth,
    })
}

/// Classifies a payload using the declared Content-Type, falling back to
/// the payload's own shape. JSON that fails to parse degrades to raw text
/// so a quoting mistake surfaces in the HTTP error, not a crash.
fn classify_body(raw: String, content_type: Option<&str>) -> RequestBody {
    if let Some(content_type) = content_type {
        if content_type.contains("json") {
            return match serde_json::from_str::<Value>(&raw) {
                Ok(value) => RequestBody::Json(value),
                Err(_) => RequestBody::Text(raw),
            };
        }
        if content_type.contains("x-www-form-urlencoded") {
            return RequestBody::Form(raw);
        }
    }

    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(&raw) {
            return RequestBody::Json(value);
        }
    }
    if raw.contains('=') {
        return RequestBody::Form(raw);
    }
    RequestBody::Text(raw)
}

/// Tokenizes a command using a simple shell-like lexer. Quoted segments
/// keep their content verbatim; a backslash before a newline continues the
/// command, and a backslash elsewhere escapes the next character.
fn lex_command(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut has_current = false;
    let mut characters = input.chars();

    while let Some(character) = characters.next() {
        match character {
            '\\' => match characters.next() {
                Some('\n') | None => {}
                Some(escaped) => {
                    current.push(escaped);
                    has_current = true;
                }
            },
            '\'' => {
                has_current = true;
                for inner in characters.by_ref() {
                    if inner == '\'' {
                        break;
                    }
                    current.push(inner);
                }
            }
            '"' => {
                has_current = true;
                while let Some(inner) = characters.next() {
                    match inner {
                        '"' => break,
                        '\\' => match characters.next() {
                            Some(escaped) => current.push(escaped),
                            None => break,
                        },
                        other => current.push(other),
                    }
                }
            }
            character if character.is_whitespace() => {
                if has_current {
                    tokens.push(std::mem::take(&mut current));
                    has_current = false;
                }
            }
            other => {
                current.push(other);
                has_current = true;
            }
        }
    }
    if has_current {
        tokens.push(current);
    }

    tokens
}

fn malformed(reason: impl Into<String>) -> SubstitutionError {
    SubstitutionError::MalformedTemplate { reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lexes_quotes_and_continuations() {
        let tokens = lex_command("curl -X POST https://example.org \\\n  -H \"Content-Type: application/json\" \\\n  -d '{\"a\": 1}'");
        assert_eq!(
            tokens,
            vec![
                "curl",
                "-X",
                "POST",
                "https://example.org",
                "-H",
                "Content-Type: application/json",
                "-d",
                "{\"a\": 1}",
            ]
        );
    }

    #[test]
    fn parses_json_post() {
        let request = parse_curl_command(
            "curl -X POST https://auth.example.org/register \\\n  -H \"Content-Type: application/json\" \\\n  -d '{\"redirect_uris\": [], \"scope\": \"openid profile\"}'",
        )
        .expect("parse");

        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "https://auth.example.org/register");
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(
            request.body,
            Some(RequestBody::Json(json!({"redirect_uris": [], "scope": "openid profile"})))
        );
        assert!(request.basic_auth.is_none());
    }

    #[test]
    fn parses_form_post_with_basic_auth() {
        let request = parse_curl_command(
            "curl -X POST https://auth.example.org/token \\\n  -H \"Content-Type: application/x-www-form-urlencoded\" \\\n  -u \"client:secret\" \\\n  -d \"grant_type=refresh_token&refresh_token=R1\"",
        )
        .expect("parse");

        assert_eq!(request.method, "POST");
        assert_eq!(request.basic_auth, Some(("client".to_string(), "secret".to_string())));
        assert_eq!(
            request.body,
            Some(RequestBody::Form("grant_type=refresh_token&refresh_token=R1".to_string()))
        );
    }

    #[test]
    fn parses_get_with_bearer_header() {
        let request = parse_curl_command("curl -X GET https://auth.example.org/userinfo -H \"Authorization: Bearer T1\"").expect("parse");
        assert_eq!(request.method, "GET");
        assert!(request.body.is_none());
        assert_eq!(request.header("authorization"), Some("Bearer T1"));
    }

    #[test]
    fn joins_multiple_data_flags() {
        let request = parse_curl_command("curl https://example.org -d \"a=1\" -d \"b=2\"").expect("parse");
        assert_eq!(request.method, "POST", "payload without -X implies POST");
        assert_eq!(request.body, Some(RequestBody::Form("a=1&b=2".to_string())));
    }

    #[test]
    fn rejects_garbage_templates() {
        assert!(parse_curl_command("wget https://example.org").is_err());
        assert!(parse_curl_command("curl -X POST").is_err());
        assert!(parse_curl_command("curl -Z https://example.org").is_err());
        assert!(parse_curl_command("curl https://a.example https://b.example").is_err());
    }

    #[test]
    fn malformed_json_degrades_to_text() {
        let request = parse_curl_command("curl -X POST https://example.org -H \"Content-Type: application/json\" -d '{broken'").expect("parse");
        assert_eq!(request.body, Some(RequestBody::Text("{broken".to_string())));
    }
}
