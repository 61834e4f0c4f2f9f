//! The system under assessment.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Web,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Web => write!(f, "web"),
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub description: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: TargetKind,
}

impl Target {
    /// A web target. `url` must be an absolute http(s) URL with a host.
    pub fn web(url: impl Into<String>, description: impl Into<String>) -> Result<Self, String> {
        let url = url.into().trim().trim_end_matches('/').to_string();
        let rest = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"))
            .ok_or_else(|| format!("target URL must start with http:// or https://, got '{url}'"))?;
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(format!("target URL has no valid host: '{url}'"));
        }
        Ok(Self {
            description: description.into(),
            url,
            kind: TargetKind::Web,
        })
    }

    /// Host (and port) part of the URL, as nmap expects it without the port.
    pub fn host(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
        let authority = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
        if authority.starts_with('[') {
            // IPv6 literal
            return authority
                .split_once(']')
                .map_or(authority, |(h, _)| h.trim_start_matches('['));
        }
        authority.split(':').next().unwrap_or(authority)
    }

    /// Lines identifying the target inside a prompt.
    pub fn to_prompt(&self) -> String {
        format!(
            "TARGET: {}\nTARGET_TYPE: {}\nDESCRIPTION: {}",
            self.url, self.kind, self.description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        let t = Target::web("http://localhost:8000/", "demo API").unwrap();
        assert_eq!(t.url, "http://localhost:8000");
        assert_eq!(t.kind, TargetKind::Web);
        assert!(Target::web("https://example.com/app", "").is_ok());
    }

    #[test]
    fn rejects_other_schemes_and_missing_hosts() {
        assert!(Target::web("ftp://example.com", "").is_err());
        assert!(Target::web("localhost:8000", "").is_err());
        assert!(Target::web("http:///path", "").is_err());
    }

    #[test]
    fn host_strips_scheme_port_and_path() {
        assert_eq!(Target::web("http://localhost:8000/api", "").unwrap().host(), "localhost");
        assert_eq!(Target::web("https://user@example.com", "").unwrap().host(), "example.com");
        assert_eq!(Target::web("http://[::1]:8080", "").unwrap().host(), "::1");
    }

    #[test]
    fn serializes_kind_as_type() {
        let t = Target::web("http://t", "x").unwrap();
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["type"], "web");
    }
}
