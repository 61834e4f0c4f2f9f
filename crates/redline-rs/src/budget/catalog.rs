//! The immutable set of tools available to one run.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// What a tool is for. A tool may carry several capabilities.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Scan,
    Attack,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Scan => write!(f, "scan"),
            Capability::Attack => write!(f, "attack"),
        }
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scan" => Ok(Capability::Scan),
            "attack" => Ok(Capability::Attack),
            other => Err(format!("unknown capability '{other}' (expected scan or attack)")),
        }
    }
}

/// The capability subset a router budgets against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Only(Capability),
    All,
}

impl Scope {
    pub fn matches(&self, capabilities: &[Capability]) -> bool {
        match self {
            Scope::All => true,
            Scope::Only(cap) => capabilities.contains(cap),
        }
    }
}

impl From<Capability> for Scope {
    fn from(cap: Capability) -> Self {
        Scope::Only(cap)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Only(cap) => cap.fmt(f),
            Scope::All => write!(f, "all"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Scope::All);
        }
        s.parse::<Capability>().map(Scope::Only)
    }
}

/// One catalog entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CatalogTool {
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub description: String,
}

impl CatalogTool {
    pub fn new(
        name: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().collect(),
            description: description.into(),
        }
    }
}

/// Registry of the tools a run may call, in registration order.
///
/// Names are unique and non-empty; both are checked in [`ToolCatalog::new`].
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<CatalogTool>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<CatalogTool>) -> Result<Self, String> {
        let mut seen = HashSet::new();
        for tool in &tools {
            if tool.name.trim().is_empty() {
                return Err("catalog tool name must not be empty".to_string());
            }
            if tool.capabilities.is_empty() {
                return Err(format!("catalog tool '{}' has no capabilities", tool.name));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(format!("duplicate catalog tool '{}'", tool.name));
            }
        }
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<&CatalogTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogTool> {
        self.tools.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Names of the tools whose capabilities match `scope`.
    pub fn names_in_scope(&self, scope: Scope) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|t| scope.matches(&t.capabilities))
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Serialized form embedded in the reasoning context.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "tools": self.tools })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ToolCatalog {
        ToolCatalog::new(vec![
            CatalogTool::new("ffuf_directory_scan", [Capability::Scan], "dir fuzzing"),
            CatalogTool::new(
                "curl_tool",
                [Capability::Scan, Capability::Attack],
                "http requests",
            ),
            CatalogTool::new("sqlmap", [Capability::Attack], "sql injection"),
        ])
        .unwrap()
    }

    #[test]
    fn scope_filters_by_capability() {
        let catalog = catalog();
        assert_eq!(
            catalog.names_in_scope(Capability::Scan.into()),
            vec!["ffuf_directory_scan", "curl_tool"]
        );
        assert_eq!(
            catalog.names_in_scope(Capability::Attack.into()),
            vec!["curl_tool", "sqlmap"]
        );
        assert_eq!(catalog.names_in_scope(Scope::All).len(), 3);
    }

    #[test]
    fn rejects_duplicates_and_blank_names() {
        let dup = ToolCatalog::new(vec![
            CatalogTool::new("curl_tool", [Capability::Scan], "a"),
            CatalogTool::new("curl_tool", [Capability::Attack], "b"),
        ]);
        assert!(dup.unwrap_err().contains("duplicate"));

        let blank = ToolCatalog::new(vec![CatalogTool::new(" ", [Capability::Scan], "a")]);
        assert!(blank.is_err());

        let no_caps = ToolCatalog::new(vec![CatalogTool::new("x", [], "a")]);
        assert!(no_caps.is_err());
    }

    #[test]
    fn parse_scope_and_capability() {
        assert_eq!("scan".parse::<Scope>(), Ok(Scope::Only(Capability::Scan)));
        assert_eq!("ATTACK".parse::<Scope>(), Ok(Scope::Only(Capability::Attack)));
        assert_eq!("all".parse::<Scope>(), Ok(Scope::All));
        assert!("exploit".parse::<Capability>().is_err());
    }

    #[test]
    fn json_uses_lowercase_capabilities() {
        let json = catalog().to_json();
        assert_eq!(json["tools"][1]["name"], "curl_tool");
        assert_eq!(json["tools"][1]["capabilities"][1], "attack");
    }
}
