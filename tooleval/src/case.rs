//! Test case definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{EvalError, Result};

/// The arguments a tool call carries: a dynamically shaped JSON tree
pub type ArgumentValue = Value;

/// A single expected tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedCase {
    /// Unique identifier for this test case
    pub id: String,
    /// Complexity tier
    pub tier: u32,
    /// Prompt sent to the model
    pub prompt: String,
    /// Tool the model should select
    pub expected_tool: String,
    /// Arguments the model should pass
    #[serde(default = "empty_args")]
    pub expected_args: ArgumentValue,
    /// Other tool names that also count as a correct selection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptable_tools: Vec<String>,
    /// Restrict the tools presented for this case (the expected tool is always added)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// Extra accepted values for leaf fields, keyed by field path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub equivalents: BTreeMap<String, Vec<Value>>,
    /// Optional tags for filtering
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn empty_args() -> Value {
    Value::Object(Default::default())
}

impl ExpectedCase {
    /// Create a new case expecting a call with no arguments
    pub fn new(id: &str, tier: u32, prompt: &str, expected_tool: &str) -> Self {
        Self {
            id: id.to_string(),
            tier,
            prompt: prompt.to_string(),
            expected_tool: expected_tool.to_string(),
            expected_args: empty_args(),
            acceptable_tools: vec![],
            tools: None,
            equivalents: BTreeMap::new(),
            tags: vec![],
        }
    }

    /// Set the expected arguments
    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.expected_args = args;
        self
    }

    /// Accept another tool name as a correct selection
    #[must_use]
    pub fn with_acceptable_tool(mut self, name: &str) -> Self {
        self.acceptable_tools.push(name.to_string());
        self
    }

    /// Present only these tools (plus the accepted ones)
    #[must_use]
    pub fn with_tools(mut self, names: &[&str]) -> Self {
        self.tools = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Declare extra accepted values for the leaf at `path`
    #[must_use]
    pub fn with_equivalents(mut self, path: &str, values: Vec<Value>) -> Self {
        self.equivalents.entry(path.to_string()).or_default().extend(values);
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Whether an observed tool name counts as the right selection
    pub fn accepts_tool(&self, name: &str) -> bool {
        self.expected_tool == name || self.acceptable_tools.iter().any(|t| t == name)
    }

    /// Every tool name that counts as a correct selection, expected first
    pub fn accepted_tools(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.expected_tool.as_str())
            .chain(self.acceptable_tools.iter().map(String::as_str))
    }

    /// Names of the tools to present, always including every accepted tool
    pub fn presented_tools(&self) -> Option<Vec<String>> {
        self.tools.as_ref().map(|names| {
            let mut names = names.clone();
            for accepted in self.accepted_tools() {
                if !names.iter().any(|n| n == accepted) {
                    names.push(accepted.to_string());
                }
            }
            names
        })
    }
}

/// A file of test cases: a JSON array of [`ExpectedCase`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseFile {
    pub cases: Vec<ExpectedCase>,
}

impl CaseFile {
    /// Load a case file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EvalError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file: CaseFile = serde_json::from_str(&content)?;
        Ok(file)
    }

    /// Save the case file to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Cases grouped by tier, tiers in ascending order
    pub fn by_tier(&self) -> BTreeMap<u32, Vec<ExpectedCase>> {
        group_by_tier(&self.cases)
    }
}

/// Group cases by tier, keeping their relative order within a tier
pub fn group_by_tier(cases: &[ExpectedCase]) -> BTreeMap<u32, Vec<ExpectedCase>> {
    let mut tiers: BTreeMap<u32, Vec<ExpectedCase>> = BTreeMap::new();
    for case in cases {
        tiers.entry(case.tier).or_default().push(case.clone());
    }
    tiers
}
