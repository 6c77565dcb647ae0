use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current on-disk schema version.
pub const STACK_FORMAT_VERSION: u32 = 1;

/// Lifecycle state of a pull request, normalized across forges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Draft,
    Closed,
    Merged,
}

impl PrState {
    /// Merged and closed PRs no longer accept description updates.
    pub fn is_terminal(self) -> bool {
        matches!(self, PrState::Closed | PrState::Merged)
    }
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrState::Open => "open",
            PrState::Draft => "draft",
            PrState::Closed => "closed",
            PrState::Merged => "merged",
        };
        write!(f, "{s}")
    }
}

/// Pull request metadata recorded for a stack branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrRecord {
    pub number: u64,
    pub url: String,
    pub state: PrState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A single branch in the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackBranch {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<PrRecord>,
}

impl StackBranch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upstream: None,
            pr: None,
        }
    }
}

/// Branch SHAs captured before an atomic rebase, keyed by branch name
/// (the base branch included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub refs: BTreeMap<String, String>,
}

/// An ordered chain of dependent branches on top of a base branch.
///
/// Branch `i` depends on the base when `i == 0` and on `branches[i-1]`
/// otherwise. The name doubles as the on-disk filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub version: u32,
    pub name: String,
    pub base: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub branches: Vec<StackBranch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    /// Fields written by newer versions are carried through untouched.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A single problem reported by stack validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub branch: String,
    pub message: String,
}

impl Stack {
    pub fn new(name: impl Into<String>, base: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: STACK_FORMAT_VERSION,
            name: name.into(),
            base: base.into(),
            created: now,
            updated: now,
            branches: Vec::new(),
            snapshot: None,
            extra: BTreeMap::new(),
        }
    }

    /// Index of a branch by name.
    pub fn find_branch(&self, name: &str) -> Option<usize> {
        self.branches.iter().position(|b| b.name == name)
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.find_branch(name).is_some()
    }

    /// Parent branch name. The base branch is the parent of the first
    /// branch and of any branch not in the stack.
    pub fn parent(&self, name: &str) -> &str {
        match self.find_branch(name) {
            Some(idx) if idx > 0 => &self.branches[idx - 1].name,
            _ => &self.base,
        }
    }

    /// The branch depending on `name`, i.e. the next one in order.
    pub fn child(&self, name: &str) -> Option<&str> {
        let idx = self.find_branch(name)?;
        self.branches.get(idx + 1).map(|b| b.name.as_str())
    }

    /// Base plus all stack branches, in dependency order.
    pub fn all_branches(&self) -> Vec<&str> {
        let mut result = Vec::with_capacity(self.branches.len() + 1);
        result.push(self.base.as_str());
        result.extend(self.branches.iter().map(|b| b.name.as_str()));
        result
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Advance the `updated` timestamp; call on every mutation.
    pub fn touch(&mut self) {
        self.updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_with(names: &[&str]) -> Stack {
        let mut stack = Stack::new("test", "main");
        for name in names {
            stack.branches.push(StackBranch::new(*name));
        }
        stack
    }

    #[test]
    fn test_new_stack() {
        let stack = Stack::new("my-feature", "main");
        assert_eq!(stack.version, STACK_FORMAT_VERSION);
        assert_eq!(stack.name, "my-feature");
        assert_eq!(stack.base, "main");
        assert!(stack.is_empty());
        assert!(stack.snapshot.is_none());
        assert_eq!(stack.created, stack.updated);
    }

    #[test]
    fn test_find_and_has_branch() {
        let stack = stack_with(&["a", "b", "c"]);
        assert_eq!(stack.find_branch("a"), Some(0));
        assert_eq!(stack.find_branch("c"), Some(2));
        assert_eq!(stack.find_branch("main"), None);
        assert!(stack.has_branch("b"));
        assert!(!stack.has_branch("d"));
    }

    #[test]
    fn test_parent_follows_order() {
        let stack = stack_with(&["a", "b", "c"]);
        assert_eq!(stack.parent("a"), "main");
        assert_eq!(stack.parent("b"), "a");
        assert_eq!(stack.parent("c"), "b");
        // unknown branches fall back to the base
        assert_eq!(stack.parent("zzz"), "main");
    }

    #[test]
    fn test_child_is_next_in_order() {
        let stack = stack_with(&["a", "b"]);
        assert_eq!(stack.child("a"), Some("b"));
        assert_eq!(stack.child("b"), None);
        assert_eq!(stack.child("main"), None);
    }

    #[test]
    fn test_all_branches_prepends_base() {
        let stack = stack_with(&["a", "b"]);
        assert_eq!(stack.all_branches(), vec!["main", "a", "b"]);
    }

    #[test]
    fn test_yaml_round_trip_is_idempotent() {
        let mut stack = stack_with(&["a", "b"]);
        stack.branches[0].pr = Some(PrRecord {
            number: 7,
            url: "https://example.com/pr/7".to_string(),
            state: PrState::Open,
            title: Some("Add a".to_string()),
        });

        let first = serde_yaml::to_string(&stack).unwrap();
        let parsed: Stack = serde_yaml::from_str(&first).unwrap();
        let second = serde_yaml::to_string(&parsed).unwrap();
        assert_eq!(first, second);
        assert_eq!(parsed, stack);
    }

    #[test]
    fn test_unknown_yaml_fields_survive_round_trip() {
        let stack = stack_with(&["a"]);
        let mut yaml = serde_yaml::to_string(&stack).unwrap();
        yaml.push_str("future_field: kept\n");

        let parsed: Stack = serde_yaml::from_str(&yaml).unwrap();
        assert!(parsed.extra.contains_key("future_field"));

        let reserialized = serde_yaml::to_string(&parsed).unwrap();
        assert!(reserialized.contains("future_field: kept"));
    }

    #[test]
    fn test_pr_state_serializes_lowercase() {
        assert_eq!(serde_yaml::to_string(&PrState::Merged).unwrap().trim(), "merged");
        let parsed: PrState = serde_yaml::from_str("draft").unwrap();
        assert_eq!(parsed, PrState::Draft);
    }
}
