//! Metadata path model
//!
//! A `PartialPath` is an ordered list of path nodes such as `root.sg.d1.s1`.
//! Nodes may be wildcards (`*` matches exactly one level, `**` matches one or
//! more levels) or double-quoted names that contain reserved characters
//! (`root.sg."d.1"`). Quoted nodes keep their quotes and any `\` escapes.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Name of the first node of every path
pub const PATH_ROOT: &str = "root";

/// Wildcard matching exactly one level
pub const ONE_LEVEL_PATH_WILDCARD: &str = "*";

/// Wildcard matching one or more levels
pub const MULTI_LEVEL_PATH_WILDCARD: &str = "**";

const PATH_SEPARATOR: u8 = b'.';
const DOUBLE_QUOTE: u8 = b'"';
const ESCAPE: u8 = b'\\';

/// An immutable, validated metadata path
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartialPath {
    nodes: Vec<String>,
    full_path: String,
}

impl PartialPath {
    /// Parse a path string, rejecting empty segments and unterminated quotes
    pub fn new(path: &str) -> Result<Self> {
        let nodes = split_path_to_nodes(path)?;
        Ok(Self {
            nodes,
            full_path: path.to_string(),
        })
    }

    /// Build a path from already split nodes
    pub fn from_nodes<I, S>(nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let nodes: Vec<String> = nodes.into_iter().map(Into::into).collect();
        if nodes.is_empty() || nodes.iter().any(|n| n.is_empty()) {
            return Err(CoreError::IllegalPath(nodes.join(".")));
        }
        let full_path = nodes.join(".");
        Ok(Self { nodes, full_path })
    }

    /// Parse a list of path strings
    pub fn from_string_list<S: AsRef<str>>(paths: &[S]) -> Result<Vec<Self>> {
        paths.iter().map(|p| Self::new(p.as_ref())).collect()
    }

    /// Path nodes in order
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Number of nodes
    pub fn node_length(&self) -> usize {
        self.nodes.len()
    }

    /// Dot-joined representation
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Last node of the path
    pub fn measurement(&self) -> &str {
        // nodes is never empty
        &self.nodes[self.nodes.len() - 1]
    }

    /// All nodes but the last one, or `None` for a single-node path
    pub fn device(&self) -> Option<PartialPath> {
        if self.nodes.len() < 2 {
            return None;
        }
        Some(Self::from_validated(self.nodes[..self.nodes.len() - 1].to_vec()))
    }

    /// Device part as a string, empty for a single-node path
    pub fn device_name(&self) -> String {
        self.nodes[..self.nodes.len() - 1].join(".")
    }

    /// A new path with `node` appended
    pub fn concat_node(&self, node: &str) -> PartialPath {
        let mut nodes = self.nodes.clone();
        nodes.push(node.to_string());
        Self::from_validated(nodes)
    }

    /// The first `len` nodes, or `None` when `len` is zero or too large
    pub fn prefix(&self, len: usize) -> Option<PartialPath> {
        if len == 0 || len > self.nodes.len() {
            return None;
        }
        Some(Self::from_validated(self.nodes[..len].to_vec()))
    }

    /// True if any node is `*` or `**`
    pub fn has_wildcard(&self) -> bool {
        self.first_wildcard_index().is_some()
    }

    /// Index of the first `*` or `**` node
    pub fn first_wildcard_index(&self) -> Option<usize> {
        self.nodes.iter().position(|n| is_wildcard(n))
    }

    /// True if `self` is a (non-strict) node-wise prefix of `other`
    pub fn is_prefix_of(&self, other: &PartialPath) -> bool {
        self.nodes.len() <= other.nodes.len()
            && self.nodes.iter().zip(other.nodes.iter()).all(|(a, b)| a == b)
    }

    /// Whether nodes at depth `level` can be reached through this pattern.
    ///
    /// The fixed prefix before the first wildcard must fit within `level + 1`
    /// nodes, and a leading `*` only stands for exactly the node at `level`.
    pub fn may_have_nodes_at_level(&self, level: usize) -> bool {
        let prefix_idx = self.first_wildcard_index().unwrap_or(self.nodes.len());
        if self.nodes.get(prefix_idx).is_some_and(|n| n == ONE_LEVEL_PATH_WILDCARD) && level != prefix_idx {
            return false;
        }
        level + 1 >= prefix_idx
    }

    /// Whether this pattern matches the concrete path `path`
    pub fn matches(&self, path: &PartialPath) -> bool {
        match_nodes(&self.nodes, &path.nodes)
    }

    /// Whether some path starting with `prefix` could be matched by this pattern
    pub fn could_match_under(&self, prefix: &PartialPath) -> bool {
        prefix_match(&self.nodes, &prefix.nodes)
    }

    /// Rewrite this pattern so that it only matches paths under `prefix`.
    ///
    /// The returned patterns together match exactly the paths that this
    /// pattern matches and that start with `prefix`. Empty if none can.
    pub fn alter_prefix_path(&self, prefix: &PartialPath) -> Vec<PartialPath> {
        let mut remainders = Vec::new();
        alter_prefix(&self.nodes, &prefix.nodes, &mut remainders);

        let mut results: Vec<PartialPath> = Vec::with_capacity(remainders.len());
        for remainder in remainders {
            let mut nodes = prefix.nodes.clone();
            nodes.extend(remainder);
            let altered = Self::from_validated(nodes);
            if !results.contains(&altered) {
                results.push(altered);
            }
        }
        results
    }

    /// Mask every device node whose depth is not in `levels` with `*`.
    ///
    /// The measurement is always kept, so `root.sg.d1.s1` rolled up at
    /// levels `[0, 1]` becomes `root.sg.*.s1`.
    pub fn rollup(&self, levels: &[usize]) -> PartialPath {
        let last = self.nodes.len().saturating_sub(1);
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(depth, node)| {
                if depth == last || levels.contains(&depth) {
                    node.clone()
                } else {
                    ONE_LEVEL_PATH_WILDCARD.to_string()
                }
            })
            .collect();
        Self::from_validated(nodes)
    }

    fn from_validated(nodes: Vec<String>) -> Self {
        let full_path = nodes.join(".");
        Self { nodes, full_path }
    }
}

/// Split a path string into nodes.
///
/// Separators inside double quotes are part of the node, and a quote
/// preceded by `\` does not close the node.
pub fn split_path_to_nodes(path: &str) -> Result<Vec<String>> {
    let illegal = || CoreError::IllegalPath(path.to_string());
    if path.is_empty() {
        return Err(illegal());
    }

    let bytes = path.as_bytes();
    let len = bytes.len();
    let mut nodes = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < len {
        match bytes[i] {
            PATH_SEPARATOR => {
                if i == start {
                    return Err(illegal());
                }
                nodes.push(path[start..i].to_string());
                start = i + 1;
            }
            DOUBLE_QUOTE => {
                let end = closing_quote(bytes, i + 1).ok_or_else(illegal)?;
                if end + 1 != len && bytes[end + 1] != PATH_SEPARATOR {
                    return Err(illegal());
                }
                nodes.push(path[start..=end].to_string());
                // skip the separator following the quoted node
                i = end + 1;
                start = end + 2;
            }
            _ => {}
        }
        i += 1;
    }

    match start.cmp(&len) {
        Ordering::Less => nodes.push(path[start..].to_string()),
        // trailing separator
        Ordering::Equal => return Err(illegal()),
        Ordering::Greater => {}
    }

    Ok(nodes)
}

fn closing_quote(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len()).find(|&j| bytes[j] == DOUBLE_QUOTE && bytes[j - 1] != ESCAPE)
}

fn is_wildcard(node: &str) -> bool {
    node == ONE_LEVEL_PATH_WILDCARD || node == MULTI_LEVEL_PATH_WILDCARD
}

fn match_nodes(pattern: &[String], path: &[String]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((head, rest)) if head == MULTI_LEVEL_PATH_WILDCARD => {
            (1..=path.len()).any(|n| match_nodes(rest, &path[n..]))
        }
        Some((head, rest)) => match path.split_first() {
            Some((node, path_rest)) => {
                (head == ONE_LEVEL_PATH_WILDCARD || head == node) && match_nodes(rest, path_rest)
            }
            None => false,
        },
    }
}

fn prefix_match(pattern: &[String], prefix: &[String]) -> bool {
    let Some((node, prefix_rest)) = prefix.split_first() else {
        return true;
    };
    match pattern.split_first() {
        None => false,
        Some((head, _)) if head == MULTI_LEVEL_PATH_WILDCARD => true,
        Some((head, rest)) => {
            (head == ONE_LEVEL_PATH_WILDCARD || head == node) && prefix_match(rest, prefix_rest)
        }
    }
}

fn alter_prefix(pattern: &[String], prefix: &[String], out: &mut Vec<Vec<String>>) {
    if prefix.is_empty() {
        out.push(pattern.to_vec());
        return;
    }
    let Some((head, rest)) = pattern.split_first() else {
        return;
    };
    if head == MULTI_LEVEL_PATH_WILDCARD {
        // `**` ends inside the prefix
        for consumed in 1..=prefix.len() {
            alter_prefix(rest, &prefix[consumed..], out);
        }
        // `**` covers the whole prefix and continues below it
        let mut remainder = vec![MULTI_LEVEL_PATH_WILDCARD.to_string()];
        remainder.extend_from_slice(rest);
        out.push(remainder);
    } else if head == ONE_LEVEL_PATH_WILDCARD || *head == prefix[0] {
        alter_prefix(rest, &prefix[1..], out);
    }
}

impl FromStr for PartialPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for PartialPath {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<PartialPath> for String {
    fn from(path: PartialPath) -> Self {
        path.full_path
    }
}

impl fmt::Display for PartialPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path)
    }
}

impl fmt::Debug for PartialPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartialPath({})", self.full_path)
    }
}

impl PartialEq for PartialPath {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl Eq for PartialPath {}

impl Hash for PartialPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nodes.hash(state);
    }
}

impl PartialOrd for PartialPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PartialPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.full_path
            .cmp(&other.full_path)
            .then_with(|| self.nodes.cmp(&other.nodes))
    }
}
