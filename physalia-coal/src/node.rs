//! Node and label types for coalescent trees.

use std::fmt;

/// Index into the tree's node arena.
pub type NodeId = usize;

/// A discrete deme/state identifier attached to a node.
///
/// Labels are opaque interned string keys: integer-coded states ("1", "2")
/// and named states ("usa", "north") are both valid and never compared
/// numerically. The label `"0"` is the unset sentinel produced when no
/// annotation or tip-name digit run assigns a state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(String);

impl Label {
    /// Create a label from any string-like value.
    pub fn new(s: impl Into<String>) -> Self {
        Label(s.into())
    }

    /// The unset sentinel label `"0"`.
    pub fn unset() -> Self {
        Label("0".to_string())
    }

    /// True if this is the unset sentinel.
    pub fn is_unset(&self) -> bool {
        self.0 == "0"
    }

    /// The label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Label {
    fn default() -> Self {
        Label::unset()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::new(s)
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label(s)
    }
}

/// A single node in a coalescent tree.
///
/// Nodes live in the tree's arena and are referenced by [`NodeId`]. The
/// `number` field is the stable export identity: it survives structural
/// transformations until the whole tree is renumbered, whereas a `NodeId`
/// is invalidated when the node is erased.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Index of this node in the arena.
    pub id: NodeId,
    /// Parent node (None for root).
    pub parent: Option<NodeId>,
    /// Child nodes, in order.
    pub children: Vec<NodeId>,
    /// Stable numeric identity (root is 0 after a final renumbering).
    pub number: usize,
    /// Tip identifier (None for internal and synthetic nodes).
    pub name: Option<String>,
    /// Deme/state label.
    pub label: Label,
    /// Absolute age, non-decreasing from root to tips.
    pub time: f64,
    /// Branch length from the parent to this node (0 for the root).
    pub length: f64,
    /// Sampled-tip flag; slicing can force it true on truncated nodes.
    pub leaf: bool,
    /// Membership in the lineage(s) ancestral to present-day samples.
    pub trunk: bool,
    /// Whether this branch counts toward lengths and statistics.
    pub include: bool,
    /// Continuous trait coordinate (antigenic/geographic x).
    pub x: f64,
    /// Continuous trait coordinate (antigenic/geographic y).
    pub y: f64,
    /// Presentation-layout x coordinate; never read by statistics.
    pub x_coord: f64,
    /// Presentation-layout y coordinate; never read by statistics.
    pub y_coord: f64,
    /// Per-branch substitution/evolutionary rate.
    pub rate: Option<f64>,
}

impl Node {
    /// Create a fresh node with the given stable number.
    ///
    /// The arena fills in `id` and `parent` on insertion.
    pub fn new(number: usize) -> Self {
        Node {
            id: 0,
            parent: None,
            children: Vec::new(),
            number,
            name: None,
            label: Label::unset(),
            time: 0.0,
            length: 0.0,
            leaf: false,
            trunk: false,
            include: true,
            x: 0.0,
            y: 0.0,
            x_coord: 0.0,
            y_coord: 0.0,
            rate: None,
        }
    }

    /// True if this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// True if this node has no children in the current tree.
    ///
    /// Distinct from the `leaf` flag: the flag marks sampled tips (and
    /// nodes truncated into tips by slicing), while this is structural.
    pub fn is_childless(&self) -> bool {
        self.children.is_empty()
    }
}
