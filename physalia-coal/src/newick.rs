//! Annotated Newick parser and writer.
//!
//! Supports the standard Newick grammar extended with bracketed
//! annotation blocks after any node:
//!
//! ```text
//! tree       = subtree ';'?
//! subtree    = leaf | internal
//! internal   = '(' subtree (',' subtree)* ')' label? ':' length annotation*
//! leaf       = name ':' length annotation*
//! annotation = '[' '&'? field (('=' | ':' | ',' | ' ') field)* ']'
//! ```
//!
//! Annotations carry discrete states, continuous traits, per-branch rates,
//! and explicit migration events (`M from to:length`, which splits the
//! branch with an intermediate node). Unknown annotation keys are ignored
//! so that trees from different upstream tools parse cleanly.

use physalia_core::{PhysaliaError, Result};

use crate::node::{Label, NodeId};
use crate::tree::CoalescentTree;

/// Parse an annotated Newick string into a [`CoalescentTree`].
///
/// After the structural scan the parser assigns absolute node times from
/// branch lengths, marks the trunk using a window of 1/100 of the time
/// span, and shifts times so the most recent tip sits at 0.
pub fn parse(input: &str) -> Result<CoalescentTree> {
    let left = input.chars().filter(|&c| c == '(').count();
    let right = input.chars().filter(|&c| c == ')').count();
    if left != right {
        return Err(PhysaliaError::Parse(format!(
            "unmatched parentheses: {} '(' vs {} ')'",
            left, right
        )));
    }

    let mut scanner = Scanner::new();
    for c in input.chars() {
        scanner.step(c)?;
    }
    let mut tree = scanner.tree;

    tree.recompute_times();
    let span = tree.present_time() - tree.root_time();
    tree.renew_trunk(span / 100.0);
    tree.push_times_back(0.0);
    Ok(tree)
}

/// Serialize a tree to a parenthetical Newick string.
///
/// Childless nodes print their name (or stable number when unnamed);
/// every non-root node prints its branch length.
pub fn write(tree: &CoalescentTree) -> String {
    let mut buf = String::new();
    write_subtree(tree, tree.root(), &mut buf);
    buf.push(';');
    buf
}

fn write_subtree(tree: &CoalescentTree, id: NodeId, buf: &mut String) {
    let node = tree.n(id);
    if !node.children.is_empty() {
        buf.push('(');
        for (i, &child) in node.children.iter().enumerate() {
            if i > 0 {
                buf.push(',');
            }
            write_subtree(tree, child, buf);
        }
        buf.push(')');
    } else {
        match &node.name {
            Some(name) => buf.push_str(name),
            None => buf.push_str(&node.number.to_string()),
        }
    }
    if node.parent.is_some() {
        buf.push(':');
        let s = format!("{:.10}", node.length);
        let s = s.trim_end_matches('0');
        let s = s.trim_end_matches('.');
        buf.push_str(s);
    }
}

/// Scanner state: outside annotations, inside a `[...]` block, or inside
/// a `{...}` group within a block (where commas do not split fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    InBracket,
    InBrace,
}

struct Scanner {
    tree: CoalescentTree,
    cursor: NodeId,
    state: ScanState,
    buf: String,
    bracketed: String,
    length_armed: bool,
    next_number: usize,
}

impl Scanner {
    fn new() -> Self {
        let tree = CoalescentTree::new();
        let cursor = tree.root();
        Scanner {
            tree,
            cursor,
            state: ScanState::Outside,
            buf: String::new(),
            bracketed: String::new(),
            length_armed: false,
            next_number: 1,
        }
    }

    fn step(&mut self, c: char) -> Result<()> {
        match self.state {
            ScanState::Outside => self.step_outside(c),
            ScanState::InBracket | ScanState::InBrace => self.step_bracketed(c),
        }
    }

    fn step_outside(&mut self, c: char) -> Result<()> {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/' | '|') {
            self.buf.push(c);
            return Ok(());
        }
        match c {
            ':' => {
                if !self.buf.is_empty() {
                    self.commit_name();
                }
                self.length_armed = true;
            }
            '[' | '(' | ')' | ',' => {
                if !self.buf.is_empty() {
                    if self.length_armed {
                        self.commit_length()?;
                    } else {
                        self.commit_name();
                    }
                }
                match c {
                    '(' => {
                        self.cursor = self.tree.add_child(self.cursor, self.next_number)?;
                        self.next_number += 1;
                    }
                    ',' => {
                        self.cursor =
                            self.tree.insert_sibling_after(self.cursor, self.next_number)?;
                        self.next_number += 1;
                    }
                    ')' => {
                        // Ascend, propagating the child's label upward
                        // (last-child-wins for unannotated internals).
                        let label = self.tree.n(self.cursor).label.clone();
                        self.cursor = self.tree.parent_of(self.cursor).ok_or_else(|| {
                            PhysaliaError::Parse("unexpected ')' at tree root".into())
                        })?;
                        self.tree.n_mut(self.cursor).label = label;
                    }
                    '[' => {
                        self.state = ScanState::InBracket;
                        self.bracketed.clear();
                    }
                    _ => unreachable!(),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn step_bracketed(&mut self, c: char) -> Result<()> {
        match c {
            '{' => {
                self.bracketed.push(c);
                self.state = ScanState::InBrace;
            }
            '}' => {
                self.bracketed.push(c);
                self.state = ScanState::InBracket;
            }
            ']' => {
                self.apply_annotation()?;
                self.bracketed.clear();
                self.state = ScanState::Outside;
            }
            ',' if self.state == ScanState::InBracket => {
                self.apply_annotation()?;
                self.bracketed.clear();
            }
            _ => self.bracketed.push(c),
        }
        Ok(())
    }

    fn commit_name(&mut self) {
        let name = std::mem::take(&mut self.buf);
        let label = initial_digits(&name);
        let node = self.tree.n_mut(self.cursor);
        node.name = Some(name);
        node.leaf = true;
        node.label = label.clone();
        if !label.is_unset() {
            self.tree.register_label(label);
        }
    }

    fn commit_length(&mut self) -> Result<()> {
        let text = std::mem::take(&mut self.buf);
        let length: f64 = text
            .parse()
            .map_err(|_| PhysaliaError::Parse(format!("invalid branch length '{}'", text)))?;
        self.tree.n_mut(self.cursor).length = length;
        self.length_armed = false;
        Ok(())
    }

    /// Split one annotation into up to four positional fields and apply it.
    fn apply_annotation(&mut self) -> Result<()> {
        let mut fields: [String; 4] = Default::default();
        let mut counter = 0usize;
        for ch in self.bracketed.chars() {
            match ch {
                '&' | '{' | '}' | '"' => {}
                ' ' | '=' | ':' | ',' => counter += 1,
                _ => {
                    if counter < 4 {
                        fields[counter].push(ch);
                    }
                }
            }
        }

        match fields[0].as_str() {
            // Migration event on the current branch: shorten the branch to
            // the migration length and wrap an intermediate node carrying
            // the source state and the remainder.
            "M" => {
                let from_index: i64 = parse_num(&fields[1], "migration source state")?;
                let from = Label::new((from_index + 1).to_string());
                let mig_length: f64 = parse_num(&fields[3], "migration branch length")?;

                let total = self.tree.n(self.cursor).length;
                self.tree.n_mut(self.cursor).length = mig_length;

                let wrapped = self.tree.wrap(self.cursor, self.next_number)?;
                self.next_number += 1;
                {
                    let node = self.tree.n_mut(wrapped);
                    node.label = from.clone();
                    node.length = total - mig_length;
                }
                self.tree.register_label(from);
                // Further annotations in this block attach to the new node,
                // so stacked migration events nest correctly.
                self.cursor = wrapped;
            }
            "states" | "location" | "cluster" | "Compartment" => {
                let label = Label::new(fields[1].clone());
                self.tree.n_mut(self.cursor).label = label.clone();
                self.tree.register_label(label);
            }
            "antigenic" | "AHT" => {
                let x: f64 = parse_num(&fields[1], "trait x")?;
                let y: f64 = parse_num(&fields[2], "trait y")?;
                let node = self.tree.n_mut(self.cursor);
                node.x = x;
                node.y = y;
            }
            "N" | "layout" | "iSNV" | "latitude" | "diffusion" | "diffTrait" => {
                self.tree.n_mut(self.cursor).x = parse_num(&fields[1], "trait x")?;
            }
            "S" | "AC14_R" => {
                self.tree.n_mut(self.cursor).y = parse_num(&fields[1], "trait y")?;
            }
            "AHTL" => {
                let x: f64 = parse_num(&fields[1], "trait x")?;
                let y: f64 = parse_num(&fields[2], "trait y")?;
                let z: f64 = parse_num(&fields[3], "hemisphere value")?;
                let node = self.tree.n_mut(self.cursor);
                node.x = x;
                node.y = y;
                node.label = Label::new(if z < 0.0 { "south" } else { "north" });
            }
            "rate" => {
                self.tree.n_mut(self.cursor).rate =
                    Some(parse_num(&fields[1], "branch rate")?);
            }
            // Unknown keys are ignored: annotation schemas vary by tool.
            _ => {}
        }
        Ok(())
    }
}

fn parse_num<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.parse()
        .map_err(|_| PhysaliaError::Parse(format!("invalid {} '{}'", what, text)))
}

/// Derive a seed label from the leading digits of a tip name.
///
/// A name containing a letter yields its leading digit run plus one
/// (`34ATZ` -> `35`, `NY` -> `1`); a purely numeric name yields the unset
/// sentinel `0`. Bracket annotations override this seed.
fn initial_digits(name: &str) -> Label {
    let contains_letter = name.chars().any(|c| c.is_ascii_alphabetic());
    let mut initial: i64 = -1;
    if contains_letter {
        let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
        initial = digits.parse().unwrap_or(0);
    }
    Label::new((initial + 1).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn parse_three_tip_tree() {
        let t = parse("((A:1,B:1):1,C:2);").unwrap();
        assert_eq!(t.node_count(), 5);
        assert_eq!(t.leaf_count(), 3);
        // Most recent tip pushed back to time 0.
        assert!((t.present_time() - 0.0).abs() < TOL);
        assert!((t.root_time() - (-2.0)).abs() < TOL);
    }

    #[test]
    fn parse_assigns_times_from_lengths() {
        let t = parse("((A:1,B:1):1,C:2);").unwrap();
        let a = t.find_by_name("A").unwrap();
        let internal = t.parent_of(a).unwrap();
        assert!((t.node(a).unwrap().time - 0.0).abs() < TOL);
        assert!((t.node(internal).unwrap().time - (-1.0)).abs() < TOL);
    }

    #[test]
    fn unmatched_parentheses_fail() {
        assert!(parse("((A:1,B:1):1;").is_err());
        assert!(parse("(A:1,B:1)):1;").is_err());
    }

    #[test]
    fn bad_branch_length_fails() {
        assert!(parse("(A:abc,B:1);").is_err());
    }

    #[test]
    fn tip_name_digits_seed_labels() {
        let t = parse("((3NY:1,2HK:1):1,AK:2);").unwrap();
        let ny = t.find_by_name("3NY").unwrap();
        let hk = t.find_by_name("2HK").unwrap();
        let ak = t.find_by_name("AK").unwrap();
        assert_eq!(t.node(ny).unwrap().label, Label::new("4"));
        assert_eq!(t.node(hk).unwrap().label, Label::new("3"));
        assert_eq!(t.node(ak).unwrap().label, Label::new("1"));
        assert!(t.label_set().contains(&Label::new("4")));
        assert!(t.label_set().contains(&Label::new("1")));
    }

    #[test]
    fn numeric_tip_name_stays_unset() {
        let t = parse("(123:1,456:1);").unwrap();
        let tip = t.find_by_name("123").unwrap();
        assert!(t.node(tip).unwrap().label.is_unset());
        assert!(t.label_set().is_empty());
    }

    #[test]
    fn internal_labels_follow_last_child() {
        let t = parse("((A:1[&states=1],B:1[&states=2]):1,C:2[&states=2]);").unwrap();
        // ')' propagates the last child's label to its parent.
        let a = t.find_by_name("A").unwrap();
        let internal = t.parent_of(a).unwrap();
        assert_eq!(t.node(internal).unwrap().label, Label::new("2"));
    }

    #[test]
    fn states_annotation_sets_and_registers_label() {
        let t = parse("(A:1[&states=3],B:1[&states=4]);").unwrap();
        let a = t.find_by_name("A").unwrap();
        assert_eq!(t.node(a).unwrap().label, Label::new("3"));
        assert!(t.label_set().contains(&Label::new("3")));
        assert!(t.label_set().contains(&Label::new("4")));
    }

    #[test]
    fn location_cluster_compartment_all_set_label() {
        for key in ["location", "cluster", "Compartment"] {
            let s = format!("(A:1[&{}=\"usa\"],B:1);", key);
            let t = parse(&s).unwrap();
            let a = t.find_by_name("A").unwrap();
            assert_eq!(t.node(a).unwrap().label, Label::new("usa"), "key {}", key);
        }
    }

    #[test]
    fn migration_annotation_wraps_branch() {
        let t = parse("(A:1.0[&M 0 1:0.5],B:1.0);").unwrap();
        // One intermediate node added on A's branch.
        assert_eq!(t.node_count(), 4);
        let a = t.find_by_name("A").unwrap();
        let mig = t.parent_of(a).unwrap();
        assert!((t.node(a).unwrap().length - 0.5).abs() < TOL);
        assert!((t.node(mig).unwrap().length - 0.5).abs() < TOL);
        assert_eq!(t.node(mig).unwrap().label, Label::new("1"));
        assert!(t.label_set().contains(&Label::new("1")));
        assert_eq!(t.parent_of(mig), Some(t.root()));
    }

    #[test]
    fn stacked_migration_events_nest() {
        let t = parse("(A:1.0[&M 0 1:0.6,M 1 2:0.3],B:1.0);").unwrap();
        let a = t.find_by_name("A").unwrap();
        let first = t.parent_of(a).unwrap();
        let second = t.parent_of(first).unwrap();
        assert!((t.node(a).unwrap().length - 0.6).abs() < TOL);
        // First wrap held the 0.4 remainder, then was itself split at 0.3.
        assert!((t.node(first).unwrap().length - 0.3).abs() < TOL);
        assert!((t.node(second).unwrap().length - 0.1).abs() < TOL);
        assert_eq!(t.node(first).unwrap().label, Label::new("1"));
        assert_eq!(t.node(second).unwrap().label, Label::new("2"));
    }

    #[test]
    fn antigenic_annotation_sets_traits() {
        let t = parse("(A:1[&antigenic={1.5,-2.5}],B:1);").unwrap();
        let a = t.find_by_name("A").unwrap();
        assert!((t.node(a).unwrap().x - 1.5).abs() < TOL);
        assert!((t.node(a).unwrap().y - (-2.5)).abs() < TOL);
    }

    #[test]
    fn rate_annotation() {
        let t = parse("(A:1[&rate=0.004],B:1);").unwrap();
        let a = t.find_by_name("A").unwrap();
        assert_eq!(t.node(a).unwrap().rate, Some(0.004));
    }

    #[test]
    fn ahtl_sets_hemisphere_label() {
        let t = parse("(A:1[&AHTL=1.0:2.0:-0.5],B:1[&AHTL=1.0:2.0:0.5]);").unwrap();
        let a = t.find_by_name("A").unwrap();
        let b = t.find_by_name("B").unwrap();
        assert_eq!(t.node(a).unwrap().label, Label::new("south"));
        assert_eq!(t.node(b).unwrap().label, Label::new("north"));
        assert!((t.node(a).unwrap().x - 1.0).abs() < TOL);
        assert!((t.node(b).unwrap().y - 2.0).abs() < TOL);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let t = parse("(A:1[&posterior=0.99,height_95%_HPD={1,2}],B:1);").unwrap();
        assert_eq!(t.leaf_count(), 2);
    }

    #[test]
    fn braces_shield_commas_from_field_splitting() {
        // The brace group belongs to an ignored key; the states annotation
        // after it must still apply.
        let t = parse("(A:1[&jumps={0.1,0.7},states=5],B:1);").unwrap();
        let a = t.find_by_name("A").unwrap();
        assert_eq!(t.node(a).unwrap().label, Label::new("5"));
    }

    #[test]
    fn trunk_marked_at_parse() {
        let t = parse("((A:0.5,B:0.5):1,C:2);").unwrap();
        // Only C sits within the most recent 1/100 of the span.
        let c = t.find_by_name("C").unwrap();
        assert!(t.node(c).unwrap().trunk);
        assert!(t.node(t.root()).unwrap().trunk);
        let a = t.find_by_name("A").unwrap();
        assert!(!t.node(a).unwrap().trunk);
    }

    #[test]
    fn roundtrip_preserves_length_and_tips() {
        let input = "((A:1,B:1):1,(C:0.5,D:1.5):0.5);";
        let t = parse(input).unwrap();
        let total: f64 = t
            .preorder()
            .iter()
            .map(|&id| t.node(id).unwrap().length)
            .sum();
        let reparsed = parse(&write(&t)).unwrap();
        let total2: f64 = reparsed
            .preorder()
            .iter()
            .map(|&id| reparsed.node(id).unwrap().length)
            .sum();
        assert!((total - total2).abs() < TOL);
        assert_eq!(t.leaf_count(), reparsed.leaf_count());
    }

    #[test]
    fn roundtrip_keeps_migration_topology() {
        let t = parse("(A:1.0[&M 0 1:0.5],B:1.0);").unwrap();
        let reparsed = parse(&write(&t)).unwrap();
        assert_eq!(reparsed.node_count(), t.node_count());
        assert_eq!(reparsed.leaf_count(), 2);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Strategy for leaf names (letters only, so no digit-derived labels).
    fn leaf_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z]{0,5}"
    }

    /// A caterpillar tree over 2-6 leaves with unit lengths.
    fn simple_newick() -> impl Strategy<Value = String> {
        proptest::collection::vec(leaf_name(), 2..=6).prop_map(|leaves| {
            let mut s = format!("({}:1,{}:1)", leaves[0], leaves[1]);
            for leaf in &leaves[2..] {
                s = format!("({}:1,{}:1)", s, leaf);
            }
            s.push(';');
            s
        })
    }

    proptest! {
        #[test]
        fn roundtrip_preserves_leaf_count(newick in simple_newick()) {
            let t = parse(&newick).unwrap();
            let reparsed = parse(&write(&t)).unwrap();
            prop_assert_eq!(t.leaf_count(), reparsed.leaf_count());
        }

        #[test]
        fn roundtrip_preserves_total_length(newick in simple_newick()) {
            let t = parse(&newick).unwrap();
            let total: f64 = t.preorder().iter()
                .map(|&id| t.node(id).unwrap().length).sum();
            let reparsed = parse(&write(&t)).unwrap();
            let total2: f64 = reparsed.preorder().iter()
                .map(|&id| reparsed.node(id).unwrap().length).sum();
            prop_assert!((total - total2).abs() < 1e-6);
        }

        #[test]
        fn parse_does_not_panic(s in "\\PC{0,80}") {
            let _ = parse(&s);
        }
    }
}
