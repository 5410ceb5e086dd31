//! Merkle tree over snapshot entries.
//!
//! A [`Tree`] owns its children outright, keyed by name in a `BTreeMap`, so
//! iteration is always in lexicographic order and two trees with the same
//! children serialize to the same bytes. Identifiers are assigned bottom-up:
//! a tree's identifier is the hash of its serialized children, which in turn
//! embed the identifiers of nested trees.

use crate::{Entry, Mode, ObjectId};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A child of a tree: either a file or a nested directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Entry(Entry),
    Tree(Tree),
}

impl Node {
    pub fn mode(&self) -> Mode {
        match self {
            Node::Entry(entry) => entry.mode(),
            Node::Tree(_) => Mode::Tree,
        }
    }

    pub fn id(&self) -> ObjectId {
        match self {
            Node::Entry(entry) => entry.id(),
            Node::Tree(tree) => tree.id(),
        }
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Node::Entry(entry) => Some(entry),
            Node::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Node::Tree(tree) => Some(tree),
            Node::Entry(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    name: String,
    id: ObjectId,
    children: BTreeMap<String, Node>,
}

impl Tree {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: ObjectId::from_data(&[]),
            children: BTreeMap::new(),
        }
    }

    /// Builds a sealed tree from entries. Later entries win on key collisions.
    pub fn build<I: IntoIterator<Item = Entry>>(entries: I) -> Self {
        let mut builder = TreeBuilder::new();
        for entry in entries {
            builder.insert(entry);
        }
        builder.finish()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    /// Looks up a node by slash-separated path relative to this tree.
    pub fn get(&self, path: &str) -> Option<&Node> {
        let mut segments = path.split('/');
        let mut node = self.children.get(segments.next()?)?;
        for segment in segments {
            node = node.as_tree()?.children.get(segment)?;
        }
        Some(node)
    }

    /// Canonical rendering: one `"<mode> <name> <id>\n"` line per child,
    /// sorted by name.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = String::new();
        for (name, node) in &self.children {
            buf.push_str(node.mode().as_str());
            buf.push(' ');
            buf.push_str(name);
            buf.push(' ');
            buf.push_str(&node.id().to_hex());
            buf.push('\n');
        }
        buf.into_bytes()
    }

    /// Visits every tree post-order: children before their parent.
    pub fn traverse<F: FnMut(&Tree)>(&self, f: &mut F) {
        for node in self.children.values() {
            if let Node::Tree(tree) = node {
                tree.traverse(f);
            }
        }
        f(self);
    }

    fn traverse_mut<F: FnMut(&mut Tree)>(&mut self, f: &mut F) {
        for node in self.children.values_mut() {
            if let Node::Tree(tree) = node {
                tree.traverse_mut(f);
            }
        }
        f(self);
    }

    /// All leaves in canonical order.
    pub fn entries(&self) -> Vec<&Entry> {
        let mut out = Vec::new();
        self.collect_entries(&mut out);
        out
    }

    fn collect_entries<'a>(&'a self, out: &mut Vec<&'a Entry>) {
        for node in self.children.values() {
            match node {
                Node::Entry(entry) => out.push(entry),
                Node::Tree(tree) => tree.collect_entries(out),
            }
        }
    }

    /// Number of leaves beneath this tree.
    pub fn len(&self) -> usize {
        self.children
            .values()
            .map(|node| match node {
                Node::Entry(_) => 1,
                Node::Tree(tree) => tree.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compares the leaves of two trees by path and identifier.
    pub fn diff(&self, other: &Tree) -> TreeDiff {
        if self.id == other.id {
            return TreeDiff::default();
        }

        // A leaf is modified when either its content or its mode changed.
        let ours: HashMap<&str, (ObjectId, Mode)> = self
            .entries()
            .into_iter()
            .map(|e| (e.name(), (e.id(), e.mode())))
            .collect();
        let theirs: HashMap<&str, (ObjectId, Mode)> = other
            .entries()
            .into_iter()
            .map(|e| (e.name(), (e.id(), e.mode())))
            .collect();

        let mut diff = TreeDiff::default();
        for (path, leaf) in &theirs {
            match ours.get(path) {
                None => diff.added.push(path.to_string()),
                Some(old) if old != leaf => diff.modified.push(path.to_string()),
                _ => {}
            }
        }
        for path in ours.keys() {
            if !theirs.contains_key(path) {
                diff.removed.push(path.to_string());
            }
        }

        diff.added.sort();
        diff.removed.sort();
        diff.modified.sort();
        diff
    }

    fn subtree_mut(&mut self, name: &str) -> &mut Tree {
        let slot = self
            .children
            .entry(name.to_string())
            .or_insert_with(|| Node::Tree(Tree::empty(name)));

        if matches!(slot, Node::Entry(_)) {
            debug!(directory = name, "later entry replaces file with directory");
            *slot = Node::Tree(Tree::empty(name));
        }

        match slot {
            Node::Tree(tree) => tree,
            Node::Entry(_) => unreachable!("slot was just replaced by a tree"),
        }
    }
}

/// Leaf-level differences between two trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Incrementally places entries into a tree, then seals it by assigning
/// identifiers bottom-up.
#[derive(Debug)]
pub struct TreeBuilder {
    root: Tree,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            root: Tree::empty(""),
        }
    }

    /// Inserts an entry under its parent directories, creating them as needed.
    /// An existing node under the same key is replaced.
    pub fn insert(&mut self, entry: Entry) {
        let (dirs, key) = match entry.name().rsplit_once('/') {
            Some((dirs, key)) => (Some(dirs.to_string()), key.to_string()),
            None => (None, entry.name().to_string()),
        };

        let mut parent = &mut self.root;
        if let Some(dirs) = dirs.as_deref() {
            for segment in dirs.split('/') {
                parent = parent.subtree_mut(segment);
            }
        }

        if let Some(previous) = parent.children.insert(key, Node::Entry(entry)) {
            debug!(previous = %previous.id(), "later entry replaces earlier node");
        }
    }

    pub fn finish(mut self) -> Tree {
        self.root.traverse_mut(&mut |tree| {
            tree.id = ObjectId::from_data(&tree.serialize());
        });
        self.root
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, data: &str) -> Entry {
        Entry::new(name, Mode::File, data.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn builds_nested_layout() {
        let tree = Tree::build(vec![file("config/.env", "A=1"), file("config/db/.env", "B=2")]);

        assert_eq!(tree.children().count(), 1);
        let config = tree.child("config").and_then(Node::as_tree).unwrap();
        assert_eq!(config.name(), "config");

        let env = config.child(".env").and_then(Node::as_entry).unwrap();
        assert_eq!(env.id(), ObjectId::from_data(b"A=1"));

        let db = config.child("db").and_then(Node::as_tree).unwrap();
        let db_env = db.child(".env").and_then(Node::as_entry).unwrap();
        assert_eq!(db_env.id(), ObjectId::from_data(b"B=2"));

        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn root_id_ignores_input_order() {
        let forward = Tree::build(vec![file("config/.env", "A=1"), file("config/db/.env", "B=2")]);
        let reversed = Tree::build(vec![file("config/db/.env", "B=2"), file("config/.env", "A=1")]);

        assert_eq!(forward.id(), reversed.id());
        assert_eq!(forward.serialize(), reversed.serialize());
    }

    #[test]
    fn serialization_is_sorted_by_name() {
        let tree = Tree::build(vec![file("b", "2"), file("a", "1"), file("c/d", "3")]);
        let text = String::from_utf8(tree.serialize()).unwrap();
        let names: Vec<&str> = text
            .lines()
            .map(|line| line.split(' ').nth(1).unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let c = tree.child("c").unwrap();
        let expected_line = format!("40000 c {}", c.id());
        assert!(text.lines().any(|line| line == expected_line));
    }

    #[test]
    fn tree_id_hashes_serialized_children() {
        let tree = Tree::build(vec![file("x/y", "1")]);
        let x = tree.child("x").and_then(Node::as_tree).unwrap();
        assert_eq!(x.id(), ObjectId::from_data(&x.serialize()));
        assert_eq!(tree.id(), ObjectId::from_data(&tree.serialize()));
    }

    #[test]
    fn identical_subtrees_share_identifiers() {
        let tree = Tree::build(vec![file("one/.env", "A=1"), file("two/.env", "A=1")]);
        assert_eq!(tree.get("one").unwrap().id(), tree.get("two").unwrap().id());
    }

    #[test]
    fn later_entry_wins_on_same_key() {
        let tree = Tree::build(vec![file("a/b.txt", "first"), file("a/b.txt", "second")]);
        let entry = tree.get("a/b.txt").and_then(Node::as_entry).unwrap();
        assert_eq!(entry.data(), b"second");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn later_directory_replaces_earlier_file() {
        let tree = Tree::build(vec![file("a", "file"), file("a/b", "nested")]);
        assert!(tree.get("a").unwrap().as_tree().is_some());
        assert_eq!(tree.len(), 1);

        let tree = Tree::build(vec![file("a/b", "nested"), file("a", "file")]);
        assert_eq!(tree.get("a").unwrap().as_entry().unwrap().data(), b"file");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn traversal_is_post_order() {
        let tree = Tree::build(vec![file("a/b/c", "1"), file("d", "2")]);
        let mut seen = Vec::new();
        tree.traverse(&mut |t: &Tree| seen.push(t.name().to_string()));
        assert_eq!(seen, vec!["b", "a", ""]);
    }

    #[test]
    fn diff_reports_changes() {
        let old = Tree::build(vec![file("a", "1"), file("b", "2"), file("c/d", "3")]);
        let new = Tree::build(vec![file("a", "1"), file("b", "changed"), file("e", "4")]);

        let diff = old.diff(&new);
        assert_eq!(diff.added, vec!["e"]);
        assert_eq!(diff.removed, vec!["c/d"]);
        assert_eq!(diff.modified, vec!["b"]);
        assert!(old.diff(&old.clone()).is_empty());
    }

    #[test]
    fn diff_reports_mode_only_change() {
        let plain = Tree::build(vec![file("run.sh", "x")]);
        let executable = Tree::build(vec![
            Entry::new("run.sh", Mode::Executable, b"x".to_vec()).unwrap(),
        ]);

        assert_ne!(plain.id(), executable.id());
        let diff = plain.diff(&executable);
        assert_eq!(diff.modified, vec!["run.sh"]);
        assert!(diff.added.is_empty() && diff.removed.is_empty());
    }

    #[test]
    fn empty_tree_has_stable_id() {
        let empty = Tree::build(Vec::new());
        assert!(empty.is_empty());
        assert_eq!(empty.id(), ObjectId::from_data(b""));
    }
}
