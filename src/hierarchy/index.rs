use std::collections::HashMap;

use super::node::Node;

/// Preferred axis for scroll-assisted discovery on the captured screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

/// Lookup tables over one captured hierarchy.
///
/// Built once per capture and discarded when the next snapshot replaces it;
/// there is no incremental update. Keys are not assumed unique within a
/// tree: later nodes overwrite earlier ones, which is acceptable because
/// resolution is a best-effort heuristic, not an identity system.
pub struct Index<'a> {
    /// Flat document-order view; for a parsed tree the slot equals `Node::id`.
    pub nodes: Vec<&'a Node>,
    /// Parent slot per node; the owning-chain walk for ancestor promotion
    /// lives here rather than on `Node`.
    pub parent: Vec<Option<usize>>,
    pub by_text: HashMap<String, usize>,
    pub by_resource_key: HashMap<String, usize>,
    pub by_accessibility_label: HashMap<String, usize>,
    /// Keyed by both the full class and its short form, document order.
    pub by_kind: HashMap<String, Vec<usize>>,
    /// Nodes with at least one capability flag set.
    pub interactive: Vec<usize>,
}

impl<'a> Index<'a> {
    /// Build all mappings in one traversal. Pure, O(n) in node count.
    pub fn build(root: &'a Node) -> Index<'a> {
        let mut index = Index {
            nodes: Vec::new(),
            parent: Vec::new(),
            by_text: HashMap::new(),
            by_resource_key: HashMap::new(),
            by_accessibility_label: HashMap::new(),
            by_kind: HashMap::new(),
            interactive: Vec::new(),
        };
        index.visit(root, None);
        index
    }

    fn visit(&mut self, node: &'a Node, parent: Option<usize>) {
        let slot = self.nodes.len();
        self.nodes.push(node);
        self.parent.push(parent);

        if !node.text.is_empty() {
            self.by_text.insert(node.text.clone(), slot);
        }
        if !node.resource_key.is_empty() {
            self.by_resource_key.insert(node.resource_key.clone(), slot);
        }
        if !node.accessibility_label.is_empty() {
            self.by_accessibility_label
                .insert(node.accessibility_label.clone(), slot);
        }
        self.by_kind
            .entry(node.kind.clone())
            .or_default()
            .push(slot);
        if node.short_kind() != node.kind {
            self.by_kind
                .entry(node.short_kind().to_string())
                .or_default()
                .push(slot);
        }
        if node.is_interactive() {
            self.interactive.push(slot);
        }

        for child in &node.children {
            self.visit(child, Some(slot));
        }
    }

    pub fn node(&self, slot: usize) -> &'a Node {
        self.nodes[slot]
    }

    pub fn get(&self, slot: usize) -> Option<&'a Node> {
        self.nodes.get(slot).copied()
    }

    pub fn parent_of(&self, slot: usize) -> Option<usize> {
        self.parent.get(slot).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn interactive_nodes(&self) -> impl Iterator<Item = &'a Node> + '_ {
        self.interactive.iter().map(|&slot| self.nodes[slot])
    }

    /// Direction most likely to reveal more content, inferred from the
    /// first scrollable container class found in document order.
    pub fn scroll_axis(&self) -> ScrollAxis {
        const SCROLL_CLASSES: [&str; 5] = [
            "ScrollView",
            "RecyclerView",
            "ListView",
            "HorizontalScrollView",
            "ViewPager",
        ];

        for node in &self.nodes {
            for class in SCROLL_CLASSES {
                if node.kind.contains(class) {
                    if node.kind.contains("HorizontalScrollView") || node.kind.contains("ViewPager")
                    {
                        return ScrollAxis::Horizontal;
                    }
                    return ScrollAxis::Vertical;
                }
            }
        }
        ScrollAxis::Vertical
    }
}
