//! Arena-backed tree of command paths, used for discovery.

use std::collections::BTreeMap;

/// Index of a node inside a [`CommandTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct TreeNode {
    segment: String,
    path: String,
    children: BTreeMap<String, NodeId>,
    command: Option<usize>,
}

impl TreeNode {
    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Catalog index of the command registered at exactly this path.
    pub fn command(&self) -> Option<usize> {
        self.command
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CommandTree {
    nodes: Vec<TreeNode>,
}

impl Default for CommandTree {
    fn default() -> Self {
        Self {
            nodes: vec![TreeNode {
                segment: String::new(),
                path: String::from("/"),
                children: BTreeMap::new(),
                command: None,
            }],
        }
    }
}

impl CommandTree {
    pub const ROOT: NodeId = NodeId(0);

    pub(crate) fn insert(&mut self, path: &str, command: usize) {
        let mut current = Self::ROOT;
        let mut prefix = String::new();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
            current = match self.nodes[current.0].children.get(segment) {
                Some(child) => *child,
                None => {
                    let child = NodeId(self.nodes.len());
                    self.nodes.push(TreeNode {
                        segment: segment.to_owned(),
                        path: prefix.clone(),
                        children: BTreeMap::new(),
                        command: None,
                    });
                    self.nodes[current.0]
                        .children
                        .insert(segment.to_owned(), child);
                    child
                }
            };
        }
        self.nodes[current.0].command = Some(command);
    }

    /// Node at `path`; `"/"` and `""` name the root.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut current = Self::ROOT;
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current = *self.nodes.get(current.0)?.children.get(segment)?;
        }
        Some(current)
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    pub fn children(&self, id: NodeId) -> Vec<(NodeId, &TreeNode)> {
        self.node(id)
            .map(|node| {
                node.children
                    .values()
                    .filter_map(|child| self.node(*child).map(|found| (*child, found)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Catalog indices of every command at or below `id`, in path order.
    pub fn commands_under(&self, id: NodeId) -> Vec<usize> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.node(next) else {
                continue;
            };
            found.extend(node.command);
            stack.extend(node.children.values().rev().copied());
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> CommandTree {
        let mut tree = CommandTree::default();
        tree.insert("/fixedincome/rate/sofr", 0);
        tree.insert("/equity/price/historical", 1);
        tree.insert("/equity/price/quote", 2);
        tree
    }

    #[test]
    fn finds_nodes_by_path() {
        let tree = tree();
        let node = tree.find("/equity/price").expect("interior node exists");
        let names: Vec<&str> = tree
            .children(node)
            .into_iter()
            .map(|(_, child)| child.segment())
            .collect();
        assert_eq!(names, vec!["historical", "quote"]);
        assert!(tree.find("/equity/fundamental").is_none());
        assert_eq!(tree.find("/"), Some(CommandTree::ROOT));
    }

    #[test]
    fn commands_under_walks_in_path_order() {
        let tree = tree();
        assert_eq!(tree.commands_under(CommandTree::ROOT), vec![1, 2, 0]);
        let equity = tree.find("/equity").expect("equity");
        assert_eq!(tree.commands_under(equity), vec![1, 2]);
        let leaf = tree.find("/fixedincome/rate/sofr").expect("leaf");
        assert_eq!(
            tree.node(leaf).map(TreeNode::path),
            Some("/fixedincome/rate/sofr")
        );
    }
}
