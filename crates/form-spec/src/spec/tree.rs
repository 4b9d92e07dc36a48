use crate::spec::component::Component;

/// Index of a node inside a [`ComponentTree`].
pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct TreeNode<'a> {
    pub component: &'a Component,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Dotted key path through data-nesting ancestors (containers, grids,
    /// nested forms); layout components do not contribute a segment.
    pub data_path: String,
}

/// Flattened view of a component tree with parent links.
///
/// Nodes are stored in depth-first pre-order, so iterating ids in ascending
/// order visits the tree in document order.
#[derive(Debug, Clone, Default)]
pub struct ComponentTree<'a> {
    nodes: Vec<TreeNode<'a>>,
    roots: Vec<NodeId>,
}

impl<'a> ComponentTree<'a> {
    pub fn build(components: &'a [Component]) -> Self {
        let mut tree = ComponentTree::default();
        for component in components {
            let id = tree.insert(component, None, "");
            tree.roots.push(id);
        }
        tree
    }

    fn insert(&mut self, component: &'a Component, parent: Option<NodeId>, prefix: &str) -> NodeId {
        let data_path = match component.data_key() {
            Some(key) if prefix.is_empty() => key.to_string(),
            Some(key) => format!("{}.{}", prefix, key),
            None => prefix.to_string(),
        };
        let child_prefix = if component.data_nesting().is_some() {
            data_path.clone()
        } else {
            prefix.to_string()
        };

        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            component,
            parent,
            children: Vec::new(),
            data_path,
        });
        for child in component.children() {
            let child_id = self.insert(child, Some(id), &child_prefix);
            self.nodes[id].children.push(child_id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> &TreeNode<'a> {
        &self.nodes[id]
    }

    pub fn component(&self, id: NodeId) -> &'a Component {
        self.nodes[id].component
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// All node ids in pre-order.
    pub fn pre_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        0..self.nodes.len()
    }

    /// Data paths of input components, in pre-order.
    pub fn input_paths(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| node.component.input && node.component.key.is_some())
            .map(|node| node.data_path.as_str())
            .collect()
    }

    pub fn find_by_path(&self, data_path: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.component.data_key().is_some() && node.data_path == data_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn components(value: serde_json::Value) -> Vec<Component> {
        serde_json::from_value(value).expect("components")
    }

    #[test]
    fn parent_links_and_data_paths() {
        let components = components(json!([
            { "type": "textfield", "key": "name", "input": true },
            { "type": "panel", "key": "page1", "components": [
                { "type": "datagrid", "key": "people", "input": true, "components": [
                    { "type": "textfield", "key": "first", "input": true }
                ]}
            ]}
        ]));
        let tree = ComponentTree::build(&components);

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots(), &[0, 1]);
        assert_eq!(tree.parent(3), Some(2));
        assert_eq!(tree.parent(2), Some(1));
        assert_eq!(tree.parent(0), None);
        assert_eq!(tree.input_paths(), vec!["name", "people", "people.first"]);
        assert_eq!(tree.find_by_path("people.first"), Some(3));
    }

    #[test]
    fn subform_children_are_prefixed() {
        let components = components(json!([
            { "type": "form", "key": "child", "input": true, "components": [
                { "type": "email", "key": "email", "input": true }
            ]}
        ]));
        let tree = ComponentTree::build(&components);
        assert_eq!(tree.node(1).data_path, "child.email");
    }
}
