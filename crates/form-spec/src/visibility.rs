use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::conditional;
use crate::config::EngineConfig;
use crate::sandbox::{Bindings, Sandbox};
use crate::spec::{ComponentTree, NodeId};

/// Data path -> visible, for every keyed component.
pub type VisibilityMap = BTreeMap<String, bool>;

/// Decides whether a component is shown for a given row.
///
/// Every failure while evaluating a conditional leaves the component
/// visible: a broken script must not be able to hide a field for good.
#[derive(Debug, Clone)]
pub struct VisibilityResolver {
    sandbox: Sandbox,
    timeout: Duration,
}

impl Default for VisibilityResolver {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl VisibilityResolver {
    pub fn new(sandbox: Sandbox, timeout: Duration) -> Self {
        Self { sandbox, timeout }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Sandbox::new(config.max_script_depth),
            config.conditional_timeout(),
        )
    }

    /// Visibility of `node` for `row`. With `recurse`, every ancestor up to
    /// the enclosing nested form (or the root) must be visible too.
    /// Components without a key are always visible.
    pub fn is_visible(
        &self,
        tree: &ComponentTree<'_>,
        node: NodeId,
        row: &Value,
        data: &Value,
        recurse: bool,
    ) -> bool {
        if tree.component(node).data_key().is_none() {
            return true;
        }
        if !self.is_visible_locally(tree, node, row, data) {
            return false;
        }
        if !recurse {
            return true;
        }
        let mut ancestor = tree.parent(node);
        while let Some(id) = ancestor {
            if tree.component(id).kind == "form" {
                break;
            }
            if !self.is_visible_locally(tree, id, row, data) {
                return false;
            }
            ancestor = tree.parent(id);
        }
        true
    }

    fn is_visible_locally(
        &self,
        tree: &ComponentTree<'_>,
        node: NodeId,
        row: &Value,
        data: &Value,
    ) -> bool {
        let component = tree.component(node);
        if component.data_key().is_none() {
            return true;
        }

        if let Some(script) = component.custom_conditional() {
            let mut bindings = Bindings::new();
            bindings.insert_json("data", data).insert_json("row", row);
            return match self.sandbox.execute(script, bindings, self.timeout) {
                Ok(scope) => match scope.get_json("show") {
                    Some(Value::Bool(show)) => show,
                    _ => true,
                },
                Err(err) => {
                    warn!(component = %component, error = %err, "customConditional failed; treating as visible");
                    true
                }
            };
        }

        match component.conditional.as_ref() {
            Some(cond) => match conditional::evaluate(cond, row, data) {
                Ok(decision) => decision.unwrap_or(true),
                Err(err) => {
                    warn!(component = %component, error = %err, "conditional failed; treating as visible");
                    true
                }
            },
            None => true,
        }
    }
}

/// Visibility of every keyed component against top-level `data`, keyed by
/// data path. Components inside repeating containers are evaluated against
/// the top-level row.
pub fn resolve_visibility(
    resolver: &VisibilityResolver,
    tree: &ComponentTree<'_>,
    data: &Value,
) -> VisibilityMap {
    let mut map = VisibilityMap::new();
    for node in tree.pre_order() {
        if tree.component(node).data_key().is_none() {
            continue;
        }
        let visible = resolver.is_visible(tree, node, data, data, true);
        debug!(path = %tree.node(node).data_path, visible, "resolved visibility");
        map.insert(tree.node(node).data_path.clone(), visible);
    }
    map
}
