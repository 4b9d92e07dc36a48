use serde_json::json;
use tracing::debug;

use super::{Rule, RowInput, RuleContext, RuleKind};
use crate::spec::Component;

/// Replaces the issues of a component that is conditionally hidden: a hidden
/// field may still carry a stale value, which should not fail the
/// submission as if the user could see it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HiddenRule;

impl Rule for HiddenRule {
    fn name(&self) -> &str {
        "hidden"
    }

    fn kind(&self) -> RuleKind {
        RuleKind::Override
    }

    fn applies(&self, component: &Component) -> bool {
        component.data_key().is_some()
    }

    fn check(&self, _cx: &RuleContext<'_>, _row: &RowInput<'_>) -> Result<(), String> {
        Ok(())
    }

    fn override_pending(&self, cx: &RuleContext<'_>, row: &RowInput<'_>) -> Option<String> {
        let visible = cx
            .services
            .resolver
            .is_visible(cx.tree, cx.node, row.row, cx.data, true);
        if visible {
            return None;
        }
        debug!(component = %cx.component, "issues replaced: component is hidden");
        // Fixed catalog text; `customMessage` describes the field's own checks.
        Some(cx.services.messages.render(
            self.name(),
            &json!({ "field": cx.component.display_name() }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{BaseType, RuleServices};
    use crate::spec::ComponentTree;
    use serde_json::Value;

    fn pending(row: Value) -> Option<String> {
        let components: Vec<Component> = serde_json::from_value(json!([
            { "type": "textfield", "key": "name", "label": "Name", "input": true,
              "conditional": { "show": true, "when": "hasName", "eq": "yes" } }
        ]))
        .expect("component");
        let tree = ComponentTree::build(&components);
        let services = RuleServices::default();
        let cx = RuleContext {
            tree: &tree,
            node: 0,
            component: tree.component(0),
            base: BaseType::String,
            data: &row,
            services: &services,
        };
        HiddenRule.override_pending(&cx, &RowInput { row: &row, input: None, path: vec!["name".into()] })
    }

    #[test]
    fn hidden_components_get_a_replacement_message() {
        assert_eq!(
            pending(json!({ "hasName": "no" })),
            Some("Name is conditionally hidden".into())
        );
        assert_eq!(pending(json!({ "hasName": "yes" })), None);
    }
}
