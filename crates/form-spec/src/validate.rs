use serde_json::Value;
use tracing::{debug, info, info_span};

use crate::base::BaseValidator;
use crate::config::EngineConfig;
use crate::error::{ConfigError, ValidateError};
use crate::issue::ValidationIssue;
use crate::rules::{BaseType, RowInput, RuleContext, RuleKind, RuleRegistry, RuleServices};
use crate::schema_check::validate_schema;
use crate::spec::{ComponentTree, DataNesting, FormSchema, NodeId, Submission, UserContext};
use crate::visibility::{VisibilityMap, resolve_visibility};

/// Object whose entries are the values of the components at one level of
/// nesting, plus the issue path leading to it.
#[derive(Debug, Clone)]
struct Scope<'v> {
    row: &'v Value,
    path: Vec<String>,
}

/// Validates submissions against form schemas.
///
/// Immutable once built; one instance can serve any number of concurrent
/// calls.
#[derive(Debug, Clone)]
pub struct Validator {
    config: EngineConfig,
    registry: RuleRegistry,
    services: RuleServices,
    base: BaseValidator,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            registry: RuleRegistry::standard(),
            services: RuleServices::default(),
            base: BaseValidator::new(),
        }
    }
}

impl Validator {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let services = RuleServices::from_config(&config)?;
        Ok(Self {
            config,
            registry: RuleRegistry::standard(),
            services,
            base: BaseValidator::new(),
        })
    }

    pub fn with_registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut RuleRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Issues for `submission` against `schema`; empty means valid.
    ///
    /// A submission without a `data` object yields the single `required`
    /// issue for `data` and nothing else.
    pub fn validate(
        &self,
        schema: &Value,
        submission: &Submission,
        user: &UserContext,
    ) -> Vec<ValidationIssue> {
        self.try_validate(schema, submission, user)
            .unwrap_or_else(|err| vec![err.into_issue()])
    }

    pub fn try_validate(
        &self,
        schema: &Value,
        submission: &Submission,
        user: &UserContext,
    ) -> Result<Vec<ValidationIssue>, ValidateError> {
        let form = FormSchema::from_value(schema);
        let span = info_span!(
            "validate",
            form = %form.name,
            user = user.id.as_deref().unwrap_or("anonymous"),
            roles = ?user.roles
        );
        let _enter = span.enter();

        let data = submission
            .data_object()
            .ok_or(ValidateError::MissingSubmissionData)?;

        let mut issues = validate_schema(schema).issues;
        let structural = issues.len();

        let tree = ComponentTree::build(&form.components);
        let top = [Scope {
            row: data,
            path: Vec::new(),
        }];
        for &root in tree.roots() {
            self.walk(&tree, root, &top, data, &mut issues);
        }

        if self.config.drop_hidden_issues {
            issues.retain(|issue| !issue.is_hidden());
        }
        info!(
            structural,
            field = issues.len().saturating_sub(structural),
            "validation finished"
        );
        Ok(issues)
    }

    /// Visibility of every keyed component of `schema` for `data`.
    pub fn visibility(&self, schema: &Value, data: &Value) -> VisibilityMap {
        let form = FormSchema::from_value(schema);
        let tree = ComponentTree::build(&form.components);
        resolve_visibility(&self.services.resolver, &tree, data)
    }

    fn walk<'v>(
        &self,
        tree: &ComponentTree<'_>,
        node: NodeId,
        scopes: &[Scope<'v>],
        data: &Value,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let component = tree.component(node);
        if component.is_data_bearing() {
            issues.extend(self.check_component(tree, node, scopes, data));
        }

        let nested;
        let child_scopes = match (component.data_key(), component.data_nesting()) {
            (Some(key), Some(nesting)) => {
                nested = nested_scopes(key, nesting, scopes);
                nested.as_slice()
            }
            _ => scopes,
        };
        for &child in &tree.node(node).children {
            self.walk(tree, child, child_scopes, data, issues);
        }
    }

    /// Base checks, then registry rules in order, then override rules when
    /// anything is pending.
    fn check_component(
        &self,
        tree: &ComponentTree<'_>,
        node: NodeId,
        scopes: &[Scope<'_>],
        data: &Value,
    ) -> Vec<ValidationIssue> {
        let component = tree.component(node);
        let Some(key) = component.data_key() else {
            return Vec::new();
        };
        let base = BaseType::for_component(component);
        let cx = RuleContext {
            tree,
            node,
            component,
            base,
            data,
            services: &self.services,
        };
        let rows: Vec<RowInput<'_>> = scopes
            .iter()
            .map(|scope| {
                let mut path = scope.path.clone();
                path.push(key.to_string());
                RowInput {
                    row: scope.row,
                    input: scope.row.get(key),
                    path,
                }
            })
            .collect();

        let mut issues = Vec::new();
        let mut first_failing: Option<usize> = None;
        for (index, row) in rows.iter().enumerate() {
            let found = self.base.check(&cx, row);
            if !found.is_empty() {
                first_failing.get_or_insert(index);
            }
            issues.extend(found);
        }

        let rules = self.registry.rules_for(base);
        for rule in rules
            .iter()
            .filter(|rule| rule.kind() == RuleKind::Check && rule.applies(component))
        {
            // Rules see values only; absent entries are left to `required`.
            let failure = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| row.input.is_some())
                .find_map(|(index, row)| rule.check(&cx, row).err().map(|message| (index, message)));
            if let Some((index, message)) = failure {
                debug!(component = %component, rule = rule.name(), row = index, "rule failed");
                issues.push(ValidationIssue::new(
                    base.issue_type(rule.name()),
                    message,
                    rows[index].path.clone(),
                ));
                first_failing.get_or_insert(index);
            }
        }

        if let Some(index) = first_failing {
            let replacement = rules
                .iter()
                .filter(|rule| rule.kind() == RuleKind::Override && rule.applies(component))
                .find_map(|rule| {
                    rule.override_pending(&cx, &rows[index])
                        .map(|message| (rule.name().to_string(), message))
                });
            if let Some((name, message)) = replacement {
                issues = vec![ValidationIssue::new(
                    base.issue_type(&name),
                    message,
                    rows[index].path.clone(),
                )];
            }
        }
        issues
    }
}

/// Scopes for the children of a data-nesting component keyed `key`.
fn nested_scopes<'v>(key: &str, nesting: DataNesting, scopes: &[Scope<'v>]) -> Vec<Scope<'v>> {
    let mut nested = Vec::new();
    for scope in scopes {
        let Some(value) = scope.row.get(key) else {
            continue;
        };
        let mut path = scope.path.clone();
        path.push(key.to_string());
        match nesting {
            DataNesting::Rows => {
                if let Value::Array(rows) = value {
                    for (index, row) in rows.iter().enumerate() {
                        let mut row_path = path.clone();
                        row_path.push(index.to_string());
                        nested.push(Scope {
                            row,
                            path: row_path,
                        });
                    }
                }
            }
            DataNesting::Object => {
                if value.is_object() {
                    nested.push(Scope { row: value, path });
                }
            }
            DataNesting::Subform => {
                if let Some(inner) = value.get("data").filter(|inner| inner.is_object()) {
                    path.push("data".to_string());
                    nested.push(Scope { row: inner, path });
                }
            }
        }
    }
    nested
}

/// [`Validator::validate`] with the default configuration.
pub fn validate(
    schema: &Value,
    submission: &Submission,
    user: &UserContext,
) -> Vec<ValidationIssue> {
    Validator::default().validate(schema, submission, user)
}
