//! Resolves a workflow name plus string parameters into a bound,
//! ready-to-submit [`InvocableUnit`].
//!
//! Name lookup prefers the single registered workflow whose qualified name
//! ends in `.{name}` and otherwise treats the name as fully qualified. Every
//! constructor of the workflow is then tried in declaration order; the first
//! one whose parameters all bind wins. When none binds, the error lists each
//! constructor's signature with the reason it was rejected.

pub mod registry;
mod signature;

use std::sync::Arc;

use ledgerbridge_core::{ArgValue, ConstructorSchema, FieldMap};
use tracing::debug;

pub use registry::{WorkflowCatalog, WorkflowDefinition, WorkflowRegistry};
use signature::{raw_types, Abbreviator};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A workflow with its constructor chosen and its arguments coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocableUnit {
    /// Fully qualified name of the resolved workflow.
    pub workflow_name: String,
    /// Index of the selected constructor in declaration order.
    pub constructor_index: usize,
    /// Bound arguments in the constructor's parameter order.
    pub arguments: Vec<(String, ArgValue)>,
}

impl InvocableUnit {
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&ArgValue> {
        self.arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("Unable to find '{name}' in the workflow registry")]
    ClassNotFound { name: String },
    /// `diagnostics` holds one `signature: reason` entry per constructor,
    /// joined by `"; "`.
    #[error("{diagnostics}")]
    NoMatchingConstructor {
        workflow_name: String,
        diagnostics: String,
    },
}

/// Why a single constructor rejected the parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BindingFailure {
    TooManyParameters,
    MissingParameter(String),
    ReflectionDataMissing,
    Coercion(String),
}

// ---------------------------------------------------------------------------
// InvocationResolver
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct InvocationResolver {
    catalog: Arc<dyn WorkflowCatalog>,
}

impl InvocationResolver {
    #[must_use]
    pub fn new(catalog: Arc<dyn WorkflowCatalog>) -> Self {
        Self { catalog }
    }

    /// Binds `parameters` against the constructors of `workflow_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::ClassNotFound`] if no workflow matches the
    /// name, or [`ResolutionError::NoMatchingConstructor`] if no constructor
    /// accepts the parameters.
    pub fn resolve(
        &self,
        workflow_name: &str,
        parameters: &FieldMap,
    ) -> Result<InvocableUnit, ResolutionError> {
        let qualified = self.qualify(workflow_name);
        let definition =
            self.catalog
                .lookup(&qualified)
                .ok_or_else(|| ResolutionError::ClassNotFound {
                    name: workflow_name.to_string(),
                })?;

        let abbreviator = Abbreviator::new(definition.package_prefix());
        let mut diagnostics = Vec::with_capacity(definition.constructors.len());

        for (index, ctor) in definition.constructors.iter().enumerate() {
            match bind(ctor, parameters) {
                Ok(arguments) => {
                    debug!(
                        workflow = %definition.qualified_name,
                        constructor = index,
                        "bound workflow constructor"
                    );
                    return Ok(InvocableUnit {
                        workflow_name: definition.qualified_name.clone(),
                        constructor_index: index,
                        arguments,
                    });
                }
                Err(failure) => diagnostics.push(describe(&abbreviator, ctor, &failure)),
            }
        }

        if diagnostics.is_empty() {
            diagnostics.push(format!(
                "'{}' declares no constructors",
                definition.qualified_name
            ));
        }

        Err(ResolutionError::NoMatchingConstructor {
            workflow_name: definition.qualified_name.clone(),
            diagnostics: diagnostics.join("; "),
        })
    }

    /// Picks the unique registered name ending in `.{name}`, else `name`.
    fn qualify(&self, name: &str) -> String {
        let suffix = format!(".{name}");
        let mut candidates = self
            .catalog
            .qualified_names()
            .into_iter()
            .filter(|q| q.ends_with(&suffix));
        match (candidates.next(), candidates.next()) {
            (Some(only), None) => only,
            (Some(_), Some(_)) => {
                debug!(name, "ambiguous short workflow name, using it literally");
                name.to_string()
            }
            _ => name.to_string(),
        }
    }
}

/// Binds parameters by name against one constructor.
fn bind(
    ctor: &ConstructorSchema,
    parameters: &FieldMap,
) -> Result<Vec<(String, ArgValue)>, BindingFailure> {
    let names = ctor
        .param_names()
        .ok_or(BindingFailure::ReflectionDataMissing)?;

    if parameters.len() > ctor.arity() {
        return Err(BindingFailure::TooManyParameters);
    }

    let mut arguments = Vec::with_capacity(ctor.arity());
    for (name, def) in names.into_iter().zip(&ctor.params) {
        let raw = parameters
            .get(name)
            .ok_or_else(|| BindingFailure::MissingParameter(name.to_string()))?;
        let value = def
            .ty
            .coerce(raw)
            .map_err(|e| BindingFailure::Coercion(format!("parameter {name}: {e}")))?;
        arguments.push((name.to_string(), value));
    }
    Ok(arguments)
}

fn describe(abbreviator: &Abbreviator<'_>, ctor: &ConstructorSchema, failure: &BindingFailure) -> String {
    match failure {
        BindingFailure::TooManyParameters => {
            format!("{}: too many parameters", abbreviator.prototype(ctor))
        }
        BindingFailure::MissingParameter(name) => {
            format!("{}: missing parameter {name}", abbreviator.prototype(ctor))
        }
        BindingFailure::ReflectionDataMissing => {
            format!("{}: <constructor missing parameter reflection data>", raw_types(ctor))
        }
        BindingFailure::Coercion(message) => format!("{}: {message}", raw_types(ctor)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use ledgerbridge_core::{ParamDef, ParamType};

    use super::*;

    fn simple_with_input() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "com.x.SimpleFlowWithInput",
            vec![ConstructorSchema::new(vec![
                ParamDef::new("a", ParamType::String),
                ParamDef::new("b", ParamType::Int),
                ParamDef::new("c", ParamType::Float),
                ParamDef::new("d", ParamType::Boolean),
            ])],
        )
    }

    fn resolver(defs: Vec<WorkflowDefinition>) -> InvocationResolver {
        let registry = WorkflowRegistry::new();
        for def in defs {
            registry.register(def);
        }
        InvocationResolver::new(Arc::new(registry))
    }

    #[test]
    fn resolves_zero_argument_workflow_by_qualified_name() {
        let r = resolver(vec![WorkflowDefinition::new(
            "com.x.SimpleFlow",
            vec![ConstructorSchema::empty()],
        )]);
        let unit = r.resolve("com.x.SimpleFlow", &FieldMap::new()).unwrap();
        assert_eq!(unit.workflow_name, "com.x.SimpleFlow");
        assert!(unit.arguments.is_empty());
    }

    #[test]
    fn resolves_short_name_by_unique_suffix() {
        let r = resolver(vec![WorkflowDefinition::new(
            "com.x.SimpleFlow",
            vec![ConstructorSchema::empty()],
        )]);
        let unit = r.resolve("SimpleFlow", &FieldMap::new()).unwrap();
        assert_eq!(unit.workflow_name, "com.x.SimpleFlow");
    }

    #[test]
    fn ambiguous_short_name_falls_back_to_literal_lookup() {
        let r = resolver(vec![
            WorkflowDefinition::new("com.x.SimpleFlow", vec![ConstructorSchema::empty()]),
            WorkflowDefinition::new("com.y.SimpleFlow", vec![ConstructorSchema::empty()]),
        ]);
        let err = r.resolve("SimpleFlow", &FieldMap::new()).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::ClassNotFound {
                name: "SimpleFlow".into()
            }
        );
    }

    #[test]
    fn unknown_workflow_is_class_not_found() {
        let r = resolver(vec![]);
        let err = r.resolve("com.nowhere.SimpleFlow", &FieldMap::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to find 'com.nowhere.SimpleFlow' in the workflow registry"
        );
    }

    #[test]
    fn binds_and_coerces_typed_parameters() {
        let r = resolver(vec![simple_with_input()]);
        let params = FieldMap::from([("a", "hello"), ("b", "123"), ("c", "1.23"), ("d", "true")]);
        let unit = r.resolve("SimpleFlowWithInput", &params).unwrap();
        assert_eq!(unit.argument("a"), Some(&ArgValue::String("hello".into())));
        assert_eq!(unit.argument("b"), Some(&ArgValue::Int(123)));
        assert_eq!(unit.argument("c"), Some(&ArgValue::Float(1.23)));
        assert_eq!(unit.argument("d"), Some(&ArgValue::Boolean(true)));
    }

    #[test]
    fn empty_strings_bind_to_zero_values() {
        let r = resolver(vec![simple_with_input()]);
        let params = FieldMap::from([("a", ""), ("b", ""), ("c", ""), ("d", "")]);
        let unit = r.resolve("SimpleFlowWithInput", &params).unwrap();
        assert_eq!(unit.argument("b"), Some(&ArgValue::Int(0)));
        assert_eq!(unit.argument("d"), Some(&ArgValue::Boolean(false)));
    }

    #[test]
    fn unparseable_value_reports_aggregate_diagnostic() {
        let r = resolver(vec![simple_with_input()]);
        let params = FieldMap::from([("a", "hello"), ("b", "a123"), ("c", "1.23"), ("d", "true")]);
        let err = r.resolve("SimpleFlowWithInput", &params).unwrap_err();
        let ResolutionError::NoMatchingConstructor { diagnostics, .. } = err else {
            panic!("expected NoMatchingConstructor");
        };
        assert!(diagnostics.starts_with(
            "[std.String, std.Int, std.Float, std.Boolean]: parameter b: cannot parse 'a123' as std.Int"
        ));
    }

    #[test]
    fn first_binding_constructor_wins() {
        let r = resolver(vec![WorkflowDefinition::new(
            "com.x.Overloaded",
            vec![
                ConstructorSchema::new(vec![ParamDef::new("a", ParamType::String)]),
                ConstructorSchema::new(vec![
                    ParamDef::new("a", ParamType::String),
                    ParamDef::new("b", ParamType::optional(ParamType::Int)),
                ]),
            ],
        )]);
        let unit = r
            .resolve("Overloaded", &FieldMap::from([("a", "x")]))
            .unwrap();
        assert_eq!(unit.constructor_index, 0);
    }

    #[test]
    fn later_constructor_binds_when_earlier_ones_fail() {
        let r = resolver(vec![WorkflowDefinition::new(
            "com.x.Overloaded",
            vec![
                ConstructorSchema::new(vec![ParamDef::new("a", ParamType::String)]),
                ConstructorSchema::new(vec![
                    ParamDef::new("a", ParamType::String),
                    ParamDef::new("b", ParamType::Int),
                ]),
            ],
        )]);
        let unit = r
            .resolve("Overloaded", &FieldMap::from([("a", "x"), ("b", "2")]))
            .unwrap();
        assert_eq!(unit.constructor_index, 1);
    }

    #[test]
    fn diagnostics_cover_every_constructor() {
        let r = resolver(vec![WorkflowDefinition::new(
            "com.x.Overloaded",
            vec![
                ConstructorSchema::new(vec![ParamDef::new("a", ParamType::String)]),
                ConstructorSchema::new(vec![
                    ParamDef::new("a", ParamType::String),
                    ParamDef::new("b", ParamType::Int),
                ]),
                ConstructorSchema::new(vec![ParamDef::unnamed(ParamType::Party)]),
            ],
        )]);
        let err = r
            .resolve("Overloaded", &FieldMap::from([("a", "x"), ("c", "y")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "[a: String]: too many parameters; \
             [a: String, b: Int]: missing parameter b; \
             [ledger.core.Party]: <constructor missing parameter reflection data>"
        );
    }

    #[test]
    fn workflow_without_constructors_cannot_bind() {
        let r = resolver(vec![WorkflowDefinition::new("com.x.Abstract", vec![])]);
        let err = r.resolve("Abstract", &FieldMap::new()).unwrap_err();
        assert!(matches!(err, ResolutionError::NoMatchingConstructor { .. }));
    }
}
