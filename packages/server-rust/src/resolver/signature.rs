//! Printable constructor signatures for binding diagnostics.

use ledgerbridge_core::ConstructorSchema;

/// Prefixes that are shortened to their last path segment.
const ABBREVIATED_PREFIXES: &[&str] = &["std.", "ledger.core."];

/// Shortens type names from the standard prefixes and from the workflow's
/// own package.
pub(crate) struct Abbreviator<'a> {
    own_package: Option<&'a str>,
}

impl<'a> Abbreviator<'a> {
    pub(crate) fn new(own_package: Option<&'a str>) -> Self {
        Self { own_package }
    }

    fn should_abbreviate(&self, name: &str) -> bool {
        ABBREVIATED_PREFIXES.iter().any(|p| name.starts_with(p))
            || self.own_package.is_some_and(|p| name.starts_with(p))
    }

    pub(crate) fn abbreviate(&self, name: &str) -> String {
        if self.should_abbreviate(name) {
            name.rsplit('.').next().unwrap_or(name).to_string()
        } else {
            name.to_string()
        }
    }

    /// `[a: String, b: Int]`. Unnamed parameters render as `?`.
    pub(crate) fn prototype(&self, ctor: &ConstructorSchema) -> String {
        let rendered: Vec<String> = ctor
            .params
            .iter()
            .map(|p| {
                let ty = p.ty.render(&|n| self.abbreviate(n));
                format!("{}: {ty}", p.name.as_deref().unwrap_or("?"))
            })
            .collect();
        format!("[{}]", rendered.join(", "))
    }
}

/// `[std.String, std.Int]`: fully qualified types without names.
pub(crate) fn raw_types(ctor: &ConstructorSchema) -> String {
    let rendered: Vec<String> = ctor.params.iter().map(|p| p.ty.qualified_name()).collect();
    format!("[{}]", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use ledgerbridge_core::{ParamDef, ParamType};

    use super::*;

    fn ctor() -> ConstructorSchema {
        ConstructorSchema::new(vec![
            ParamDef::new("a", ParamType::String),
            ParamDef::new("owner", ParamType::Party),
            ParamDef::new("state", ParamType::enumeration("com.x.Status", &["On"])),
            ParamDef::new("other", ParamType::enumeration("org.y.Mode", &["M"])),
            ParamDef::new("ids", ParamType::list(ParamType::EntityId)),
        ])
    }

    #[test]
    fn abbreviates_known_and_own_packages() {
        let abbr = Abbreviator::new(Some("com.x."));
        assert_eq!(
            abbr.prototype(&ctor()),
            "[a: String, owner: Party, state: Status, other: org.y.Mode, ids: List<EntityId>]"
        );
    }

    #[test]
    fn without_own_package_keeps_workflow_types_qualified() {
        let abbr = Abbreviator::new(None);
        assert!(abbr.prototype(&ctor()).contains("state: com.x.Status"));
    }

    #[test]
    fn raw_types_are_fully_qualified() {
        let ctor = ConstructorSchema::new(vec![
            ParamDef::unnamed(ParamType::String),
            ParamDef::unnamed(ParamType::Int),
        ]);
        assert_eq!(raw_types(&ctor), "[std.String, std.Int]");
    }

    #[test]
    fn empty_constructor_renders_empty_brackets() {
        assert_eq!(Abbreviator::new(None).prototype(&ConstructorSchema::empty()), "[]");
    }
}
