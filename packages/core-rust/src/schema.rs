//! Per-workflow parameter schemas and string-to-value coercion.
//!
//! A workflow declares one or more [`ConstructorSchema`]s, each an ordered
//! list of named, typed parameters. Inbound parameters always arrive as
//! strings; [`ParamType::coerce`] turns them into typed [`ArgValue`]s.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{EntityId, Party};

// ---------------------------------------------------------------------------
// ParamType
// ---------------------------------------------------------------------------

/// Declared type of a workflow parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ParamType {
    String,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Uuid,
    EntityId,
    Party,
    /// A closed set of named variants, e.g. a workflow-local status enum.
    Enum {
        qualified_name: String,
        variants: Vec<String>,
    },
    List {
        item: Box<ParamType>,
    },
    Optional {
        item: Box<ParamType>,
    },
}

impl ParamType {
    #[must_use]
    pub fn list(item: ParamType) -> Self {
        Self::List {
            item: Box::new(item),
        }
    }

    #[must_use]
    pub fn optional(item: ParamType) -> Self {
        Self::Optional {
            item: Box::new(item),
        }
    }

    #[must_use]
    pub fn enumeration(qualified_name: impl Into<String>, variants: &[&str]) -> Self {
        Self::Enum {
            qualified_name: qualified_name.into(),
            variants: variants.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    /// Renders the type, passing every qualified name through `name`.
    ///
    /// Generic types render as `List<Item>`. The resolver uses this to print
    /// abbreviated constructor signatures.
    pub fn render(&self, name: &dyn Fn(&str) -> String) -> String {
        match self {
            Self::String => name("std.String"),
            Self::Int => name("std.Int"),
            Self::Long => name("std.Long"),
            Self::Float => name("std.Float"),
            Self::Double => name("std.Double"),
            Self::Boolean => name("std.Boolean"),
            Self::Uuid => name("std.Uuid"),
            Self::EntityId => name("ledger.core.EntityId"),
            Self::Party => name("ledger.core.Party"),
            Self::Enum { qualified_name, .. } => name(qualified_name),
            Self::List { item } => format!("{}<{}>", name("std.List"), item.render(name)),
            Self::Optional { item } => format!("{}<{}>", name("std.Optional"), item.render(name)),
        }
    }

    /// Fully qualified rendering, e.g. `std.List<ledger.core.Party>`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        self.render(&|n| n.to_string())
    }

    /// Coerces a raw string into a typed value.
    ///
    /// Numeric and boolean types treat an empty string as their zero value.
    /// Lists accept a JSON array (`["a", 2]`) or a bracketed comma-separated
    /// list (`[a, 2]`). Optionals map `""` and `null` to [`ArgValue::Null`].
    ///
    /// # Errors
    ///
    /// Returns [`CoercionError`] when `raw` cannot be read as this type.
    pub fn coerce(&self, raw: &str) -> Result<ArgValue, CoercionError> {
        let fail = |reason: String| CoercionError {
            type_name: self.qualified_name(),
            value: raw.to_string(),
            reason,
        };
        let trimmed = raw.trim();
        match self {
            Self::String => Ok(ArgValue::String(raw.to_string())),
            Self::Int => parse_or_zero(trimmed)
                .map(ArgValue::Int)
                .map_err(|e| fail(e.to_string())),
            Self::Long => parse_or_zero(trimmed)
                .map(ArgValue::Long)
                .map_err(|e| fail(e.to_string())),
            Self::Float => parse_or_zero(trimmed)
                .map(ArgValue::Float)
                .map_err(|e| fail(e.to_string())),
            Self::Double => parse_or_zero(trimmed)
                .map(ArgValue::Double)
                .map_err(|e| fail(e.to_string())),
            Self::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "" | "false" => Ok(ArgValue::Boolean(false)),
                "true" => Ok(ArgValue::Boolean(true)),
                _ => Err(fail("expected 'true' or 'false'".to_string())),
            },
            Self::Uuid => Uuid::parse_str(trimmed)
                .map(ArgValue::Uuid)
                .map_err(|e| fail(e.to_string())),
            Self::EntityId => trimmed
                .parse::<EntityId>()
                .map(ArgValue::EntityId)
                .map_err(|e| fail(e.to_string())),
            Self::Party => trimmed
                .parse::<Party>()
                .map(ArgValue::Party)
                .map_err(|e| fail(e.to_string())),
            Self::Enum { variants, .. } => variants
                .iter()
                .find(|v| v.as_str() == trimmed)
                .map(|v| ArgValue::Enum(v.clone()))
                .ok_or_else(|| fail(format!("expected one of [{}]", variants.join(", ")))),
            Self::List { item } => {
                let elements = split_list(trimmed).ok_or_else(|| fail("expected a list".to_string()))?;
                elements
                    .iter()
                    .map(|e| item.coerce(e))
                    .collect::<Result<Vec<_>, _>>()
                    .map(ArgValue::List)
            }
            Self::Optional { item } => {
                if trimmed.is_empty() || trimmed == "null" {
                    Ok(ArgValue::Null)
                } else {
                    item.coerce(raw)
                }
            }
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

fn parse_or_zero<T>(s: &str) -> Result<T, T::Err>
where
    T: std::str::FromStr + Default,
{
    if s.is_empty() {
        Ok(T::default())
    } else {
        s.parse()
    }
}

/// Splits a list literal into its raw element strings.
fn split_list(s: &str) -> Option<Vec<String>> {
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(s) {
        return Some(
            items
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        );
    }
    let inner = s.strip_prefix('[')?.strip_suffix(']')?.trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }
    Some(inner.split(',').map(|e| e.trim().to_string()).collect())
}

/// A raw string that could not be read as the declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse '{value}' as {type_name}: {reason}")]
pub struct CoercionError {
    pub type_name: String,
    pub value: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// ArgValue
// ---------------------------------------------------------------------------

/// A typed, bound argument ready to hand to a workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Uuid(Uuid),
    EntityId(EntityId),
    Party(Party),
    Enum(String),
    List(Vec<ArgValue>),
    Null,
}

impl ArgValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Enum(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(i64::from(*n)),
            Self::Long(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::EntityId(id) => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_party(&self) -> Option<&Party> {
        match self {
            Self::Party(p) => Some(p),
            _ => None,
        }
    }

    /// Converts to JSON for workflow bodies that build ledger state.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

// ---------------------------------------------------------------------------
// ParamDef / ConstructorSchema
// ---------------------------------------------------------------------------

/// A single declared parameter.
///
/// `name` is `None` when the workflow was registered without parameter
/// names, which makes name-based binding impossible for that constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: Option<String>,
    pub ty: ParamType,
}

impl ParamDef {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }

    #[must_use]
    pub fn unnamed(ty: ParamType) -> Self {
        Self { name: None, ty }
    }
}

/// One way of constructing a workflow: an ordered parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorSchema {
    pub params: Vec<ParamDef>,
}

impl ConstructorSchema {
    #[must_use]
    pub fn new(params: Vec<ParamDef>) -> Self {
        Self { params }
    }

    /// The zero-argument constructor.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Parameter names in declaration order, or `None` if any is unnamed.
    #[must_use]
    pub fn param_names(&self) -> Option<Vec<&str>> {
        self.params.iter().map(|p| p.name.as_deref()).collect()
    }
}
