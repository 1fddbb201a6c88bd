//! Declarative schema for the tunable completion options.
//!
//! Every per-request parameter is declared exactly once in [`FIELDS`]. The
//! channel store's column layout and SQL, the mention command flags, the
//! usage text, and the built-in default tier are all derived from that one
//! table, so adding a field means adding one table row and one record field.
//! [`verify`] checks the two stay in agreement and runs at process start.

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;

/// Semantic type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Float,
    Integer,
    Boolean,
}

impl FieldKind {
    /// Name used in diagnostics and usage text.
    pub fn label(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Float => "float",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
        }
    }

    /// SQLite column type with the matching affinity.
    ///
    /// Booleans are stored as 0/1 integers; SQLite has no boolean affinity.
    pub fn column_type(self) -> &'static str {
        match self {
            FieldKind::String => "TEXT",
            FieldKind::Float => "REAL",
            FieldKind::Integer => "INTEGER",
            FieldKind::Boolean => "INTEGER",
        }
    }

    /// Parse raw text into a value of this kind.
    pub fn parse(self, field: &str, raw: &str) -> Result<FieldValue, OptionsError> {
        let invalid = || OptionsError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            expected: self.label(),
        };
        match self {
            FieldKind::String => Ok(FieldValue::String(raw.to_string())),
            FieldKind::Float => raw.parse().map(FieldValue::Float).map_err(|_| invalid()),
            FieldKind::Integer => raw.parse().map(FieldValue::Integer).map_err(|_| invalid()),
            FieldKind::Boolean => match raw {
                "true" | "1" => Ok(FieldValue::Boolean(true)),
                "false" | "0" => Ok(FieldValue::Boolean(false)),
                _ => Err(invalid()),
            },
        }
    }
}

/// One dynamically typed option value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Float(f64),
    Integer(i64),
    Boolean(bool),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Boolean(_) => FieldKind::Boolean,
        }
    }

    /// Plain-text rendering for usage text and diagnostics.
    pub fn render(&self) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Integer(v) => v.to_string(),
            FieldValue::Boolean(v) => v.to_string(),
        }
    }
}

/// Const-constructible form of a built-in default value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuiltinDefault {
    Str(&'static str),
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl BuiltinDefault {
    pub fn to_value(self) -> FieldValue {
        match self {
            BuiltinDefault::Str(s) => FieldValue::String(s.to_string()),
            BuiltinDefault::Float(v) => FieldValue::Float(v),
            BuiltinDefault::Int(v) => FieldValue::Integer(v),
            BuiltinDefault::Bool(v) => FieldValue::Boolean(v),
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            BuiltinDefault::Str(_) => FieldKind::String,
            BuiltinDefault::Float(_) => FieldKind::Float,
            BuiltinDefault::Int(_) => FieldKind::Integer,
            BuiltinDefault::Bool(_) => FieldKind::Boolean,
        }
    }
}

/// One declared schema field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name, used as the store column name.
    pub name: &'static str,
    /// Kebab-cased mention flag recognized for this field.
    pub flag: &'static str,
    pub kind: FieldKind,
    /// Built-in default, the weakest resolution tier. `None` means the
    /// field must be supplied by some higher tier on every request.
    pub default: Option<BuiltinDefault>,
}

/// The option schema. Immutable after process start by construction.
pub const FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "base_url",
        flag: "--base-url",
        kind: FieldKind::String,
        default: None,
    },
    FieldSpec {
        name: "model",
        flag: "--model",
        kind: FieldKind::String,
        default: None,
    },
    FieldSpec {
        name: "role",
        flag: "--role",
        kind: FieldKind::String,
        default: Some(BuiltinDefault::Str("user")),
    },
    FieldSpec {
        name: "temperature",
        flag: "--temperature",
        kind: FieldKind::Float,
        default: Some(BuiltinDefault::Float(1.0)),
    },
    FieldSpec {
        name: "top_p",
        flag: "--top-p",
        kind: FieldKind::Float,
        default: Some(BuiltinDefault::Float(1.0)),
    },
    FieldSpec {
        name: "broadcast_reply",
        flag: "--broadcast-reply",
        kind: FieldKind::Boolean,
        default: Some(BuiltinDefault::Bool(true)),
    },
];

/// Look up a schema field by name.
pub fn field(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.name == name)
}

/// Look up a schema field by its mention flag.
pub fn field_by_flag(flag: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.flag == flag)
}

/// Partial override record: one optional value per schema field.
///
/// An absent field defers to the next-lower resolution tier. This is the
/// shape of a channel's stored override, of the process defaults, and of the
/// overrides supplied inline on a single mention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_reply: Option<bool>,
}

impl OptionsPatch {
    pub fn is_empty(&self) -> bool {
        FIELDS.iter().all(|spec| self.get(spec.name).is_none())
    }

    /// Value of `name`, if present. `None` for absent values and for names
    /// outside the schema.
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        match name {
            "base_url" => self.base_url.clone().map(FieldValue::String),
            "model" => self.model.clone().map(FieldValue::String),
            "role" => self.role.clone().map(FieldValue::String),
            "temperature" => self.temperature.map(FieldValue::Float),
            "top_p" => self.top_p.map(FieldValue::Float),
            "broadcast_reply" => self.broadcast_reply.map(FieldValue::Boolean),
            _ => None,
        }
    }

    /// Set `name` to `value`, rejecting values of the wrong kind.
    pub fn set(&mut self, name: &str, value: FieldValue) -> Result<(), OptionsError> {
        let mismatch = |spec: &FieldSpec, value: &FieldValue| OptionsError::InvalidValue {
            field: spec.name.to_string(),
            value: value.render(),
            expected: spec.kind.label(),
        };
        let spec = field(name).ok_or_else(|| OptionsError::UnknownField {
            field: name.to_string(),
        })?;
        match (name, value) {
            ("base_url", FieldValue::String(s)) => self.base_url = Some(s),
            ("model", FieldValue::String(s)) => self.model = Some(s),
            ("role", FieldValue::String(s)) => self.role = Some(s),
            ("temperature", FieldValue::Float(v)) => self.temperature = Some(v),
            ("top_p", FieldValue::Float(v)) => self.top_p = Some(v),
            ("broadcast_reply", FieldValue::Boolean(v)) => self.broadcast_reply = Some(v),
            (_, value) => return Err(mismatch(spec, &value)),
        }
        Ok(())
    }

    /// Field-wise precedence merge: values in `self` win, absent fields fall
    /// through to `lower`.
    pub fn or(self, lower: OptionsPatch) -> OptionsPatch {
        OptionsPatch {
            base_url: self.base_url.or(lower.base_url),
            model: self.model.or(lower.model),
            role: self.role.or(lower.role),
            temperature: self.temperature.or(lower.temperature),
            top_p: self.top_p.or(lower.top_p),
            broadcast_reply: self.broadcast_reply.or(lower.broadcast_reply),
        }
    }
}

/// The built-in defaults as the weakest tier of a resolution.
pub fn builtin_defaults() -> OptionsPatch {
    OptionsPatch {
        base_url: None,
        model: None,
        role: Some("user".to_string()),
        temperature: Some(1.0),
        top_p: Some(1.0),
        broadcast_reply: Some(true),
    }
}

/// Check that [`FIELDS`] and the typed record agree. Run once at startup.
pub fn verify() -> Result<(), OptionsError> {
    let mismatch = |field: &str, reason: String| OptionsError::SchemaMismatch {
        field: field.to_string(),
        reason,
    };

    let mut scratch = OptionsPatch::default();
    let defaults = builtin_defaults();
    for (index, spec) in FIELDS.iter().enumerate() {
        if FIELDS[..index].iter().any(|prior| prior.name == spec.name) {
            return Err(mismatch(spec.name, "duplicate field name".to_string()));
        }
        let expected_flag = format!("--{}", spec.name.replace('_', "-"));
        if spec.flag != expected_flag {
            return Err(mismatch(
                spec.name,
                format!("flag {} is not the kebab-cased name", spec.flag),
            ));
        }
        if let Some(default) = spec.default {
            if default.kind() != spec.kind {
                return Err(mismatch(
                    spec.name,
                    format!(
                        "built-in default is a {}, field is a {}",
                        default.kind().label(),
                        spec.kind.label()
                    ),
                ));
            }
        }
        // The literal defaults record must restate the table exactly.
        if defaults.get(spec.name) != spec.default.map(BuiltinDefault::to_value) {
            return Err(mismatch(
                spec.name,
                "built-in defaults record disagrees with the table".to_string(),
            ));
        }
        // Every declared field must have matching record accessors.
        let probe = spec.kind.parse(spec.name, probe_text(spec.kind))?;
        scratch.set(spec.name, probe.clone())?;
        if scratch.get(spec.name) != Some(probe) {
            return Err(mismatch(
                spec.name,
                "record get/set do not round-trip".to_string(),
            ));
        }
    }
    Ok(())
}

fn probe_text(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::String => "probe",
        FieldKind::Float => "0.5",
        FieldKind::Integer => "7",
        FieldKind::Boolean => "true",
    }
}
