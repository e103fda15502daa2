//! Target dialect: placeholder style, bind casts, identifier quoting and the
//! per-type value encoders applied to every bound parameter.
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ast::{BoxError, EnumType, SqlType, Value};

/// How placeholders are written in the final SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamStyle {
    /// `$1`, `$2`, ... as expected by tokio-postgres.
    #[default]
    NumericDollar,
    /// `:key`
    Named,
    /// `?`
    Qmark,
    /// `%s`
    Format,
}

impl ParamStyle {
    /// Whether a key bound twice can share one positional parameter.
    pub fn reuses_positions(&self) -> bool {
        matches!(self, ParamStyle::NumericDollar | ParamStyle::Named)
    }
}

/// Converts a bound value before it is handed to the driver.
pub trait BindProcessor: Send + Sync {
    fn process(&self, value: Value) -> Result<Value, BoxError>;
}

impl<F> BindProcessor for F
where
    F: Fn(Value) -> Result<Value, BoxError> + Send + Sync,
{
    fn process(&self, value: Value) -> Result<Value, BoxError> {
        self(value)
    }
}

/// Maps enum member names to their database labels.
struct EnumLabels(Arc<EnumType>);

impl BindProcessor for EnumLabels {
    fn process(&self, value: Value) -> Result<Value, BoxError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Text(name) => match self.0.label_for(&name) {
                Some(label) => Ok(Value::Text(label.to_string())),
                None => Err(format!("`{}` is not a member of enum {}", name, self.0.name).into()),
            },
            other => Err(format!("enum {} expects text, got {:?}", self.0.name, other).into()),
        }
    }
}

/// Serializable subset of [`Dialect`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DialectConfig {
    pub paramstyle: ParamStyle,
    pub render_bind_casts: bool,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            paramstyle: ParamStyle::NumericDollar,
            render_bind_casts: true,
        }
    }
}

#[derive(Clone)]
pub struct Dialect {
    pub paramstyle: ParamStyle,
    /// Append `::TYPE` to every typed placeholder.
    pub render_bind_casts: bool,
    encoders: HashMap<String, Arc<dyn BindProcessor>>,
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut encoders: Vec<&str> = self.encoders.keys().map(String::as_str).collect();
        encoders.sort_unstable();
        f.debug_struct("Dialect")
            .field("paramstyle", &self.paramstyle)
            .field("render_bind_casts", &self.render_bind_casts)
            .field("encoders", &encoders)
            .finish()
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::from_config(&DialectConfig::default())
    }
}

impl Dialect {
    pub fn new(paramstyle: ParamStyle) -> Self {
        Self {
            paramstyle,
            ..Self::default()
        }
    }

    pub fn from_config(config: &DialectConfig) -> Self {
        Self {
            paramstyle: config.paramstyle,
            render_bind_casts: config.render_bind_casts,
            encoders: HashMap::new(),
        }
    }

    pub fn render_bind_casts(mut self, enabled: bool) -> Self {
        self.render_bind_casts = enabled;
        self
    }

    /// Register an encoder for a type, by lookup name (`citext`, `int4`, ...).
    /// Replaces any previous encoder for that name.
    pub fn register_encoder<P>(&mut self, type_name: &str, processor: P)
    where
        P: BindProcessor + 'static,
    {
        self.encoders
            .insert(type_name.to_lowercase(), Arc::new(processor));
    }

    pub fn with_encoder<P>(mut self, type_name: &str, processor: P) -> Self
    where
        P: BindProcessor + 'static,
    {
        self.register_encoder(type_name, processor);
        self
    }

    /// The encoder for `sql_type`. Enums fall back to a built-in name to
    /// label mapping.
    pub fn encoder_for(&self, sql_type: &SqlType) -> Option<Arc<dyn BindProcessor>> {
        if let Some(p) = self.encoders.get(&sql_type.lookup_name()) {
            return Some(Arc::clone(p));
        }
        match sql_type {
            SqlType::Enum(e) => Some(Arc::new(EnumLabels(Arc::clone(e)))),
            _ => None,
        }
    }

    /// Run `value` through the encoder for `sql_type`. Arrays without an
    /// encoder of their own are processed element-wise.
    pub fn process_value(&self, sql_type: &SqlType, value: Value) -> Result<Value, BoxError> {
        if let Some(processor) = self.encoder_for(sql_type) {
            return processor.process(value);
        }
        match (sql_type, value) {
            (SqlType::Array(inner), Value::Array(items)) => items
                .into_iter()
                .map(|item| self.process_value(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (_, value) => Ok(value),
        }
    }

    /// Quote an identifier when PostgreSQL would not accept it bare.
    pub fn quote_identifier<'a>(&self, ident: &'a str) -> Cow<'a, str> {
        let plain = ident
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_lowercase() || c == '_')
            && ident
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$');
        if plain && !is_reserved(ident) {
            Cow::Borrowed(ident)
        } else {
            Cow::Owned(format!("\"{}\"", ident.replace('"', "\"\"")))
        }
    }

    /// Placeholder text for the parameter at 1-based `position`.
    pub fn placeholder(&self, position: usize, key: &str) -> String {
        match self.paramstyle {
            ParamStyle::NumericDollar => format!("${}", position),
            ParamStyle::Named => format!(":{}", key),
            ParamStyle::Qmark => "?".to_string(),
            ParamStyle::Format => "%s".to_string(),
        }
    }
}

// Reserved keywords that cannot be used as bare column or table names.
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "table", "then", "to",
    "trailing", "true", "union", "unique", "user", "using", "variadic", "when", "where",
    "window", "with",
];

fn is_reserved(ident: &str) -> bool {
    RESERVED_WORDS.contains(&ident)
}
