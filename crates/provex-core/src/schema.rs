//! Declarative field schemas for command inputs and provider records.
//!
//! A [`Schema`] is an ordered set of [`FieldSpec`]s. Each field has a
//! canonical name and an optional wire alias. Validation maps wire keys to
//! canonical names and applies defaults. It then coerces values and enforces
//! the allowed choices. Serialization maps canonical names back to aliases,
//! so `validate(serialize(x)) == x` for any `x` that `validate` produced.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::domain::{format_date, parse_date, UtcDateTime};
use crate::error::{SchemaError, ValidationError};

/// Loosely-typed key/value bag used for query parameters.
pub type Params = Map<String, Value>;

/// One normalized output row.
pub type Record = Map<String, Value>;

/// Value types a field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// ISO `YYYY-MM-DD`.
    Date,
    /// A list of strings; a comma-separated string is split.
    StringList,
}

impl FieldType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::StringList => "string_list",
        }
    }

    /// Coerce `value` into this type. `Null` must be handled by the caller.
    pub fn coerce(self, field: &str, value: Value) -> Result<Value, ValidationError> {
        let mismatch = |found: &Value| ValidationError::InvalidType {
            field: field.to_owned(),
            expected: self.as_str(),
            found: describe(found),
        };

        match self {
            Self::String => match value {
                Value::String(_) => Ok(value),
                Value::Number(number) => Ok(Value::String(number.to_string())),
                other => Err(mismatch(&other)),
            },
            Self::Integer => match &value {
                Value::Number(number) if number.is_i64() || number.is_u64() => Ok(value),
                Value::Number(number) => match number.as_f64() {
                    Some(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => {
                        Ok(Value::from(float as i64))
                    }
                    _ => Err(mismatch(&value)),
                },
                Value::String(text) => text
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            Self::Number => match &value {
                Value::Number(_) => Ok(value),
                Value::String(text) => text
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            Self::Boolean => match &value {
                Value::Bool(_) => Ok(value),
                Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(Value::Bool(true)),
                    "false" | "0" | "no" => Ok(Value::Bool(false)),
                    _ => Err(mismatch(&value)),
                },
                _ => Err(mismatch(&value)),
            },
            Self::Date => match &value {
                Value::String(text) => {
                    let date = match parse_date(field, text) {
                        Ok(date) => date,
                        Err(error) => UtcDateTime::parse(text.trim())
                            .map(UtcDateTime::date)
                            .map_err(|_| error)?,
                    };
                    Ok(Value::String(format_date(date)))
                }
                _ => Err(mismatch(&value)),
            },
            Self::StringList => {
                let items: Vec<Value> = match &value {
                    Value::String(text) => text
                        .split(',')
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(|item| Value::String(item.to_owned()))
                        .collect(),
                    Value::Array(entries) => entries
                        .iter()
                        .map(|entry| match entry {
                            Value::String(_) => Ok(entry.clone()),
                            Value::Number(number) => Ok(Value::String(number.to_string())),
                            _ => Err(mismatch(&value)),
                        })
                        .collect::<Result<_, _>>()?,
                    _ => return Err(mismatch(&value)),
                };
                if items.is_empty() {
                    return Err(mismatch(&value));
                }
                Ok(Value::Array(items))
            }
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => String::from("null"),
        Value::Bool(flag) => format!("boolean {flag}"),
        Value::Number(number) => format!("number {number}"),
        Value::String(text) => format!("string '{text}'"),
        Value::Array(_) => String::from("array"),
        Value::Object(_) => String::from("object"),
    }
}

/// Declaration of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Value>,
    pub description: String,
    /// Providers declaring this field. Empty for standard fields.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<String>,
    /// Deprecation notice surfaced as a warning when the field is supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            alias: None,
            choices: Vec::new(),
            description: String::new(),
            providers: Vec::new(),
            deprecated: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn deprecated(mut self, notice: impl Into<String>) -> Self {
        self.deprecated = Some(notice.into());
        self
    }

    pub(crate) fn declared_by(mut self, provider: &str) -> Self {
        if !self.providers.iter().any(|existing| existing == provider) {
            self.providers.push(provider.to_owned());
        }
        self
    }

    /// Key used on the wire: the alias when present, else the canonical name.
    pub fn wire_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    fn check_choices(&self, value: &Value) -> Result<(), ValidationError> {
        if self.choices.is_empty() {
            return Ok(());
        }
        let candidates: Vec<&Value> = match value {
            Value::Array(items) if self.field_type == FieldType::StringList => items.iter().collect(),
            other => vec![other],
        };
        for candidate in candidates {
            if !self.choices.contains(candidate) {
                return Err(ValidationError::InvalidChoice {
                    field: self.name.clone(),
                    value: candidate.to_string(),
                    choices: self
                        .choices
                        .iter()
                        .map(Value::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }
        Ok(())
    }

    fn coerce(&self, value: Value) -> Result<Value, ValidationError> {
        let coerced = self.field_type.coerce(&self.name, value)?;
        self.check_choices(&coerced)?;
        Ok(coerced)
    }
}

/// Outcome of normalizing one provider record.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub record: Record,
    /// Optional fields whose value could not be coerced and were set to null.
    pub nulled: Vec<String>,
}

/// Ordered, alias-bijective set of fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    name: String,
    fields: Vec<FieldSpec>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
    #[serde(skip)]
    by_alias: HashMap<String, usize>,
}

impl Schema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let name = name.into();
        let mut by_name = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if by_name.insert(field.name.clone(), index).is_some() {
                return Err(SchemaError::DuplicateField {
                    schema: name,
                    field: field.name.clone(),
                });
            }
        }

        let mut by_alias: HashMap<String, usize> = HashMap::new();
        for (index, field) in fields.iter().enumerate() {
            let Some(alias) = field.alias.as_ref() else {
                continue;
            };
            if alias == &field.name {
                continue;
            }
            if by_name.contains_key(alias) {
                return Err(SchemaError::AliasShadowsField {
                    schema: name,
                    alias: alias.clone(),
                    field: field.name.clone(),
                });
            }
            if let Some(previous) = by_alias.insert(alias.clone(), index) {
                return Err(SchemaError::DuplicateAlias {
                    schema: name,
                    alias: alias.clone(),
                    first: fields[previous].name.clone(),
                    second: field.name.clone(),
                });
            }
        }

        Ok(Self {
            name,
            fields,
            by_name,
            by_alias,
        })
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            by_name: HashMap::new(),
            by_alias: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.by_name.get(name).map(|index| &self.fields[*index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolve a canonical name or wire alias to its field.
    pub fn resolve_key(&self, key: &str) -> Option<&FieldSpec> {
        self.by_name
            .get(key)
            .or_else(|| self.by_alias.get(key))
            .map(|index| &self.fields[*index])
    }

    /// Keys of `raw` that match neither a canonical name nor an alias.
    pub fn unknown_keys<'a>(&self, raw: &'a Params) -> Vec<&'a str> {
        raw.keys()
            .map(String::as_str)
            .filter(|key| self.resolve_key(key).is_none())
            .collect()
    }

    fn take_value(&self, field: &FieldSpec, raw: &Params) -> Option<Value> {
        let by_name = raw.get(&field.name).filter(|value| !value.is_null());
        let by_alias = field
            .alias
            .as_ref()
            .and_then(|alias| raw.get(alias))
            .filter(|value| !value.is_null());
        by_name.or(by_alias).cloned()
    }

    /// Validate loosely-typed input into canonical, typed parameters.
    ///
    /// Absent optional fields without a default are omitted. Keys the schema
    /// does not know are passed through untouched.
    pub fn validate(&self, raw: &Params) -> Result<Params, ValidationError> {
        let mut output = Params::new();
        for field in &self.fields {
            match self.take_value(field, raw) {
                Some(value) => {
                    output.insert(field.name.clone(), field.coerce(value)?);
                }
                None => match &field.default {
                    Some(default) => {
                        output.insert(field.name.clone(), field.coerce(default.clone())?);
                    }
                    None if field.required => {
                        return Err(ValidationError::MissingField {
                            field: field.name.clone(),
                        });
                    }
                    None => {}
                },
            }
        }

        for (key, value) in raw {
            if self.resolve_key(key).is_none() {
                output.insert(key.clone(), value.clone());
            }
        }
        Ok(output)
    }

    /// Map canonical keys back to their wire aliases.
    pub fn serialize(&self, values: &Params) -> Params {
        values
            .iter()
            .map(|(key, value)| {
                let wire = self
                    .field(key)
                    .map(FieldSpec::wire_name)
                    .unwrap_or(key.as_str());
                (wire.to_owned(), value.clone())
            })
            .collect()
    }

    /// Normalize a provider record into canonical shape.
    ///
    /// Every declared field is present in the output. Optional fields that
    /// fail coercion become null and are reported in
    /// [`NormalizedRecord::nulled`]. A missing or invalid required field
    /// rejects the whole record.
    pub fn normalize_record(&self, raw: &Record) -> Result<NormalizedRecord, ValidationError> {
        let mut record = Record::new();
        let mut nulled = Vec::new();
        for field in &self.fields {
            let value = match self.take_value(field, raw) {
                Some(value) => match field.coerce(value) {
                    Ok(coerced) => coerced,
                    Err(error) if field.required => return Err(error),
                    Err(_) => {
                        nulled.push(field.name.clone());
                        Value::Null
                    }
                },
                None if field.required => {
                    return Err(ValidationError::MissingField {
                        field: field.name.clone(),
                    });
                }
                None => Value::Null,
            };
            record.insert(field.name.clone(), value);
        }

        for (key, value) in raw {
            if self.resolve_key(key).is_none() {
                record.insert(key.clone(), value.clone());
            }
        }
        Ok(NormalizedRecord { record, nulled })
    }

    /// Union of `base` and `extra`.
    ///
    /// On a name collision the base field keeps its type and requiredness;
    /// a restricted choice set is widened with the extra's choices, and
    /// missing defaults, aliases and descriptions are filled in from the
    /// extra. Declaring providers accumulate on the merged field.
    pub fn merge(base: &Schema, extra: &Schema) -> Result<Schema, SchemaError> {
        let mut fields = base.fields.clone();
        for incoming in &extra.fields {
            match fields.iter_mut().find(|field| field.name == incoming.name) {
                Some(existing) => {
                    if !existing.choices.is_empty() && !incoming.choices.is_empty() {
                        for choice in &incoming.choices {
                            if !existing.choices.contains(choice) {
                                existing.choices.push(choice.clone());
                            }
                        }
                    }
                    if existing.default.is_none() {
                        existing.default = incoming.default.clone();
                    }
                    if existing.alias.is_none() {
                        existing.alias = incoming.alias.clone();
                    }
                    if existing.description.is_empty() {
                        existing.description = incoming.description.clone();
                    }
                    if existing.deprecated.is_none() {
                        existing.deprecated = incoming.deprecated.clone();
                    }
                    for provider in &incoming.providers {
                        if !existing.providers.contains(provider) {
                            existing.providers.push(provider.clone());
                        }
                    }
                }
                None => fields.push(incoming.clone()),
            }
        }
        Schema::new(base.name.clone(), fields)
    }

    /// Fields declared by two or more providers.
    pub fn collisions(&self) -> Vec<&FieldSpec> {
        self.fields
            .iter()
            .filter(|field| field.providers.len() >= 2)
            .collect()
    }

    /// Canonical names of all fields.
    pub fn field_names(&self) -> HashSet<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }
}
