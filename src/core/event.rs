//! Events and the chaining builder that assembles them against a schema.

use crate::core::attr::{AttributeId, Schema};
use crate::core::strings::StringTable;
use crate::core::value::AttributeValue;
use crate::error::{EngineError, Result};

/// An immutable set of attribute values to match rules against.
///
/// Logically an array of [AttributeValue] indexed by [AttributeId]; entries
/// the builder never set read as [AttributeValue::Undefined].
#[derive(Debug, Clone)]
pub struct Event {
    values: Vec<AttributeValue>,
}

impl Event {
    pub(crate) fn value(&self, id: AttributeId) -> &AttributeValue {
        self.values
            .get(id as usize)
            .unwrap_or(&AttributeValue::Undefined)
    }
}

/// Chaining builder for [Event]s.
///
/// Setters validate against the schema but report lazily: the first unknown
/// attribute or kind mismatch is remembered and surfaced by
/// [EventBuilder::build], which keeps the chaining call style free of
/// per-call error plumbing. String values are interned on the way in, so the
/// built event only carries [StringRef](crate::StringRef)s.
#[derive(Debug)]
pub struct EventBuilder<'a> {
    schema: &'a Schema,
    strings: &'a StringTable,
    values: Vec<AttributeValue>,
    error: Option<EngineError>,
}

impl<'a> EventBuilder<'a> {
    pub(crate) fn new(schema: &'a Schema, strings: &'a StringTable) -> Self {
        Self {
            schema,
            strings,
            values: vec![AttributeValue::Undefined; schema.count()],
            error: None,
        }
    }

    pub fn with_bool(self, name: &str, value: bool) -> Self {
        self.set(name, AttributeValue::Bool(value))
    }

    pub fn with_int(self, name: &str, value: i64) -> Self {
        self.set(name, AttributeValue::Int(value))
    }

    pub fn with_float(self, name: &str, value: f64) -> Self {
        self.set(name, AttributeValue::Float(value))
    }

    pub fn with_string(self, name: &str, value: &str) -> Self {
        let reference = self.strings.intern(value);
        self.set(name, AttributeValue::String(reference))
    }

    pub fn with_bool_list(self, name: &str, values: &[bool]) -> Self {
        self.set(name, AttributeValue::BoolList(values.to_vec()))
    }

    pub fn with_int_list(self, name: &str, values: &[i64]) -> Self {
        self.set(name, AttributeValue::IntList(values.to_vec()))
    }

    pub fn with_float_list(self, name: &str, values: &[f64]) -> Self {
        self.set(name, AttributeValue::FloatList(values.to_vec()))
    }

    pub fn with_string_list(self, name: &str, values: &[&str]) -> Self {
        let references = values.iter().map(|value| self.strings.intern(value)).collect();
        self.set(name, AttributeValue::StringList(references))
    }

    fn set(mut self, name: &str, value: AttributeValue) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.schema.get_by_name(name) {
            None => self.error = Some(EngineError::UnknownAttribute(name.to_string())),
            Some((id, kind)) if kind == value.kind() => self.values[id as usize] = value,
            Some((_, kind)) => {
                self.error = Some(EngineError::SchemaMismatch {
                    attribute: name.to_string(),
                    expected: kind,
                    found: format!("{:?} value", value.kind()),
                });
            }
        }
        self
    }

    /// Produces the immutable event, or the first schema violation a setter hit.
    pub fn build(self) -> Result<Event> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(Event {
                values: self.values,
            }),
        }
    }
}
