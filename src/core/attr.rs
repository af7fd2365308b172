//! The attribute schema: names, kinds, and their dense identifiers.

use rustc_hash::FxHashMap;

use crate::error::{EngineError, Result};

/// Identifier type for attributes.
///
/// Assigned densely in schema-registration order and stable for the life of
/// the engine. Serves as an index into an event's value array.
pub type AttributeId = u32;

/// The kind of values an attribute can carry.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum AttributeKind {
    Bool,
    Int,
    Float,
    String,
    BoolList,
    IntList,
    FloatList,
    StringList,

    /// The kind of a value absent from an event.
    Undefined,
}

impl AttributeKind {
    /// Returns whether this kind carries a list of scalars.
    pub(crate) fn is_list(self) -> bool {
        matches!(
            self,
            AttributeKind::BoolList
                | AttributeKind::IntList
                | AttributeKind::FloatList
                | AttributeKind::StringList
        )
    }
}

/// An attribute declaration: a name paired with the kind of its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDef {
    name: String,
    kind: AttributeKind,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }
}

/// The frozen `(name -> id, kind)` mapping shared by all rules and events of
/// one engine.
///
/// Constructed once and never mutated afterwards, so lookups need no
/// synchronization. Identifiers are the positions of the definitions in
/// registration order.
#[derive(Debug)]
pub(crate) struct Schema {
    defs: Vec<AttributeDef>,
    ids: FxHashMap<String, AttributeId>,
}

impl Schema {
    /// Builds a schema from attribute definitions, rejecting duplicate names.
    pub(crate) fn new(defs: impl IntoIterator<Item = AttributeDef>) -> Result<Self> {
        let defs: Vec<AttributeDef> = defs.into_iter().collect();
        let mut ids = FxHashMap::default();
        for (id, def) in defs.iter().enumerate() {
            if ids.insert(def.name.clone(), id as AttributeId).is_some() {
                return Err(EngineError::DuplicateAttribute(def.name.clone()));
            }
        }
        Ok(Self { defs, ids })
    }

    pub(crate) fn get_by_name(&self, name: &str) -> Option<(AttributeId, AttributeKind)> {
        let id = *self.ids.get(name)?;
        Some((id, self.defs[id as usize].kind))
    }

    pub(crate) fn get_by_id(&self, id: AttributeId) -> &AttributeDef {
        &self.defs[id as usize]
    }

    pub(crate) fn count(&self) -> usize {
        self.defs.len()
    }

    /// Looks up an attribute by name, failing with [EngineError::UnknownAttribute].
    pub(crate) fn resolve(&self, name: &str) -> Result<(AttributeId, AttributeKind)> {
        self.get_by_name(name)
            .ok_or_else(|| EngineError::UnknownAttribute(name.to_string()))
    }
}
