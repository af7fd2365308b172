//! The string interning table mapping strings to dense integer references.

use std::sync::RwLock;

use rustc_hash::FxHashMap;

/// Reference to an interned string.
///
/// References are issued contiguously from zero, so they are deterministic
/// within a run, and reference equality is string equality for references
/// issued by the same table. Predicates and events store references instead
/// of strings, which turns string comparison during matching into integer
/// comparison.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
pub struct StringRef(pub(crate) u32);

#[derive(Debug, Default)]
struct Inner {
    strings: Vec<String>,
    ids: FxHashMap<String, StringRef>,
}

/// A string interning table.
///
/// This is the only shared-mutable collaborator of the engine: one table may
/// back several engine instances (via [std::sync::Arc]), with concurrent
/// readers and an occasional writer. [StringTable::intern] looks up under
/// shared access first and re-checks after upgrading to exclusive access, so
/// racing interns of the same string agree on one reference.
#[derive(Debug, Default)]
pub struct StringTable {
    inner: RwLock<Inner>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reference for a string, interning it on first sight.
    pub fn intern(&self, string: &str) -> StringRef {
        if let Some(&existing) = self.inner.read().unwrap().ids.get(string) {
            return existing;
        }
        let mut inner = self.inner.write().unwrap();
        // Another writer may have interned the string between the two locks.
        if let Some(&existing) = inner.ids.get(string) {
            return existing;
        }
        let reference = StringRef(inner.strings.len() as u32);
        inner.strings.push(string.to_string());
        inner.ids.insert(string.to_string(), reference);
        reference
    }

    /// Returns the string behind a reference, if the table issued it.
    pub fn resolve(&self, reference: StringRef) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .strings
            .get(reference.0 as usize)
            .cloned()
    }

    /// Returns the number of interned strings.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
