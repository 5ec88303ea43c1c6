//! Process-wide type identities.
//!
//! A `TypeIdentity` records the concrete memory layout of one reference
//! type: its kind, member offsets (and names, for structures), and
//! component size. Identities are interned in a process-wide table keyed
//! by the full structural layout, so two values of the same concrete type
//! always share one identity index. The table is append-only: insertion
//! takes the write lock, lookups after warm-up only ever read.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

/// Size in bytes of the identity header prefixed to every heap object.
pub const HEADER_SIZE: usize = 8;

/// Size in bytes of a reference (heap address) value.
pub const REFERENCE_SIZE: usize = 8;

/// Index of an interned [`TypeIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    Tuple,
    Struct,
    Array,
    String,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeIdentity {
    pub kind: IdentityKind,
    /// Byte offset of each member within the data segment (tuple/struct).
    pub member_offsets: Vec<usize>,
    /// Byte size of each member (tuple/struct).
    pub member_sizes: Vec<usize>,
    /// Member names in layout order; empty except for structures.
    pub member_names: Vec<String>,
    /// Component size in bytes (array/string).
    pub component_size: usize,
    /// Fixed data-segment size; zero for arrays and strings, whose size
    /// depends on the length stored in the object.
    pub data_size: usize,
}

impl TypeIdentity {
    /// A tuple layout: members concatenated at size-aligned offsets.
    pub fn tuple(member_sizes: Vec<usize>) -> Self {
        let (member_offsets, data_size) = layout(&member_sizes);
        Self {
            kind: IdentityKind::Tuple,
            member_offsets,
            member_sizes,
            member_names: Vec::new(),
            component_size: 0,
            data_size,
        }
    }

    /// A structure layout: like a tuple, plus a name per member.
    pub fn structure(member_names: Vec<String>, member_sizes: Vec<usize>) -> Self {
        let (member_offsets, data_size) = layout(&member_sizes);
        Self {
            kind: IdentityKind::Struct,
            member_offsets,
            member_sizes,
            member_names,
            component_size: 0,
            data_size,
        }
    }

    /// An array layout: a length word followed by its components.
    pub fn array(component_size: usize) -> Self {
        Self {
            kind: IdentityKind::Array,
            member_offsets: Vec::new(),
            member_sizes: Vec::new(),
            member_names: Vec::new(),
            component_size,
            data_size: 0,
        }
    }

    /// A string layout: a length word followed by 1/2/4-byte code units.
    pub fn string(component_size: usize) -> Self {
        Self {
            kind: IdentityKind::String,
            member_offsets: Vec::new(),
            member_sizes: Vec::new(),
            member_names: Vec::new(),
            component_size,
            data_size: 0,
        }
    }

    /// The zero-data layout every reference type widens to.
    pub fn any() -> Self {
        Self {
            kind: IdentityKind::Any,
            member_offsets: Vec::new(),
            member_sizes: Vec::new(),
            member_names: Vec::new(),
            component_size: 0,
            data_size: 0,
        }
    }

    /// Offset of a structure member by name.
    pub fn member_offset_by_name(&self, name: &str) -> Option<(usize, usize)> {
        let index = self.member_names.iter().position(|n| n == name)?;
        Some((self.member_offsets[index], self.member_sizes[index]))
    }
}

fn layout(member_sizes: &[usize]) -> (Vec<usize>, usize) {
    let mut offsets = Vec::with_capacity(member_sizes.len());
    let mut offset = 0usize;
    for size in member_sizes {
        let align = (*size).max(1);
        offset = offset.div_ceil(align) * align;
        offsets.push(offset);
        offset += size;
    }
    (offsets, offset)
}

#[derive(Default)]
struct IdentityTable {
    records: Vec<Arc<TypeIdentity>>,
    by_layout: HashMap<TypeIdentity, IdentityId>,
}

static TABLE: Lazy<RwLock<IdentityTable>> = Lazy::new(|| RwLock::new(IdentityTable::default()));

/// Intern a layout, returning the stable identity index. Identical layouts
/// always return the same index.
pub fn intern(identity: TypeIdentity) -> IdentityId {
    {
        let table = TABLE.read().unwrap();
        if let Some(id) = table.by_layout.get(&identity) {
            return *id;
        }
    }
    let mut table = TABLE.write().unwrap();
    if let Some(id) = table.by_layout.get(&identity) {
        return *id;
    }
    let id = IdentityId(table.records.len() as u32);
    table.records.push(Arc::new(identity.clone()));
    table.by_layout.insert(identity, id);
    id
}

/// Resolve an identity index. Panics on an unregistered index: every live
/// heap reference must carry a valid identity.
pub fn lookup(id: IdentityId) -> Arc<TypeIdentity> {
    let table = TABLE.read().unwrap();
    table.records[id.0 as usize].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_layout_alignment() {
        let identity = TypeIdentity::tuple(vec![1, 8, 4]);
        assert_eq!(identity.member_offsets, vec![0, 8, 16]);
        assert_eq!(identity.data_size, 20);
    }

    #[test]
    fn test_interning_is_stable() {
        let a = intern(TypeIdentity::tuple(vec![4, 4]));
        let b = intern(TypeIdentity::tuple(vec![4, 4]));
        assert_eq!(a, b);
        let c = intern(TypeIdentity::tuple(vec![4, 8]));
        assert_ne!(a, c);
    }

    #[test]
    fn test_lookup_round_trip() {
        let identity = TypeIdentity::structure(
            vec!["x".to_string(), "y".to_string()],
            vec![4, 4],
        );
        let id = intern(identity.clone());
        assert_eq!(*lookup(id), identity);
    }

    #[test]
    fn test_struct_member_by_name() {
        let identity = TypeIdentity::structure(
            vec!["a".to_string(), "b".to_string()],
            vec![2, 8],
        );
        assert_eq!(identity.member_offset_by_name("b"), Some((8, 8)));
        assert_eq!(identity.member_offset_by_name("c"), None);
    }
}
