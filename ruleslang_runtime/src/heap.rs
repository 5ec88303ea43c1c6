//! The evaluation heap.
//!
//! An arena of identity-headed objects addressed by byte offset. Address
//! zero is the null reference; the arena starts with one pad word so no
//! real object lands there. Each object is an 8-byte identity header
//! followed by its data segment. Arrays and strings store a `u64` length
//! word first, then their components.

use crate::error::{RuntimeError, RuntimeResult};
use crate::identity::{self, IdentityId, TypeIdentity, HEADER_SIZE};
use std::sync::Arc;

/// A heap address; `0` is null.
pub type Address = u64;

pub struct Heap {
    data: Vec<u8>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            data: vec![0; HEADER_SIZE],
        }
    }

    /// Allocate a block with the given identity and a zero-filled data
    /// segment, returning the header address.
    pub fn allocate(&mut self, identity: IdentityId, data_size: usize) -> Address {
        let start = self.data.len().div_ceil(8) * 8;
        self.data.resize(start + HEADER_SIZE + data_size, 0);
        self.data[start..start + HEADER_SIZE]
            .copy_from_slice(&(identity.0 as u64).to_le_bytes());
        start as Address
    }

    /// The identity record of the object at `address`.
    pub fn identity(&self, address: Address) -> Arc<TypeIdentity> {
        let start = address as usize;
        let raw = u64::from_le_bytes(
            self.data[start..start + HEADER_SIZE].try_into().unwrap(),
        );
        identity::lookup(IdentityId(raw as u32))
    }

    /// Fail with `NullReference` unless `address` is non-null.
    pub fn check_null(&self, address: Address) -> RuntimeResult<()> {
        if address == 0 {
            Err(RuntimeError::NullReference)
        } else {
            Ok(())
        }
    }

    /// Byte offset of the data segment of the object at `address`.
    pub fn data_offset(&self, address: Address) -> usize {
        address as usize + HEADER_SIZE
    }

    pub fn read(&self, offset: usize, size: usize) -> &[u8] {
        &self.data[offset..offset + size]
    }

    pub fn write(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn read_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.data[offset..offset + 8].try_into().unwrap())
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.write(offset, &value.to_le_bytes());
    }

    /// The length word of an array or string object.
    pub fn length(&self, address: Address) -> u64 {
        self.read_u64(self.data_offset(address))
    }

    /// Offset of component `index` of the array or string at `address`,
    /// bounds-checked against its length word.
    pub fn component_offset(
        &self,
        address: Address,
        component_size: usize,
        index: i64,
    ) -> RuntimeResult<usize> {
        let length = self.length(address);
        if index < 0 || index as u64 >= length {
            return Err(RuntimeError::IndexOutOfBounds { index, length });
        }
        Ok(self.data_offset(address) + 8 + component_size * index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{intern, IdentityKind};

    #[test]
    fn test_allocation_is_never_null() {
        let mut heap = Heap::new();
        let id = intern(TypeIdentity::tuple(vec![8]));
        let address = heap.allocate(id, 8);
        assert_ne!(address, 0);
    }

    #[test]
    fn test_identity_round_trip() {
        let mut heap = Heap::new();
        let id = intern(TypeIdentity::array(4));
        let address = heap.allocate(id, 8 + 4 * 3);
        assert_eq!(heap.identity(address).kind, IdentityKind::Array);
        assert_eq!(heap.identity(address).component_size, 4);
    }

    #[test]
    fn test_array_bounds() {
        let mut heap = Heap::new();
        let id = intern(TypeIdentity::array(4));
        let address = heap.allocate(id, 8 + 4 * 2);
        heap.write_u64(heap.data_offset(address), 2);
        assert!(heap.component_offset(address, 4, 0).is_ok());
        assert!(heap.component_offset(address, 4, 1).is_ok());
        assert_eq!(
            heap.component_offset(address, 4, 2),
            Err(RuntimeError::IndexOutOfBounds { index: 2, length: 2 })
        );
        assert!(heap.component_offset(address, 4, -1).is_err());
    }

    #[test]
    fn test_null_check() {
        let heap = Heap::new();
        assert_eq!(heap.check_null(0), Err(RuntimeError::NullReference));
        assert!(heap.check_null(8).is_ok());
    }

    #[test]
    fn test_data_zero_filled() {
        let mut heap = Heap::new();
        let id = intern(TypeIdentity::tuple(vec![4, 4]));
        let address = heap.allocate(id, 8);
        assert_eq!(heap.read(heap.data_offset(address), 8), &[0u8; 8]);
    }
}
