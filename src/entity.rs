// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity identifiers and location metadata.

use std::fmt;

/// Opaque entity handle.
///
/// Assigned from a per-store monotonic counter and never reused within a
/// store's lifetime, so equality is identity: two `EntityId`s compare equal
/// iff they were produced by the same `EntityStore::new()` call.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub(crate) fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// The raw 64-bit value backing this handle.
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// An entity's physical location: which table, and which row within it.
///
/// Glossary calls this a "Pointer"; named `EntityLocation` here to match the
/// rest of the crate's naming (table/row, not pointer/offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub table_index: usize,
    pub row_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_eight_bytes() {
        assert_eq!(std::mem::size_of::<EntityId>(), 8);
    }

    #[test]
    fn equality_is_identity() {
        let a = EntityId::from_raw(3);
        let b = EntityId::from_raw(3);
        let c = EntityId::from_raw(4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
