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

//! Dense, column-oriented storage for all entities sharing one archetype.

use std::alloc::{self, Layout};
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use rustc_hash::{FxHashMap, FxHasher};
use std::hash::Hasher;

use crate::component::{Component, ComponentDescriptor, TypeToken};
use crate::entity::EntityId;
use crate::error::{EcsError, Result};

/// FNV-style content hash of a column name, used to fold a table's identity
/// hash. Deterministic across runs within a process (unlike the default
/// `RandomState` hasher), which matters because the hash is used as a
/// lookup key, not just an internal bucket index.
pub(crate) fn hash_string(s: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(s.as_bytes());
    hasher.finish()
}

/// A single component column's byte buffer, allocated at `descriptor.align`
/// rather than the 1-byte guarantee a plain `Vec<u8>` gives — required
/// because cells are read and written through `*const T`/`*mut T` casts for
/// arbitrary `T`.
struct Column {
    descriptor: ComponentDescriptor,
    ptr: NonNull<u8>,
    capacity_bytes: usize,
}

impl Column {
    fn new(descriptor: ComponentDescriptor) -> Self {
        Self {
            descriptor,
            ptr: NonNull::dangling(),
            capacity_bytes: 0,
        }
    }

    fn layout(&self, bytes: usize) -> Option<Layout> {
        Layout::from_size_align(bytes, self.descriptor.align).ok()
    }

    /// The layout `grow_to(capacity_rows)` would allocate, without touching
    /// the allocator — lets `ArchetypeTable::reserve` validate every
    /// column's target size up front, so a `capacity * size` overflow on
    /// one column can't leave an earlier column's buffer grown while the
    /// table as a whole reports the old (smaller) `capacity`.
    fn target_layout(&self, capacity_rows: usize) -> Result<Option<Layout>> {
        if self.descriptor.size == 0 {
            return Ok(None);
        }
        let new_bytes = capacity_rows
            .checked_mul(self.descriptor.size)
            .ok_or(EcsError::AllocationFailure)?;
        self.layout(new_bytes).map(Some).ok_or(EcsError::AllocationFailure)
    }

    /// Grow the backing allocation to the already-validated `new_layout`,
    /// reallocating in place via `std::alloc` so the buffer stays aligned to
    /// `descriptor.align`. A no-op for zero-sized components (`new_layout`
    /// is `None`).
    fn grow_to(&mut self, new_layout: Option<Layout>) -> Result<()> {
        let Some(new_layout) = new_layout else {
            return Ok(());
        };

        let raw = unsafe {
            if self.capacity_bytes == 0 {
                alloc::alloc(new_layout)
            } else {
                let old_layout = self
                    .layout(self.capacity_bytes)
                    .expect("previously allocated layout must still be valid");
                alloc::realloc(self.ptr.as_ptr(), old_layout, new_layout.size())
            }
        };

        self.ptr = NonNull::new(raw).ok_or(EcsError::AllocationFailure)?;
        self.capacity_bytes = new_layout.size();
        Ok(())
    }

    unsafe fn ptr(&self, row: usize) -> *const u8 {
        if self.descriptor.size == 0 {
            self.ptr.as_ptr()
        } else {
            self.ptr.as_ptr().add(row * self.descriptor.size)
        }
    }

    unsafe fn ptr_mut(&mut self, row: usize) -> *mut u8 {
        if self.descriptor.size == 0 {
            self.ptr.as_ptr()
        } else {
            self.ptr.as_ptr().add(row * self.descriptor.size)
        }
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if self.descriptor.size != 0 && self.capacity_bytes != 0 {
            let layout = self
                .layout(self.capacity_bytes)
                .expect("previously allocated layout must still be valid");
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

/// A single dense table holding every entity that currently carries an
/// identical set of component names — an archetype.
///
/// Columns are kept sorted by type token ascending, with the `id` column
/// always forced into position 0. All columns share `len` and `capacity`.
/// `hash` is the xor-fold content hash of the column-name multiset after
/// that canonical sort.
pub struct ArchetypeTable {
    columns: Vec<Column>,
    column_by_name: FxHashMap<Box<str>, usize>,
    len: usize,
    capacity: usize,
    hash: u64,
}

impl std::fmt::Debug for ArchetypeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchetypeTable")
            .field("columns", &self.columns.iter().map(|c| c.descriptor.name()).collect::<Vec<_>>())
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("hash", &self.hash)
            .finish()
    }
}

impl ArchetypeTable {
    /// Build a table from an explicit set of column descriptors (including
    /// `id`). Columns are canonically sorted and the content hash computed.
    pub(crate) fn new(mut descriptors: Vec<ComponentDescriptor>) -> Self {
        let id_pos = descriptors
            .iter()
            .position(|d| d.name() == "id")
            .expect("ArchetypeTable::new: descriptors must include the `id` column");
        let id_descriptor = descriptors.remove(id_pos);
        descriptors.sort_by_key(|d| d.type_token());

        let mut columns = Vec::with_capacity(descriptors.len() + 1);
        columns.push(Column::new(id_descriptor));
        columns.extend(descriptors.into_iter().map(Column::new));

        let mut column_by_name = FxHashMap::default();
        for (idx, column) in columns.iter().enumerate() {
            column_by_name.insert(column.descriptor.name.clone(), idx);
        }

        let mut table = Self {
            columns,
            column_by_name,
            len: 0,
            capacity: 0,
            hash: 0,
        };
        table.recompute_hash();
        table
    }

    /// The table's content hash: xor-fold of `hash_string(name)` over every
    /// column, including `id`. Re-derived (not cached blindly) any time the
    /// column set changes.
    pub fn recompute_hash(&mut self) -> u64 {
        let mut h = 0u64;
        for column in &self.columns {
            h ^= hash_string(&column.descriptor.name);
        }
        self.hash = h;
        h
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Descriptors of every column, in canonical (id-first, type-token
    /// ascending) order.
    pub fn columns(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.columns.iter().map(|c| &c.descriptor)
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.column_by_name.contains_key(name)
    }

    pub fn has_components(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.has_component(n))
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.column_by_name.get(name).copied()
    }

    fn id_column_index(&self) -> usize {
        // id is always placed first by `new`.
        0
    }

    /// Read the entity id stored at `row`. `row` must be `< len`.
    pub fn id_at(&self, row: usize) -> EntityId {
        debug_assert!(row < self.len);
        unsafe { *(self.columns[self.id_column_index()].ptr(row) as *const EntityId) }
    }

    /// Grow capacity, if needed, to fit `additional` more rows on top of the
    /// current `len`, using `c <- c + c/2 + 8` (saturating) until
    /// `c >= len + additional`. Reallocates every column's buffer.
    fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self.len.saturating_add(additional);
        if self.capacity >= needed {
            return Ok(());
        }

        let mut new_capacity = self.capacity;
        while new_capacity < needed {
            new_capacity = new_capacity
                .saturating_add(new_capacity / 2)
                .saturating_add(8);
        }

        // Validate every column's target layout before growing any of them,
        // so a `capacity * size` overflow partway through the column list
        // can't leave an earlier column's buffer grown while `self.capacity`
        // still reports the old, smaller value.
        let layouts: Vec<Option<Layout>> = self
            .columns
            .iter()
            .map(|c| c.target_layout(new_capacity))
            .collect::<Result<_>>()?;

        for (column, layout) in self.columns.iter_mut().zip(layouts) {
            column.grow_to(layout)?;
        }

        self.capacity = new_capacity;
        Ok(())
    }

    /// Grow `len` by one, reserving capacity first. Row contents are
    /// unspecified until written.
    pub fn append_undefined(&mut self) -> Result<usize> {
        self.reserve(1)?;
        let row = self.len;
        self.len += 1;
        Ok(row)
    }

    /// Undo the most recent `append_undefined`. Precondition: no intervening
    /// mutation since that call.
    pub fn undo_append(&mut self) {
        debug_assert!(self.len > 0, "undo_append: table is already empty");
        self.len -= 1;
    }

    /// Overwrite one column's cell at `row` with a typed value.
    ///
    /// With the `checked` feature (default), a missing column or a type
    /// token mismatch panics with a diagnostic naming the column and both
    /// tokens — this is a precondition violation, not a recoverable error.
    /// Without `checked`, the column is trusted to exist and match; passing
    /// a wrong type token is undefined behaviour.
    pub fn set_typed<T: Component>(&mut self, row: usize, column_name: &str, value: T) {
        let idx = self.index_of(column_name);
        #[cfg(feature = "checked")]
        let idx = {
            let idx = idx.unwrap_or_else(|| {
                panic!("set_typed: archetype table has no column named `{column_name}`")
            });
            let found = self.columns[idx].descriptor.type_token();
            let expected = TypeToken::of::<T>();
            if found != expected {
                panic!(
                    "set_typed: type mismatch on column `{column_name}`: column holds {found:?}, caller supplied {expected:?}"
                );
            }
            idx
        };
        #[cfg(not(feature = "checked"))]
        let idx = idx.expect("set_typed: no such column (unchecked build trusts the caller)");

        let column = &mut self.columns[idx];
        if column.descriptor.size == 0 {
            // Zero-sized writes are no-ops; presence alone carries the
            // information.
            drop(value);
            return;
        }
        unsafe {
            std::ptr::write(column.ptr_mut(row) as *mut T, value);
        }
    }

    /// Read a clone of the value in one column's cell at `row`, or `None` if
    /// no such column exists. Same type-token discipline as `set_typed` for
    /// an existing column with a mismatched token.
    pub fn get_typed<T: Component + Clone>(&self, row: usize, column_name: &str) -> Option<T> {
        let idx = self.index_of(column_name)?;
        #[cfg(feature = "checked")]
        {
            let found = self.columns[idx].descriptor.type_token();
            let expected = TypeToken::of::<T>();
            if found != expected {
                panic!(
                    "get_typed: type mismatch on column `{column_name}`: column holds {found:?}, caller supplied {expected:?}"
                );
            }
        }
        let column = &self.columns[idx];
        if column.descriptor.size == 0 {
            // There is exactly one value of a zero-sized type.
            return Some(unsafe { MaybeUninit::<T>::uninit().assume_init() });
        }
        Some(unsafe { (&*(column.ptr(row) as *const T)).clone() })
    }

    /// Borrow a cell's raw bytes. The borrow's validity ends at the next
    /// capacity-growing or table-moving operation.
    pub fn get_raw(&self, row: usize, column_name: &str) -> Option<&[u8]> {
        let idx = self.index_of(column_name)?;
        let column = &self.columns[idx];
        if column.descriptor.size == 0 {
            return Some(&[]);
        }
        unsafe { Some(std::slice::from_raw_parts(column.ptr(row), column.descriptor.size)) }
    }

    /// Overwrite a cell's raw bytes. Precondition: `bytes.len() ==
    /// column.size()`.
    pub fn set_raw(&mut self, row: usize, column_name: &str, bytes: &[u8]) -> Option<()> {
        let idx = self.index_of(column_name)?;
        let column = &mut self.columns[idx];
        assert_eq!(
            bytes.len(),
            column.descriptor.size,
            "set_raw: byte length does not match column size"
        );
        if column.descriptor.size == 0 {
            return Some(());
        }
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), column.ptr_mut(row), column.descriptor.size);
        }
        Some(())
    }

    /// Run one column's destructor on `row` without touching `len` or any
    /// other column. Used to drop a component being dropped permanently by
    /// a schema transition (the column has no counterpart in the
    /// destination table, so its value is never moved anywhere else).
    pub(crate) fn drop_cell(&mut self, row: usize, column_name: &str) {
        let Some(idx) = self.index_of(column_name) else {
            return;
        };
        let column = &mut self.columns[idx];
        if column.descriptor.size == 0 {
            return;
        }
        if let Some(drop_fn) = column.descriptor.drop_fn {
            unsafe { drop_fn(column.ptr_mut(row)) };
        }
    }

    /// Remove `row` by copying the last row's bytes over it and shrinking
    /// `len`, running the displaced cell's destructor first. Returns the
    /// entity id that was swapped into `row`, if any — the caller
    /// (`EntityStore`) must fix up that entity's index entry; this method
    /// never touches the index. True deletion of an entity (`EntityStore::
    /// remove`) is the only caller — relocation uses `swap_remove_and_forget`
    /// instead, since relocation has already moved the row's values
    /// elsewhere and must not double-drop them.
    pub fn swap_remove(&mut self, row: usize) -> Option<EntityId> {
        self.swap_remove_impl(row, true)
    }

    /// Identical to `swap_remove` except no destructor is run on the
    /// vacated row — every live value in it has already been bitwise-copied
    /// out by the caller (a schema-transition relocation) and running
    /// `drop_fn` here would free memory the copy still references.
    pub(crate) fn swap_remove_and_forget(&mut self, row: usize) -> Option<EntityId> {
        self.swap_remove_impl(row, false)
    }

    fn swap_remove_impl(&mut self, row: usize, run_drop: bool) -> Option<EntityId> {
        assert!(
            row < self.len,
            "swap_remove: row {row} out of bounds (len {})",
            self.len
        );
        let last = self.len - 1;

        for column in &mut self.columns {
            if column.descriptor.size == 0 {
                continue;
            }
            let size = column.descriptor.size;
            unsafe {
                let dst = column.ptr_mut(row);
                if run_drop {
                    if let Some(drop_fn) = column.descriptor.drop_fn {
                        drop_fn(dst);
                    }
                }
                if row != last {
                    let src = column.ptr(last);
                    std::ptr::copy_nonoverlapping(src, dst, size);
                }
            }
        }

        self.len -= 1;
        if row != last {
            Some(self.id_at(row))
        } else {
            None
        }
    }
}

impl Drop for ArchetypeTable {
    fn drop(&mut self) {
        for column in &mut self.columns {
            let Some(drop_fn) = column.descriptor.drop_fn else {
                continue;
            };
            for row in 0..self.len {
                unsafe { drop_fn(column.ptr_mut(row)) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::id_descriptor;

    fn descriptor<T: Component>(name: &str) -> ComponentDescriptor {
        ComponentDescriptor::of::<T>(name)
    }

    fn table_with(names_and_sizes: &[(&str, usize)]) -> ArchetypeTable {
        let mut descriptors = vec![id_descriptor()];
        for (name, _) in names_and_sizes {
            descriptors.push(descriptor::<f32>(name));
        }
        ArchetypeTable::new(descriptors)
    }

    #[test]
    fn id_column_is_always_first() {
        let table = table_with(&[("game.x", 4)]);
        let names: Vec<_> = table.columns().map(|d| d.name().to_string()).collect();
        assert_eq!(names[0], "id");
    }

    #[test]
    fn append_and_swap_remove_round_trip() {
        let mut table = table_with(&[]);
        let e0 = EntityId::from_raw(0);
        let e1 = EntityId::from_raw(1);
        let r0 = table.append_undefined().unwrap();
        table.set_typed(r0, "id", e0);
        let r1 = table.append_undefined().unwrap();
        table.set_typed(r1, "id", e1);
        assert_eq!(table.len(), 2);

        let displaced = table.swap_remove(r0);
        assert_eq!(displaced, Some(e1));
        assert_eq!(table.len(), 1);
        assert_eq!(table.id_at(0), e1);
    }

    #[test]
    fn swap_remove_last_row_displaces_nothing() {
        let mut table = table_with(&[]);
        let e0 = EntityId::from_raw(0);
        let r0 = table.append_undefined().unwrap();
        table.set_typed(r0, "id", e0);
        assert_eq!(table.swap_remove(r0), None);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn capacity_grows_by_formula() {
        let mut table = table_with(&[]);
        for i in 0..20 {
            let r = table.append_undefined().unwrap();
            table.set_typed(r, "id", EntityId::from_raw(i));
        }
        assert!(table.capacity() >= 20);
        assert_eq!(table.len(), 20);
    }

    #[test]
    fn zero_sized_component_occupies_no_bytes_but_column_exists() {
        let mut descriptors = vec![id_descriptor()];
        descriptors.push(ComponentDescriptor::of::<()>("game.tag"));
        let mut table = ArchetypeTable::new(descriptors);
        assert!(table.has_component("game.tag"));

        let row = table.append_undefined().unwrap();
        table.set_typed(row, "id", EntityId::from_raw(0));
        table.set_typed(row, "game.tag", ());
        assert_eq!(table.get_typed::<()>(row, "game.tag"), Some(()));
        assert_eq!(table.get_raw(row, "game.tag"), Some(&[][..]));
    }

    #[test]
    fn reserve_overflow_is_reported_as_allocation_failure_not_a_panic() {
        // A column whose size alone overflows `capacity * size` forces the
        // checked_mul guard in `reserve` without ever touching the
        // allocator — the type is declared, never instantiated.
        struct Enormous([u8; 1 << 60]);
        let mut descriptors = vec![id_descriptor()];
        descriptors.push(ComponentDescriptor::of::<Enormous>("huge.blob"));
        let mut table = ArchetypeTable::new(descriptors);
        assert_eq!(table.append_undefined().unwrap_err(), EcsError::AllocationFailure);
        assert_eq!(table.len(), 0, "a failed append must not grow len");
        assert_eq!(table.capacity(), 0, "a failed append must not grow capacity");
    }

    #[test]
    fn hash_is_order_independent_xor_fold() {
        let a = table_with(&[("game.x", 4), ("game.y", 4)]);
        let mut descriptors = vec![id_descriptor()];
        descriptors.push(descriptor::<f32>("game.y"));
        descriptors.push(descriptor::<f32>("game.x"));
        let b = ArchetypeTable::new(descriptors);
        assert_eq!(a.hash(), b.hash());
    }
}
