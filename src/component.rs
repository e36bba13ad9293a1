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

//! Component descriptors and the namespaced component-kind registry.
//!
//! The registry is the Rust realization of the "component-set declaration
//! mechanism" external collaborator: a two-level namespaced map of
//! component kinds from which the store derives column names, type tokens,
//! sizes and alignments. The store never sees `T` again after registration —
//! only the typed front door (`EntityStore::set_component`/`get_component`)
//! does.

use std::any::TypeId;
use std::collections::HashMap;

use rustc_hash::FxHashMap;

/// Marker trait for anything that can be stored as a component.
///
/// Components must be `'static` (no borrowed data); the blanket impl makes
/// every eligible type a component automatically, same as the reference
/// crate's `Component` trait.
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// A process-unique identifier for a type.
///
/// Backed by `TypeId`, which already satisfies the only contract a type
/// token needs: equality iff identical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeToken(pub(crate) TypeId);

impl TypeToken {
    pub fn of<T: Component>() -> Self {
        Self(TypeId::of::<T>())
    }
}

/// Per-column metadata: a stable column name, a type token, and the raw
/// layout needed to size and align the column's byte buffer.
#[derive(Clone)]
pub struct ComponentDescriptor {
    pub(crate) name: Box<str>,
    pub(crate) type_token: TypeToken,
    pub(crate) size: usize,
    pub(crate) align: usize,
    pub(crate) drop_fn: Option<unsafe fn(*mut u8)>,
}

impl ComponentDescriptor {
    pub(crate) fn of<T: Component>(name: &str) -> Self {
        Self {
            name: name.into(),
            type_token: TypeToken::of::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>().max(1),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr: *mut u8| unsafe { std::ptr::drop_in_place(ptr as *mut T) })
            } else {
                None
            },
        }
    }

    /// The canonical column name `"<namespace>.<component>"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_token(&self) -> TypeToken {
        self.type_token
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }
}

/// The `id` column's descriptor, present in every table by construction.
pub(crate) fn id_descriptor() -> ComponentDescriptor {
    ComponentDescriptor::of::<crate::entity::EntityId>("id")
}

/// A namespaced map of component kinds: `{ namespace -> { component -> T } }`.
///
/// Built once up front and handed to `EntityStore::new`; the store derives
/// column identity from it but otherwise treats components as opaque bytes.
#[derive(Default)]
pub struct ComponentRegistry {
    by_key: FxHashMap<(Box<str>, Box<str>), ComponentDescriptor>,
    namespaces: HashMap<Box<str>, Vec<Box<str>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a component kind under `namespace.name` with Rust type `T`.
    pub fn register<T: Component>(&mut self, namespace: &str, name: &str) -> &mut Self {
        let column_name = format!("{namespace}.{name}");
        let descriptor = ComponentDescriptor::of::<T>(&column_name);
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .push(name.into());
        self.by_key
            .insert((namespace.into(), name.into()), descriptor);
        self
    }

    /// Look up the descriptor for a declared `(namespace, name)` pair.
    pub fn descriptor(&self, namespace: &str, name: &str) -> Option<&ComponentDescriptor> {
        self.by_key.get(&(namespace.into(), name.into()))
    }

    /// All component names declared under a namespace.
    pub fn components_in(&self, namespace: &str) -> &[Box<str>] {
        self.namespaces
            .get(namespace)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct Rotation {
        #[allow(dead_code)]
        degrees: f32,
    }

    #[test]
    fn derives_namespaced_column_name() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Rotation>("game", "rotation");
        let descriptor = registry.descriptor("game", "rotation").unwrap();
        assert_eq!(descriptor.name(), "game.rotation");
        assert_eq!(descriptor.size(), std::mem::size_of::<f32>());
    }

    #[test]
    fn type_tokens_distinguish_identical_layout() {
        struct Meters(f32);
        struct Seconds(f32);
        assert_ne!(TypeToken::of::<Meters>(), TypeToken::of::<Seconds>());
    }

    #[test]
    fn unknown_pair_is_absent() {
        let registry = ComponentRegistry::new();
        assert!(registry.descriptor("game", "location").is_none());
    }
}
