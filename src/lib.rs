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

//! Archetype ECS - an archetype-partitioned entity-component database.
//!
//! Entities are grouped into dense, column-oriented [`ArchetypeTable`]s by
//! their exact component-name set. An [`EntityStore`] owns every table,
//! indexes entities by `(table, row)`, and relocates rows between tables
//! whenever a component is added or removed. [`Query`] selects tables
//! structurally, by the columns they carry, rather than by iterating
//! entities one at a time.
//!
//! Component kinds are declared once, namespaced, through a
//! [`ComponentRegistry`]; the store manipulates columns through their
//! [`ComponentDescriptor`]s afterwards, never through `T` directly.

pub mod archetype;
pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod store;

pub use archetype::ArchetypeTable;
pub use component::{Component, ComponentDescriptor, ComponentRegistry, TypeToken};
pub use entity::{EntityId, EntityLocation};
pub use error::{EcsError, Result};
pub use query::{Query, QueryIterator};
pub use store::{EntityStore, VOID_TABLE_INDEX};
