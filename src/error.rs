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

//! Error types.
//!
//! Only failures that cross the `EntityStore` boundary live here.
//! `TypeMismatch` is a programmer error and is raised by panicking with a
//! diagnostic (see `archetype::ArchetypeTable::set_typed`/`get_typed`)
//! rather than returned as a `Result` — it never crosses the boundary, it
//! aborts before returning at all.

use std::fmt;

/// Store-level error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A capacity-growing allocation failed. All partial state from the
    /// operation that triggered it has been rolled back.
    AllocationFailure,

    /// An `EntityId` not present in the index was used.
    EntityNotFound,

    /// `query()` was called with a query whose semantics are reserved but
    /// not implemented (`Query::Any`).
    UnsupportedQuery,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::AllocationFailure => write!(f, "allocation failure while growing a table"),
            EcsError::EntityNotFound => write!(f, "entity not found"),
            EcsError::UnsupportedQuery => {
                write!(f, "query semantics not implemented (Query::Any is reserved)")
            }
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EcsError>;
