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

//! Archetype-matching queries over component-name sets.

use crate::archetype::ArchetypeTable;
use crate::store::EntityStore;

/// A structural query over archetype column-name sets.
///
/// Groups are kept nested (`Vec<Vec<String>>`) so the shape can later carry
/// per-group disjunction without a breaking change; today every name in
/// every group is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Conjunction: the table must contain every component named in every
    /// group.
    All(Vec<Vec<String>>),

    /// Disjunction: semantics reserved, not implemented.
    /// `EntityStore::query` rejects this with `EcsError::UnsupportedQuery`.
    Any(Vec<Vec<String>>),
}

impl Query {
    /// Build an `All` query from a single flat list of component names —
    /// the common case of one conjunctive group.
    pub fn all<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::All(vec![names.into_iter().map(Into::into).collect()])
    }

    pub(crate) fn matches(&self, table: &ArchetypeTable) -> bool {
        match self {
            Query::All(groups) => groups
                .iter()
                .flatten()
                .all(|name| table.has_component(name)),
            Query::Any(_) => unreachable!("Query::Any is rejected before a QueryIterator exists"),
        }
    }
}

/// Walks `tables` in insertion order starting after the void archetype,
/// yielding every non-empty table whose column-name set satisfies the
/// query.
///
/// Holds a borrow of the `EntityStore`; the borrow checker statically
/// prevents any mutation during iteration, rather than merely documenting
/// that precondition.
pub struct QueryIterator<'a> {
    pub(crate) store: &'a EntityStore,
    pub(crate) query: Query,
    pub(crate) next_index: usize,
}

impl<'a> std::fmt::Debug for QueryIterator<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryIterator")
            .field("query", &self.query)
            .field("next_index", &self.next_index)
            .finish()
    }
}

impl<'a> Iterator for QueryIterator<'a> {
    type Item = &'a ArchetypeTable;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_index < self.store.table_count() {
            let table = self.store.table_at(self.next_index);
            self.next_index += 1;
            if !table.is_empty() && self.query.matches(table) {
                return Some(table);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_query_requires_every_flattened_name() {
        let q = Query::All(vec![vec!["game.rotation".to_string()]]);
        match &q {
            Query::All(groups) => assert_eq!(groups.len(), 1),
            _ => panic!("expected All"),
        }
    }
}
