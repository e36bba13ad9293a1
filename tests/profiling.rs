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

//! Exercises schema transitions with a real `tracing` subscriber installed,
//! the way `profile_spawn` does in the reference crate. Only compiled when
//! the `profiling` feature is enabled.

#![cfg(feature = "profiling")]

use archetype_ecs::{ComponentRegistry, EntityStore};

#[test]
fn schema_transitions_emit_spans_without_panicking() {
    let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut registry = ComponentRegistry::new();
    registry.register::<f32>("game", "rotation");
    let mut store = EntityStore::new(registry);

    let e = store.spawn().unwrap();
    store.set_component(e, "game", "rotation", 1.0f32).unwrap();
    store.remove_component(e, "game", "rotation").unwrap();
}
