// Copyright 2025 Eric Jingryd (tidynest@proton.me)
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

//! src/core/mod.rs
//!
//! Core business logic module
//!
//! This module contains the fundamental data structures and algorithms for
//! keyboard configuration management, including:
//! - The `"layout (variant)"` codec and configuration types
//! - The layout catalog built from the platform input registry
//! - The layout set manager driving the live engine seam
//!
//! All business logic is isolated from D-Bus, subprocess and file I/O
//! concerns to enable comprehensive unit testing without a display server
//! or a running locale service.

pub mod catalog;
pub mod manager;
pub mod registry;
pub mod types;

pub use catalog::LayoutCatalog;
pub use manager::{EngineState, LayoutEngine, LayoutSetError, LayoutSetManager};
pub use registry::{CatalogEntry, InputRegistry, RegistryData, RegistryError, XkbRulesRegistry};
pub use types::{KeyboardConfig, LayoutSpec, MalformedLayout};

#[cfg(test)]
mod tests;
