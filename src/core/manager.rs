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

//! src/core/manager.rs
//!
//! Layout set manager: the mutation protocol for the live layout set
//!
//! The X layout configuration is handled by two parallel lists: a list of
//! layouts and a list of variants. Index-matching items (as if zipped) form
//! the real layouts, e.g. `("cz", "qwerty")` for "cz (qwerty)". This module
//! owns every mutation of those lists and keeps them mirroring the live
//! engine: a change is pushed to the engine immediately, and a rejected
//! activation rolls the lists back, because the engine's own state is
//! authoritative and unmodified after a rejection.
//!
//! The engine itself sits behind the `LayoutEngine` trait so the manager
//! can be driven against a fake in tests without a display server.

use thiserror::Error;

use crate::core::types::{LayoutSpec, MalformedLayout};

/// Errors raised by layout set mutations.
#[derive(Debug, Error)]
pub enum LayoutSetError {
    /// The live engine rejected the combined layout/option set, e.g. a
    /// platform limit on simultaneous layouts.
    #[error("failed to activate layout set [{layouts}]: {reason}")]
    Activation { layouts: String, reason: String },

    /// Removal target is not among the active exact layout/variant pairs.
    #[error("'{0}' is not in the list of active layouts")]
    NotFound(String),

    /// The engine state could not be read.
    #[error("layout engine query failed: {0}")]
    Engine(String),

    /// A layout specification failed to parse.
    #[error(transparent)]
    Malformed(#[from] MalformedLayout),
}

/// Snapshot of the engine's layout configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EngineState {
    /// Layout identifiers, in priority order.
    pub layouts: Vec<String>,
    /// Variant identifiers, index-aligned with `layouts`. May start out
    /// shorter than `layouts` on a freshly initialised server.
    pub variants: Vec<String>,
    /// Option strings, switching and otherwise.
    pub options: Vec<String>,
}

/// The live input engine's view of the keyboard configuration.
///
/// Implemented against the running session in production (`ipc::xkb`) and
/// by in-memory fakes in tests. `activate` is all-or-nothing: on `Err` the
/// engine keeps its previous configuration.
pub trait LayoutEngine {
    /// Reads the engine's current configuration.
    fn snapshot(&mut self) -> Result<EngineState, LayoutSetError>;

    /// Makes the given configuration the active one.
    fn activate(
        &mut self,
        layouts: &[String],
        variants: &[String],
        options: &[String],
    ) -> Result<(), LayoutSetError>;

    /// Display name of the currently active layout group.
    fn active_layout_name(&mut self) -> Result<String, LayoutSetError>;
}

/// Ordered, de-duplicated set of active X11 layouts plus switching options.
///
/// # Example
/// ```no_run
/// use installer_keyboard_manager::core::LayoutSetManager;
/// use installer_keyboard_manager::ipc::XkbSessionEngine;
///
/// let mut manager = LayoutSetManager::new(XkbSessionEngine::new()?)?;
/// manager.add("cz (qwerty)")?;
/// manager.add("us")?;
/// # Ok::<(), installer_keyboard_manager::core::LayoutSetError>(())
/// ```
#[derive(Debug)]
pub struct LayoutSetManager<E: LayoutEngine> {
    engine: E,
    layouts: Vec<String>,
    variants: Vec<String>,
    options: Vec<String>,
}

impl<E: LayoutEngine> LayoutSetManager<E> {
    /// Creates a manager mirroring the engine's current configuration.
    ///
    /// Servers are commonly initialised with layouts but no variant
    /// entries; since exact-pair matching needs the two lists index
    /// aligned, missing variants are padded with empty strings and the
    /// padded set is activated so the engine agrees.
    ///
    /// # Errors
    ///
    /// Fails if the engine cannot be queried or rejects the padded set.
    pub fn new(mut engine: E) -> Result<Self, LayoutSetError> {
        let state = engine.snapshot()?;

        let mut manager = Self {
            engine,
            layouts: state.layouts,
            variants: state.variants,
            options: state.options,
        };

        if manager.variants.len() < manager.layouts.len() {
            manager.variants.resize(manager.layouts.len(), String::new());
            manager.reactivate()?;
        }

        Ok(manager)
    }

    /// Adds a layout given as `"layout"` or `"layout (variant)"`.
    ///
    /// Adding an exact layout/variant pair that is already active is a
    /// no-op. On engine rejection the lists are rolled back and the error
    /// returned.
    ///
    /// # Errors
    ///
    /// `Malformed` for an unparseable specification, `Activation` when the
    /// engine rejects the grown set.
    pub fn add(&mut self, layout: &str) -> Result<(), LayoutSetError> {
        let spec = LayoutSpec::parse(layout)?;

        if self.position_of(&spec).is_some() {
            return Ok(());
        }

        self.layouts.push(spec.layout);
        self.variants.push(spec.variant);

        if let Err(err) = self.reactivate() {
            self.layouts.pop();
            self.variants.pop();
            return Err(err);
        }

        Ok(())
    }

    /// Removes a layout given as `"layout"` or `"layout (variant)"`.
    ///
    /// Only an exact layout/variant pair matches: removing `"cz"` does not
    /// remove an active `"cz (qwerty)"`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no exact pair is active, `Activation` when the
    /// engine rejects the shrunk set (lists rolled back).
    pub fn remove(&mut self, layout: &str) -> Result<(), LayoutSetError> {
        let spec = LayoutSpec::parse(layout)?;

        let idx = self
            .position_of(&spec)
            .ok_or_else(|| LayoutSetError::NotFound(spec.name()))?;

        let removed_layout = self.layouts.remove(idx);
        let removed_variant = self.variants.remove(idx);

        if let Err(err) = self.reactivate() {
            self.layouts.insert(idx, removed_layout);
            self.variants.insert(idx, removed_variant);
            return Err(err);
        }

        Ok(())
    }

    /// Replaces the whole active layout list, wholesale.
    ///
    /// Every entry is parsed before anything is mutated, so one bad entry
    /// fails the call with the lists untouched.
    ///
    /// # Errors
    ///
    /// `Malformed` for any unparseable entry, `Activation` when the engine
    /// rejects the new set (lists rolled back).
    pub fn replace(&mut self, layouts: &[String]) -> Result<(), LayoutSetError> {
        let mut new_layouts = Vec::with_capacity(layouts.len());
        let mut new_variants = Vec::with_capacity(layouts.len());

        for text in layouts {
            let spec = LayoutSpec::parse(text)?;
            new_layouts.push(spec.layout);
            new_variants.push(spec.variant);
        }

        let previous_layouts = std::mem::replace(&mut self.layouts, new_layouts);
        let previous_variants = std::mem::replace(&mut self.variants, new_variants);

        if let Err(err) = self.reactivate() {
            self.layouts = previous_layouts;
            self.variants = previous_variants;
            return Err(err);
        }

        Ok(())
    }

    /// Replaces the layout-switching options, preserving everything else.
    ///
    /// Options not denoting a layout-group switch (compose key, caps-lock
    /// behaviour, ...) are preserved verbatim; only the switching subset
    /// (options containing `"grp:"`) is replaced by `options`.
    ///
    /// # Errors
    ///
    /// `Activation` when the engine rejects the new option set (options
    /// rolled back).
    pub fn set_switch_options(&mut self, options: &[String]) -> Result<(), LayoutSetError> {
        let mut new_options: Vec<String> = self
            .options
            .iter()
            .filter(|opt| !opt.contains("grp:"))
            .cloned()
            .collect();
        new_options.extend(options.iter().cloned());

        let previous = std::mem::replace(&mut self.options, new_options);

        if let Err(err) = self.reactivate() {
            self.options = previous;
            return Err(err);
        }

        Ok(())
    }

    /// Display name of the currently active layout group. Read-only.
    pub fn current_layout_name(&mut self) -> Result<String, LayoutSetError> {
        self.engine.active_layout_name()
    }

    /// The active layouts in canonical text form, in priority order.
    pub fn active_layouts(&self) -> Vec<String> {
        self.layouts
            .iter()
            .zip(&self.variants)
            .map(|(layout, variant)| LayoutSpec::new(layout, variant).name())
            .collect()
    }

    /// The active option strings, switching and otherwise.
    pub fn active_options(&self) -> &[String] {
        &self.options
    }

    /// Index of the exact layout/variant pair, if active.
    fn position_of(&self, spec: &LayoutSpec) -> Option<usize> {
        self.layouts
            .iter()
            .zip(&self.variants)
            .position(|(layout, variant)| *layout == spec.layout && *variant == spec.variant)
    }

    /// Pushes the current lists to the engine.
    fn reactivate(&mut self) -> Result<(), LayoutSetError> {
        self.engine
            .activate(&self.layouts, &self.variants, &self.options)
    }
}
