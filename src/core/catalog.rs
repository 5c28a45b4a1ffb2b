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

//! src/core/catalog.rs
//!
//! Layout catalog built from the platform input registry
//!
//! The catalog answers the read-only questions the rest of the system asks
//! about layouts: is this name known at all, what should it be called in a
//! UI, which layout is the sensible default for a language or a
//! language/country pair, and which switching options exist.
//!
//! Loaded once at startup via `LayoutCatalog::from_registry` and immutable
//! afterwards. Construct it explicitly and pass it where it is needed; it
//! is a plain value, not a process-wide singleton.

use std::collections::{BTreeMap, HashMap};

use crate::core::registry::{CatalogEntry, InputRegistry, RegistryData, RegistryError};

/// Immutable catalog of known layouts and switching options.
#[derive(Clone, Debug, Default)]
pub struct LayoutCatalog {
    /// Language description → layouts, sorted by language for enumeration.
    language_layouts: BTreeMap<String, Vec<CatalogEntry>>,
    /// Base layout name → layouts for that country/base layout.
    country_layouts: HashMap<String, Vec<CatalogEntry>>,
    /// Canonical layout name → display string, e.g.
    /// "cz (qwerty)" → "Czech (Czech (QWERTY))".
    display_names: HashMap<String, String>,
    /// Switching options in registry order.
    switch_options: Vec<String>,
    /// Switching-option name → display string,
    /// e.g. "grp:alt_shift_toggle" → "Alt+Shift".
    switch_descriptions: HashMap<String, String>,
}

impl LayoutCatalog {
    /// Builds the catalog from one registry batch load.
    ///
    /// # Errors
    ///
    /// Propagates registry read or parse failures.
    pub fn from_registry(registry: &dyn InputRegistry) -> Result<Self, RegistryError> {
        Ok(Self::from_data(registry.load()?))
    }

    /// Builds the catalog from already-loaded registry data.
    pub fn from_data(data: RegistryData) -> Self {
        let mut display_names = HashMap::new();

        // Layouts are displayed as "Language (description)"; the layout's
        // presence in this map is also what makes it a valid choice.
        for (language, entries) in &data.language_layouts {
            for entry in entries {
                display_names.insert(
                    entry.spec.name(),
                    format!("{} ({})", language, entry.description),
                );
            }
        }

        let mut switch_options = Vec::new();
        let mut switch_descriptions = HashMap::new();
        for (name, description) in data.switch_options {
            switch_options.push(name.clone());
            switch_descriptions.insert(name, description);
        }

        Self {
            language_layouts: data.language_layouts,
            country_layouts: data.country_layouts,
            display_names,
            switch_options,
            switch_descriptions,
        }
    }

    /// Whether `name` (canonical text form) was a known layout at load time.
    pub fn is_valid(&self, name: &str) -> bool {
        self.display_names.contains_key(name)
    }

    /// Display string for a layout name, e.g. "Czech (Czech (QWERTY))".
    pub fn display_name(&self, name: &str) -> Option<&str> {
        self.display_names.get(name).map(String::as_str)
    }

    /// All known layout names, grouped by language and sorted by language.
    pub fn available_layouts(&self) -> impl Iterator<Item = String> + '_ {
        self.language_layouts
            .values()
            .flatten()
            .map(|entry| entry.spec.name())
    }

    /// Default layout for a language: the first one listed for it.
    /// The base layout leads its group, so this is the unrefined layout.
    pub fn default_language_layout(&self, language: &str) -> Option<String> {
        self.language_layouts
            .get(language)
            .and_then(|entries| entries.first())
            .map(|entry| entry.spec.name())
    }

    /// Default layout matching both a language and a country.
    ///
    /// Returns the first of the language's layouts that also appears in the
    /// country's list; if none does (or the country is unknown), falls back
    /// to the language default. Unknown language returns `None`.
    pub fn default_lang_country_layout(&self, language: &str, country: &str) -> Option<String> {
        let language_entries = self.language_layouts.get(language)?;
        let country_entries = self.country_layouts.get(country);

        let matches_both = country_entries.and_then(|country_entries| {
            language_entries
                .iter()
                .find(|entry| country_entries.iter().any(|c| c.spec == entry.spec))
        });

        match matches_both {
            Some(entry) => Some(entry.spec.name()),
            None => language_entries.first().map(|entry| entry.spec.name()),
        }
    }

    /// Available layout-group switching options, in registry order.
    pub fn switching_options(&self) -> &[String] {
        &self.switch_options
    }

    /// Display string for a switching option, e.g. "Alt+Shift".
    pub fn switch_option_description(&self, name: &str) -> Option<&str> {
        self.switch_descriptions.get(name).map(String::as_str)
    }
}
