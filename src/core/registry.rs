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

//! src/core/registry.rs
//!
//! Platform input-registry access
//!
//! The set of layouts, variants and switching options a system knows about
//! lives in the XKB rules registry. This module consumes it as one batch
//! query (`InputRegistry::load`) returning three mappings:
//! - language description → layouts available for that language
//! - base layout name → layouts available for that country/base layout
//! - switching-option name → display string
//!
//! The production source parses the plain-text rules listing
//! (`/usr/share/X11/xkb/rules/evdev.lst`) with nom line parsers. The
//! listing has `! section` headers followed by indented `name description`
//! entries; variant descriptions carry their parent layout as a
//! `parent: description` prefix.
//!
//! The registry is read once at startup and never refreshed; the resulting
//! `RegistryData` is immutable for the process lifetime.

use nom::{
    character::complete::{char, space0, space1},
    combinator::rest,
    bytes::complete::take_while1,
    sequence::preceded,
    IResult, Parser,
};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::types::LayoutSpec;

/// Errors raised while loading the input registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The rules listing could not be read.
    #[error("cannot read registry listing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An indented entry line did not split into name and description.
    /// Not normally raised; the platform listing is machine-generated.
    #[error("malformed registry entry on line {line}: {content:?}")]
    MalformedEntry { line: usize, content: String },
}

/// One layout the registry knows about, with its display description.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CatalogEntry {
    /// The layout (and possibly variant) this entry names.
    pub spec: LayoutSpec,
    /// Human-readable description, e.g. "Czech (QWERTY)".
    pub description: String,
}

/// The registry's bulk contents: the three mappings the catalog is built
/// from. Within each group the base layout precedes its variants.
#[derive(Clone, Debug, Default)]
pub struct RegistryData {
    /// Language description → layouts for that language, sorted by language.
    pub language_layouts: BTreeMap<String, Vec<CatalogEntry>>,
    /// Base layout name → layouts for that country/base layout.
    pub country_layouts: HashMap<String, Vec<CatalogEntry>>,
    /// Layout-group switching options with their display strings.
    pub switch_options: Vec<(String, String)>,
}

/// Read-only source of layout and switching-option data.
///
/// One-shot bulk read, intended to run once at process start. Implemented
/// by `XkbRulesRegistry` in production and by in-memory fakes in tests.
pub trait InputRegistry {
    /// Loads the full registry contents in one pass.
    fn load(&self) -> Result<RegistryData, RegistryError>;
}

/// Production registry source backed by the XKB rules listing file.
#[derive(Debug)]
pub struct XkbRulesRegistry {
    listing: PathBuf,
}

impl XkbRulesRegistry {
    /// The rules listing shipped by xkeyboard-config on evdev systems.
    pub const DEFAULT_LISTING: &'static str = "/usr/share/X11/xkb/rules/evdev.lst";

    /// Creates a registry reading the platform default listing.
    pub fn new() -> Self {
        Self::with_listing(PathBuf::from(Self::DEFAULT_LISTING))
    }

    /// Creates a registry reading an alternate listing file.
    pub fn with_listing(listing: PathBuf) -> Self {
        Self { listing }
    }
}

impl Default for XkbRulesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InputRegistry for XkbRulesRegistry {
    fn load(&self) -> Result<RegistryData, RegistryError> {
        let content = fs::read_to_string(&self.listing).map_err(|source| RegistryError::Io {
            path: self.listing.clone(),
            source,
        })?;

        parse_listing(&content)
    }
}

/// Sections of the rules listing this parser cares about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Section {
    Layout,
    Variant,
    Option,
    Other,
}

/// Parse a complete rules listing into registry data.
///
/// Walks the listing line by line, tracking the current `! section`, and
/// nom-parses each indented entry. Sections other than layout, variant and
/// option (models, keycodes) are skipped wholesale.
///
/// # Errors
///
/// Returns `RegistryError::MalformedEntry` for an indented line in a
/// relevant section that does not parse as `name description` (or, for
/// variants, whose description lacks the `parent:` prefix).
pub fn parse_listing(content: &str) -> Result<RegistryData, RegistryError> {
    let mut section = Section::Other;
    let mut layouts: Vec<(String, String)> = Vec::new();
    let mut variants: Vec<(String, String, String)> = Vec::new();
    let mut options: Vec<(String, String)> = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line_num = line_num + 1; // Human-readable numbers start at 1

        if line.trim().is_empty() {
            continue;
        }

        // Section headers reset the parsing context
        if let Ok((_, name)) = parse_section_header(line) {
            section = match name.trim() {
                "layout" => Section::Layout,
                "variant" => Section::Variant,
                "option" => Section::Option,
                _ => Section::Other,
            };
            continue;
        }

        if section == Section::Other {
            continue;
        }

        let malformed = |_| RegistryError::MalformedEntry {
            line: line_num,
            content: line.trim().to_string(),
        };

        let (_, (name, description)) = parse_entry(line).map_err(malformed)?;

        match section {
            Section::Layout => layouts.push((name.to_string(), description.to_string())),
            Section::Variant => {
                let (_, (parent, variant_desc)) =
                    parse_variant_description(description).map_err(malformed)?;
                variants.push((
                    name.to_string(),
                    parent.to_string(),
                    variant_desc.to_string(),
                ));
            }
            Section::Option => options.push((name.to_string(), description.to_string())),
            Section::Other => unreachable!(),
        }
    }

    Ok(assemble(layouts, variants, options))
}

/// Build the three mappings from the raw section contents.
fn assemble(
    layouts: Vec<(String, String)>,
    variants: Vec<(String, String, String)>,
    options: Vec<(String, String)>,
) -> RegistryData {
    let mut data = RegistryData::default();

    // Base layouts first so they lead their group; language groups key off
    // the layout description, country groups off the layout name.
    let descriptions: HashMap<&str, &str> = layouts
        .iter()
        .map(|(name, desc)| (name.as_str(), desc.as_str()))
        .collect();

    for (name, description) in &layouts {
        let entry = CatalogEntry {
            spec: LayoutSpec::new(name, ""),
            description: description.clone(),
        };
        data.language_layouts
            .entry(description.clone())
            .or_default()
            .push(entry.clone());
        data.country_layouts
            .entry(name.clone())
            .or_default()
            .push(entry);
    }

    for (variant, parent, description) in &variants {
        let Some(parent_description) = descriptions.get(parent.as_str()) else {
            log::debug!(
                "variant '{}' references unknown layout '{}', skipping",
                variant,
                parent
            );
            continue;
        };

        let entry = CatalogEntry {
            spec: LayoutSpec::new(parent, variant),
            description: description.clone(),
        };
        data.language_layouts
            .entry((*parent_description).to_string())
            .or_default()
            .push(entry.clone());
        data.country_layouts
            .entry(parent.clone())
            .or_default()
            .push(entry);
    }

    // Only layout-group switching options; the registry also lists compose
    // and caps-lock behaviour options we have no use for here.
    data.switch_options = options
        .into_iter()
        .filter(|(name, _)| name.starts_with("grp:"))
        .collect();

    data
}

/// Parse a `! section` header line, returning the section name.
fn parse_section_header(input: &str) -> IResult<&str, &str> {
    preceded((char('!'), space1), rest).parse(input)
}

/// Parse an indented `name  description` entry line.
fn parse_entry(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, _) = space1(input)?;
    let (input, name) = take_while1(|c: char| !c.is_whitespace())(input)?;
    let (input, _) = space1(input)?;
    let (input, description) = rest(input)?;

    Ok((input, (name, description.trim())))
}

/// Parse a variant description of the form `parent: description`.
fn parse_variant_description(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, parent) = take_while1(|c: char| c != ':' && !c.is_whitespace())(input)?;
    let (input, _) = (char(':'), space0).parse(input)?;
    let (input, description) = rest(input)?;

    Ok((input, (parent, description.trim())))
}
