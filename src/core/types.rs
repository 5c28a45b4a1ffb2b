//! src/core/types.rs
//!
//! Core type definitions for keyboard configuration management
//!
//! This module defines the fundamental types used throughout the application:
//! - `LayoutSpec`: One X11 layout choice, optionally refined by a variant
//! - `KeyboardConfig`: The full keyboard configuration being installed
//!
//! The textual `"layout (variant)"` notation parsed and produced here is the
//! interchange format used by every other module: the layout set manager,
//! the locale service client, the persister and the CLI all speak it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error raised when a layout specification has an empty layout identifier.
///
/// The codec accepts any character content, so this is the only way a
/// specification can be syntactically rejected.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("malformed layout specification: {0:?} has no layout identifier")]
pub struct MalformedLayout(pub String);

/// One keyboard layout choice: a layout identifier plus an optional variant.
///
/// The canonical text form is `"layout (variant)"` when the variant is
/// non-empty, `"layout"` otherwise. Parsing splits on the *first* `"("` and
/// the *last* `")"`.
///
/// # Round-trip limitation
///
/// `parse` and `Display` are inverse for any variant containing no `")"`
/// and any layout containing no `"("`. A variant whose text itself contains
/// `")"` does not survive the round trip; this matches the notation's
/// established behaviour and is pinned by a test rather than "fixed" with a
/// stricter grammar.
///
/// # Example
/// ```
/// use installer_keyboard_manager::core::LayoutSpec;
///
/// let spec = LayoutSpec::parse("cz (qwerty)")?;
/// assert_eq!(spec.layout, "cz");
/// assert_eq!(spec.variant, "qwerty");
/// assert_eq!(spec.to_string(), "cz (qwerty)");
/// # Ok::<(), installer_keyboard_manager::core::MalformedLayout>(())
/// ```
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct LayoutSpec {
    /// Layout identifier (e.g. "cz", "us"). Never empty.
    pub layout: String,

    /// Variant identifier (e.g. "qwerty"). May be empty.
    pub variant: String,
}

impl LayoutSpec {
    /// Creates a spec from already-split layout and variant identifiers.
    pub fn new(layout: &str, variant: &str) -> Self {
        Self {
            layout: layout.to_string(),
            variant: variant.to_string(),
        }
    }

    /// Parses `"layout"` or `"layout (variant)"` text.
    ///
    /// The variant is the substring between the first `"("` and the last
    /// `")"`; with no closing `")"` it extends to the end of the text. The
    /// layout is everything before the first `"("`, trimmed. Character
    /// content is not validated; semantic validity is a catalog question,
    /// not a parsing one.
    ///
    /// # Errors
    ///
    /// Returns `MalformedLayout` when the layout identifier comes out
    /// empty (e.g. `""` or `"(qwerty)"`).
    pub fn parse(text: &str) -> Result<Self, MalformedLayout> {
        let (layout, variant) = match text.find('(') {
            None => (text.trim(), ""),
            Some(lbracket) => {
                let variant = match text.rfind(')') {
                    Some(rbracket) if rbracket > lbracket => &text[lbracket + 1..rbracket],
                    // ")" before "(" leaves nothing between them
                    Some(_) => "",
                    None => &text[lbracket + 1..],
                };
                (text[..lbracket].trim(), variant)
            }
        };

        if layout.is_empty() {
            return Err(MalformedLayout(text.to_string()));
        }

        Ok(Self::new(layout, variant))
    }

    /// Returns the canonical `"layout (variant)"` / `"layout"` text form.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LayoutSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant.is_empty() {
            write!(f, "{}", self.layout)
        } else {
            write!(f, "{} ({})", self.layout, self.variant)
        }
    }
}

impl FromStr for LayoutSpec {
    type Err = MalformedLayout;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The keyboard configuration to activate and persist for the target system.
///
/// Built from user or kickstart input before installation begins, filled in
/// by the activation orchestrator, and consumed read-only by the persister.
///
/// All fields are optional at construction time; after reconciliation at
/// least one of `vc_keymap` / `x_layouts` is set, and the two are
/// consistent (each derivable from the other via the locale service).
///
/// # Example
/// ```
/// use installer_keyboard_manager::core::KeyboardConfig;
///
/// let config: KeyboardConfig = toml::from_str(r#"
///     vc_keymap = "cz"
///     x_layouts = ["cz (qwerty)", "us"]
///     switch_options = ["grp:alt_shift_toggle"]
/// "#).unwrap();
/// assert_eq!(config.primary_layout(), Some("cz (qwerty)"));
/// ```
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Console (virtual terminal) keymap identifier, e.g. "cz-qwerty".
    pub vc_keymap: Option<String>,

    /// Active X11 layouts in canonical text form, in activation priority
    /// order. The first entry is the default layout.
    pub x_layouts: Vec<String>,

    /// Options used to cycle between multiple active layouts at runtime,
    /// e.g. "grp:alt_shift_toggle".
    pub switch_options: Vec<String>,

    /// Single value from the deprecated one-string configuration form,
    /// ambiguous between a console keymap and an X11 layout name.
    pub legacy_keyboard: Option<String>,
}

impl KeyboardConfig {
    /// Returns the default (highest-priority) X11 layout, if any.
    pub fn primary_layout(&self) -> Option<&str> {
        self.x_layouts.first().map(String::as_str)
    }
}
