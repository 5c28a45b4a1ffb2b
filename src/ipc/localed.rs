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

//! src/ipc/localed.rs
//!
//! D-Bus client of the system locale service (`org.freedesktop.locale1`)
//!
//! The locale service is the only available oracle for converting between
//! console keymaps and X11 layouts, and querying it requires committing
//! the change: **every conversion is also an activation**. There is no
//! pure-query mode. `keymap_to_layout` really loads the console keymap on
//! the live system; `layout_to_keymap` really sets the X11 layout for
//! future sessions. Callers must treat a `ConversionError` as a request
//! that did not take effect.
//!
//! Calls are synchronous over the zbus blocking API, matching the
//! single-threaded call model of the rest of the crate. No timeout is
//! imposed here; a caller needing one must wrap these calls itself.

use thiserror::Error;
use zbus::blocking::Connection;

use crate::core::types::{LayoutSpec, MalformedLayout};

/// Errors raised by conversion calls.
///
/// Remote failures carry the step that failed (connection, method call or
/// property read) for diagnostics; whichever step it was, the requested
/// change did not take effect.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// A locale service call or property read failed.
    #[error("locale service step '{step}' failed: {source}")]
    Call {
        step: &'static str,
        #[source]
        source: zbus::Error,
    },

    /// The layout specification to convert failed to parse.
    #[error(transparent)]
    Malformed(#[from] MalformedLayout),
}

/// Converts between console keymaps and X11 layouts, activating as it goes.
///
/// Implemented by `LocaledClient` in production and by deterministic fakes
/// in tests. Both operations have live-system side effects; see the module
/// documentation.
pub trait KeymapConverter {
    /// Activates `keymap` as the console keymap and returns the X11
    /// layout/variant the locale service considers its best match, or
    /// `None` when the service has no match.
    fn keymap_to_layout(&self, keymap: &str) -> Result<Option<LayoutSpec>, ConversionError>;

    /// Activates the given `"layout"` / `"layout (variant)"` as the X11
    /// keyboard (persists across future X sessions) and returns the
    /// console keymap the locale service considers its best match, or
    /// `None` when the service has no match.
    fn layout_to_keymap(&self, layout: &str) -> Result<Option<String>, ConversionError>;
}

#[zbus::proxy(
    interface = "org.freedesktop.locale1",
    default_service = "org.freedesktop.locale1",
    default_path = "/org/freedesktop/locale1"
)]
trait Locale1 {
    /// args: keymap, keymap_toggle, convert, interactive. `convert` asks
    /// the service to derive the matching X11 configuration, `interactive`
    /// whether PolicyKit may prompt for credentials.
    #[zbus(name = "SetVConsoleKeyboard")]
    fn set_v_console_keyboard(
        &self,
        keymap: &str,
        keymap_toggle: &str,
        convert: bool,
        interactive: bool,
    ) -> zbus::Result<()>;

    /// args: layout, model, variant, options, convert, interactive.
    #[zbus(name = "SetX11Keyboard")]
    fn set_x11_keyboard(
        &self,
        layout: &str,
        model: &str,
        variant: &str,
        options: &str,
        convert: bool,
        interactive: bool,
    ) -> zbus::Result<()>;

    // The properties are read back right after a Set call; reading them
    // uncached avoids racing the service's PropertiesChanged signal.
    #[zbus(property(emits_changed_signal = "false"), name = "X11Layout")]
    fn x11_layout(&self) -> zbus::Result<String>;

    #[zbus(property(emits_changed_signal = "false"), name = "X11Variant")]
    fn x11_variant(&self) -> zbus::Result<String>;

    #[zbus(property(emits_changed_signal = "false"), name = "VConsoleKeymap")]
    fn vconsole_keymap(&self) -> zbus::Result<String>;
}

/// Production converter talking to systemd-localed on the system bus.
pub struct LocaledClient {
    proxy: Locale1ProxyBlocking<'static>,
}

impl LocaledClient {
    /// Connects to the locale service on the system bus.
    ///
    /// # Errors
    ///
    /// Returns a `Call` error with step `"connect"` when the bus or the
    /// service is unreachable.
    pub fn connect() -> Result<Self, ConversionError> {
        let connection = Connection::system().map_err(|source| ConversionError::Call {
            step: "connect",
            source,
        })?;

        let proxy =
            Locale1ProxyBlocking::new(&connection).map_err(|source| ConversionError::Call {
                step: "connect",
                source,
            })?;

        Ok(Self { proxy })
    }
}

impl KeymapConverter for LocaledClient {
    fn keymap_to_layout(&self, keymap: &str) -> Result<Option<LayoutSpec>, ConversionError> {
        self.proxy
            .set_v_console_keyboard(keymap, "", true, false)
            .map_err(|source| ConversionError::Call {
                step: "SetVConsoleKeyboard",
                source,
            })?;

        let layout = self
            .proxy
            .x11_layout()
            .map_err(|source| ConversionError::Call {
                step: "X11Layout",
                source,
            })?;

        let variant = self
            .proxy
            .x11_variant()
            .map_err(|source| ConversionError::Call {
                step: "X11Variant",
                source,
            })?;

        if layout.is_empty() {
            return Ok(None);
        }

        Ok(Some(LayoutSpec::new(&layout, &variant)))
    }

    fn layout_to_keymap(&self, layout: &str) -> Result<Option<String>, ConversionError> {
        let spec = LayoutSpec::parse(layout)?;

        self.proxy
            .set_x11_keyboard(&spec.layout, "", &spec.variant, "", true, false)
            .map_err(|source| ConversionError::Call {
                step: "SetX11Keyboard",
                source,
            })?;

        let keymap = self
            .proxy
            .vconsole_keymap()
            .map_err(|source| ConversionError::Call {
                step: "VConsoleKeymap",
                source,
            })?;

        if keymap.is_empty() {
            return Ok(None);
        }

        Ok(Some(keymap))
    }
}
