// Copyright 2025 bakri (tidynest@proton.me)
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

//! Installer Keyboard Manager
//!
//! Keyboard layout and console keymap configuration for a machine being
//! installed. Keeps two independently-maintained representations (the
//! low-level console keymap and the list of X11 `"layout (variant)"`
//! pairs) mutually consistent, activates them on the live system, and
//! persists them to the target filesystem in the formats the X server,
//! the console and sysconfig expect.
//!
//! # Architecture
//!
//! - **`core`:** Business logic (the layout notation codec, the layout
//!   catalog, the layout set manager and its engine seam)
//! - **`config`:** Persistence (the X input-class snippet and the two
//!   keymap files, with partial-failure aggregation)
//! - **`ipc`:** System integration (the `org.freedesktop.locale1` client,
//!   the xkbcommon/setxkbmap session engine)
//! - **`activation`:** Top-level reconciliation of partial configurations
//!
//! # Side effects
//!
//! The locale service is the only oracle for keymap/layout conversion,
//! and querying it commits the change: conversions are activations. See
//! `ipc::localed` before assuming anything here is a pure query.
//!
//! # Examples
//!
//! ## Persisting a resolved configuration
//!
//! ```no_run
//! use installer_keyboard_manager::config::write_keyboard_config;
//! use installer_keyboard_manager::core::KeyboardConfig;
//! use std::path::Path;
//!
//! let mut config = KeyboardConfig::default();
//! config.vc_keymap = Some("cz".to_string());
//! config.x_layouts.push("cz (qwerty)".to_string());
//!
//! write_keyboard_config(&config, Path::new("/mnt/sysimage"), 1)?;
//! # Ok::<(), installer_keyboard_manager::config::ConfigWriteError>(())
//! ```
//!
//! ## Managing the live layout set
//!
//! ```no_run
//! use installer_keyboard_manager::core::LayoutSetManager;
//! use installer_keyboard_manager::ipc::XkbSessionEngine;
//!
//! let mut manager = LayoutSetManager::new(XkbSessionEngine::new()?)?;
//! manager.add("cz (qwerty)")?;
//! manager.set_switch_options(&["grp:alt_shift_toggle".to_string()])?;
//! # Ok::<(), installer_keyboard_manager::core::LayoutSetError>(())
//! ```

pub mod activation;
pub mod config;
pub mod core;
pub mod ipc;

// Re-export commonly used types for convenience
pub use core::{KeyboardConfig, LayoutSetManager, LayoutSpec};
