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

//! src/ipc/xkb.rs
//!
//! Live session layout engine backed by xkbcommon and setxkbmap
//!
//! Activation is two-staged. The candidate set is first compiled with
//! xkbcommon: a set the keymap compiler cannot build is a rejected
//! activation, reported without touching the running session. Only a
//! compilable set is then applied to the session with `setxkbmap`. The
//! engine's recorded state is updated after both stages succeed, so it
//! stays authoritative across rejections.

use std::process::Command;
use xkbcommon::xkb;

use crate::core::manager::{EngineState, LayoutEngine, LayoutSetError};

/// Layout engine for the running X session.
pub struct XkbSessionEngine {
    context: xkb::Context,
    state: EngineState,
}

impl XkbSessionEngine {
    /// Creates an engine mirroring the running session's configuration,
    /// as reported by `setxkbmap -query`.
    ///
    /// # Errors
    ///
    /// Returns `Engine` when setxkbmap is unavailable or its output
    /// cannot be obtained.
    pub fn new() -> Result<Self, LayoutSetError> {
        let state = query_session()?;

        Ok(Self {
            context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            state,
        })
    }

    fn compile(&self, layouts: &str, variants: &str, options: &str) -> Option<xkb::Keymap> {
        xkb::Keymap::new_from_names(
            &self.context,
            "",
            "",
            layouts,
            variants,
            Some(options.to_string()),
            xkb::COMPILE_NO_FLAGS,
        )
    }
}

impl LayoutEngine for XkbSessionEngine {
    fn snapshot(&mut self) -> Result<EngineState, LayoutSetError> {
        Ok(self.state.clone())
    }

    fn activate(
        &mut self,
        layouts: &[String],
        variants: &[String],
        options: &[String],
    ) -> Result<(), LayoutSetError> {
        // An empty set cannot be expressed to the session: the server
        // keeps its previous keymap until a non-empty set arrives. Record
        // the cleared lists and skip the session round-trip.
        if layouts.is_empty() {
            self.state = EngineState {
                options: options.to_vec(),
                ..EngineState::default()
            };
            return Ok(());
        }

        let layout_csv = layouts.join(",");
        let variant_csv = variants.join(",");
        let options_csv = options.join(",");

        if self
            .compile(&layout_csv, &variant_csv, &options_csv)
            .is_none()
        {
            return Err(LayoutSetError::Activation {
                layouts: layout_csv,
                reason: "keymap compilation failed".to_string(),
            });
        }

        let mut cmd = Command::new("setxkbmap");
        cmd.arg("-layout").arg(&layout_csv);
        cmd.arg("-variant").arg(&variant_csv);
        // Clear previous options before setting the new ones; setxkbmap
        // otherwise accumulates them.
        cmd.arg("-option").arg("");
        for option in options {
            cmd.arg("-option").arg(option);
        }

        let output = cmd
            .output()
            .map_err(|err| LayoutSetError::Engine(format!("cannot run setxkbmap: {}", err)))?;

        if !output.status.success() {
            return Err(LayoutSetError::Activation {
                layouts: layout_csv,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        self.state = EngineState {
            layouts: layouts.to_vec(),
            variants: variants.to_vec(),
            options: options.to_vec(),
        };

        Ok(())
    }

    fn active_layout_name(&mut self) -> Result<String, LayoutSetError> {
        if self.state.layouts.is_empty() {
            return Err(LayoutSetError::Engine(
                "no layouts are active".to_string(),
            ));
        }

        let keymap = self
            .compile(
                &self.state.layouts.join(","),
                &self.state.variants.join(","),
                &self.state.options.join(","),
            )
            .ok_or_else(|| {
                LayoutSetError::Engine("cannot compile the active keymap".to_string())
            })?;

        // setxkbmap resets the active group on apply, so the first group
        // is the live one for a session this engine configured.
        Ok(keymap.layout_get_name(0).to_string())
    }
}

/// Reads the session's current configuration via `setxkbmap -query`.
fn query_session() -> Result<EngineState, LayoutSetError> {
    let output = Command::new("setxkbmap")
        .arg("-query")
        .output()
        .map_err(|err| LayoutSetError::Engine(format!("cannot run setxkbmap: {}", err)))?;

    if !output.status.success() {
        return Err(LayoutSetError::Engine(format!(
            "setxkbmap -query failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(parse_query(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses `setxkbmap -query` output into an engine state.
///
/// The output is `key: value` lines; layout, variant and options values
/// are comma-joined lists. A missing variant entry for a layout shows up
/// as an empty string between commas and is preserved as such.
pub(crate) fn parse_query(output: &str) -> EngineState {
    let mut state = EngineState::default();

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "layout" => state.layouts = split_csv(value),
            "variant" => state.variants = split_csv(value),
            "options" => state.options = split_csv(value),
            _ => {}
        }
    }

    state
}

fn split_csv(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }

    value.split(',').map(|part| part.trim().to_string()).collect()
}
