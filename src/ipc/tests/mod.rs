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

//! IPC module tests
//!
//! Tests the pure pieces of the system-integration layer: the
//! `setxkbmap -query` output parser and error conversion. Anything that
//! needs a real bus connection or display is exercised through the trait
//! seams in the core and activation test suites instead.

use crate::core::types::MalformedLayout;
use crate::ipc::localed::ConversionError;
use crate::ipc::xkb::parse_query;

#[test]
fn test_parse_query_full_output() {
    let output = "\
rules:      evdev
model:      pc105
layout:     us,cz
variant:    ,qwerty
options:    grp:alt_shift_toggle,compose:ralt
";

    let state = parse_query(output);

    assert_eq!(state.layouts, vec!["us", "cz"]);
    assert_eq!(
        state.variants,
        vec!["", "qwerty"],
        "a layout without a variant is an empty entry, not a missing one"
    );
    assert_eq!(
        state.options,
        vec!["grp:alt_shift_toggle", "compose:ralt"]
    );
}

#[test]
fn test_parse_query_without_variant_or_options_lines() {
    let output = "rules:      evdev\nmodel:      pc105\nlayout:     us\n";

    let state = parse_query(output);

    assert_eq!(state.layouts, vec!["us"]);
    assert!(
        state.variants.is_empty(),
        "servers often report no variants at all; padding is the manager's job"
    );
    assert!(state.options.is_empty());
}

#[test]
fn test_parse_query_ignores_unknown_lines() {
    let state = parse_query("something weird\nlayout:     de\n");
    assert_eq!(state.layouts, vec!["de"]);
}

#[test]
fn test_conversion_error_from_malformed_layout() {
    let err: ConversionError = MalformedLayout("(qwerty)".to_string()).into();

    assert!(
        err.to_string().contains("(qwerty)"),
        "parse failures should carry the offending text: {}",
        err
    );
}
