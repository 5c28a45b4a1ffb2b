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

//! System integration: the locale service client and the session engine
//!
//! Everything in this module talks to the outside world (the
//! `org.freedesktop.locale1` D-Bus service and the running X session)
//! behind the trait seams defined in `core` and `ipc::localed`, so the
//! rest of the crate never needs a bus connection or a display to test
//! against.

pub mod localed;
pub mod xkb;

pub use localed::{ConversionError, KeymapConverter, LocaledClient};
pub use xkb::XkbSessionEngine;

#[cfg(test)]
mod tests;
