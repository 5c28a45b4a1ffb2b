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

//! Activation orchestration
//!
//! Reconciles a possibly-partial `KeyboardConfig` (maybe only a console
//! keymap, maybe only layouts, maybe a single ambiguous legacy string)
//! into a complete configuration that is activated on the live system and
//! persisted for the installed one.
//!
//! The pipeline is short and strict: disambiguate the legacy value, load
//! and convert the console keymap, seed the layout list, convert the
//! primary layout back, activate the full set, persist. Each step's
//! failure handling is local: keymap-load problems are logged and
//! degraded, everything else propagates. There is no global rollback.

use log::{error, warn};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

use crate::config::{write_keyboard_config, ConfigWriteError};
use crate::core::catalog::LayoutCatalog;
use crate::core::manager::{LayoutEngine, LayoutSetError, LayoutSetManager};
use crate::core::types::KeyboardConfig;
use crate::ipc::localed::{ConversionError, KeymapConverter};

/// Keymap to fall back to when nothing lets us derive one.
const DEFAULT_KEYMAP: &str = "us";

/// xorg.conf.d weight for the activation-time snippet. High so that the
/// snippet written during activation overrides earlier generated ones.
const ACTIVATION_WEIGHT: u8 = 99;

/// The platform keymap-loading mechanism itself is unavailable.
///
/// Not raised for a string that merely is not a keymap; that is a `false`
/// probe result, not an error.
#[derive(Debug, Error)]
#[error("console keymap loading is unavailable: {0}")]
pub struct KeymapLoadError(pub String);

/// Errors aborting the activation pipeline.
#[derive(Debug, Error)]
pub enum ActivateError {
    /// A locale service conversion failed.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The live engine rejected the layout set.
    #[error(transparent)]
    LayoutSet(#[from] LayoutSetError),

    /// The configuration files could not all be written.
    #[error(transparent)]
    ConfigWrite(#[from] ConfigWriteError),
}

/// Probes whether a string names a loadable console keymap.
///
/// Probing is loading: a valid keymap really becomes the active console
/// keymap. The locale service cannot answer the validity question, so the
/// only available probe is the load itself.
pub trait KeymapLoader {
    /// Returns whether `keymap` loaded.
    ///
    /// # Errors
    ///
    /// `KeymapLoadError` only when the loading mechanism is unavailable.
    fn try_load(&self, keymap: &str) -> Result<bool, KeymapLoadError>;
}

/// `loadkeys`-backed keymap prober.
pub struct Loadkeys;

impl KeymapLoader for Loadkeys {
    fn try_load(&self, keymap: &str) -> Result<bool, KeymapLoadError> {
        let status = Command::new("loadkeys")
            .arg(keymap)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) => Ok(status.success()),
            Err(err) => Err(KeymapLoadError(err.to_string())),
        }
    }
}

/// Top-level policy reconciling and activating a keyboard configuration.
///
/// # Example
/// ```no_run
/// use installer_keyboard_manager::activation::{KeyboardActivator, Loadkeys};
/// use installer_keyboard_manager::core::{KeyboardConfig, LayoutSetManager};
/// use installer_keyboard_manager::ipc::{LocaledClient, XkbSessionEngine};
///
/// let converter = LocaledClient::connect()?;
/// let mut manager = LayoutSetManager::new(XkbSessionEngine::new()?)?;
///
/// let mut config = KeyboardConfig::default();
/// config.vc_keymap = Some("cz".to_string());
///
/// KeyboardActivator::new(&converter, &Loadkeys, &mut manager)
///     .activate(&mut config)?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct KeyboardActivator<'a, E: LayoutEngine> {
    converter: &'a dyn KeymapConverter,
    loader: &'a dyn KeymapLoader,
    manager: &'a mut LayoutSetManager<E>,
    catalog: Option<&'a LayoutCatalog>,
    root: PathBuf,
    weight: u8,
}

impl<'a, E: LayoutEngine> KeyboardActivator<'a, E> {
    /// Creates an activator persisting to the live root (`/`).
    pub fn new(
        converter: &'a dyn KeymapConverter,
        loader: &'a dyn KeymapLoader,
        manager: &'a mut LayoutSetManager<E>,
    ) -> Self {
        Self {
            converter,
            loader,
            manager,
            catalog: None,
            root: PathBuf::from("/"),
            weight: ACTIVATION_WEIGHT,
        }
    }

    /// Validates layouts against a catalog (unknown layouts are logged,
    /// never fatal). Without a catalog, validation is skipped.
    pub fn with_catalog(mut self, catalog: &'a LayoutCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Persists under an alternate root instead of `/`.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.root = root.to_path_buf();
        self
    }

    /// Reconciles, activates and persists the configuration.
    ///
    /// On return the configuration is complete: the console keymap and
    /// the layout list are filled in as far as the locale service could
    /// derive them, the live engine runs the full layout set, and the
    /// on-disk artifacts are written.
    ///
    /// # Errors
    ///
    /// Conversion, activation and write failures propagate. A console
    /// keymap that fails to load (or a missing loading mechanism) is
    /// logged and degraded instead.
    pub fn activate(&mut self, config: &mut KeyboardConfig) -> Result<(), ActivateError> {
        // Only the deprecated one-string form was given: probe whether it
        // is a console keymap, otherwise take it as an X layout.
        if config.vc_keymap.is_none() && config.x_layouts.is_empty() {
            if let Some(legacy) = config.legacy_keyboard.clone() {
                match self.loader.try_load(&legacy) {
                    Ok(true) => config.vc_keymap = Some(legacy),
                    Ok(false) => config.x_layouts.push(legacy),
                    Err(err) => {
                        error!(
                            "cannot probe legacy keyboard value '{}' ({}), taking it as an X layout",
                            legacy, err
                        );
                        config.x_layouts.push(legacy);
                    }
                }
            }
        }

        // Activate the console keymap and let the locale service derive
        // the matching X layout.
        let mut derived_layout = None;
        if let Some(keymap) = config.vc_keymap.clone() {
            match self.loader.try_load(&keymap) {
                Ok(true) => derived_layout = self.converter.keymap_to_layout(&keymap)?,
                Ok(false) => {
                    error!("'{}' is not a valid console keymap, not loading", keymap);
                }
                Err(err) => error!("cannot load console keymap '{}': {}", keymap, err),
            }
        }

        if config.x_layouts.is_empty() {
            if let Some(layout) = derived_layout {
                config.x_layouts.push(layout.name());
            }
        }

        if !config.x_layouts.is_empty() {
            self.warn_unknown_layouts(config);

            let primary = config.x_layouts[0].clone();
            let derived_keymap = self.converter.layout_to_keymap(&primary)?;
            if config.vc_keymap.is_none() {
                config.vc_keymap = derived_keymap;
            }

            self.manager.replace(&config.x_layouts)?;
            self.manager.set_switch_options(&config.switch_options)?;

            // The locale service only ever writes single-layout
            // configuration; the multi-layout case needs our own X
            // snippet for the graphical session of the installed system.
            write_keyboard_config(config, &self.root, self.weight)?;
        }

        Ok(())
    }

    fn warn_unknown_layouts(&self, config: &KeyboardConfig) {
        let Some(catalog) = self.catalog else {
            warn!("no layout catalog available, skipping layout validation");
            return;
        };

        for layout in &config.x_layouts {
            if !catalog.is_valid(layout) {
                warn!("'{}' is not a layout known to this system", layout);
            }
        }
    }
}

/// Fills the missing half of a partial configuration before persisting.
///
/// Derives the console keymap from the primary layout, falls back to
/// "us" when nothing else is available, and derives the layout list from
/// the console keymap. Conversions go through the locale service and
/// therefore *activate* what they convert.
///
/// # Errors
///
/// Propagates locale service failures.
pub fn resolve_missing(
    config: &mut KeyboardConfig,
    converter: &dyn KeymapConverter,
) -> Result<(), ConversionError> {
    if config.vc_keymap.is_none() {
        if let Some(primary) = config.primary_layout() {
            let primary = primary.to_string();
            config.vc_keymap = converter.layout_to_keymap(&primary)?;
        }
    }

    if config.vc_keymap.is_none() {
        config.vc_keymap = Some(DEFAULT_KEYMAP.to_string());
    }

    if config.x_layouts.is_empty() {
        // vc_keymap is always set by this point
        if let Some(keymap) = config.vc_keymap.clone() {
            if let Some(layout) = converter.keymap_to_layout(&keymap)? {
                config.x_layouts.push(layout.name());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::fs;
    use tempfile::TempDir;

    use crate::core::manager::EngineState;
    use crate::core::types::LayoutSpec;

    /// Deterministic converter over two fixed mappings.
    #[derive(Default)]
    struct FakeConverter {
        keymap_to_layout: HashMap<String, String>,
        layout_to_keymap: HashMap<String, String>,
    }

    impl FakeConverter {
        fn with(pairs: &[(&str, &str)]) -> Self {
            let mut fake = Self::default();
            for (keymap, layout) in pairs {
                fake.keymap_to_layout
                    .insert(keymap.to_string(), layout.to_string());
                fake.layout_to_keymap
                    .insert(layout.to_string(), keymap.to_string());
            }
            fake
        }
    }

    impl KeymapConverter for FakeConverter {
        fn keymap_to_layout(
            &self,
            keymap: &str,
        ) -> Result<Option<LayoutSpec>, ConversionError> {
            Ok(self
                .keymap_to_layout
                .get(keymap)
                .map(|text| LayoutSpec::parse(text).unwrap()))
        }

        fn layout_to_keymap(&self, layout: &str) -> Result<Option<String>, ConversionError> {
            let spec = LayoutSpec::parse(layout)?;
            Ok(self.layout_to_keymap.get(&spec.name()).cloned())
        }
    }

    /// Converter whose peer is unreachable.
    struct BrokenConverter;

    impl KeymapConverter for BrokenConverter {
        fn keymap_to_layout(&self, _: &str) -> Result<Option<LayoutSpec>, ConversionError> {
            Err(ConversionError::Call {
                step: "SetVConsoleKeyboard",
                source: zbus::Error::Failure("locale service unreachable".to_string()),
            })
        }

        fn layout_to_keymap(&self, _: &str) -> Result<Option<String>, ConversionError> {
            Err(ConversionError::Call {
                step: "SetX11Keyboard",
                source: zbus::Error::Failure("locale service unreachable".to_string()),
            })
        }
    }

    /// Loader recognising a fixed set of keymaps.
    struct FakeLoader {
        valid: HashSet<String>,
        available: bool,
    }

    impl FakeLoader {
        fn with(valid: &[&str]) -> Self {
            Self {
                valid: valid.iter().map(|s| s.to_string()).collect(),
                available: true,
            }
        }

        fn unavailable() -> Self {
            Self {
                valid: HashSet::new(),
                available: false,
            }
        }
    }

    impl KeymapLoader for FakeLoader {
        fn try_load(&self, keymap: &str) -> Result<bool, KeymapLoadError> {
            if !self.available {
                return Err(KeymapLoadError("loadkeys not found".to_string()));
            }
            Ok(self.valid.contains(keymap))
        }
    }

    /// Engine that accepts every activation.
    #[derive(Default)]
    struct AcceptAllEngine {
        state: EngineState,
    }

    impl LayoutEngine for AcceptAllEngine {
        fn snapshot(&mut self) -> Result<EngineState, LayoutSetError> {
            Ok(self.state.clone())
        }

        fn activate(
            &mut self,
            layouts: &[String],
            variants: &[String],
            options: &[String],
        ) -> Result<(), LayoutSetError> {
            self.state = EngineState {
                layouts: layouts.to_vec(),
                variants: variants.to_vec(),
                options: options.to_vec(),
            };
            Ok(())
        }

        fn active_layout_name(&mut self) -> Result<String, LayoutSetError> {
            self.state
                .layouts
                .first()
                .cloned()
                .ok_or_else(|| LayoutSetError::Engine("no active group".to_string()))
        }
    }

    /// Helper: target root with the directories a real system image has.
    fn target_root() -> TempDir {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("etc/sysconfig")).unwrap();
        root
    }

    fn manager() -> LayoutSetManager<AcceptAllEngine> {
        LayoutSetManager::new(AcceptAllEngine::default()).unwrap()
    }

    #[test]
    fn test_keymap_only_config_seeds_consistent_layouts() {
        let converter = FakeConverter::with(&[("us", "us")]);
        let loader = FakeLoader::with(&["us"]);
        let mut manager = manager();
        let root = target_root();

        let mut config = KeyboardConfig {
            vc_keymap: Some("us".to_string()),
            ..KeyboardConfig::default()
        };

        KeyboardActivator::new(&converter, &loader, &mut manager)
            .with_root(root.path())
            .activate(&mut config)
            .unwrap();

        assert!(!config.x_layouts.is_empty(), "layouts should be seeded");

        // Consistency invariant: the primary layout converts back to the
        // configured console keymap.
        let round_trip = converter
            .layout_to_keymap(config.primary_layout().unwrap())
            .unwrap();
        assert_eq!(round_trip.as_deref(), Some("us"));

        assert_eq!(manager.active_layouts(), vec!["us"]);
    }

    #[test]
    fn test_legacy_value_that_loads_becomes_the_keymap() {
        let converter = FakeConverter::with(&[("cz", "cz (qwerty)")]);
        let loader = FakeLoader::with(&["cz"]);
        let mut manager = manager();
        let root = target_root();

        let mut config = KeyboardConfig {
            legacy_keyboard: Some("cz".to_string()),
            ..KeyboardConfig::default()
        };

        KeyboardActivator::new(&converter, &loader, &mut manager)
            .with_root(root.path())
            .activate(&mut config)
            .unwrap();

        assert_eq!(config.vc_keymap.as_deref(), Some("cz"));
        assert_eq!(config.x_layouts, vec!["cz (qwerty)"]);
    }

    #[test]
    fn test_legacy_value_that_does_not_load_becomes_a_layout() {
        let converter = FakeConverter::with(&[("cz", "cz (qwerty)")]);
        let loader = FakeLoader::with(&[]);
        let mut manager = manager();
        let root = target_root();

        let mut config = KeyboardConfig {
            legacy_keyboard: Some("cz (qwerty)".to_string()),
            ..KeyboardConfig::default()
        };

        KeyboardActivator::new(&converter, &loader, &mut manager)
            .with_root(root.path())
            .activate(&mut config)
            .unwrap();

        assert_eq!(config.x_layouts, vec!["cz (qwerty)"]);
        assert_eq!(
            config.vc_keymap.as_deref(),
            Some("cz"),
            "keymap should be derived from the layout"
        );
    }

    #[test]
    fn test_unavailable_loader_degrades_to_layout() {
        let converter = FakeConverter::with(&[("cz", "cz (qwerty)")]);
        let loader = FakeLoader::unavailable();
        let mut manager = manager();
        let root = target_root();

        let mut config = KeyboardConfig {
            legacy_keyboard: Some("cz (qwerty)".to_string()),
            ..KeyboardConfig::default()
        };

        let result = KeyboardActivator::new(&converter, &loader, &mut manager)
            .with_root(root.path())
            .activate(&mut config);

        assert!(result.is_ok(), "a missing loadkeys must not abort: {:?}", result);
        assert_eq!(config.x_layouts, vec!["cz (qwerty)"]);
    }

    #[test]
    fn test_invalid_keymap_is_non_fatal() {
        let converter = FakeConverter::default();
        let loader = FakeLoader::with(&[]);
        let mut manager = manager();
        let root = target_root();

        let mut config = KeyboardConfig {
            vc_keymap: Some("bogus".to_string()),
            ..KeyboardConfig::default()
        };

        KeyboardActivator::new(&converter, &loader, &mut manager)
            .with_root(root.path())
            .activate(&mut config)
            .unwrap();

        assert!(
            config.x_layouts.is_empty(),
            "nothing can be derived from an unloadable keymap"
        );
        assert!(
            !root.path().join("etc/vconsole.conf").exists(),
            "nothing should be persisted without layouts"
        );
    }

    #[test]
    fn test_multi_layout_configuration_is_activated_and_persisted() {
        let converter = FakeConverter::with(&[("cz", "cz (qwerty)")]);
        let loader = FakeLoader::with(&["cz"]);
        let mut manager = manager();
        let root = target_root();

        let mut config = KeyboardConfig {
            x_layouts: vec!["cz (qwerty)".to_string(), "us".to_string()],
            switch_options: vec!["grp:alt_shift_toggle".to_string()],
            ..KeyboardConfig::default()
        };

        KeyboardActivator::new(&converter, &loader, &mut manager)
            .with_root(root.path())
            .activate(&mut config)
            .unwrap();

        assert_eq!(config.vc_keymap.as_deref(), Some("cz"));
        assert_eq!(manager.active_layouts(), vec!["cz (qwerty)", "us"]);
        assert_eq!(manager.active_options(), ["grp:alt_shift_toggle"]);

        let xconf = fs::read_to_string(
            root.path()
                .join("etc/X11/xorg.conf.d/99-anaconda-keyboard.conf"),
        )
        .unwrap();
        assert!(xconf.contains("\tOption\t\"XkbLayout\"\t\"cz,us\"\n"));
        assert!(xconf.contains("\tOption\t\"XkbVariant\"\t\"qwerty,\"\n"));
        assert!(xconf.contains("\tOption\t\"XkbOptions\"\t\"grp:alt_shift_toggle\"\n"));

        let vcconf = fs::read_to_string(root.path().join("etc/vconsole.conf")).unwrap();
        assert_eq!(vcconf, "KEYMAP=\"cz\"\n");
    }

    #[test]
    fn test_conversion_failure_aborts() {
        let loader = FakeLoader::with(&["us"]);
        let mut manager = manager();
        let root = target_root();

        let mut config = KeyboardConfig {
            vc_keymap: Some("us".to_string()),
            ..KeyboardConfig::default()
        };

        let result = KeyboardActivator::new(&BrokenConverter, &loader, &mut manager)
            .with_root(root.path())
            .activate(&mut config);

        assert!(matches!(result, Err(ActivateError::Conversion(_))));
    }

    #[test]
    fn test_resolve_missing_derives_keymap_from_layout() {
        let converter = FakeConverter::with(&[("cz", "cz (qwerty)")]);
        let mut config = KeyboardConfig {
            x_layouts: vec!["cz (qwerty)".to_string()],
            ..KeyboardConfig::default()
        };

        resolve_missing(&mut config, &converter).unwrap();

        assert_eq!(config.vc_keymap.as_deref(), Some("cz"));
    }

    #[test]
    fn test_resolve_missing_falls_back_to_us() {
        let converter = FakeConverter::with(&[("us", "us")]);
        let mut config = KeyboardConfig::default();

        resolve_missing(&mut config, &converter).unwrap();

        assert_eq!(config.vc_keymap.as_deref(), Some("us"));
        assert_eq!(
            config.x_layouts,
            vec!["us"],
            "layouts should be derived from the fallback keymap"
        );
    }

    #[test]
    fn test_resolve_missing_leaves_complete_config_alone() {
        let converter = FakeConverter::default();
        let mut config = KeyboardConfig {
            vc_keymap: Some("cz".to_string()),
            x_layouts: vec!["cz".to_string()],
            ..KeyboardConfig::default()
        };
        let before = config.clone();

        resolve_missing(&mut config, &converter).unwrap();

        assert_eq!(config, before);
    }
}
