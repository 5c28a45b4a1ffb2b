//! Keyboard configuration persistence for the installed system.
//!
//! A fully-resolved `KeyboardConfig` is written to the target root in the
//! three formats its consumers expect:
//!
//! 1. An X input-class snippet under `etc/X11/xorg.conf.d/`, read by the X
//!    server of the installed system (the only artifact that can carry
//!    more than one layout).
//! 2. `etc/sysconfig/keyboard`, a single `KEYMAP="..."` line.
//! 3. `etc/vconsole.conf`, the same line for the console of the installed
//!    system.
//!
//! Every step is attempted independently: a failed directory creation or
//! file write never prevents the remaining writes, and all failures are
//! collected into one aggregate `ConfigWriteError` so the caller sees the
//! complete picture in a single pass. Files are written atomically
//! (temp-file-then-rename), so a failed write never leaves a truncated
//! artifact behind.
//!
//! # Example
//!
//! ```no_run
//! use installer_keyboard_manager::config::write_keyboard_config;
//! use installer_keyboard_manager::core::KeyboardConfig;
//! use std::path::Path;
//!
//! let mut config = KeyboardConfig::default();
//! config.x_layouts.push("cz (qwerty)".to_string());
//! config.vc_keymap = Some("cz".to_string());
//!
//! write_keyboard_config(&config, Path::new("/mnt/sysimage"), 1)?;
//! # Ok::<(), installer_keyboard_manager::config::ConfigWriteError>(())
//! ```

use atomic_write_file::AtomicWriteFile;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::types::{KeyboardConfig, LayoutSpec, MalformedLayout};

/// One failed step of the persist pass.
#[derive(Debug)]
pub struct WriteFailure {
    /// Path the step was creating or writing.
    pub path: PathBuf,
    /// What went wrong, human readable.
    pub reason: String,
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

/// Aggregate error for the persist pass.
///
/// Raised once, after every step has been attempted, listing every failure
/// encountered, never raised for an individual step. Artifacts written
/// before a failing step stay written.
#[derive(Debug, Error)]
#[error("cannot write keyboard configuration: {}", .failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; "))]
pub struct ConfigWriteError {
    /// Every step that failed, in attempt order.
    pub failures: Vec<WriteFailure>,
}

/// Renders the X input-class section for the configured layouts.
///
/// The layout and variant identifier lists are comma-joined; the variant
/// line is included only when at least one variant is non-empty, and the
/// options line only when at least one switching option is present.
///
/// # Errors
///
/// Returns `MalformedLayout` if any `x_layouts` entry fails to parse.
pub fn render_input_class(config: &KeyboardConfig) -> Result<String, MalformedLayout> {
    let mut layouts = Vec::new();
    let mut variants = Vec::new();

    for text in &config.x_layouts {
        let spec = LayoutSpec::parse(text)?;
        layouts.push(spec.layout);
        variants.push(spec.variant);
    }

    let mut conf = String::from("#This file was generated by the Anaconda installer\n");

    // section header
    conf.push_str("Section \"InputClass\"\n");
    conf.push_str("\tIdentifier\t\"anaconda-keyboard\"\n");
    conf.push_str("\tMatchIsKeyboard\t\"on\"\n");

    // layouts
    conf.push_str(&format!(
        "\tOption\t\"XkbLayout\"\t\"{}\"\n",
        layouts.join(",")
    ));

    // variants, only when some layout actually has one
    if variants.iter().any(|variant| !variant.is_empty()) {
        conf.push_str(&format!(
            "\tOption\t\"XkbVariant\"\t\"{}\"\n",
            variants.join(",")
        ));
    }

    // switching
    if config.switch_options.iter().any(|opt| !opt.is_empty()) {
        conf.push_str(&format!(
            "\tOption\t\"XkbOptions\"\t\"{}\"\n",
            config.switch_options.join(",")
        ));
    }

    conf.push_str("EndSection");

    Ok(conf)
}

/// Writes the keyboard configuration files under `root`.
///
/// `weight` is the two-digit prefix ordering the X snippet among its
/// xorg.conf.d siblings. The X snippet is written only when layouts are
/// configured; the two keymap files only when a console keymap is.
///
/// # Errors
///
/// Returns the aggregate `ConfigWriteError` after attempting every step.
pub fn write_keyboard_config(
    config: &KeyboardConfig,
    root: &Path,
    weight: u8,
) -> Result<(), ConfigWriteError> {
    let xconf_dir = root.join("etc/X11/xorg.conf.d");
    let xconf_path = xconf_dir.join(format!("{:02}-anaconda-keyboard.conf", weight));
    let sysconf_path = root.join("etc/sysconfig/keyboard");
    let vcconf_path = root.join("etc/vconsole.conf");

    let mut failures = Vec::new();

    if let Err(err) = fs::create_dir_all(&xconf_dir) {
        failures.push(WriteFailure {
            path: xconf_dir.clone(),
            reason: format!("cannot create xorg.conf.d directory: {}", err),
        });
    }

    if !config.x_layouts.is_empty() {
        match render_input_class(config) {
            Ok(content) => {
                if let Err(err) = write_atomic(&xconf_path, &content) {
                    failures.push(WriteFailure {
                        path: xconf_path,
                        reason: format!("cannot write X keyboard configuration: {}", err),
                    });
                }
            }
            Err(err) => failures.push(WriteFailure {
                path: xconf_path,
                reason: format!("cannot render X keyboard configuration: {}", err),
            }),
        }
    }

    if let Some(keymap) = &config.vc_keymap {
        let line = format!("KEYMAP=\"{}\"\n", keymap);

        if let Err(err) = write_atomic(&sysconf_path, &line) {
            failures.push(WriteFailure {
                path: sysconf_path,
                reason: format!("cannot write sysconfig keyboard configuration: {}", err),
            });
        }

        if let Err(err) = write_atomic(&vcconf_path, &line) {
            failures.push(WriteFailure {
                path: vcconf_path,
                reason: format!("cannot write vconsole configuration: {}", err),
            });
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ConfigWriteError { failures })
    }
}

/// Atomic write: temp file next to the target, then rename over it.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = AtomicWriteFile::options().open(path)?;
    file.write_all(content.as_bytes())?;
    file.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with(
        vc_keymap: Option<&str>,
        x_layouts: &[&str],
        switch_options: &[&str],
    ) -> KeyboardConfig {
        KeyboardConfig {
            vc_keymap: vc_keymap.map(str::to_string),
            x_layouts: x_layouts.iter().map(|s| s.to_string()).collect(),
            switch_options: switch_options.iter().map(|s| s.to_string()).collect(),
            legacy_keyboard: None,
        }
    }

    #[test]
    fn test_render_full_section() {
        let config = config_with(None, &["cz (qwerty)", "us"], &["grp:alt_shift_toggle"]);

        let expected = "#This file was generated by the Anaconda installer\n\
                        Section \"InputClass\"\n\
                        \tIdentifier\t\"anaconda-keyboard\"\n\
                        \tMatchIsKeyboard\t\"on\"\n\
                        \tOption\t\"XkbLayout\"\t\"cz,us\"\n\
                        \tOption\t\"XkbVariant\"\t\"qwerty,\"\n\
                        \tOption\t\"XkbOptions\"\t\"grp:alt_shift_toggle\"\n\
                        EndSection";

        assert_eq!(render_input_class(&config).unwrap(), expected);
    }

    #[test]
    fn test_render_omits_variant_line_when_all_empty() {
        let config = config_with(None, &["cz", "us"], &[]);
        let conf = render_input_class(&config).unwrap();

        assert!(conf.contains("\tOption\t\"XkbLayout\"\t\"cz,us\"\n"));
        assert!(!conf.contains("XkbVariant"), "no variants, no variant line");
        assert!(!conf.contains("XkbOptions"), "no options, no options line");
    }

    #[test]
    fn test_render_rejects_malformed_entry() {
        let config = config_with(None, &["cz", "(qwerty)"], &[]);
        assert!(render_input_class(&config).is_err());
    }

    #[test]
    fn test_write_produces_all_three_artifacts() {
        let root = TempDir::new().unwrap();
        let config = config_with(Some("cz"), &["cz (qwerty)"], &[]);

        // The keymap files go into pre-existing directories on a real
        // target root; only xorg.conf.d is created by the persister.
        fs::create_dir_all(root.path().join("etc/sysconfig")).unwrap();

        write_keyboard_config(&config, root.path(), 1).unwrap();

        let xconf = fs::read_to_string(
            root.path()
                .join("etc/X11/xorg.conf.d/01-anaconda-keyboard.conf"),
        )
        .unwrap();
        assert!(xconf.contains("\tOption\t\"XkbLayout\"\t\"cz\"\n"));

        let sysconf = fs::read_to_string(root.path().join("etc/sysconfig/keyboard")).unwrap();
        assert_eq!(sysconf, "KEYMAP=\"cz\"\n");

        let vcconf = fs::read_to_string(root.path().join("etc/vconsole.conf")).unwrap();
        assert_eq!(vcconf, "KEYMAP=\"cz\"\n");
    }

    #[test]
    fn test_write_weight_prefix_is_two_digits() {
        let root = TempDir::new().unwrap();
        let config = config_with(None, &["us"], &[]);

        write_keyboard_config(&config, root.path(), 99).unwrap();

        assert!(root
            .path()
            .join("etc/X11/xorg.conf.d/99-anaconda-keyboard.conf")
            .exists());
    }

    #[test]
    fn test_write_skips_absent_artifacts() {
        let root = TempDir::new().unwrap();
        let config = config_with(Some("us"), &[], &[]);
        fs::create_dir_all(root.path().join("etc/sysconfig")).unwrap();

        write_keyboard_config(&config, root.path(), 1).unwrap();

        assert!(
            !root
                .path()
                .join("etc/X11/xorg.conf.d/01-anaconda-keyboard.conf")
                .exists(),
            "no layouts, no X snippet"
        );
        assert!(root.path().join("etc/sysconfig/keyboard").exists());
    }

    #[test]
    fn test_partial_failure_attempts_every_write() {
        let root = TempDir::new().unwrap();
        let config = config_with(Some("cz"), &["cz"], &[]);

        // etc exists so the vconsole write can succeed, but etc/sysconfig
        // is a plain file, so the sysconfig write must fail.
        fs::create_dir_all(root.path().join("etc")).unwrap();
        fs::write(root.path().join("etc/sysconfig"), "not a directory").unwrap();

        let err = write_keyboard_config(&config, root.path(), 1).unwrap_err();

        assert_eq!(err.failures.len(), 1, "only the sysconfig step failed");
        assert!(
            err.failures[0].path.ends_with("etc/sysconfig/keyboard"),
            "aggregate should name the failing artifact: {}",
            err.failures[0]
        );

        // The later write was still attempted and succeeded.
        let vcconf = fs::read_to_string(root.path().join("etc/vconsole.conf")).unwrap();
        assert_eq!(vcconf, "KEYMAP=\"cz\"\n");
    }

    #[test]
    fn test_directory_failure_is_collected_not_fatal() {
        let root = TempDir::new().unwrap();
        let config = config_with(Some("cz"), &["cz"], &[]);

        // A file where etc/X11 should be makes both the directory creation
        // and the X snippet write fail; the keymap writes still happen.
        fs::create_dir_all(root.path().join("etc/sysconfig")).unwrap();
        fs::write(root.path().join("etc/X11"), "in the way").unwrap();

        let err = write_keyboard_config(&config, root.path(), 1).unwrap_err();

        assert_eq!(err.failures.len(), 2, "directory step and X write failed");
        assert_eq!(
            fs::read_to_string(root.path().join("etc/vconsole.conf")).unwrap(),
            "KEYMAP=\"cz\"\n"
        );
    }
}
