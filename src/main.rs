//! CLI entry point for installer-keyboard-manager
//!
//! Provides a command-line interface for activating keyboard
//! configuration, writing it to a target root, converting between console
//! keymaps and X11 layouts, and inspecting the layout catalog.

use clap::{Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::PathBuf;

use installer_keyboard_manager::activation::{resolve_missing, KeyboardActivator, Loadkeys};
use installer_keyboard_manager::config::write_keyboard_config;
use installer_keyboard_manager::core::{
    InputRegistry, KeyboardConfig, LayoutCatalog, LayoutSetManager, XkbRulesRegistry,
};
use installer_keyboard_manager::ipc::{KeymapConverter, LocaledClient, XkbSessionEngine};

#[derive(Parser)]
#[command(name = "installer-keyboard-manager")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// Read the keyboard configuration from a TOML file
    #[arg(short, long)]
    from: Option<PathBuf>,

    /// Console keymap identifier, e.g. "cz-qwerty"
    #[arg(short, long)]
    keymap: Option<String>,

    /// X11 layout in "layout" or "layout (variant)" form; repeatable,
    /// first one is the default layout
    #[arg(short, long)]
    layout: Vec<String>,

    /// Layout switching option, e.g. "grp:alt_shift_toggle"; repeatable
    #[arg(short, long)]
    switch_option: Vec<String>,

    /// Legacy one-string keyboard value (ambiguous between a console
    /// keymap and an X11 layout)
    #[arg(long)]
    legacy: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile, activate and persist a keyboard configuration
    Activate {
        #[command(flatten)]
        config: ConfigArgs,

        /// Root to persist the configuration under
        #[arg(short, long, default_value = "/")]
        root: String,
    },

    /// Write configuration files for a target root, without activating
    WriteConfig {
        #[command(flatten)]
        config: ConfigArgs,

        /// Root of the installed system
        #[arg(short, long, default_value = "/mnt/sysimage")]
        root: String,

        /// Two-digit xorg.conf.d ordering prefix
        #[arg(short, long, default_value_t = 1)]
        weight: u8,

        /// Derive missing fields via the locale service before writing
        #[arg(short, long)]
        convert: bool,
    },

    /// Convert between a console keymap and an X11 layout.
    /// Conversions activate what they convert on the live system!
    Convert {
        /// Console keymap to convert to an X11 layout
        #[arg(short, long, conflicts_with = "layout")]
        keymap: Option<String>,

        /// X11 layout ("layout" or "layout (variant)") to convert to a
        /// console keymap
        #[arg(short, long)]
        layout: Option<String>,
    },

    /// List the layouts and switching options this system knows about
    ListLayouts {
        /// Alternate XKB rules listing file
        #[arg(long)]
        listing: Option<PathBuf>,
    },

    /// Show the name of the currently active layout
    Current,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Activate { config, root } => activate(config, &root)?,
        Commands::WriteConfig {
            config,
            root,
            weight,
            convert,
        } => write_config(config, &root, weight, convert)?,
        Commands::Convert { keymap, layout } => convert(keymap, layout)?,
        Commands::ListLayouts { listing } => list_layouts(listing)?,
        Commands::Current => current()?,
    }

    Ok(())
}

/// Build a `KeyboardConfig` from a TOML file or from the individual flags.
fn build_config(args: ConfigArgs) -> anyhow::Result<KeyboardConfig> {
    if let Some(from) = args.from {
        let expanded = shellexpand::tilde(
            from.to_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?,
        );
        let content = fs::read_to_string(expanded.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", expanded, e))?;
        let config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", expanded, e))?;
        return Ok(config);
    }

    Ok(KeyboardConfig {
        vc_keymap: args.keymap,
        x_layouts: args.layout,
        switch_options: args.switch_option,
        legacy_keyboard: args.legacy,
    })
}

/// Load the layout catalog, degrading to none when the registry is
/// unavailable (validation is then skipped).
fn load_catalog() -> Option<LayoutCatalog> {
    match LayoutCatalog::from_registry(&XkbRulesRegistry::new()) {
        Ok(catalog) => Some(catalog),
        Err(e) => {
            eprintln!("{} Cannot load the layout catalog: {}", "⚠".yellow(), e);
            None
        }
    }
}

fn expand_root(root: &str) -> anyhow::Result<PathBuf> {
    Ok(PathBuf::from(shellexpand::tilde(root).as_ref()))
}

/// Reconcile the given configuration, activate it live and persist it.
fn activate(args: ConfigArgs, root: &str) -> anyhow::Result<()> {
    let mut config = build_config(args)?;
    let root = expand_root(root)?;

    let converter = LocaledClient::connect()?;
    let mut manager = LayoutSetManager::new(XkbSessionEngine::new()?)?;
    let catalog = load_catalog();

    let mut activator = KeyboardActivator::new(&converter, &Loadkeys, &mut manager)
        .with_root(&root);
    if let Some(catalog) = catalog.as_ref() {
        activator = activator.with_catalog(catalog);
    }

    activator.activate(&mut config)?;

    println!("{} Keyboard configuration activated", "✓".green());
    if let Some(keymap) = &config.vc_keymap {
        println!("  console keymap: {}", keymap.cyan());
    }
    if !config.x_layouts.is_empty() {
        println!("  X11 layouts:    {}", config.x_layouts.join(", ").cyan());
    }

    Ok(())
}

/// Write the configuration files for a target root.
fn write_config(args: ConfigArgs, root: &str, weight: u8, convert: bool) -> anyhow::Result<()> {
    let mut config = build_config(args)?;
    let root = expand_root(root)?;

    if convert {
        let converter = LocaledClient::connect()?;
        resolve_missing(&mut config, &converter)?;
    }

    write_keyboard_config(&config, &root, weight)?;

    println!(
        "{} Keyboard configuration written under {}",
        "✓".green(),
        root.display()
    );

    Ok(())
}

/// Convert a keymap to a layout or a layout to a keymap. Activates!
fn convert(keymap: Option<String>, layout: Option<String>) -> anyhow::Result<()> {
    let converter = LocaledClient::connect()?;

    match (keymap, layout) {
        (Some(keymap), None) => match converter.keymap_to_layout(&keymap)? {
            Some(spec) => println!("{}", spec),
            None => println!("{} No matching X11 layout", "⚠".yellow()),
        },
        (None, Some(layout)) => match converter.layout_to_keymap(&layout)? {
            Some(keymap) => println!("{}", keymap),
            None => println!("{} No matching console keymap", "⚠".yellow()),
        },
        _ => anyhow::bail!("Pass exactly one of --keymap or --layout"),
    }

    Ok(())
}

/// List known layouts and switching options.
fn list_layouts(listing: Option<PathBuf>) -> anyhow::Result<()> {
    let registry = match listing {
        Some(path) => XkbRulesRegistry::with_listing(path),
        None => XkbRulesRegistry::new(),
    };
    let catalog = LayoutCatalog::from_data(registry.load()?);

    let mut total = 0;
    for name in catalog.available_layouts() {
        let display = catalog.display_name(&name).unwrap_or("");
        println!("{} → {}", name.cyan().bold(), display);
        total += 1;
    }
    println!("\n{} Total: {} layouts", "✓".green(), total);

    if !catalog.switching_options().is_empty() {
        println!("\nSwitching options:");
        for option in catalog.switching_options() {
            let display = catalog.switch_option_description(option).unwrap_or("");
            println!("{} → {}", option.magenta(), display);
        }
    }

    Ok(())
}

/// Show the active layout of the running session.
fn current() -> anyhow::Result<()> {
    let mut manager = LayoutSetManager::new(XkbSessionEngine::new()?)?;

    println!("{}", manager.current_layout_name()?);

    Ok(())
}
