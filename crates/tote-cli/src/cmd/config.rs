use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tote_core::config::{EffectiveConfig, ProjectConfig, UserConfig, resolve_config};
use toml::Value;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show resolved or raw configuration
    Show(ShowArgs),
    /// Set a configuration key in project or user scope
    Set(SetArgs),
    /// Unset a configuration key in project or user scope
    Unset(UnsetArgs),
    /// Print config and cookie jar locations
    Path,
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Show raw project config only
    #[arg(long, conflicts_with = "user")]
    project: bool,

    /// Show raw user config only
    #[arg(long)]
    user: bool,
}

#[derive(Args, Debug)]
struct SetArgs {
    /// Scope to mutate
    #[arg(long, default_value = "project")]
    scope: ConfigScope,

    /// Dot path key (e.g. layout.breakpoint_px, cart.currency, output)
    key: String,

    /// New value
    value: String,
}

#[derive(Args, Debug)]
struct UnsetArgs {
    /// Scope to mutate
    #[arg(long, default_value = "project")]
    scope: ConfigScope,

    /// Dot path key (e.g. layout.breakpoint_px, cart.currency, output)
    key: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ConfigScope {
    Project,
    User,
}

/// Where a key lives in its file: `None` section means top level.
type KeyPath<'a> = (Option<&'a str>, &'a str);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyKind {
    Integer,
    Text,
    Currency,
    OutputMode,
}

pub fn run_config(args: &ConfigArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    match &args.command {
        ConfigCommand::Show(show) => run_show(show, project_root, output),
        ConfigCommand::Set(set) => run_set(set, project_root, output),
        ConfigCommand::Unset(unset) => run_unset(unset, project_root, output),
        ConfigCommand::Path => run_path(project_root, output),
    }
}

fn run_show(args: &ShowArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    if args.project {
        let value = load_toml_table(&project_config_path(project_root))?;
        return print_toml_or_json(&value, output);
    }

    if args.user {
        let value = load_toml_table(&user_config_path()?)?;
        return print_toml_or_json(&value, output);
    }

    let effective = resolve_config(project_root, output.is_json())?;
    print_effective(&effective, project_root, output)
}

fn run_set(args: &SetArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = scope_path(args.scope, project_root)?;
    let mut value = load_toml_table(&path)?;
    apply_set(&mut value, args.scope, &args.key, &args.value)?;
    check_scope(&value, args.scope)?;
    write_toml_table(&path, &value)?;
    render_mutation(output, "set", scope_label(args.scope), &args.key)
}

fn run_unset(args: &UnsetArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = scope_path(args.scope, project_root)?;
    let mut value = load_toml_table(&path)?;
    apply_unset(&mut value, args.scope, &args.key)?;
    write_toml_table(&path, &value)?;
    render_mutation(output, "unset", scope_label(args.scope), &args.key)
}

#[derive(Debug, Serialize)]
struct ConfigPaths {
    project: PathBuf,
    user: Option<PathBuf>,
    cookie_jar: PathBuf,
}

fn run_path(project_root: &Path, output: OutputMode) -> Result<()> {
    let project = tote_core::config::load_project_config(project_root)?;
    let paths = ConfigPaths {
        project: project_config_path(project_root),
        user: user_config_path().ok(),
        cookie_jar: project.storage.jar_path(project_root),
    };

    render_mode(
        output,
        &paths,
        |p, w| {
            writeln!(w, "project={}", p.project.display())?;
            if let Some(user) = &p.user {
                writeln!(w, "user={}", user.display())?;
            }
            writeln!(w, "cookie_jar={}", p.cookie_jar.display())
        },
        |p, w| {
            pretty_section(w, "Config Paths")?;
            pretty_kv(w, "Project", p.project.display().to_string())?;
            pretty_kv(
                w,
                "User",
                p.user
                    .as_ref()
                    .map_or_else(|| "(unavailable)".to_string(), |u| u.display().to_string()),
            )?;
            pretty_kv(w, "Cookie jar", p.cookie_jar.display().to_string())
        },
    )
}

fn apply_set(root: &mut Value, scope: ConfigScope, key: &str, raw: &str) -> Result<()> {
    let (path, kind) = known_key(scope, key)?;
    let parsed = parse_value(kind, key, raw)?;
    let table = target_table(root, path.0, true)?
        .ok_or_else(|| anyhow!("Config root must be a TOML table"))?;
    table.insert(path.1.to_string(), parsed);
    Ok(())
}

fn apply_unset(root: &mut Value, scope: ConfigScope, key: &str) -> Result<()> {
    let ((section, leaf), _) = known_key(scope, key)?;
    if let Some(table) = target_table(root, section, false)? {
        table.remove(leaf);
    }

    if let Some(section) = section
        && let Some(root_table) = root.as_table_mut()
        && root_table
            .get(section)
            .and_then(Value::as_table)
            .is_some_and(toml::map::Map::is_empty)
    {
        root_table.remove(section);
    }

    Ok(())
}

/// The table a key is written into, created on demand when `create` is set.
fn target_table<'v>(
    root: &'v mut Value,
    section: Option<&str>,
    create: bool,
) -> Result<Option<&'v mut toml::map::Map<String, Value>>> {
    let table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Config root must be a TOML table"))?;

    let Some(section) = section else {
        return Ok(Some(table));
    };

    if !create && !table.contains_key(section) {
        return Ok(None);
    }

    let entry = table
        .entry(section.to_string())
        .or_insert_with(|| Value::Table(toml::map::Map::new()));
    entry
        .as_table_mut()
        .map(Some)
        .ok_or_else(|| anyhow!("Section {section} must be a TOML table"))
}

fn known_key(scope: ConfigScope, key: &str) -> Result<(KeyPath<'_>, KeyKind)> {
    let found = match scope {
        ConfigScope::Project => key.split_once('.').and_then(|(section, leaf)| {
            let kind = match (section, leaf) {
                (
                    "layout",
                    "breakpoint_px"
                    | "panel_min_width_px"
                    | "panel_max_width_px"
                    | "panel_width_percent"
                    | "desktop_slide_offset_px"
                    | "mobile_slide_offset_px"
                    | "desktop_content_height_vh"
                    | "content_max_width_px",
                )
                | ("storage", "lock_timeout_ms") => KeyKind::Integer,
                ("storage", "cookie_name" | "jar_path") => KeyKind::Text,
                ("cart", "currency") => KeyKind::Currency,
                _ => return None,
            };
            Some(((Some(section), leaf), kind))
        }),
        ConfigScope::User => match key {
            "output" | "user.output" => Some(((None, "output"), KeyKind::OutputMode)),
            _ => None,
        },
    };

    found.ok_or_else(|| anyhow!("Unsupported key `{key}` for {} scope", scope_label(scope)))
}

fn parse_value(kind: KeyKind, key: &str, raw: &str) -> Result<Value> {
    match kind {
        KeyKind::Integer => {
            let number: u32 = raw
                .parse()
                .with_context(|| format!("{key} expects a non-negative integer"))?;
            Ok(Value::Integer(i64::from(number)))
        }
        KeyKind::Text => {
            if raw.trim().is_empty() {
                bail!("{key} must not be empty");
            }
            Ok(Value::String(raw.to_string()))
        }
        KeyKind::Currency => {
            let code = tote_core::CurrencyCode::new(raw)
                .with_context(|| format!("{key} expects a three-letter currency code"))?;
            Ok(Value::String(code.as_str().to_string()))
        }
        KeyKind::OutputMode => match OutputMode::from_name(raw) {
            Some(_) => Ok(Value::String(raw.trim().to_ascii_lowercase())),
            None => bail!("{key} expects pretty, text or json"),
        },
    }
}

/// The edited table must still load as the scope's config.
fn check_scope(value: &Value, scope: ConfigScope) -> Result<()> {
    match scope {
        ConfigScope::Project => {
            value
                .clone()
                .try_into::<ProjectConfig>()
                .context("Edited project config no longer parses")?;
        }
        ConfigScope::User => {
            value
                .clone()
                .try_into::<UserConfig>()
                .context("Edited user config no longer parses")?;
        }
    }
    Ok(())
}

fn load_toml_table(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Table(toml::map::Map::new()));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

    if !value.is_table() {
        bail!("{} must contain a top-level TOML table", path.display());
    }

    Ok(value)
}

fn write_toml_table(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let serialized = toml::to_string_pretty(value)?;
    std::fs::write(path, serialized).with_context(|| format!("Failed to write {}", path.display()))
}

fn print_toml_or_json(value: &Value, output: OutputMode) -> Result<()> {
    let rendered = match output {
        OutputMode::Json => serde_json::to_string_pretty(value)?,
        OutputMode::Text | OutputMode::Pretty => toml::to_string_pretty(value)?,
    };
    println!("{rendered}");
    Ok(())
}

fn print_effective(value: &EffectiveConfig, project_root: &Path, output: OutputMode) -> Result<()> {
    render_mode(
        output,
        value,
        |v, w| print_effective_text(v, project_root, w),
        |v, w| {
            writeln!(w, "resolved_output = \"{}\"", v.resolved_output)?;
            writeln!(w)?;
            let project = toml::to_string_pretty(&v.project)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            write!(w, "{project}")?;
            writeln!(w)?;
            writeln!(w, "[user]")?;
            if let Some(out) = &v.user.output {
                writeln!(w, "output = \"{out}\"")?;
            }
            Ok(())
        },
    )
}

fn print_effective_text(value: &EffectiveConfig, project_root: &Path, w: &mut dyn Write) -> io::Result<()> {
    let layout = &value.project.layout;
    let storage = &value.project.storage;
    writeln!(w, "resolved_output={}", value.resolved_output)?;
    writeln!(w, "layout.breakpoint_px={}", layout.breakpoint_px)?;
    writeln!(w, "layout.panel_min_width_px={}", layout.panel_min_width_px)?;
    writeln!(w, "layout.panel_max_width_px={}", layout.panel_max_width_px)?;
    writeln!(w, "layout.panel_width_percent={}", layout.panel_width_percent)?;
    writeln!(w, "layout.desktop_slide_offset_px={}", layout.desktop_slide_offset_px)?;
    writeln!(w, "layout.mobile_slide_offset_px={}", layout.mobile_slide_offset_px)?;
    writeln!(w, "layout.desktop_content_height_vh={}", layout.desktop_content_height_vh)?;
    writeln!(w, "layout.content_max_width_px={}", layout.content_max_width_px)?;
    writeln!(w, "storage.cookie_name={}", storage.cookie_name)?;
    writeln!(w, "storage.jar_path={}", storage.jar_path(project_root).display())?;
    writeln!(w, "storage.lock_timeout_ms={}", storage.lock_timeout_ms)?;
    writeln!(w, "cart.currency={}", value.project.cart.currency)?;
    if let Some(out) = &value.user.output {
        writeln!(w, "user.output={out}")?;
    }
    Ok(())
}

fn render_mutation(output: OutputMode, action: &str, scope: &str, key: &str) -> Result<()> {
    match output {
        OutputMode::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "ok": true,
                    "action": action,
                    "scope": scope,
                    "key": key,
                }))?
            );
        }
        OutputMode::Text => {
            println!("ok=true action={action} scope={scope} key={key}");
        }
        OutputMode::Pretty => {
            println!("{} {} in {} config", action_to_title(action), key, scope);
        }
    }
    Ok(())
}

fn action_to_title(action: &str) -> &'static str {
    match action {
        "set" => "Set",
        "unset" => "Unset",
        _ => "Updated",
    }
}

fn scope_path(scope: ConfigScope, project_root: &Path) -> Result<PathBuf> {
    match scope {
        ConfigScope::Project => Ok(project_config_path(project_root)),
        ConfigScope::User => user_config_path(),
    }
}

fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".tote/config.toml")
}

fn user_config_path() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Unable to resolve user config directory"))?;
    Ok(config_dir.join("tote/config.toml"))
}

const fn scope_label(scope: ConfigScope) -> &'static str {
    match scope {
        ConfigScope::Project => "project",
        ConfigScope::User => "user",
    }
}
