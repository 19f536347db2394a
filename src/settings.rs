use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing::warn;

use crate::logging::parse_level;
use crate::placement::{CardColor, PlacementConfig};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub placement: PlacementConfig,
    pub font_family: String,
    pub font_path: Option<PathBuf>,
    pub render_timeout: Option<Duration>,
    pub file_prefix: String,
    pub share_title: String,
    pub share_text: String,
    pub log_level: Option<Level>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            placement: PlacementConfig::default(),
            font_family: "Cairo".to_string(),
            font_path: None,
            render_timeout: Some(Duration::from_secs(30)),
            file_prefix: "Ramadan-Card".to_string(),
            share_title: "تهنئة رمضان".to_string(),
            share_text: "بطاقة تهنئة للموظف: {{ name }}".to_string(),
            log_level: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    placement: Option<PlacementSettings>,
    font: Option<FontSettings>,
    render: Option<RenderSettings>,
    export: Option<ExportSettings>,
    logging: Option<LoggingSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct PlacementSettings {
    anchor_x: Option<f64>,
    anchor_y: Option<f64>,
    font_size: Option<i64>,
    color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    family: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingSettings {
    level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportSettings {
    file_prefix: Option<String>,
    share_title: Option<String>,
    share_text: Option<String>,
}

/// Loads the embedded defaults, then layers local, home and `extra_path` files on top.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults);

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(placement) = incoming.placement {
            let current = self.placement.clone();
            let color = match placement.color.as_deref() {
                Some(value) if !value.trim().is_empty() => CardColor::parse(value)
                    .unwrap_or_else(|| {
                        warn!("ignoring invalid placement colour '{}'", value);
                        current.color()
                    }),
                _ => current.color(),
            };
            self.placement = PlacementConfig::new(
                placement.anchor_x.unwrap_or(current.anchor_x()),
                placement.anchor_y.unwrap_or(current.anchor_y()),
                placement
                    .font_size
                    .unwrap_or(i64::from(current.font_size())),
                color,
            );
        }
        if let Some(font) = incoming.font {
            if let Some(family) = font.family {
                if !family.trim().is_empty() {
                    self.font_family = family.trim().to_string();
                }
            }
            if let Some(path) = font.path {
                if !path.trim().is_empty() {
                    self.font_path = Some(PathBuf::from(path.trim()));
                }
            }
        }
        if let Some(render) = incoming.render {
            if let Some(timeout) = render.timeout_ms {
                self.render_timeout = if timeout == 0 {
                    None
                } else {
                    Some(Duration::from_millis(timeout))
                };
            }
        }
        if let Some(export) = incoming.export {
            if let Some(prefix) = export.file_prefix {
                if !prefix.trim().is_empty() {
                    self.file_prefix = prefix.trim().to_string();
                }
            }
            if let Some(title) = export.share_title {
                if !title.trim().is_empty() {
                    self.share_title = title;
                }
            }
            if let Some(text) = export.share_text {
                if !text.trim().is_empty() {
                    self.share_text = text;
                }
            }
        }
        if let Some(logging) = incoming.logging {
            if let Some(level) = logging.level {
                match parse_level(&level) {
                    Ok(level) => self.log_level = level,
                    Err(err) => warn!("ignoring {}", err),
                }
            }
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".greeting-cards-rust"))
        }
    })
}
