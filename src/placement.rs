use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const MIN_FONT_SIZE: u32 = 20;
pub const MAX_FONT_SIZE: u32 = 120;
pub const DEFAULT_FONT_SIZE: u32 = 48;
pub const DEFAULT_ANCHOR_X: f64 = 0.5;
pub const DEFAULT_ANCHOR_Y: f64 = 0.75;
pub const DEFAULT_COLOR: CardColor = CardColor::rgb(0, 0, 0);

/// Preset swatches offered next to the free-form colour input.
pub const SWATCHES: [&str; 6] = [
    "#000000", "#1f2937", "#4c1d95", "#1e40af", "#047857", "#b91c1c",
];

const PREVIEW_FONT_SCALE: f64 = 0.5;
const PREVIEW_MIN_FONT_SIZE: f64 = 12.0;

/// An 8-bit RGBA colour parsed from any CSS colour syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardColor {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl CardColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        let parsed: csscolorparser::Color = trimmed.parse().ok()?;
        let [r, g, b, a] = parsed.to_rgba8();
        Some(Self { r, g, b, a })
    }

    /// `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Opaque `#rrggbb` form for SVG `fill`; pair with [`CardColor::opacity`].
    pub fn to_rgb_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn opacity(&self) -> f32 {
        self.a as f32 / 255.0
    }

    pub fn channels(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for CardColor {
    fn default() -> Self {
        DEFAULT_COLOR
    }
}

impl fmt::Display for CardColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for CardColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid colour '{}'", s))
    }
}

impl TryFrom<String> for CardColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CardColor> for String {
    fn from(color: CardColor) -> Self {
        color.to_hex()
    }
}

/// Resolution-independent text placement.
///
/// The anchor is the centre of the rendered name as a fraction of the
/// template's width and height, so the same value renders identically on
/// any template size and any preview size. `font_size` is in pixels at the
/// template's native resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlacementFields")]
pub struct PlacementConfig {
    anchor_x: f64,
    anchor_y: f64,
    font_size: u32,
    color: CardColor,
}

#[derive(Deserialize)]
struct PlacementFields {
    anchor_x: f64,
    anchor_y: f64,
    font_size: i64,
    color: CardColor,
}

impl From<PlacementFields> for PlacementConfig {
    fn from(fields: PlacementFields) -> Self {
        PlacementConfig::new(
            fields.anchor_x,
            fields.anchor_y,
            fields.font_size,
            fields.color,
        )
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            anchor_x: DEFAULT_ANCHOR_X,
            anchor_y: DEFAULT_ANCHOR_Y,
            font_size: DEFAULT_FONT_SIZE,
            color: DEFAULT_COLOR,
        }
    }
}

impl PlacementConfig {
    /// Builds a config, clamping the anchor to `[0, 1]` and the size to the slider range.
    pub fn new(anchor_x: f64, anchor_y: f64, font_size: i64, color: CardColor) -> Self {
        Self {
            anchor_x: clamp_unit(anchor_x, DEFAULT_ANCHOR_X),
            anchor_y: clamp_unit(anchor_y, DEFAULT_ANCHOR_Y),
            font_size: clamp_font_size(font_size),
            color,
        }
    }

    pub fn anchor_x(&self) -> f64 {
        self.anchor_x
    }

    pub fn anchor_y(&self) -> f64 {
        self.anchor_y
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn color(&self) -> CardColor {
        self.color
    }

    /// Pixel position of the anchor on a surface of the given size.
    pub fn anchor_px(&self, width: u32, height: u32) -> (f64, f64) {
        (self.anchor_x * width as f64, self.anchor_y * height as f64)
    }

    /// Font size used by an editor preview.
    ///
    /// Deliberately an approximation: the preview is proportional to the
    /// output, not pixel identical. Only [`PlacementConfig::font_size`]
    /// reaches the renderer.
    pub fn preview_font_size(&self) -> f64 {
        (self.font_size as f64 * PREVIEW_FONT_SCALE).max(PREVIEW_MIN_FONT_SIZE)
    }
}

pub fn clamp_font_size(size: i64) -> u32 {
    size.clamp(MIN_FONT_SIZE as i64, MAX_FONT_SIZE as i64) as u32
}

fn clamp_unit(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        return fallback;
    }
    value.clamp(0.0, 1.0)
}

/// On-screen rectangle of the preview surface, in pointer coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Direct-manipulation editor that owns the placement while the user edits it.
///
/// Every mutator returns the resulting config so the caller can publish it.
/// The drag session ends on the global pointer release, wherever it happens.
#[derive(Debug, Clone, Default)]
pub struct PlacementEditor {
    config: PlacementConfig,
    dragging: bool,
}

impl PlacementEditor {
    pub fn new(config: PlacementConfig) -> Self {
        Self {
            config,
            dragging: false,
        }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn begin_drag(&mut self) {
        if self.dragging {
            return;
        }
        debug!("placement drag started");
        self.dragging = true;
    }

    /// Moves the anchor under the pointer. Returns `None` when no drag is active
    /// or the bounds are degenerate.
    pub fn update_from_pointer(
        &mut self,
        pointer_x: f64,
        pointer_y: f64,
        bounds: Bounds,
    ) -> Option<&PlacementConfig> {
        if !self.dragging {
            return None;
        }
        if !(bounds.width > 0.0 && bounds.height > 0.0) {
            return None;
        }
        let x = (pointer_x - bounds.left) / bounds.width;
        let y = (pointer_y - bounds.top) / bounds.height;
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        self.config.anchor_x = x.clamp(0.0, 1.0);
        self.config.anchor_y = y.clamp(0.0, 1.0);
        Some(&self.config)
    }

    pub fn end_drag(&mut self) {
        if self.dragging {
            debug!(
                anchor_x = self.config.anchor_x,
                anchor_y = self.config.anchor_y,
                "placement drag ended"
            );
        }
        self.dragging = false;
    }

    pub fn set_font_size(&mut self, size: i64) -> &PlacementConfig {
        self.config.font_size = clamp_font_size(size);
        &self.config
    }

    /// Applies a CSS colour; an unparsable value keeps the previous colour.
    pub fn set_color(&mut self, value: &str) -> &PlacementConfig {
        match CardColor::parse(value) {
            Some(color) => self.config.color = color,
            None => debug!("ignoring invalid colour '{}'", value),
        }
        &self.config
    }

    pub fn into_config(self) -> PlacementConfig {
        self.config
    }
}
