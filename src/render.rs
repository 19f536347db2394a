use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use resvg::render;
use tiny_skia::Pixmap;
use tracing::debug;
use usvg::{Options, Tree};

use crate::error::{CardError, Result};
use crate::font::FontBook;
use crate::placement::PlacementConfig;
use crate::settings::Settings;
use crate::template::{PNG_MIME, TemplateImage};

/// Watermark drawn on every card.
pub const FOOTER_TEXT: &str = "احصل على دعوتك مجانا AI6G تم الانشاء بواسطه";
pub const FOOTER_COLOR: &str = "#4b5563";

const FOOTER_MIN_FONT_SIZE: f64 = 16.0;
const FOOTER_WIDTH_RATIO: f64 = 0.02;
const FOOTER_OFFSET_FACTOR: f64 = 1.5;

/// Footer font size for a template width: `max(16, width * 0.02)`.
pub fn footer_font_size(width: u32) -> f64 {
    (width as f64 * FOOTER_WIDTH_RATIO).max(FOOTER_MIN_FONT_SIZE)
}

/// Vertical centre of the footer line.
pub fn footer_y(width: u32, height: u32) -> f64 {
    height as f64 - footer_font_size(width) * FOOTER_OFFSET_FACTOR
}

/// A finished card: PNG bytes at the template's native size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCard {
    png: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl RenderedCard {
    pub fn new(png: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            png: png.into(),
            width,
            height,
        }
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mime(&self) -> &'static str {
        PNG_MIME
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", PNG_MIME, BASE64.encode(&self.png))
    }
}

/// Rasterises one card. The batch loop only sees this trait.
pub trait CardRender: Send + Sync + 'static {
    fn render_one(
        &self,
        template: &TemplateImage,
        name: &str,
        config: &PlacementConfig,
    ) -> Result<RenderedCard>;
}

/// SVG-backed renderer: composes template, name and footer, rasterises with resvg.
#[derive(Clone)]
pub struct CardRenderer {
    fonts: FontBook,
}

impl CardRenderer {
    pub fn new(fonts: FontBook) -> Self {
        Self { fonts }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let fonts = FontBook::load(settings.font_path.as_deref(), &settings.font_family)?;
        debug!(
            family = fonts.family(),
            faces = fonts.face_count(),
            "card renderer ready"
        );
        Ok(Self::new(fonts))
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    /// Builds the SVG document for one card at the template's native size.
    pub fn compose_svg(
        &self,
        template: &TemplateImage,
        name: &str,
        config: &PlacementConfig,
    ) -> String {
        let width = template.width();
        let height = template.height();
        let data_uri = template.data_uri();
        let family = escape_attr(&self.fonts.font_family_attr());

        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        svg.push('\n');
        svg.push_str(&format!(
            r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
            uri = data_uri,
            w = width,
            h = height
        ));
        svg.push('\n');

        let (text_x, text_y) = config.anchor_px(width, height);
        let color = config.color();
        let opacity = if color.opacity() < 1.0 {
            format!(r#" fill-opacity="{}""#, color.opacity())
        } else {
            String::new()
        };
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size}" font-weight="bold" fill="{fill}"{opacity} text-anchor="middle" dominant-baseline="central">{text}</text>"#,
            x = text_x,
            y = text_y,
            family = family,
            size = config.font_size(),
            fill = color.to_rgb_hex(),
            opacity = opacity,
            text = escape_xml(name)
        ));
        svg.push('\n');

        // The footer goes last so the name never covers it.
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size}" fill="{fill}" text-anchor="middle" dominant-baseline="central">{text}</text>"#,
            x = width as f64 / 2.0,
            y = footer_y(width, height),
            family = family,
            size = footer_font_size(width),
            fill = FOOTER_COLOR,
            text = escape_xml(FOOTER_TEXT)
        ));
        svg.push('\n');
        svg.push_str("</svg>");
        svg
    }
}

impl CardRender for CardRenderer {
    fn render_one(
        &self,
        template: &TemplateImage,
        name: &str,
        config: &PlacementConfig,
    ) -> Result<RenderedCard> {
        let width = template.width();
        let height = template.height();
        let mut pixmap =
            Pixmap::new(width, height).ok_or(CardError::RenderSurfaceUnavailable { width, height })?;

        let svg = self.compose_svg(template, name, config);
        let options = Options {
            fontdb: self.fonts.database(),
            ..Options::default()
        };
        let tree = Tree::from_str(&svg, &options)
            .map_err(|err| CardError::RenderFailed(format!("failed to parse card svg: {}", err)))?;
        render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

        let png = encode_png(&pixmap)?;
        Ok(RenderedCard::new(png, width, height))
    }
}

fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>> {
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        rgba.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    let image = image::RgbaImage::from_raw(pixmap.width(), pixmap.height(), rgba)
        .ok_or_else(|| CardError::RenderFailed("failed to build image buffer".to_string()))?;
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|err| CardError::RenderFailed(format!("failed to encode png: {}", err)))?;
    Ok(bytes)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}
