//! Personalised greeting cards: overlay each name from a list onto one
//! template image and render the batch with live per-card progress.

pub mod batch;
pub mod error;
pub mod export;
pub mod font;
pub mod logging;
pub mod names;
pub mod placement;
pub mod render;
pub mod settings;
pub mod template;
pub mod wizard;

#[cfg(test)]
mod test_util;

pub use batch::{
    BatchEvent, BatchHandle, BatchRunner, BatchState, BatchSummary, CancelToken, CardItem,
    CardStatus,
};
pub use error::CardError;
pub use export::{CardExporter, SharePayload, ShareTarget};
pub use font::FontBook;
pub use names::{NameList, parse_names};
pub use placement::{Bounds, CardColor, PlacementConfig, PlacementEditor};
pub use render::{CardRender, CardRenderer, FOOTER_TEXT, RenderedCard};
pub use settings::{Settings, load_settings};
pub use template::TemplateImage;
pub use wizard::{Configuring, Reviewing, Uploading, WizardStep};

/// Builds a renderer and a batch runner from settings, applying the configured
/// per-card timeout and log level.
pub fn runner_from_settings(settings: &Settings) -> anyhow::Result<BatchRunner<CardRenderer>> {
    logging::init(settings);
    let renderer = CardRenderer::from_settings(settings)?;
    Ok(BatchRunner::new(renderer).with_timeout(settings.render_timeout))
}
