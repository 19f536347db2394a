use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera};
use tracing::{debug, warn};

use crate::batch::CardItem;
use crate::error::{CardError, Result};
use crate::render::RenderedCard;
use crate::settings::Settings;

/// A card ready to hand to the platform share sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePayload {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    pub title: String,
    pub text: String,
}

/// Platform share capability. Absent or refusing targets leave download as the fallback.
pub trait ShareTarget {
    fn can_share(&self, payload: &SharePayload) -> bool;
    fn share(&self, payload: SharePayload) -> anyhow::Result<()>;
}

/// Turns finished cards into downloads and share payloads.
#[derive(Debug, Clone)]
pub struct CardExporter {
    file_prefix: String,
    share_title: String,
    share_text: String,
}

impl CardExporter {
    pub fn new(
        file_prefix: impl Into<String>,
        share_title: impl Into<String>,
        share_text: impl Into<String>,
    ) -> Self {
        Self {
            file_prefix: file_prefix.into(),
            share_title: share_title.into(),
            share_text: share_text.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.file_prefix.clone(),
            settings.share_title.clone(),
            settings.share_text.clone(),
        )
    }

    /// `<prefix>-<name>.png`, with characters unsafe in file names replaced.
    pub fn file_name(&self, name: &str) -> String {
        format!(
            "{}-{}.png",
            sanitize_file_component(&self.file_prefix),
            sanitize_file_component(name)
        )
    }

    /// Writes the card into `dir` and returns the written path.
    pub fn save(&self, item: &CardItem, dir: &Path) -> Result<PathBuf> {
        let card = ready_image(item)?;
        let path = dir.join(self.file_name(item.name()));
        std::fs::write(&path, card.png())?;
        debug!("saved {}", path.display());
        Ok(path)
    }

    pub fn share_payload(&self, item: &CardItem) -> Result<SharePayload> {
        let card = ready_image(item)?;
        Ok(SharePayload {
            file_name: self.file_name(item.name()),
            mime: card.mime(),
            bytes: card.png().to_vec(),
            title: self.share_title.clone(),
            text: self.share_text(item.name()),
        })
    }

    /// Hands the card to `target`. Any share problem is `ShareUnsupported`;
    /// [`CardExporter::save`] remains available.
    pub fn share(&self, item: &CardItem, target: Option<&dyn ShareTarget>) -> Result<()> {
        let Some(target) = target else {
            return Err(CardError::ShareUnsupported(
                "no share target on this platform".to_string(),
            ));
        };
        let payload = self.share_payload(item)?;
        if !target.can_share(&payload) {
            return Err(CardError::ShareUnsupported(format!(
                "target cannot share {} files",
                payload.mime
            )));
        }
        target.share(payload).map_err(|err| {
            warn!("share failed for {}: {}", item.id(), err);
            CardError::ShareUnsupported(format!("share failed: {}", err))
        })
    }

    fn share_text(&self, name: &str) -> String {
        let mut context = TeraContext::new();
        context.insert("name", name);
        Tera::one_off(&self.share_text, &context, false).unwrap_or_else(|err| {
            warn!("invalid share text template: {}", err);
            self.share_text.clone()
        })
    }
}

fn ready_image(item: &CardItem) -> Result<&RenderedCard> {
    item.image()
        .ok_or_else(|| CardError::CardNotReady(item.name().to_string()))
}

fn sanitize_file_component(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect()
}
