//! The three-step card wizard as explicit states.
//!
//! Each step is its own type and every transition builds the next step from
//! the current one, so a step can only hold what is valid for it: there is no
//! `Configuring` without a decoded template and no `Reviewing` without a batch.

use std::sync::Arc;
use tracing::info;

use crate::batch::{BatchEvent, BatchHandle, BatchRunner, BatchState, CardItem};
use crate::error::{CardError, Result};
use crate::names::NameList;
use crate::placement::{PlacementConfig, PlacementEditor};
use crate::render::CardRender;
use crate::settings::Settings;
use crate::template::TemplateImage;

/// Step 1: waiting for a template. Names and placement survive a template change.
#[derive(Debug, Clone, Default)]
pub struct Uploading {
    names: NameList,
    placement: PlacementConfig,
}

impl Uploading {
    pub fn new(placement: PlacementConfig) -> Self {
        Self {
            names: NameList::new(),
            placement,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.placement.clone())
    }

    pub fn names(&self) -> &NameList {
        &self.names
    }

    pub fn placement(&self) -> &PlacementConfig {
        &self.placement
    }

    /// Decodes the upload; a bad image keeps the wizard on this step.
    pub fn load_template(&self, bytes: Vec<u8>) -> Result<Configuring> {
        let template = TemplateImage::decode(bytes)?;
        Ok(self.with_template(template))
    }

    pub fn with_template(&self, template: TemplateImage) -> Configuring {
        info!(
            width = template.width(),
            height = template.height(),
            "template loaded"
        );
        Configuring {
            template: Arc::new(template),
            names: self.names.clone(),
            editor: PlacementEditor::new(self.placement.clone()),
        }
    }
}

/// Step 2: placing the name and collecting names.
#[derive(Debug, Clone)]
pub struct Configuring {
    template: Arc<TemplateImage>,
    names: NameList,
    editor: PlacementEditor,
}

impl Configuring {
    pub fn template(&self) -> &TemplateImage {
        &self.template
    }

    pub fn names(&self) -> &NameList {
        &self.names
    }

    pub fn names_mut(&mut self) -> &mut NameList {
        &mut self.names
    }

    pub fn editor(&self) -> &PlacementEditor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut PlacementEditor {
        &mut self.editor
    }

    pub fn change_template(&self) -> Uploading {
        Uploading {
            names: self.names.clone(),
            placement: self.editor.config().clone(),
        }
    }

    /// Starts a batch over a copy of the current names and placement. Outside a
    /// tokio runtime this is `RuntimeUnavailable` and no batch starts.
    pub fn generate<R: CardRender>(&self, runner: &BatchRunner<R>) -> Result<Reviewing> {
        let placement = self.editor.config().clone();
        let batch = runner.start(Arc::clone(&self.template), &self.names, &placement)?;
        Ok(Reviewing {
            template: Arc::clone(&self.template),
            names: self.names.clone(),
            placement,
            batch,
            state: BatchState::default(),
        })
    }
}

/// Step 3: watching the batch and exporting finished cards.
pub struct Reviewing {
    template: Arc<TemplateImage>,
    names: NameList,
    placement: PlacementConfig,
    batch: BatchHandle,
    state: BatchState,
}

impl Reviewing {
    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn items(&self) -> &[CardItem] {
        self.state.items()
    }

    pub fn placement(&self) -> &PlacementConfig {
        &self.placement
    }

    /// Waits for the next status change and folds it in. `None` once the batch is drained.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        let event = self.batch.next_event().await?;
        self.state.apply(&event);
        Some(event)
    }

    /// Applies every event published so far without waiting. Returns how many were applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.batch.try_next_event() {
            self.state.apply(&event);
            applied += 1;
        }
        applied
    }

    /// Drives the batch to completion.
    pub async fn finish(&mut self) -> &BatchState {
        while self.next_event().await.is_some() {}
        &self.state
    }

    pub fn cancel(&self) {
        self.batch.cancel();
    }

    /// Back to configuring with the same template, names and placement; the cards are dropped.
    pub fn new_batch(self) -> Configuring {
        self.batch.cancel();
        Configuring {
            template: self.template,
            names: self.names,
            editor: PlacementEditor::new(self.placement),
        }
    }

    pub fn change_template(self) -> Uploading {
        self.batch.cancel();
        Uploading {
            names: self.names,
            placement: self.placement,
        }
    }
}

/// The wizard's current step.
pub enum WizardStep {
    Uploading(Uploading),
    Configuring(Configuring),
    Reviewing(Reviewing),
}

impl Default for WizardStep {
    fn default() -> Self {
        WizardStep::Uploading(Uploading::default())
    }
}

impl WizardStep {
    /// 1-based step number for a step indicator.
    pub fn number(&self) -> u8 {
        match self {
            WizardStep::Uploading(_) => 1,
            WizardStep::Configuring(_) => 2,
            WizardStep::Reviewing(_) => 3,
        }
    }

    /// Starts generation from whatever step is current.
    ///
    /// Without a template this is `EmptyInput`; while reviewing it is a no-op,
    /// a new batch has to be requested first.
    pub fn generate<R: CardRender>(self, runner: &BatchRunner<R>) -> (WizardStep, Result<()>) {
        match self {
            WizardStep::Uploading(step) => (
                WizardStep::Uploading(step),
                Err(CardError::EmptyInput("no template loaded")),
            ),
            WizardStep::Configuring(step) => match step.generate(runner) {
                Ok(reviewing) => (WizardStep::Reviewing(reviewing), Ok(())),
                Err(err) => (WizardStep::Configuring(step), Err(err)),
            },
            reviewing @ WizardStep::Reviewing(_) => (reviewing, Ok(())),
        }
    }
}
