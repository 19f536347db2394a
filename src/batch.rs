//! Sequential batch rendering with a live per-card status feed.
//!
//! A batch copies the name list into immutable [`CardItem`]s up front, then
//! renders them one at a time in list order. Every status change is published
//! as a [`BatchEvent`]; each card moves strictly forward through
//! `pending -> generating -> done | failed`, or `pending -> cancelled`.

use futures_util::Stream;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CardError, Result};
use crate::names::NameList;
use crate::placement::PlacementConfig;
use crate::render::{CardRender, RenderedCard};
use crate::template::TemplateImage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CardStatus {
    Pending,
    Generating,
    Done,
    Failed { reason: String },
    Cancelled,
}

impl CardStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CardStatus::Done | CardStatus::Failed { .. } | CardStatus::Cancelled
        )
    }
}

/// One render job. Identity and name never change; the image is set once, on `done`.
#[derive(Debug, Clone, Serialize)]
pub struct CardItem {
    id: String,
    name: String,
    #[serde(skip)]
    image: Option<RenderedCard>,
    #[serde(flatten)]
    status: CardStatus,
}

impl CardItem {
    fn pending(index: usize, name: &str) -> Self {
        Self {
            id: format!("card-{}", index),
            name: name.to_string(),
            image: None,
            status: CardStatus::Pending,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> Option<&RenderedCard> {
        self.image.as_ref()
    }

    pub fn status(&self) -> &CardStatus {
        &self.status
    }

    fn begin(&mut self) -> bool {
        if self.status != CardStatus::Pending {
            return false;
        }
        self.status = CardStatus::Generating;
        true
    }

    fn complete(&mut self, image: RenderedCard) -> bool {
        if self.status != CardStatus::Generating {
            return false;
        }
        self.image = Some(image);
        self.status = CardStatus::Done;
        true
    }

    fn fail(&mut self, err: &CardError) -> bool {
        if self.status != CardStatus::Generating {
            return false;
        }
        self.status = CardStatus::Failed {
            reason: err.to_string(),
        };
        true
    }

    fn cancel(&mut self) -> bool {
        if self.status != CardStatus::Pending {
            return false;
        }
        self.status = CardStatus::Cancelled;
        true
    }

    #[cfg(test)]
    pub(crate) fn finished(index: usize, name: &str, image: Option<RenderedCard>) -> Self {
        let mut item = CardItem::pending(index, name);
        item.begin();
        match image {
            Some(image) => item.complete(image),
            None => item.fail(&CardError::RenderFailed("test".to_string())),
        };
        item
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    fn from_items(items: &[CardItem]) -> Self {
        let mut summary = BatchSummary {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.status {
                CardStatus::Done => summary.done += 1,
                CardStatus::Failed { .. } => summary.failed += 1,
                CardStatus::Cancelled => summary.cancelled += 1,
                CardStatus::Pending | CardStatus::Generating => {}
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Full initial snapshot, every card `pending`.
    Started { items: Vec<CardItem> },
    /// One card changed status.
    Updated { index: usize, item: CardItem },
    /// Every card is terminal.
    Finished { summary: BatchSummary },
}

/// Folds [`BatchEvent`]s into the current view of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchState {
    items: Vec<CardItem>,
    summary: Option<BatchSummary>,
}

impl BatchState {
    pub fn apply(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::Started { items } => {
                self.items = items.clone();
                self.summary = None;
            }
            BatchEvent::Updated { index, item } => {
                if let Some(slot) = self.items.get_mut(*index) {
                    *slot = item.clone();
                }
            }
            BatchEvent::Finished { summary } => self.summary = Some(*summary),
        }
    }

    pub fn items(&self) -> &[CardItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn done_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == CardStatus::Done)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.summary.is_some()
    }

    pub fn summary(&self) -> Option<BatchSummary> {
        self.summary
    }
}

/// Cooperative cancellation, checked before each card starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Starts batches on the current tokio runtime.
pub struct BatchRunner<R: CardRender> {
    renderer: Arc<R>,
    timeout: Option<Duration>,
}

impl<R: CardRender> Clone for BatchRunner<R> {
    fn clone(&self) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
            timeout: self.timeout,
        }
    }
}

impl<R: CardRender> BatchRunner<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer: Arc::new(renderer),
            timeout: None,
        }
    }

    /// Bounds each card's render; a card exceeding it fails and the batch moves on.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn start(
        &self,
        template: Arc<TemplateImage>,
        names: &NameList,
        config: &PlacementConfig,
    ) -> Result<BatchHandle> {
        self.start_with_cancel(template, names, config, CancelToken::new())
    }

    /// Creates one pending card per name, publishes the snapshot and spawns the
    /// render loop on the current tokio runtime.
    pub fn start_with_cancel(
        &self,
        template: Arc<TemplateImage>,
        names: &NameList,
        config: &PlacementConfig,
        cancel: CancelToken,
    ) -> Result<BatchHandle> {
        if names.is_empty() {
            return Err(CardError::EmptyInput("the name list is empty"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| CardError::RuntimeUnavailable(err.to_string()))?;
        let items: Vec<CardItem> = names
            .iter()
            .enumerate()
            .map(|(index, name)| CardItem::pending(index, name))
            .collect();

        let (sender, events) = mpsc::unbounded_channel();
        let _ = sender.send(BatchEvent::Started {
            items: items.clone(),
        });
        info!(
            cards = items.len(),
            width = template.width(),
            height = template.height(),
            "batch started"
        );

        let job = BatchJob {
            renderer: Arc::clone(&self.renderer),
            template,
            config: config.clone(),
            timeout: self.timeout,
            cancel: cancel.clone(),
            slot: Arc::new(Semaphore::new(1)),
            sender,
        };
        let task = runtime.spawn(job.run(items));
        Ok(BatchHandle {
            events,
            cancel,
            task,
        })
    }
}

/// Live view of a running batch: its event feed, cancellation and final result.
pub struct BatchHandle {
    events: mpsc::UnboundedReceiver<BatchEvent>,
    cancel: CancelToken,
    task: JoinHandle<Vec<CardItem>>,
}

impl BatchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the batch has finished and the feed is drained.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Next already-published event without waiting.
    pub fn try_next_event(&mut self) -> Option<BatchEvent> {
        self.events.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = BatchEvent> {
        futures_util::stream::unfold(self.events, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }

    /// Waits for the render loop and returns every card in its terminal state.
    pub async fn wait(self) -> Result<Vec<CardItem>> {
        self.task
            .await
            .map_err(|err| CardError::RenderFailed(format!("batch task failed: {}", err)))
    }
}

struct BatchJob<R: CardRender> {
    renderer: Arc<R>,
    template: Arc<TemplateImage>,
    config: PlacementConfig,
    timeout: Option<Duration>,
    cancel: CancelToken,
    /// One permit: held by the blocking render until it returns, even past a timeout.
    slot: Arc<Semaphore>,
    sender: mpsc::UnboundedSender<BatchEvent>,
}

impl<R: CardRender> BatchJob<R> {
    async fn run(self, mut items: Vec<CardItem>) -> Vec<CardItem> {
        for index in 0..items.len() {
            if self.cancel.is_cancelled() {
                info!(remaining = items.len() - index, "batch cancelled");
                for rest in index..items.len() {
                    if items[rest].cancel() {
                        self.publish(rest, &items[rest]);
                    }
                }
                break;
            }

            if items[index].begin() {
                self.publish(index, &items[index]);
            }
            debug!(id = items[index].id(), "rendering card");
            match self.render(items[index].name()).await {
                Ok(card) => {
                    items[index].complete(card);
                }
                Err(err) => {
                    warn!(id = items[index].id(), "card failed: {}", err);
                    items[index].fail(&err);
                }
            }
            self.publish(index, &items[index]);
        }

        // A timed-out render may still be running; finish only once it has exited.
        let _ = self.slot.acquire().await;

        let summary = BatchSummary::from_items(&items);
        info!(
            done = summary.done,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "batch finished"
        );
        let _ = self.sender.send(BatchEvent::Finished { summary });
        items
    }

    async fn render(&self, name: &str) -> Result<RenderedCard> {
        let renderer = Arc::clone(&self.renderer);
        let template = Arc::clone(&self.template);
        let config = self.config.clone();
        let name = name.to_string();
        let permit = Arc::clone(&self.slot)
            .acquire_owned()
            .await
            .map_err(|err| CardError::RenderFailed(format!("render slot closed: {}", err)))?;
        let task = tokio::task::spawn_blocking(move || {
            let rendered = renderer.render_one(&template, &name, &config);
            drop(permit);
            rendered
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => return Err(CardError::RenderTimeout { elapsed: limit }),
            },
            None => task.await,
        };
        joined.map_err(|err| CardError::RenderFailed(format!("render task failed: {}", err)))?
    }

    fn publish(&self, index: usize, item: &CardItem) {
        // A dropped receiver only means nobody is watching; the batch still completes.
        let _ = self.sender.send(BatchEvent::Updated {
            index,
            item: item.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct StubRenderer {
        fail_on: Option<&'static str>,
        slow_on: Option<&'static str>,
        slow_all: bool,
        cancel_on: Option<(&'static str, CancelToken)>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl CardRender for StubRenderer {
        fn render_one(
            &self,
            template: &TemplateImage,
            name: &str,
            _config: &PlacementConfig,
        ) -> Result<RenderedCard> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.slow_all || self.slow_on == Some(name) {
                std::thread::sleep(Duration::from_millis(300));
            }
            if let Some((trigger, token)) = &self.cancel_on {
                if *trigger == name {
                    token.cancel();
                }
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_on == Some(name) {
                return Err(CardError::RenderSurfaceUnavailable {
                    width: template.width(),
                    height: template.height(),
                });
            }
            Ok(RenderedCard::new(
                name.as_bytes().to_vec(),
                template.width(),
                template.height(),
            ))
        }
    }

    fn template() -> Arc<TemplateImage> {
        Arc::new(TemplateImage::from_parts(
            vec![0; 4],
            crate::template::PNG_MIME,
            100,
            80,
        ))
    }

    fn names(list: &[&str]) -> NameList {
        list.iter().map(|name| name.to_string()).collect()
    }

    async fn collect_events(mut handle: BatchHandle) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn publishes_snapshot_then_forward_transitions() {
        let runner = BatchRunner::new(StubRenderer::default());
        let handle = runner
            .start(template(), &names(&["Ali", "Sara", "Ali"]), &PlacementConfig::default())
            .expect("start");
        let events = collect_events(handle).await;

        let BatchEvent::Started { items } = &events[0] else {
            panic!("first event must be the snapshot");
        };
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| item.status() == &CardStatus::Pending));
        assert_eq!(items[2].id(), "card-2");

        let updates: Vec<(usize, CardStatus)> = events
            .iter()
            .filter_map(|event| match event {
                BatchEvent::Updated { index, item } => Some((*index, item.status().clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            updates,
            vec![
                (0, CardStatus::Generating),
                (0, CardStatus::Done),
                (1, CardStatus::Generating),
                (1, CardStatus::Done),
                (2, CardStatus::Generating),
                (2, CardStatus::Done),
            ]
        );

        let Some(BatchEvent::Finished { summary }) = events.last() else {
            panic!("last event must be the summary");
        };
        assert_eq!(summary.done, 3);
        assert_eq!(summary.total, 3);
    }

    #[tokio::test]
    async fn failures_are_recorded_and_batch_continues() {
        let runner = BatchRunner::new(StubRenderer {
            fail_on: Some("Bad"),
            ..Default::default()
        });
        let handle = runner
            .start(template(), &names(&["A", "Bad", "C"]), &PlacementConfig::default())
            .expect("start");
        let items = handle.wait().await.expect("wait");

        assert_eq!(items[0].status(), &CardStatus::Done);
        assert!(matches!(items[1].status(), CardStatus::Failed { reason } if reason.contains("surface")));
        assert!(items[1].image().is_none());
        assert_eq!(items[2].status(), &CardStatus::Done);
        assert_eq!(items[2].image().map(|card| card.png()), Some(&b"C"[..]));
    }

    #[tokio::test]
    async fn slow_cards_time_out() {
        let runner = BatchRunner::new(StubRenderer {
            slow_on: Some("Slow"),
            ..Default::default()
        })
        .with_timeout(Some(Duration::from_millis(50)));
        let handle = runner
            .start(template(), &names(&["Slow", "Fast"]), &PlacementConfig::default())
            .expect("start");
        let items = handle.wait().await.expect("wait");

        assert!(matches!(items[0].status(), CardStatus::Failed { reason } if reason.contains("timed out")));
        assert_eq!(items[1].status(), &CardStatus::Done);
    }

    #[tokio::test]
    async fn timed_out_renders_still_run_one_at_a_time() {
        let runner = BatchRunner::new(StubRenderer {
            slow_all: true,
            ..Default::default()
        })
        .with_timeout(Some(Duration::from_millis(20)));
        let handle = runner
            .start(template(), &names(&["A", "B", "C"]), &PlacementConfig::default())
            .expect("start");
        let items = handle.wait().await.expect("wait");

        assert!(items.iter().all(
            |item| matches!(item.status(), CardStatus::Failed { reason } if reason.contains("timed out"))
        ));
        assert_eq!(runner.renderer().max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(runner.renderer().in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn starting_outside_a_runtime_is_an_error() {
        let runner = BatchRunner::new(StubRenderer::default());
        let err = runner
            .start(template(), &names(&["A"]), &PlacementConfig::default())
            .err()
            .expect("error");
        assert!(matches!(err, CardError::RuntimeUnavailable(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_card() {
        let cancel = CancelToken::new();
        let runner = BatchRunner::new(StubRenderer {
            cancel_on: Some(("B", cancel.clone())),
            ..Default::default()
        });
        let handle = runner
            .start_with_cancel(
                template(),
                &names(&["A", "B", "C", "D"]),
                &PlacementConfig::default(),
                cancel,
            )
            .expect("start");

        let mut state = BatchState::default();
        let mut stream = Box::pin(handle.into_stream());
        while let Some(event) = stream.next().await {
            state.apply(&event);
        }

        let statuses: Vec<&CardStatus> = state.items().iter().map(CardItem::status).collect();
        assert_eq!(
            statuses,
            vec![
                &CardStatus::Done,
                &CardStatus::Done,
                &CardStatus::Cancelled,
                &CardStatus::Cancelled
            ]
        );
        assert!(state.items().iter().all(|item| item.status().is_terminal()));
        assert_eq!(
            state.summary(),
            Some(BatchSummary {
                total: 4,
                done: 2,
                failed: 0,
                cancelled: 2
            })
        );
    }

    #[tokio::test]
    async fn renders_one_card_at_a_time() {
        let runner = BatchRunner::new(StubRenderer::default());
        let list = names(&["A", "B", "C", "D", "E", "F"]);
        let handle = runner
            .start(template(), &list, &PlacementConfig::default())
            .expect("start");
        handle.wait().await.expect("wait");
        assert_eq!(runner.renderer().max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_name_list_is_rejected() {
        let runner = BatchRunner::new(StubRenderer::default());
        let err = runner
            .start(template(), &NameList::new(), &PlacementConfig::default())
            .err()
            .expect("error");
        assert_eq!(err, CardError::EmptyInput("the name list is empty"));
    }

    #[tokio::test]
    async fn state_tracks_progress() {
        let runner = BatchRunner::new(StubRenderer {
            fail_on: Some("B"),
            ..Default::default()
        });
        let mut handle = runner
            .start(template(), &names(&["A", "B", "C"]), &PlacementConfig::default())
            .expect("start");
        let mut state = BatchState::default();
        while let Some(event) = handle.next_event().await {
            state.apply(&event);
        }
        assert!(state.is_complete());
        assert_eq!(state.len(), 3);
        assert_eq!(state.done_count(), 2);
        let summary = state.summary().expect("summary");
        assert_eq!(summary.done, summary.total - summary.failed);
    }

    #[test]
    fn items_serialize_flat_status() {
        let mut item = CardItem::pending(0, "Ali");
        assert!(item.begin());
        item.fail(&CardError::RenderFailed("boom".to_string()));
        let json = serde_json::to_value(&item).expect("json");
        assert_eq!(json["id"], "card-0");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "rendering failed: boom");
    }

    #[test]
    fn transitions_never_go_backwards() {
        let mut item = CardItem::pending(0, "Ali");
        assert!(!item.complete(RenderedCard::new(Vec::new(), 1, 1)));
        assert!(item.begin());
        assert!(!item.begin());
        assert!(!item.cancel());
        assert!(item.complete(RenderedCard::new(Vec::new(), 1, 1)));
        assert!(!item.fail(&CardError::RenderFailed("late".to_string())));
        assert_eq!(item.status(), &CardStatus::Done);
    }
}
