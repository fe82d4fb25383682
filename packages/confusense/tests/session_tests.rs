mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{furrowed_face, neutral_face, CountingProvider};
use confusense::rephrase::{EventType, RephraseDispatcher, TextProvider, NO_KEY_MESSAGE};
use confusense::session::{CaptureSession, SessionError};
use confusense::source::{FrameQueue, LandmarkSource, SourceError};
use confusense::store::{load_baseline, KeyValueStore, MemoryStore};
use confusense::ConfusionEngine;
use confusion_core::{CalibrationPhase, Landmarks, StepOutcome};
use tokio::sync::watch;

/// Source that always returns whatever face the test last installed.
struct LiveFace(watch::Receiver<Option<Landmarks>>);

#[async_trait]
impl LandmarkSource for LiveFace {
    async fn detect(&mut self) -> Result<Option<Landmarks>, SourceError> {
        Ok(self.0.borrow().clone())
    }
}

fn engine() -> ConfusionEngine {
    ConfusionEngine::new(Arc::new(MemoryStore::new()))
}

fn counting_dispatcher(reply: &str) -> (RephraseDispatcher, Arc<CountingProvider>) {
    let provider = Arc::new(CountingProvider::new(reply));
    let dispatcher = RephraseDispatcher::new(vec![provider.clone() as Arc<dyn TextProvider>]);
    (dispatcher, provider)
}

fn confusion_script() -> FrameQueue {
    let mut frames: Vec<Option<Landmarks>> = vec![Some(neutral_face()); 6];
    frames.extend(std::iter::repeat(Some(furrowed_face())).take(20));
    FrameQueue::new(frames)
}

#[tokio::test(start_paused = true)]
async fn sustained_confusion_dispatches_once() {
    let (dispatcher, provider) = counting_dispatcher("Think of it like a recipe.");
    let session = CaptureSession::new(engine(), confusion_script(), dispatcher)
        .with_content("An algorithm is a finite sequence of instructions.");
    let (handle, mut events, task) = session.spawn();

    task.await.unwrap().unwrap();
    drop(handle);

    let suggestion = events.suggestions.recv().await.expect("one suggestion");
    assert_eq!(suggestion.text, "Think of it like a recipe.");
    assert_eq!(suggestion.request.event_type, EventType::FacialConfusion);
    assert_eq!(
        suggestion.request.content,
        "An algorithm is a finite sequence of instructions."
    );
    assert!(suggestion.request.confusion_level.unwrap() > 0.42);
    assert!(suggestion.to_string().starts_with("AI ("));

    assert!(events.suggestions.recv().await.is_none());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn clear_face_never_dispatches() {
    let (dispatcher, provider) = counting_dispatcher("unused");
    let source = FrameQueue::new(vec![Some(neutral_face()); 30]);
    let (handle, mut events, task) = CaptureSession::new(engine(), source, dispatcher).spawn();

    task.await.unwrap().unwrap();
    drop(handle);
    assert!(events.suggestions.recv().await.is_none());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_source_leaves_state_clear() {
    let (dispatcher, _) = counting_dispatcher("unused");
    let mut frames = vec![Some(furrowed_face()); 20];
    frames.push(None);
    let (handle, events, task) =
        CaptureSession::new(engine(), FrameQueue::new(frames), dispatcher).spawn();

    let engine = task.await.unwrap().unwrap();
    drop(handle);
    let snapshot = *events.state.borrow();
    assert_eq!(snapshot.state.level, 0.0);
    assert!(!snapshot.state.confused);
    assert!(!engine.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn calibration_through_handle_persists_baseline() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let (face_tx, face_rx) = watch::channel(Some(neutral_face()));
    let (dispatcher, _) = counting_dispatcher("unused");
    let session = CaptureSession::new(
        ConfusionEngine::new(Arc::clone(&store)),
        LiveFace(face_rx),
        dispatcher,
    );
    let (handle, events, task) = session.spawn();

    assert_eq!(
        handle.start_calibration().await.unwrap(),
        CalibrationPhase::CollectingNeutral
    );
    assert!(matches!(
        handle.complete_calibration_step().await.unwrap(),
        StepOutcome::Insufficient { .. }
    ));

    tokio::time::sleep(Duration::from_millis(3_000)).await;
    match handle.complete_calibration_step().await.unwrap() {
        StepOutcome::NeutralRecorded { neutral } => assert_eq!(neutral, 0.0),
        other => panic!("unexpected outcome: {other:?}"),
    }

    face_tx.send_replace(Some(furrowed_face()));
    tokio::time::sleep(Duration::from_millis(3_000)).await;
    let baseline = match handle.complete_calibration_step().await.unwrap() {
        StepOutcome::Completed(baseline) => baseline,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert!((baseline.confused - 0.65).abs() < 1e-9);
    assert_eq!(events.state.borrow().calibration, CalibrationPhase::Complete);
    assert_eq!(load_baseline(store.as_ref()), Some(baseline));

    handle.reset_calibration().await.unwrap();
    assert!(load_baseline(store.as_ref()).is_none());

    handle.stop().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_ends_session_and_closes_handle() {
    let (_face_tx, face_rx) = watch::channel(Some(furrowed_face()));
    let (dispatcher, _) = counting_dispatcher("unused");
    let (handle, events, task) = CaptureSession::new(engine(), LiveFace(face_rx), dispatcher).spawn();

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(events.state.borrow().state.level > 0.0);

    handle.stop().await.unwrap();
    let engine = task.await.unwrap().unwrap();
    assert_eq!(engine.state().level, 0.0);
    assert_eq!(events.state.borrow().state.level, 0.0);
    assert!(matches!(handle.start_calibration().await, Err(SessionError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn selection_is_explained_with_its_own_prompt() {
    let (_face_tx, face_rx) = watch::channel(None);
    let (dispatcher, provider) = counting_dispatcher("It means where names are looked up.");
    let (handle, mut events, task) = CaptureSession::new(engine(), LiveFace(face_rx), dispatcher).spawn();

    handle.rephrase_selection("   ").await.unwrap();
    handle.rephrase_selection("scope chain").await.unwrap();
    let suggestion = events.suggestions.recv().await.unwrap();
    assert_eq!(suggestion.request.event_type, EventType::TextSelection);
    assert_eq!(provider.calls(), 1);
    assert!(provider.prompts.lock()[0].ends_with("Please explain this part in simpler terms: scope chain"));

    handle.stop().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn no_provider_yields_no_key_message() {
    let (handle, mut events, task) =
        CaptureSession::new(engine(), confusion_script(), RephraseDispatcher::new(Vec::new())).spawn();

    task.await.unwrap().unwrap();
    drop(handle);
    let suggestion = events.suggestions.recv().await.unwrap();
    assert_eq!(suggestion.text, NO_KEY_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn zero_tick_is_raised_to_one_millisecond() {
    let (dispatcher, _) = counting_dispatcher("unused");
    let source = FrameQueue::new(vec![Some(neutral_face()); 5]);
    let (handle, _events, task) = CaptureSession::new(engine(), source, dispatcher)
        .with_tick(Duration::ZERO)
        .spawn();

    let engine = task.await.unwrap().unwrap();
    drop(handle);
    assert!(!engine.is_capturing());
}
