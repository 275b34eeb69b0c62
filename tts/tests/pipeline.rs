use anyhow::anyhow;
use async_trait::async_trait;
use futures::stream;
use lingproc::ChatStream;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tts::{
    AudioClip, AudioDevice, DeviceError, PipelineConfig, PipelineError, PlayOutcome,
    SpeechPipeline, StopSignal, SynthesisError, Synthesizer, VoiceParams, Waveform,
};

/// Synthesizer whose latency depends on the sentence.
struct Scripted;

#[async_trait]
impl Synthesizer for Scripted {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceParams,
    ) -> Result<Waveform, SynthesisError> {
        let delay = if text.starts_with("First") {
            300
        } else if text.starts_with("Second") {
            50
        } else if text.starts_with("Third") {
            150
        } else {
            10
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        if text.starts_with("Broken") {
            return Err(SynthesisError::Engine("voice model crashed".into()));
        }
        Ok(Waveform::new(vec![0.1; 160], 16_000))
    }
}

type PlayLog = Arc<Mutex<Vec<(u64, u64)>>>;

/// Records finished clips, holding each one for `hold` unless stopped.
struct Recorder {
    log: PlayLog,
    hold: Duration,
    fail_on: Option<u64>,
}

impl AudioDevice for Recorder {
    fn play(&mut self, clip: &AudioClip, stop: &StopSignal) -> Result<PlayOutcome, DeviceError> {
        if self.fail_on == Some(clip.sequence) {
            return Err(DeviceError::Playback("speaker popped".into()));
        }
        let deadline = Instant::now() + self.hold;
        while Instant::now() < deadline {
            if stop.is_raised() {
                return Ok(PlayOutcome::Interrupted);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.log.lock().push((clip.turn, clip.sequence));
        Ok(PlayOutcome::Completed)
    }
}

fn pipeline(hold: Duration, fail_on: Option<u64>) -> (SpeechPipeline, PlayLog) {
    let log = PlayLog::default();
    let device_log = log.clone();
    let pipeline = SpeechPipeline::new(
        PipelineConfig::default().with_workers(3),
        Arc::new(Scripted),
        move || {
            Ok(Box::new(Recorder {
                log: device_log,
                hold,
                fail_on,
            }) as Box<dyn AudioDevice>)
        },
    )
    .unwrap();
    (pipeline, log)
}

fn deltas(parts: &[&str]) -> ChatStream {
    let items: Vec<anyhow::Result<String>> = parts.iter().map(|p| Ok(p.to_string())).collect();
    Box::pin(stream::iter(items))
}

#[tokio::test]
async fn clips_play_in_sequence_order_despite_latency() {
    let (mut pipeline, log) = pipeline(Duration::ZERO, None);
    let report = pipeline
        .speak_stream(
            deltas(&["First", " sentence.", " Second one.", " Third", " here."]),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert_eq!(*log.lock(), vec![(1, 0), (1, 1), (1, 2)]);
    assert_eq!(report.turn, 1);
    assert_eq!(report.tally.ready, 3);
    assert_eq!(report.played, 3);
    assert!(!report.cancelled);
    assert_eq!(
        pipeline.transcript(),
        "First sentence. Second one. Third here."
    );
    pipeline.shutdown().await;
}

#[tokio::test]
async fn residual_text_is_spoken_at_end_of_stream() {
    let (mut pipeline, log) = pipeline(Duration::ZERO, None);
    let report = pipeline
        .speak_stream(deltas(&["Thanks", " for"]), std::future::pending())
        .await
        .unwrap();
    assert_eq!(report.played, 1);
    assert_eq!(*log.lock(), vec![(1, 0)]);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn interrupt_cancels_the_turn_and_numbering_restarts() {
    let (mut pipeline, log) = pipeline(Duration::from_millis(400), None);
    let endless: ChatStream = Box::pin(futures::StreamExt::chain(
        stream::iter(vec![
            Ok::<_, anyhow::Error>("Hello there. ".to_string()),
            Ok("How are you? ".to_string()),
        ]),
        stream::pending(),
    ));
    let err = pipeline
        .speak_stream(endless, tokio::time::sleep(Duration::from_millis(150)))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Interrupted));
    assert_eq!(pipeline.transcript(), "Hello there. How are you? ");

    // Late deltas for the cancelled turn go nowhere.
    pipeline.feed("Too late.");

    let next = pipeline.speak("Next turn.").await.unwrap();
    assert_eq!(next.turn, 2);
    assert_eq!(next.played, 1);
    assert_eq!(*log.lock(), vec![(2, 0)]);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn upstream_error_cancels_the_turn() {
    let (mut pipeline, log) = pipeline(Duration::from_millis(200), None);
    let failing: ChatStream = Box::pin(stream::iter(vec![
        Ok("Hello there. ".to_string()),
        Err(anyhow!("connection reset")),
    ]));
    let err = pipeline
        .speak_stream(failing, std::future::pending())
        .await
        .unwrap_err();
    match err {
        PipelineError::Upstream(msg) => assert!(msg.contains("connection reset")),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(log.lock().is_empty());
    assert_eq!(pipeline.transcript(), "Hello there. ");
    pipeline.shutdown().await;
}

#[tokio::test]
async fn skipped_and_failed_segments_do_not_stall() {
    let (mut pipeline, log) = pipeline(Duration::ZERO, None);
    pipeline.begin_turn();
    pipeline.feed("(laughs)\n");
    pipeline.feed("Broken sentence.");
    pipeline.feed(" Fine words.");
    let report = pipeline.finish_turn().await.unwrap();
    assert_eq!(report.tally.skipped, 1);
    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.tally.ready, 1);
    assert_eq!(*log.lock(), vec![(1, 2)]);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn device_error_abandons_only_that_clip() {
    let (mut pipeline, log) = pipeline(Duration::ZERO, Some(0));
    let report = pipeline
        .speak_stream(
            deltas(&["Second try.", " Third time lucky."]),
            std::future::pending(),
        )
        .await
        .unwrap();
    assert_eq!(report.device_errors, 1);
    assert_eq!(report.played, 1);
    assert_eq!(*log.lock(), vec![(1, 1)]);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn finishing_without_a_turn_is_an_error() {
    let (mut pipeline, _log) = pipeline(Duration::ZERO, None);
    assert!(matches!(
        pipeline.finish_turn().await,
        Err(PipelineError::NoTurn)
    ));
    pipeline.shutdown().await;
}

#[test]
#[should_panic]
fn feeding_a_sentence_outside_a_runtime_panics() {
    let (mut pipeline, _log) = pipeline(Duration::ZERO, None);
    pipeline.begin_turn();
    pipeline.feed("Hello there.\n");
}

#[test]
fn feeding_without_a_turn_needs_no_runtime() {
    let (mut pipeline, log) = pipeline(Duration::ZERO, None);
    pipeline.feed("Nobody is listening.\n");
    assert!(log.lock().is_empty());
}
