//! End-to-end dispatch over an [`InMemoryBus`] with real workers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use imgpool_bus::InMemoryBus;
use imgpool_core::{
    GeneratedImage, GenerationError, ImageGenerator, JobRequest, ProgressReporter,
    ResultEnvelope, WorkerId,
};
use imgpool_requester::output::ImageSaver;
use imgpool_requester::prompt::Prompter;
use imgpool_requester::{
    Coordinator, DispatchError, DispatchMode, DispatchOptions, JobDefaults, Notification,
    SelectionStrategy, Session, SessionError,
};
use imgpool_worker::{SyntheticGenerator, Worker};
use tokio::io::BufReader;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test generators
// ---------------------------------------------------------------------------

struct FailingGenerator;

#[async_trait]
impl ImageGenerator for FailingGenerator {
    async fn generate(
        &self,
        _request: &JobRequest,
        _progress: ProgressReporter,
    ) -> Result<GeneratedImage, GenerationError> {
        Err(GenerationError::Failed("model weights missing".into()))
    }
}

/// Reports 25, 50 and 75 percent, then succeeds.
struct ThreeStepGenerator;

#[async_trait]
impl ImageGenerator for ThreeStepGenerator {
    async fn generate(
        &self,
        _request: &JobRequest,
        progress: ProgressReporter,
    ) -> Result<GeneratedImage, GenerationError> {
        for percent in [25.0, 50.0, 75.0] {
            progress.report(percent);
            tokio::task::yield_now().await;
        }
        Ok(GeneratedImage {
            bytes: b"\x89PNG done".to_vec(),
            mimetype: "image/png".into(),
        })
    }
}

/// Reports every sixteenth of the way, then succeeds.
struct SixteenStepGenerator;

#[async_trait]
impl ImageGenerator for SixteenStepGenerator {
    async fn generate(
        &self,
        _request: &JobRequest,
        progress: ProgressReporter,
    ) -> Result<GeneratedImage, GenerationError> {
        for step in 1..=16 {
            progress.report(f64::from(step) * 100.0 / 16.0);
        }
        Ok(GeneratedImage {
            bytes: b"\x89PNG done".to_vec(),
            mimetype: "image/png".into(),
        })
    }
}

/// Holds every job until the test releases it.
struct GatedGenerator {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl ImageGenerator for GatedGenerator {
    async fn generate(
        &self,
        _request: &JobRequest,
        _progress: ProgressReporter,
    ) -> Result<GeneratedImage, GenerationError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| GenerationError::Backend(e.to_string()))?;
        permit.forget();
        Ok(GeneratedImage {
            bytes: b"gated".to_vec(),
            mimetype: "image/png".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start_worker(
    bus: &InMemoryBus,
    id: &str,
    generator: Arc<dyn ImageGenerator>,
) -> CancellationToken {
    let before = bus.subscription_count();
    let worker = Worker::new(Arc::new(bus.clone()), WorkerId::new(id), generator);
    let cancel = CancellationToken::new();
    tokio::spawn(worker.run(cancel.clone()));
    while bus.subscription_count() < before + 4 {
        tokio::task::yield_now().await;
    }
    cancel
}

fn synthetic() -> Arc<dyn ImageGenerator> {
    Arc::new(SyntheticGenerator::new(Duration::ZERO))
}

fn options() -> DispatchOptions {
    DispatchOptions {
        solicit_timeout: Duration::from_millis(200),
        max_solicit_attempts: 3,
        result_timeout: Some(Duration::from_secs(5)),
        ..DispatchOptions::default()
    }
}

fn coordinator(bus: &InMemoryBus, options: DispatchOptions) -> Coordinator {
    Coordinator::new(Arc::new(bus.clone()), options)
}

fn cat() -> JobRequest {
    JobRequest::new("cat", 128, 128, 4, Some(42)).unwrap()
}

/// Dispatch and collect the notifications seen on the way.
async fn dispatch(
    coordinator: &Coordinator,
    job: &JobRequest,
) -> (Result<ResultEnvelope, DispatchError>, Vec<Notification>) {
    let mut seen = Vec::new();
    let result = coordinator.dispatch(job, |n| seen.push(n)).await;
    (result, seen)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idle_worker_produces_png() {
    let bus = InMemoryBus::new();
    let _w = start_worker(&bus, "w1", synthetic()).await;
    let subscriptions = bus.subscription_count();

    let (result, seen) = dispatch(&coordinator(&bus, options()), &cat()).await;

    assert_matches!(result, Ok(ResultEnvelope::Success { payload, mimetype }) => {
        assert_eq!(mimetype, "image/png");
        assert!(payload.starts_with(&[0x89, b'P', b'N', b'G']));
    });
    assert!(seen.contains(&Notification::Assigned(WorkerId::new("w1"))));
    // Correlation subscriptions are gone once the result is in.
    assert_eq!(bus.subscription_count(), subscriptions);
}

#[tokio::test]
async fn busy_worker_declines_and_dispatch_gives_up() {
    let bus = InMemoryBus::new();
    let gate = Arc::new(Semaphore::new(0));
    let _w = start_worker(&bus, "w1", Arc::new(GatedGenerator { gate: gate.clone() })).await;

    // Occupy the only worker.
    let busy_bus = bus.clone();
    let first = tokio::spawn(async move {
        let coordinator = coordinator(&busy_bus, options());
        coordinator.dispatch(&cat(), |_| {}).await
    });
    let second = coordinator(&bus, options());
    while second.acquire_worker().await.is_ok() {
        tokio::task::yield_now().await;
    }

    let (result, _) = dispatch(&second, &cat()).await;
    assert_matches!(result, Err(DispatchError::NoWillingWorker { attempts: 3 }));

    gate.add_permits(1);
    assert_matches!(first.await.unwrap(), Ok(ResultEnvelope::Success { .. }));
}

#[tokio::test]
async fn session_reprompts_small_width_and_saves_image() {
    let bus = InMemoryBus::new();
    let _w = start_worker(&bus, "w1", synthetic()).await;
    let dir = std::env::temp_dir().join(format!("imgpool-session-{}", std::process::id()));

    let input: &[u8] = b"cat\n10\n\n\n\n";
    let prompter = Prompter::new(BufReader::new(input), Vec::new());
    let mut session = Session::new(
        coordinator(&bus, options()),
        prompter,
        ImageSaver::new(&dir),
        JobDefaults {
            num_steps: 2,
            seed: Some(42),
        },
    );
    session.run().await.unwrap();

    let shown = String::from_utf8(session.prompter().out().clone()).unwrap();
    assert!(shown.contains("width must be at least 32"));
    assert!(shown.contains("Worker w1 accepted the job"));
    assert!(shown.contains("Image saved to"));

    let image = image_dimensions(&dir.join("image.png"));
    assert_eq!(image, (128, 128));
    let _ = std::fs::remove_dir_all(&dir);
}

/// Terminal output that breaks as soon as a progress line is written.
#[derive(Default)]
struct ProgressRejectingOutput(Vec<u8>);

impl std::io::Write for ProgressRejectingOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if buf.starts_with(b"Progress") {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "terminal closed"));
        }
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn session_surfaces_failed_progress_write() {
    let bus = InMemoryBus::new();
    let _w = start_worker(&bus, "w1", Arc::new(ThreeStepGenerator)).await;
    let dir = std::env::temp_dir().join(format!("imgpool-broken-{}", std::process::id()));

    let input: &[u8] = b"cat\n10\n\n\n\n";
    let prompter = Prompter::new(BufReader::new(input), ProgressRejectingOutput::default());
    let mut session = Session::new(
        coordinator(&bus, options()),
        prompter,
        ImageSaver::new(&dir),
        JobDefaults {
            num_steps: 3,
            seed: Some(42),
        },
    );

    assert_matches!(
        session.run().await,
        Err(SessionError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe
    );
    // The job itself still completed before the error was returned.
    let shown = String::from_utf8(session.prompter().out().0.clone()).unwrap();
    assert!(shown.contains("Worker w1 accepted the job"));
    assert!(shown.contains("Image saved to"));
    let _ = std::fs::remove_dir_all(&dir);
}

fn image_dimensions(path: &std::path::Path) -> (u32, u32) {
    let bytes = std::fs::read(path).unwrap();
    // IHDR width and height follow the 8-byte signature and 8-byte chunk header.
    let width = u32::from_be_bytes(bytes[16..20].try_into().unwrap());
    let height = u32::from_be_bytes(bytes[20..24].try_into().unwrap());
    (width, height)
}

#[tokio::test]
async fn generation_failure_is_returned_and_worker_keeps_serving() {
    let bus = InMemoryBus::new();
    let _w = start_worker(&bus, "w1", Arc::new(FailingGenerator)).await;
    let coordinator = coordinator(&bus, options());

    let (result, _) = dispatch(&coordinator, &cat()).await;
    assert_eq!(result.unwrap(), ResultEnvelope::failure("model weights missing"));

    assert_eq!(coordinator.acquire_worker().await.unwrap(), WorkerId::new("w1"));
    let (again, _) = dispatch(&coordinator, &cat()).await;
    assert_matches!(again, Ok(ResultEnvelope::Failure { .. }));
}

#[tokio::test]
async fn progress_is_surfaced_before_the_result() {
    let bus = InMemoryBus::new();
    let _w = start_worker(&bus, "w1", Arc::new(ThreeStepGenerator)).await;

    let (result, seen) = dispatch(&coordinator(&bus, options()), &cat()).await;
    assert_matches!(result, Ok(ResultEnvelope::Success { .. }));

    let mut percents: Vec<f64> = seen
        .iter()
        .filter_map(|n| match n {
            Notification::Progress(p) => Some(p.percent()),
            Notification::Assigned(_) => None,
        })
        .collect();
    percents.sort_by(f64::total_cmp);
    assert_eq!(percents, vec![25.0, 50.0, 75.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn result_never_overtakes_progress_under_load() {
    let bus = InMemoryBus::new();
    let _w = start_worker(&bus, "w1", Arc::new(SixteenStepGenerator)).await;
    let coordinator = coordinator(&bus, options());
    let expected: Vec<f64> = (1..=16).map(|step| f64::from(step) * 100.0 / 16.0).collect();

    for round in 0..300 {
        let (result, seen) = dispatch(&coordinator, &cat()).await;
        assert_matches!(result, Ok(ResultEnvelope::Success { .. }), "round {round}");

        let percents: Vec<f64> = seen
            .iter()
            .filter_map(|n| match n {
                Notification::Progress(p) => Some(p.percent()),
                Notification::Assigned(_) => None,
            })
            .collect();
        assert_eq!(percents, expected, "round {round}");
    }
}

// ---------------------------------------------------------------------------
// Selection and modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_selection_skips_busy_worker() {
    let bus = InMemoryBus::new();
    let gate = Arc::new(Semaphore::new(0));
    let _busy = start_worker(&bus, "busy", Arc::new(GatedGenerator { gate: gate.clone() })).await;

    // Put "busy" to work before the second worker joins.
    let busy_bus = bus.clone();
    let first = tokio::spawn(async move {
        coordinator(&busy_bus, options()).dispatch(&cat(), |_| {}).await
    });
    let poll = coordinator(&bus, options());
    while poll.acquire_worker().await.is_ok() {
        tokio::task::yield_now().await;
    }
    let _idle = start_worker(&bus, "idle", synthetic()).await;

    let broadcast = coordinator(
        &bus,
        DispatchOptions {
            selection: SelectionStrategy::Broadcast,
            ..options()
        },
    );
    let (result, seen) = dispatch(&broadcast, &cat()).await;
    assert_matches!(result, Ok(ResultEnvelope::Success { .. }));
    assert!(seen.contains(&Notification::Assigned(WorkerId::new("idle"))));

    gate.add_permits(1);
    first.await.unwrap().unwrap();
}

#[tokio::test]
async fn broadcast_hands_job_to_exactly_one_worker() {
    let bus = InMemoryBus::new();
    let _a = start_worker(&bus, "a", synthetic()).await;
    let _b = start_worker(&bus, "b", synthetic()).await;

    let broadcast = coordinator(
        &bus,
        DispatchOptions {
            selection: SelectionStrategy::Broadcast,
            ..options()
        },
    );
    let (result, seen) = dispatch(&broadcast, &cat()).await;
    assert_matches!(result, Ok(ResultEnvelope::Success { .. }));
    let assigned = seen
        .iter()
        .filter(|n| matches!(n, Notification::Assigned(_)))
        .count();
    assert_eq!(assigned, 1);
}

#[tokio::test]
async fn blacklisted_worker_is_never_chosen() {
    let bus = InMemoryBus::new();
    let _bad = start_worker(&bus, "bad", synthetic()).await;
    let _good = start_worker(&bus, "good", synthetic()).await;

    let coordinator = coordinator(
        &bus,
        DispatchOptions {
            blacklist: HashSet::from([WorkerId::new("bad")]),
            ..options()
        },
    );
    for _ in 0..3 {
        let (result, seen) = dispatch(&coordinator, &cat()).await;
        assert_matches!(result, Ok(ResultEnvelope::Success { .. }));
        assert!(seen.contains(&Notification::Assigned(WorkerId::new("good"))));
    }
}

#[tokio::test]
async fn direct_mode_reaches_worker_and_busy_worker_rejects() {
    let bus = InMemoryBus::new();
    let gate = Arc::new(Semaphore::new(0));
    let _w = start_worker(&bus, "w1", Arc::new(GatedGenerator { gate: gate.clone() })).await;
    let direct = DispatchOptions {
        mode: DispatchMode::Direct,
        ..options()
    };

    let first_seen = Arc::new(Mutex::new(Vec::new()));
    let first = {
        let bus = bus.clone();
        let direct = direct.clone();
        let first_seen = first_seen.clone();
        tokio::spawn(async move {
            let coordinator = coordinator(&bus, direct);
            coordinator
                .dispatch(&cat(), |n| first_seen.lock().unwrap().push(n))
                .await
        })
    };
    while first_seen.lock().unwrap().is_empty() {
        tokio::task::yield_now().await;
    }

    let (second, _) = dispatch(&coordinator(&bus, direct), &cat()).await;
    assert_eq!(second.unwrap(), ResultEnvelope::failure("worker w1 is busy"));

    gate.add_permits(1);
    assert_matches!(first.await.unwrap(), Ok(ResultEnvelope::Success { .. }));
}

#[tokio::test]
async fn missing_result_times_out() {
    let bus = InMemoryBus::new();
    let coordinator = coordinator(
        &bus,
        DispatchOptions {
            mode: DispatchMode::Direct,
            result_timeout: Some(Duration::from_millis(50)),
            ..options()
        },
    );

    let (result, _) = dispatch(&coordinator, &cat()).await;
    assert_matches!(result, Err(DispatchError::ResultTimeout(_)));
    assert_eq!(bus.subscription_count(), 0);
}

#[tokio::test]
async fn invalid_request_is_never_sent() {
    let bus = InMemoryBus::new();
    let coordinator = coordinator(&bus, options());
    let mut job = cat();
    job.width = 10;

    let (result, _) = dispatch(&coordinator, &job).await;
    assert_matches!(result, Err(DispatchError::InvalidRequest(_)));
}
