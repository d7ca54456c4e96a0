use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{Config, DispatchConfig};
use crate::engine::{CliEngineFactory, EngineFactory, OcrEngine};
use crate::error::{OcradError, Result};
use crate::models::Recognition;
use crate::options::{validate, EnginePlan, RecognitionOptions};
use crate::raster::{normalize, ImageInput};
use crate::report::{format_output, LineCallback};
use crate::session::run_session;

/// One recognition request, built from one of the supported call shapes.
pub struct Invocation {
    image: ImageInput,
    options: RecognitionOptions,
    line_callback: Option<LineCallback>,
}

impl Invocation {
    /// Plain text with default options.
    pub fn new(image: impl Into<ImageInput>) -> Self {
        Self::with_options(image, RecognitionOptions::default())
    }

    pub fn inverted(image: impl Into<ImageInput>, invert: bool) -> Self {
        Self::with_options(
            image,
            RecognitionOptions {
                invert,
                ..Default::default()
            },
        )
    }

    /// Every line of the engine's raw report goes to `callback`; the raw
    /// report is the result.
    pub fn with_line_callback<F>(image: impl Into<ImageInput>, invert: bool, callback: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        let mut invocation = Self::inverted(image, invert);
        invocation.line_callback = Some(Box::new(callback));
        invocation
    }

    pub fn with_options(image: impl Into<ImageInput>, options: RecognitionOptions) -> Self {
        Self {
            image: image.into(),
            options,
            line_callback: None,
        }
    }

    pub fn options(&self) -> &RecognitionOptions {
        &self.options
    }

    /// Normalize the raster and validate the options. No engine is touched.
    fn prepare(self) -> Result<Job> {
        let options = self.options.normalized(self.line_callback.is_some());
        let plan = validate(&options)?;
        let raster = normalize(self.image)?;
        Ok(Job {
            raster,
            plan,
            verbose: options.verbose,
            line_callback: self.line_callback,
        })
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("options", &self.options)
            .field("line_callback", &self.line_callback.is_some())
            .finish_non_exhaustive()
    }
}

/// Everything a lane needs to run the pipeline; the single request message
/// of the isolated lane.
struct Job {
    raster: Vec<u8>,
    plan: EnginePlan,
    verbose: bool,
    line_callback: Option<LineCallback>,
}

impl Job {
    fn run(mut self, engine: &mut dyn OcrEngine) -> Result<Recognition> {
        let raw = run_session(engine, &self.raster, &self.plan)?;
        format_output(raw, self.verbose, self.line_callback.as_mut())
    }
}

type WorkerResponse = Result<Recognition>;

#[derive(Clone)]
enum WorkerLane {
    Isolated { runtime: Handle },
    Unavailable { reason: String },
}

impl WorkerLane {
    fn select(config: &DispatchConfig) -> Self {
        if !config.isolated_workers {
            let reason = "isolated workers disabled by OCRAD_ISOLATED_WORKERS".to_string();
            info!("{}; callback calls run in-process", reason);
            return WorkerLane::Unavailable { reason };
        }

        match Handle::try_current() {
            Ok(runtime) => {
                info!("Isolated worker lane enabled");
                WorkerLane::Isolated { runtime }
            }
            Err(e) => {
                let reason = format!("no async runtime: {e}");
                warn!("Isolated worker lane unavailable ({}); callback calls run in-process", reason);
                WorkerLane::Unavailable { reason }
            }
        }
    }
}

/// Entry point for recognition.
///
/// Plain calls run on the caller's thread against a lazily created in-process
/// engine. Callback and async calls run on an isolated worker: a blocking task
/// with its own engine (and so its own staged files), created for that call
/// and torn down after its single response. When no worker lane is available
/// they run in-process and still report through the callback.
#[derive(Clone)]
pub struct Ocrad {
    factory: Arc<dyn EngineFactory>,
    shared: Arc<Mutex<Option<Box<dyn OcrEngine>>>>,
    lane: WorkerLane,
}

impl Ocrad {
    /// The worker lane is chosen here, once: it needs a tokio runtime on the
    /// constructing thread and `config.isolated_workers`.
    pub fn new(factory: impl EngineFactory + 'static, config: &DispatchConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            shared: Arc::new(Mutex::new(None)),
            lane: WorkerLane::select(config),
        }
    }

    /// Dispatcher over the `ocrad` executable.
    pub fn from_config(config: &Config) -> Self {
        Self::new(CliEngineFactory::new(config.engine.clone()), &config.dispatch)
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self.lane, WorkerLane::Isolated { .. })
    }

    /// Why the isolated lane is off, if it is.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.lane {
            WorkerLane::Isolated { .. } => None,
            WorkerLane::Unavailable { reason } => Some(reason),
        }
    }

    fn lock_shared(&self) -> MutexGuard<'_, Option<Box<dyn OcrEngine>>> {
        self.shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn shared_engine<'g>(
        &self,
        slot: &'g mut Option<Box<dyn OcrEngine>>,
    ) -> Result<&'g mut Box<dyn OcrEngine>> {
        if slot.is_none() {
            let engine = self.factory.create()?;
            info!("In-process engine initialized (version {})", engine.version());
            *slot = Some(engine);
        }
        slot.as_mut()
            .ok_or_else(|| OcradError::EngineUnavailable("in-process engine missing".to_string()))
    }

    /// Create the in-process engine now instead of on first use.
    pub fn preinit(&self) -> Result<()> {
        let mut slot = self.lock_shared();
        self.shared_engine(&mut slot)?;
        Ok(())
    }

    /// Direct access to the in-process engine's low-level operations.
    ///
    /// `f` runs with the in-process engine locked. Calling `recognize`,
    /// `preinit`, `with_engine` or `shutdown` on this handle (or a clone) from
    /// inside `f` deadlocks.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut dyn OcrEngine) -> R) -> Result<R> {
        let mut slot = self.lock_shared();
        let engine = self.shared_engine(&mut slot)?;
        Ok(f(engine.as_mut()))
    }

    /// Drop the in-process engine. Returns whether one existed; the next call
    /// that needs it creates a new one.
    pub fn shutdown(&self) -> bool {
        let engine = self.lock_shared().take();
        if engine.is_some() {
            info!("In-process engine shut down");
        }
        engine.is_some()
    }

    /// Run on the caller's thread and return the result.
    pub fn recognize(&self, invocation: Invocation) -> Result<Recognition> {
        let job = invocation.prepare()?;
        self.run_in_process(job)
    }

    /// Run on an isolated worker and deliver the result to `callback`,
    /// exactly once. Preparation errors are delivered the same way.
    pub fn recognize_with_callback<F>(&self, invocation: Invocation, callback: F)
    where
        F: FnOnce(Result<Recognition>) + Send + 'static,
    {
        let job = match invocation.prepare() {
            Ok(job) => job,
            Err(e) => return callback(Err(e)),
        };

        match &self.lane {
            WorkerLane::Isolated { runtime } => {
                self.spawn_worker(runtime, job, Reply::Callback(Box::new(callback)));
            }
            WorkerLane::Unavailable { .. } => {
                debug!("Running callback call in-process");
                callback(self.run_in_process(job));
            }
        }
    }

    /// Future form of [`Ocrad::recognize_with_callback`].
    ///
    /// Without a worker lane the run happens in-process: inside
    /// `block_in_place` on a multi-threaded runtime, and directly on the
    /// executor thread on a current-thread runtime, which it blocks until done.
    pub async fn recognize_async(&self, invocation: Invocation) -> Result<Recognition> {
        let job = invocation.prepare()?;

        match &self.lane {
            WorkerLane::Isolated { runtime } => {
                let (response_tx, response_rx) = oneshot::channel::<WorkerResponse>();
                self.spawn_worker(runtime, job, Reply::Channel(response_tx));
                response_rx.await.unwrap_or_else(|_| {
                    Err(OcradError::Worker(
                        "isolated worker exited without a response".to_string(),
                    ))
                })
            }
            WorkerLane::Unavailable { .. } => {
                debug!("Running async call in-process");
                let multi_thread = Handle::try_current()
                    .map(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
                    .unwrap_or(false);
                if multi_thread {
                    tokio::task::block_in_place(|| self.run_in_process(job))
                } else {
                    self.run_in_process(job)
                }
            }
        }
    }

    fn run_in_process(&self, job: Job) -> Result<Recognition> {
        let mut slot = self.lock_shared();
        let engine = self.shared_engine(&mut slot)?;
        job.run(engine.as_mut())
    }

    fn spawn_worker(&self, runtime: &Handle, job: Job, reply: Reply) {
        let (request_tx, request_rx) = oneshot::channel::<Job>();
        if request_tx.send(job).is_err() {
            warn!("Isolated worker request could not be queued");
        }

        let task = WorkerTask {
            factory: Arc::clone(&self.factory),
            request: request_rx,
            reply: Some(reply),
        };
        runtime.spawn_blocking(move || task.run());
    }
}

impl fmt::Debug for Ocrad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ocrad")
            .field("isolated", &self.is_isolated())
            .field("unavailable_reason", &self.unavailable_reason())
            .finish_non_exhaustive()
    }
}

/// Where an isolated worker sends its single response.
enum Reply {
    Channel(oneshot::Sender<WorkerResponse>),
    Callback(Box<dyn FnOnce(WorkerResponse) + Send>),
}

impl Reply {
    fn deliver(self, response: WorkerResponse) {
        match self {
            Reply::Channel(sender) => {
                if sender.send(response).is_err() {
                    warn!("Isolated worker finished after its caller went away");
                }
            }
            Reply::Callback(callback) => callback(response),
        }
    }
}

/// One isolated worker: one request in, a fresh engine, one reply out. The
/// engine and its staging directory go away when the run returns.
///
/// A runtime that is shutting down drops blocking tasks without running
/// them; the job then runs on the dropping thread so the reply still goes out
/// exactly once.
struct WorkerTask {
    factory: Arc<dyn EngineFactory>,
    request: oneshot::Receiver<Job>,
    reply: Option<Reply>,
}

impl WorkerTask {
    fn run(mut self) {
        self.execute();
    }

    fn execute(&mut self) {
        let Some(reply) = self.reply.take() else {
            return;
        };

        let result = match self.request.try_recv() {
            Ok(job) => self.factory.create().and_then(|mut engine| {
                debug!("Isolated worker engine created (version {})", engine.version());
                job.run(engine.as_mut())
            }),
            Err(_) => Err(OcradError::Worker("no request received".to_string())),
        };

        reply.deliver(result);
        debug!("Isolated worker torn down");
    }
}

impl Drop for WorkerTask {
    fn drop(&mut self) {
        if self.reply.is_some() {
            warn!("Worker lane rejected the job; running it on the current thread");
            self.execute();
        }
    }
}
