//! Process-wide library lifecycle
//!
//! [`init`] must be called once before any runtime or session is created
//! and [`destroy`] tears everything down again. Between the two the library
//! owns:
//!
//! - the worker pool running peer invitations and frame delivery
//! - the directory of live logical sessions (the join rendezvous)
//! - the directory of peer backends addressed by connection strings
//! - the logging sinks selected by [`LibraryInit`]

use crate::config::LibraryInit;
use crate::peer::backend::BackendDirectory;
use crate::runtime::RuntimeInner;
use crate::session::directory::SessionDirectory;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File created inside `log_folder_path`
pub const LOG_FILE_NAME: &str = "qar-streaming.log";

/// How long destroy waits for worker tasks before abandoning them
const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

static LIBRARY: Mutex<Option<Arc<LibraryState>>> = parking_lot::const_mutex(None);

/// Everything owned by an initialized library
pub(crate) struct LibraryState {
    workers: Mutex<Option<tokio::runtime::Runtime>>,
    handle: tokio::runtime::Handle,
    pub sessions: SessionDirectory,
    pub backends: Arc<BackendDirectory>,
    runtimes: Mutex<Vec<Weak<RuntimeInner>>>,
}

impl LibraryState {
    /// Run `future` on the worker pool
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Detached; completion is reported through callbacks or counters
        drop(self.handle.spawn(future));
    }

    pub fn track_runtime(&self, runtime: Weak<RuntimeInner>) {
        let mut runtimes = self.runtimes.lock();
        runtimes.retain(|r| r.strong_count() > 0);
        runtimes.push(runtime);
    }

    fn shutdown(&self) {
        let runtimes: Vec<_> = self.runtimes.lock().drain(..).collect();
        for runtime in runtimes.iter().filter_map(Weak::upgrade) {
            runtime.close_sessions(Some(&self.sessions));
        }

        let orphaned = self.sessions.drain();
        if !orphaned.is_empty() {
            warn!("Closing {} sessions without a live runtime", orphaned.len());
        }
        for session in orphaned {
            session.close();
        }

        self.backends.clear();

        let Some(workers) = self.workers.lock().take() else {
            return;
        };

        if tokio::runtime::Handle::try_current().is_ok() {
            // Blocking shutdown is not allowed from inside an async context
            workers.shutdown_background();
        } else {
            workers.shutdown_timeout(WORKER_SHUTDOWN_TIMEOUT);
        }
    }
}

/// Install the tracing stack selected by `config`
///
/// A subscriber installed earlier (by the host application or a test
/// harness) is kept.
fn init_logging(config: &LibraryInit) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter.as_deref().unwrap_or("info")))
        .map_err(|e| Error::InvalidArgument(format!("invalid log filter: {}", e)))?;

    let console = config
        .enable_console_logging
        .then(|| fmt::layer().with_target(true));

    let file = match &config.log_folder_path {
        Some(folder) => {
            std::fs::create_dir_all(folder)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(folder.join(LOG_FILE_NAME))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    if tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .is_err()
    {
        debug!("A global tracing subscriber is already installed, keeping it");
    }

    Ok(())
}

/// Initialize the library
///
/// # Errors
///
/// - `AlreadyInitialized` if the library is already initialized
/// - `InvalidArgument` if `config` does not validate
/// - `Io` if the log folder or the worker pool cannot be created
pub fn init(config: &LibraryInit) -> Result<()> {
    config.validate()?;

    let mut library = LIBRARY.lock();
    if library.is_some() {
        return Err(Error::AlreadyInitialized);
    }

    init_logging(config)?;

    let workers = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("qar-worker")
        .enable_time()
        .build()?;
    let handle = workers.handle().clone();

    *library = Some(Arc::new(LibraryState {
        workers: Mutex::new(Some(workers)),
        handle,
        sessions: SessionDirectory::new(),
        backends: Arc::new(BackendDirectory::new()),
        runtimes: Mutex::new(Vec::new()),
    }));

    info!(
        version = crate::version(),
        worker_threads = config.worker_threads,
        console = config.enable_console_logging,
        "QAR streaming library initialized"
    );
    Ok(())
}

/// Tear down the library
///
/// Closes every runtime and session (cancelling their invitations and
/// render senders) best-effort, then stops the worker pool.
pub fn destroy() -> Result<()> {
    let state = LIBRARY.lock().take().ok_or(Error::NotInitialized)?;
    info!("Destroying QAR streaming library");
    state.shutdown();
    info!("QAR streaming library destroyed");
    Ok(())
}

/// Whether [`init`] has been called without a matching [`destroy`]
pub fn is_initialized() -> bool {
    LIBRARY.lock().is_some()
}

/// The current library state, or `NotInitialized`
pub(crate) fn state() -> Result<Arc<LibraryState>> {
    LIBRARY.lock().clone().ok_or(Error::NotInitialized)
}
