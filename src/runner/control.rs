//! Reload and exit requests shared between the signal listener and the
//! capture loop.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tokio::signal::unix::{signal, Signal, SignalKind};

/// Flags set asynchronously and polled once per loop iteration.
///
/// Clones share the same flags.
#[derive(Debug, Clone, Default)]
pub struct RunnerControl {
    reload: Arc<AtomicBool>,
    exit: Arc<AtomicBool>,
}

impl RunnerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }

    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
    }

    /// Returns whether a reload was requested and clears the request.
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }
}

/// Start a background thread translating SIGHUP into a reload request and
/// SIGINT/SIGTERM into an exit request.
///
/// Returns once the handlers are installed, or with the installation error.
pub fn spawn_signal_listener(control: RunnerControl) -> io::Result<()> {
    let (ready_tx, ready_rx) = mpsc::channel();

    thread::Builder::new()
        .name("rotcap-signals".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            runtime.block_on(listen(control, ready_tx));
        })?;

    ready_rx
        .recv()
        .map_err(|_| io::Error::other("signal listener exited before installing handlers"))?
}

fn install() -> io::Result<(Signal, Signal, Signal)> {
    Ok((
        signal(SignalKind::hangup())?,
        signal(SignalKind::interrupt())?,
        signal(SignalKind::terminate())?,
    ))
}

async fn listen(control: RunnerControl, ready: mpsc::Sender<io::Result<()>>) {
    let (mut sighup, mut sigint, mut sigterm) = match install() {
        Ok(signals) => {
            let _ = ready.send(Ok(()));
            signals
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    loop {
        tokio::select! {
            _ = sighup.recv() => {
                tracing::info!("Received SIGHUP, reloading configuration");
                control.request_reload();
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down");
                control.request_exit();
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
                control.request_exit();
            }
        }
    }
}
