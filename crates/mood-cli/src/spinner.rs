//! Terminal activity indicator

use std::io::{IsTerminal, Write};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const TICK: Duration = Duration::from_millis(120);
const CLEAR_LINE: &str = "\r\x1b[2K";

/// Spinner drawn until [`Spinner::stop`] is called
pub(crate) struct Spinner {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Draw on stderr, but only when `enabled` and stderr is a terminal
    pub(crate) fn start(message: impl Into<String>, enabled: bool) -> Self {
        if enabled && std::io::stderr().is_terminal() {
            Self::draw_to(message, std::io::stderr())
        } else {
            Self::idle()
        }
    }

    fn idle() -> Self {
        let (stop, _) = watch::channel(false);
        Self { stop, task: None }
    }

    /// Draw frames to `out` until stopped, then clear the line
    fn draw_to<W>(message: impl Into<String>, mut out: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let message = message.into();
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            let mut frame = 0usize;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = write!(out, "\r{} {}", FRAMES[frame % FRAMES.len()], message);
                        let _ = out.flush();
                        frame = frame.wrapping_add(1);
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            let _ = write!(out, "{CLEAR_LINE}");
            let _ = out.flush();
        });
        Self {
            stop,
            task: Some(task),
        }
    }

    /// Signal the draw task and wait for it to clear the line
    pub(crate) async fn stop(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
