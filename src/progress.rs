//! Animated ellipsis shown while a request is in flight.

use std::io::{self, Write};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const FRAME_INTERVAL: Duration = Duration::from_millis(400);
const FRAMES: &[&str] = &[".", "..", "..."];
const CLEAR_LINE: &str = "\r\x1b[K";

/// A background task drawing `.`, `..`, `...` on the current line.
///
/// [`ProgressIndicator::cancel`] may be called from anywhere, any number of
/// times.  [`ProgressIndicator::finish`] waits for the task, so the line is
/// clean by the time it returns.
pub struct ProgressIndicator {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ProgressIndicator {
    /// Starts the animation.
    pub fn start() -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(animate(token.clone()));
        Self {
            token,
            task: Some(task),
        }
    }

    /// An indicator that draws nothing.
    pub fn disabled() -> Self {
        Self {
            token: CancellationToken::new(),
            task: None,
        }
    }

    /// Starts the animation only when `enabled` is set.
    pub fn start_if(enabled: bool) -> Self {
        if enabled {
            Self::start()
        } else {
            Self::disabled()
        }
    }

    /// Asks the animation to stop and clear its line.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once [`ProgressIndicator::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels the animation and waits until its line has been cleared.
    pub async fn finish(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::debug!(error = %err, "progress indicator task failed");
            }
        }
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn animate(token: CancellationToken) {
    let mut stdout = io::stdout();
    let mut frame = 0;
    let mut drawn = false;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(FRAME_INTERVAL) => {
                let _ = write!(stdout, "{CLEAR_LINE}{}", FRAMES[frame % FRAMES.len()]);
                let _ = stdout.flush();
                drawn = true;
                frame += 1;
            }
        }
    }
    if drawn {
        let _ = write!(stdout, "{CLEAR_LINE}");
        let _ = stdout.flush();
    }
}
