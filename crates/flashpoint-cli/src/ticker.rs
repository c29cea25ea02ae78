//! Progress dots for long-running commands.

use std::io::{IsTerminal, Write};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// True while the current stderr line ends in dots.
static STDERR_MID_LINE: Mutex<bool> = Mutex::new(false);

fn lock(line: &Mutex<bool>) -> MutexGuard<'_, bool> {
    line.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Writer for log events: ends any pending line of dots first, and holds the
/// line lock until the event is written so no dot lands inside it.
pub struct LogLine {
    _line: MutexGuard<'static, bool>,
}

impl Write for LogLine {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()
    }
}

pub fn log_writer() -> LogLine {
    let mut mid_line = lock(&STDERR_MID_LINE);
    if *mid_line {
        let _ = writeln!(std::io::stderr());
        *mid_line = false;
    }
    LogLine { _line: mid_line }
}

/// Writes a `.` every interval until stopped. Stopping joins the writer
/// thread, so no dot lands after the caller's next line of output.
pub struct Ticker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Tick into `out`. `line` tracks whether `out`'s current line holds
    /// dots; whoever ends that line clears it.
    pub fn start<W: Write + Send + 'static>(
        interval: Duration,
        mut out: W,
        line: &'static Mutex<bool>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            while let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(interval) {
                let mut mid_line = lock(line);
                let _ = write!(out, ".");
                let _ = out.flush();
                *mid_line = true;
            }
            let mut mid_line = lock(line);
            if *mid_line {
                let _ = writeln!(out);
                *mid_line = false;
            }
        });
        Self {
            stop: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn disabled() -> Self {
        Self {
            stop: None,
            handle: None,
        }
    }

    /// Dots on stderr, but only for an interactive terminal and human output.
    pub fn for_stderr(json: bool) -> Self {
        let stderr = std::io::stderr();
        if json || !stderr.is_terminal() {
            return Self::disabled();
        }
        Self::start(TICK_INTERVAL, stderr, &STDERR_MID_LINE)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel and ends the loop.
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
