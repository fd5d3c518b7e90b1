//! Destinations for committed lines.
//!
//! An [`Output`] is one or more sinks behind a single mutex. Each committed
//! line is written to every sink while the lock is held, so lines from
//! concurrent callers never interleave. Writes are fire-and-forget: errors
//! are dropped unless the sink is wrapped in an [`ObservedWriter`].
//!
//! Sinks the logger opened itself (files) are owned and get closed by
//! [`Output::close`]. Standard streams and caller-supplied writers are
//! borrowed and are never closed.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::line_buffer::LineSink;

/// Something an [`Output`] can be built from.
pub enum Target {
    Stdout,
    Stderr,
    /// A caller-supplied writer. Never closed by the logger.
    Writer(Box<dyn Write + Send>),
    /// A file opened for append. Owned, closed on [`Output::close`].
    File(PathBuf),
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Stdout => f.write_str("Stdout"),
            Target::Stderr => f.write_str("Stderr"),
            Target::Writer(_) => f.write_str("Writer(..)"),
            Target::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

enum Sink {
    Stdout,
    Stderr,
    Borrowed(Box<dyn Write + Send>),
    Owned { path: PathBuf, file: Option<File> },
}

impl Sink {
    fn open(target: Target) -> Result<Self> {
        Ok(match target {
            Target::Stdout => Sink::Stdout,
            Target::Stderr => Sink::Stderr,
            Target::Writer(w) => Sink::Borrowed(w),
            Target::File(path) => {
                let file = open_append(&path)?;
                tracing::debug!(path = %path.display(), "opened log file");
                Sink::Owned {
                    path,
                    file: Some(file),
                }
            }
        })
    }

    fn write_line(&mut self, line: &[u8]) {
        let _ = match self {
            Sink::Stdout => io::stdout().lock().write_all(line),
            Sink::Stderr => io::stderr().lock().write_all(line),
            Sink::Borrowed(w) => w.write_all(line),
            Sink::Owned { file: Some(f), .. } => f.write_all(line),
            Sink::Owned { file: None, .. } => Ok(()),
        };
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Stdout => io::stdout().flush(),
            Sink::Stderr => io::stderr().flush(),
            Sink::Borrowed(w) => w.flush(),
            Sink::Owned { file: Some(f), .. } => f.flush(),
            Sink::Owned { file: None, .. } => Ok(()),
        }
    }

    fn is_terminal(&self) -> bool {
        match self {
            Sink::Stdout => io::stdout().is_terminal(),
            Sink::Stderr => io::stderr().is_terminal(),
            _ => false,
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

struct OutputInner {
    sinks: Mutex<Vec<Sink>>,
    terminal: AtomicBool,
    closed: AtomicBool,
}

/// A shared, line-atomic destination.
#[derive(Clone)]
pub struct Output {
    inner: Arc<OutputInner>,
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("sinks", &self.inner.sinks.lock().len())
            .field("owned", &self.owns_any())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Output {
    fn from_sinks(sinks: Vec<Sink>) -> Self {
        let terminal = !sinks.is_empty() && sinks.iter().all(Sink::is_terminal);
        Self {
            inner: Arc::new(OutputInner {
                sinks: Mutex::new(sinks),
                terminal: AtomicBool::new(terminal),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn stdout() -> Self {
        Self::from_sinks(vec![Sink::Stdout])
    }

    pub fn stderr() -> Self {
        Self::from_sinks(vec![Sink::Stderr])
    }

    /// Wraps a caller-supplied writer. The logger never closes it.
    pub fn writer(w: impl Write + Send + 'static) -> Self {
        Self::from_sinks(vec![Sink::Borrowed(Box::new(w))])
    }

    /// Opens `path` for append. The output owns the file.
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_sinks(vec![Sink::open(Target::File(
            path.as_ref().to_path_buf(),
        ))?]))
    }

    /// Writes every line to all `targets`. Fails if any file cannot be opened.
    pub fn tee(targets: Vec<Target>) -> Result<Self> {
        let sinks = targets
            .into_iter()
            .map(Sink::open)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_sinks(sinks))
    }

    /// Overrides terminal detection, e.g. for a writer known to be a tty.
    pub fn declare_terminal(self, terminal: bool) -> Self {
        self.inner.terminal.store(terminal, Ordering::Relaxed);
        self
    }

    /// `true` when every sink is an interactive terminal.
    pub fn is_terminal(&self) -> bool {
        self.inner.terminal.load(Ordering::Relaxed)
    }

    /// `true` if any sink was opened by this output.
    pub fn owns_any(&self) -> bool {
        self.inner
            .sinks
            .lock()
            .iter()
            .any(|s| matches!(s, Sink::Owned { .. }))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut sinks = self.inner.sinks.lock();
        for sink in sinks.iter_mut() {
            sink.flush()?;
        }
        Ok(())
    }

    /// Closes the owned sinks. Borrowed sinks keep receiving lines.
    /// Idempotent; returns whether this call did the closing.
    pub fn close(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut sinks = self.inner.sinks.lock();
        for sink in sinks.iter_mut() {
            if let Sink::Owned { path, file } = sink {
                if let Some(mut f) = file.take() {
                    let _ = f.flush();
                    tracing::debug!(path = %path.display(), "closed log file");
                }
            }
        }
        true
    }
}

impl LineSink for Output {
    fn write_line(&self, line: &[u8]) {
        let mut sinks = self.inner.sinks.lock();
        for sink in sinks.iter_mut() {
            sink.write_line(line);
        }
    }
}

/// Counters kept by an [`ObservedWriter`].
#[derive(Debug, Default)]
pub struct WriteStats {
    writes: AtomicU64,
    failures: AtomicU64,
    short_writes: AtomicU64,
}

impl WriteStats {
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn short_writes(&self) -> u64 {
        self.short_writes.load(Ordering::Relaxed)
    }
}

type ErrorCallback = Box<dyn Fn(&io::Error) + Send + Sync>;

/// Records write failures and short writes of the wrapped writer.
///
/// Nothing is retried; this only reports.
pub struct ObservedWriter<W> {
    inner: W,
    stats: Arc<WriteStats>,
    on_error: Option<ErrorCallback>,
}

impl<W: Write> ObservedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            stats: Arc::new(WriteStats::default()),
            on_error: None,
        }
    }

    /// Calls `f` with every error the wrapped writer returns.
    pub fn on_error(mut self, f: impl Fn(&io::Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Shared handle to the counters, valid after the writer is moved.
    pub fn stats(&self) -> Arc<WriteStats> {
        self.stats.clone()
    }
}

impl<W: Write> Write for ObservedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        match self.inner.write(buf) {
            Ok(n) => {
                if n < buf.len() {
                    self.stats.short_writes.fetch_add(1, Ordering::Relaxed);
                }
                Ok(n)
            }
            Err(err) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                if let Some(f) = &self.on_error {
                    f(&err);
                }
                Err(err)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
