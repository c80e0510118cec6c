//! Asynchronous syntax checker.
//!
//! A [`SyntaxChecker`] owns one long-lived worker thread consuming a FIFO queue of
//! [`CheckRequest`]s. For each request the worker:
//!
//! - swaps in a newly published [`CommandDatabase`] (whole-object replacement);
//! - discards the request if the line was removed or edited since it was queued (ticket mismatch);
//! - re-lexes the line text and runs [`check_line`] against the incoming environment stack;
//! - stores the overlay and the outgoing environment stack as line cookies;
//! - enqueues the next line when the outgoing stack differs from the cached one, so a single
//!   `\begin`/`\end` edit ripples through the document until the stacks agree again.
//!
//! When the last line of the document is checked, environments still open get a synthesized
//! `environment-not-closed` error at their `\begin`.

mod check;

pub use check::{LineContext, check_line, count_columns};

use crate::buffer::{LineHandle, LineSource};
use crate::config::AnalysisConfig;
use crate::database::CommandDatabase;
use crate::environment::StackEnvironment;
use crate::error::Result;
use crate::lexer::lex_line;
use crate::overlay::{SyntaxError, SyntaxErrorKind};
use crate::token::TokenStack;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// One queued line check.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    /// The line to check. Holding the handle keeps it alive while queued.
    pub line: LineHandle,
    /// Where the line was when queued; used as a search hint.
    pub line_hint: usize,
    /// Incoming environment stack; `None` takes the previous line's cookie when dequeued.
    pub environments: Option<StackEnvironment>,
    /// Incoming lexer remainder; `None` takes the previous line's cookie when dequeued.
    pub remainder: Option<TokenStack>,
    /// Drop the whole previous overlay, including synthesized errors.
    pub clear_overlay: bool,
    /// Edit ticket of the line when queued.
    pub ticket: u64,
}

impl CheckRequest {
    /// A request stamped with the line's current ticket, resolving its inputs when dequeued.
    pub fn new(line: LineHandle, line_hint: usize) -> Self {
        Self {
            ticket: line.ticket(),
            line,
            line_hint,
            environments: None,
            remainder: None,
            clear_overlay: false,
        }
    }
}

/// Notifications from the worker thread.
#[derive(Debug, Clone)]
pub enum CheckerEvent {
    /// The overlay of a line changed.
    OverlayChanged {
        /// The line.
        line: LineHandle,
        /// Its index when the change was published.
        index: usize,
    },
}

/// Callback receiving [`CheckerEvent`]s on the worker thread.
pub type CheckerListener = Arc<dyn Fn(&CheckerEvent) + Send + Sync>;

#[derive(Default)]
struct Queue {
    pending: VecDeque<CheckRequest>,
    busy: bool,
    stop: bool,
}

impl Queue {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && !self.busy
    }
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    idle: Condvar,
    pending_db: Mutex<Option<Arc<CommandDatabase>>>,
    listener: RwLock<Option<CheckerListener>>,
    lines: Arc<dyn LineSource>,
    math_highlight: bool,
}

impl Shared {
    fn push(&self, request: CheckRequest) {
        let mut queue = self.queue.lock();
        if queue.stop {
            return;
        }
        queue.pending.push_back(request);
        self.available.notify_one();
    }

    fn stopping(&self) -> bool {
        self.queue.lock().stop
    }

    fn notify(&self, event: CheckerEvent) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener(&event);
        }
    }
}

/// Handle to the checker worker. Dropping it stops and joins the worker.
pub struct SyntaxChecker {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl SyntaxChecker {
    /// Start the worker over `lines`, checking against `db` until another database is published.
    pub fn spawn(
        lines: Arc<dyn LineSource>,
        db: Arc<CommandDatabase>,
        config: &AnalysisConfig,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            available: Condvar::new(),
            idle: Condvar::new(),
            pending_db: Mutex::new(None),
            listener: RwLock::new(None),
            lines,
            math_highlight: config.math_highlight,
        });
        let worker = Worker {
            shared: Arc::clone(&shared),
            db,
            synthetic: Vec::new(),
        };
        let handle = thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || worker.run())?;
        info!(name = %config.worker_name, "syntax checker started");
        Ok(Self {
            shared,
            worker: Some(handle),
        })
    }

    /// Queue a request.
    pub fn enqueue(&self, request: CheckRequest) {
        trace!(hint = request.line_hint, ticket = request.ticket, "enqueue line check");
        self.shared.push(request);
    }

    /// Queue a line whose inputs are taken from the previous line when it is dequeued.
    pub fn put_line(&self, line: LineHandle, line_hint: usize) {
        self.enqueue(CheckRequest::new(line, line_hint));
    }

    /// Queue `count` lines starting at `from`, in order.
    pub fn recheck(&self, from: usize, count: usize) {
        let end = from
            .saturating_add(count)
            .min(self.shared.lines.line_count());
        for index in from..end {
            if let Some(line) = self.shared.lines.line(index) {
                self.put_line(line, index);
            }
        }
    }

    /// Publish a new database; it takes effect with the next dequeued request.
    pub fn publish_database(&self, db: Arc<CommandDatabase>) {
        debug!("publishing command database to the checker");
        *self.shared.pending_db.lock() = Some(db);
    }

    /// Block until the queue is empty and the worker is idle.
    pub fn wait_idle(&self) {
        let mut queue = self.shared.queue.lock();
        while !queue.is_idle() && !queue.stop {
            self.shared.idle.wait(&mut queue);
        }
    }

    /// Like [`wait_idle`](Self::wait_idle) with a timeout. Returns `false` on timeout.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.queue.lock();
        while !queue.is_idle() && !queue.stop {
            if self.shared.idle.wait_until(&mut queue, deadline).timed_out() {
                return queue.is_idle();
            }
        }
        true
    }

    /// Number of queued requests.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().pending.len()
    }

    /// Install the event listener (replacing any previous one).
    pub fn set_listener(&self, listener: impl Fn(&CheckerEvent) + Send + Sync + 'static) {
        *self.shared.listener.write() = Some(Arc::new(listener));
    }

    /// Stop the worker and wait for it to exit. Queued requests are dropped.
    pub fn stop(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.stop = true;
            queue.pending.clear();
        }
        self.shared.available.notify_all();
        self.shared.idle.notify_all();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("syntax checker worker panicked");
            }
            info!("syntax checker stopped");
        }
    }
}

impl Drop for SyntaxChecker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    shared: Arc<Shared>,
    db: Arc<CommandDatabase>,
    /// Lines holding synthesized end-of-document errors.
    synthetic: Vec<LineHandle>,
}

/// Marks the checker stopped if the worker unwinds, so waiters and producers do not hang.
struct PanicGuard {
    shared: Arc<Shared>,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        warn!("syntax checker worker panicked, stopping");
        let mut queue = self.shared.queue.lock();
        queue.stop = true;
        queue.busy = false;
        queue.pending.clear();
        self.shared.idle.notify_all();
    }
}

impl Worker {
    fn run(mut self) {
        let _guard = PanicGuard {
            shared: Arc::clone(&self.shared),
        };
        loop {
            let request = {
                let mut queue = self.shared.queue.lock();
                queue.busy = false;
                loop {
                    if queue.stop {
                        self.shared.idle.notify_all();
                        return;
                    }
                    if let Some(request) = queue.pending.pop_front() {
                        queue.busy = true;
                        break request;
                    }
                    self.shared.idle.notify_all();
                    self.shared.available.wait(&mut queue);
                }
            };
            if let Some(db) = self.shared.pending_db.lock().take() {
                debug!("checker swapped in a new command database");
                self.db = db;
            }
            self.process(request);
        }
    }

    fn process(&mut self, request: CheckRequest) {
        let line = request.line;
        if line.is_removed() || line.ticket() != request.ticket {
            trace!(hint = request.line_hint, "discarding stale check");
            return;
        }
        let lines = Arc::clone(&self.shared.lines);
        let Some(index) = lines.index_of(&line, Some(request.line_hint)) else {
            return;
        };
        let previous = index.checked_sub(1).and_then(|i| lines.line(i));
        let mut envs = request
            .environments
            .or_else(|| previous.as_ref().and_then(LineHandle::environments))
            .unwrap_or_default();
        let remainder = request
            .remainder
            .or_else(|| previous.as_ref().and_then(LineHandle::remainder))
            .unwrap_or_default();

        let text = line.text();
        let lexed = lex_line(&text, &remainder, &self.db);
        let ctx = LineContext {
            db: &self.db,
            line: Some(&line),
            math_highlight: self.shared.math_highlight,
        };
        let mut errors = check_line(&text, &lexed.tokens, &mut envs, &ctx);

        if self.shared.stopping() {
            return;
        }
        let (overlay_changed, envs_changed) = {
            let mut state = line.write();
            if self.shared.stopping() {
                return;
            }
            if line.is_removed() || line.ticket() != request.ticket {
                trace!(index, "discarding stale check result");
                return;
            }
            if !request.clear_overlay {
                let still_open = |e: &SyntaxError| {
                    e.synthetic
                        && envs.open().iter().any(|env| {
                            env.start_column == e.start
                                && env.line.as_ref().is_some_and(|l| l.ptr_eq(&line))
                        })
                };
                errors.extend(state.cookies.overlay.iter().filter(|e| still_open(e)).cloned());
            }
            let overlay_changed = state.cookies.overlay != errors;
            state.cookies.overlay = errors;
            let envs_changed = state.cookies.environments.as_ref() != Some(&envs);
            state.cookies.environments = Some(envs.clone());
            (overlay_changed, envs_changed)
        };
        trace!(index, overlay_changed, envs_changed, "checked line");
        if overlay_changed {
            self.shared.notify(CheckerEvent::OverlayChanged {
                line: line.clone(),
                index,
            });
        }

        let last = index + 1 >= lines.line_count();
        if last {
            if self.shared.stopping() {
                return;
            }
            self.end_of_document(lines.as_ref(), &envs);
        } else if envs_changed {
            if let Some(next) = lines.line(index + 1) {
                self.shared.push(CheckRequest {
                    ticket: next.ticket(),
                    line: next,
                    line_hint: index + 1,
                    environments: Some(envs),
                    remainder: Some(lexed.remainder),
                    clear_overlay: false,
                });
            }
        }
    }

    /// Replace the synthesized errors with one per environment still open at the end.
    fn end_of_document(&mut self, lines: &dyn LineSource, envs: &StackEnvironment) {
        let mut touched: Vec<LineHandle> = Vec::new();
        for line in self.synthetic.drain(..) {
            let mut state = line.write();
            let before = state.cookies.overlay.len();
            state.cookies.overlay.retain(|e| !e.synthetic);
            if state.cookies.overlay.len() != before {
                touched.push(line.clone());
            }
        }
        for env in envs.open() {
            let Some(anchor) = env.line.clone() else {
                continue;
            };
            if anchor.is_removed() {
                continue;
            }
            let error = SyntaxError {
                synthetic: true,
                ..SyntaxError::new(
                    SyntaxErrorKind::EnvironmentNotClosed,
                    env.start_column,
                    env.opening_length(),
                )
            };
            {
                let mut state = anchor.write();
                if !state.cookies.overlay.contains(&error) {
                    state.cookies.overlay.push(error);
                }
            }
            if !touched.iter().any(|l| l.ptr_eq(&anchor)) {
                touched.push(anchor.clone());
            }
            if !self.synthetic.iter().any(|l| l.ptr_eq(&anchor)) {
                self.synthetic.push(anchor);
            }
        }
        if !envs.is_baseline() {
            debug!(open = envs.open_count(), "environments left open at end of document");
        }
        for line in touched {
            if let Some(index) = lines.index_of(&line, None) {
                self.shared
                    .notify(CheckerEvent::OverlayChanged { line, index });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::LineBuffer;

    fn checker(buffer: &LineBuffer) -> SyntaxChecker {
        SyntaxChecker::spawn(
            Arc::new(buffer.clone()),
            Arc::new(CommandDatabase::builtin()),
            &AnalysisConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_stale_request_is_discarded() {
        let buffer = LineBuffer::from_text("\\nosuchcommand");
        let line = buffer.handles()[0].clone();
        let checker = checker(&buffer);
        let request = CheckRequest::new(line.clone(), 0);
        line.bump_ticket();
        checker.enqueue(request);
        checker.wait_idle();
        assert!(line.overlay().is_empty());
        assert!(line.environments().is_none());
    }

    #[test]
    fn test_propagates_until_stacks_agree() {
        let buffer = LineBuffer::from_text("a\nb\nc\nd");
        let checker = checker(&buffer);
        checker.recheck(0, 4);
        checker.wait_idle();

        buffer.replace_line(0, "\\begin{itemize}").unwrap();
        checker.put_line(buffer.handles()[0].clone(), 0);
        checker.wait_idle();
        for line in buffer.handles() {
            assert_eq!(line.environments().unwrap().open_count(), 1);
        }
        let overlay = buffer.handles()[0].overlay();
        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay[0].kind, SyntaxErrorKind::EnvironmentNotClosed);
        assert!(overlay[0].synthetic);

        buffer.replace_line(3, "\\end{itemize}").unwrap();
        checker.put_line(buffer.handles()[3].clone(), 3);
        checker.wait_idle();
        assert!(buffer.handles()[0].overlay().is_empty());
    }

    #[test]
    fn test_listener_and_stop() {
        let buffer = LineBuffer::from_text("\\nosuchcommand");
        let mut checker = checker(&buffer);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        checker.set_listener(move |event| {
            let CheckerEvent::OverlayChanged { index, .. } = event;
            sink.lock().push(*index);
        });
        checker.recheck(0, 1);
        assert!(checker.wait_idle_timeout(Duration::from_secs(5)));
        assert_eq!(*seen.lock(), vec![0]);

        checker.stop();
        checker.recheck(0, 1);
        assert_eq!(checker.queue_len(), 0);
    }

    #[test]
    fn test_no_overlay_published_after_stop() {
        let buffer = LineBuffer::from_text("\\nosuchcommand");
        let line = buffer.handles()[0].clone();
        let mut checker = checker(&buffer);
        {
            let _state = line.write();
            checker.put_line(line.clone(), 0);
            while checker.queue_len() > 0 {
                thread::yield_now();
            }
            checker.shared.queue.lock().stop = true;
        }
        checker.stop();
        assert!(line.overlay().is_empty());
        assert!(line.environments().is_none());
    }

    #[test]
    fn test_worker_panic_does_not_block_waiters() {
        let buffer = LineBuffer::from_text("\\nosuchcommand");
        let checker = checker(&buffer);
        checker.set_listener(|_| panic!("listener failed"));
        checker.recheck(0, 1);
        assert!(checker.wait_idle_timeout(Duration::from_secs(5)));
        checker.wait_idle();
        checker.recheck(0, 1);
        assert_eq!(checker.queue_len(), 0);
    }
}
