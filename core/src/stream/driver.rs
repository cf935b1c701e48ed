//! Stream Driver Implementation
//!
//! One [`StreamDriver`] per connection: it owns the session state (frame
//! index, last color), ticks on a fixed wall-clock period, and pushes each
//! rendered chunk into the session's output sink.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::color::{next_color_index, PALETTE};
use crate::frames::Frame;

use super::{SessionId, CLEAR_SCREEN};

/// Default emission period: one frame every 70 milliseconds.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(70);

/// Configuration for a stream driver.
#[derive(Clone, Copy, Debug)]
pub struct DriverConfig {
    /// Wall-clock period between emissions. Must be nonzero.
    pub tick_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Lifecycle state of a stream session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// Created but not yet started.
    Idle,
    /// Emitting on the periodic timer.
    Running,
    /// Terminal: cancelled, sink gone, or finished. No further emissions.
    Stopped,
}

/// Per-session mutable state retained across ticks.
#[derive(Debug)]
struct StreamSession {
    /// Index of the next frame to emit; wraps modulo the frame count.
    frame_index: usize,
    /// Color index of the previous emission, for the no-repeat rule.
    last_color: Option<usize>,
}

/// State shared between a running driver task and its [`DriverHandle`].
///
/// The mutex serializes tick emission against the stop transition: a tick
/// renders and sends while holding the lock, and `stop()` flips the state
/// under the same lock, so after `stop()` returns no new emission can begin.
#[derive(Debug)]
struct DriverShared {
    state: Mutex<DriverState>,
    stop: Notify,
}

/// Drives one session's output until cancelled.
///
/// Construct with [`StreamDriver::new`], then call [`StreamDriver::start`]
/// with the session's output sink. The returned [`DriverHandle`] observes
/// and cancels the running session.
#[derive(Debug)]
pub struct StreamDriver {
    id: SessionId,
    frames: Arc<[Frame]>,
    config: DriverConfig,
    session: StreamSession,
    rng: StdRng,
    shared: Arc<DriverShared>,
}

impl StreamDriver {
    /// Create an idle driver over a loaded frame sequence.
    #[must_use]
    pub fn new(frames: Arc<[Frame]>, config: DriverConfig) -> Self {
        Self {
            id: SessionId::new(),
            frames,
            config,
            session: StreamSession {
                frame_index: 0,
                last_color: None,
            },
            rng: StdRng::from_entropy(),
            shared: Arc::new(DriverShared {
                state: Mutex::new(DriverState::Idle),
                stop: Notify::new(),
            }),
        }
    }

    /// Replace the driver's random source with a seeded one.
    ///
    /// Makes color selection reproducible in tests.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// The session ID this driver logs under.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        *self.shared.state.lock()
    }

    /// Transition to `Running` and spawn the emission loop.
    ///
    /// An empty frame sequence is a valid edge case: the driver transitions
    /// straight to `Stopped` without emitting anything.
    ///
    /// The driver stops on its own when the sink closes (every receiver
    /// dropped), so a disconnecting client tears the session down without an
    /// explicit [`DriverHandle::stop`].
    #[must_use = "dropping the handle leaks no resources, but the session can then only stop via its sink"]
    pub fn start(self, sink: UnboundedSender<Bytes>) -> DriverHandle {
        let id = self.id;
        let shared = Arc::clone(&self.shared);
        *shared.state.lock() = DriverState::Running;

        debug!(
            session_id = %id,
            frames = self.frames.len(),
            tick_ms = self.config.tick_interval.as_millis() as u64,
            "stream session started"
        );

        let task = tokio::spawn(self.run(sink));
        DriverHandle { id, shared, task }
    }

    /// The emission loop. Runs until stopped, the sink closes, or a send
    /// fails.
    async fn run(mut self, sink: UnboundedSender<Bytes>) {
        let shared = Arc::clone(&self.shared);

        if self.frames.is_empty() {
            *shared.state.lock() = DriverState::Stopped;
            debug!(session_id = %self.id, "empty frame sequence, nothing to stream");
            return;
        }

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let mut state = shared.state.lock();
                    if *state != DriverState::Running {
                        break;
                    }
                    let chunk = self.render_tick();
                    if sink.send(chunk).is_err() {
                        *state = DriverState::Stopped;
                        debug!(session_id = %self.id, "sink rejected chunk, stopping");
                        break;
                    }
                }
                () = shared.stop.notified() => {
                    debug!(session_id = %self.id, "stop requested");
                    break;
                }
                () = sink.closed() => {
                    debug!(session_id = %self.id, "sink closed, stopping");
                    break;
                }
            }
        }

        *shared.state.lock() = DriverState::Stopped;
        debug!(session_id = %self.id, "stream session stopped");
    }

    /// Render one tick: screen clear, then the current frame wrapped in a
    /// freshly drawn color; advances the frame index and remembers the
    /// color.
    fn render_tick(&mut self) -> Bytes {
        debug_assert!(!self.frames.is_empty());

        let frame = &self.frames[self.session.frame_index];
        let color_index = next_color_index(&mut self.rng, self.session.last_color);
        let painted = PALETTE[color_index].paint(frame.text());

        let mut chunk = String::with_capacity(CLEAR_SCREEN.len() + painted.len());
        chunk.push_str(CLEAR_SCREEN);
        chunk.push_str(&painted);

        self.session.last_color = Some(color_index);
        self.session.frame_index = (self.session.frame_index + 1) % self.frames.len();
        Bytes::from(chunk)
    }
}

/// Observation and cancellation handle for a started driver.
///
/// Dropping the handle does not stop the session; the driver also watches
/// its sink and stops when the client side goes away.
#[derive(Debug)]
pub struct DriverHandle {
    id: SessionId,
    shared: Arc<DriverShared>,
    task: JoinHandle<()>,
}

impl DriverHandle {
    /// The session ID of the driven session.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state, observable synchronously.
    #[must_use]
    pub fn state(&self) -> DriverState {
        *self.shared.state.lock()
    }

    /// Cancel the session.
    ///
    /// Idempotent; stopping an already-stopped session is a no-op. Once this
    /// returns, no further chunk will be emitted: the transition happens
    /// under the same lock that guards tick emission.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == DriverState::Stopped {
                return;
            }
            *state = DriverState::Stopped;
        }
        self.shared.stop.notify_one();
    }

    /// Wait for the emission loop to finish.
    pub async fn join(self) {
        // The task neither panics nor gets aborted externally; a JoinError
        // here only means the runtime is shutting down.
        let _ = self.task.await;
    }
}
