//! Engine orchestration: debounce timers, single-flight dispatch, reply
//! routing, and the event broadcast.
//!
//! Reply correlation: neither wire channel carries request IDs, so the
//! engine keeps a FIFO of slots, one per dispatched request, and pairs
//! each inbound reply with the oldest slot. With the single-flight rule
//! per surface and a serial service this is exact. A timed-out request's
//! slot stays queued but marked expired: its late reply (if the service
//! ever answers) consumes that slot and is dropped, instead of shifting
//! routing for the requests behind it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use keigo_core::{
    focus_split, AppliedSuggestion, HistoryError, KeystrokeOutcome, RollbackEntry,
    RollbackOutcome, SessionRegistry, DEBOUNCE,
};
use keigo_relay::{RelayError, RelayEvent, RelayHandle};
use keigo_types::{AnalysisRequest, AnalysisResult, EntryId, ServiceReply, SurfaceId};

use crate::dispatcher::AnalysisDispatcher;

/// How long a dispatched request may stay unanswered before its surface
/// is released for new analysis.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 64;

/// Engine-level errors returned to direct callers.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("analysis already in flight for surface {0}")]
    Busy(SurfaceId),
    #[error("unknown surface {0}")]
    UnknownSurface(SurfaceId),
    #[error("no completed sentence to analyze")]
    NoSentence,
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Broadcast to every engine subscriber (the daemon fans these out to
/// UI connections).
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// A request for this surface went out to the service.
    AnalysisStarted { surface: SurfaceId },
    /// A reply arrived and was installed on the surface.
    AnalysisReady {
        surface: SurfaceId,
        result: AnalysisResult,
    },
    /// The request failed: transport error, service error, malformed
    /// reply, timeout, or connection loss.
    AnalysisFailed { surface: SurfaceId, error: String },
    /// A dispatch was refused because one is already in flight.
    Busy { surface: SurfaceId },
    /// A suggestion was applied and a rollback entry recorded.
    Applied { surface: SurfaceId, entry: EntryId },
    /// A rollback entry was consumed; `matched` is false when the text
    /// it described was already gone.
    RolledBack {
        surface: SurfaceId,
        entry: EntryId,
        matched: bool,
    },
    /// The service socket came up.
    ChannelUp,
    /// The service socket went down; in-flight requests were failed.
    ChannelDown,
}

/// One dispatched request awaiting its reply.
struct Slot {
    surface: SurfaceId,
    generation: u64,
    /// Set when the request timed out; the matching reply, if it ever
    /// arrives, consumes this slot and is dropped.
    expired: bool,
}

/// Routing bookkeeping, separate from the per-surface session state.
#[derive(Default)]
struct RoutingState {
    /// Requests in flight, oldest first.
    in_flight: VecDeque<Slot>,
    /// Per-surface dispatch generation; stale timeout tasks check this.
    generation: HashMap<SurfaceId, u64>,
    /// Live trailing-debounce task per surface.
    debounce: HashMap<SurfaceId, JoinHandle<()>>,
}

struct EngineInner {
    registry: SessionRegistry,
    dispatcher: Arc<dyn AnalysisDispatcher>,
    events: broadcast::Sender<EngineEvent>,
    routing: Mutex<RoutingState>,
}

/// Cloneable orchestrator over all live surfaces.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(dispatcher: Arc<dyn AnalysisDispatcher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                registry: SessionRegistry::new(),
                dispatcher,
                events,
                routing: Mutex::new(RoutingState::default()),
            }),
        }
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Forward the relay's reply/connection events into this engine.
    pub fn attach_relay(&self, relay: &RelayHandle) {
        let mut events = relay.subscribe();
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => engine.handle_relay_event(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "relay event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ========================================================================
    // Surface lifecycle
    // ========================================================================

    pub fn attach(&self) -> SurfaceId {
        self.inner.registry.attach()
    }

    pub fn attach_with_id(&self, surface: SurfaceId) {
        self.inner.registry.attach_with_id(surface);
    }

    /// Drop a surface: its session, debounce timer, and routing slots.
    pub fn detach(&self, surface: SurfaceId) -> bool {
        {
            let mut routing = self.inner.routing.lock();
            if let Some(task) = routing.debounce.remove(&surface) {
                task.abort();
            }
            routing.generation.remove(&surface);
            routing.in_flight.retain(|slot| slot.surface != surface);
        }
        self.inner.registry.detach(surface)
    }

    // ========================================================================
    // Keystroke path
    // ========================================================================

    /// Feed one keystroke. On a trigger the dispatch is debounced: it
    /// fires [`DEBOUNCE`] after the *last* qualifying keystroke, each new
    /// trigger replacing the surface's armed timer.
    pub fn on_keystroke(
        &self,
        surface: SurfaceId,
        key: char,
        full_text: &str,
    ) -> Result<KeystrokeOutcome, EngineError> {
        let outcome = self
            .inner
            .registry
            .with_session(surface, |s| s.observe_keystroke(key, full_text))
            .ok_or(EngineError::UnknownSurface(surface))?;

        if let KeystrokeOutcome::Trigger { focus, context } = &outcome {
            let request = AnalysisRequest::new(focus.clone(), context.clone(), full_text);
            self.arm_debounce(surface, request);
        }
        Ok(outcome)
    }

    fn arm_debounce(&self, surface: SurfaceId, request: AnalysisRequest) {
        let engine = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            // Dispatch runs detached: the abort from a newer keystroke
            // may only land on the wait above, never on an analyze that
            // has claimed the single-flight slot.
            tokio::spawn(async move {
                if let Err(err) = engine.analyze(surface, request).await {
                    tracing::debug!(%surface, %err, "debounced dispatch not sent");
                }
            });
        });
        let mut routing = self.inner.routing.lock();
        if let Some(stale) = routing.debounce.insert(surface, task) {
            stale.abort();
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Send one request for a surface, immediately (no debounce).
    ///
    /// The single-flight slot is claimed synchronously before the first
    /// await; a refused claim surfaces as [`EngineError::Busy`] plus a
    /// broadcast [`EngineEvent::Busy`].
    pub async fn analyze(
        &self,
        surface: SurfaceId,
        request: AnalysisRequest,
    ) -> Result<(), EngineError> {
        let claimed = self
            .inner
            .registry
            .with_session(surface, |s| s.try_begin_analysis())
            .ok_or(EngineError::UnknownSurface(surface))?;
        if !claimed {
            tracing::debug!(%surface, "analysis suppressed, one already in flight");
            let _ = self.inner.events.send(EngineEvent::Busy { surface });
            return Err(EngineError::Busy(surface));
        }

        // Register the routing slot and arm the timeout before the first
        // await: a reply can beat the dispatch task's resumption, and a
        // dispatch that itself stalls must still expire.
        let generation = {
            let mut routing = self.inner.routing.lock();
            let g = routing.generation.entry(surface).or_insert(0);
            *g += 1;
            let generation = *g;
            routing.in_flight.push_back(Slot {
                surface,
                generation,
                expired: false,
            });
            generation
        };
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(REQUEST_TIMEOUT).await;
            engine.expire_request(surface, generation);
        });

        if let Err(err) = self.inner.dispatcher.dispatch(request.into()).await {
            self.withdraw_slot(surface, generation);
            self.inner.registry.with_session(surface, |s| s.fail_analysis());
            let _ = self.inner.events.send(EngineEvent::AnalysisFailed {
                surface,
                error: err.to_string(),
            });
            return Err(err.into());
        }

        let _ = self.inner.events.send(EngineEvent::AnalysisStarted { surface });
        Ok(())
    }

    /// Remove a specific request's slot (dispatch never went out).
    fn withdraw_slot(&self, surface: SurfaceId, generation: u64) {
        let mut routing = self.inner.routing.lock();
        routing
            .in_flight
            .retain(|slot| !(slot.surface == surface && slot.generation == generation));
    }

    /// Analyze a full body on explicit user request (panel button), no
    /// keystroke needed. The focus is the body's last sentence.
    pub async fn check_tone(&self, surface: SurfaceId, body: &str) -> Result<(), EngineError> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(EngineError::NoSentence);
        }
        let split = focus_split(trimmed).ok_or(EngineError::NoSentence)?;
        let request = AnalysisRequest::new(split.focus, split.context, body);
        self.analyze(surface, request).await
    }

    fn expire_request(&self, surface: SurfaceId, generation: u64) {
        {
            let mut routing = self.inner.routing.lock();
            if routing.generation.get(&surface).copied() != Some(generation) {
                return; // a newer dispatch superseded this timer
            }
            let pending = self
                .inner
                .registry
                .with_session(surface, |s| s.is_pending())
                .unwrap_or(false);
            if !pending {
                return; // answered in time
            }
            // The slot stays queued, marked expired, so a late reply
            // consumes it instead of the next request's slot.
            if let Some(slot) = routing
                .in_flight
                .iter_mut()
                .find(|slot| slot.surface == surface && slot.generation == generation)
            {
                slot.expired = true;
            }
            self.inner.registry.with_session(surface, |s| s.fail_analysis());
        }
        tracing::warn!(%surface, "analysis request timed out");
        let _ = self.inner.events.send(EngineEvent::AnalysisFailed {
            surface,
            error: "analysis timed out".into(),
        });
    }

    // ========================================================================
    // Reply routing
    // ========================================================================

    /// Route one relay event. Public so tests (and the daemon's pump) can
    /// drive routing directly.
    pub fn handle_relay_event(&self, event: RelayEvent) {
        match event {
            RelayEvent::Reply(ServiceReply::Suggestions { suggestions }) => {
                let Some(surface) = self.take_reply_target() else {
                    tracing::debug!("reply with no request in flight, dropped");
                    return;
                };
                match AnalysisResult::from_labeled_suggestions(suggestions) {
                    Ok(result) => {
                        let installed = self
                            .inner
                            .registry
                            .with_session(surface, |s| s.install_result(result.clone()));
                        if installed.is_some() {
                            let _ = self
                                .inner
                                .events
                                .send(EngineEvent::AnalysisReady { surface, result });
                        }
                    }
                    Err(err) => {
                        self.inner.registry.with_session(surface, |s| s.fail_analysis());
                        let _ = self.inner.events.send(EngineEvent::AnalysisFailed {
                            surface,
                            error: err.to_string(),
                        });
                    }
                }
            }
            RelayEvent::Reply(ServiceReply::Error { error }) => {
                let Some(surface) = self.take_reply_target() else {
                    return;
                };
                self.inner.registry.with_session(surface, |s| s.fail_analysis());
                let _ = self
                    .inner
                    .events
                    .send(EngineEvent::AnalysisFailed { surface, error });
            }
            RelayEvent::ChannelUp => {
                let _ = self.inner.events.send(EngineEvent::ChannelUp);
            }
            RelayEvent::ChannelDown => {
                let stranded: Vec<Slot> =
                    self.inner.routing.lock().in_flight.drain(..).collect();
                for slot in stranded {
                    if slot.expired {
                        continue; // already failed at timeout
                    }
                    let surface = slot.surface;
                    self.inner.registry.with_session(surface, |s| s.fail_analysis());
                    let _ = self.inner.events.send(EngineEvent::AnalysisFailed {
                        surface,
                        error: "analysis service connection lost".into(),
                    });
                }
                let _ = self.inner.events.send(EngineEvent::ChannelDown);
            }
        }
    }

    /// Consume the oldest slot for an inbound reply. `None` means the
    /// reply has no live target: nothing was in flight, or its request
    /// already timed out.
    fn take_reply_target(&self) -> Option<SurfaceId> {
        let slot = self.inner.routing.lock().in_flight.pop_front()?;
        if slot.expired {
            tracing::debug!(surface = %slot.surface, "reply for timed-out request dropped");
            return None;
        }
        Some(slot.surface)
    }

    // ========================================================================
    // Suggestions and rollback
    // ========================================================================

    pub fn apply_suggestion(
        &self,
        surface: SurfaceId,
        body: &str,
        suggestion: &str,
    ) -> Result<AppliedSuggestion, EngineError> {
        let applied = self
            .inner
            .registry
            .with_session(surface, |s| s.apply_suggestion(body, suggestion))
            .ok_or(EngineError::UnknownSurface(surface))?
            .ok_or(EngineError::NoSentence)?;
        let _ = self.inner.events.send(EngineEvent::Applied {
            surface,
            entry: applied.entry_id,
        });
        Ok(applied)
    }

    pub fn rollback(
        &self,
        surface: SurfaceId,
        body: &str,
        entry: EntryId,
    ) -> Result<RollbackOutcome, EngineError> {
        let outcome = self
            .inner
            .registry
            .with_session(surface, |s| s.rollback(body, entry))
            .ok_or(EngineError::UnknownSurface(surface))??;
        let _ = self.inner.events.send(EngineEvent::RolledBack {
            surface,
            entry: outcome.entry.id,
            matched: outcome.matched,
        });
        Ok(outcome)
    }

    pub fn quick_undo(&self, surface: SurfaceId, body: &str) -> Result<RollbackOutcome, EngineError> {
        let outcome = self
            .inner
            .registry
            .with_session(surface, |s| s.quick_undo(body))
            .ok_or(EngineError::UnknownSurface(surface))??;
        let _ = self.inner.events.send(EngineEvent::RolledBack {
            surface,
            entry: outcome.entry.id,
            matched: outcome.matched,
        });
        Ok(outcome)
    }

    /// Rollback entries, most recent first.
    pub fn history(&self, surface: SurfaceId) -> Result<Vec<RollbackEntry>, EngineError> {
        self.inner
            .registry
            .with_session(surface, |s| s.history().iter_recent_first().cloned().collect())
            .ok_or(EngineError::UnknownSurface(surface))
    }

    pub fn has_history(&self, surface: SurfaceId) -> Result<bool, EngineError> {
        self.inner
            .registry
            .with_session(surface, |s| s.has_history())
            .ok_or(EngineError::UnknownSurface(surface))
    }

    /// The surface's current suggestion buffer, if any.
    pub fn last_result(&self, surface: SurfaceId) -> Result<Option<AnalysisResult>, EngineError> {
        self.inner
            .registry
            .with_session(surface, |s| s.last_result().cloned())
            .ok_or(EngineError::UnknownSurface(surface))
    }
}

// ============================================================================
// Tests
// ============================================================================
