use crate::game::{GameConfig, GameEngine, GameEvent, GameState, ScheduledTimer, TimerKind};
use crate::store::{
    BestScoresMap, KeyValueStore, clear_session, load_best_scores, load_session, save_best_scores,
    save_session, update_best_scores,
};

/// Time source for the session. The engine itself never reads a clock;
/// everything time-dependent flows through this trait so tests can drive
/// it by hand.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A scheduled engine timer with its absolute deadline.
#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    kind: TimerKind,
    fire_at_ms: u64,
}

/// Owns a [`GameEngine`] together with its impure collaborators: the
/// key/value store, the clock, and the list of pending delayed
/// transitions. Every entry point fires due timers first, then syncs
/// persistence, so callers only ever observe settled states.
pub struct GameSession<S: KeyValueStore, C: Clock> {
    engine: GameEngine,
    store: S,
    clock: C,
    pending: Vec<PendingTimer>,
    best_scores: BestScoresMap,
    scores_recorded: bool,
}

impl<S: KeyValueStore, C: Clock> GameSession<S, C> {
    /// Opens a session, resuming a persisted game when the store holds a
    /// snapshot the engine accepts for this configuration.
    pub fn new(config: GameConfig, mut store: S, clock: C) -> Self {
        let now = clock.now_ms();
        let snapshot = load_session(&store);
        let engine = GameEngine::new(config, snapshot.as_ref(), now);
        let best_scores = load_best_scores(&mut store);
        let mut session = GameSession {
            engine,
            store,
            clock,
            pending: Vec::new(),
            best_scores,
            scores_recorded: false,
        };
        session.sync(now);
        session
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn best_scores(&self) -> &BestScoresMap {
        &self.best_scores
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Elapsed play time as of this instant.
    pub fn elapsed_ms(&self) -> u64 {
        self.engine.elapsed_ms(self.clock.now_ms())
    }

    /// Earliest pending timer deadline, for callers that schedule wakeups.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.pending.iter().map(|t| t.fire_at_ms).min()
    }

    /// Sends one event to the engine, after settling any timers that have
    /// already come due.
    pub fn send(&mut self, event: GameEvent) {
        let now = self.clock.now_ms();
        self.fire_due(now);
        let armed = self.engine.handle_event(event, now);
        self.arm(armed, now);
        self.sync(now);
    }

    /// Fires due timers without sending an event. Callers invoke this
    /// when a deadline from [`next_deadline_ms`] passes, or before
    /// rendering state.
    ///
    /// [`next_deadline_ms`]: GameSession::next_deadline_ms
    pub fn poll(&mut self) {
        let now = self.clock.now_ms();
        self.fire_due(now);
        self.sync(now);
    }

    fn fire_due(&mut self, now: u64) {
        loop {
            self.drop_stale();
            let due = self
                .pending
                .iter()
                .enumerate()
                .filter(|(_, t)| t.fire_at_ms <= now)
                .min_by_key(|(_, t)| t.fire_at_ms)
                .map(|(i, _)| i);
            let Some(idx) = due else {
                break;
            };
            let timer = self.pending.remove(idx);
            let armed = self.engine.handle_timer(timer.kind, now);
            self.arm(armed, now);
        }
    }

    fn arm(&mut self, timers: Vec<ScheduledTimer>, now: u64) {
        for timer in timers {
            self.pending.push(PendingTimer {
                kind: timer.kind,
                fire_at_ms: now + timer.delay_ms,
            });
        }
        self.drop_stale();
    }

    /// A transition that leaves a timer's guarding state cancels it; the
    /// engine would ignore the stale firing anyway, but dropping it here
    /// keeps deadlines meaningful.
    fn drop_stale(&mut self) {
        let engine = &self.engine;
        self.pending.retain(|t| engine.timer_armed(t.kind));
    }

    fn sync(&mut self, now: u64) {
        self.record_scores(now);

        if self.engine.is_savable() {
            if let Some(snapshot) = self.engine.snapshot(now) {
                save_session(&mut self.store, &snapshot);
            }
        } else {
            match self.engine.state() {
                GameState::NotStarted
                | GameState::Restarting
                | GameState::Captured
                | GameState::Finished => clear_session(&mut self.store),
                // Mid-attack the knight stands on an unsafe square and
                // before the first move there is nothing worth saving;
                // leave whatever snapshot exists alone.
                GameState::Playing(_) => {}
            }
        }
    }

    fn record_scores(&mut self, now: u64) {
        if self.engine.state() != GameState::Finished {
            self.scores_recorded = false;
            return;
        }
        if self.scores_recorded {
            return;
        }
        self.scores_recorded = true;
        let ctx = self.engine.context();
        let elapsed = self.engine.elapsed_ms(now);
        if update_best_scores(
            &mut self.best_scores,
            ctx.queen_square,
            ctx.num_moves,
            elapsed,
        ) {
            save_best_scores(&mut self.store, &self.best_scores);
        }
    }
}
