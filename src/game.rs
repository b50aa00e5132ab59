use crate::board::{
    DEFAULT_QUEEN_SQUARE, Direction, ENDING_KNIGHT_SQUARE, KnightDestOptions, QueenSquare, Square,
    STARTING_KNIGHT_SQUARE, attacked_by_queen, get_knight_dests, get_square_increment,
    increment_while, increment_while_attacked,
};
use serde::{Deserialize, Serialize};

/// Delay before a restart completes and play begins.
pub const RESTART_DELAY_MS: u64 = 50;

/// Delay before a queen attack resolves (spring back or capture).
pub const KNIGHT_ATTACK_DELAY_MS: u64 = 800;

/// How a landed-on attack will resolve once its delay elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackOutcome {
    /// The knight springs back to its previous square and play continues.
    ToReturn,
    /// The knight is captured and the game ends.
    ToBeCaptured,
}

/// Substates of active play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayingState {
    Moving,
    KnightAttacked(AttackOutcome),
    Paused,
}

/// The game's finite states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    NotStarted,
    Restarting,
    Playing(PlayingState),
    Captured,
    Finished,
}

impl GameState {
    /// Dotted state name, e.g. `"playing.knightAttacked.toReturn"`.
    pub fn name(&self) -> &'static str {
        match self {
            GameState::NotStarted => "notStarted",
            GameState::Restarting => "restarting",
            GameState::Playing(PlayingState::Moving) => "playing.moving",
            GameState::Playing(PlayingState::KnightAttacked(AttackOutcome::ToReturn)) => {
                "playing.knightAttacked.toReturn"
            }
            GameState::Playing(PlayingState::KnightAttacked(AttackOutcome::ToBeCaptured)) => {
                "playing.knightAttacked.toBeCaptured"
            }
            GameState::Playing(PlayingState::Paused) => "playing.paused",
            GameState::Captured => "captured",
            GameState::Finished => "finished",
        }
    }
}

/// Events the engine accepts. Events with no transition defined for the
/// current state are dropped, never errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    Start,
    MoveKnight(Square),
    Pause,
    Unpause,
    SetQueenSquare(QueenSquare),
    SetAttackEndsGame(bool),
}

/// Delayed automatic transitions. The engine never owns a clock; it hands
/// these descriptors to its caller, which fires them back through
/// [`GameEngine::handle_timer`] when due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Completes a restart and begins play.
    Restart,
    /// Resolves a pending queen attack.
    AttackResolution,
}

/// A timer the caller should schedule `delay_ms` from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTimer {
    pub kind: TimerKind,
    pub delay_ms: u64,
}

/// Everything the engine tracks about the puzzle in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct GameContext {
    /// Queen's fixed position for this puzzle instance.
    pub queen_square: QueenSquare,
    /// Knight's current position. Never equal to the queen's square.
    pub knight_square: Square,
    /// Square the knight occupied before the current one; populated only
    /// while a queen attack is being resolved.
    pub previous_knight_square: Option<Square>,
    /// Next square the knight must reach; `None` once the puzzle is done.
    pub target_square: Option<Square>,
    /// Last square in the visitation order; reaching it ends the puzzle.
    pub final_target_square: Square,
    /// Squares confirmed visited, in the order reached.
    pub visited_squares: Vec<Square>,
    /// How many squares the knight must visit in total.
    pub num_total_squares: u32,
    /// Accepted knight moves, whether or not they made progress.
    pub num_moves: u32,
    /// Wall-clock time play (re)started, shifted backward to account for
    /// previously accumulated play time.
    pub start_time_ms: Option<u64>,
    /// Set only while the clock is frozen (paused, captured, finished).
    pub end_time_ms: Option<u64>,
    /// Elapsed play time carried over from a restored session; consumed
    /// when play begins.
    pub previously_elapsed_ms: Option<u64>,
    /// Whether landing on an attacked square ends the game.
    pub attack_ends_game: bool,
}

/// Session snapshot, persisted so an in-progress game survives a page
/// close. Field names match the stored JSON schema; a value that fails
/// this schema is treated as no saved session at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedGameState {
    pub queen_square: QueenSquare,
    pub knight_square: Square,
    pub target_square: Square,
    pub num_moves: u32,
    pub previously_elapsed_ms: u64,
}

/// Static configuration for a puzzle instance.
#[derive(Debug, Clone, Copy)]
pub struct GameConfig {
    pub queen_square: QueenSquare,
    pub attack_ends_game: bool,
    /// Where the knight starts; adjusted to the nearest safe square in
    /// traversal order if the queen attacks it.
    pub starting_knight_square: Square,
    /// Where the tour ends; adjusted likewise.
    pub ending_knight_square: Square,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            queen_square: DEFAULT_QUEEN_SQUARE,
            attack_ends_game: false,
            starting_knight_square: STARTING_KNIGHT_SQUARE,
            ending_knight_square: ENDING_KNIGHT_SQUARE,
        }
    }
}

/// The puzzle state machine. All transitions take an explicit `now_ms`
/// timestamp and return any delayed transitions to schedule, so the
/// engine stays deterministic under test.
#[derive(Debug, Clone)]
pub struct GameEngine {
    config: GameConfig,
    state: GameState,
    context: GameContext,
}

impl GameEngine {
    /// Creates an engine, resuming from `snapshot` when it is present and
    /// consistent with the configured queen square. An inconsistent
    /// snapshot is ignored and the game starts fresh in `NotStarted`.
    pub fn new(config: GameConfig, snapshot: Option<&SerializedGameState>, now_ms: u64) -> Self {
        if let Some(snap) = snapshot {
            if snapshot_matches(&config, snap) {
                return Self::resume(config, snap, now_ms);
            }
        }
        GameEngine {
            state: GameState::NotStarted,
            context: fresh_context(&config),
            config,
        }
    }

    fn resume(config: GameConfig, snap: &SerializedGameState, now_ms: u64) -> Self {
        let mut context = fresh_context(&config);

        // Rebuild the visited list by walking the canonical traversal from
        // the safe starting square up to (excluding) the saved target.
        let start = safe_starting_square(&config, snap.queen_square);
        let mut visited = Vec::new();
        let mut square = start;
        while square != snap.target_square {
            visited.push(square);
            square = next_target_after(square, snap.queen_square);
        }

        context.knight_square = snap.knight_square;
        context.target_square = Some(snap.target_square);
        context.visited_squares = visited;
        context.num_moves = snap.num_moves;
        context.start_time_ms = Some(now_ms.saturating_sub(snap.previously_elapsed_ms));
        context.end_time_ms = None;

        GameEngine {
            config,
            state: GameState::Playing(PlayingState::Moving),
            context,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn context(&self) -> &GameContext {
        &self.context
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Elapsed play time. Derived, never stored as a running value, so it
    /// is exact no matter how often callers sample it.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        match (self.context.start_time_ms, self.context.end_time_ms) {
            (None, _) => 0,
            (Some(start), None) => now_ms.saturating_sub(start),
            (Some(start), Some(end)) => end.saturating_sub(start),
        }
    }

    /// Whether the current state should have a session snapshot on disk.
    /// The knight is guaranteed to stand on a safe square in these states.
    pub fn is_savable(&self) -> bool {
        matches!(
            self.state,
            GameState::Playing(PlayingState::Moving) | GameState::Playing(PlayingState::Paused)
        ) && self.context.num_moves >= 1
    }

    /// Snapshot of the current session, computed on demand. `None` when
    /// there is no target left to chase.
    pub fn snapshot(&self, now_ms: u64) -> Option<SerializedGameState> {
        let target_square = self.context.target_square?;
        Some(SerializedGameState {
            queen_square: self.context.queen_square,
            knight_square: self.context.knight_square,
            target_square,
            num_moves: self.context.num_moves,
            previously_elapsed_ms: self.elapsed_ms(now_ms),
        })
    }

    /// Processes one external event. Returns timers to schedule.
    pub fn handle_event(&mut self, event: GameEvent, now_ms: u64) -> Vec<ScheduledTimer> {
        match event {
            GameEvent::SetAttackEndsGame(value) => {
                self.context.attack_ends_game = value;
                Vec::new()
            }
            GameEvent::Start => match self.state {
                GameState::Restarting => Vec::new(),
                _ => {
                    self.exit_playing();
                    self.state = GameState::Restarting;
                    vec![ScheduledTimer {
                        kind: TimerKind::Restart,
                        delay_ms: RESTART_DELAY_MS,
                    }]
                }
            },
            GameEvent::SetQueenSquare(square) => self.handle_set_queen_square(square),
            GameEvent::MoveKnight(square) => self.handle_move_knight(square, now_ms),
            GameEvent::Pause => {
                if self.state == GameState::Playing(PlayingState::Moving) {
                    self.context.end_time_ms = Some(now_ms);
                    self.state = GameState::Playing(PlayingState::Paused);
                }
                Vec::new()
            }
            GameEvent::Unpause => {
                if self.state == GameState::Playing(PlayingState::Paused) {
                    let elapsed = self.elapsed_ms(now_ms);
                    self.context.start_time_ms = Some(now_ms.saturating_sub(elapsed));
                    self.context.end_time_ms = None;
                    self.state = GameState::Playing(PlayingState::Moving);
                }
                Vec::new()
            }
        }
    }

    /// Fires a previously scheduled timer. Stale timers (the state moved
    /// on before the delay elapsed) are no-ops.
    pub fn handle_timer(&mut self, kind: TimerKind, now_ms: u64) -> Vec<ScheduledTimer> {
        match (kind, self.state) {
            (TimerKind::Restart, GameState::Restarting) => {
                self.reset_knight();
                let carried = self.context.previously_elapsed_ms.take().unwrap_or(0);
                self.context.start_time_ms = Some(now_ms.saturating_sub(carried));
                self.context.end_time_ms = None;
                self.state = GameState::Playing(PlayingState::Moving);
            }
            (
                TimerKind::AttackResolution,
                GameState::Playing(PlayingState::KnightAttacked(AttackOutcome::ToReturn)),
            ) => {
                if let Some(previous) = self.context.previous_knight_square.take() {
                    self.context.knight_square = previous;
                }
                self.state = GameState::Playing(PlayingState::Moving);
            }
            (
                TimerKind::AttackResolution,
                GameState::Playing(PlayingState::KnightAttacked(AttackOutcome::ToBeCaptured)),
            ) => {
                self.context.previous_knight_square = None;
                self.context.end_time_ms = Some(now_ms);
                self.state = GameState::Captured;
            }
            _ => {}
        }
        Vec::new()
    }

    /// Whether a timer of this kind is still armed for the current state.
    /// Callers use this to drop pending timers the moment they go stale.
    pub fn timer_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Restart => self.state == GameState::Restarting,
            TimerKind::AttackResolution => matches!(
                self.state,
                GameState::Playing(PlayingState::KnightAttacked(_))
            ),
        }
    }

    fn handle_set_queen_square(&mut self, square: QueenSquare) -> Vec<ScheduledTimer> {
        if square == self.context.queen_square {
            return Vec::new();
        }
        match self.state {
            GameState::NotStarted => {
                self.apply_queen_change(square);
                Vec::new()
            }
            GameState::Captured | GameState::Finished => {
                self.apply_queen_change(square);
                self.state = GameState::NotStarted;
                Vec::new()
            }
            GameState::Playing(_) => {
                self.exit_playing();
                self.apply_queen_change(square);
                self.state = GameState::Restarting;
                vec![ScheduledTimer {
                    kind: TimerKind::Restart,
                    delay_ms: RESTART_DELAY_MS,
                }]
            }
            // No transition defined mid-restart; the pending restart picks
            // up the new queen square only once it is set again later.
            GameState::Restarting => Vec::new(),
        }
    }

    fn handle_move_knight(&mut self, square: Square, now_ms: u64) -> Vec<ScheduledTimer> {
        if self.state != GameState::Playing(PlayingState::Moving) {
            return Vec::new();
        }
        let queen = self.context.queen_square.square();
        let dests = get_knight_dests(
            self.context.knight_square,
            KnightDestOptions {
                queen_square: Some(queen),
                exclude_attacked_squares: false,
            },
        );
        if !dests.contains(&square) {
            return Vec::new();
        }

        let from = self.context.knight_square;
        self.context.knight_square = square;
        self.context.num_moves += 1;

        if Some(square) == self.context.target_square && square != self.context.final_target_square
        {
            // Reached the next (non-final) target; advance it.
            self.context.visited_squares.push(square);
            self.context.target_square = Some(next_target_after(square, self.context.queen_square));
        } else if attacked_by_queen(square, queen) {
            self.context.previous_knight_square = Some(from);
            let outcome = if self.context.attack_ends_game {
                AttackOutcome::ToBeCaptured
            } else {
                AttackOutcome::ToReturn
            };
            self.state = GameState::Playing(PlayingState::KnightAttacked(outcome));
            return vec![ScheduledTimer {
                kind: TimerKind::AttackResolution,
                delay_ms: KNIGHT_ATTACK_DELAY_MS,
            }];
        } else if Some(square) == self.context.target_square {
            // Reached the final target in order; puzzle solved.
            self.context.visited_squares.push(square);
            self.context.target_square = None;
            self.context.end_time_ms = Some(now_ms);
            self.state = GameState::Finished;
        }
        Vec::new()
    }

    fn apply_queen_change(&mut self, queen: QueenSquare) {
        self.context.queen_square = queen;
        let (final_target, num_total) = queen_placement(&self.config, queen);
        self.context.final_target_square = final_target;
        self.context.num_total_squares = num_total;
        self.reset_knight();
    }

    fn reset_knight(&mut self) {
        let queen = self.context.queen_square;
        let start = safe_starting_square(&self.config, queen);
        self.context.knight_square = start;
        self.context.previous_knight_square = None;
        self.context.target_square = Some(next_target_after(start, queen));
        self.context.visited_squares = vec![start];
        self.context.num_moves = 0;
        self.context.start_time_ms = None;
        self.context.end_time_ms = None;
    }

    fn exit_playing(&mut self) {
        if matches!(self.state, GameState::Playing(_)) {
            self.context.previous_knight_square = None;
        }
    }
}

fn fresh_context(config: &GameConfig) -> GameContext {
    let queen = config.queen_square;
    let (final_target, num_total) = queen_placement(config, queen);
    let start = safe_starting_square(config, queen);
    GameContext {
        queen_square: queen,
        knight_square: start,
        previous_knight_square: None,
        target_square: Some(next_target_after(start, queen)),
        final_target_square: final_target,
        visited_squares: vec![start],
        num_total_squares: num_total,
        num_moves: 0,
        start_time_ms: None,
        end_time_ms: None,
        previously_elapsed_ms: None,
        attack_ends_game: config.attack_ends_game,
    }
}

/// Starting square adjusted to the first safe square in traversal order.
fn safe_starting_square(config: &GameConfig, queen: QueenSquare) -> Square {
    increment_while_attacked(
        config.starting_knight_square,
        queen.square(),
        Direction::PreviousFile,
    )
}

/// Next safe square after `square` in the canonical decreasing traversal.
fn next_target_after(square: Square, queen: QueenSquare) -> Square {
    increment_while_attacked(
        get_square_increment(square, Direction::PreviousFile),
        queen.square(),
        Direction::PreviousFile,
    )
}

/// Final target square and total square count for a queen placement.
fn queen_placement(config: &GameConfig, queen: QueenSquare) -> (Square, u32) {
    let queen_sq = queen.square();
    let start = safe_starting_square(config, queen);
    let final_target = increment_while(
        config.ending_knight_square,
        |s| attacked_by_queen(s, queen_sq) || s == queen_sq || s == start,
        Direction::NextFile,
    );
    let mut num_total = 1u32;
    let mut square = start;
    while square != final_target {
        square = next_target_after(square, queen);
        num_total += 1;
    }
    (final_target, num_total)
}

fn snapshot_matches(config: &GameConfig, snap: &SerializedGameState) -> bool {
    let queen = config.queen_square;
    snap.queen_square == queen
        && snap.knight_square != queen.square()
        && snap.target_square != queen.square()
        && !attacked_by_queen(snap.knight_square, queen.square())
        && !attacked_by_queen(snap.target_square, queen.square())
}
