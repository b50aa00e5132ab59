use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tower_http::services::ServeDir;

use crate::board::{KnightDestOptions, QueenSquare, Square, get_knight_dests, get_puzzle_fen};
use crate::game::{GameConfig, GameEvent, GameState, PlayingState};
use crate::session::{GameSession, SystemClock};
use crate::store::{BestScoresMap, FileStore};

#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<GameSession<FileStore, SystemClock>>>,
}

impl AppState {
    pub fn new(store: FileStore) -> Self {
        let session = GameSession::new(GameConfig::default(), store, SystemClock);
        AppState {
            session: Arc::new(Mutex::new(session)),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateResponse {
    state: String,
    queen_square: QueenSquare,
    knight_square: Square,
    previous_knight_square: Option<Square>,
    target_square: Option<Square>,
    final_target_square: Square,
    visited_squares: Vec<Square>,
    num_total_squares: u32,
    num_moves: u32,
    elapsed_ms: u64,
    attack_ends_game: bool,
    /// Squares the knight may move to right now; empty unless moving.
    legal_dests: Vec<Square>,
    fen: Option<String>,
    best_scores: BestScoresMap,
}

#[derive(Serialize)]
pub struct MoveOutcome {
    moved: bool,
    #[serde(flatten)]
    state: GameStateResponse,
}

#[derive(Deserialize)]
pub struct MoveRequest {
    square: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    queen_square: Option<String>,
    attack_ends_game: Option<bool>,
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": message
        })),
    )
        .into_response()
}

fn build_state(session: &GameSession<FileStore, SystemClock>) -> GameStateResponse {
    let engine = session.engine();
    let ctx = engine.context();
    let queen = ctx.queen_square.square();

    let legal_dests = if engine.state() == GameState::Playing(PlayingState::Moving) {
        get_knight_dests(
            ctx.knight_square,
            KnightDestOptions {
                queen_square: Some(queen),
                exclude_attacked_squares: false,
            },
        )
    } else {
        Vec::new()
    };

    GameStateResponse {
        state: engine.state().name().to_string(),
        queen_square: ctx.queen_square,
        knight_square: ctx.knight_square,
        previous_knight_square: ctx.previous_knight_square,
        target_square: ctx.target_square,
        final_target_square: ctx.final_target_square,
        visited_squares: ctx.visited_squares.clone(),
        num_total_squares: ctx.num_total_squares,
        num_moves: ctx.num_moves,
        elapsed_ms: session.elapsed_ms(),
        attack_ends_game: ctx.attack_ends_game,
        legal_dests,
        fen: get_puzzle_fen(ctx.knight_square, Some(queen)),
        best_scores: session.best_scores().clone(),
    }
}

#[axum::debug_handler]
async fn get_state(State(app_state): State<AppState>) -> Json<GameStateResponse> {
    let mut session = app_state.session.lock().unwrap();
    session.poll();
    Json(build_state(&session))
}

#[axum::debug_handler]
async fn start_game(State(app_state): State<AppState>) -> Json<GameStateResponse> {
    let mut session = app_state.session.lock().unwrap();
    session.send(GameEvent::Start);
    Json(build_state(&session))
}

#[axum::debug_handler]
async fn move_knight(State(app_state): State<AppState>, Json(req): Json<MoveRequest>) -> Response {
    let square: Square = match req.square.parse() {
        Ok(square) => square,
        Err(err) => return bad_request(format!("invalid square: {err}")),
    };

    let mut session = app_state.session.lock().unwrap();
    let moves_before = session.engine().context().num_moves;
    session.send(GameEvent::MoveKnight(square));
    let moved = session.engine().context().num_moves != moves_before;

    Json(MoveOutcome {
        moved,
        state: build_state(&session),
    })
    .into_response()
}

#[axum::debug_handler]
async fn pause_game(State(app_state): State<AppState>) -> Json<GameStateResponse> {
    let mut session = app_state.session.lock().unwrap();
    session.send(GameEvent::Pause);
    Json(build_state(&session))
}

#[axum::debug_handler]
async fn unpause_game(State(app_state): State<AppState>) -> Json<GameStateResponse> {
    let mut session = app_state.session.lock().unwrap();
    session.send(GameEvent::Unpause);
    Json(build_state(&session))
}

#[axum::debug_handler]
async fn update_settings(
    State(app_state): State<AppState>,
    Json(req): Json<SettingsRequest>,
) -> Response {
    let queen_square = match req.queen_square {
        Some(raw) => match raw.parse::<QueenSquare>() {
            Ok(queen) => Some(queen),
            Err(err) => return bad_request(format!("invalid queen square: {err}")),
        },
        None => None,
    };

    let mut session = app_state.session.lock().unwrap();
    if let Some(attack_ends_game) = req.attack_ends_game {
        session.send(GameEvent::SetAttackEndsGame(attack_ends_game));
    }
    if let Some(queen) = queen_square {
        session.send(GameEvent::SetQueenSquare(queen));
    }
    Json(build_state(&session)).into_response()
}

pub async fn run_server(store_path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(store_path)?;
    let app_state = AppState::new(store);

    let app = Router::new()
        .route("/api/state", get(get_state))
        .route("/api/start", post(start_game))
        .route("/api/move", post(move_knight))
        .route("/api/pause", post(pause_game))
        .route("/api/unpause", post(unpause_game))
        .route("/api/settings", post(update_settings))
        .nest_service("/", ServeDir::new("static"))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    println!("🌐 Web server running at http://127.0.0.1:3000");
    println!("   Open your browser and start playing!");

    axum::serve(listener, app).await?;
    Ok(())
}
