use crate::board::{DEFAULT_QUEEN_SQUARE, QueenSquare};
use crate::game::SerializedGameState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage key for the in-progress session snapshot.
pub const GAME_STATE_KEY: &str = "v1.game_state";
/// Storage key for the current best-scores map.
pub const BEST_SCORES_KEY: &str = "v2.best_scores";
/// Legacy keyed best-scores map (moves + whole seconds).
pub const LEGACY_BEST_SCORES_KEY: &str = "v1.best_scores";
/// Legacy single-game best time in whole seconds.
pub const LEGACY_BEST_SECONDS_KEY: &str = "v1.best_seconds";
/// Legacy single-game best move count.
pub const LEGACY_BEST_NUM_MOVES_KEY: &str = "v1.best_num_moves";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read store file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Minimal string key/value storage, the shape the persistence layer
/// actually needs. Values are JSON text; schema validation happens at the
/// call sites so a corrupt value degrades to "nothing stored".
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Store backed by a single JSON file of key to value. Writes are
/// fire-and-forget: a failed flush is logged and play continues, since
/// losing a snapshot only costs a resumable session.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        Ok(FileStore { path, entries })
    }

    fn flush(&self) {
        let json = match serde_json::to_string_pretty(&self.entries) {
            Ok(json) => json,
            Err(err) => {
                eprintln!("store flush failed to encode {}: {}", self.path.display(), err);
                return;
            }
        };
        if let Err(err) = fs::write(&self.path, json) {
            eprintln!("store flush failed to write {}: {}", self.path.display(), err);
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush();
    }

    fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.flush();
        }
    }
}

/// Best result recorded for one queen placement. Both metrics must be
/// positive; a stored map containing anything else is discarded whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestScores {
    pub best_num_moves: u32,
    pub best_elapsed_ms: u64,
}

pub type BestScoresMap = BTreeMap<QueenSquare, BestScores>;

/// Pre-millisecond schema of the legacy keyed map.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyBestScores {
    best_moves: u32,
    best_seconds: u64,
}

/// Loads the best-scores map, running legacy-format migrations first.
/// Anything that fails the schema or the positivity rule yields an empty
/// map rather than a partial one.
pub fn load_best_scores(store: &mut impl KeyValueStore) -> BestScoresMap {
    migrate_legacy_scores(store);
    store
        .get(BEST_SCORES_KEY)
        .and_then(|raw| serde_json::from_str::<BestScoresMap>(&raw).ok())
        .filter(|map| {
            map.values()
                .all(|s| s.best_num_moves > 0 && s.best_elapsed_ms > 0)
        })
        .unwrap_or_default()
}

pub fn save_best_scores(store: &mut impl KeyValueStore, scores: &BestScoresMap) {
    match serde_json::to_string(scores) {
        Ok(json) => store.set(BEST_SCORES_KEY, &json),
        Err(err) => eprintln!("failed to encode best scores: {err}"),
    }
}

/// Records a finished game. Each metric improves independently and only
/// strictly, so a slower game with fewer moves still counts for moves.
/// Returns whether anything changed.
pub fn update_best_scores(
    scores: &mut BestScoresMap,
    queen_square: QueenSquare,
    num_moves: u32,
    elapsed_ms: u64,
) -> bool {
    match scores.get_mut(&queen_square) {
        None => {
            scores.insert(
                queen_square,
                BestScores {
                    best_num_moves: num_moves,
                    best_elapsed_ms: elapsed_ms,
                },
            );
            true
        }
        Some(best) => {
            let mut changed = false;
            if num_moves < best.best_num_moves {
                best.best_num_moves = num_moves;
                changed = true;
            }
            if elapsed_ms < best.best_elapsed_ms {
                best.best_elapsed_ms = elapsed_ms;
                changed = true;
            }
            changed
        }
    }
}

/// Upgrades stored scores from the two retired formats. Runs before
/// every load and is a no-op once the legacy keys are gone.
fn migrate_legacy_scores(store: &mut impl KeyValueStore) {
    // Single-global numbers, recorded before the queen square was
    // configurable. They describe the default placement.
    let legacy_moves = store
        .get(LEGACY_BEST_NUM_MOVES_KEY)
        .and_then(|raw| serde_json::from_str::<u32>(&raw).ok());
    let legacy_seconds = store
        .get(LEGACY_BEST_SECONDS_KEY)
        .and_then(|raw| serde_json::from_str::<u64>(&raw).ok());
    if let (Some(moves), Some(seconds)) = (legacy_moves, legacy_seconds) {
        if moves > 0 && seconds > 0 {
            let mut map = BestScoresMap::new();
            map.insert(
                DEFAULT_QUEEN_SQUARE,
                BestScores {
                    best_num_moves: moves,
                    best_elapsed_ms: seconds * 1_000,
                },
            );
            save_best_scores(store, &map);
        }
        store.remove(LEGACY_BEST_NUM_MOVES_KEY);
        store.remove(LEGACY_BEST_SECONDS_KEY);
    }

    // Keyed map with whole-second resolution.
    if let Some(raw) = store.get(LEGACY_BEST_SCORES_KEY) {
        if let Ok(legacy) = serde_json::from_str::<BTreeMap<QueenSquare, LegacyBestScores>>(&raw) {
            let map: BestScoresMap = legacy
                .into_iter()
                .map(|(queen, s)| {
                    (
                        queen,
                        BestScores {
                            best_num_moves: s.best_moves,
                            best_elapsed_ms: s.best_seconds * 1_000,
                        },
                    )
                })
                .collect();
            save_best_scores(store, &map);
        }
        store.remove(LEGACY_BEST_SCORES_KEY);
    }
}

/// Loads the persisted session snapshot, if one is stored and well-formed.
pub fn load_session(store: &impl KeyValueStore) -> Option<SerializedGameState> {
    let raw = store.get(GAME_STATE_KEY)?;
    serde_json::from_str(&raw).ok()
}

pub fn save_session(store: &mut impl KeyValueStore, snapshot: &SerializedGameState) {
    match serde_json::to_string(snapshot) {
        Ok(json) => store.set(GAME_STATE_KEY, &json),
        Err(err) => eprintln!("failed to encode session snapshot: {err}"),
    }
}

pub fn clear_session(store: &mut impl KeyValueStore) {
    store.remove(GAME_STATE_KEY);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Square;
    use rand::Rng;

    fn queen(name: &str) -> QueenSquare {
        name.parse().unwrap()
    }

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    #[test]
    fn test_empty_store_yields_empty_scores() {
        let mut store = MemoryStore::new();
        assert!(load_best_scores(&mut store).is_empty());
    }

    #[test]
    fn test_scores_round_trip() {
        let mut store = MemoryStore::new();
        let mut scores = BestScoresMap::new();
        update_best_scores(&mut scores, queen("d5"), 80, 120_000);
        update_best_scores(&mut scores, queen("e4"), 95, 240_000);
        save_best_scores(&mut store, &scores);
        assert_eq!(load_best_scores(&mut store), scores);
    }

    #[test]
    fn test_update_is_strict_and_per_metric() {
        let mut scores = BestScoresMap::new();
        assert!(update_best_scores(&mut scores, queen("d5"), 80, 120_000));

        // Equal values never overwrite.
        assert!(!update_best_scores(&mut scores, queen("d5"), 80, 120_000));

        // Fewer moves but slower: only the move count improves.
        assert!(update_best_scores(&mut scores, queen("d5"), 70, 500_000));
        assert_eq!(
            scores[&queen("d5")],
            BestScores {
                best_num_moves: 70,
                best_elapsed_ms: 120_000
            }
        );

        // Faster but more moves: only the time improves.
        assert!(update_best_scores(&mut scores, queen("d5"), 99, 90_000));
        assert_eq!(
            scores[&queen("d5")],
            BestScores {
                best_num_moves: 70,
                best_elapsed_ms: 90_000
            }
        );

        // Other queen squares are independent.
        assert!(update_best_scores(&mut scores, queen("e2"), 200, 999_000));
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn test_corrupt_or_nonpositive_map_is_discarded_whole() {
        let mut store = MemoryStore::new();
        store.set(BEST_SCORES_KEY, "not json at all");
        assert!(load_best_scores(&mut store).is_empty());

        // One bad entry poisons the whole map.
        store.set(
            BEST_SCORES_KEY,
            r#"{"d5":{"bestNumMoves":80,"bestElapsedMs":120000},"e4":{"bestNumMoves":0,"bestElapsedMs":5000}}"#,
        );
        assert!(load_best_scores(&mut store).is_empty());

        // A key outside the queen-square universe fails deserialization.
        store.set(
            BEST_SCORES_KEY,
            r#"{"a5":{"bestNumMoves":80,"bestElapsedMs":120000}}"#,
        );
        assert!(load_best_scores(&mut store).is_empty());
    }

    #[test]
    fn test_migrates_single_global_scores() {
        let mut store = MemoryStore::new();
        store.set(LEGACY_BEST_NUM_MOVES_KEY, "85");
        store.set(LEGACY_BEST_SECONDS_KEY, "150");

        let scores = load_best_scores(&mut store);
        assert_eq!(
            scores[&DEFAULT_QUEEN_SQUARE],
            BestScores {
                best_num_moves: 85,
                best_elapsed_ms: 150_000
            }
        );
        assert_eq!(store.get(LEGACY_BEST_NUM_MOVES_KEY), None);
        assert_eq!(store.get(LEGACY_BEST_SECONDS_KEY), None);

        // Idempotent: a second load sees the migrated map.
        assert_eq!(load_best_scores(&mut store), scores);
    }

    #[test]
    fn test_migrates_legacy_keyed_map() {
        let mut store = MemoryStore::new();
        store.set(
            LEGACY_BEST_SCORES_KEY,
            r#"{"d5":{"bestMoves":85,"bestSeconds":150},"e2":{"bestMoves":110,"bestSeconds":300}}"#,
        );

        let scores = load_best_scores(&mut store);
        assert_eq!(
            scores[&queen("d5")],
            BestScores {
                best_num_moves: 85,
                best_elapsed_ms: 150_000
            }
        );
        assert_eq!(
            scores[&queen("e2")],
            BestScores {
                best_num_moves: 110,
                best_elapsed_ms: 300_000
            }
        );
        assert_eq!(store.get(LEGACY_BEST_SCORES_KEY), None);
    }

    #[test]
    fn test_invalid_legacy_values_are_dropped_not_migrated() {
        let mut store = MemoryStore::new();
        store.set(LEGACY_BEST_NUM_MOVES_KEY, "0");
        store.set(LEGACY_BEST_SECONDS_KEY, "150");
        assert!(load_best_scores(&mut store).is_empty());
        assert_eq!(store.get(LEGACY_BEST_NUM_MOVES_KEY), None);

        store.set(LEGACY_BEST_SCORES_KEY, "{\"d5\":\"garbage\"}");
        assert!(load_best_scores(&mut store).is_empty());
        assert_eq!(store.get(LEGACY_BEST_SCORES_KEY), None);
    }

    #[test]
    fn test_session_snapshot_round_trip() {
        let mut store = MemoryStore::new();
        assert_eq!(load_session(&store), None);

        let snap = SerializedGameState {
            queen_square: queen("d5"),
            knight_square: sq("g6"),
            target_square: sq("e8"),
            num_moves: 12,
            previously_elapsed_ms: 45_000,
        };
        save_session(&mut store, &snap);
        assert_eq!(load_session(&store), Some(snap.clone()));

        clear_session(&mut store);
        assert_eq!(load_session(&store), None);
    }

    #[test]
    fn test_corrupt_session_reads_as_absent() {
        let mut store = MemoryStore::new();
        store.set(GAME_STATE_KEY, r#"{"queenSquare":"d5"}"#);
        assert_eq!(load_session(&store), None);
    }

    #[test]
    fn test_file_store_persists_across_reopens() {
        let path = std::env::temp_dir().join(format!(
            "knight-gauntlet-store-{}-{}.json",
            std::process::id(),
            rand::thread_rng().r#gen::<u32>()
        ));

        {
            let mut store = FileStore::open(&path).unwrap();
            assert_eq!(store.get("missing"), None);
            store.set(GAME_STATE_KEY, "\"value\"");
            store.set("other", "1");
            store.remove("other");
        }
        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.get(GAME_STATE_KEY), Some("\"value\"".to_string()));
            assert_eq!(store.get("other"), None);
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let path = std::env::temp_dir().join(format!(
            "knight-gauntlet-corrupt-{}-{}.json",
            std::process::id(),
            rand::thread_rng().r#gen::<u32>()
        ));
        std::fs::write(&path, "{{{").unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Parse { .. })
        ));
        let _ = std::fs::remove_file(&path);
    }
}
