//! Score persistence.
//!
//! A [`ScoreBoard`] accumulates per-level records in memory; a [`ScoreStore`]
//! round-trips it through storage. Storage failures degrade to an empty
//! board rather than blocking play.

use crate::director::RunSummary;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Best results for one level/base id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelRecord {
    /// Highest score achieved
    pub best_score: u64,
    /// Deepest stage reached
    pub best_stage: u32,
    /// Longest combo
    pub best_combo: u32,
    /// Total completed runs
    pub attempts: u32,
    /// Unix millis of the most recent run
    pub last_played: i64,
}

/// All persisted records, keyed by level/base id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreBoard {
    /// Per-level records
    pub levels: HashMap<String, LevelRecord>,
}

impl ScoreBoard {
    /// Fold a run summary in. Returns true when it set a new best score.
    pub fn record_attempt(&mut self, summary: &RunSummary) -> bool {
        let record = self.levels.entry(summary.base_id.clone()).or_default();
        record.attempts += 1;
        record.last_played = summary.timestamp;
        record.best_stage = record.best_stage.max(summary.stage);
        record.best_combo = record.best_combo.max(summary.max_combo);
        if summary.score > record.best_score {
            record.best_score = summary.score;
            true
        } else {
            false
        }
    }

    /// Record for one level, if any runs were played on it.
    pub fn level(&self, base_id: &str) -> Option<&LevelRecord> {
        self.levels.get(base_id)
    }
}

/// Storage backend for the score board.
pub trait ScoreStore {
    /// Load the persisted board; an absent board is empty, not an error.
    fn load(&self) -> Result<ScoreBoard>;
    /// Persist the board.
    fn save(&self, board: &ScoreBoard) -> Result<()>;
}

/// JSON-file score store under the platform data directory.
pub struct JsonScoreStore {
    path: PathBuf,
}

impl JsonScoreStore {
    /// Store at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location, `<data dir>/hyperbeat/scores.json`.
    pub fn default_location() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| CoreError::Storage("no platform data directory".to_string()))?;
        Ok(Self::at(dir.join("hyperbeat").join("scores.json")))
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScoreStore for JsonScoreStore {
    fn load(&self) -> Result<ScoreBoard> {
        if !self.path.exists() {
            return Ok(ScoreBoard::default());
        }
        let text = fs::read_to_string(&self.path)
            .map_err(|e| CoreError::Storage(format!("read {}: {}", self.path.display(), e)))?;
        let board = serde_json::from_str(&text)
            .map_err(|e| CoreError::Storage(format!("parse {}: {}", self.path.display(), e)))?;
        debug!("Scores loaded from {}", self.path.display());
        Ok(board)
    }

    fn save(&self, board: &ScoreBoard) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CoreError::Storage(format!("mkdir {}: {}", parent.display(), e)))?;
        }
        let text = serde_json::to_string_pretty(board)
            .map_err(|e| CoreError::Storage(format!("serialize scores: {}", e)))?;
        fs::write(&self.path, text)
            .map_err(|e| CoreError::Storage(format!("write {}: {}", self.path.display(), e)))?;
        debug!("Scores saved to {}", self.path.display());
        Ok(())
    }
}

/// Load-merge-save one summary through a store. Storage errors are logged
/// and swallowed; the in-memory result is still returned.
pub fn persist_run(store: &dyn ScoreStore, summary: &RunSummary) -> ScoreBoard {
    let mut board = match store.load() {
        Ok(board) => board,
        Err(e) => {
            warn!("Score load failed, starting fresh: {}", e);
            ScoreBoard::default()
        }
    };
    let new_best = board.record_attempt(summary);
    if new_best {
        debug!("New best on '{}': {}", summary.base_id, summary.score);
    }
    if let Err(e) = store.save(&board) {
        warn!("Score save failed: {}", e);
    }
    board
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(base_id: &str, score: u64, stage: u32) -> RunSummary {
        RunSummary {
            base_id: base_id.to_string(),
            run_id: 1,
            stage,
            score,
            max_combo: 12,
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_record_attempt_tracks_bests() {
        let mut board = ScoreBoard::default();
        assert!(board.record_attempt(&summary("neon", 500, 3)));
        assert!(!board.record_attempt(&summary("neon", 300, 5)));

        let record = board.level("neon").unwrap();
        assert_eq!(record.best_score, 500);
        assert_eq!(record.best_stage, 5);
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonScoreStore::at(dir.path().join("scores.json"));

        // Missing file loads as empty
        assert!(store.load().unwrap().levels.is_empty());

        let mut board = ScoreBoard::default();
        board.record_attempt(&summary("neon", 900, 4));
        store.save(&board).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, board);
    }

    #[test]
    fn test_persist_run_survives_bad_store() {
        struct BrokenStore;
        impl ScoreStore for BrokenStore {
            fn load(&self) -> Result<ScoreBoard> {
                Err(CoreError::Storage("nope".to_string()))
            }
            fn save(&self, _: &ScoreBoard) -> Result<()> {
                Err(CoreError::Storage("nope".to_string()))
            }
        }

        let board = persist_run(&BrokenStore, &summary("neon", 100, 1));
        assert_eq!(board.level("neon").unwrap().best_score, 100);
    }

    #[test]
    fn test_corrupt_file_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonScoreStore::at(&path);
        assert!(store.load().is_err());
    }
}
