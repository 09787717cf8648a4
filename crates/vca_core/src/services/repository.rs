//! Video and analysis repository with JSON persistence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AnalysisRecord, LabelCount, Statistics, VideoRecord};

/// Errors from repository operations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Failed to read database {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write database {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Database {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize database: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persistent store of video info and analysis history.
///
/// Implementations are shared between runs and must synchronize internally.
pub trait VideoRepository: Send + Sync {
    /// Insert or replace the stored info for a video.
    fn save_video_info(&self, record: &VideoRecord) -> RepositoryResult<()>;

    fn get_video_info(&self, video_id: &str) -> RepositoryResult<Option<VideoRecord>>;

    /// Append an analysis to the video's history.
    fn save_analysis(&self, record: &AnalysisRecord) -> RepositoryResult<()>;

    /// Most recent analysis of a video, if any.
    fn get_latest_analysis(&self, video_id: &str) -> RepositoryResult<Option<AnalysisRecord>>;

    /// All analyses of a video, oldest first.
    fn get_all_analyses(&self, video_id: &str) -> RepositoryResult<Vec<AnalysisRecord>>;

    /// Latest analyses whose genre matches (case-insensitive).
    fn search_by_genre(&self, genre: &str) -> RepositoryResult<Vec<AnalysisRecord>>;

    /// Latest analyses carrying any of the tags, one per video.
    fn search_by_tags(&self, tags: &[String]) -> RepositoryResult<Vec<AnalysisRecord>>;

    fn get_statistics(&self) -> RepositoryResult<Statistics>;
}

/// Database file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatabaseState {
    version: u32,
    #[serde(default)]
    videos: BTreeMap<String, VideoRecord>,
    #[serde(default)]
    analyses: Vec<AnalysisRecord>,
}

impl Default for DatabaseState {
    fn default() -> Self {
        Self {
            version: 1,
            videos: BTreeMap::new(),
            analyses: Vec::new(),
        }
    }
}

impl DatabaseState {
    /// Latest analysis per video, in video id order.
    fn latest_per_video(&self) -> Vec<&AnalysisRecord> {
        let mut latest: BTreeMap<&str, &AnalysisRecord> = BTreeMap::new();
        for record in &self.analyses {
            let newer = latest
                .get(record.video_id.as_str())
                .map_or(true, |existing| record.analysis_date >= existing.analysis_date);
            if newer {
                latest.insert(record.video_id.as_str(), record);
            }
        }
        latest.into_values().collect()
    }
}

/// JSON-file-backed repository.
///
/// Every mutation rewrites the file atomically and only becomes visible once
/// the write succeeds. Use [`VideoDatabase::in_memory`]
/// for a store without persistence.
#[derive(Debug)]
pub struct VideoDatabase {
    path: Option<PathBuf>,
    state: Mutex<DatabaseState>,
}

impl VideoDatabase {
    /// Open (or start) a database file.
    pub fn open(path: impl Into<PathBuf>) -> RepositoryResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| RepositoryError::Read {
                path: path.clone(),
                source,
            })?;
            let state: DatabaseState =
                serde_json::from_str(&content).map_err(|source| RepositoryError::Corrupt {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(
                "Loaded {} videos and {} analyses from {}",
                state.videos.len(),
                state.analyses.len(),
                path.display()
            );
            state
        } else {
            DatabaseState::default()
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(DatabaseState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, state: &DatabaseState) -> RepositoryResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let write_err = |source: io::Error| RepositoryError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;

        let temp_file = path.with_extension("json.tmp");
        fs::write(&temp_file, json).map_err(write_err)?;
        fs::rename(&temp_file, path).map_err(write_err)?;

        tracing::debug!("Saved database to {}", path.display());
        Ok(())
    }
}

impl VideoRepository for VideoDatabase {
    fn save_video_info(&self, record: &VideoRecord) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        let mut candidate = state.clone();
        candidate
            .videos
            .insert(record.video_id.clone(), record.clone());
        self.persist(&candidate)?;
        *state = candidate;
        Ok(())
    }

    fn get_video_info(&self, video_id: &str) -> RepositoryResult<Option<VideoRecord>> {
        Ok(self.state.lock().videos.get(video_id).cloned())
    }

    fn save_analysis(&self, record: &AnalysisRecord) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        let mut candidate = state.clone();
        candidate.analyses.push(record.clone());
        self.persist(&candidate)?;
        *state = candidate;
        Ok(())
    }

    fn get_latest_analysis(&self, video_id: &str) -> RepositoryResult<Option<AnalysisRecord>> {
        let state = self.state.lock();
        // Later entries win ties so a same-second reanalysis is returned
        let latest = state
            .analyses
            .iter()
            .filter(|a| a.video_id == video_id)
            .fold(None::<&AnalysisRecord>, |best, a| match best {
                Some(b) if b.analysis_date > a.analysis_date => Some(b),
                _ => Some(a),
            });
        Ok(latest.cloned())
    }

    fn get_all_analyses(&self, video_id: &str) -> RepositoryResult<Vec<AnalysisRecord>> {
        let state = self.state.lock();
        let mut analyses: Vec<AnalysisRecord> = state
            .analyses
            .iter()
            .filter(|a| a.video_id == video_id)
            .cloned()
            .collect();
        analyses.sort_by_key(|a| a.analysis_date);
        Ok(analyses)
    }

    fn search_by_genre(&self, genre: &str) -> RepositoryResult<Vec<AnalysisRecord>> {
        let state = self.state.lock();
        let genre = genre.trim().to_lowercase();
        Ok(state
            .latest_per_video()
            .into_iter()
            .filter(|a| a.genre.to_lowercase() == genre)
            .cloned()
            .collect())
    }

    fn search_by_tags(&self, tags: &[String]) -> RepositoryResult<Vec<AnalysisRecord>> {
        let wanted: HashSet<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.lock();
        Ok(state
            .latest_per_video()
            .into_iter()
            .filter(|a| a.tags.iter().any(|t| wanted.contains(&t.to_lowercase())))
            .cloned()
            .collect())
    }

    fn get_statistics(&self) -> RepositoryResult<Statistics> {
        let state = self.state.lock();

        let latest = state.latest_per_video();

        let mut genres: HashMap<String, usize> = HashMap::new();
        let mut tags: HashMap<String, usize> = HashMap::new();
        for analysis in &latest {
            let genre = if analysis.genre.is_empty() {
                "Unclassified".to_string()
            } else {
                analysis.genre.clone()
            };
            *genres.entry(genre).or_default() += 1;
            for tag in &analysis.tags {
                *tags.entry(tag.clone()).or_default() += 1;
            }
        }

        let mut platforms: HashMap<String, usize> = HashMap::new();
        for video in state.videos.values() {
            *platforms
                .entry(video.platform.as_str().to_string())
                .or_default() += 1;
        }

        let mut popular_tags = ranked(tags);
        popular_tags.truncate(10);

        Ok(Statistics {
            total_videos: state.videos.len(),
            total_analyses: state.analyses.len(),
            genres: ranked(genres),
            platforms: ranked(platforms),
            popular_tags,
        })
    }
}

/// Sort counts descending, then by label for a stable order.
fn ranked(counts: HashMap<String, usize>) -> Vec<LabelCount> {
    let mut list: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    list.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisResult, Platform, VideoMetadata};
    use chrono::{Duration, Local};
    use tempfile::tempdir;

    fn video(id: &str, platform: Platform) -> VideoRecord {
        let meta = VideoMetadata::new(id, format!("Video {}", id), format!("https://x/{}", id), platform);
        VideoRecord::from_metadata(&meta.url, &meta)
    }

    fn analysis(id: &str, genre: &str, tags: &[&str]) -> AnalysisRecord {
        let result = AnalysisResult {
            genre: genre.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        };
        AnalysisRecord::from_result(id, &result, vec![], "openai:gpt-4o")
    }

    #[test]
    fn latest_analysis_wins() {
        let db = VideoDatabase::in_memory();
        let mut older = analysis("a", "Vlog", &[]);
        older.analysis_date = Local::now() - Duration::hours(1);
        db.save_analysis(&analysis("a", "Documentary", &[])).unwrap();
        db.save_analysis(&older).unwrap();

        let latest = db.get_latest_analysis("a").unwrap().unwrap();
        assert_eq!(latest.genre, "Documentary");

        let history = db.get_all_analyses("a").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].genre, "Vlog");

        assert!(db.get_latest_analysis("missing").unwrap().is_none());
    }

    #[test]
    fn search_by_tags_matches_any_once_per_video() {
        let db = VideoDatabase::in_memory();
        db.save_analysis(&analysis("a", "Vlog", &["travel", "food"]))
            .unwrap();
        db.save_analysis(&analysis("b", "Music Video", &["Concert"]))
            .unwrap();
        db.save_analysis(&analysis("c", "Tutorial", &["code"]))
            .unwrap();

        let found = db
            .search_by_tags(&["food".to_string(), "travel".to_string(), "concert".to_string()])
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|a| a.video_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(db.search_by_tags(&[]).unwrap().is_empty());
    }

    #[test]
    fn search_by_genre_is_case_insensitive() {
        let db = VideoDatabase::in_memory();
        db.save_analysis(&analysis("a", "Vlog", &[])).unwrap();
        db.save_analysis(&analysis("b", "Tutorial", &[])).unwrap();

        let found = db.search_by_genre("vlog").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].video_id, "a");
    }

    #[test]
    fn statistics_count_videos_genres_and_tags() {
        let db = VideoDatabase::in_memory();
        db.save_video_info(&video("a", Platform::Youtube)).unwrap();
        db.save_video_info(&video("b", Platform::Youtube)).unwrap();
        db.save_video_info(&video("c", Platform::Vimeo)).unwrap();
        db.save_analysis(&analysis("a", "Vlog", &["travel", "city"]))
            .unwrap();
        db.save_analysis(&analysis("b", "Vlog", &["travel"])).unwrap();

        let stats = db.get_statistics().unwrap();
        assert_eq!(stats.total_videos, 3);
        assert_eq!(stats.total_analyses, 2);
        assert_eq!(
            stats.genres,
            vec![LabelCount {
                label: "Vlog".to_string(),
                count: 2
            }]
        );
        assert_eq!(stats.platforms[0].label, "youtube");
        assert_eq!(stats.platforms[0].count, 2);
        assert_eq!(stats.popular_tags[0].label, "travel");
    }

    #[test]
    fn popular_tags_capped_at_ten() {
        let db = VideoDatabase::in_memory();
        let tags: Vec<String> = (0..15).map(|i| format!("tag{:02}", i)).collect();
        let refs: Vec<&str> = tags.iter().map(String::as_str).collect();
        db.save_analysis(&analysis("a", "Vlog", &refs)).unwrap();

        assert_eq!(db.get_statistics().unwrap().popular_tags.len(), 10);
    }

    #[test]
    fn file_database_persists_between_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db").join("videos.json");

        {
            let db = VideoDatabase::open(&path).unwrap();
            db.save_video_info(&video("a", Platform::Vimeo)).unwrap();
            db.save_analysis(&analysis("a", "Vlog", &["x"])).unwrap();
        }

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let db = VideoDatabase::open(&path).unwrap();
        assert_eq!(db.get_video_info("a").unwrap().unwrap().platform, Platform::Vimeo);
        assert_eq!(db.get_latest_analysis("a").unwrap().unwrap().genre, "Vlog");
    }

    #[test]
    fn failed_write_leaves_state_unchanged() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "file").unwrap();
        let db = VideoDatabase::open(blocker.join("videos.json")).unwrap();

        let saved = db.save_analysis(&analysis("a", "Vlog", &[]));
        assert!(matches!(saved, Err(RepositoryError::Write { .. })));
        assert!(db.get_latest_analysis("a").unwrap().is_none());

        assert!(db.save_video_info(&video("a", Platform::Youtube)).is_err());
        assert!(db.get_video_info("a").unwrap().is_none());
        assert_eq!(db.get_statistics().unwrap().total_analyses, 0);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("videos.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            VideoDatabase::open(&path),
            Err(RepositoryError::Corrupt { .. })
        ));
    }
}
