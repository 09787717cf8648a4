//! Scene frame extraction using ffmpeg.
//!
//! Scene changes are detected with ffmpeg's `scene` score and `showinfo`,
//! then one frame is grabbed at the midpoint of every scene long enough to
//! matter. The frames are then grouped perceptually into `grouped/`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::models::{Scene, SceneType};

use super::forward_output;
use super::grouping::{save_grouped, SceneGrouping};

/// Errors from scene extraction.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Video file not found: {0}")]
    MissingInput(PathBuf),

    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    #[error("Failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Extractor output: a flat list, or all scenes plus a grouped selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneExtraction {
    Flat(Vec<Scene>),
    Grouped { all: Vec<Scene>, grouped: Vec<Scene> },
}

impl SceneExtraction {
    pub fn total(&self) -> usize {
        match self {
            SceneExtraction::Flat(scenes) => scenes.len(),
            SceneExtraction::Grouped { all, .. } => all.len(),
        }
    }

    /// Split into (scenes to analyze, grouped scenes).
    ///
    /// A non-empty grouping is used as-is; otherwise the first `max_scenes`
    /// scenes are taken.
    pub fn select_for_analysis(self, max_scenes: usize) -> (Vec<Scene>, Vec<Scene>) {
        match self {
            SceneExtraction::Grouped { grouped, .. } if !grouped.is_empty() => {
                (grouped.clone(), grouped)
            }
            SceneExtraction::Grouped { mut all, .. } | SceneExtraction::Flat(mut all) => {
                all.truncate(max_scenes);
                (all, Vec::new())
            }
        }
    }
}

/// Extracts representative frames from a downloaded video.
///
/// Tool output lines go to `output` (the flag marks stderr).
pub trait SceneExtractor: Send + Sync {
    fn extract_scenes(
        &self,
        video_path: &Path,
        session_dir: &Path,
        short_form: bool,
        output: &dyn Fn(&str, bool),
    ) -> Result<SceneExtraction, SceneError>;
}

/// Detection tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDetectionParams {
    /// ffmpeg scene score threshold (0.0 - 1.0).
    pub threshold: f64,
    /// Scenes shorter than this (seconds) are dropped.
    pub min_scene_duration: f64,
    /// JPEG quality for `-q:v` (lower is better).
    pub quality: u32,
}

impl SceneDetectionParams {
    pub fn standard() -> Self {
        Self {
            threshold: 0.3,
            min_scene_duration: 0.5,
            quality: 2,
        }
    }

    /// More sensitive settings for short clips.
    pub fn short_form() -> Self {
        Self {
            threshold: 0.15,
            min_scene_duration: 0.2,
            quality: 2,
        }
    }
}

/// Extractor backed by the `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone)]
pub struct FfmpegSceneExtractor {
    ffmpeg: String,
    ffprobe: String,
    grouping: SceneGrouping,
}

impl FfmpegSceneExtractor {
    pub fn new() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            grouping: SceneGrouping::default(),
        }
    }

    /// Aim grouping at `count` representative scenes.
    pub fn with_target_scenes(mut self, count: usize) -> Self {
        self.grouping = self.grouping.with_target(count);
        self
    }

    /// Scene-change timestamps in seconds.
    fn detect_changes(
        &self,
        video_path: &Path,
        threshold: f64,
        output: &dyn Fn(&str, bool),
    ) -> Result<Vec<f64>, SceneError> {
        let filter = format!("select='gt(scene,{})',showinfo", threshold);
        tracing::debug!(
            "{} -i {} -filter:v {} -f null -",
            self.ffmpeg,
            video_path.display(),
            filter
        );

        let result = Command::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-nostats")
            .arg("-i")
            .arg(video_path)
            .args(["-filter:v", filter.as_str(), "-f", "null", "-"])
            .output()
            .map_err(|source| SceneError::Spawn {
                tool: self.ffmpeg.clone(),
                source,
            })?;

        forward_output(&result.stderr, true, output);
        let stderr = String::from_utf8_lossy(&result.stderr);
        if !result.status.success() {
            return Err(SceneError::CommandFailed {
                tool: self.ffmpeg.clone(),
                exit_code: result.status.code().unwrap_or(-1),
                message: stderr.lines().last().unwrap_or_default().to_string(),
            });
        }

        Ok(parse_showinfo_times(&stderr))
    }

    /// Container duration in seconds (0.0 when unknown).
    fn read_duration(&self, video_path: &Path, output: &dyn Fn(&str, bool)) -> f64 {
        let result = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(video_path)
            .output();

        match result {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
                .trim()
                .parse()
                .unwrap_or(0.0),
            Ok(out) => {
                forward_output(&out.stderr, true, output);
                tracing::warn!("ffprobe could not read duration");
                0.0
            }
            Err(e) => {
                tracing::warn!("Failed to run {}: {}", self.ffprobe, e);
                0.0
            }
        }
    }

    fn grab_frame(
        &self,
        video_path: &Path,
        at: f64,
        quality: u32,
        output_path: &Path,
        output: &dyn Fn(&str, bool),
    ) -> Result<(), SceneError> {
        let seek = format!("{:.3}", at);
        let quality = quality.to_string();
        let result = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-ss", seek.as_str()])
            .arg("-i")
            .arg(video_path)
            .args(["-frames:v", "1", "-q:v", quality.as_str(), "-y"])
            .arg(output_path)
            .output()
            .map_err(|source| SceneError::Spawn {
                tool: self.ffmpeg.clone(),
                source,
            })?;

        forward_output(&result.stderr, true, output);
        if !result.status.success() {
            return Err(SceneError::CommandFailed {
                tool: self.ffmpeg.clone(),
                exit_code: result.status.code().unwrap_or(-1),
                message: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FfmpegSceneExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneExtractor for FfmpegSceneExtractor {
    fn extract_scenes(
        &self,
        video_path: &Path,
        session_dir: &Path,
        short_form: bool,
        output: &dyn Fn(&str, bool),
    ) -> Result<SceneExtraction, SceneError> {
        if !video_path.is_file() {
            return Err(SceneError::MissingInput(video_path.to_path_buf()));
        }

        let params = if short_form {
            SceneDetectionParams::short_form()
        } else {
            SceneDetectionParams::standard()
        };

        let scenes_dir = session_dir.join("scenes");
        fs::create_dir_all(&scenes_dir).map_err(|source| SceneError::Io {
            path: scenes_dir.clone(),
            source,
        })?;

        let duration = self.read_duration(video_path, output);
        let changes = self.detect_changes(video_path, params.threshold, output)?;
        let midpoints = scene_midpoints(&changes, duration, params.min_scene_duration);

        tracing::info!(
            "Detected {} scene changes, extracting {} frames (threshold {:.2})",
            changes.len(),
            midpoints.len(),
            params.threshold
        );

        let mut scenes = Vec::with_capacity(midpoints.len());
        for (i, at) in midpoints.iter().enumerate() {
            let frame_path = scenes_dir.join(format!("scene_{:04}.jpg", i));
            match self.grab_frame(video_path, *at, params.quality, &frame_path, output) {
                Ok(()) if frame_path.is_file() => {
                    let mut scene = Scene::new(*at, frame_path);
                    scene.scene_type = SceneType::Mid;
                    scenes.push(scene);
                }
                Ok(()) => tracing::warn!("No frame written at {:.1}s", at),
                Err(e) => tracing::warn!("Frame extraction failed at {:.1}s: {}", at, e),
            }
        }

        let grouped = self.grouping.group(&scenes);
        let grouped = save_grouped(grouped, session_dir).map_err(|source| SceneError::Io {
            path: session_dir.join("grouped"),
            source,
        })?;

        Ok(SceneExtraction::Grouped {
            all: scenes,
            grouped,
        })
    }
}

/// Parse `pts_time:` values from ffmpeg showinfo output.
fn parse_showinfo_times(stderr: &str) -> Vec<f64> {
    stderr
        .lines()
        .filter_map(|line| {
            let rest = line.split("pts_time:").nth(1)?;
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
        .collect()
}

/// Midpoints of the scenes delimited by `changes`.
///
/// A scene starting at 0 is added when the first change is more than a
/// second in, and the video end closes the last scene.
fn scene_midpoints(changes: &[f64], duration: f64, min_scene_duration: f64) -> Vec<f64> {
    let mut bounds: Vec<f64> = Vec::with_capacity(changes.len() + 2);
    match changes.first() {
        Some(&first) if first > 1.0 => bounds.push(0.0),
        None => bounds.push(0.0),
        _ => {}
    }
    bounds.extend_from_slice(changes);

    if let Some(&last) = bounds.last() {
        if duration > 0.0 && last < duration - 1.0 {
            bounds.push(duration);
        }
    }

    // A single bound with a known length still yields one frame
    if bounds.len() == 1 && duration > 0.0 {
        return vec![duration / 2.0];
    }

    bounds
        .windows(2)
        .filter(|w| w[1] - w[0] >= min_scene_duration)
        .map(|w| (w[0] + w[1]) / 2.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(ts: f64) -> Scene {
        Scene::new(ts, format!("/tmp/scene_{}.jpg", ts))
    }

    #[test]
    fn parses_showinfo_lines() {
        let stderr = "\
[Parsed_showinfo_1 @ 0x55] n:   0 pts:  48048 pts_time:2.002   duration: 1001
[Parsed_showinfo_1 @ 0x55] n:   1 pts: 120120 pts_time:5.005 duration: 1001
frame=    2 fps=0.0 q=-0.0 size=N/A
[Parsed_showinfo_1 @ 0x55] n:   2 pts_time:bogus";
        assert_eq!(parse_showinfo_times(stderr), vec![2.002, 5.005]);
    }

    #[test]
    fn midpoints_add_start_and_end() {
        let mids = scene_midpoints(&[4.0, 10.0], 20.0, 0.5);
        assert_eq!(mids, vec![2.0, 7.0, 15.0]);
    }

    #[test]
    fn midpoints_drop_short_scenes() {
        let mids = scene_midpoints(&[0.5, 0.7, 6.0], 6.5, 0.5);
        // 0.5 -> 0.7 is too short; no end bound since 6.0 >= 6.5 - 1
        assert_eq!(mids.len(), 1);
        assert!((mids[0] - 3.35).abs() < 1e-9);
    }

    #[test]
    fn midpoints_without_changes_use_whole_video() {
        assert_eq!(scene_midpoints(&[], 30.0, 0.5), vec![15.0]);
        assert!(scene_midpoints(&[], 0.0, 0.5).is_empty());
    }

    #[test]
    fn selection_prefers_grouped() {
        let extraction = SceneExtraction::Grouped {
            all: (0..20).map(|i| scene(i as f64)).collect(),
            grouped: vec![scene(1.0), scene(7.0)],
        };
        let (selected, grouped) = extraction.select_for_analysis(10);
        assert_eq!(selected.len(), 2);
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn selection_caps_flat_scenes() {
        let flat = SceneExtraction::Flat((0..25).map(|i| scene(i as f64)).collect());
        assert_eq!(flat.total(), 25);
        let (selected, grouped) = flat.select_for_analysis(10);
        assert_eq!(selected.len(), 10);
        assert_eq!(selected[0].timestamp, 0.0);
        assert!(grouped.is_empty());

        let empty_group = SceneExtraction::Grouped {
            all: (0..3).map(|i| scene(i as f64)).collect(),
            grouped: Vec::new(),
        };
        assert_eq!(empty_group.select_for_analysis(10).0.len(), 3);
    }

    #[test]
    fn target_scenes_reach_grouping() {
        let extractor = FfmpegSceneExtractor::new().with_target_scenes(6);
        assert_eq!(extractor.grouping.target, 6);
        assert_eq!(FfmpegSceneExtractor::new().with_target_scenes(0).grouping.target, 1);
    }

    #[test]
    fn missing_video_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = FfmpegSceneExtractor::new().extract_scenes(
            &dir.path().join("missing.mp4"),
            dir.path(),
            false,
            &|_, _| {},
        );
        assert!(matches!(result, Err(SceneError::MissingInput(_))));
    }
}
