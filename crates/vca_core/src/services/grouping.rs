//! Perceptual grouping of extracted scene frames.
//!
//! Frames are hashed (DoubleGradient pHash) and clustered by Hamming
//! distance. Every multi-frame cluster contributes its most central frame,
//! single frames stand on their own, and the result is balanced toward a
//! target count with time-spread picks.

use std::fs;
use std::io;
use std::path::Path;

use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};

use crate::models::Scene;

/// Grouping tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneGrouping {
    /// At or below this many scenes no clustering is done.
    pub min_scenes: usize,
    /// Maximum Hamming distance for two frames to share a cluster.
    pub hash_threshold: u32,
    /// Number of scenes to aim for.
    pub target: usize,
    /// Hash side length (8 gives 64-bit hashes).
    pub hash_size: u32,
}

impl Default for SceneGrouping {
    fn default() -> Self {
        Self {
            min_scenes: 10,
            hash_threshold: 5,
            target: 10,
            hash_size: 8,
        }
    }
}

impl SceneGrouping {
    pub fn with_target(mut self, target: usize) -> Self {
        self.target = target.max(1);
        self
    }

    fn hasher(&self) -> Hasher {
        HasherConfig::new()
            .hash_alg(HashAlg::DoubleGradient)
            .hash_size(self.hash_size, self.hash_size)
            .to_hasher()
    }

    /// Pick representative scenes, sorted by timestamp.
    ///
    /// Frames that cannot be decoded are left out of clustering. When none
    /// can be decoded the first `target` scenes are returned.
    pub fn group(&self, scenes: &[Scene]) -> Vec<Scene> {
        if scenes.len() <= self.min_scenes {
            if scenes.len() < self.target {
                return scenes.to_vec();
            }
            return spread_by_time(scenes.to_vec(), self.target);
        }

        let hasher = self.hasher();
        let mut hashed: Vec<(&Scene, ImageHash)> = Vec::with_capacity(scenes.len());
        for scene in scenes {
            match image::open(&scene.frame_path) {
                Ok(img) => hashed.push((scene, hasher.hash_image(&img))),
                Err(e) => tracing::warn!(
                    "Skipping {} for grouping: {}",
                    scene.frame_path.display(),
                    e
                ),
            }
        }

        if hashed.is_empty() {
            return scenes.iter().take(self.target).cloned().collect();
        }

        let clusters = cluster(hashed.len(), self.hash_threshold, |a, b| {
            hashed[a].1.dist(&hashed[b].1)
        });

        let mut representatives = Vec::new();
        let mut loners = Vec::new();
        for members in &clusters {
            if members.len() == 1 {
                loners.push(members[0]);
            } else {
                representatives.push(medoid(members, |a, b| hashed[a].1.dist(&hashed[b].1)));
            }
        }

        let candidates: Vec<Scene> = hashed.iter().map(|(s, _)| (*s).clone()).collect();
        let mut selected = self.balance(&candidates, &representatives, &loners);
        selected.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        tracing::info!(
            "Grouped {} scenes into {} ({} clusters, {} distinct)",
            scenes.len(),
            selected.len(),
            representatives.len(),
            loners.len()
        );
        selected
    }

    /// Fit cluster representatives and loners to the target count.
    fn balance(&self, scenes: &[Scene], representatives: &[usize], loners: &[usize]) -> Vec<Scene> {
        let pick = |indices: &[usize]| -> Vec<Scene> {
            indices.iter().map(|&i| scenes[i].clone()).collect()
        };
        let current = representatives.len() + loners.len();

        if current < self.target {
            let unused: Vec<Scene> = (0..scenes.len())
                .filter(|i| !representatives.contains(i) && !loners.contains(i))
                .map(|i| scenes[i].clone())
                .collect();
            let mut result = pick(representatives);
            result.extend(pick(loners));
            result.extend(spread_by_time(unused, self.target - current));
            result
        } else if current > self.target {
            if representatives.len() >= self.target {
                spread_by_time(pick(representatives), self.target)
            } else {
                let slots = self.target - representatives.len();
                let mut result = pick(representatives);
                result.extend(spread_by_time(pick(loners), slots));
                result
            }
        } else {
            let mut result = pick(representatives);
            result.extend(pick(loners));
            result
        }
    }
}

/// Greedy clustering: each item joins the first cluster whose founder is
/// within `threshold`, or founds a new one.
fn cluster<F>(count: usize, threshold: u32, dist: F) -> Vec<Vec<usize>>
where
    F: Fn(usize, usize) -> u32,
{
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for i in 0..count {
        match clusters.iter_mut().find(|c| dist(c[0], i) <= threshold) {
            Some(members) => members.push(i),
            None => clusters.push(vec![i]),
        }
    }
    clusters
}

/// The member with the smallest total distance to the others.
fn medoid<F>(members: &[usize], dist: F) -> usize
where
    F: Fn(usize, usize) -> u32,
{
    members
        .iter()
        .copied()
        .min_by_key(|&a| members.iter().map(|&b| dist(a, b) as u64).sum::<u64>())
        .unwrap_or(members[0])
}

/// `count` scenes evenly spaced in time.
fn spread_by_time(mut scenes: Vec<Scene>, count: usize) -> Vec<Scene> {
    if scenes.len() <= count {
        return scenes;
    }
    scenes.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    let interval = scenes.len() as f64 / count as f64;
    (0..count)
        .map(|i| scenes[(i as f64 * interval) as usize].clone())
        .collect()
}

/// Copy grouped frames to `<session_dir>/grouped/grouped_NNNN.jpg`.
///
/// A frame that cannot be copied is kept without a `grouped_path`.
pub fn save_grouped(scenes: Vec<Scene>, session_dir: &Path) -> io::Result<Vec<Scene>> {
    let grouped_dir = session_dir.join("grouped");
    fs::create_dir_all(&grouped_dir)?;

    let mut saved = Vec::with_capacity(scenes.len());
    for (i, mut scene) in scenes.into_iter().enumerate() {
        let target = grouped_dir.join(format!("grouped_{:04}.jpg", i));
        match fs::copy(&scene.frame_path, &target) {
            Ok(_) => scene.grouped_path = Some(target),
            Err(e) => tracing::warn!(
                "Failed to copy {} to grouped: {}",
                scene.frame_path.display(),
                e
            ),
        }
        saved.push(scene);
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    fn scene(ts: f64) -> Scene {
        Scene::new(ts, format!("/nonexistent/scene_{}.jpg", ts))
    }

    fn write_frame(dir: &Path, name: &str) -> PathBuf {
        let img = RgbImage::from_fn(64, 64, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8])
        });
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn close_hashes_share_a_cluster() {
        // 0,1,2 are near each other, 3 is far, 4 is near 3
        let values = [0u32, 2, 4, 40, 43];
        let clusters = cluster(values.len(), 5, |a, b| values[a].abs_diff(values[b]));
        assert_eq!(clusters, vec![vec![0, 1, 2], vec![3, 4]]);
    }

    #[test]
    fn medoid_is_most_central() {
        let values = [0u32, 4, 5];
        assert_eq!(medoid(&[0, 1, 2], |a, b| values[a].abs_diff(values[b])), 1);
    }

    #[test]
    fn spread_picks_evenly_in_time() {
        let scenes: Vec<Scene> = (0..20).rev().map(|i| scene(i as f64)).collect();
        let picked = spread_by_time(scenes, 4);
        let times: Vec<f64> = picked.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![0.0, 5.0, 10.0, 15.0]);
    }

    #[test]
    fn few_scenes_are_kept() {
        let grouping = SceneGrouping::default();
        let scenes: Vec<Scene> = (0..6).map(|i| scene(i as f64)).collect();
        assert_eq!(grouping.group(&scenes), scenes);
    }

    #[test]
    fn undecodable_frames_fall_back_to_first_target() {
        let grouping = SceneGrouping::default().with_target(5);
        let scenes: Vec<Scene> = (0..15).map(|i| scene(i as f64)).collect();
        let grouped = grouping.group(&scenes);
        assert_eq!(grouped, scenes[..5].to_vec());
    }

    #[test]
    fn balance_trims_to_representatives() {
        let grouping = SceneGrouping::default().with_target(3);
        let scenes: Vec<Scene> = (0..12).map(|i| scene(i as f64)).collect();
        let picked = grouping.balance(&scenes, &[0, 2, 4, 6, 8, 10], &[11]);
        let times: Vec<f64> = picked.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![0.0, 4.0, 8.0]);
    }

    #[test]
    fn identical_frames_are_filled_up_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let scenes: Vec<Scene> = (0..12)
            .map(|i| Scene::new(i as f64, write_frame(dir.path(), &format!("scene_{:04}.jpg", i))))
            .collect();
        let grouping = SceneGrouping::default().with_target(4);

        let grouped = grouping.group(&scenes);

        // One cluster of identical frames, topped up with time-spread picks
        assert_eq!(grouped.len(), 4);
        assert!(grouped.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn saved_frames_get_grouped_paths() {
        let dir = tempfile::tempdir().unwrap();
        let kept = Scene::new(1.0, write_frame(dir.path(), "a.jpg"));
        let missing = Scene::new(2.0, dir.path().join("gone.jpg"));

        let saved = save_grouped(vec![kept, missing], dir.path()).unwrap();

        let first = saved[0].grouped_path.as_ref().unwrap();
        assert_eq!(first, &dir.path().join("grouped").join("grouped_0000.jpg"));
        assert!(first.is_file());
        assert!(saved[1].grouped_path.is_none());
    }
}
