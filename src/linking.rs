use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::predict::{Displacement, Predictor};
use crate::structure::Position;
use crate::subnet::{resolve_links, GridIndex, SubnetLimits};

/// A live trajectory between frames
#[derive(Debug, Clone)]
struct Track {
    id: i64,
    position: Position,
    frame: i64,
    /// Frames processed since the track was last observed
    missed: usize,
}

/// Links particles one frame at a time.
///
/// Frames must be fed in increasing order. Tracks that go unobserved for more than
/// `memory` processed frames are retired and can no longer be linked.
pub struct FrameLinker {
    limits: SubnetLimits,
    memory: usize,
    dim: usize,
    predictor: Box<dyn Predictor>,
    tracks: Vec<Track>,
    next_id: i64,
    last_frame: Option<i64>,
}

impl FrameLinker {
    pub fn new(config: &LinkConfig, predictor: Box<dyn Predictor>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            limits: SubnetLimits {
                search_range: config.search_range,
                max_subnet_size: config.max_subnet_size,
                adaptive_stop: config.adaptive_stop,
                adaptive_step: config.adaptive_step,
            },
            memory: config.memory,
            dim: config.pos_columns.len(),
            predictor,
            tracks: Vec::new(),
            next_id: 0,
            last_frame: None,
        })
    }

    /// Number of trajectory ids handed out so far
    pub fn trajectory_count(&self) -> usize {
        self.next_id as usize
    }

    /// Number of tracks that can still be linked, including those held in memory
    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Link the particles of `frame` to the live tracks.
    ///
    /// Returns one trajectory id per entry of `positions`, in the same order.
    pub fn next_frame(&mut self, frame: i64, positions: &[Position]) -> Result<Vec<i64>> {
        if let Some(previous) = self.last_frame {
            if frame <= previous {
                return Err(LinkError::FrameOrder { previous, frame });
            }
        }
        if let Some(bad) = positions.iter().find(|p| p.dim() != self.dim) {
            return Err(LinkError::InvalidConfig(format!(
                "frame {} has a {}-dimensional position, expected {}",
                frame,
                bad.dim(),
                self.dim
            )));
        }
        self.last_frame = Some(frame);

        let range = self.limits.search_range;
        let grid = GridIndex::new(positions, range);
        let candidates: Vec<_> = self
            .tracks
            .iter()
            .map(|track| {
                let predicted = self.predictor.predict(&track.position, track.frame, frame);
                grid.within(&predicted, range)
            })
            .collect();

        let links = resolve_links(&candidates, frame, &self.limits)?;

        let mut ids: Vec<Option<i64>> = vec![None; positions.len()];
        let mut linked = vec![false; self.tracks.len()];
        let mut displacements = Vec::with_capacity(links.len());
        for &(src, dest) in &links {
            let track = &mut self.tracks[src];
            displacements.push(Displacement {
                from: track.position.clone(),
                to: positions[dest].clone(),
                dt: frame.saturating_sub(track.frame),
            });
            ids[dest] = Some(track.id);
            track.position = positions[dest].clone();
            track.frame = frame;
            track.missed = 0;
            linked[src] = true;
        }

        let memory = self.memory;
        let before = self.tracks.len();
        let mut kept = Vec::with_capacity(before);
        for (mut track, was_linked) in self.tracks.drain(..).zip(linked) {
            if !was_linked {
                track.missed += 1;
                if track.missed > memory {
                    continue;
                }
            }
            kept.push(track);
        }
        let retired = before - kept.len();
        self.tracks = kept;

        let mut started = 0;
        let ids: Vec<i64> = ids
            .into_iter()
            .enumerate()
            .map(|(dest, id)| {
                id.unwrap_or_else(|| {
                    let id = self.next_id;
                    self.next_id += 1;
                    started += 1;
                    self.tracks.push(Track {
                        id,
                        position: positions[dest].clone(),
                        frame,
                        missed: 0,
                    });
                    id
                })
            })
            .collect();

        self.predictor.observe(frame, &displacements);

        debug!(
            "Frame {}: {} particles, {} linked, {} new, {} retired",
            frame,
            positions.len(),
            links.len(),
            started,
            retired
        );
        Ok(ids)
    }
}

/// Link a whole table using the predictor named in `config`.
///
/// Returns one trajectory id per row, aligned with `frames` and `positions`.
pub fn link(frames: &[i64], positions: &[Position], config: &LinkConfig) -> Result<Vec<i64>> {
    link_with(frames, positions, config, config.predictor.build(), false)
}

/// Link a whole table with an explicit predictor.
///
/// Rows are processed grouped by frame in increasing order, keeping row order within
/// a frame, so the input does not need to be sorted.
pub fn link_with(
    frames: &[i64],
    positions: &[Position],
    config: &LinkConfig,
    predictor: Box<dyn Predictor>,
    show_progress: bool,
) -> Result<Vec<i64>> {
    if frames.len() != positions.len() {
        return Err(LinkError::InvalidConfig(format!(
            "{} frame values but {} positions",
            frames.len(),
            positions.len()
        )));
    }

    let mut linker = FrameLinker::new(config, predictor)?;

    let mut order: Vec<usize> = (0..frames.len()).collect();
    order.sort_by_key(|&row| frames[row]);
    let groups: Vec<&[usize]> = order
        .chunk_by(|&a, &b| frames[a] == frames[b])
        .collect();

    info!(
        "Linking {} observations across {} frames (search range {}, memory {})",
        frames.len(),
        groups.len(),
        config.search_range,
        config.memory
    );

    let pb = if show_progress {
        ProgressBar::new(groups.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} frames ({percent}%) | ETA: {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message("Linking frames");

    let mut ids = vec![0_i64; frames.len()];
    for rows in groups {
        let frame = frames[rows[0]];
        let frame_positions: Vec<Position> = rows.iter().map(|&row| positions[row].clone()).collect();
        let frame_ids = linker.next_frame(frame, &frame_positions)?;
        for (&row, id) in rows.iter().zip(frame_ids) {
            ids[row] = id;
        }
        pb.inc(1);
    }

    pb.finish_with_message("Linking complete");
    info!("Found {} trajectories", linker.trajectory_count());

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::{NearestVelocityPredict, NullPredict, PredictorKind};

    fn config_2d(search_range: f64, memory: usize) -> LinkConfig {
        LinkConfig {
            search_range,
            memory,
            pos_columns: vec!["x".to_string(), "y".to_string()],
            predictor: PredictorKind::Null,
            ..LinkConfig::default()
        }
    }

    fn p(x: f64, y: f64) -> Position {
        Position::new(vec![x, y])
    }

    #[test]
    fn test_first_frame_ids_follow_row_order() {
        let mut linker = FrameLinker::new(&config_2d(1.0, 0), Box::new(NullPredict)).unwrap();
        let ids = linker.next_frame(0, &[p(0.0, 0.0), p(5.0, 5.0), p(9.0, 0.0)]).unwrap();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_two_particles_keep_their_ids() {
        let mut frames = Vec::new();
        let mut positions = Vec::new();
        for t in 0..5 {
            let step = t as f64 * 0.2;
            // listed in alternating order to make sure ids follow positions, not rows
            if t % 2 == 0 {
                positions.extend([p(step, 0.0), p(10.0 - step, 10.0)]);
            } else {
                positions.extend([p(10.0 - step, 10.0), p(step, 0.0)]);
            }
            frames.extend([t, t]);
        }
        let ids = link(&frames, &positions, &config_2d(1.0, 0)).unwrap();
        assert_eq!(ids, vec![0, 1, 1, 0, 0, 1, 1, 0, 0, 1]);
    }

    #[test]
    fn test_jump_beyond_search_range_starts_new_track() {
        let frames = vec![0, 1, 2];
        let positions = vec![p(0.0, 0.0), p(0.5, 0.0), p(2.0, 0.0)];
        let ids = link(&frames, &positions, &config_2d(1.5, 0)).unwrap();
        assert_eq!(ids, vec![0, 0, 1]);

        // exactly at the search range is out of reach too
        let positions = vec![p(0.0, 0.0), p(1.5, 0.0), p(3.0, 0.0)];
        let ids = link(&frames, &positions, &config_2d(1.5, 0)).unwrap();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_memory_bridges_short_gaps_only() {
        // particle A is missing from frames 1 and 2; B is always present
        let frames = vec![0, 0, 1, 2, 3, 3];
        let positions = vec![
            p(0.0, 0.0),
            p(10.0, 0.0),
            p(10.0, 0.1),
            p(10.0, 0.2),
            p(0.1, 0.0),
            p(10.0, 0.3),
        ];

        let with_memory = link(&frames, &positions, &config_2d(1.0, 2)).unwrap();
        assert_eq!(with_memory, vec![0, 1, 1, 1, 0, 1]);

        let short_memory = link(&frames, &positions, &config_2d(1.0, 1)).unwrap();
        assert_eq!(short_memory, vec![0, 1, 1, 1, 2, 1]);
    }

    #[test]
    fn test_frame_gaps_count_as_one_step() {
        let frames = vec![0, 5, 9];
        let positions = vec![p(0.0, 0.0), p(0.3, 0.0), p(0.6, 0.0)];
        let ids = link(&frames, &positions, &config_2d(1.0, 0)).unwrap();
        assert_eq!(ids, vec![0, 0, 0]);
    }

    #[test]
    fn test_extreme_frame_numbers_link() {
        let config = LinkConfig {
            search_range: 1.0,
            pos_columns: vec!["x".to_string()],
            predictor: PredictorKind::NearestVelocity,
            ..LinkConfig::default()
        };
        let frames = vec![i64::MIN, 0, i64::MAX];
        let positions = vec![
            Position::new(vec![0.0]),
            Position::new(vec![0.1]),
            Position::new(vec![0.2]),
        ];
        let ids = link(&frames, &positions, &config).unwrap();
        assert_eq!(ids, vec![0, 0, 0]);
    }

    #[test]
    fn test_unsorted_rows_get_ids_in_place() {
        let frames = vec![2, 0, 1];
        let positions = vec![p(0.4, 0.0), p(0.0, 0.0), p(0.2, 0.0)];
        let ids = link(&frames, &positions, &config_2d(1.0, 0)).unwrap();
        assert_eq!(ids, vec![0, 0, 0]);
    }

    #[test]
    fn test_velocity_prediction_keeps_fast_particles_apart() {
        // Two particles move 0.9 per frame in opposite directions along parallel
        // lines 0.4 apart. Without prediction they swap ids as they pass.
        let mut frames = Vec::new();
        let mut positions = Vec::new();
        for t in 0..6 {
            let shift = t as f64 * 0.9;
            positions.extend([p(-2.25 + shift, 0.0), p(2.25 - shift, 0.4)]);
            frames.extend([t, t]);
        }
        let config = config_2d(1.0, 0);

        let ids = link_with(
            &frames,
            &positions,
            &config,
            Box::new(NearestVelocityPredict::new()),
            false,
        )
        .unwrap();
        let first: Vec<i64> = ids.iter().step_by(2).copied().collect();
        let second: Vec<i64> = ids.iter().skip(1).step_by(2).copied().collect();
        assert!(first.iter().all(|&id| id == 0), "{:?}", ids);
        assert!(second.iter().all(|&id| id == 1), "{:?}", ids);

        let swapped = link_with(&frames, &positions, &config, Box::new(NullPredict), false).unwrap();
        assert_ne!(swapped, ids);
    }

    #[test]
    fn test_oversize_subnet_reports_frame() {
        let mut config = config_2d(2.0, 0);
        config.max_subnet_size = 2;
        let frames = vec![0, 0, 0, 4, 4, 4];
        let positions = vec![
            p(0.0, 0.0),
            p(0.5, 0.0),
            p(1.0, 0.0),
            p(0.1, 0.0),
            p(0.6, 0.0),
            p(1.1, 0.0),
        ];
        match link(&frames, &positions, &config) {
            Err(LinkError::SubnetOversize { frame, size, max }) => {
                assert_eq!((frame, size, max), (4, 3, 2));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        config.adaptive_stop = Some(0.1);
        config.adaptive_step = 0.5;
        let ids = link(&frames, &positions, &config).unwrap();
        assert_eq!(ids, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_mismatched_inputs_are_rejected() {
        let config = config_2d(1.0, 0);
        assert!(matches!(
            link(&[0, 1], &[p(0.0, 0.0)], &config),
            Err(LinkError::InvalidConfig(_))
        ));
        assert!(matches!(
            link(&[0], &[Position::new(vec![0.0])], &config),
            Err(LinkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_frames_must_increase() {
        let mut linker = FrameLinker::new(&config_2d(1.0, 0), Box::new(NullPredict)).unwrap();
        linker.next_frame(3, &[p(0.0, 0.0)]).unwrap();
        assert!(matches!(
            linker.next_frame(3, &[p(0.0, 0.0)]),
            Err(LinkError::FrameOrder { previous: 3, frame: 3 })
        ));
    }

    #[test]
    fn test_retired_tracks_are_dropped() {
        let mut linker = FrameLinker::new(&config_2d(1.0, 1), Box::new(NullPredict)).unwrap();
        linker.next_frame(0, &[p(0.0, 0.0), p(5.0, 0.0)]).unwrap();
        linker.next_frame(1, &[p(0.0, 0.1)]).unwrap();
        assert_eq!(linker.live_tracks(), 2);
        linker.next_frame(2, &[p(0.0, 0.2)]).unwrap();
        assert_eq!(linker.live_tracks(), 1);
        assert_eq!(linker.trajectory_count(), 2);
    }
}
