use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::linking::link_with;
use crate::table::ParticleTable;

/// Outcome of a linking run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSummary {
    pub rows: usize,
    pub frames: usize,
    pub trajectories: usize,
}

/// Extent of one linked trajectory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    pub particle: i64,
    pub first_frame: i64,
    pub last_frame: i64,
    pub observations: usize,
}

/// Trait for linking particle tables stored on disk
pub trait Trajectory {
    /// Read the particle-observation table
    fn read_table(&self) -> Result<ParticleTable>;

    /// Read the table, link trajectories and write the table with the id column added.
    ///
    /// # Arguments
    /// * `config` - Linking parameters and column names
    /// * `output_path` - Where to write the result. If None, the input file is overwritten
    /// * `show_progress` - Draw a progress bar over frames
    fn link(
        &self,
        config: &LinkConfig,
        output_path: Option<&Path>,
        show_progress: bool,
    ) -> Result<LinkSummary>;

    /// Summarize an already linked table: first frame, last frame and number of
    /// observations of every trajectory, sorted by id.
    ///
    /// # Arguments
    /// * `output_path` - Optional path for the summary CSV. If None, auto-generates from input path
    fn summarize(
        &self,
        particle_column: &str,
        frame_column: &str,
        output_path: Option<&Path>,
    ) -> Result<Vec<TrackSummary>>;
}

/// Implementation of Trajectory trait for CSV files
pub struct CsvTrajectory {
    file_path: PathBuf,
}

impl CsvTrajectory {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }

    /// Default location of the summary written by `summarize`
    pub fn tracks_path(&self) -> PathBuf {
        let base_name = self
            .file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("trajectory");
        let dir = self.file_path.parent().unwrap_or(Path::new("."));
        dir.join(format!("{}_tracks.csv", base_name))
    }
}

impl Trajectory for CsvTrajectory {
    fn read_table(&self) -> Result<ParticleTable> {
        ParticleTable::from_path(&self.file_path)
    }

    fn link(
        &self,
        config: &LinkConfig,
        output_path: Option<&Path>,
        show_progress: bool,
    ) -> Result<LinkSummary> {
        let mut table = self.read_table()?;
        info!("Loaded {} rows from {}", table.len(), self.file_path.display());

        let summary = link_table(&mut table, config, show_progress)?;

        let output = output_path.unwrap_or(self.file_path.as_path());
        table.save(output)?;
        info!("Wrote linked table to {}", output.display());

        Ok(summary)
    }

    fn summarize(
        &self,
        particle_column: &str,
        frame_column: &str,
        output_path: Option<&Path>,
    ) -> Result<Vec<TrackSummary>> {
        let table = self.read_table()?;
        let particles = table.int_column(particle_column)?;
        let frames = table.int_column(frame_column)?;

        let summaries = summarize_tracks(&particles, &frames);

        let output = output_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.tracks_path());
        save_tracks_to_csv(&summaries, &output)?;

        Ok(summaries)
    }
}

/// Link the rows of `table` in place, adding or replacing the particle column
pub fn link_table(
    table: &mut ParticleTable,
    config: &LinkConfig,
    show_progress: bool,
) -> Result<LinkSummary> {
    config.validate()?;
    let positions = table.positions(&config.pos_columns)?;
    let frames = table.int_column(&config.frame_column)?;

    let ids = link_with(
        &frames,
        &positions,
        config,
        config.predictor.build(),
        show_progress,
    )?;
    table.set_int_column(&config.particle_column, &ids)?;

    Ok(LinkSummary {
        rows: ids.len(),
        frames: frames.iter().collect::<HashSet<_>>().len(),
        trajectories: ids.iter().collect::<HashSet<_>>().len(),
    })
}

/// Per-trajectory extent, sorted by trajectory id
pub fn summarize_tracks(particles: &[i64], frames: &[i64]) -> Vec<TrackSummary> {
    let mut tracks: BTreeMap<i64, TrackSummary> = BTreeMap::new();
    for (&particle, &frame) in particles.iter().zip(frames) {
        tracks
            .entry(particle)
            .and_modify(|t| {
                t.first_frame = t.first_frame.min(frame);
                t.last_frame = t.last_frame.max(frame);
                t.observations += 1;
            })
            .or_insert(TrackSummary {
                particle,
                first_frame: frame,
                last_frame: frame,
                observations: 1,
            });
    }
    tracks.into_values().collect()
}

/// Save trajectory summaries to CSV file
fn save_tracks_to_csv(summaries: &[TrackSummary], output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| LinkError::io(parent, e))?;
        }
    }

    let mut writer = csv::Writer::from_path(output_path)?;
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer
        .flush()
        .map_err(|e| LinkError::io(output_path, e))?;

    Ok(())
}
