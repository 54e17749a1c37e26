//! Position predictors.
//!
//! A predictor estimates where a live track will be in the frame being linked.
//! Candidate links are measured from the prediction instead of the last observed
//! position, which keeps fast-moving particles inside the search range.

use serde::{Deserialize, Serialize};

use crate::structure::Position;

/// A link made by the linker: a particle moved from `from` to `to` over `dt` frames
#[derive(Debug, Clone)]
pub struct Displacement {
    pub from: Position,
    pub to: Position,
    pub dt: i64,
}

impl Displacement {
    pub fn velocity(&self) -> Vec<f64> {
        let dt = self.dt.max(1) as f64;
        self.to
            .coords()
            .iter()
            .zip(self.from.coords().iter())
            .map(|(b, a)| (b - a) / dt)
            .collect()
    }
}

/// Trait for estimating track positions at the next frame
pub trait Predictor {
    /// Predict the position at `frame` of a track last observed at `last` in `last_frame`
    fn predict(&self, last: &Position, last_frame: i64, frame: i64) -> Position;

    /// Record the links made while linking `frame`
    fn observe(&mut self, frame: i64, links: &[Displacement]);
}

// Frame numbers may span the whole i64 range, so subtract in f64
fn frame_gap(last_frame: i64, frame: i64) -> f64 {
    frame as f64 - last_frame as f64
}

/// Predicts no motion at all
#[derive(Debug, Default, Clone)]
pub struct NullPredict;

impl Predictor for NullPredict {
    fn predict(&self, last: &Position, _last_frame: i64, _frame: i64) -> Position {
        last.clone()
    }

    fn observe(&mut self, _frame: i64, _links: &[Displacement]) {}
}

/// Velocities measured at the most recent frame that produced links
#[derive(Debug, Default, Clone)]
struct VelocityField {
    frame: Option<i64>,
    points: Vec<(Position, Vec<f64>)>,
}

impl VelocityField {
    fn update(&mut self, frame: i64, links: &[Displacement]) {
        // A frame without links keeps the previous field
        if links.is_empty() {
            return;
        }
        self.frame = Some(frame);
        self.points = links
            .iter()
            .map(|link| (link.to.clone(), link.velocity()))
            .collect();
    }

    fn nearest(&self, pos: &Position) -> Option<&[f64]> {
        self.points
            .iter()
            .min_by(|(a, _), (b, _)| {
                a.squared_distance_to(pos)
                    .total_cmp(&b.squared_distance_to(pos))
            })
            .map(|(_, v)| v.as_slice())
    }

    fn mean(&self) -> Option<Vec<f64>> {
        let (first, _) = self.points.first()?;
        let mut sum = vec![0.0; first.dim()];
        for (_, v) in &self.points {
            for (s, c) in sum.iter_mut().zip(v.iter()) {
                *s += c;
            }
        }
        let n = self.points.len() as f64;
        Some(sum.into_iter().map(|s| s / n).collect())
    }
}

/// Extrapolates each track with the velocity of the nearest recently linked particle.
///
/// New particles and particles coming back from memory borrow the motion of their
/// neighbours, so a flowing sample is tracked well even at its first steps.
#[derive(Debug, Default, Clone)]
pub struct NearestVelocityPredict {
    field: VelocityField,
    initial_velocity: Option<Vec<f64>>,
}

impl NearestVelocityPredict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Velocity used before any link has been observed
    pub fn with_initial_velocity(velocity: Vec<f64>) -> Self {
        Self {
            field: VelocityField::default(),
            initial_velocity: Some(velocity),
        }
    }
}

impl Predictor for NearestVelocityPredict {
    fn predict(&self, last: &Position, last_frame: i64, frame: i64) -> Position {
        let dt = frame_gap(last_frame, frame);
        match self.field.nearest(last).or(self.initial_velocity.as_deref()) {
            Some(v) => last.advanced(v, dt),
            None => last.clone(),
        }
    }

    fn observe(&mut self, frame: i64, links: &[Displacement]) {
        self.field.update(frame, links);
    }
}

/// Extrapolates every track with the mean velocity of the last linked frame
#[derive(Debug, Default, Clone)]
pub struct DriftPredict {
    field: VelocityField,
    drift: Option<Vec<f64>>,
}

impl DriftPredict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drift(&self) -> Option<&[f64]> {
        self.drift.as_deref()
    }
}

impl Predictor for DriftPredict {
    fn predict(&self, last: &Position, last_frame: i64, frame: i64) -> Position {
        match &self.drift {
            Some(v) => last.advanced(v, frame_gap(last_frame, frame)),
            None => last.clone(),
        }
    }

    fn observe(&mut self, frame: i64, links: &[Displacement]) {
        self.field.update(frame, links);
        if let Some(mean) = self.field.mean() {
            self.drift = Some(mean);
        }
    }
}

/// Predictor selection for configuration files and the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PredictorKind {
    Null,
    #[default]
    NearestVelocity,
    Drift,
}

impl PredictorKind {
    pub fn build(self) -> Box<dyn Predictor> {
        match self {
            PredictorKind::Null => Box::new(NullPredict),
            PredictorKind::NearestVelocity => Box::new(NearestVelocityPredict::new()),
            PredictorKind::Drift => Box::new(DriftPredict::new()),
        }
    }
}

impl std::str::FromStr for PredictorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(PredictorKind::Null),
            "nearest-velocity" => Ok(PredictorKind::NearestVelocity),
            "drift" => Ok(PredictorKind::Drift),
            other => Err(format!("Unknown predictor: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(from: &[f64], to: &[f64], dt: i64) -> Displacement {
        Displacement {
            from: Position::new(from.to_vec()),
            to: Position::new(to.to_vec()),
            dt,
        }
    }

    #[test]
    fn test_null_predict_stays_put() {
        let p = Position::new(vec![1.0, 2.0]);
        assert_eq!(NullPredict.predict(&p, 0, 5), p);
    }

    #[test]
    fn test_nearest_velocity_uses_closest_neighbour() {
        let mut predictor = NearestVelocityPredict::new();
        predictor.observe(
            1,
            &[link(&[0.0, 0.0], &[1.0, 0.0], 1), link(&[10.0, 0.0], &[10.0, 2.0], 1)],
        );

        let near_first = predictor.predict(&Position::new(vec![1.5, 0.0]), 1, 2);
        assert_eq!(near_first, Position::new(vec![2.5, 0.0]));

        let near_second = predictor.predict(&Position::new(vec![9.0, 2.0]), 1, 3);
        assert_eq!(near_second, Position::new(vec![9.0, 6.0]));
    }

    #[test]
    fn test_nearest_velocity_divides_by_frame_gap() {
        let mut predictor = NearestVelocityPredict::new();
        predictor.observe(4, &[link(&[0.0], &[4.0], 2)]);
        assert_eq!(predictor.predict(&Position::new(vec![4.0]), 4, 5), Position::new(vec![6.0]));
    }

    #[test]
    fn test_nearest_velocity_initial_guess() {
        let predictor = NearestVelocityPredict::with_initial_velocity(vec![1.0, -1.0]);
        assert_eq!(
            predictor.predict(&Position::new(vec![0.0, 0.0]), 0, 1),
            Position::new(vec![1.0, -1.0])
        );
    }

    #[test]
    fn test_empty_frame_keeps_previous_field() {
        let mut predictor = NearestVelocityPredict::new();
        predictor.observe(1, &[link(&[0.0], &[1.0], 1)]);
        predictor.observe(2, &[]);
        assert_eq!(predictor.predict(&Position::new(vec![1.0]), 1, 3), Position::new(vec![3.0]));
    }

    #[test]
    fn test_drift_is_mean_velocity() {
        let mut predictor = DriftPredict::new();
        predictor.observe(1, &[link(&[0.0, 0.0], &[2.0, 0.0], 1), link(&[5.0, 5.0], &[5.0, 7.0], 1)]);
        assert_eq!(predictor.drift(), Some(&[1.0, 1.0][..]));
        assert_eq!(
            predictor.predict(&Position::new(vec![0.0, 0.0]), 1, 2),
            Position::new(vec![1.0, 1.0])
        );
    }

    #[test]
    fn test_predict_across_extreme_frames() {
        let p = Position::new(vec![0.0]);
        let nearest = NearestVelocityPredict::with_initial_velocity(vec![0.0]);
        assert_eq!(nearest.predict(&p, i64::MIN, i64::MAX), p);

        let mut drift = DriftPredict::new();
        drift.observe(1, &[link(&[0.0], &[0.0], 1)]);
        assert_eq!(drift.predict(&p, i64::MIN, i64::MAX), p);
    }

    #[test]
    fn test_predictor_kind_parse() {
        assert_eq!("drift".parse::<PredictorKind>(), Ok(PredictorKind::Drift));
        assert!("kalman".parse::<PredictorKind>().is_err());
    }
}
