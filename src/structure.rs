/// n-dimensional particle position
#[derive(Debug, Clone, PartialEq)]
pub struct Position(pub Vec<f64>);

impl Position {
    pub fn new(coords: Vec<f64>) -> Self {
        Self(coords)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn coords(&self) -> &[f64] {
        &self.0
    }

    /// Squared Euclidean distance to another position
    pub fn squared_distance_to(&self, other: &Position) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    /// Calculate Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f64 {
        self.squared_distance_to(other).sqrt()
    }

    /// Move along `velocity` for `dt` frames
    pub fn advanced(&self, velocity: &[f64], dt: f64) -> Position {
        Position(
            self.0
                .iter()
                .zip(velocity.iter())
                .map(|(p, v)| p + v * dt)
                .collect(),
        )
    }
}

impl From<Vec<f64>> for Position {
    fn from(coords: Vec<f64>) -> Self {
        Self(coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_distance() {
        let p1 = Position::new(vec![0.0, 0.0, 0.0]);
        let p2 = Position::new(vec![3.0, 4.0, 0.0]);
        assert_eq!(p1.distance_to(&p2), 5.0);
        assert_eq!(p1.squared_distance_to(&p2), 25.0);
    }

    #[test]
    fn test_position_advanced() {
        let p = Position::new(vec![1.0, 2.0]);
        assert_eq!(p.advanced(&[0.5, -1.0], 2.0), Position::new(vec![2.0, 0.0]));
    }
}
