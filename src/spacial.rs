#[cfg(feature = "egui")]
use egui::Pos2;

pub type Vector = nalgebra::Vector2<f64>;
pub type Position = nalgebra::Point2<f64>;

pub trait ToVector {
    fn to_vector(self) -> Vector;
}

impl ToVector for Position {
    fn to_vector(self) -> Vector {
        Vector::new(self.x, self.y)
    }
}

/// Mesh vertices are stored as `[f32; 2]`, in canvas device space.
#[cfg(feature = "egui")]
pub trait ToPos2 {
    fn to_pos2(self) -> Pos2;
}

#[cfg(feature = "egui")]
impl ToPos2 for [f32; 2] {
    fn to_pos2(self) -> Pos2 {
        Pos2::new(self[0], self[1])
    }
}

/// Rotates `position` counterclockwise around the origin.
pub fn rotate_position(position: Position, radians: f64) -> Position {
    let (sin_theta, cos_theta) = radians.sin_cos();
    Position::new(
        position.x * cos_theta - position.y * sin_theta,
        position.x * sin_theta + position.y * cos_theta,
    )
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;

    #[test]
    fn rotate_quarter_turn() {
        // given
        let position = Position::new(1.0, 0.0);

        // when
        let rotated = rotate_position(position, FRAC_PI_2);

        // then
        assert!((rotated.x - 0.0).abs() < 1e-12);
        assert!((rotated.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn position_to_vector() {
        assert_eq!(Position::new(3.0, -4.0).to_vector(), Vector::new(3.0, -4.0));
    }
}
