use std::f32::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::{
    motor::MotorDrive,
    params::{BoundaryMode, LocomotionParams},
    types::Point,
    util,
};

/// Pose of the locomotion target in screen coordinates (y grows downwards).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocomotionState {
    pub x: f32,
    pub y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub facing_dir: f32,
    pub target_dir: f32,
    pub speed: f32,
    pub target_speed: f32,
    pub speed_change_interval: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepResult {
    /// The target hit the boundary during this step.
    pub touched: bool,
}

#[derive(Debug, Clone)]
pub struct LocomotionController {
    params: LocomotionParams,
    state: LocomotionState,
}

impl LocomotionController {
    pub fn new(params: LocomotionParams, state: LocomotionState) -> Self {
        Self { params, state }
    }

    /// At rest in the middle of the bounds.
    pub fn centered(params: LocomotionParams) -> Self {
        let (x, y) = params.bounds.center();
        Self::new(
            params,
            LocomotionState {
                x,
                y,
                ..LocomotionState::default()
            },
        )
    }

    pub fn state(&self) -> &LocomotionState {
        &self.state
    }

    /// Replaces the pose, e.g. with one restored from persistence. The position
    /// is clamped into the bounds.
    pub fn restore(&mut self, state: LocomotionState) {
        let bounds = &self.params.bounds;
        self.state = LocomotionState {
            x: state.x.clamp(bounds.min_x, bounds.max_x),
            y: state.y.clamp(bounds.min_y, bounds.max_y),
            ..state
        };
    }

    pub fn target(&self) -> Point {
        Point::new(self.state.x, self.state.y)
    }

    /// Derives target heading and speed from the latest motor drive.
    pub fn apply_drive(&mut self, drive: MotorDrive) {
        let params = &self.params;
        let state = &mut self.state;

        let heading_delta = (drive.left - drive.right) / params.steer_scale;
        state.target_dir = (state.facing_dir + heading_delta * PI).rem_euclid(TAU);
        state.target_speed = (drive.left.abs() + drive.right.abs()) / params.speed_scale;
        state.speed_change_interval = (state.target_speed - state.speed) / params.speed_smoothing;
    }

    /// One render tick: speed, heading, position, boundary.
    pub fn step(&mut self) -> StepResult {
        let params = &self.params;
        let state = &mut self.state;

        state.speed += state.speed_change_interval;
        if (state.speed_change_interval > 0.0 && state.speed > state.target_speed)
            || (state.speed_change_interval < 0.0 && state.speed < state.target_speed)
        {
            state.speed = state.target_speed;
            state.speed_change_interval = 0.0;
        }

        let angle_diff = util::shortest_angle_diff(state.facing_dir, state.target_dir);
        if angle_diff.abs() <= params.turn_step {
            state.facing_dir = state.target_dir;
        } else {
            state.facing_dir =
                (state.facing_dir + params.turn_step * angle_diff.signum()).rem_euclid(TAU);
        }

        state.velocity_x = state.facing_dir.cos() * state.speed;
        state.velocity_y = -state.facing_dir.sin() * state.speed;
        state.x += state.velocity_x;
        state.y += state.velocity_y;

        self.apply_boundary()
    }

    fn apply_boundary(&mut self) -> StepResult {
        let bounds = self.params.bounds;
        let state = &mut self.state;

        let hit_x = state.x < bounds.min_x || state.x > bounds.max_x;
        let hit_y = state.y < bounds.min_y || state.y > bounds.max_y;

        if !hit_x && !hit_y {
            return StepResult { touched: false };
        }

        state.x = state.x.clamp(bounds.min_x, bounds.max_x);
        state.y = state.y.clamp(bounds.min_y, bounds.max_y);

        if let BoundaryMode::Bounce { damping } = self.params.boundary_mode {
            if hit_x {
                state.facing_dir = (PI - state.facing_dir).rem_euclid(TAU);
                state.target_dir = (PI - state.target_dir).rem_euclid(TAU);
            }

            if hit_y {
                state.facing_dir = (-state.facing_dir).rem_euclid(TAU);
                state.target_dir = (-state.target_dir).rem_euclid(TAU);
            }

            state.speed *= damping;
            state.velocity_x = state.facing_dir.cos() * state.speed;
            state.velocity_y = -state.facing_dir.sin() * state.speed;
        }

        StepResult { touched: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Bounds;
    use float_cmp::assert_approx_eq;

    fn params(boundary_mode: BoundaryMode) -> LocomotionParams {
        LocomotionParams {
            bounds: Bounds {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 500.0,
                max_y: 500.0,
            },
            boundary_mode,
            ..LocomotionParams::default()
        }
    }

    fn moving_right(x: f32, y: f32, speed: f32) -> LocomotionState {
        LocomotionState {
            x,
            y,
            velocity_x: speed,
            speed,
            target_speed: speed,
            ..LocomotionState::default()
        }
    }

    #[test]
    fn boundary_clamps_and_touches() {
        let mut sut =
            LocomotionController::new(params(BoundaryMode::Clamp), moving_right(499.0, 250.0, 2.0));

        sut.apply_drive(MotorDrive {
            left: 5.0,
            right: 1.0,
        });
        let result = sut.step();

        assert!(result.touched);
        assert_approx_eq!(f32, sut.state().x, 500.0);
        assert!(sut.state().y < 250.0);
    }

    #[test]
    fn free_step_does_not_touch() {
        let mut sut =
            LocomotionController::new(params(BoundaryMode::Clamp), moving_right(100.0, 250.0, 2.0));

        let result = sut.step();

        assert!(!result.touched);
        assert_approx_eq!(f32, sut.state().x, 102.0);
        assert_approx_eq!(f32, sut.state().y, 250.0);
        assert_approx_eq!(f32, sut.state().velocity_x, 2.0);
    }

    #[test]
    fn bounce_reflects_heading() {
        let mut sut = LocomotionController::new(
            params(BoundaryMode::Bounce { damping: 0.5 }),
            moving_right(499.0, 250.0, 2.0),
        );

        let result = sut.step();

        assert!(result.touched);
        assert_approx_eq!(f32, sut.state().x, 500.0);
        assert_approx_eq!(f32, sut.state().facing_dir, PI);
        assert_approx_eq!(f32, sut.state().target_dir, PI);
        assert_approx_eq!(f32, sut.state().speed, 1.0);
        assert_approx_eq!(f32, sut.state().velocity_x, -1.0);

        sut.step();
        assert!(sut.state().x < 500.0);
    }

    #[test]
    fn bounce_off_y_wall_mirrors_heading() {
        let mut state = moving_right(250.0, 1.0, 2.0);
        state.facing_dir = PI / 2.0;
        state.target_dir = PI / 2.0;
        let mut sut =
            LocomotionController::new(params(BoundaryMode::Bounce { damping: 0.5 }), state);

        let result = sut.step();

        assert!(result.touched);
        assert_approx_eq!(f32, sut.state().y, 0.0);
        assert_approx_eq!(f32, sut.state().x, 250.0, epsilon = 1e-4);
        assert_approx_eq!(f32, sut.state().facing_dir, 1.5 * PI, epsilon = 1e-5);
        assert_approx_eq!(f32, sut.state().target_dir, 1.5 * PI, epsilon = 1e-5);
        assert_approx_eq!(f32, sut.state().speed, 1.0);
        assert_approx_eq!(f32, sut.state().velocity_x, 0.0, epsilon = 1e-5);
        assert_approx_eq!(f32, sut.state().velocity_y, 1.0, epsilon = 1e-5);

        assert!(!sut.step().touched);
        assert!(sut.state().y > 0.0);
    }

    #[test]
    fn drive_sets_targets() {
        let mut sut = LocomotionController::centered(params(BoundaryMode::Clamp));

        sut.apply_drive(MotorDrive {
            left: 4.0,
            right: 2.0,
        });

        let state = sut.state();
        assert_approx_eq!(f32, state.target_dir, 0.1 * PI);
        assert_approx_eq!(f32, state.target_speed, 0.06);
        assert_approx_eq!(f32, state.speed_change_interval, 0.002);
        assert_approx_eq!(f32, state.x, 250.0);
    }

    #[test]
    fn speed_does_not_overshoot() {
        let mut sut = LocomotionController::centered(params(BoundaryMode::Clamp));
        sut.apply_drive(MotorDrive {
            left: 3.0,
            right: 3.0,
        });

        for _ in 0..100 {
            sut.step();
            assert!(sut.state().speed <= 0.06 + f32::EPSILON);
        }

        assert_approx_eq!(f32, sut.state().speed, 0.06);
    }

    #[test]
    fn turns_the_short_way() {
        let mut state = moving_right(250.0, 250.0, 0.0);
        state.facing_dir = 0.05;
        state.target_dir = TAU - 0.35;
        let mut sut = LocomotionController::new(params(BoundaryMode::Clamp), state);

        sut.step();
        assert_approx_eq!(f32, sut.state().facing_dir, TAU - 0.05, epsilon = 1e-5);
        sut.step();
        sut.step();
        sut.step();
        assert_approx_eq!(f32, sut.state().facing_dir, TAU - 0.35, epsilon = 1e-5);
    }

    #[test]
    fn restore_clamps_into_bounds() {
        let mut sut = LocomotionController::centered(params(BoundaryMode::Clamp));
        sut.restore(LocomotionState {
            x: 900.0,
            y: -3.0,
            speed: 1.5,
            ..LocomotionState::default()
        });

        assert_approx_eq!(f32, sut.state().x, 500.0);
        assert_approx_eq!(f32, sut.state().y, 0.0);
        assert_approx_eq!(f32, sut.state().speed, 1.5);
        assert_eq!(sut.target(), Point::new(500.0, 0.0));
    }
}
