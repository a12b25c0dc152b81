use serde::{Deserialize, Serialize};

use crate::{
    engine::EngineStatus, locomotion::LocomotionState, motor::MotorDrive,
    position_sync::SyncStatus, store::RefreshStatus, types::Point,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronReadout {
    pub name: String,
    pub activation: f32,
    /// `|activation| / fire_threshold`, capped at 1.
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentPose {
    pub head: Point,
    pub tail: Point,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyPose {
    pub spine: Vec<SegmentPose>,
    pub limbs: Vec<Vec<SegmentPose>>,
}

/// Everything a presentation layer needs to draw one render tick.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub neurons: Vec<NeuronReadout>,
    pub pose: BodyPose,
    pub locomotion: LocomotionState,
    pub drive: MotorDrive,
    pub engine_status: EngineStatus,
    pub refresh_status: RefreshStatus,
    pub sync_status: SyncStatus,
}
