use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use simple_error::{try_with, SimpleError, SimpleResult};

use crate::types::HashSet;

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub engine_params: EngineParams,
    pub motor_params: MotorParams,
    pub stimulus_params: StimulusParams,
    pub locomotion_params: LocomotionParams,
    pub body_params: BodyParams,
    pub schedule_params: ScheduleParams,
    pub network_params: NetworkParams,
    pub technical_params: TechnicalParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    pub fire_threshold: f32,
    pub activation_bound: f32,
    pub swap_rule: SwapRule,
    pub random_excite_count: usize,
    pub movement_excite_probability: f64,
    pub muscle_prefixes: Vec<String>,
    pub motor_segment_range: (u32, u32),
    pub movement_groups: MovementGroups,
    pub role_multipliers: RoleMultipliers,
}

/// How `current` and `next` are combined at the end of a tick. Whichever rule is
/// chosen, `current` afterwards holds the value read by the next fire pass and
/// `next` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SwapRule {
    /// `current <- next`
    Replace,
    /// `current <- (current * momentum + next) / (1 + |next| * damping)`
    Momentum { momentum: f32, damping: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementGroups {
    pub forward: Vec<String>,
    pub backward: Vec<String>,
    pub turn: Vec<String>,
}

/// Scales every weight accumulated into a neuron of the given role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleMultipliers {
    pub interneuron: f32,
    pub forward: f32,
    pub backward: f32,
    pub turn: f32,
    pub muscle: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorParams {
    pub jitter: f32,
    pub amplification: f32,
    pub amplification_boost: f32,
    pub scale_factor: f32,
    pub saturation: f32,
    pub asymmetry: f32,
    pub bias: f32,
    pub min_threshold: f32,
    pub hysteresis: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusParams {
    pub drives: Vec<DriveParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveParams {
    pub name: String,
    pub neurons: Vec<String>,
    pub repeat: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocomotionParams {
    pub bounds: Bounds,
    pub steer_scale: f32,
    pub speed_scale: f32,
    pub speed_smoothing: f32,
    pub turn_step: f32,
    pub boundary_mode: BoundaryMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BoundaryMode {
    Clamp,
    Bounce { damping: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyParams {
    pub segment_count: usize,
    pub segment_size: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub body_width: f32,
    pub spawn_extent: f32,
    pub limbs: Vec<LimbParams>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimbParams {
    pub parent_segment: usize,
    pub side: Side,
    pub segment_count: usize,
    pub segment_size: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleParams {
    pub neural_tick_ms: u64,
    pub render_tick_ms: u64,
    pub weight_refresh_ms: u64,
    pub position_sync_ms: u64,
    pub touch_hold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    pub weight_store_url: Option<String>,
    pub position_sync_url: Option<String>,
    pub request_timeout_ms: u64,
    pub min_update_interval_ms: u64,
    pub weight_retry: RetryParams,
    pub position_retry: RetryParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryParams {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalParams {
    pub seed_override: Option<u64>,
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            fire_threshold: 5.0,
            activation_bound: 50.0,
            swap_rule: SwapRule::default(),
            random_excite_count: 40,
            movement_excite_probability: 0.3,
            muscle_prefixes: names(&["MVU", "MVL", "MDL", "MVR", "MDR"]),
            motor_segment_range: (7, 23),
            movement_groups: MovementGroups::default(),
            role_multipliers: RoleMultipliers::default(),
        }
    }
}

impl Default for SwapRule {
    fn default() -> Self {
        SwapRule::Momentum {
            momentum: 0.8,
            damping: 0.05,
        }
    }
}

impl Default for MovementGroups {
    fn default() -> Self {
        Self {
            forward: names(&["AVBL", "AVBR", "PVCL", "PVCR"]),
            backward: names(&["AVAL", "AVAR", "AVDL", "AVDR"]),
            turn: names(&[
                "RIVL", "RIVR", "RMEV", "RMED", "SMDVL", "SMDVR", "SMDDR", "SMDDL",
            ]),
        }
    }
}

impl MovementGroups {
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.forward
            .iter()
            .chain(self.backward.iter())
            .chain(self.turn.iter())
    }
}

impl Default for RoleMultipliers {
    fn default() -> Self {
        Self {
            interneuron: 1.0,
            forward: 1.0,
            backward: 1.0,
            turn: 1.0,
            muscle: 1.0,
        }
    }
}

impl Default for MotorParams {
    fn default() -> Self {
        Self {
            jitter: 0.15,
            amplification: 3.0,
            amplification_boost: 0.5,
            scale_factor: 8.0,
            saturation: 3.0,
            asymmetry: 0.1,
            bias: 0.2,
            min_threshold: 0.01,
            hysteresis: 0.005,
        }
    }
}

impl MotorParams {
    /// Parameters without any random contribution.
    pub fn deterministic() -> Self {
        Self {
            jitter: 0.0,
            amplification_boost: 0.0,
            asymmetry: 0.0,
            bias: 0.0,
            ..Self::default()
        }
    }

    pub fn drive_limit(&self) -> f32 {
        self.scale_factor * self.saturation
    }
}

pub const HUNGER_DRIVE: &str = "hunger";
pub const TOUCH_DRIVE: &str = "touch";
pub const FOOD_SENSE_DRIVE: &str = "food_sense";
pub const MOVEMENT_DRIVE: &str = "movement";

impl Default for StimulusParams {
    fn default() -> Self {
        let mut movement = MovementGroups::default().iter().cloned().collect::<Vec<_>>();
        for prefix in ["VA", "VB", "DA", "DB"] {
            movement.extend((1..=4).map(|idx| format!("{}{}", prefix, idx)));
        }

        Self {
            drives: vec![
                DriveParams {
                    name: HUNGER_DRIVE.to_string(),
                    neurons: names(&["RIML", "RIMR", "RICL", "RICR"]),
                    repeat: 2,
                    enabled: true,
                },
                DriveParams {
                    name: TOUCH_DRIVE.to_string(),
                    neurons: names(&[
                        "FLPL", "FLPR", "ASHL", "ASHR", "IL1VL", "IL1VR", "OLQDL", "OLQDR",
                        "OLQVR", "OLQVL",
                    ]),
                    repeat: 2,
                    enabled: false,
                },
                DriveParams {
                    name: FOOD_SENSE_DRIVE.to_string(),
                    neurons: names(&[
                        "ADFL", "ADFR", "ASGR", "ASGL", "ASIL", "ASIR", "ASJR", "ASJL",
                    ]),
                    repeat: 1,
                    enabled: false,
                },
                DriveParams {
                    name: MOVEMENT_DRIVE.to_string(),
                    neurons: movement,
                    repeat: 2,
                    enabled: true,
                },
            ],
        }
    }
}

impl Default for LocomotionParams {
    fn default() -> Self {
        Self {
            bounds: Bounds::default(),
            steer_scale: 20.0,
            speed_scale: 100.0,
            speed_smoothing: 30.0,
            turn_step: 0.1,
            boundary_mode: BoundaryMode::Clamp,
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 1280.0,
            max_y: 720.0,
        }
    }
}

impl Bounds {
    pub fn center(&self) -> (f32, f32) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

impl Default for BodyParams {
    fn default() -> Self {
        let limbs = [8, 18, 28, 38]
            .into_iter()
            .flat_map(|parent_segment| {
                [Side::Left, Side::Right].map(|side| LimbParams {
                    parent_segment,
                    side,
                    segment_count: 3,
                    segment_size: 4.0,
                })
            })
            .collect();

        Self {
            segment_count: 48,
            segment_size: 1.0,
            stiffness: 0.998,
            damping: 0.99,
            body_width: 32.0,
            spawn_extent: 500.0,
            limbs,
        }
    }
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            neural_tick_ms: 500,
            render_tick_ms: 16,
            weight_refresh_ms: 180_000,
            position_sync_ms: 500,
            touch_hold_ms: 2000,
        }
    }
}

impl ScheduleParams {
    pub fn neural_tick_period(&self) -> Duration {
        Duration::from_millis(self.neural_tick_ms)
    }

    pub fn render_tick_period(&self) -> Duration {
        Duration::from_millis(self.render_tick_ms)
    }

    pub fn weight_refresh_period(&self) -> Duration {
        Duration::from_millis(self.weight_refresh_ms)
    }

    pub fn position_sync_period(&self) -> Duration {
        Duration::from_millis(self.position_sync_ms)
    }

    pub fn touch_hold(&self) -> Duration {
        Duration::from_millis(self.touch_hold_ms)
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            weight_store_url: None,
            position_sync_url: None,
            request_timeout_ms: 5000,
            min_update_interval_ms: 100,
            weight_retry: RetryParams::default(),
            position_retry: RetryParams::default(),
        }
    }
}

impl NetworkParams {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn min_update_interval(&self) -> Duration {
        Duration::from_millis(self.min_update_interval_ms)
    }
}

impl RetryParams {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
        }
    }
}

pub fn load_simulation_params(path: &Path) -> SimpleResult<SimulationParams> {
    let yaml_str = try_with!(
        fs::read_to_string(path),
        "unable to read params file {}",
        path.display()
    );
    let params: SimulationParams = try_with!(serde_yaml::from_str(&yaml_str), "malformed params");
    validate_simulation_params(&params)?;
    Ok(params)
}

pub fn validate_simulation_params(params: &SimulationParams) -> Result<(), SimpleError> {
    validate_engine_params(&params.engine_params)?;
    validate_motor_params(&params.motor_params)?;
    validate_stimulus_params(&params.stimulus_params)?;
    validate_locomotion_params(&params.locomotion_params)?;
    validate_body_params(&params.body_params)?;
    validate_schedule_params(&params.schedule_params)?;
    validate_network_params(&params.network_params)?;
    Ok(())
}

/// Rejects NaN and infinities, which every later range check would let through.
fn validate_finite(values: &[(&str, f32)]) -> Result<(), SimpleError> {
    match values.iter().find(|(_, value)| !value.is_finite()) {
        Some((name, _)) => Err(SimpleError::new(format!("{} must be finite", name))),
        None => Ok(()),
    }
}

fn validate_engine_params(engine_params: &EngineParams) -> Result<(), SimpleError> {
    let multipliers = &engine_params.role_multipliers;
    validate_finite(&[
        ("fire_threshold", engine_params.fire_threshold),
        ("activation_bound", engine_params.activation_bound),
        ("role_multipliers.interneuron", multipliers.interneuron),
        ("role_multipliers.forward", multipliers.forward),
        ("role_multipliers.backward", multipliers.backward),
        ("role_multipliers.turn", multipliers.turn),
        ("role_multipliers.muscle", multipliers.muscle),
    ])?;

    if engine_params.fire_threshold <= 0.0 {
        return Err(SimpleError::new("fire_threshold must be strictly positive"));
    }

    if engine_params.activation_bound <= 0.0 {
        return Err(SimpleError::new(
            "activation_bound must be strictly positive",
        ));
    }

    if let SwapRule::Momentum { momentum, damping } = engine_params.swap_rule {
        if !(0.0..=1.0).contains(&momentum) {
            return Err(SimpleError::new("swap_rule: momentum must be in [0, 1]"));
        }

        if !damping.is_finite() || damping < 0.0 {
            return Err(SimpleError::new(
                "swap_rule: damping must not be negative",
            ));
        }
    }

    if !(0.0..=1.0).contains(&engine_params.movement_excite_probability) {
        return Err(SimpleError::new(
            "movement_excite_probability must be in [0, 1]",
        ));
    }

    let (first_segment, last_segment) = engine_params.motor_segment_range;
    if first_segment > last_segment {
        return Err(SimpleError::new(format!(
            "invalid motor_segment_range: {} > {}",
            first_segment, last_segment
        )));
    }

    if engine_params
        .muscle_prefixes
        .iter()
        .any(|prefix| prefix.is_empty())
    {
        return Err(SimpleError::new("muscle prefixes must not be empty"));
    }

    Ok(())
}

fn validate_motor_params(motor_params: &MotorParams) -> Result<(), SimpleError> {
    validate_finite(&[
        ("jitter", motor_params.jitter),
        ("amplification", motor_params.amplification),
        ("amplification_boost", motor_params.amplification_boost),
        ("scale_factor", motor_params.scale_factor),
        ("saturation", motor_params.saturation),
        ("asymmetry", motor_params.asymmetry),
        ("bias", motor_params.bias),
        ("min_threshold", motor_params.min_threshold),
        ("hysteresis", motor_params.hysteresis),
    ])?;

    if !(0.0..1.0).contains(&motor_params.jitter) {
        return Err(SimpleError::new("jitter must be in [0, 1)"));
    }

    if motor_params.amplification <= 0.0 {
        return Err(SimpleError::new("amplification must be strictly positive"));
    }

    if motor_params.amplification_boost < 0.0 {
        return Err(SimpleError::new(
            "amplification_boost must not be negative",
        ));
    }

    if motor_params.scale_factor <= 0.0 {
        return Err(SimpleError::new("scale_factor must be strictly positive"));
    }

    if motor_params.saturation <= 0.0 {
        return Err(SimpleError::new("saturation must be strictly positive"));
    }

    if !(0.0..1.0).contains(&motor_params.asymmetry) {
        return Err(SimpleError::new("asymmetry must be in [0, 1)"));
    }

    if !(0.0..1.0).contains(&motor_params.bias) {
        return Err(SimpleError::new("bias must be in [0, 1)"));
    }

    if motor_params.hysteresis < 0.0 || motor_params.hysteresis > motor_params.min_threshold {
        return Err(SimpleError::new(
            "hysteresis must be in [0, min_threshold]",
        ));
    }

    Ok(())
}

fn validate_stimulus_params(stimulus_params: &StimulusParams) -> Result<(), SimpleError> {
    let mut seen_names = HashSet::default();

    for drive in &stimulus_params.drives {
        if !seen_names.insert(drive.name.as_str()) {
            return Err(SimpleError::new(format!(
                "duplicate stimulation drive: {}",
                drive.name
            )));
        }
    }

    Ok(())
}

fn validate_locomotion_params(locomotion_params: &LocomotionParams) -> Result<(), SimpleError> {
    let bounds = &locomotion_params.bounds;
    validate_finite(&[
        ("bounds.min_x", bounds.min_x),
        ("bounds.min_y", bounds.min_y),
        ("bounds.max_x", bounds.max_x),
        ("bounds.max_y", bounds.max_y),
        ("steer_scale", locomotion_params.steer_scale),
        ("speed_scale", locomotion_params.speed_scale),
        ("speed_smoothing", locomotion_params.speed_smoothing),
        ("turn_step", locomotion_params.turn_step),
    ])?;

    if bounds.min_x >= bounds.max_x || bounds.min_y >= bounds.max_y {
        return Err(SimpleError::new("bounds must have a positive extent"));
    }

    if locomotion_params.steer_scale <= 0.0 {
        return Err(SimpleError::new("steer_scale must be strictly positive"));
    }

    if locomotion_params.speed_scale <= 0.0 {
        return Err(SimpleError::new("speed_scale must be strictly positive"));
    }

    if locomotion_params.speed_smoothing < 1.0 {
        return Err(SimpleError::new("speed_smoothing must be at least 1.0"));
    }

    if locomotion_params.turn_step <= 0.0 {
        return Err(SimpleError::new("turn_step must be strictly positive"));
    }

    if let BoundaryMode::Bounce { damping } = locomotion_params.boundary_mode {
        if !(0.0..=1.0).contains(&damping) {
            return Err(SimpleError::new("bounce damping must be in [0, 1]"));
        }
    }

    Ok(())
}

fn validate_body_params(body_params: &BodyParams) -> Result<(), SimpleError> {
    validate_finite(&[
        ("segment_size", body_params.segment_size),
        ("stiffness", body_params.stiffness),
        ("damping", body_params.damping),
        ("body_width", body_params.body_width),
        ("spawn_extent", body_params.spawn_extent),
    ])?;

    if body_params.segment_count == 0 {
        return Err(SimpleError::new("segment_count must be strictly positive"));
    }

    if body_params.segment_size <= 0.0 {
        return Err(SimpleError::new("segment_size must be strictly positive"));
    }

    if body_params.stiffness <= 0.0 || body_params.stiffness > 1.0 {
        return Err(SimpleError::new("stiffness must be in (0, 1]"));
    }

    if body_params.damping <= 0.0 || body_params.damping > 1.0 {
        return Err(SimpleError::new("damping must be in (0, 1]"));
    }

    if body_params.body_width < 0.0 {
        return Err(SimpleError::new("body_width must not be negative"));
    }

    for limb in &body_params.limbs {
        if limb.parent_segment >= body_params.segment_count {
            return Err(SimpleError::new(format!(
                "invalid limb parent_segment: {}",
                limb.parent_segment
            )));
        }

        if limb.segment_count == 0
            || !limb.segment_size.is_finite()
            || limb.segment_size <= 0.0
        {
            return Err(SimpleError::new(
                "limb segment_count and segment_size must be strictly positive",
            ));
        }
    }

    Ok(())
}

fn validate_schedule_params(schedule_params: &ScheduleParams) -> Result<(), SimpleError> {
    if schedule_params.neural_tick_ms == 0
        || schedule_params.render_tick_ms == 0
        || schedule_params.weight_refresh_ms == 0
        || schedule_params.position_sync_ms == 0
    {
        return Err(SimpleError::new("tick periods must be strictly positive"));
    }

    Ok(())
}

fn validate_network_params(network_params: &NetworkParams) -> Result<(), SimpleError> {
    if network_params.request_timeout_ms == 0 {
        return Err(SimpleError::new(
            "request_timeout_ms must be strictly positive",
        ));
    }

    for retry in [&network_params.weight_retry, &network_params.position_retry] {
        if retry.base_delay_ms == 0 {
            return Err(SimpleError::new(
                "retry base_delay_ms must be strictly positive",
            ));
        }
    }

    Ok(())
}
