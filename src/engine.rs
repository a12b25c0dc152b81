use log::{debug, info, warn};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use simple_error::{try_with, SimpleError, SimpleResult};

use crate::{
    classification::RoleClassifier,
    motor::{MotorDrive, MotorIntegrator},
    params::{self, DriveParams, EngineParams, MotorParams, SimulationParams, StimulusParams, SwapRule},
    readout::NeuronReadout,
    types::NeuronId,
    util,
    weights::{Connectome, WeightMatrix},
};

/// Two-slot activation buffer. `current` is read by the fire pass, `next`
/// collects everything accumulated during the tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Activation {
    pub current: f32,
    pub next: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    /// No connectome loaded, ticks are no-ops.
    Inactive,
    Active,
}

#[derive(Debug, Clone)]
pub struct TickResult {
    pub t: usize,
    pub status: EngineStatus,
    pub fired_nids: Vec<NeuronId>,
    pub drive: MotorDrive,
    pub synaptic_transmission_count: usize,
}

#[derive(Debug, Clone)]
struct StimulationDrive {
    params: DriveParams,
    nids: Vec<NeuronId>,
}

pub fn create_engine(params: &SimulationParams) -> Result<NeuralEngine, SimpleError> {
    try_with!(
        params::validate_simulation_params(params),
        "invalid simulation parameters"
    );

    Ok(NeuralEngine::new(
        params.engine_params.clone(),
        params.motor_params.clone(),
        &params.stimulus_params,
    ))
}

pub struct NeuralEngine {
    params: EngineParams,
    classifier: RoleClassifier,
    connectome: Connectome,
    activations: Vec<Activation>,
    motor: MotorIntegrator,
    drives: Vec<StimulationDrive>,
    movement_nids: Vec<NeuronId>,
    fired_nid_buffer: Vec<NeuronId>,
    synaptic_transmission_count: usize,
    last_drive: MotorDrive,
    t: usize,
}

fn accumulate_into(connectome: &Connectome, activations: &mut [Activation], nid: NeuronId) -> usize {
    let projections = connectome.projections(nid);

    for projection in projections {
        activations[projection.target].next += projection.weight;
    }

    projections.len()
}

fn resolve_nids<'a>(
    connectome: &Connectome,
    names: impl Iterator<Item = &'a String>,
) -> Vec<NeuronId> {
    names.filter_map(|name| connectome.id(name)).collect()
}

impl NeuralEngine {
    pub fn new(
        engine_params: EngineParams,
        motor_params: MotorParams,
        stimulus_params: &StimulusParams,
    ) -> Self {
        Self {
            classifier: RoleClassifier::new(&engine_params),
            params: engine_params,
            connectome: Connectome::default(),
            activations: Vec::new(),
            motor: MotorIntegrator::new(motor_params),
            drives: stimulus_params
                .drives
                .iter()
                .map(|drive_params| StimulationDrive {
                    params: drive_params.clone(),
                    nids: Vec::new(),
                })
                .collect(),
            movement_nids: Vec::new(),
            fired_nid_buffer: Vec::new(),
            synaptic_transmission_count: 0,
            last_drive: MotorDrive::default(),
            t: 0,
        }
    }

    /// Replaces the connectome. All activation state is discarded, including the
    /// state of neurons that also appear in the new matrix.
    pub fn setup(&mut self, matrix: &WeightMatrix) {
        self.connectome =
            Connectome::build(matrix, &self.classifier, &self.params.role_multipliers);
        self.activations = vec![Activation::default(); self.connectome.num_neurons()];
        self.last_drive = MotorDrive::default();

        for drive in &mut self.drives {
            drive.nids = resolve_nids(&self.connectome, drive.params.neurons.iter());
        }
        self.movement_nids = resolve_nids(&self.connectome, self.params.movement_groups.iter());

        if self.connectome.is_empty() {
            warn!("empty weight matrix, engine inactive");
        } else {
            info!(
                "connectome loaded: {} neurons, {} sources, {} motor neurons",
                self.connectome.num_neurons(),
                self.connectome.sources().len(),
                self.connectome.motor_neurons().len()
            );
        }
    }

    pub fn status(&self) -> EngineStatus {
        if self.connectome.is_empty() {
            EngineStatus::Inactive
        } else {
            EngineStatus::Active
        }
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn connectome(&self) -> &Connectome {
        &self.connectome
    }

    pub fn get_tick_period(&self) -> usize {
        self.t
    }

    pub fn last_drive(&self) -> MotorDrive {
        self.last_drive
    }

    pub fn activation(&self, name: &str) -> Option<Activation> {
        self.connectome.id(name).map(|nid| self.activations[nid])
    }

    pub fn activations(&self) -> impl Iterator<Item = (&str, Activation)> + '_ {
        self.connectome
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.activations.iter().copied())
    }

    /// Adds the outgoing weights of `source` to the pending activation of its
    /// targets. Unknown sources are ignored.
    pub fn accumulate(&mut self, source: &str) {
        if let Some(nid) = self.connectome.id(source) {
            self.accumulate_nid(nid);
        }
    }

    fn accumulate_nid(&mut self, nid: NeuronId) {
        self.synaptic_transmission_count +=
            accumulate_into(&self.connectome, &mut self.activations, nid);
    }

    /// Background excitation: `n` uniformly chosen sources (with replacement),
    /// plus one movement neuron with `movement_excite_probability`.
    pub fn random_excite<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) {
        if self.connectome.sources().is_empty() {
            return;
        }

        if rng.gen_bool(self.params.movement_excite_probability) {
            if let Some(&nid) = self.movement_nids.choose(rng) {
                self.accumulate_nid(nid);
            }
        }

        for _ in 0..n {
            if let Some(&nid) = self.connectome.sources().choose(rng) {
                self.accumulate_nid(nid);
            }
        }
    }

    pub fn set_drive_enabled(&mut self, name: &str, enabled: bool) -> SimpleResult<()> {
        match self.drives.iter_mut().find(|drive| drive.params.name == name) {
            Some(drive) => {
                drive.params.enabled = enabled;
                Ok(())
            }
            None => Err(SimpleError::new(format!(
                "unknown stimulation drive: {}",
                name
            ))),
        }
    }

    pub fn is_drive_enabled(&self, name: &str) -> bool {
        self.drives
            .iter()
            .any(|drive| drive.params.name == name && drive.params.enabled)
    }

    /// Accumulates every enabled stimulation drive.
    pub fn stimulate(&mut self) {
        for drive in self.drives.iter().filter(|drive| drive.params.enabled) {
            for _ in 0..drive.params.repeat {
                for &nid in &drive.nids {
                    self.synaptic_transmission_count +=
                        accumulate_into(&self.connectome, &mut self.activations, nid);
                }
            }
        }
    }

    /// Full neural step: background excitation, stimulation drives, then [`tick`](Self::tick).
    pub fn update<R: Rng + ?Sized>(&mut self, rng: &mut R) -> TickResult {
        if self.status() == EngineStatus::Active {
            self.random_excite(self.params.random_excite_count, rng);
            self.stimulate();
        }

        self.tick(rng)
    }

    /// Fire pass, motor pass, swap pass. Afterwards every `current` is within
    /// the activation bound and every `next` is zero.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> TickResult {
        let t = self.t;
        self.t += 1;

        if self.status() == EngineStatus::Inactive {
            self.synaptic_transmission_count = 0;
            return TickResult {
                t,
                status: EngineStatus::Inactive,
                fired_nids: Vec::new(),
                drive: MotorDrive::default(),
                synaptic_transmission_count: 0,
            };
        }

        let fire_threshold = self.params.fire_threshold;

        for nid in 0..self.activations.len() {
            if self.activations[nid].current.abs() > fire_threshold
                && !self.connectome.role(nid).is_muscle()
            {
                self.fire(nid);
            }
        }

        let drive = self
            .motor
            .aggregate(&self.connectome, &mut self.activations, rng);
        self.last_drive = drive;

        self.swap();

        debug!(
            "t={}: {} fired, drive ({:.3}, {:.3})",
            t,
            self.fired_nid_buffer.len(),
            drive.left,
            drive.right
        );

        TickResult {
            t,
            status: EngineStatus::Active,
            fired_nids: self.fired_nid_buffer.drain(..).collect(),
            drive,
            synaptic_transmission_count: std::mem::take(&mut self.synaptic_transmission_count),
        }
    }

    fn fire(&mut self, nid: NeuronId) {
        self.accumulate_nid(nid);
        self.activations[nid].next = 0.0;
        self.fired_nid_buffer.push(nid);
    }

    fn swap(&mut self) {
        let bound = self.params.activation_bound;

        for activation in &mut self.activations {
            let combined = match self.params.swap_rule {
                SwapRule::Replace => activation.next,
                SwapRule::Momentum { momentum, damping } => {
                    let next = util::finite(activation.next);
                    (activation.current * momentum + next) / (1.0 + next.abs() * damping)
                }
            };

            activation.current = util::bounded(combined, bound);
            activation.next = 0.0;
        }
    }

    pub fn readout(&self) -> Vec<NeuronReadout> {
        let fire_threshold = self.params.fire_threshold;

        self.activations()
            .map(|(name, activation)| NeuronReadout {
                name: name.to_string(),
                activation: activation.current,
                intensity: (activation.current.abs() / fire_threshold).min(1.0),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        params::{MotorParams, HUNGER_DRIVE, TOUCH_DRIVE},
        weights::parse_weight_matrix,
    };
    use float_cmp::assert_approx_eq;
    use itertools::assert_equal;
    use rand::{rngs::StdRng, SeedableRng};

    fn engine_params(swap_rule: SwapRule) -> EngineParams {
        EngineParams {
            swap_rule,
            movement_excite_probability: 0.0,
            ..EngineParams::default()
        }
    }

    fn make_engine(json_str: &str, swap_rule: SwapRule) -> NeuralEngine {
        let stimulus_params = StimulusParams { drives: Vec::new() };
        let mut engine = NeuralEngine::new(
            engine_params(swap_rule),
            MotorParams::deterministic(),
            &stimulus_params,
        );
        engine.setup(&parse_weight_matrix(json_str).unwrap());
        engine
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn accumulate_adds_weights_to_next() {
        let mut sut = make_engine(r#"{"A": {"B": 2.0, "C": -1.5}}"#, SwapRule::Replace);

        sut.accumulate("A");
        sut.accumulate("A");

        assert_approx_eq!(f32, sut.activation("B").unwrap().next, 4.0);
        assert_approx_eq!(f32, sut.activation("C").unwrap().next, -3.0);
        assert_eq!(sut.activation("A").unwrap(), Activation::default());
    }

    #[test]
    fn accumulate_without_edges_is_noop() {
        let mut sut = make_engine(r#"{"A": {"B": 2.0}, "D": {}}"#, SwapRule::Replace);
        sut.accumulate("A");
        let before: Vec<_> = sut.activations().map(|(_, a)| a).collect();

        sut.accumulate("D");
        sut.accumulate("B");
        sut.accumulate("unknown");

        assert_equal(sut.activations().map(|(_, a)| a), before);
    }

    #[test]
    fn fire_threshold_scenario() {
        let mut sut = make_engine(r#"{"A": {"B": 20.0}}"#, SwapRule::Replace);
        let mut rng = rng();

        sut.accumulate("A");
        let tick_0 = sut.tick(&mut rng);
        assert!(tick_0.fired_nids.is_empty());
        assert_eq!(
            sut.activation("B").unwrap(),
            Activation {
                current: 20.0,
                next: 0.0
            }
        );

        let tick_1 = sut.tick(&mut rng);
        let b = sut.connectome().id("B").unwrap();
        assert_equal(tick_1.fired_nids, [b]);
        assert_eq!(sut.activation("B").unwrap(), Activation::default());
    }

    #[test]
    fn momentum_swap() {
        let mut sut = make_engine(
            r#"{"A": {"B": 20.0}}"#,
            SwapRule::Momentum {
                momentum: 0.8,
                damping: 0.05,
            },
        );
        let mut rng = rng();

        sut.accumulate("A");
        sut.tick(&mut rng);
        assert_approx_eq!(f32, sut.activation("B").unwrap().current, 10.0);

        // B fires (10 > 5) but has no edges, its pending input is discarded
        sut.tick(&mut rng);
        assert_approx_eq!(f32, sut.activation("B").unwrap().current, 8.0);
    }

    #[test]
    fn firing_neuron_discards_own_pending_input() {
        let mut sut = make_engine(r#"{"A": {"B": 2.0, "A": 3.0}}"#, SwapRule::Replace);
        let mut rng = rng();

        sut.accumulate("A");
        sut.accumulate("A");
        sut.tick(&mut rng);
        assert_approx_eq!(f32, sut.activation("A").unwrap().current, 6.0);
        assert_approx_eq!(f32, sut.activation("B").unwrap().current, 4.0);

        // A fires into itself and B, but its own pending input is discarded
        let tick_result = sut.tick(&mut rng);
        let a = sut.connectome().id("A").unwrap();
        assert_equal(tick_result.fired_nids, [a]);
        assert_approx_eq!(f32, sut.activation("A").unwrap().current, 0.0);
        assert_approx_eq!(f32, sut.activation("B").unwrap().current, 2.0);
    }

    #[test]
    fn activation_is_clamped() {
        let mut sut = make_engine(r#"{"A": {"B": 1000.0, "C": -1000.0}}"#, SwapRule::Replace);
        let mut rng = rng();

        sut.accumulate("A");
        sut.tick(&mut rng);

        assert_approx_eq!(f32, sut.activation("B").unwrap().current, 50.0);
        assert_approx_eq!(f32, sut.activation("C").unwrap().current, -50.0);
    }

    #[test]
    fn overflowing_input_stays_bounded() {
        let mut sut = make_engine(
            r#"{"A": {"B": 3.0e38}}"#,
            SwapRule::Momentum {
                momentum: 0.8,
                damping: 0.05,
            },
        );
        let mut rng = rng();

        for _ in 0..4 {
            sut.accumulate("A");
        }
        sut.tick(&mut rng);

        let b = sut.activation("B").unwrap();
        assert!(b.current.is_finite());
        assert!(b.current.abs() <= 50.0);
    }

    #[test]
    fn muscles_never_fire() {
        let mut sut = make_engine(
            r#"{"A": {"MDL07": 30.0, "MVULVA": 30.0, "B": 30.0}, "MDL07": {"B": 1.0}}"#,
            SwapRule::Momentum {
                momentum: 1.0,
                damping: 0.0,
            },
        );
        let mut rng = rng();

        for _ in 0..5 {
            sut.accumulate("A");
            let tick_result = sut.tick(&mut rng);
            assert!(tick_result
                .fired_nids
                .iter()
                .all(|nid| !sut.connectome().role(*nid).is_muscle()));
        }
    }

    #[test]
    fn motor_pass_drives_left() {
        let mut sut = make_engine(r#"{"VA1": {"MDL07": 2.0, "MVL07": 1.0}}"#, SwapRule::Replace);
        let mut rng = rng();

        sut.accumulate("VA1");
        let tick_result = sut.tick(&mut rng);

        assert!(tick_result.drive.left > 0.0);
        assert_eq!(tick_result.drive.right, 0.0);
        assert_eq!(sut.last_drive(), tick_result.drive);
        assert_eq!(sut.activation("MDL07").unwrap(), Activation::default());
    }

    #[test]
    fn empty_matrix_is_inactive() {
        let mut sut = make_engine("{}", SwapRule::Replace);
        let mut rng = rng();

        assert_eq!(sut.status(), EngineStatus::Inactive);
        sut.accumulate("A");
        sut.random_excite(10, &mut rng);

        let tick_result = sut.update(&mut rng);
        assert_eq!(tick_result.status, EngineStatus::Inactive);
        assert_eq!(tick_result.drive, MotorDrive::default());
        assert!(sut.readout().is_empty());
    }

    #[test]
    fn setup_discards_previous_state() {
        let mut sut = make_engine(r#"{"A": {"B": 2.0}, "C": {"B": 1.0}}"#, SwapRule::Replace);
        let mut rng = rng();
        sut.accumulate("A");
        sut.tick(&mut rng);

        sut.setup(&parse_weight_matrix(r#"{"A": {"D": 1.0}}"#).unwrap());

        assert_eq!(sut.status(), EngineStatus::Active);
        assert!(sut.activation("B").is_none());
        assert!(sut.activation("C").is_none());
        assert_eq!(sut.activation("D").unwrap(), Activation::default());
    }

    #[test]
    fn random_excite_only_uses_sources() {
        let mut sut = make_engine(r#"{"A": {"B": 1.0}, "C": {"D": 1.0}}"#, SwapRule::Replace);
        let mut rng = rng();

        sut.random_excite(100, &mut rng);

        let b = sut.activation("B").unwrap().next;
        let d = sut.activation("D").unwrap().next;
        assert_approx_eq!(f32, b + d, 100.0);
        assert!(b > 0.0 && d > 0.0);
        assert_eq!(sut.activation("A").unwrap().next, 0.0);
    }

    #[test]
    fn stimulation_drives() {
        let stimulus_params = StimulusParams::default();
        let mut sut = NeuralEngine::new(
            engine_params(SwapRule::Replace),
            MotorParams::deterministic(),
            &stimulus_params,
        );
        sut.setup(&parse_weight_matrix(r#"{"RIML": {"X": 1.0}, "FLPL": {"Y": 1.0}}"#).unwrap());

        assert!(sut.is_drive_enabled(HUNGER_DRIVE));
        assert!(!sut.is_drive_enabled(TOUCH_DRIVE));

        sut.stimulate();
        assert_approx_eq!(f32, sut.activation("X").unwrap().next, 2.0);
        assert_approx_eq!(f32, sut.activation("Y").unwrap().next, 0.0);

        sut.set_drive_enabled(TOUCH_DRIVE, true).unwrap();
        sut.set_drive_enabled(HUNGER_DRIVE, false).unwrap();
        sut.stimulate();
        assert_approx_eq!(f32, sut.activation("X").unwrap().next, 2.0);
        assert_approx_eq!(f32, sut.activation("Y").unwrap().next, 2.0);

        let result = sut.set_drive_enabled("thirst", true);
        assert_eq!(
            result.unwrap_err().as_str(),
            "unknown stimulation drive: thirst"
        );
    }

    #[test]
    fn tick_postcondition() {
        let mut sut = make_engine(
            r#"{"A": {"B": 30.0, "C": -12.0}, "B": {"A": 8.0, "C": 40.0}, "C": {"A": -25.0, "MDR07": 9.0}}"#,
            SwapRule::default(),
        );
        let mut rng = rng();

        for _ in 0..50 {
            sut.random_excite(5, &mut rng);
            sut.tick(&mut rng);

            for (_, activation) in sut.activations() {
                assert!(activation.current.abs() <= 50.0);
                assert_eq!(activation.next, 0.0);
            }
        }
    }

    #[test]
    fn readout_intensity() {
        let mut sut = make_engine(r#"{"A": {"B": 2.5, "C": -40.0}}"#, SwapRule::Replace);
        let mut rng = rng();
        sut.accumulate("A");
        sut.tick(&mut rng);

        let readout = sut.readout();
        assert_equal(
            readout.iter().map(|r| (r.name.as_str(), r.intensity)),
            [("A", 0.0), ("B", 0.5), ("C", 1.0)],
        );
        assert_approx_eq!(f32, readout[2].activation, -40.0);
    }

    #[test]
    fn invalid_params_rejected() {
        let mut params = SimulationParams::default();
        params.engine_params.activation_bound = -1.0;
        let result = create_engine(&params);
        assert!(result.is_err());
    }
}
