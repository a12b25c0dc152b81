use rand::{prelude::Distribution, rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use statrs::distribution::Poisson;
use wormsim::{
    params::{SimulationParams, StimulusParams},
    weights::WeightMatrix,
};

pub fn get_scenario_params() -> SimulationParams {
    let params_yaml_str = r#"
engine_params:
  fire_threshold: 5.0
  activation_bound: 50.0
  swap_rule: !Momentum
    momentum: 0.8
    damping: 0.05
  random_excite_count: 40
  movement_excite_probability: 0.3
  muscle_prefixes: [MVU, MVL, MDL, MVR, MDR]
  motor_segment_range: [7, 23]
motor_params:
  jitter: 0.15
  amplification: 3.0
  amplification_boost: 0.5
  scale_factor: 8.0
  saturation: 3.0
  asymmetry: 0.1
  bias: 0.2
  min_threshold: 0.01
  hysteresis: 0.005
locomotion_params:
  bounds:
    min_x: 0.0
    min_y: 0.0
    max_x: 1280.0
    max_y: 720.0
  steer_scale: 20.0
  speed_scale: 100.0
  speed_smoothing: 30.0
  turn_step: 0.1
  boundary_mode: !Bounce
    damping: 0.5
body_params:
  segment_count: 48
  segment_size: 1.0
  stiffness: 0.998
  damping: 0.99
  body_width: 32.0
  spawn_extent: 500.0
  limbs:
  - parent_segment: 8
    side: Left
    segment_count: 3
    segment_size: 4.0
  - parent_segment: 8
    side: Right
    segment_count: 3
    segment_size: 4.0
  - parent_segment: 28
    side: Left
    segment_count: 3
    segment_size: 4.0
  - parent_segment: 28
    side: Right
    segment_count: 3
    segment_size: 4.0
schedule_params:
  neural_tick_ms: 500
  render_tick_ms: 16
  weight_refresh_ms: 180000
  position_sync_ms: 500
  touch_hold_ms: 2000
technical_params:
  seed_override: 0
"#;

    serde_yaml::from_str(params_yaml_str).unwrap()
}

/// Synthetic connectome over the default stimulation and movement neurons,
/// 200 interneurons and the four body wall muscle rows.
pub fn get_scenario_matrix(seed: u64) -> WeightMatrix {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut sources: Vec<String> = StimulusParams::default()
        .drives
        .into_iter()
        .flat_map(|drive| drive.neurons)
        .collect();
    sources.extend((0..200).map(|idx| format!("I{:03}", idx)));
    sources.sort();
    sources.dedup();

    let mut targets = sources.clone();
    for prefix in ["MDL", "MVL", "MDR", "MVR"] {
        targets.extend((1..=24).map(|segment| format!("{}{:02}", prefix, segment)));
    }

    let out_degree_dist = Poisson::new(6.0).unwrap();
    let mut matrix = WeightMatrix::default();

    for source in sources {
        let out_degree = out_degree_dist.sample(&mut rng) as usize;
        let projections = targets
            .choose_multiple(&mut rng, out_degree)
            .map(|target| (target.clone(), rng.gen_range(-3.0..8.0)))
            .collect::<Vec<_>>();
        matrix.insert(source, projections.into_iter().collect());
    }

    matrix
}
