use std::time::Instant;

use rand::{prelude::Distribution, rngs::StdRng, seq::SliceRandom, SeedableRng};
use statrs::distribution::Poisson;
use wormsim::{chain::Body, engine, types::Point};

#[path = "../scenario_params.rs"]
mod scenario_params;

fn main() {
    let params = scenario_params::get_scenario_params();
    let mut engine = engine::create_engine(&params).unwrap();
    let matrix = scenario_params::get_scenario_matrix(0);
    engine.setup(&matrix);

    let source_names: Vec<String> = matrix.keys().cloned().collect();
    let mut rng = StdRng::seed_from_u64(0);

    let mut fire_count = 0usize;
    let mut synaptic_transmission_count = 0usize;
    let mut checksum = 0;
    let t_stop = 50000;

    let num_extra_stimuli_dist = Poisson::new(5.0).unwrap();

    let wall_start = Instant::now();

    for _ in 0..t_stop {
        let num_extra_stimuli = num_extra_stimuli_dist.sample(&mut rng) as usize;

        for _ in 0..num_extra_stimuli {
            if let Some(name) = source_names.choose(&mut rng) {
                engine.accumulate(name);
            }
        }

        let tick_result = engine.update(&mut rng);

        fire_count += tick_result.fired_nids.len();
        synaptic_transmission_count += tick_result.synaptic_transmission_count;

        for nid in tick_result.fired_nids {
            checksum += nid;
        }
    }

    let wall_time = wall_start.elapsed();
    let synaptic_transm_proc_throughput =
        synaptic_transmission_count as f64 / wall_time.as_secs_f64();

    eprintln!("Firings per tick: {}", fire_count as f64 / t_stop as f64);
    eprintln!(
        "Synaptic transmission processing throughput: {:.3e} ({:.3} ns per transmission)",
        synaptic_transm_proc_throughput,
        1e9 / synaptic_transm_proc_throughput
    );
    eprintln!("Checksum: {}", checksum);

    let mut body = Body::random(&params.body_params, &mut rng);
    let num_body_updates = 200000;

    let wall_start = Instant::now();

    for i in 0..num_body_updates {
        let phase = i as f32 * 0.01;
        body.update(Point::new(640.0 + phase.cos() * 200.0, 360.0 + phase.sin() * 200.0));
    }

    let wall_time = wall_start.elapsed();

    eprintln!(
        "Body update: {:.3} us per update, max spine strain {:.3e}",
        wall_time.as_secs_f64() * 1e6 / num_body_updates as f64,
        body.spine().max_strain()
    );
}
