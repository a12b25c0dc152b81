use std::time::Duration;

use wormsim::session;

#[path = "../scenario_params.rs"]
mod scenario_params;

fn main() {
    let params = scenario_params::get_scenario_params();
    let render_tick_period = params.schedule_params.render_tick_period();
    let render_ticks_per_neural_tick =
        (params.schedule_params.neural_tick_ms / params.schedule_params.render_tick_ms) as usize;

    let mut simulation = session::create_simulation(&params).unwrap();
    simulation.set_matrix(&scenario_params::get_scenario_matrix(0));

    let mut fired_nid_checksum = 0;
    let mut synaptic_transmission_count = 0usize;
    let mut drive_checksum = 0.0f64;
    let mut touch_count = 0usize;
    let t_stop = 200;

    for _ in 0..t_stop {
        let tick_result = simulation.neural_tick();

        synaptic_transmission_count += tick_result.synaptic_transmission_count;
        drive_checksum += tick_result.drive.left as f64 - tick_result.drive.right as f64;

        for nid in tick_result.fired_nids {
            fired_nid_checksum += tick_result.t * nid;
        }

        for _ in 0..render_ticks_per_neural_tick {
            if simulation.render_tick(render_tick_period).touched {
                touch_count += 1;
            }
        }
    }

    println!("batch result:");
    println!("...fired nid checksum: {}", fired_nid_checksum);
    println!(
        "...synaptic transmission count: {}",
        synaptic_transmission_count
    );
    println!("...drive checksum: {}", drive_checksum);
    println!("...touch count: {}", touch_count);

    let activation_checksum: f64 = simulation
        .readout()
        .iter()
        .map(|readout| readout.activation as f64)
        .sum();

    let pose = simulation.pose();
    let pose_checksum: f64 = pose
        .spine
        .iter()
        .chain(pose.limbs.iter().flatten())
        .map(|segment| segment.head.x as f64 + segment.head.y as f64 * 2.0)
        .sum();

    let state = simulation.locomotion().state();

    println!("single result:");
    println!("...activation checksum: {}", activation_checksum);
    println!("...pose checksum: {}", pose_checksum);
    println!("...position: ({}, {})", state.x, state.y);
    println!("...facing: {}", state.facing_dir);
    println!(
        "...elapsed: {:?}",
        Duration::from_millis(params.schedule_params.neural_tick_ms * t_stop as u64)
    );
}
