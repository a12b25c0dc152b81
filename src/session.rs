use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use simple_error::{SimpleError, SimpleResult};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    chain::Body,
    engine::{self, EngineStatus, NeuralEngine, TickResult},
    locomotion::{LocomotionController, StepResult},
    params::{SimulationParams, FOOD_SENSE_DRIVE, HUNGER_DRIVE, TOUCH_DRIVE},
    position_sync::{self, Debouncer, PositionRecord, PositionSink, SyncStatus},
    readout::{BodyPose, Frame, NeuronReadout},
    store::{self, RefreshStatus, WeightStore},
    weights::WeightMatrix,
};

/// The organism: neural engine, locomotion and body, advanced by explicit
/// neural and render ticks.
pub struct Simulation {
    params: SimulationParams,
    engine: NeuralEngine,
    locomotion: LocomotionController,
    body: Body,
    rng: StdRng,
    /// Time left until the touch drive is released.
    touch: Option<Duration>,
    refresh_status: RefreshStatus,
    sync_status: SyncStatus,
}

pub fn create_simulation(params: &SimulationParams) -> Result<Simulation, SimpleError> {
    let engine = engine::create_engine(params)?;

    let mut rng = match params.technical_params.seed_override {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let body = Body::random(&params.body_params, &mut rng);
    let locomotion = LocomotionController::centered(params.locomotion_params.clone());

    Ok(Simulation {
        params: params.clone(),
        engine,
        locomotion,
        body,
        rng,
        touch: None,
        refresh_status: RefreshStatus::Pending,
        sync_status: SyncStatus::Idle,
    })
}

impl Simulation {
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn engine(&self) -> &NeuralEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut NeuralEngine {
        &mut self.engine
    }

    pub fn locomotion(&self) -> &LocomotionController {
        &self.locomotion
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn refresh_status(&self) -> &RefreshStatus {
        &self.refresh_status
    }

    pub fn sync_status(&self) -> &SyncStatus {
        &self.sync_status
    }

    pub fn is_touching(&self) -> bool {
        self.touch.is_some()
    }

    /// Replaces the connectome wholesale.
    pub fn set_matrix(&mut self, matrix: &WeightMatrix) {
        self.engine.setup(matrix);
        self.refresh_status = RefreshStatus::Loaded {
            num_neurons: self.engine.connectome().num_neurons(),
        };
    }

    pub fn set_refresh_failed(&mut self, message: String) {
        self.refresh_status = RefreshStatus::Failed(message);
    }

    pub fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }

    pub fn restore_position(&mut self, record: &PositionRecord) {
        self.locomotion.restore(record.state());
    }

    pub fn position_record(&self) -> PositionRecord {
        PositionRecord::now(self.locomotion.state())
    }

    /// Excitation, stimulation and one engine tick; the resulting drive sets
    /// the locomotion targets.
    pub fn neural_tick(&mut self) -> TickResult {
        let result = self.engine.update(&mut self.rng);

        if result.status == EngineStatus::Active {
            self.locomotion.apply_drive(result.drive);
        }

        result
    }

    /// Moves the target by one step and relaxes the body onto it. Boundary
    /// contact engages the touch drive until the hold time has passed without
    /// contact, after which the organism is hungry again.
    pub fn render_tick(&mut self, elapsed: Duration) -> StepResult {
        let step = self.locomotion.step();
        self.body.update(self.locomotion.target());

        if step.touched {
            if self.touch.is_none() {
                self.switch_drive(TOUCH_DRIVE, true);
            }
            self.touch = Some(self.params.schedule_params.touch_hold());
        } else if let Some(remaining) = self.touch {
            let remaining = remaining.saturating_sub(elapsed);
            if remaining.is_zero() {
                self.switch_drive(HUNGER_DRIVE, true);
                self.switch_drive(TOUCH_DRIVE, false);
                self.switch_drive(FOOD_SENSE_DRIVE, false);
                self.touch = None;
            } else {
                self.touch = Some(remaining);
            }
        }

        step
    }

    fn switch_drive(&mut self, name: &str, enabled: bool) {
        if let Err(e) = self.engine.set_drive_enabled(name, enabled) {
            debug!("{}", e);
        }
    }

    pub fn readout(&self) -> Vec<NeuronReadout> {
        self.engine.readout()
    }

    pub fn pose(&self) -> BodyPose {
        self.body.pose()
    }

    pub fn frame(&self) -> Frame {
        Frame {
            neurons: self.readout(),
            pose: self.pose(),
            locomotion: *self.locomotion.state(),
            drive: self.engine.last_drive(),
            engine_status: self.engine.status(),
            refresh_status: self.refresh_status.clone(),
            sync_status: self.sync_status.clone(),
        }
    }
}

/// Drives a [`Simulation`] in real time on the current task: neural, render,
/// weight refresh and position sync intervals in one loop.
pub struct Session {
    simulation: Simulation,
    weight_store: Arc<dyn WeightStore>,
    position_sink: Option<Arc<dyn PositionSink>>,
    frames: watch::Sender<Frame>,
}

fn abort(task: &mut Option<JoinHandle<()>>) {
    if let Some(task) = task.take() {
        task.abort();
    }
}

fn is_idle(task: &Option<JoinHandle<()>>) -> bool {
    task.as_ref().map_or(true, JoinHandle::is_finished)
}

impl Session {
    pub fn new(simulation: Simulation, weight_store: Arc<dyn WeightStore>) -> Self {
        let (frames, _) = watch::channel(simulation.frame());

        Self {
            simulation,
            weight_store,
            position_sink: None,
            frames,
        }
    }

    pub fn with_position_sink(mut self, position_sink: Arc<dyn PositionSink>) -> Self {
        self.position_sink = Some(position_sink);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Frame> {
        self.frames.subscribe()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    async fn restore_position(&mut self) {
        let Some(sink) = &self.position_sink else {
            return;
        };
        let timeout = self.simulation.params.network_params.request_timeout();

        match time::timeout(timeout, sink.load()).await {
            Ok(Ok(Some(record))) => {
                info!("restored position ({}, {})", record.x, record.y);
                self.simulation.restore_position(&record);
            }
            Ok(Ok(None)) => info!("no stored position, starting at the center"),
            Ok(Err(e)) => warn!("unable to restore position: {}", e),
            Err(_) => warn!("position restore timed out"),
        }
    }

    /// Runs until `shutdown` turns true or its sender is dropped. In-flight
    /// requests are aborted and their results discarded.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Simulation {
        let schedule = self.simulation.params.schedule_params.clone();
        let network = self.simulation.params.network_params.clone();

        self.restore_position().await;

        let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel::<SimpleResult<WeightMatrix>>();
        let (sync_tx, mut sync_rx) = mpsc::unbounded_channel::<SimpleResult<u64>>();
        let mut refresh_task: Option<JoinHandle<()>> = None;
        let mut sync_task: Option<JoinHandle<()>> = None;
        let mut debouncer = Debouncer::new(network.min_update_interval());

        let mut neural_interval = time::interval(schedule.neural_tick_period());
        let mut render_interval = time::interval(schedule.render_tick_period());
        let mut refresh_interval = time::interval(schedule.weight_refresh_period());
        let mut sync_interval = time::interval(schedule.position_sync_period());
        render_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        sync_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_render = Instant::now();

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = neural_interval.tick() => {
                    let result = self.simulation.neural_tick();
                    debug!("neural tick {}: drive {:?}", result.t, result.drive);
                }
                _ = render_interval.tick() => {
                    let now = Instant::now();
                    self.simulation.render_tick(now.duration_since(last_render));
                    last_render = now;
                    self.frames.send_replace(self.simulation.frame());
                }
                _ = refresh_interval.tick() => {
                    if is_idle(&refresh_task) {
                        let weight_store = Arc::clone(&self.weight_store);
                        let refresh_tx = refresh_tx.clone();
                        let retry = network.weight_retry;
                        let timeout = network.request_timeout();

                        refresh_task = Some(tokio::spawn(async move {
                            let result =
                                store::fetch_with_retry(weight_store.as_ref(), retry, timeout).await;
                            let _ = refresh_tx.send(result);
                        }));
                    }
                }
                Some(result) = refresh_rx.recv() => match result {
                    Ok(matrix) => self.simulation.set_matrix(&matrix),
                    Err(e) => {
                        warn!("weight refresh failed, keeping the previous matrix: {}", e);
                        self.simulation.set_refresh_failed(e.to_string());
                    }
                },
                _ = sync_interval.tick(), if self.position_sink.is_some() => {
                    if is_idle(&sync_task) && debouncer.ready(Instant::now()) {
                        if let Some(sink) = &self.position_sink {
                            let sink = Arc::clone(sink);
                            let sync_tx = sync_tx.clone();
                            let record = self.simulation.position_record();
                            let retry = network.position_retry;
                            let timeout = network.request_timeout();

                            sync_task = Some(tokio::spawn(async move {
                                let result =
                                    position_sync::store_with_retry(sink.as_ref(), &record, retry, timeout)
                                        .await
                                        .map(|()| record.timestamp);
                                let _ = sync_tx.send(result);
                            }));
                        }
                    }
                }
                Some(result) = sync_rx.recv() => {
                    let status = match result {
                        Ok(timestamp) => SyncStatus::Synced { timestamp },
                        Err(e) => {
                            warn!("position sync failed, keeping the local position: {}", e);
                            SyncStatus::Failed(e.to_string())
                        }
                    };
                    self.simulation.set_sync_status(status);
                }
            }
        }

        abort(&mut refresh_task);
        abort(&mut sync_task);
        info!("session stopped after {} neural ticks", self.simulation.engine.get_tick_period());

        self.simulation
    }
}
