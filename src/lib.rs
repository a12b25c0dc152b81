pub mod chain;
pub mod classification;
pub mod engine;
pub mod locomotion;
pub mod motor;
pub mod params;
pub mod position_sync;
pub mod readout;
pub mod session;
pub mod store;
pub mod types;
pub mod weights;

mod util;
