use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    engine::Activation,
    params::{MotorParams, Side},
    util,
    weights::Connectome,
};

/// Left/right steering output of one neural tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorDrive {
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Clone)]
pub struct MotorIntegrator {
    params: MotorParams,
}

/// Uniform sample in `[-half_width, half_width]`. A zero width draws nothing.
fn symmetric<R: Rng + ?Sized>(rng: &mut R, half_width: f32) -> f32 {
    if half_width == 0.0 {
        0.0
    } else {
        rng.gen_range(-half_width..=half_width)
    }
}

fn unit<R: Rng + ?Sized>(rng: &mut R, width: f32) -> f32 {
    if width == 0.0 {
        0.0
    } else {
        rng.gen::<f32>() * width
    }
}

impl MotorIntegrator {
    pub fn new(params: MotorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MotorParams {
        &self.params
    }

    /// Sums the pending activation of every motor neuron into a side, clearing
    /// it, and squashes both sums into a bounded drive.
    pub fn aggregate<R: Rng + ?Sized>(
        &self,
        connectome: &Connectome,
        activations: &mut [Activation],
        rng: &mut R,
    ) -> MotorDrive {
        let params = &self.params;
        let mut accum_left = 0.0;
        let mut accum_right = 0.0;

        for &(nid, class) in connectome.motor_neurons() {
            let activation = &mut activations[nid];
            let mut value = activation.next * (1.0 + symmetric(rng, params.jitter));
            value *= params.amplification * (1.0 + unit(rng, params.amplification_boost));

            let value = util::finite(value);
            match class.side() {
                Side::Left => accum_left = util::finite(accum_left + value),
                Side::Right => accum_right = util::finite(accum_right + value),
            }

            activation.next = 0.0;
        }

        let asymmetry = symmetric(rng, params.asymmetry);
        let bias = symmetric(rng, params.bias);

        MotorDrive {
            left: self.gate(self.squash(accum_left, (1.0 + asymmetry) * (1.0 + bias))),
            right: self.gate(self.squash(accum_right, (1.0 - asymmetry) * (1.0 - bias))),
        }
    }

    /// `tanh` saturation, bounded by `scale_factor * saturation` for any input.
    pub fn squash(&self, accum: f32, gain: f32) -> f32 {
        let scale = self.params.scale_factor;
        (accum / scale * gain).tanh() * scale * self.params.saturation
    }

    fn gate(&self, drive: f32) -> f32 {
        let threshold = self.params.min_threshold - self.params.hysteresis;
        if !drive.is_finite() || drive.abs() < threshold {
            0.0
        } else {
            drive
        }
    }
}
