use crate::{
    params::{EngineParams, RoleMultipliers, Side},
    types::HashMap,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuscleClass {
    DorsalLeft,
    VentralLeft,
    DorsalRight,
    VentralRight,
}

impl MuscleClass {
    pub fn side(&self) -> Side {
        match self {
            MuscleClass::DorsalLeft | MuscleClass::VentralLeft => Side::Left,
            MuscleClass::DorsalRight | MuscleClass::VentralRight => Side::Right,
        }
    }

    /// Body-wall muscles follow the `M{D|V}{L|R}nn` naming convention.
    fn parse(name: &str, segment_range: (u32, u32)) -> Option<Self> {
        let class = match name.get(..3)? {
            "MDL" => MuscleClass::DorsalLeft,
            "MVL" => MuscleClass::VentralLeft,
            "MDR" => MuscleClass::DorsalRight,
            "MVR" => MuscleClass::VentralRight,
            _ => return None,
        };

        let segment: u32 = name.get(3..)?.parse().ok()?;
        let (first_segment, last_segment) = segment_range;

        if (first_segment..=last_segment).contains(&segment) {
            Some(class)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeuronRole {
    Interneuron,
    Forward,
    Backward,
    Turn,
    /// Read-out only, never fires. Muscles outside the motor classes carry `None`
    /// and do not contribute to the motor drive.
    Muscle(Option<MuscleClass>),
}

impl NeuronRole {
    pub fn is_muscle(&self) -> bool {
        matches!(self, NeuronRole::Muscle(_))
    }

    pub fn muscle_class(&self) -> Option<MuscleClass> {
        match self {
            NeuronRole::Muscle(class) => *class,
            _ => None,
        }
    }

    pub fn multiplier(&self, multipliers: &RoleMultipliers) -> f32 {
        match self {
            NeuronRole::Interneuron => multipliers.interneuron,
            NeuronRole::Forward => multipliers.forward,
            NeuronRole::Backward => multipliers.backward,
            NeuronRole::Turn => multipliers.turn,
            NeuronRole::Muscle(_) => multipliers.muscle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoleClassifier {
    muscle_prefixes: Vec<String>,
    motor_segment_range: (u32, u32),
    movement_roles: HashMap<String, NeuronRole>,
}

impl RoleClassifier {
    pub fn new(engine_params: &EngineParams) -> Self {
        let groups = &engine_params.movement_groups;
        let mut movement_roles = HashMap::default();

        for (role, group) in [
            (NeuronRole::Forward, &groups.forward),
            (NeuronRole::Backward, &groups.backward),
            (NeuronRole::Turn, &groups.turn),
        ] {
            for name in group {
                movement_roles.entry(name.clone()).or_insert(role);
            }
        }

        Self {
            muscle_prefixes: engine_params.muscle_prefixes.clone(),
            motor_segment_range: engine_params.motor_segment_range,
            movement_roles,
        }
    }

    pub fn classify(&self, name: &str) -> NeuronRole {
        if self
            .muscle_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
        {
            NeuronRole::Muscle(MuscleClass::parse(name, self.motor_segment_range))
        } else {
            self.movement_roles
                .get(name)
                .copied()
                .unwrap_or(NeuronRole::Interneuron)
        }
    }
}
