use itertools::Itertools;
use log::warn;
use simple_error::{try_with, SimpleResult};

use crate::{
    classification::{MuscleClass, NeuronRole, RoleClassifier},
    params::RoleMultipliers,
    types::{HashMap, NeuronId},
};

/// Source neuron -> target neuron -> signed synaptic weight.
pub type WeightMatrix = HashMap<String, HashMap<String, f32>>;

/// Parses the weight store payload. `null` is accepted as "no connectome".
pub fn parse_weight_matrix(json_str: &str) -> SimpleResult<WeightMatrix> {
    let matrix: Option<WeightMatrix> =
        try_with!(serde_json::from_str(json_str), "malformed weight matrix");
    Ok(matrix.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub target: NeuronId,
    pub weight: f32,
}

/// Indexed form of a [`WeightMatrix`], rebuilt on every load.
#[derive(Debug, Clone, Default)]
pub struct Connectome {
    names: Vec<String>,
    ids: HashMap<String, NeuronId>,
    roles: Vec<NeuronRole>,
    projections: Vec<Vec<Projection>>,
    sources: Vec<NeuronId>,
    motor_neurons: Vec<(NeuronId, MuscleClass)>,
}

impl Connectome {
    pub fn build(
        matrix: &WeightMatrix,
        classifier: &RoleClassifier,
        multipliers: &RoleMultipliers,
    ) -> Self {
        let names: Vec<String> = matrix
            .iter()
            .flat_map(|(source, targets)| std::iter::once(source).chain(targets.keys()))
            .sorted()
            .dedup()
            .cloned()
            .collect();

        let ids: HashMap<String, NeuronId> = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id))
            .collect();

        let roles: Vec<NeuronRole> = names.iter().map(|name| classifier.classify(name)).collect();

        let mut projections = vec![Vec::new(); names.len()];

        for (source, targets) in matrix {
            let source_id = ids[source];
            projections[source_id] = targets
                .iter()
                .sorted_by(|a, b| a.0.cmp(b.0))
                .filter_map(|(target, weight)| {
                    if !weight.is_finite() {
                        warn!("dropping non-finite weight {} -> {}", source, target);
                        return None;
                    }

                    let target_id = ids[target];
                    Some(Projection {
                        target: target_id,
                        weight: weight * roles[target_id].multiplier(multipliers),
                    })
                })
                .collect();
        }

        let sources = matrix.keys().map(|source| ids[source]).sorted().collect();

        let motor_neurons = roles
            .iter()
            .enumerate()
            .filter_map(|(id, role)| role.muscle_class().map(|class| (id, class)))
            .collect();

        Self {
            names,
            ids,
            roles,
            projections,
            sources,
            motor_neurons,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn num_neurons(&self) -> usize {
        self.names.len()
    }

    pub fn id(&self, name: &str) -> Option<NeuronId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: NeuronId) -> &str {
        &self.names[id]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn role(&self, id: NeuronId) -> NeuronRole {
        self.roles[id]
    }

    pub fn projections(&self, id: NeuronId) -> &[Projection] {
        &self.projections[id]
    }

    /// Neurons that appear as keys of the weight matrix.
    pub fn sources(&self) -> &[NeuronId] {
        &self.sources
    }

    pub fn motor_neurons(&self) -> &[(NeuronId, MuscleClass)] {
        &self.motor_neurons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EngineParams;
    use float_cmp::assert_approx_eq;
    use itertools::assert_equal;

    fn build(json_str: &str) -> Connectome {
        let params = EngineParams::default();
        Connectome::build(
            &parse_weight_matrix(json_str).unwrap(),
            &RoleClassifier::new(&params),
            &params.role_multipliers,
        )
    }

    #[test]
    fn null_matrix_is_empty() {
        assert!(parse_weight_matrix("null").unwrap().is_empty());
        assert!(build("{}").is_empty());
    }

    #[test]
    fn malformed_matrix() {
        let result = parse_weight_matrix(r#"{"A": {"B": "heavy"}}"#);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .as_str()
            .starts_with("malformed weight matrix"));
    }

    #[test]
    fn index_contains_sources_and_targets() {
        let sut = build(r#"{"B": {"C": 1.0, "A": -2.0}, "D": {}}"#);

        assert_equal(sut.names().iter().map(String::as_str), ["A", "B", "C", "D"]);
        assert_equal(
            sut.sources().iter().map(|id| sut.name(*id)),
            ["B", "D"],
        );

        let b = sut.id("B").unwrap();
        assert_equal(
            sut.projections(b).iter().map(|p| sut.name(p.target)),
            ["A", "C"],
        );
        assert_approx_eq!(f32, sut.projections(b)[0].weight, -2.0);
        assert!(sut.projections(sut.id("D").unwrap()).is_empty());
        assert!(sut.id("E").is_none());
    }

    #[test]
    fn motor_neurons_and_multipliers() {
        let mut params = EngineParams::default();
        params.role_multipliers.muscle = 0.5;
        let matrix = parse_weight_matrix(r#"{"VA1": {"MDL07": 4.0, "MVR23": 2.0, "MVULVA": 1.0}}"#)
            .unwrap();
        let sut = Connectome::build(
            &matrix,
            &RoleClassifier::new(&params),
            &params.role_multipliers,
        );

        assert_equal(
            sut.motor_neurons()
                .iter()
                .map(|(id, class)| (sut.name(*id), *class)),
            [
                ("MDL07", MuscleClass::DorsalLeft),
                ("MVR23", MuscleClass::VentralRight),
            ],
        );

        let weights: Vec<f32> = sut
            .projections(sut.id("VA1").unwrap())
            .iter()
            .map(|p| p.weight)
            .collect();
        assert_equal(weights, [2.0, 1.0, 0.5]);
        assert!(sut.role(sut.id("MVULVA").unwrap()).is_muscle());
    }
}
