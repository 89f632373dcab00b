use std::fmt;

use log::debug;
use rand::Rng;

use crate::engine::Value;
use crate::error::EngineError;

/// Anything that owns learnable values.
pub trait Module {
    /// Learnable values in a fixed, deterministic order.
    fn parameters(&self) -> Vec<Value>;

    fn parameter_count(&self) -> usize {
        self.parameters().len()
    }

    fn zero_grad(&self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }

    /// Overwrites parameter data positionally, e.g. to replay a recorded run.
    ///
    /// The slice must hold exactly one value per parameter; nothing is written
    /// otherwise.
    fn load_parameters(&self, weights: &[f64]) -> Result<(), EngineError> {
        let parameters = self.parameters();
        if parameters.len() != weights.len() {
            return Err(EngineError::ParameterCount {
                expected: parameters.len(),
                actual: weights.len(),
            });
        }

        for (p, &w) in parameters.iter().zip(weights) {
            p.set_data(w);
        }
        debug!("loaded {} parameters", weights.len());

        Ok(())
    }
}

pub struct Neuron {
    weights: Vec<Value>,
    bias: Value,
    nonlinear: bool,
}

impl Neuron {
    pub fn new(nin: usize, nonlinear: bool, neuron_name: &str) -> Neuron {
        Neuron::with_rng(nin, nonlinear, neuron_name, &mut rand::thread_rng())
    }

    /// Weights are drawn uniformly from `[-1, 1)`, the bias starts at zero.
    pub fn with_rng<R: Rng>(nin: usize, nonlinear: bool, neuron_name: &str, rng: &mut R) -> Neuron {
        let weights = (0..nin)
            .map(|i|
                Value::from(rng.gen_range(-1.0..1.0_f64)).with_name(&format!("{}_weight_{}", neuron_name, i))
            )
            .collect();

        // It is possible and common to initialize the biases to be zero, since the asymmetry breaking
        // is provided by the small random numbers in the weights.
        //
        // See: http://cs231n.github.io/neural-networks-2/
        let bias = Value::from(0.0).with_name(&format!("{}_bias", neuron_name));

        Self {
            weights,
            bias,
            nonlinear,
        }
    }

    pub fn nin(&self) -> usize {
        self.weights.len()
    }

    pub fn is_nonlinear(&self) -> bool {
        self.nonlinear
    }

    /// `relu(b + w0*x0 + w1*x1 + ...)`, summed left to right starting from the bias.
    pub fn forward(&self, x: &[Value]) -> Result<Value, EngineError> {
        if x.len() != self.weights.len() {
            return Err(EngineError::InputWidth {
                expected: self.weights.len(),
                actual: x.len(),
            });
        }

        let act = self.weights.iter().zip(x.iter())
            .fold(self.bias.clone(), |acc, (wi, xi)| acc + wi * xi);

        Ok(if self.nonlinear { act.relu() } else { act })
    }
}

impl Module for Neuron {
    /// Weights first, then the bias.
    fn parameters(&self) -> Vec<Value> {
        self.weights
            .iter()
            .cloned()
            .chain([self.bias.clone()])
            .collect()
    }
}

impl fmt::Display for Neuron {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Neuron({})", if self.nonlinear { "ReLU" } else { "Linear" }, self.weights.len())
    }
}

pub struct Layer {
    neurons: Vec<Neuron>,
}

impl Layer {
    pub fn new(nin: usize, nout: usize, nonlinear: bool, layer_index: usize) -> Layer {
        Layer::with_rng(nin, nout, nonlinear, layer_index, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng>(
        nin: usize,
        nout: usize,
        nonlinear: bool,
        layer_index: usize,
        rng: &mut R,
    ) -> Layer {
        let neurons = (0..nout)
            .map(|neuron_index|
                Neuron::with_rng(
                    nin,
                    nonlinear,
                    &format!("layer_{}_neuron_{}", layer_index, neuron_index),
                    &mut *rng
                )
            )
            .collect();

        Layer {
            neurons
        }
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    /// One output per neuron, in neuron order.
    pub fn forward(&self, x: &[Value]) -> Result<Vec<Value>, EngineError> {
        self.neurons
            .iter()
            .map(|n| n.forward(x))
            .collect()
    }
}

impl Module for Layer {
    fn parameters(&self) -> Vec<Value> {
        self.neurons
            .iter()
            .flat_map(|n| n.parameters())
            .collect()
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let neurons = self.neurons.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        write!(f, "Layer of [{}]", neurons.join(", "))
    }
}

/// Multi-layer perceptron: ReLU on every layer except the last, which is linear.
pub struct MLP {
    layers: Vec<Layer>,
}

impl MLP {
    pub fn new(nin: usize, nouts: &[usize]) -> MLP {
        MLP::with_rng(nin, nouts, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng>(nin: usize, nouts: &[usize], rng: &mut R) -> MLP {
        let sizes = [nin]
            .iter()
            .chain(nouts.iter())
            .copied()
            .collect::<Vec<_>>();

        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(layer_index, w)|
                Layer::with_rng(
                    w[0],
                    w[1],
                    layer_index + 1 != nouts.len(),
                    layer_index,
                    &mut *rng
                )
            )
            .collect();

        let mlp = MLP {
            layers
        };
        debug!("built {} with {} parameters", mlp, mlp.parameter_count());

        mlp
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn forward(&self, x: &[Value]) -> Result<Vec<Value>, EngineError> {
        let mut output = x.to_vec();
        for layer in &self.layers {
            output = layer.forward(&output)?;
        }

        Ok(output)
    }
}

impl Module for MLP {
    fn parameters(&self) -> Vec<Value> {
        self.layers
            .iter()
            .flat_map(|l| l.parameters())
            .collect()
    }
}

impl fmt::Display for MLP {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layers = self.layers.iter().map(|l| l.to_string()).collect::<Vec<_>>();
        write!(f, "MLP of [{}]", layers.join(", "))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn inputs(xs: &[f64]) -> Vec<Value> {
        xs.iter().map(|&x| Value::from(x)).collect()
    }

    #[test]
    fn test_mlp_parameter_count() {
        let model = MLP::new(2, &[16, 16, 1]);

        assert_eq!(model.parameter_count(), 337);
        assert_eq!(model.forward(&inputs(&[0.5, -1.0])).unwrap().len(), 1);
    }

    #[test]
    fn test_only_last_layer_is_linear() {
        let model = MLP::new(3, &[4, 4, 4]);
        let flags = model
            .layers()
            .iter()
            .map(|l| l.neurons()[0].is_nonlinear())
            .collect::<Vec<_>>();

        assert_eq!(flags, vec![true, true, false]);
    }

    #[test]
    fn test_neuron_initialization() {
        let mut rng = StdRng::seed_from_u64(7);
        let neuron = Neuron::with_rng(50, true, "n", &mut rng);
        let parameters = neuron.parameters();

        assert_eq!(neuron.nin(), 50);
        assert_eq!(parameters.len(), 51);
        for w in &parameters[..50] {
            assert!(w.data() >= -1.0 && w.data() < 1.0);
        }
        assert_eq!(parameters[50].data(), 0.0);
        assert_eq!(parameters[50].name(), Some("n_bias".to_string()));
    }

    #[test]
    fn test_neuron_forward_is_affine_then_relu() {
        let neuron = Neuron::new(2, true, "n");
        neuron.load_parameters(&[2.0, -3.0, 0.5]).unwrap();

        let out = neuron.forward(&inputs(&[1.0, 1.0])).unwrap();
        assert_eq!(out.data(), 0.0);

        let out = neuron.forward(&inputs(&[2.0, 1.0])).unwrap();
        assert_eq!(out.data(), 1.5);

        out.backward();
        let grads = neuron.parameters().iter().map(|p| p.grad()).collect::<Vec<_>>();
        assert_eq!(grads, vec![2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_linear_neuron_passes_negative_values() {
        let neuron = Neuron::new(1, false, "n");
        neuron.load_parameters(&[1.0, -2.0]).unwrap();

        let out = neuron.forward(&inputs(&[0.5])).unwrap();
        assert_eq!(out.data(), -1.5);
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let model = MLP::new(2, &[3, 1]);

        let err = model.forward(&inputs(&[1.0])).unwrap_err();
        assert_eq!(err, EngineError::InputWidth { expected: 2, actual: 1 });
    }

    #[test]
    fn test_layer_forward_one_output_per_neuron() {
        let layer = Layer::new(3, 5, true, 0);

        assert_eq!(layer.forward(&inputs(&[1.0, 2.0, 3.0])).unwrap().len(), 5);
        assert_eq!(layer.parameter_count(), 20);
    }

    #[test]
    fn test_parameters_follow_layer_then_neuron_order() {
        let model = MLP::new(2, &[2, 1]);
        let names = model.parameters().iter().map(|p| p.name().unwrap()).collect::<Vec<_>>();

        assert_eq!(names[0], "layer_0_neuron_0_weight_0");
        assert_eq!(names[2], "layer_0_neuron_0_bias");
        assert_eq!(names[3], "layer_0_neuron_1_weight_0");
        assert_eq!(names[8], "layer_1_neuron_0_bias");
    }

    #[test]
    fn test_load_parameters_rejects_count_mismatch() {
        let model = MLP::new(2, &[16, 16, 1]);
        let before = model.parameters().iter().map(|p| p.data()).collect::<Vec<_>>();

        let err = model.load_parameters(&[0.1; 10]).unwrap_err();
        assert_eq!(err, EngineError::ParameterCount { expected: 337, actual: 10 });

        let after = model.parameters().iter().map(|p| p.data()).collect::<Vec<_>>();
        assert_eq!(before, after);
    }

    #[test]
    fn test_zero_grad_makes_backward_repeatable() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = MLP::with_rng(2, &[4, 1], &mut rng);
        let x = inputs(&[0.3, -0.7]);

        let loss = model.forward(&x).unwrap()[0].powi(2);
        loss.backward();
        let first = model.parameters().iter().map(|p| p.grad()).collect::<Vec<_>>();

        model.zero_grad();
        assert!(model.parameters().iter().all(|p| p.grad() == 0.0));

        let loss = model.forward(&x).unwrap()[0].powi(2);
        loss.backward();
        let second = model.parameters().iter().map(|p| p.grad()).collect::<Vec<_>>();

        assert_eq!(first, second);
    }

    #[test]
    fn test_seeded_models_are_bit_identical() {
        let run = || {
            let mut rng = StdRng::seed_from_u64(42);
            let model = MLP::with_rng(2, &[8, 8, 1], &mut rng);
            let out = model.forward(&inputs(&[1.5, -0.25])).unwrap();
            out[0].backward();
            (
                out[0].data(),
                model.parameters().iter().map(|p| (p.data(), p.grad())).collect::<Vec<_>>(),
            )
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_display() {
        let model = MLP::new(2, &[2, 1]);

        assert_eq!(
            model.to_string(),
            "MLP of [Layer of [ReLUNeuron(2), ReLUNeuron(2)], Layer of [LinearNeuron(2)]]"
        );
    }
}
