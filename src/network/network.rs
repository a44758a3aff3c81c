use std::collections::BTreeMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{Error, Result};
use crate::layers::{Conv2d, Dropout, Flatten, Layer, Linear, MaxPool2d, Mode, Param, Relu};
use crate::math::tensor::Tensor;
use crate::network::spec::{LayerSpec, NetworkSpec};

/// Flat parameter-name → tensor mapping, the on-disk model format.
pub type StateDict = BTreeMap<String, Tensor>;

/// A feed-forward stack of layers built from a `NetworkSpec`.
pub struct Network {
    pub spec: NetworkSpec,
    layers: Vec<Box<dyn Layer>>,
    mode: Mode,
}

impl Network {
    /// Builds the network, validating the topology's shape chain first.
    ///
    /// All parameters and every dropout mask stream are derived from `seed`.
    pub fn from_spec(spec: NetworkSpec, seed: u64) -> Result<Network> {
        spec.output_shape()?;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(spec.layers.len());
        for (i, layer) in spec.layers.iter().enumerate() {
            let built: Box<dyn Layer> = match layer {
                LayerSpec::Conv2d { name, in_channels, out_channels, kernel_size, stride, padding } => Box::new(
                    Conv2d::new(name, *in_channels, *out_channels, *kernel_size, *stride, *padding, &mut rng),
                ),
                LayerSpec::Relu => Box::new(Relu::new(&format!("relu{}", i))),
                LayerSpec::MaxPool2d { size } => Box::new(MaxPool2d::new(&format!("pool{}", i), *size)),
                LayerSpec::Dropout { p } => Box::new(Dropout::new(&format!("dropout{}", i), *p, rng.gen())?),
                LayerSpec::Flatten => Box::new(Flatten::new(&format!("flatten{}", i))),
                LayerSpec::Linear { name, in_features, out_features } => {
                    Box::new(Linear::new(name, *in_features, *out_features, &mut rng))
                }
            };
            layers.push(built);
        }

        Ok(Network { spec, layers, mode: Mode::Train })
    }

    /// The fixed digit classifier.
    pub fn digit_classifier(seed: u64) -> Result<Network> {
        Network::from_spec(NetworkSpec::digit_classifier(), seed)
    }

    pub fn train(&mut self) {
        self.mode = Mode::Train;
    }

    pub fn eval(&mut self) {
        self.mode = Mode::Eval;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Forward pass over a `[B, ...input_shape]` batch; returns the logits.
    ///
    /// Each layer caches what its backward pass needs.
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        if input.shape.len() != self.spec.input_shape.len() + 1 || input.shape[1..] != self.spec.input_shape[..] {
            return Err(Error::Shape(format!(
                "network expects [B, {:?}], got {:?}",
                self.spec.input_shape, input.shape
            )));
        }
        let mode = self.mode;
        let mut current = input.clone();
        for layer in &mut self.layers {
            current = layer.forward(&current, mode)?;
        }
        Ok(current)
    }

    /// Backpropagates ∂L/∂logits through every layer, accumulating parameter
    /// gradients.
    pub fn backward(&mut self, grad_logits: &Tensor) -> Result<()> {
        let mut grad = grad_logits.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        for layer in &mut self.layers {
            for (_, param) in layer.params_mut() {
                param.zero_grad();
            }
        }
    }

    /// `(layer.param, &mut Param)` pairs, in layer order.
    pub fn named_params_mut(&mut self) -> Vec<(String, &mut Param)> {
        self.layers.iter_mut()
            .flat_map(|layer| {
                let prefix = layer.name().to_owned();
                layer.params_mut().into_iter()
                    .map(move |(suffix, param)| (format!("{}.{}", prefix, suffix), param))
            })
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    pub fn state_dict(&self) -> StateDict {
        let mut dict = StateDict::new();
        for layer in &self.layers {
            for (suffix, param) in layer.params() {
                dict.insert(format!("{}.{}", layer.name(), suffix), param.value.clone());
            }
        }
        dict
    }

    /// Strict load: every parameter must be present with the same shape and no
    /// extra keys are allowed. Nothing is modified if validation fails.
    pub fn load_state_dict(&mut self, mut dict: StateDict) -> Result<()> {
        let expected = self.state_dict();
        for (key, tensor) in &expected {
            match dict.get(key) {
                None => return Err(Error::MissingParameter(key.clone())),
                Some(loaded) if loaded.shape != tensor.shape || loaded.numel() != tensor.numel() => {
                    return Err(Error::Shape(format!(
                        "parameter '{}' has shape {:?}, expected {:?}",
                        key, loaded.shape, tensor.shape
                    )));
                }
                Some(_) => {}
            }
        }
        if let Some(extra) = dict.keys().find(|k| !expected.contains_key(*k)) {
            return Err(Error::UnexpectedParameter(extra.clone()));
        }

        for (key, param) in self.named_params_mut() {
            if let Some(tensor) = dict.remove(&key) {
                param.value = tensor;
                param.zero_grad();
            }
        }
        Ok(())
    }

    /// Writes the state dict as JSON, creating the parent directory if needed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer(writer, &self.state_dict())?;
        debug!(path = %path.display(), "saved state dict");
        Ok(())
    }

    /// Reads a state dict written by `save` and loads it strictly.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let reader = std::io::BufReader::new(file);
        let dict: StateDict = serde_json::from_reader(reader)?;
        self.load_state_dict(dict)?;
        debug!(path = %path.display(), "loaded state dict");
        Ok(())
    }
}
