use std::collections::HashSet;

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

/// Describes one layer of a network.
///
/// Layers with parameters carry the name used as their state-dict prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv2d {
        name: String,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        padding: usize,
    },
    Relu,
    MaxPool2d { size: usize },
    Dropout { p: f32 },
    Flatten,
    Linear {
        name: String,
        in_features: usize,
        out_features: usize,
    },
}

fn default_stride() -> usize {
    1
}

impl LayerSpec {
    pub fn conv(name: &str, in_channels: usize, out_channels: usize, kernel_size: usize) -> LayerSpec {
        LayerSpec::Conv2d {
            name: name.to_owned(),
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: 0,
        }
    }

    pub fn linear(name: &str, in_features: usize, out_features: usize) -> LayerSpec {
        LayerSpec::Linear { name: name.to_owned(), in_features, out_features }
    }

    /// State-dict prefix of layers that own parameters.
    pub fn param_name(&self) -> Option<&str> {
        match self {
            LayerSpec::Conv2d { name, .. } | LayerSpec::Linear { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Per-sample output shape, computed without allocating any weights.
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        match self {
            LayerSpec::Conv2d { name, in_channels, out_channels, kernel_size, stride, padding } => {
                if input.len() != 3 || input[0] != *in_channels {
                    return Err(Error::Shape(format!(
                        "{}: expected [{}, H, W], got {:?}", name, in_channels, input
                    )));
                }
                let stride = (*stride).max(1);
                let (h, w) = (input[1] + 2 * padding, input[2] + 2 * padding);
                if h < *kernel_size || w < *kernel_size {
                    return Err(Error::Shape(format!(
                        "{}: {:?} is smaller than the {}x{} kernel", name, input, kernel_size, kernel_size
                    )));
                }
                Ok(vec![*out_channels, (h - kernel_size) / stride + 1, (w - kernel_size) / stride + 1])
            }
            LayerSpec::Relu | LayerSpec::Dropout { .. } => Ok(input.to_vec()),
            LayerSpec::MaxPool2d { size } => {
                let size = (*size).max(1);
                if input.len() != 3 || input[1] < size || input[2] < size {
                    return Err(Error::Shape(format!("cannot pool {:?} with window {}", input, size)));
                }
                Ok(vec![input[0], input[1] / size, input[2] / size])
            }
            LayerSpec::Flatten => Ok(vec![input.iter().product()]),
            LayerSpec::Linear { name, in_features, out_features } => {
                if input != &[*in_features][..] {
                    return Err(Error::Shape(format!(
                        "{}: expected [{}], got {:?}", name, in_features, input
                    )));
                }
                Ok(vec![*out_features])
            }
        }
    }
}

/// A serializable network topology: per-sample input shape plus an ordered
/// list of layers (input → output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub input_shape: Vec<usize>,
    pub layers: Vec<LayerSpec>,
}

impl NetworkSpec {
    /// The digit classifier: five 3×3 convolutions and three fully-connected
    /// layers, 1×28×28 in, 10 logits out.
    ///
    /// ```text
    /// 1×28×28 → conv1 32×26×26 → conv2 64×24×24 → conv3 128×22×22
    ///         → maxpool 128×11×11 → conv4 512×9×9 → conv5 1024×7×7
    ///         → flatten 50176 → fc1 1024 → fc2 128 → fc3 10
    /// ```
    pub fn digit_classifier() -> NetworkSpec {
        NetworkSpec {
            input_shape: vec![1, 28, 28],
            layers: vec![
                LayerSpec::conv("conv1", 1, 32, 3),
                LayerSpec::Relu,
                LayerSpec::conv("conv2", 32, 64, 3),
                LayerSpec::Relu,
                LayerSpec::conv("conv3", 64, 128, 3),
                LayerSpec::Relu,
                LayerSpec::MaxPool2d { size: 2 },
                LayerSpec::conv("conv4", 128, 512, 3),
                LayerSpec::Relu,
                LayerSpec::conv("conv5", 512, 1024, 3),
                LayerSpec::Relu,
                LayerSpec::Dropout { p: 0.25 },
                LayerSpec::Flatten,
                LayerSpec::linear("fc1", 7 * 7 * 1024, 1024),
                LayerSpec::Relu,
                LayerSpec::Dropout { p: 0.5 },
                LayerSpec::linear("fc2", 1024, 128),
                LayerSpec::Relu,
                LayerSpec::Dropout { p: 0.75 },
                LayerSpec::linear("fc3", 128, 10),
            ],
        }
    }

    /// Walks the shape chain and returns the per-sample output shape.
    ///
    /// Fails on the first layer whose input does not fit, or when two
    /// parameter layers share a name (their state-dict keys would collide).
    pub fn output_shape(&self) -> Result<Vec<usize>> {
        let mut seen = HashSet::new();
        for name in self.layers.iter().filter_map(|layer| layer.param_name()) {
            if !seen.insert(name) {
                return Err(Error::Shape(format!("duplicate layer name '{}'", name)));
            }
        }
        self.layers.iter().try_fold(self.input_shape.clone(), |shape, layer| layer.output_shape(&shape))
    }

    /// Total number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| match layer {
            LayerSpec::Conv2d { in_channels, out_channels, kernel_size, .. } =>
                out_channels * in_channels * kernel_size * kernel_size + out_channels,
            LayerSpec::Linear { in_features, out_features, .. } =>
                out_features * in_features + out_features,
            _ => 0,
        }).sum()
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `NetworkSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<NetworkSpec> {
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
