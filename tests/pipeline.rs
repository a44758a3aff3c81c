use std::path::PathBuf;

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use digit_cnn::{
    fit, infer, postprocess, predict, preprocess, vision, Error, LayerSpec, MnistDataset, Network,
    NetworkSpec, Tensor, TrainConfig,
};

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("digit-cnn-it-{}-{}", tag, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn small_spec() -> NetworkSpec {
    NetworkSpec {
        input_shape: vec![1, 28, 28],
        layers: vec![
            LayerSpec::conv("conv1", 1, 4, 3),
            LayerSpec::Relu,
            LayerSpec::MaxPool2d { size: 2 },
            LayerSpec::Dropout { p: 0.25 },
            LayerSpec::Flatten,
            LayerSpec::linear("fc1", 4 * 13 * 13, 16),
            LayerSpec::Relu,
            LayerSpec::linear("fc2", 16, 10),
        ],
    }
}

/// Minimal IDX writer, enough for `MnistDataset::from_idx_bytes`.
fn idx_bytes(images: &[Vec<u8>], labels: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut img = vec![0, 0, 8, 3];
    img.extend_from_slice(&(images.len() as u32).to_be_bytes());
    img.extend_from_slice(&28u32.to_be_bytes());
    img.extend_from_slice(&28u32.to_be_bytes());
    images.iter().for_each(|i| img.extend_from_slice(i));

    let mut lbl = vec![0, 0, 8, 1];
    lbl.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    lbl.extend_from_slice(labels);
    (img, lbl)
}

fn random_dataset(n: usize, seed: u64) -> MnistDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let images: Vec<Vec<u8>> = (0..n).map(|_| (0..784).map(|_| rng.gen()).collect()).collect();
    let labels: Vec<u8> = (0..n).map(|_| rng.gen_range(0..10)).collect();
    let (img, lbl) = idx_bytes(&images, &labels);
    MnistDataset::from_idx_bytes(&img, &lbl).unwrap()
}

/// Dark stroke on a light background, roughly what a phone photo of a digit
/// looks like after grayscale conversion.
fn write_digit_photo(path: &PathBuf, width: u32, height: u32) {
    let mut img = GrayImage::from_pixel(width, height, Luma([230]));
    for y in height / 5..height * 4 / 5 {
        for x in width * 2 / 5..width * 3 / 5 {
            img.put_pixel(x, y, Luma([20]));
        }
    }
    img.save(path).unwrap();
}

#[test]
fn digit_classifier_shapes() {
    let spec = NetworkSpec::digit_classifier();
    assert_eq!(spec.output_shape().unwrap(), vec![10]);
    let flatten_in = spec.layers.iter().find_map(|l| match l {
        LayerSpec::Linear { in_features, .. } => Some(*in_features),
        _ => None,
    });
    assert_eq!(flatten_in, Some(50176));
}

#[test]
fn save_then_load_gives_identical_inference() {
    let dir = scratch_dir("roundtrip");
    let path = dir.join("nested").join("model.json");

    let mut trained = Network::from_spec(small_spec(), 3).unwrap();
    let train = random_dataset(12, 1);
    let config = TrainConfig { epochs: 1, batch_size: 4, learning_rate: 1.0, ..Default::default() };
    fit(&mut trained, &train, &train, &config).unwrap();
    trained.save(&path).unwrap();

    let mut restored = Network::from_spec(small_spec(), 99).unwrap();
    assert_ne!(restored.state_dict(), trained.state_dict());
    restored.load(&path).unwrap();
    assert_eq!(restored.state_dict(), trained.state_dict());

    let x = Tensor::uniform(&[2, 1, 28, 28], 1.0, &mut StdRng::seed_from_u64(5));
    assert_eq!(infer(&mut trained, &x).unwrap(), infer(&mut restored, &x).unwrap());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn loading_a_missing_model_is_reported_as_not_found() {
    let mut net = Network::from_spec(small_spec(), 0).unwrap();
    let before = net.state_dict();
    let err = net.load(scratch_dir("missing").join("nope.json")).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(net.state_dict(), before);
}

#[test]
fn loading_a_different_architecture_fails() {
    let dir = scratch_dir("mismatch");
    let path = dir.join("model.json");
    Network::from_spec(small_spec(), 0).unwrap().save(&path).unwrap();

    let mut other_spec = small_spec();
    other_spec.layers[5] = LayerSpec::linear("fc1", 4 * 13 * 13, 32);
    other_spec.layers[7] = LayerSpec::linear("fc2", 32, 10);
    let mut other = Network::from_spec(other_spec, 0).unwrap();
    assert!(matches!(other.load(&path), Err(Error::Shape(_))));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn photo_to_prediction() {
    let dir = scratch_dir("photo");
    let mut net = Network::from_spec(small_spec(), 7).unwrap();

    for &(w, h) in &[(28, 28), (100, 60), (17, 301), (640, 480)] {
        let path = dir.join(format!("digit_{}x{}.png", w, h));
        write_digit_photo(&path, w, h);

        let input = preprocess(&path).unwrap();
        assert_eq!(input.shape, vec![1, 1, 28, 28]);
        assert!(input.min() >= 0.0 && input.max() <= 1.0);
        // inverted: the background ends up dark, the stroke bright
        assert!(input.data[0] < 0.2);

        let prediction = predict(&mut net, &input).unwrap();
        assert!(prediction.digit <= 9);
        assert_eq!(prediction.logits.len(), 10);
        assert_eq!(prediction.digit, postprocess(&prediction.logits));
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn preprocess_from_memory_matches_file() {
    let dir = scratch_dir("bytes");
    let path = dir.join("digit.png");
    write_digit_photo(&path, 50, 70);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(vision::preprocess_bytes(&bytes).unwrap(), preprocess(&path).unwrap());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_image_is_an_io_error() {
    let err = preprocess(scratch_dir("noimg").join("absent.png")).unwrap_err();
    assert!(err.is_not_found());
}
