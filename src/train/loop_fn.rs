use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::data::{DataLoader, MnistDataset};
use crate::error::Result;
use crate::loss::CrossEntropyLoss;
use crate::math::ops::argmax;
use crate::network::Network;
use crate::optim::{Adadelta, StepLr};
use crate::train::epoch_stats::{EpochStats, EvalReport};
use crate::train::train_config::TrainConfig;

/// Trains `network` for `config.epochs` epochs with Adadelta and a per-epoch
/// step decay, evaluating on `test` after every epoch.
///
/// Returns one `EpochStats` per epoch. The network is left in eval mode.
pub fn fit(
    network: &mut Network,
    train: &MnistDataset,
    test: &MnistDataset,
    config: &TrainConfig,
) -> Result<Vec<EpochStats>> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut optimizer = Adadelta::new(config.learning_rate);
    let mut scheduler = StepLr::new(config.learning_rate, 1, config.gamma);
    let train_loader = DataLoader::new(config.batch_size, true);
    let test_loader = DataLoader::new(config.batch_size, true);

    let mut history = Vec::with_capacity(config.epochs);
    for epoch in 1..=config.epochs {
        let t_start = Instant::now();
        let learning_rate = scheduler.get_lr();
        optimizer.set_learning_rate(learning_rate);

        let train_loss = train_epoch(network, train, &train_loader, &mut optimizer, epoch, config.log_interval, &mut rng)?;
        let eval = evaluate(network, test, &test_loader, &mut rng)?;

        info!(
            "Val Loss: {:.4}  |  Accuracy: {}/{}",
            eval.loss, eval.correct, eval.total
        );

        history.push(EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            eval,
            learning_rate,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        });

        let next = scheduler.step();
        debug!(epoch, lr = next, "learning rate decayed");
    }

    Ok(history)
}

/// One pass of mini-batch training. Returns the mean of the per-batch losses.
pub fn train_epoch<R: Rng + ?Sized>(
    network: &mut Network,
    dataset: &MnistDataset,
    loader: &DataLoader,
    optimizer: &mut Adadelta,
    epoch: usize,
    log_interval: usize,
    rng: &mut R,
) -> Result<f64> {
    network.train();

    let num_batches = loader.num_batches(dataset);
    let mut total_loss = 0.0f64;
    let mut batches = 0usize;

    for (batch_idx, batch) in loader.batches(dataset, rng).enumerate() {
        let batch = batch?;

        network.zero_grad();
        let logits = network.forward(&batch.images)?;
        let (loss, grad) = CrossEntropyLoss::forward(&logits, &batch.targets)?;
        network.backward(&grad)?;
        optimizer.step(network.named_params_mut());

        total_loss += loss as f64;
        batches += 1;

        if batch_idx % log_interval.max(1) == 0 {
            info!(
                "Train Epoch: {} [{}/{} ({:.0}%)]\tLoss: {:.6}",
                epoch,
                batch_idx * batch.len(),
                dataset.len(),
                100.0 * batch_idx as f64 / num_batches.max(1) as f64,
                loss
            );
        }
    }

    Ok(if batches == 0 { 0.0 } else { total_loss / batches as f64 })
}

/// Loss and accuracy over the whole dataset, in eval mode and without
/// touching any gradient.
pub fn evaluate<R: Rng + ?Sized>(
    network: &mut Network,
    dataset: &MnistDataset,
    loader: &DataLoader,
    rng: &mut R,
) -> Result<EvalReport> {
    network.eval();

    let mut total_loss = 0.0f64;
    let mut correct = 0usize;
    let mut total = 0usize;

    for batch in loader.batches(dataset, rng) {
        let batch = batch?;
        let logits = network.forward(&batch.images)?;

        total_loss += CrossEntropyLoss::per_sample(&logits, &batch.targets)?
            .iter()
            .map(|&l| l as f64)
            .sum::<f64>();

        correct += batch.targets.iter().enumerate()
            .filter(|&(i, &t)| argmax(logits.sample(i)) == t)
            .count();
        total += batch.len();
    }

    Ok(EvalReport {
        loss: if total == 0 { 0.0 } else { total_loss / total as f64 },
        correct,
        total,
    })
}
