/// Step learning-rate schedule.
///
/// `lr = initial_lr · gamma^(epoch / step_size)`; `step()` is called once per
/// epoch.
#[derive(Debug, Clone)]
pub struct StepLr {
    initial_lr: f32,
    step_size: usize,
    gamma: f32,
    epoch: usize,
}

impl StepLr {
    pub fn new(initial_lr: f32, step_size: usize, gamma: f32) -> StepLr {
        StepLr { initial_lr, step_size: step_size.max(1), gamma, epoch: 0 }
    }

    pub fn get_lr(&self) -> f32 {
        self.initial_lr * self.gamma.powi((self.epoch / self.step_size) as i32)
    }

    /// Advances one epoch and returns the new learning rate.
    pub fn step(&mut self) -> f32 {
        self.epoch += 1;
        self.get_lr()
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }
}
