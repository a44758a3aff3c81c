pub mod adadelta;
pub mod step_lr;

pub use adadelta::Adadelta;
pub use step_lr::StepLr;
