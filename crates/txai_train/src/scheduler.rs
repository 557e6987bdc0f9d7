//! Learning rate schedulers.

use serde::{Deserialize, Serialize};

/// Trait for learning rate schedulers.
pub trait Scheduler: Send + Sync {
    /// Learning rate at optimizer step `step`.
    fn get_lr(&self, step: usize) -> f64;

    /// Scheduler name.
    fn name(&self) -> &str;
}

/// Schedule selected in a run config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LrSchedule {
    /// Fixed learning rate, as in plain Adam training.
    #[default]
    Constant,
    /// 1cycle policy peaking at the configured rate.
    OneCycle,
}

impl LrSchedule {
    /// Build the scheduler for `total_steps` steps peaking at `lr`.
    #[must_use]
    pub fn build(self, lr: f64, total_steps: usize) -> Box<dyn Scheduler> {
        match self {
            LrSchedule::Constant => Box::new(ConstantLR::new(lr)),
            LrSchedule::OneCycle => Box::new(OneCycleLR::simple(lr, total_steps)),
        }
    }
}

/// Configuration for [`OneCycleLR`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneCycleLRConfig {
    /// Peak learning rate.
    pub max_lr: f64,
    /// Total number of steps.
    pub total_steps: usize,
    /// Share of steps spent warming up.
    pub pct_start: f64,
    /// `max_lr / div_factor` is the starting rate.
    pub div_factor: f64,
    /// `max_lr / final_div_factor` is the final rate.
    pub final_div_factor: f64,
}

impl Default for OneCycleLRConfig {
    fn default() -> Self {
        Self {
            max_lr: 1e-3,
            total_steps: 1000,
            pct_start: 0.3,
            div_factor: 25.0,
            final_div_factor: 10000.0,
        }
    }
}

/// One-cycle learning rate scheduler.
///
/// Linear warmup to `max_lr`, then cosine annealing to `max_lr / final_div_factor`.
#[derive(Debug, Clone)]
pub struct OneCycleLR {
    config: OneCycleLRConfig,
    initial_lr: f64,
    final_lr: f64,
    warmup_steps: usize,
}

impl OneCycleLR {
    /// Create a new OneCycleLR scheduler.
    pub fn new(config: OneCycleLRConfig) -> Self {
        let initial_lr = config.max_lr / config.div_factor;
        let final_lr = config.max_lr / config.final_div_factor;
        let warmup_steps = (config.total_steps as f64 * config.pct_start) as usize;
        Self {
            config,
            initial_lr,
            final_lr,
            warmup_steps,
        }
    }

    /// Create with just `max_lr` and `total_steps`.
    pub fn simple(max_lr: f64, total_steps: usize) -> Self {
        Self::new(OneCycleLRConfig {
            max_lr,
            total_steps: total_steps.max(1),
            ..Default::default()
        })
    }
}

impl Scheduler for OneCycleLR {
    fn get_lr(&self, step: usize) -> f64 {
        let step = step.min(self.config.total_steps.saturating_sub(1));
        if step < self.warmup_steps {
            let progress = step as f64 / self.warmup_steps as f64;
            self.initial_lr + (self.config.max_lr - self.initial_lr) * progress
        } else {
            let annealing_steps = (self.config.total_steps - self.warmup_steps).max(1);
            let progress = (step - self.warmup_steps) as f64 / annealing_steps as f64;
            let cosine = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
            self.final_lr + (self.config.max_lr - self.final_lr) * cosine
        }
    }

    fn name(&self) -> &str {
        "OneCycleLR"
    }
}

/// Constant learning rate (no scheduling).
#[derive(Debug, Clone)]
pub struct ConstantLR {
    lr: f64,
}

impl ConstantLR {
    /// Create a new constant LR scheduler.
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl Scheduler for ConstantLR {
    fn get_lr(&self, _step: usize) -> f64 {
        self.lr
    }

    fn name(&self) -> &str {
        "ConstantLR"
    }
}
