use tracing::{error, info};

use crate::error::{PanelError, Result};

type StepFn<C> = Box<dyn FnOnce(&mut C) -> std::result::Result<(), String>>;

/// Progress report emitted as each step starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
    pub percent: u8,
    pub label: String,
}

struct Step<C> {
    label: String,
    run: StepFn<C>,
}

/// Ordered startup pipeline. Step `n + 1` starts only after step `n`
/// returned; the first failure aborts the rest and is never retried.
pub struct Bootstrap<C> {
    steps: Vec<Step<C>>,
}

impl<C> Default for Bootstrap<C> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<C> Bootstrap<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn step<F>(mut self, label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(&mut C) -> std::result::Result<(), String> + 'static,
    {
        self.steps.push(Step {
            label: label.into(),
            run: Box::new(run),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step against `ctx`. `on_progress` sees the context too so
    /// it can report through whatever the steps are driving.
    pub fn run<P>(self, ctx: &mut C, mut on_progress: P) -> Result<()>
    where
        P: FnMut(&mut C, &Progress),
    {
        let total = self.steps.len();

        for (index, step) in self.steps.into_iter().enumerate() {
            let progress = Progress {
                index,
                total,
                percent: progress_percent(index, total),
                label: step.label,
            };
            info!(step = %progress.label, percent = progress.percent, "bootstrap step");
            on_progress(ctx, &progress);

            if let Err(reason) = (step.run)(ctx) {
                error!(step = %progress.label, %reason, "bootstrap failed");
                return Err(PanelError::bootstrap(progress.label, reason));
            }
        }

        Ok(())
    }
}

/// `ceil(index / (total - 1) * 100)`, computed from the index alone.
#[must_use]
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total <= 1 {
        return 100;
    }
    let last = total - 1;
    let index = index.min(last);
    let percent = (index * 100).div_ceil(last);
    u8::try_from(percent).unwrap_or(100)
}
