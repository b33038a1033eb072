//! Timed light sequences (answer flash, celebration rainbow)
//!
//! At most one sequence plays at a time. Starting a new one aborts the
//! previous task before the first step of the new one is sent.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::lumi::color::{palette, rainbow};
use crate::lumi::Rgb;

/// Default hold of the correct/incorrect flash
pub const FLASH_HOLD: Duration = Duration::from_millis(500);
/// Rainbow: hues per loop, loops, and time per hue
pub const RAINBOW_STEPS: usize = 32;
pub const RAINBOW_LOOPS: usize = 3;
pub const RAINBOW_STEP: Duration = Duration::from_millis(40);

/// Receives each color of a playing sequence
pub type LightSink = Arc<dyn Fn(Rgb) + Send + Sync>;

/// Ordered (color, hold) steps and the color to settle on afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct LightSequence {
    pub steps: Vec<(Rgb, Duration)>,
    pub finish: Option<Rgb>,
}

impl LightSequence {
    /// Green or red pulse, then back to `resting`
    pub fn flash(correct: bool, hold: Duration, resting: Rgb) -> Self {
        let color = if correct {
            palette::CORRECT
        } else {
            palette::INCORRECT
        };
        Self {
            steps: vec![(color, hold)],
            finish: Some(resting),
        }
    }

    /// Three trips around the color wheel, then back to `resting`
    pub fn rainbow(resting: Rgb) -> Self {
        let wheel = rainbow(RAINBOW_STEPS);
        let steps = (0..RAINBOW_LOOPS)
            .flat_map(|_| wheel.iter().map(|&c| (c, RAINBOW_STEP)))
            .collect();
        Self {
            steps,
            finish: Some(resting),
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|(_, hold)| *hold).sum()
    }

    /// Last color the sequence leaves on the keys
    pub fn final_color(&self) -> Option<Rgb> {
        self.finish.or_else(|| self.steps.last().map(|(c, _)| *c))
    }
}

/// Handle to a running sequence
#[derive(Debug, Clone)]
pub struct SequenceHandle {
    abort: AbortHandle,
}

impl SequenceHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Single-slot sequence scheduler
#[derive(Debug, Default)]
pub struct SequencePlayer {
    current: Mutex<Option<SequenceHandle>>,
}

impl SequencePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Play `sequence`, cancelling whatever was playing
    ///
    /// Outside a tokio runtime the sequence cannot be timed, so only its
    /// final color is applied and `None` is returned.
    pub fn play(&self, sequence: LightSequence, sink: LightSink) -> Option<SequenceHandle> {
        let mut slot = self.current.lock();
        if let Some(previous) = slot.take() {
            previous.cancel();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime for light sequence, applying final color only");
            if let Some(color) = sequence.final_color() {
                sink(color);
            }
            return None;
        };

        let task = runtime.spawn(async move {
            for (color, hold) in sequence.steps {
                sink(color);
                tokio::time::sleep(hold).await;
            }
            if let Some(color) = sequence.finish {
                sink(color);
            }
        });

        let handle = SequenceHandle {
            abort: task.abort_handle(),
        };
        *slot = Some(handle.clone());
        Some(handle)
    }

    /// Stop the running sequence, if any. Returns true if one was running.
    pub fn cancel(&self) -> bool {
        match self.current.lock().take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.cancel();
                running
            }
            None => false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
