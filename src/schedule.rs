use time::{OffsetDateTime, Time, format_description::BorrowedFormatItem, macros::format_description};
use tokio_util::sync::CancellationToken;

use crate::{
    controller::{ScreenSignal, SportsMatrix},
    foundation::error::{MatrixError, MatrixResult},
};

const TRIGGER_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

/// Parse a daily "HH:MM" (24h) trigger time.
pub fn parse_trigger(s: &str) -> MatrixResult<Time> {
    Time::parse(s.trim(), TRIGGER_FORMAT)
        .map_err(|e| MatrixError::config(format!("invalid trigger time '{s}': {e}")))
}

/// Daily screen on/off triggers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScreenSchedule {
    triggers: Vec<(Time, ScreenSignal)>,
}

impl ScreenSchedule {
    pub fn new(off_times: &[String], on_times: &[String]) -> MatrixResult<Self> {
        let mut triggers = Vec::with_capacity(off_times.len() + on_times.len());
        for t in off_times {
            let at = parse_trigger(t)?;
            tracing::info!(time = %t, "screen will be scheduled to turn off");
            triggers.push((at, ScreenSignal::Off));
        }
        for t in on_times {
            let at = parse_trigger(t)?;
            tracing::info!(time = %t, "screen will be scheduled to turn on");
            triggers.push((at, ScreenSignal::On));
        }
        Ok(Self { triggers })
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// The first trigger strictly after `now`, in `now`'s offset. Ties go to the
    /// trigger registered first.
    pub fn next_after(&self, now: OffsetDateTime) -> Option<(OffsetDateTime, ScreenSignal)> {
        let mut next: Option<(OffsetDateTime, ScreenSignal)> = None;
        for &(at, signal) in &self.triggers {
            let mut when = now.replace_time(at);
            if when <= now {
                when += time::Duration::DAY;
            }
            if next.is_none_or(|(best, _)| when < best) {
                next = Some((when, signal));
            }
        }
        next
    }

    /// Feed scheduled signals into `matrix` until `cancel` fires or the controller closes.
    pub async fn run(self, matrix: SportsMatrix, cancel: CancellationToken) -> MatrixResult<()> {
        loop {
            let now = local_now();
            let Some((when, signal)) = self.next_after(now) else {
                return Ok(());
            };
            let wait = std::time::Duration::try_from(when - now).unwrap_or_default();
            tracing::debug!(?signal, ?wait, "next screen trigger");

            tokio::select! {
                _ = cancel.cancelled() => return Err(MatrixError::Canceled),
                _ = tokio::time::sleep(wait) => {}
            }

            tracing::warn!(?signal, "scheduled screen change");
            match matrix.signal(signal).await {
                Ok(()) => {}
                Err(MatrixError::Closed) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
