use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MINUTES_PER_HOUR: u64 = 60;
pub const HOURS_PER_DAY: u64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    pub fn from_total_minutes(total_minutes: u64) -> Self {
        Self {
            hour: ((total_minutes / MINUTES_PER_HOUR) % HOURS_PER_DAY) as u32,
            minute: (total_minutes % MINUTES_PER_HOUR) as u32,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSettings {
    pub starting_hour: u32,
    /// `None` (or zero) disables idle auto-advance.
    pub idle_advance_interval_ms: Option<u64>,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            starting_hour: 8,
            idle_advance_interval_ms: None,
        }
    }
}

impl ClockSettings {
    pub fn idle_interval(&self) -> Option<Duration> {
        self.idle_advance_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PacedAdvanceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    TimeChanged {
        total_minutes: u64,
        time: TimeOfDay,
    },
    PacedAdvanceCompleted {
        id: PacedAdvanceId,
        interrupted: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PacedAdvance {
    id: PacedAdvanceId,
    minutes_left: u32,
    interval: Duration,
    until_next: Duration,
}

/// Discrete in-game clock. Total minutes only ever grow; hour and minute are
/// derived on demand. Real time enters exclusively through [`Clock::update`].
#[derive(Debug, Clone)]
pub struct Clock {
    total_minutes: u64,
    paced: Option<PacedAdvance>,
    next_paced_id: u64,
    idle_interval: Option<Duration>,
    idle_elapsed: Duration,
    events: Vec<ClockEvent>,
}

impl Clock {
    pub fn new(settings: ClockSettings) -> Self {
        let starting_hour = u64::from(settings.starting_hour) % HOURS_PER_DAY;
        Self {
            total_minutes: starting_hour * MINUTES_PER_HOUR,
            paced: None,
            next_paced_id: 0,
            idle_interval: settings.idle_interval(),
            idle_elapsed: Duration::ZERO,
            events: Vec::new(),
        }
    }

    pub fn total_minutes(&self) -> u64 {
        self.total_minutes
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_total_minutes(self.total_minutes)
    }

    pub fn is_paced_advance_running(&self) -> bool {
        self.paced.is_some()
    }

    pub fn active_paced_advance(&self) -> Option<PacedAdvanceId> {
        self.paced.map(|paced| paced.id)
    }

    /// Adds `minutes` at once and queues a single `TimeChanged`. Zero is a no-op.
    pub fn advance_minutes(&mut self, minutes: u32) {
        if minutes == 0 {
            return;
        }
        self.total_minutes = self.total_minutes.saturating_add(u64::from(minutes));
        self.events.push(ClockEvent::TimeChanged {
            total_minutes: self.total_minutes,
            time: self.time_of_day(),
        });
    }

    /// Starts a paced advance: the first minute lands now, each further minute
    /// after `interval` of real time, and completion is reported one interval
    /// after the last minute. An unfinished earlier request is interrupted and
    /// its remaining minutes are dropped.
    pub fn advance_minutes_paced(&mut self, minutes: u32, interval: Duration) -> PacedAdvanceId {
        if let Some(previous) = self.paced.take() {
            debug!(
                id = previous.id.0,
                dropped_minutes = previous.minutes_left,
                "paced_advance_interrupted"
            );
            self.events.push(ClockEvent::PacedAdvanceCompleted {
                id: previous.id,
                interrupted: true,
            });
        }

        let id = PacedAdvanceId(self.next_paced_id);
        self.next_paced_id = self.next_paced_id.saturating_add(1);

        if minutes == 0 {
            self.events.push(ClockEvent::PacedAdvanceCompleted {
                id,
                interrupted: false,
            });
            return id;
        }

        if interval.is_zero() {
            for _ in 0..minutes {
                self.advance_minutes(1);
            }
            self.events.push(ClockEvent::PacedAdvanceCompleted {
                id,
                interrupted: false,
            });
            return id;
        }

        self.advance_minutes(1);
        self.paced = Some(PacedAdvance {
            id,
            minutes_left: minutes - 1,
            interval,
            until_next: interval,
        });
        id
    }

    /// Feeds real time into the paced advance and the idle timer.
    pub fn update(&mut self, real_dt: Duration) {
        if self.paced.is_some() {
            self.update_paced(real_dt);
            return;
        }

        let Some(interval) = self.idle_interval else {
            return;
        };
        self.idle_elapsed = self.idle_elapsed.saturating_add(real_dt);
        while self.idle_elapsed >= interval {
            self.idle_elapsed -= interval;
            self.advance_minutes(1);
            info!(time = %self.time_of_day(), "idle_minute_advanced");
        }
    }

    pub fn reset_idle_timer(&mut self) {
        self.idle_elapsed = Duration::ZERO;
    }

    /// Real time left before the next idle minute; `None` when idle advance
    /// is disabled.
    pub fn remaining_idle(&self) -> Option<Duration> {
        self.idle_interval
            .map(|interval| interval.saturating_sub(self.idle_elapsed))
    }

    pub fn drain_events(&mut self) -> Vec<ClockEvent> {
        std::mem::take(&mut self.events)
    }

    fn update_paced(&mut self, real_dt: Duration) {
        let mut budget = real_dt;
        while let Some(mut paced) = self.paced {
            if budget < paced.until_next {
                paced.until_next -= budget;
                self.paced = Some(paced);
                return;
            }
            budget -= paced.until_next;

            if paced.minutes_left == 0 {
                self.paced = None;
                self.events.push(ClockEvent::PacedAdvanceCompleted {
                    id: paced.id,
                    interrupted: false,
                });
                return;
            }

            paced.minutes_left -= 1;
            paced.until_next = paced.interval;
            self.paced = Some(paced);
            self.advance_minutes(1);
        }
    }
}
