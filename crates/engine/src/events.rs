use crate::clock::{PacedAdvanceId, TimeOfDay};
use crate::grid::{DoorState, Tile};
use crate::scheduler::{AgentId, AgentStatus};

/// Notifications for rendering, UI and game-over hooks. The core never reads
/// them back; they only describe state that has already been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    TimeChanged {
        total_minutes: u64,
        time: TimeOfDay,
    },
    PacedAdvanceCompleted {
        id: PacedAdvanceId,
        interrupted: bool,
    },
    AgentMoved {
        agent: AgentId,
        from: Tile,
        to: Tile,
    },
    AgentVisibilityChanged {
        agent: AgentId,
        visible: bool,
    },
    AgentStatusChanged {
        agent: AgentId,
        from: AgentStatus,
        to: AgentStatus,
    },
    PlayerDetected {
        agent: AgentId,
        tile: Tile,
        minute: u64,
    },
    DetectionBroadcast {
        tile: Tile,
        minute: u64,
    },
    PlayerCaught {
        agent: AgentId,
        tile: Tile,
        minute: u64,
    },
    PlayerMoved {
        from: Tile,
        to: Tile,
    },
    DoorChanged {
        tile: Tile,
        state: DoorState,
    },
    AgentFaulted {
        agent: AgentId,
        minute: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEventKind {
    TimeChanged,
    PacedAdvanceCompleted,
    AgentMoved,
    AgentVisibilityChanged,
    AgentStatusChanged,
    PlayerDetected,
    DetectionBroadcast,
    PlayerCaught,
    PlayerMoved,
    DoorChanged,
    AgentFaulted,
}

impl SimEvent {
    pub fn kind(self) -> SimEventKind {
        match self {
            Self::TimeChanged { .. } => SimEventKind::TimeChanged,
            Self::PacedAdvanceCompleted { .. } => SimEventKind::PacedAdvanceCompleted,
            Self::AgentMoved { .. } => SimEventKind::AgentMoved,
            Self::AgentVisibilityChanged { .. } => SimEventKind::AgentVisibilityChanged,
            Self::AgentStatusChanged { .. } => SimEventKind::AgentStatusChanged,
            Self::PlayerDetected { .. } => SimEventKind::PlayerDetected,
            Self::DetectionBroadcast { .. } => SimEventKind::DetectionBroadcast,
            Self::PlayerCaught { .. } => SimEventKind::PlayerCaught,
            Self::PlayerMoved { .. } => SimEventKind::PlayerMoved,
            Self::DoorChanged { .. } => SimEventKind::DoorChanged,
            Self::AgentFaulted { .. } => SimEventKind::AgentFaulted,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimEventCounts {
    pub total: u32,
    pub time_changed: u32,
    pub agent_moved: u32,
    pub status_changed: u32,
    pub detections: u32,
    pub broadcasts: u32,
    pub captures: u32,
    pub player_moved: u32,
    pub door_changed: u32,
    pub faults: u32,
    pub other: u32,
}

impl SimEventCounts {
    fn record(&mut self, kind: SimEventKind) {
        self.total = self.total.saturating_add(1);
        match kind {
            SimEventKind::TimeChanged => self.time_changed = self.time_changed.saturating_add(1),
            SimEventKind::AgentMoved => self.agent_moved = self.agent_moved.saturating_add(1),
            SimEventKind::AgentStatusChanged => {
                self.status_changed = self.status_changed.saturating_add(1)
            }
            SimEventKind::PlayerDetected => self.detections = self.detections.saturating_add(1),
            SimEventKind::DetectionBroadcast => {
                self.broadcasts = self.broadcasts.saturating_add(1)
            }
            SimEventKind::PlayerCaught => self.captures = self.captures.saturating_add(1),
            SimEventKind::PlayerMoved => self.player_moved = self.player_moved.saturating_add(1),
            SimEventKind::DoorChanged => self.door_changed = self.door_changed.saturating_add(1),
            SimEventKind::AgentFaulted => self.faults = self.faults.saturating_add(1),
            SimEventKind::PacedAdvanceCompleted | SimEventKind::AgentVisibilityChanged => {
                self.other = self.other.saturating_add(1)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct SimEventBus {
    pending: Vec<SimEvent>,
    lifetime_counts: SimEventCounts,
}

impl SimEventBus {
    pub fn emit(&mut self, event: SimEvent) {
        self.lifetime_counts.record(event.kind());
        self.pending.push(event);
    }

    pub fn iter_pending(&self) -> impl Iterator<Item = &SimEvent> {
        self.pending.iter()
    }

    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn lifetime_counts(&self) -> SimEventCounts {
        self.lifetime_counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_pending_but_keeps_counts() {
        let mut bus = SimEventBus::default();
        bus.emit(SimEvent::DetectionBroadcast {
            tile: Tile::new(1, 1),
            minute: 480,
        });
        bus.emit(SimEvent::PlayerMoved {
            from: Tile::ZERO,
            to: Tile::new(0, 1),
        });
        assert_eq!(bus.iter_pending().count(), 2);

        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(bus.iter_pending().count(), 0);

        let counts = bus.lifetime_counts();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.broadcasts, 1);
        assert_eq!(counts.player_moved, 1);
    }
}
