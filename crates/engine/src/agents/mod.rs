mod npc;
mod police;

pub use npc::{MoveIntent, NpcAgent, NpcConfig, NpcState, PatrolSchedule, SCHEDULE_BLOCKS};
pub use police::{PoliceAgent, PoliceConfig, PoliceState};
