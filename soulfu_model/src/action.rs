use std::fmt;

/// Names for the action byte of a bone frame, in engine order.
pub const ACTION_NAMES: [&str; 47] = [
    "STAND",
    "WALK",
    "RUN",
    "SPRINT",
    "JUMP",
    "FALL",
    "LAND",
    "SWIM",
    "RIDE",
    "CLIMB",
    "DUCK",
    "BLOCK",
    "BASH",
    "SLASH_A",
    "SLASH_B",
    "SLASH_C",
    "STAB_A",
    "STAB_B",
    "CHOP_A",
    "CHOP_B",
    "PUNCH_A",
    "PUNCH_B",
    "KICK_A",
    "KICK_B",
    "SHOOT",
    "THROW",
    "CAST_A",
    "CAST_B",
    "CHARGE",
    "PARRY",
    "DODGE",
    "HIT_FRONT",
    "HIT_BACK",
    "HIT_LEFT",
    "HIT_RIGHT",
    "STUN",
    "KNOCKOUT",
    "DEATH",
    "SLEEP",
    "SIT",
    "TALK",
    "CHEER",
    "TAUNT",
    "PANIC",
    "OPEN",
    "USE",
    "GRAB",
];

/// A resolved action name. Indices past the table are preserved instead of
/// reading out of bounds like the original tooling.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ActionName {
    Known(&'static str),
    Unknown(u8),
}

pub fn action_name(index: u8) -> ActionName {
    ACTION_NAMES
        .get(index as usize)
        .map(|name| ActionName::Known(name))
        .unwrap_or(ActionName::Unknown(index))
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionName::Known(name) => write!(f, "{name}"),
            ActionName::Unknown(index) => write!(f, "UNKNOWN({index})"),
        }
    }
}
