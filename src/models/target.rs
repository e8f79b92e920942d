use serde::{Deserialize, Serialize};

/// How often a user wants room activity pushed.
///
/// Only `Off` changes delivery. `Infrequent`, `Normal` and `Frequent` are
/// stored and round-tripped, but all share the single room cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomFrequency {
    Off,
    Infrequent,
    Normal,
    Frequent,
}

impl RoomFrequency {
    /// Maps the settings column; unknown values fall back to `Normal`.
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => RoomFrequency::Off,
            1 => RoomFrequency::Infrequent,
            3 => RoomFrequency::Frequent,
            _ => RoomFrequency::Normal,
        }
    }
}

/// A recipient together with their delivery preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub user_id: i64,
    pub room_frequency: RoomFrequency,
    pub notify_on_follow: bool,
    pub notify_on_welcome_room: bool,
}

impl Target {
    /// Preferences used when a user has no settings row.
    pub fn with_defaults(user_id: i64) -> Self {
        Self {
            user_id,
            room_frequency: RoomFrequency::Normal,
            notify_on_follow: true,
            notify_on_welcome_room: true,
        }
    }

    pub fn wants_room_notifications(&self) -> bool {
        self.room_frequency != RoomFrequency::Off
    }
}
