//! Error taxonomy for the chat engine
//!
//! Every rejected operation maps to one [`ChatError`]. The [`ErrorKind`]
//! groups them by how they are handled: validation errors go back to the
//! actor only, `Banned` always ends in a forced disconnect.

use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Not logged in.")]
    Unauthenticated,

    #[error("Room name must be between 3 and 30 characters")]
    InvalidName,

    #[error("Maximum users must be between 1 and 100")]
    InvalidCapacity,

    #[error("Username must be 3-20 characters.")]
    InvalidUsername,

    #[error("Message cannot be empty.")]
    EmptyMessage,

    #[error("Message is too long (max 500 characters).")]
    MessageTooLong,

    #[error("Room does not exist anymore.")]
    RoomNotFound,

    #[error("User not found.")]
    TargetNotFound,

    #[error("You must be in a room to do that.")]
    NotInRoom,

    #[error("Password required.")]
    PasswordRequired,

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Permission denied.")]
    PermissionDenied,

    #[error("Cannot target an admin.")]
    CannotTargetAdmin,

    #[error("Room is full.")]
    RoomFull,

    #[error("You are banned.")]
    Banned,

    #[error("Cannot set max users to {capacity} when room has {occupancy} users")]
    CapacityBelowOccupancy { capacity: u32, occupancy: usize },

    #[error("User/IP already banned or no option selected.")]
    NoChange,

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Coarse error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    PermissionDenied,
    Banned,
    Conflict,
    Unauthenticated,
    Internal,
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        use ChatError::*;

        match self {
            InvalidName | InvalidCapacity | InvalidUsername | EmptyMessage | MessageTooLong
            | IncorrectPassword => ErrorKind::InvalidInput,
            RoomNotFound | TargetNotFound | NotInRoom => ErrorKind::NotFound,
            PasswordRequired | PermissionDenied | CannotTargetAdmin => ErrorKind::PermissionDenied,
            Banned => ErrorKind::Banned,
            RoomFull | CapacityBelowOccupancy { .. } | NoChange => ErrorKind::Conflict,
            Unauthenticated => ErrorKind::Unauthenticated,
            Storage(_) => ErrorKind::Internal,
        }
    }

    /// Whether the ws layer still has to tell the actor about this error.
    /// Bans are announced by the engine itself right before the close.
    pub fn needs_report(&self) -> bool {
        self.kind() != ErrorKind::Banned
    }
}
