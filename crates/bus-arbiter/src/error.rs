use crate::task::Direction;

/// Reasons a non-blocking acquire could not admit a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TryAcquireError {
    /// Every slot is taken.
    Full,
    /// The bus is occupied in the given (other) direction.
    Opposed(Direction),
}

impl core::fmt::Display for TryAcquireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TryAcquireError::Full => f.write_str("bus is at capacity"),
            TryAcquireError::Opposed(direction) => {
                write!(f, "bus is occupied in the {direction:?} direction")
            }
        }
    }
}

impl core::error::Error for TryAcquireError {}
