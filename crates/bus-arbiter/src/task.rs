/// Access mode of a task on the bus.
///
/// All tasks occupying the bus at the same time share one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Direction {
    /// Sending data towards the device.
    Outbound,
    /// Reading data back from the device.
    Inbound,
}

impl Direction {
    /// Both directions, in index order.
    pub const ALL: [Direction; 2] = [Direction::Outbound, Direction::Inbound];

    /// The other direction.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Outbound => Direction::Inbound,
            Direction::Inbound => Direction::Outbound,
        }
    }

    /// Stable index used for per-direction tables.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Direction::Outbound => 0,
            Direction::Inbound => 1,
        }
    }
}

/// Fairness hint attached to a task.
///
/// High priority only biases which waiters get woken; it never reorders the
/// bus or preempts occupants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl Priority {
    #[inline]
    pub const fn is_high(self) -> bool {
        matches!(self, Priority::High)
    }
}

/// One request for bus occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task {
    pub direction: Direction,
    pub priority: Priority,
}

impl Task {
    pub const fn new(direction: Direction, priority: Priority) -> Self {
        Self { direction, priority }
    }

    /// Normal priority task in `direction`.
    pub const fn normal(direction: Direction) -> Self {
        Self::new(direction, Priority::Normal)
    }

    /// High priority task in `direction`.
    pub const fn high(direction: Direction) -> Self {
        Self::new(direction, Priority::High)
    }
}

/// A value kept per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerDirection<T> {
    pub outbound: T,
    pub inbound: T,
}

impl<T> PerDirection<T> {
    pub const fn new(outbound: T, inbound: T) -> Self {
        Self { outbound, inbound }
    }

    #[inline]
    pub fn get(&self, direction: Direction) -> &T {
        match direction {
            Direction::Outbound => &self.outbound,
            Direction::Inbound => &self.inbound,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, direction: Direction) -> &mut T {
        match direction {
            Direction::Outbound => &mut self.outbound,
            Direction::Inbound => &mut self.inbound,
        }
    }
}

impl<T> core::ops::Index<Direction> for PerDirection<T> {
    type Output = T;

    fn index(&self, direction: Direction) -> &T {
        self.get(direction)
    }
}

impl<T> core::ops::IndexMut<Direction> for PerDirection<T> {
    fn index_mut(&mut self, direction: Direction) -> &mut T {
        self.get_mut(direction)
    }
}
