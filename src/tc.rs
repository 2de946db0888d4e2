//! Textual conventions: RowStatus and StorageType transition checks.
//!
//! The RowStatus state machine follows the SNMPv2-TC table: a row is
//! created with `createAndGo` or `createAndWait` (only from nonexistent),
//! activated from `notReady`/`notInService`/`active`, suspended from
//! `notInService`/`active`, and destroyed from any state. `notReady` and
//! `nonExistent` are reported states, never valid set values.

use crate::error::ErrorStatus;

/// RowStatus textual convention values.
///
/// `NonExistent` is the out-of-band "no such row" state used on the
/// current-state side of transition checks; it never appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RowStatus {
    NonExistent = 0,
    Active = 1,
    NotInService = 2,
    NotReady = 3,
    CreateAndGo = 4,
    CreateAndWait = 5,
    Destroy = 6,
}

impl RowStatus {
    /// Parse a wire integer. Zero (nonexistent) is not a wire value.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Active),
            2 => Some(Self::NotInService),
            3 => Some(Self::NotReady),
            4 => Some(Self::CreateAndGo),
            5 => Some(Self::CreateAndWait),
            6 => Some(Self::Destroy),
            _ => None,
        }
    }

    /// The wire integer.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

/// StorageType textual convention values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StorageType {
    /// No storage type known (treated as writable).
    None = 0,
    Other = 1,
    Volatile = 2,
    NonVolatile = 3,
    Permanent = 4,
    ReadOnly = 5,
}

impl StorageType {
    /// Parse a wire integer.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Other),
            2 => Some(Self::Volatile),
            3 => Some(Self::NonVolatile),
            4 => Some(Self::Permanent),
            5 => Some(Self::ReadOnly),
            _ => None,
        }
    }

    /// The wire integer.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Check a RowStatus transition from `old` to the requested `new` value.
///
/// Returns the error to report, or `Ok(())` when the transition is allowed.
pub fn check_row_status_transition(
    old: RowStatus,
    new: RowStatus,
) -> std::result::Result<(), ErrorStatus> {
    match new {
        // Equivalent as far as checking goes; the final state differs.
        RowStatus::Active | RowStatus::NotInService => {
            if new == RowStatus::Active && old == RowStatus::NotReady {
                return Ok(());
            }
            if old == RowStatus::NotInService || old == RowStatus::Active {
                Ok(())
            } else {
                Err(ErrorStatus::InconsistentValue)
            }
        }
        // Illegal set value.
        RowStatus::NotReady | RowStatus::NonExistent => Err(ErrorStatus::WrongValue),
        RowStatus::CreateAndGo | RowStatus::CreateAndWait => {
            if old != RowStatus::NonExistent {
                // Impossible, the row already exists.
                Err(ErrorStatus::InconsistentValue)
            } else {
                Ok(())
            }
        }
        RowStatus::Destroy => Ok(()),
    }
}

/// Check a RowStatus transition with the row's storage type applied.
///
/// Rows held in permanent or read-only storage cannot be destroyed.
pub fn check_row_status_with_storage(
    old: RowStatus,
    new: RowStatus,
    storage: StorageType,
) -> std::result::Result<(), ErrorStatus> {
    if new == RowStatus::Destroy
        && matches!(storage, StorageType::Permanent | StorageType::ReadOnly)
    {
        return Err(ErrorStatus::WrongValue);
    }
    check_row_status_transition(old, new)
}

/// Check a StorageType transition.
///
/// Permanent and read-only rows cannot change storage; other rows cannot
/// become permanent or read-only.
pub fn check_storage_transition(
    old: StorageType,
    new: StorageType,
) -> std::result::Result<(), ErrorStatus> {
    match old {
        StorageType::Permanent | StorageType::ReadOnly => Err(ErrorStatus::InconsistentValue),
        StorageType::None | StorageType::Other | StorageType::Volatile
        | StorageType::NonVolatile => {
            if matches!(new, StorageType::Permanent | StorageType::ReadOnly) {
                Err(ErrorStatus::InconsistentValue)
            } else {
                Ok(())
            }
        }
    }
}
