use std::fmt::Display;

use crate::error::{Result, SimError};

/// A condition on basis states: the qubits in `inclusion_mask` must match
/// the corresponding bits of `desired_value_mask`.
///
/// Bits of the desired mask outside the inclusion mask are cleared on
/// construction, so two `Controls` that allow the same states compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Controls {
    inclusion_mask: u32,
    desired_value_mask: u32,
}
impl Controls {
    /// Allows every basis state.
    pub const NONE: Controls = Controls {
        inclusion_mask: 0,
        desired_value_mask: 0,
    };

    pub fn new(inclusion_mask: u32, desired_value_mask: u32) -> Self {
        Controls {
            inclusion_mask,
            desired_value_mask: desired_value_mask & inclusion_mask,
        }
    }

    /// Condition on a single qubit being on (`desired = true`) or off.
    pub fn bit(qubit: u32, desired: bool) -> Result<Self> {
        let mask = qubit_mask(qubit)?;
        Ok(Controls::new(mask, if desired { mask } else { 0 }))
    }

    /// Combine two sets of controls.
    ///
    /// Fails if the two disagree about the value of some qubit.
    pub fn and(self, other: Controls) -> Result<Controls> {
        let shared = self.inclusion_mask & other.inclusion_mask;
        let disagreement = (self.desired_value_mask ^ other.desired_value_mask) & shared;
        if disagreement != 0 {
            return Err(SimError::ConflictingControls {
                qubit: disagreement.trailing_zeros(),
            });
        }
        Ok(Controls::new(
            self.inclusion_mask | other.inclusion_mask,
            self.desired_value_mask | other.desired_value_mask,
        ))
    }

    pub fn inclusion_mask(&self) -> u32 {
        self.inclusion_mask
    }

    pub fn desired_value_mask(&self) -> u32 {
        self.desired_value_mask
    }

    /// The number of qubits these controls constrain.
    pub fn included_qubit_count(&self) -> u32 {
        self.inclusion_mask.count_ones()
    }

    pub fn is_none(&self) -> bool {
        self.inclusion_mask == 0
    }

    pub fn allows_state(&self, k: u32) -> bool {
        k & self.inclusion_mask == self.desired_value_mask
    }

    /// Map an index of the compacted (control-free) space back to the full space,
    /// filling the controlled bits with their desired values.
    pub fn expand_index(&self, mut compact: u32) -> u32 {
        let mut k = self.desired_value_mask;
        let mut bit = 0;
        while compact != 0 && bit < u32::BITS {
            if self.inclusion_mask & (1 << bit) == 0 {
                k |= (compact & 1) << bit;
                compact >>= 1;
            }
            bit += 1;
        }
        k
    }
}
/// The mask selecting wire `qubit`. Masks address at most 32 wires.
pub fn qubit_mask(qubit: u32) -> Result<u32> {
    1u32.checked_shl(qubit).ok_or(SimError::QubitOutOfRange {
        index: qubit,
        qubits: u32::BITS,
    })
}

impl Display for Controls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            return write!(f, "No Controls");
        }
        let mut first = true;
        for qubit in 0..u32::BITS {
            if self.inclusion_mask & (1 << qubit) == 0 {
                continue;
            }
            if !first {
                write!(f, " and ")?;
            }
            first = false;
            let value = (self.desired_value_mask >> qubit) & 1;
            write!(f, "bit{qubit}={value}")?;
        }
        Ok(())
    }
}
