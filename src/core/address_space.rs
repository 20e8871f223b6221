//! Conversion between the RAW, RVA and VA coordinate systems.
//!
//! The rules here are format independent. An executable only supplies its
//! sizes, its load base and the RAW <-> RVA layout mapping; identity,
//! mapped-form requirements, base arithmetic and bounds checks are applied
//! uniformly. Conversions are recomputed from current state on every call.

use tracing::trace;

use crate::core::address::{AddressKind, INVALID_ADDR};
use crate::core::executable::Executable;

/// Convert `addr` from one coordinate system to another.
///
/// Returns `None` when the address has no representation in `to`:
/// the executable is not mapped, the magnitude is outside the mapped size
/// of the kind involved, VA lies below the load base, or the layout has no
/// mapping for it.
pub fn convert<E: Executable + ?Sized>(
    exe: &E,
    addr: u64,
    from: AddressKind,
    to: AddressKind,
) -> Option<u64> {
    if from == to {
        return Some(addr);
    }
    if addr == INVALID_ADDR {
        return None;
    }
    if (from.is_virtual() || to.is_virtual()) && !exe.is_mapped() {
        return None;
    }

    let rva = to_rva(exe, addr, from)?;
    let out = from_rva(exe, rva, to);
    trace!(addr, ?from, ?to, ?out, "convert");
    out
}

/// Normalise any kind to an in-bounds RVA.
fn to_rva<E: Executable + ?Sized>(exe: &E, addr: u64, from: AddressKind) -> Option<u64> {
    let rva = match from {
        AddressKind::Raw => {
            if addr >= exe.mapped_size(AddressKind::Raw) {
                return None;
            }
            exe.raw_to_rva(addr)?
        }
        AddressKind::Rva => addr,
        AddressKind::Va => addr.checked_sub(exe.image_base())?,
    };
    (rva < exe.mapped_size(AddressKind::Rva)).then_some(rva)
}

fn from_rva<E: Executable + ?Sized>(exe: &E, rva: u64, to: AddressKind) -> Option<u64> {
    let out = match to {
        AddressKind::Rva => rva,
        AddressKind::Va => {
            // VA extent is measured from the base.
            if rva >= exe.mapped_size(AddressKind::Va) {
                return None;
            }
            exe.image_base().checked_add(rva)?
        }
        AddressKind::Raw => {
            let raw = exe.rva_to_raw(rva)?;
            if raw >= exe.mapped_size(AddressKind::Raw) {
                return None;
            }
            raw
        }
    };
    (out != INVALID_ADDR).then_some(out)
}
