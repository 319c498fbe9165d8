use crate::types::{Lot, Slot};

/// What the booking view of a single lot can show. None of these are errors.
#[derive(Debug, PartialEq)]
pub enum LotAvailability<'a> {
    NoLots,
    LotNotFound,
    NoFreeSlots(&'a Lot),
    Free(&'a Lot, Vec<&'a Slot>),
}

pub fn lot_availability<'a>(lots: &'a [Lot], lot_id: &str) -> LotAvailability<'a> {
    if lots.is_empty() {
        return LotAvailability::NoLots;
    }
    let Some(lot) = lots.iter().find(|lot| lot.id == lot_id) else {
        return LotAvailability::LotNotFound;
    };
    let free = lot.free_slots();
    if free.is_empty() {
        LotAvailability::NoFreeSlots(lot)
    } else {
        LotAvailability::Free(lot, free)
    }
}
