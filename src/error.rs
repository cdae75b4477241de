//! Error taxonomy (spec.md §7): deliberately small. Out-of-range input,
//! no-coil, and burn-timeout are not modeled as errors at all — they are
//! silent clamps or state-machine transitions. The only fallible
//! boundaries are the peripherals named in `board`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The ADC/band-gap voltage reader reported a fault (spec.md §7 treats
    /// "not ready" as unreachable in bounded time; this covers a hard
    /// peripheral error instead).
    Adc(E),
    /// The EEPROM byte store reported a fault on read or write.
    Eeprom(E),
}
