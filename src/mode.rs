//! Operating mode register of the 3800 controller.
//!
//! `MODE?` answers with a decimal integer whose bits each name one mode:
//!
//! | Bit | Value | Mode                                  |
//! |-----|-------|---------------------------------------|
//! | 0   | 1     | Program mode                          |
//! | 1   | 2     | Edit mode (controller in stop mode)   |
//! | 2   | 4     | View program mode                     |
//! | 3   | 8     | Edit mode (controller in hold mode)   |
//! | 4   | 16    | Manual mode                           |
//! | 5   | 32    | Delayed start mode                    |
//! | 6   | 64    | Unused                                |
//! | 7   | 128   | Calibration mode                      |
//!
//! Any other bit, or a register reading of zero, is reported as unknown.
//! The unknown indicator is tracked next to the recognized flags rather than
//! folded into them, so a stray bit never hides the modes that were reported.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::oven::command;

bitflags! {
    /// The eight documented bits of the mode register.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeFlags: u8 {
        const PROGRAM_MODE = 1 << 0;
        const EDIT_MODE_STOP = 1 << 1;
        const VIEW_PROGRAM_MODE = 1 << 2;
        const EDIT_MODE_HOLD = 1 << 3;
        const MANUAL_MODE = 1 << 4;
        const DELAYED_START_MODE = 1 << 5;
        const UNUSED = 1 << 6;
        const CALIBRATION_MODE = 1 << 7;
    }
}

/// A decoded mode register reading.
///
/// A reading with no recognized flags is always [`OvenMode::UNKNOWN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OvenMode {
    flags: ModeFlags,
    unknown: bool,
}

impl OvenMode {
    /// Nothing recognizable was reported.
    pub const UNKNOWN: OvenMode = OvenMode {
        flags: ModeFlags::empty(),
        unknown: true,
    };

    pub fn flags(&self) -> ModeFlags {
        self.flags
    }

    /// True when the register was zero or carried bits outside [`ModeFlags`].
    pub fn is_unknown(&self) -> bool {
        self.unknown
    }

    pub fn contains(&self, flags: ModeFlags) -> bool {
        self.flags.contains(flags)
    }
}

impl Default for OvenMode {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl From<ModeFlags> for OvenMode {
    fn from(flags: ModeFlags) -> Self {
        Self {
            flags,
            unknown: flags.is_empty(),
        }
    }
}

impl BitOr for OvenMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            flags: self.flags | rhs.flags,
            unknown: self.unknown || rhs.unknown,
        }
    }
}

impl BitOr<ModeFlags> for OvenMode {
    type Output = Self;

    fn bitor(mut self, rhs: ModeFlags) -> Self {
        self |= rhs;
        self
    }
}

impl BitOrAssign<ModeFlags> for OvenMode {
    fn bitor_assign(&mut self, rhs: ModeFlags) {
        self.flags |= rhs;
    }
}

impl PartialEq<ModeFlags> for OvenMode {
    fn eq(&self, other: &ModeFlags) -> bool {
        !self.unknown && self.flags == *other
    }
}

impl PartialEq<OvenMode> for ModeFlags {
    fn eq(&self, other: &OvenMode) -> bool {
        other == self
    }
}

impl fmt::Display for OvenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.flags.iter_names().map(|(name, _)| name).collect();
        if self.unknown {
            names.push("UNKNOWN_MODE");
        }
        write!(f, "{}", names.join(" | "))
    }
}

impl FromStr for OvenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_status_code(s).map(decode)
    }
}

/// Yields the value of every set bit in `status_code`, lowest first.
pub fn set_bits(status_code: u64) -> impl Iterator<Item = u64> {
    (0..u64::BITS)
        .map(|position| 1u64 << position)
        .take_while(move |&mask| mask <= status_code)
        .filter(move |&mask| status_code & mask != 0)
}

/// Decodes a raw mode register value.
pub fn decode(status_code: u64) -> OvenMode {
    let mut flags = ModeFlags::empty();
    let mut unknown = false;

    for bit in set_bits(status_code) {
        match u8::try_from(bit).ok().and_then(ModeFlags::from_bits) {
            Some(flag) => flags |= flag,
            None => unknown = true,
        }
    }

    if flags.is_empty() {
        return OvenMode::UNKNOWN;
    }
    OvenMode { flags, unknown }
}

/// Coerces the text of a `MODE?` reply into a register value.
pub fn parse_status_code(text: &str) -> Result<u64> {
    text.trim()
        .parse::<u64>()
        .map_err(|_| Error::InvalidResponse {
            command: String::from(command::MODE),
            response: String::from(text),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_unknown() {
        assert_eq!(decode(0), OvenMode::UNKNOWN);
    }

    #[test]
    fn single_program_bit() {
        assert_eq!(decode(1), ModeFlags::PROGRAM_MODE);
    }

    #[test]
    fn two_low_bits() {
        assert_eq!(decode(3), ModeFlags::PROGRAM_MODE | ModeFlags::EDIT_MODE_STOP);
    }

    #[test]
    fn bit_outside_register_is_unknown() {
        assert_eq!(decode(256), OvenMode::UNKNOWN);
    }

    #[test]
    fn program_and_calibration() {
        assert_eq!(decode(129), ModeFlags::PROGRAM_MODE | ModeFlags::CALIBRATION_MODE);
    }

    #[test]
    fn stray_bit_keeps_recognized_flags() {
        let mode = decode(256 | 16);
        assert!(mode.is_unknown());
        assert_eq!(mode.flags(), ModeFlags::MANUAL_MODE);
        assert_eq!(mode, OvenMode::from(ModeFlags::MANUAL_MODE) | OvenMode::UNKNOWN);
    }

    #[test]
    fn highest_bit_does_not_overflow_the_scan() {
        let mode = decode(u64::MAX);
        assert!(mode.is_unknown());
        assert_eq!(mode.flags(), ModeFlags::all());
    }

    #[test]
    fn every_byte_value_decomposes_along_its_bits() {
        for code in 0u64..=255 {
            let first = decode(code);
            assert_eq!(first, decode(code), "decode({code}) is not stable");

            if code == 0 {
                assert_eq!(first, OvenMode::UNKNOWN);
                continue;
            }
            assert!(!first.is_unknown(), "decode({code}) reported unknown bits");
            assert_eq!(u64::from(first.flags().bits()), code);
            for bit in set_bits(code) {
                let flag = ModeFlags::from_bits(bit as u8).unwrap();
                assert!(first.contains(flag), "decode({code}) dropped bit {bit}");
            }
        }
    }

    #[test]
    fn set_bits_lists_values_in_order() {
        assert_eq!(set_bits(0).count(), 0);
        assert_eq!(set_bits(0b1010_0101).collect::<Vec<_>>(), vec![1, 4, 32, 128]);
        assert_eq!(set_bits(1 << 63).collect::<Vec<_>>(), vec![1 << 63]);
    }

    #[test]
    fn parse_accepts_padded_decimal() {
        assert_eq!(parse_status_code(" 17\r\n").unwrap(), 17);
    }

    #[test]
    fn parse_rejects_non_numeric_and_negative() {
        assert!(matches!(parse_status_code("abc"), Err(Error::InvalidResponse { .. })));
        assert!(matches!(parse_status_code("-1"), Err(Error::InvalidResponse { .. })));
        assert!(matches!(parse_status_code(""), Err(Error::InvalidResponse { .. })));
    }

    #[test]
    fn from_str_decodes() {
        let mode: OvenMode = "18".parse().unwrap();
        assert_eq!(mode, ModeFlags::EDIT_MODE_STOP | ModeFlags::MANUAL_MODE);
    }

    #[test]
    fn empty_flag_set_is_unknown() {
        assert_eq!(OvenMode::from(ModeFlags::empty()), OvenMode::UNKNOWN);
        assert_eq!(OvenMode::default(), OvenMode::UNKNOWN);
        assert_eq!(OvenMode::from(ModeFlags::empty()).to_string(), "UNKNOWN_MODE");
        assert_eq!(OvenMode::default().to_string(), "UNKNOWN_MODE");
    }

    #[test]
    fn flags_compare_from_either_side() {
        let mode = decode(16);
        assert!(ModeFlags::MANUAL_MODE == mode);
        assert!(mode == ModeFlags::MANUAL_MODE);
        assert!(ModeFlags::MANUAL_MODE != decode(16 | 1024));
        assert!(ModeFlags::empty() != OvenMode::UNKNOWN);
    }

    #[test]
    fn or_with_empty_flags_changes_nothing() {
        let mode = decode(1);
        assert_eq!(mode | ModeFlags::empty(), mode);
        assert!(!(mode | ModeFlags::empty()).is_unknown());
    }

    #[test]
    fn display_lists_names() {
        assert_eq!(decode(129).to_string(), "PROGRAM_MODE | CALIBRATION_MODE");
        assert_eq!(decode(0).to_string(), "UNKNOWN_MODE");
        assert_eq!(decode(257).to_string(), "PROGRAM_MODE | UNKNOWN_MODE");
    }
}
