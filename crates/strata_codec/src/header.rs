//! Initial bytes and arguments of CBOR data items.

/// The high three bits of an initial byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Major {
    Unsigned,
    Negative,
    Bytes,
    Text,
    Array,
    Map,
    Tag,
    Simple,
}

impl Major {
    pub(crate) fn of(initial: u8) -> Self {
        match initial >> 5 {
            0 => Major::Unsigned,
            1 => Major::Negative,
            2 => Major::Bytes,
            3 => Major::Text,
            4 => Major::Array,
            5 => Major::Map,
            6 => Major::Tag,
            _ => Major::Simple,
        }
    }

    fn bits(self) -> u8 {
        let index = match self {
            Major::Unsigned => 0,
            Major::Negative => 1,
            Major::Bytes => 2,
            Major::Text => 3,
            Major::Array => 4,
            Major::Map => 5,
            Major::Tag => 6,
            Major::Simple => 7,
        };
        index << 5
    }
}

/// Initial byte of `false`.
pub(crate) const FALSE: u8 = 0xf4;
/// Initial byte of `true`.
pub(crate) const TRUE: u8 = 0xf5;
/// Initial byte of `null`.
pub(crate) const NULL: u8 = 0xf6;
/// Initial byte of a binary64 float.
pub(crate) const DOUBLE: u8 = 0xfb;

/// Additional information value announcing an indefinite length.
pub(crate) const INDEFINITE: u8 = 31;

/// Appends the head of an item, picking the shortest argument form.
pub(crate) fn write_head(out: &mut Vec<u8>, major: Major, argument: u64) {
    let bits = major.bits();
    if argument < 24 {
        out.push(bits | argument as u8);
    } else if let Ok(short) = u8::try_from(argument) {
        out.extend_from_slice(&[bits | 24, short]);
    } else if let Ok(short) = u16::try_from(argument) {
        out.push(bits | 25);
        out.extend_from_slice(&short.to_be_bytes());
    } else if let Ok(short) = u32::try_from(argument) {
        out.push(bits | 26);
        out.extend_from_slice(&short.to_be_bytes());
    } else {
        out.push(bits | 27);
        out.extend_from_slice(&argument.to_be_bytes());
    }
}

/// Width in bytes of the argument that follows an initial byte, and the
/// smallest argument that justifies that width.
///
/// Returns `None` for reserved and indefinite forms.
pub(crate) fn argument_form(info: u8) -> Option<(usize, u64)> {
    match info {
        0..=23 => Some((0, 0)),
        24 => Some((1, 24)),
        25 => Some((2, 0x100)),
        26 => Some((4, 0x1_0000)),
        27 => Some((8, 0x1_0000_0000)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(major: Major, argument: u64) -> Vec<u8> {
        let mut out = Vec::new();
        write_head(&mut out, major, argument);
        out
    }

    #[test]
    fn heads_use_the_shortest_form() {
        assert_eq!(head(Major::Unsigned, 23), [0x17]);
        assert_eq!(head(Major::Unsigned, 24), [0x18, 24]);
        assert_eq!(head(Major::Text, 255), [0x78, 0xff]);
        assert_eq!(head(Major::Bytes, 256), [0x59, 0x01, 0x00]);
        assert_eq!(head(Major::Array, 65_536), [0x9a, 0, 1, 0, 0]);
        assert_eq!(
            head(Major::Map, u64::from(u32::MAX) + 1),
            [0xbb, 0, 0, 0, 1, 0, 0, 0, 0]
        );
    }

    #[test]
    fn major_roundtrips_through_initial_byte() {
        for major in [
            Major::Unsigned,
            Major::Negative,
            Major::Bytes,
            Major::Text,
            Major::Array,
            Major::Map,
            Major::Tag,
            Major::Simple,
        ] {
            assert_eq!(Major::of(head(major, 5)[0]), major);
        }
    }

    #[test]
    fn argument_floor_matches_writer() {
        for argument in [0u64, 23, 24, 255, 256, 65_535, 65_536, 1 << 32] {
            let bytes = head(Major::Unsigned, argument);
            let (width, floor) = argument_form(bytes[0] & 0x1f).unwrap();
            assert_eq!(bytes.len(), width + 1);
            assert!(width == 0 || argument >= floor);
        }
        assert_eq!(argument_form(INDEFINITE), None);
        assert_eq!(argument_form(28), None);
    }
}
