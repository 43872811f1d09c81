//! Four-character type codes and the container registry.

/// A box type code
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

/// JUMBF superbox
pub const JUMB: FourCC = FourCC(*b"jumb");
/// JUMBF description box
pub const JUMD: FourCC = FourCC(*b"jumd");
/// CBOR content box
pub const CBOR: FourCC = FourCC(*b"cbor");
/// JSON content box
pub const JSON: FourCC = FourCC(*b"json");
/// XML content box
pub const XML: FourCC = FourCC(*b"xml ");
/// UUID-discriminated box
pub const UUID: FourCC = FourCC(*b"uuid");
/// Binary data box
pub const BFDB: FourCC = FourCC(*b"bfdb");
/// Binary data (embedded) box
pub const BIDB: FourCC = FourCC(*b"bidb");

/// Container types whose payload is a sequence of child boxes. The
/// set is fixed: ISO base-media containers, the iTunes metadata
/// atoms, and the JUMBF superbox.
const CONTAINERS: &[&[u8; 4]] = &[
    b"moov", b"trak", b"edts", b"mdia", b"minf", b"dinf", b"stbl", b"mp4a", b"mvex", b"moof",
    b"traf", b"mfra", b"udta", b"ipro", b"sinf", b"ilst", b"jumb",
    // iTunes metadata atoms under ilst
    b"\xa9nam", b"\xa9ART", b"\xa9alb", b"\xa9day", b"\xa9gen", b"\xa9too", b"\xa9cmt", b"covr",
    b"trkn", b"disk", b"gnre", b"cpil",
];

impl FourCC {
    /// From the four bytes on the wire
    pub const fn new(code: &[u8; 4]) -> FourCC {
        FourCC(*code)
    }

    /// Printable form; non-ASCII bytes render as `.`
    pub fn as_display(&self) -> String {
        self.0
            .iter()
            .map(|&b| {
                if (0x20..0x7f).contains(&b) {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }

    /// True when this type recursively contains child boxes
    pub fn is_container(&self) -> bool {
        CONTAINERS.iter().any(|c| **c == self.0)
    }
}

impl std::fmt::Debug for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_display())
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_display())
    }
}
