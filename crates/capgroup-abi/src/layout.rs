//! Layout descriptors.
//!
//! A descriptor records the shapes a library was compiled against: an ABI version, the version
//! of the crate defining the interfaces, and the size and alignment of every type that crosses
//! the boundary. Host and plugin each embed one; the loader refuses to call into a plugin whose
//! descriptor differs from its own.

use core::fmt;

use thiserror::Error;

use crate::slice::CSliceRef;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Size and alignment of one named type.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    pub name: CSliceRef<'static, u8>,
    pub size: usize,
    pub align: usize,
}

impl LayoutEntry {
    pub const fn of<T>(name: &'static str) -> Self {
        Self {
            name: CSliceRef::from_str(name),
            size: core::mem::size_of::<T>(),
            align: core::mem::align_of::<T>(),
        }
    }

    pub fn name(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }
}

impl fmt::Debug for LayoutEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutEntry")
            .field("name", &self.name.to_string_lossy())
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

/// Comparable description of a compiled interface set.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LayoutDescriptor {
    pub abi_version: u32,
    pub crate_version: CSliceRef<'static, u8>,
    pub entries: CSliceRef<'static, LayoutEntry>,
    pub fingerprint: u64,
}

impl LayoutDescriptor {
    pub const fn new(
        abi_version: u32,
        crate_version: &'static str,
        entries: &'static [LayoutEntry],
    ) -> Self {
        Self {
            abi_version,
            crate_version: CSliceRef::from_str(crate_version),
            entries: CSliceRef::from_slice(entries),
            fingerprint: Self::fingerprint_of(abi_version, crate_version, entries),
        }
    }

    const fn fingerprint_of(abi_version: u32, crate_version: &str, entries: &[LayoutEntry]) -> u64 {
        let mut hash = fnv1a(FNV_OFFSET, &abi_version.to_le_bytes());
        hash = fnv1a(hash, crate_version.as_bytes());
        let mut i = 0;
        while i < entries.len() {
            let entry = &entries[i];
            hash = fnv1a(hash, entry.name.as_slice());
            hash = fnv1a(hash, &(entry.size as u64).to_le_bytes());
            hash = fnv1a(hash, &(entry.align as u64).to_le_bytes());
            i += 1;
        }
        hash
    }

    pub fn entries(&self) -> &'static [LayoutEntry] {
        self.entries.as_slice()
    }

    pub fn crate_version(&self) -> String {
        self.crate_version.to_string_lossy().into_owned()
    }

    /// Whether the stored fingerprint matches the content.
    pub fn is_consistent(&self) -> bool {
        self.fingerprint
            == Self::fingerprint_of(
                self.abi_version,
                &self.crate_version.to_string_lossy(),
                self.entries.as_slice(),
            )
    }

    /// Structural comparison against `found`.
    ///
    /// With `strict` set every field and entry is compared and the first difference is
    /// reported. Otherwise the ABI version and fingerprint decide.
    pub fn check(&self, found: &LayoutDescriptor, strict: bool) -> Result<(), LayoutMismatch> {
        if core::ptr::eq(self, found) {
            return Ok(());
        }

        if self.abi_version != found.abi_version {
            return Err(LayoutMismatch::AbiVersion {
                expected: self.abi_version,
                found: found.abi_version,
            });
        }

        if strict {
            if self.crate_version != found.crate_version {
                return Err(LayoutMismatch::CrateVersion {
                    expected: self.crate_version(),
                    found: found.crate_version(),
                });
            }

            let (expected, actual) = (self.entries(), found.entries());
            if expected.len() != actual.len() {
                return Err(LayoutMismatch::EntryCount {
                    expected: expected.len(),
                    found: actual.len(),
                });
            }

            if let Some((e, a)) = expected.iter().zip(actual).find(|(e, a)| e != a) {
                return Err(LayoutMismatch::Entry {
                    expected: e.name(),
                    found: a.name(),
                    expected_size: e.size,
                    expected_align: e.align,
                    found_size: a.size,
                    found_align: a.align,
                });
            }

            if !found.is_consistent() {
                return Err(LayoutMismatch::Fingerprint {
                    expected: self.fingerprint,
                    found: found.fingerprint,
                });
            }
        }

        if self.fingerprint != found.fingerprint {
            return Err(LayoutMismatch::Fingerprint {
                expected: self.fingerprint,
                found: found.fingerprint,
            });
        }

        Ok(())
    }
}

impl PartialEq for LayoutDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.check(other, true).is_ok()
    }
}

impl Eq for LayoutDescriptor {}

impl fmt::Debug for LayoutDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutDescriptor")
            .field("abi_version", &self.abi_version)
            .field("crate_version", &self.crate_version.to_string_lossy())
            .field("fingerprint", &format_args!("{:#018x}", self.fingerprint))
            .field("entries", &self.entries.as_slice())
            .finish()
    }
}

/// Compare a reference layout with the one a library reported.
///
/// A missing descriptor on either side is a mismatch.
pub fn compare_layouts(
    expected: Option<&LayoutDescriptor>,
    found: Option<&LayoutDescriptor>,
    strict: bool,
) -> Result<(), LayoutMismatch> {
    match (expected, found) {
        (Some(expected), Some(found)) => expected.check(found, strict),
        _ => Err(LayoutMismatch::Missing),
    }
}

/// Why two layout descriptors are incompatible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutMismatch {
    #[error("layout descriptor missing")]
    Missing,

    #[error("ABI version mismatch: expected {expected}, found {found}")]
    AbiVersion { expected: u32, found: u32 },

    #[error("interface crate version mismatch: expected {expected}, found {found}")]
    CrateVersion { expected: String, found: String },

    #[error("layout entry count mismatch: expected {expected}, found {found}")]
    EntryCount { expected: usize, found: usize },

    #[error(
        "layout of `{expected}` differs: expected {expected_size}/{expected_align}, \
         found `{found}` with {found_size}/{found_align}"
    )]
    Entry {
        expected: String,
        found: String,
        expected_size: usize,
        expected_align: usize,
        found_size: usize,
        found_align: usize,
    },

    #[error("layout fingerprint mismatch: expected {expected:#018x}, found {found:#018x}")]
    Fingerprint { expected: u64, found: u64 },
}

/// Build a `[LayoutEntry; N]` from a list of types, named as written.
///
/// ```
/// use capgroup_abi::layout_entries;
/// use capgroup_abi::layout::{LayoutDescriptor, LayoutEntry};
///
/// const ENTRIES: &[LayoutEntry] = &layout_entries![u32, (u8, u64)];
/// static LAYOUT: LayoutDescriptor = LayoutDescriptor::new(1, "0.1.0", ENTRIES);
/// assert_eq!(LAYOUT.entries()[1].size, 16);
/// ```
#[macro_export]
macro_rules! layout_entries {
    ($($ty:ty),* $(,)?) => {
        [$($crate::layout::LayoutEntry::of::<$ty>(stringify!($ty))),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRIES: &[LayoutEntry] = &layout_entries![u32, [u8; 3], (u16, u64)];
    static LAYOUT: LayoutDescriptor = LayoutDescriptor::new(2, "1.0.0", ENTRIES);

    const WIDER: &[LayoutEntry] = &layout_entries![u32, [u8; 4], (u16, u64)];
    static WIDER_LAYOUT: LayoutDescriptor = LayoutDescriptor::new(2, "1.0.0", WIDER);

    #[test]
    fn test_identical_layouts_match() {
        let copy = LAYOUT;
        assert_eq!(compare_layouts(Some(&LAYOUT), Some(&copy), true), Ok(()));
        assert!(LAYOUT.is_consistent());
    }

    #[test]
    fn test_entry_difference_reported() {
        let err = LAYOUT.check(&WIDER_LAYOUT, true).unwrap_err();

        match err {
            LayoutMismatch::Entry {
                expected_size,
                found_size,
                ..
            } => {
                assert_eq!(expected_size, 3);
                assert_eq!(found_size, 4);
            }
            other => panic!("unexpected mismatch: {other}"),
        }
    }

    #[test]
    fn test_lenient_mode_uses_fingerprint() {
        let err = LAYOUT.check(&WIDER_LAYOUT, false).unwrap_err();
        assert!(matches!(err, LayoutMismatch::Fingerprint { .. }));
    }

    #[test]
    fn test_abi_version_checked_first() {
        let other = LayoutDescriptor::new(3, "1.0.0", ENTRIES);
        assert_eq!(
            LAYOUT.check(&other, false),
            Err(LayoutMismatch::AbiVersion {
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn test_tampered_fingerprint_rejected() {
        let mut tampered = LAYOUT;
        tampered.fingerprint ^= 1;

        assert!(!tampered.is_consistent());
        assert!(matches!(
            LAYOUT.check(&tampered, true),
            Err(LayoutMismatch::Fingerprint { .. })
        ));
    }

    #[test]
    fn test_missing_descriptor() {
        assert_eq!(
            compare_layouts(Some(&LAYOUT), None, true),
            Err(LayoutMismatch::Missing)
        );
    }
}
