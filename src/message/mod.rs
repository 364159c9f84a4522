//! One adapter per J2735 message: the application model plus the walk that turns it into
//! UPER bits and back, with decode validation interleaved.

/// ENUMERATED type with its root enumerants, wire index and (de)serialisation.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident [extensible = $ext:literal] {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)+
        }

        impl $name {
            /// Number of root enumerants.
            pub const ROOT_COUNT: u64 = [$($value),+].len() as u64;

            pub fn from_index(index: u64) -> Option<Self> {
                match index {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn index(self) -> u64 {
                self as u64
            }

            pub(crate) fn write(
                self,
                w: &mut $crate::bits::BitWriter,
                field: &str,
            ) -> Result<(), $crate::codec::CodecError> {
                w.write_index(field, self.index(), Self::ROOT_COUNT, $ext)
            }

            pub(crate) fn read(
                r: &mut $crate::bits::BitReader<'_>,
                field: &str,
            ) -> Result<Self, $crate::codec::CodecError> {
                let index = r.read_enumerated(field, Self::ROOT_COUNT, $ext)?;
                Self::from_index(index)
                    .ok_or_else(|| $crate::codec::CodecError::invalid_bits(field, index))
            }
        }
    };
}

pub mod bsm;
pub mod common;
pub mod map;
pub mod rtcm;
pub mod spat;
pub mod srm;
pub mod ssm;
