//! The canonical, deterministic binary codec for everything that crosses the
//! wire or gets hashed in the consensus path.
//!
//! We use `parity-scale-codec` (SCALE) for the same reason Substrate-style
//! kernels do: it is compact, deterministic, and has no floating
//! platform-dependent representation. Forward compatibility ("unknown
//! fields are ignored", spec.md §6) is not a property of raw SCALE, so
//! message families that need to evolve are wrapped in a small
//! `schema_version` envelope (see [`Versioned`]) instead of relying on the
//! codec itself.

use parity_scale_codec::{Decode, Encode};

/// Encodes a value into its canonical, deterministic byte representation.
///
/// Used for anything written to the wire or folded into a hash — two nodes
/// encoding the same logical value must always produce identical bytes.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Vec<u8> {
    v.encode()
}

/// Decodes a value from its canonical byte representation.
///
/// Fails fast: trailing or malformed bytes are rejected rather than
/// silently truncated, since malformed consensus data must never be
/// accepted as valid.
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, String> {
    T::decode(&mut &*b).map_err(|e| format!("canonical decode failed: {e}"))
}

/// A forward-compatible envelope around a versioned payload.
///
/// New fields are added by introducing a new `schema_version` and a new
/// payload type; readers try the highest known version first and fall back,
/// so a replica running older code can still decode a message it
/// understands the shape of, and a replica running newer code can still
/// read old messages. This is the SCALE-friendly equivalent of "unknown
/// fields are ignored".
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct Versioned<T> {
    pub schema_version: u16,
    pub payload: T,
}

impl<T: Encode> Versioned<T> {
    pub fn new(version: u16, payload: T) -> Self {
        Self {
            schema_version: version,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Encode, Decode, Debug, PartialEq, Eq)]
    struct Demo {
        id: u32,
        name: String,
        tags: Vec<u8>,
    }

    #[test]
    fn roundtrip() {
        let d = Demo {
            id: 7,
            name: "seq".into(),
            tags: vec![1, 2, 3],
        };
        let bytes = to_bytes_canonical(&d);
        let back: Demo = from_bytes_canonical(&bytes).expect("decode");
        assert_eq!(d, back);
    }

    #[test]
    fn rejects_garbage() {
        let bytes = [0xffu8, 0xff, 0xff];
        let res: Result<Demo, _> = from_bytes_canonical(&bytes);
        assert!(res.is_err());
    }

    #[test]
    fn versioned_roundtrip() {
        let v = Versioned::new(1, Demo { id: 1, name: "a".into(), tags: vec![] });
        let bytes = to_bytes_canonical(&v);
        let back: Versioned<Demo> = from_bytes_canonical(&bytes).expect("decode");
        assert_eq!(v, back);
    }
}
