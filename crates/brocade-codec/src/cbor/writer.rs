//! Preferred-form CBOR writer.

use half::f16;
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

use brocade_node::{Event, Node, Scalar, Value};

use crate::cbor::CborWriteOptions;
use crate::error::{CodecError, Result};

const MT_UNSIGNED: u8 = 0;
const MT_NEGATIVE: u8 = 1;
const MT_BYTES: u8 = 2;
const MT_TEXT: u8 = 3;
const MT_LIST: u8 = 4;
const MT_MAP: u8 = 5;
const MT_TAG: u8 = 6;

/// Push-style CBOR writer.
///
/// `write_node` emits definite lengths throughout; the raw [`event`]
/// entry point frames containers with indefinite lengths because the
/// sizes are not known until the close event arrives.
///
/// [`event`]: CborWriter::event
pub struct CborWriter {
    out: Vec<u8>,
    opts: CborWriteOptions,
}

impl CborWriter {
    /// Fresh writer
    pub fn new(opts: CborWriteOptions) -> CborWriter {
        CborWriter {
            out: Vec::new(),
            opts,
        }
    }

    /// The encoded document
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    /// Encode a finished tree
    pub fn write_node(&mut self, node: &Node) -> Result<()> {
        self.node(node, 0)
    }

    fn node(&mut self, node: &Node, depth: usize) -> Result<()> {
        if depth > self.opts.max_recursion {
            return Err(CodecError::ResourceLimit { limit: "recursion" });
        }
        if let Some(tag) = node.tag() {
            self.head(MT_TAG, tag);
        }
        node.with_value(|value| match value {
            Value::Null => {
                self.out.push(0xf6);
                Ok(())
            }
            Value::Undefined(None) => {
                self.out.push(0xf7);
                Ok(())
            }
            Value::Undefined(Some(code)) => self.simple(*code),
            Value::Bool(false) => {
                self.out.push(0xf4);
                Ok(())
            }
            Value::Bool(true) => {
                self.out.push(0xf5);
                Ok(())
            }
            Value::Int(v) => {
                self.int(*v as i64);
                Ok(())
            }
            Value::Long(v) => {
                self.int(*v);
                Ok(())
            }
            Value::Big(b) => {
                self.big(b);
                Ok(())
            }
            Value::Float(f) => {
                self.float(*f);
                Ok(())
            }
            Value::String(s) => {
                self.head(MT_TEXT, s.len() as u64);
                self.out.extend_from_slice(s.as_bytes());
                Ok(())
            }
            Value::Buffer(b) => {
                self.head(MT_BYTES, b.len() as u64);
                self.out.extend_from_slice(b);
                Ok(())
            }
            Value::List(_) => {
                let items = node.items().expect("list");
                self.head(MT_LIST, items.len() as u64);
                for item in &items {
                    self.node(item, depth + 1)?;
                }
                Ok(())
            }
            Value::Map(_) => {
                let mut entries = node.entries().expect("map");
                if self.opts.sorted {
                    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
                }
                self.head(MT_MAP, entries.len() as u64);
                for (key, child) in &entries {
                    self.key(key);
                    self.node(child, depth + 1)?;
                }
                Ok(())
            }
        })
    }

    /// Encode one raw event; containers become indefinite-length
    pub fn event(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::StartMap => self.out.push(0xbf),
            Event::StartList => self.out.push(0x9f),
            Event::EndMap | Event::EndList => self.out.push(0xff),
            Event::Key(k) => {
                self.head(MT_TEXT, k.len() as u64);
                self.out.extend_from_slice(k.as_bytes());
            }
            Event::Tag(t) => self.head(MT_TAG, *t),
            Event::Simple(code) => self.simple(*code)?,
            Event::Primitive(s) => self.scalar(s)?,
        }
        Ok(())
    }

    fn scalar(&mut self, scalar: &Scalar) -> Result<()> {
        match scalar {
            Scalar::Null => self.out.push(0xf6),
            Scalar::Undefined => self.out.push(0xf7),
            Scalar::Bool(false) => self.out.push(0xf4),
            Scalar::Bool(true) => self.out.push(0xf5),
            Scalar::Int(v) => self.int(*v as i64),
            Scalar::Long(v) => self.int(*v),
            Scalar::Big(b) => self.big(b),
            Scalar::Float(f) => self.float(*f),
            Scalar::Str(s) => {
                self.head(MT_TEXT, s.len() as u64);
                self.out.extend_from_slice(s.as_bytes());
            }
            Scalar::Bytes(b) => {
                self.head(MT_BYTES, b.len() as u64);
                self.out.extend_from_slice(b);
            }
        }
        Ok(())
    }

    /// A map key: text, unless `int_keys` is set and the key is a
    /// canonical decimal integer
    fn key(&mut self, key: &str) {
        if self.opts.int_keys
            && is_canonical_int(key)
            && let Ok(v) = key.parse::<i64>()
        {
            self.int(v);
            return;
        }
        self.head(MT_TEXT, key.len() as u64);
        self.out.extend_from_slice(key.as_bytes());
    }

    /// Shortest-form head for a major type and argument
    fn head(&mut self, mt: u8, value: u64) {
        let mt = mt << 5;
        match value {
            0..=23 => self.out.push(mt | value as u8),
            24..=0xff => {
                self.out.push(mt | 24);
                self.out.push(value as u8);
            }
            0x100..=0xffff => {
                self.out.push(mt | 25);
                self.out.extend_from_slice(&(value as u16).to_be_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.out.push(mt | 26);
                self.out.extend_from_slice(&(value as u32).to_be_bytes());
            }
            _ => {
                self.out.push(mt | 27);
                self.out.extend_from_slice(&value.to_be_bytes());
            }
        }
    }

    fn int(&mut self, v: i64) {
        if v >= 0 {
            self.head(MT_UNSIGNED, v as u64);
        } else {
            self.head(MT_NEGATIVE, !(v as u64));
        }
    }

    /// Big integers use the plain integer majors while they fit 64
    /// bits, falling back to tags 2/3
    fn big(&mut self, b: &BigInt) {
        if let Some(v) = b.to_u64() {
            self.head(MT_UNSIGNED, v);
            return;
        }
        if b.sign() == Sign::Minus {
            let n: BigInt = -b - 1;
            if let Some(v) = n.to_u64() {
                self.head(MT_NEGATIVE, v);
                return;
            }
            self.head(MT_TAG, 3);
            let (_, bytes) = n.to_bytes_be();
            self.head(MT_BYTES, bytes.len() as u64);
            self.out.extend_from_slice(&bytes);
        } else {
            self.head(MT_TAG, 2);
            let (_, bytes) = b.to_bytes_be();
            self.head(MT_BYTES, bytes.len() as u64);
            self.out.extend_from_slice(&bytes);
        }
    }

    /// Shortest float encoding that preserves the value exactly
    fn float(&mut self, f: f64) {
        if f.is_nan() {
            self.out.extend_from_slice(&[0xf9, 0x7e, 0x00]);
            return;
        }
        let h = f16::from_f64(f);
        if h.to_f64() == f {
            self.out.push(0xf9);
            self.out.extend_from_slice(&h.to_be_bytes());
            return;
        }
        let s = f as f32;
        if s as f64 == f {
            self.out.push(0xfa);
            self.out.extend_from_slice(&s.to_be_bytes());
            return;
        }
        self.out.push(0xfb);
        self.out.extend_from_slice(&f.to_be_bytes());
    }

    fn simple(&mut self, code: u8) -> Result<()> {
        match code {
            0..=19 => {
                self.out.push(0xe0 | code);
                Ok(())
            }
            20..=31 => Err(CodecError::Unsupported {
                what: "reserved simple value",
            }),
            _ => {
                self.out.push(0xf8);
                self.out.push(code);
                Ok(())
            }
        }
    }
}

/// `"0"`, or an optional sign and digits with no leading zero
fn is_canonical_int(key: &str) -> bool {
    let digits = key.strip_prefix('-').unwrap_or(key);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    digits == "0" && !key.starts_with('-') || !digits.starts_with('0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::{CborReadOptions, CborReader, from_slice, to_vec};
    use brocade_node::NodeBuilder;

    fn round_trip(h: &str) {
        let bytes = hex::decode(h).expect("hex");
        let node = from_slice(&bytes).expect("parse");
        let written = to_vec(&node).expect("write");
        assert_eq!(hex::encode(&written), h, "round trip of {h}");
    }

    #[test]
    fn preferred_forms_round_trip() {
        // RFC 8949 appendix A vectors that already use preferred form
        for h in [
            "00",
            "01",
            "0a",
            "17",
            "1818",
            "1819",
            "1864",
            "1903e8",
            "1a000f4240",
            "1b000000e8d4a51000",
            "20",
            "29",
            "3863",
            "3903e7",
            "3bffffffffffffffff",
            "c249010000000000000000",
            "c349010000000000000000",
            "f90000",
            "f98000",
            "f93c00",
            "f93e00",
            "f97bff",
            "f90001",
            "f90400",
            "f9c400",
            "fa47c35000",
            "fa7f7fffff",
            "fb3ff199999999999a",
            "fbc010666666666666",
            "fb7e37e43c8800759c",
            "f97c00",
            "f97e00",
            "f9fc00",
            "f4",
            "f5",
            "f6",
            "f7",
            "f0",
            "f8ff",
            "40",
            "4401020304",
            "60",
            "6161",
            "6449455446",
            "62c3bc",
            "63e6b0b4",
            "80",
            "83010203",
            "8301820203820405",
            "98190102030405060708090a0b0c0d0e0f101112131415161718181819",
            "a0",
            "a26161016162820203",
            "826161a161626163",
            "c11a514b67b0",
        ] {
            round_trip(h);
        }
    }

    #[test]
    fn indefinite_input_collapses_to_definite() {
        let node = from_slice(&hex::decode("9f018202039f0405ffff").unwrap()).unwrap();
        assert_eq!(hex::encode(to_vec(&node).unwrap()), "8301820203820405");
    }

    #[test]
    fn sixty_four_bit_uint_round_trips() {
        round_trip("1bffffffffffffffff");
    }

    #[test]
    fn sorted_option_orders_keys() {
        let node = from_slice(&hex::decode("a26162016161 02".replace(' ', "")).unwrap()).unwrap();
        let mut writer = CborWriter::new(CborWriteOptions::builder().sorted(true).build());
        writer.write_node(&node).unwrap();
        assert_eq!(hex::encode(writer.into_bytes()), "a2616102616201");
    }

    #[test]
    fn insertion_order_kept_by_default() {
        let node = from_slice(&hex::decode("a26162016161 02".replace(' ', "")).unwrap()).unwrap();
        assert_eq!(hex::encode(to_vec(&node).unwrap()), "a2616201616102");
    }

    #[test]
    fn event_stream_writes_indefinite() {
        let mut writer = CborWriter::new(CborWriteOptions::default());
        for ev in [
            Event::StartMap,
            Event::Key("Fun".into()),
            Event::Primitive(Scalar::Bool(true)),
            Event::Key("Amt".into()),
            Event::Primitive(Scalar::Int(-2)),
            Event::EndMap,
        ] {
            writer.event(&ev).unwrap();
        }
        assert_eq!(hex::encode(writer.into_bytes()), "bf6346756ef563416d7421ff");
    }

    #[test]
    fn streamed_output_reparses() {
        // drive reader events straight into an event-mode writer
        let original = hex::decode("a26161016162820203").unwrap();
        let mut reader = CborReader::new(&original, CborReadOptions::default());
        let mut writer = CborWriter::new(CborWriteOptions::default());
        while let Some(ev) = reader.next_event().unwrap() {
            writer.event(&ev).unwrap();
        }
        let streamed = writer.into_bytes();
        let mut builder = NodeBuilder::new();
        let mut reread = CborReader::new(&streamed, CborReadOptions::default());
        while let Some(ev) = reread.next_event().unwrap() {
            builder.on_event(ev).unwrap();
        }
        let node = builder.take().unwrap();
        assert_eq!(node, from_slice(&original).unwrap());
    }

    #[test]
    fn tag_then_value_order() {
        let node = Node::from(1363896240i64);
        node.set_tag(Some(1));
        assert_eq!(hex::encode(to_vec(&node).unwrap()), "c11a514b67b0");
    }

    #[test]
    fn int_keys_round_trip() {
        // {1: 2, -7: 4} reads with coerced keys and writes back as
        // integer labels when asked
        let node = from_slice(&hex::decode("a201022604").unwrap()).unwrap();
        assert_eq!(node.get("[\"1\"]").unwrap().int_value().unwrap(), 2);
        assert_eq!(node.get("[\"-7\"]").unwrap().int_value().unwrap(), 4);
        let mut writer = CborWriter::new(CborWriteOptions::builder().int_keys(true).build());
        writer.write_node(&node).unwrap();
        assert_eq!(hex::encode(writer.into_bytes()), "a201022604");
        // without the option the coerced text keys stay text
        assert_eq!(hex::encode(to_vec(&node).unwrap()), "a2613102622d3704");
    }

    #[test]
    fn negative_sixty_four_bit_boundary() {
        // -2^64 fits the negative major; -2^64 - 1 needs tag 3
        let node = from_slice(&hex::decode("3bffffffffffffffff").unwrap()).unwrap();
        assert_eq!(hex::encode(to_vec(&node).unwrap()), "3bffffffffffffffff");
    }
}
