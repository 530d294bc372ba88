//! Integration-level coverage of the tagged wire format's testable
//! properties, exercised only through `vesper_core`'s public API.

use std::sync::Arc;

use proptest::prelude::*;

use vesper_core::codec::builtins::IntCodec;
use vesper_core::codec::single;
use vesper_core::codec::Codec;
use vesper_core::{Engine, EngineConfig, HeapBuffer, HeapBufferAllocator, TypeHandle, VesperError};

fn new_engine() -> Engine {
    Engine::new(Arc::new(HeapBufferAllocator::new()), EngineConfig::default()).unwrap()
}

/// S3 — a reserved id is rejected and the registry is left unchanged.
#[test]
fn s3_reserved_id_rejected_registry_unchanged() {
    let mut engine = new_engine();
    let ids_before = engine.registry().ids().len();

    let err = engine
        .registry_mut()
        .register_with_id::<i32>(200, single::<i32, IntCodec>(IntCodec))
        .unwrap_err();
    assert!(matches!(err, VesperError::ConfigurationError { .. }));
    assert_eq!(engine.registry().ids().len(), ids_before);
    assert!(engine.registry().lookup_by_id(200).is_none());
}

#[derive(Debug, PartialEq, Eq, Clone)]
struct Foo {
    marker: u32,
}

#[derive(Clone, Copy, Default)]
struct FooCodec;

impl Codec<Foo> for FooCodec {
    fn write(&self, value: &Foo, out: &mut HeapBuffer, _engine: &mut Engine) -> vesper_core::Result<()> {
        out.write_bytes(&value.marker.to_be_bytes())
    }

    fn read(&self, _h: TypeHandle, input: &mut HeapBuffer, _engine: &mut Engine) -> vesper_core::Result<Foo> {
        let mut buf = [0u8; 4];
        input.read_into(&mut buf)?;
        Ok(Foo {
            marker: u32::from_be_bytes(buf),
        })
    }
}

/// S4 — class framing: a type registered by name only is framed with the
/// CLASS tag, its name length-prefixed, followed by the codec's own bytes.
/// See `DESIGN.md` for why this asserts the self-consistent encoding rather
/// than the specification's own (internally inconsistent) example bytes.
#[test]
fn s4_class_framing_round_trips_and_matches_grammar() {
    let mut engine = new_engine();
    engine
        .registry_mut()
        .register_by_name::<Foo>("a.b.Foo", single::<Foo, FooCodec>(FooCodec))
        .unwrap();

    let value = Foo { marker: 0xDEADBEEF };
    let mut buf = engine.allocate_buffer();
    engine.write_object(&value, &mut buf).unwrap();
    buf.flip();

    let bytes = buf.readable_slice();
    assert_eq!(bytes[0], 0x07, "CLASS tag");
    let name_len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
    assert_eq!(name_len, "a.b.Foo".len());
    let name_bytes = &bytes[3..3 + name_len];
    assert_eq!(name_bytes, b"a.b.Foo");
    let payload = &bytes[3 + name_len..];
    assert_eq!(payload, &[0xDE, 0xAD, 0xBE, 0xEF]);

    let decoded: Foo = engine.read_object(&mut buf).unwrap();
    assert_eq!(decoded, value);
}

/// Invariant 1: round trip equality over a small registered type, checked
/// with randomized inputs rather than a hand-picked example.
proptest! {
    #[test]
    fn invariant1_int_round_trips(n in any::<i32>()) {
        let mut engine = new_engine();
        engine
            .registry_mut()
            .register_with_id::<i32>(10, single::<i32, IntCodec>(IntCodec))
            .unwrap();
        let mut buf = engine.allocate_buffer();
        engine.write_object(&n, &mut buf).unwrap();
        buf.flip();
        let decoded: i32 = engine.read_object(&mut buf).unwrap();
        prop_assert_eq!(decoded, n);
    }
}

/// Invariant 8: null encodes to exactly one byte.
#[test]
fn invariant8_null_is_one_byte() {
    let mut engine = new_engine();
    let mut buf = engine.allocate_buffer();
    engine.write_null(&mut buf).unwrap();
    buf.flip();
    assert_eq!(buf.len(), 1);
    assert_eq!(buf.readable_slice(), &[0x00]);
}

/// Invariant 7: cloning a registry is a deep copy — mutating the clone does
/// not affect the original, and engines sharing the original registry's
/// bindings can still decode each other's output.
#[test]
fn invariant7_registry_clone_is_independent() {
    let mut engine = new_engine();
    engine
        .registry_mut()
        .register_with_id::<i32>(10, single::<i32, IntCodec>(IntCodec))
        .unwrap();

    let mut other = new_engine();
    *other.registry_mut() = engine.registry().clone();
    other
        .registry_mut()
        .register_with_id::<i32>(99, single::<i32, IntCodec>(IntCodec))
        .unwrap();

    assert!(engine.registry().lookup_by_id(99).is_none());
    assert!(other.registry().lookup_by_id(10).is_some());

    let mut buf = engine.allocate_buffer();
    engine.write_object(&7i32, &mut buf).unwrap();
    buf.flip();
    let decoded: i32 = other.read_object(&mut buf).unwrap();
    assert_eq!(decoded, 7);
}
