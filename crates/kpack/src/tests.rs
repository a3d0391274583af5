use crate::*;
use proptest::prelude::*;
use std::f64::consts::PI;

// ============================================================================
//  SCALARS
// ============================================================================

#[test]
fn test_integer_extremes_roundtrip() -> Result<()> {
    let mut enc = Encoder::new();
    enc.u8(u8::MAX)?;
    enc.s8(i8::MIN)?;
    enc.u16(u16::MAX)?;
    enc.s16(i16::MIN)?;
    enc.u32(u32::MAX)?;
    enc.s32(i32::MIN)?;
    enc.u64(u64::MAX)?;
    enc.s64(i64::MIN)?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert_eq!(dec.u8()?, u8::MAX);
    assert_eq!(dec.s8()?, i8::MIN);
    assert_eq!(dec.u16()?, u16::MAX);
    assert_eq!(dec.s16()?, i16::MIN);
    assert_eq!(dec.u32()?, u32::MAX);
    assert_eq!(dec.s32()?, i32::MIN);
    assert_eq!(dec.u64()?, u64::MAX);
    assert_eq!(dec.s64()?, i64::MIN);
    dec.finish()
}

#[test]
fn test_bool_float_unit() -> Result<()> {
    let mut enc = Encoder::new();
    enc.bool(true)?;
    enc.bool(false)?;
    enc.f32(3.5)?;
    enc.f64(PI)?;
    enc.unit()?;
    enc.option_none()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert!(dec.bool()?);
    assert!(!dec.bool()?);
    assert_eq!(dec.f32()?, 3.5);
    assert_eq!(dec.f64()?, PI);
    dec.unit()?;
    dec.option_none()?;
    assert_eq!(dec.remaining(), 0);
    Ok(())
}

#[test]
fn test_object_ids() -> Result<()> {
    let mut enc = Encoder::new();
    enc.object(0)?;
    enc.object(0xdead_beef)?;

    let bytes = enc.into_bytes()?;
    assert_eq!(bytes.len(), 18);
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.object()?, 0);
    assert_eq!(dec.object()?, 0xdead_beef);
    Ok(())
}

#[test]
fn test_strings_and_bytes() -> Result<()> {
    let mut enc = Encoder::new();
    enc.str("hello")?;
    enc.str("")?;
    enc.str("❤️")?;
    enc.bytes(&[1, 2, 3])?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert_eq!(dec.str()?, "hello");
    assert_eq!(dec.str()?, "");
    assert_eq!(dec.str()?, "❤️");
    assert_eq!(dec.bytes()?, &[1, 2, 3]);
    Ok(())
}

// ============================================================================
//  CONTAINERS
// ============================================================================

#[test]
fn test_list_nested() -> Result<()> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    enc.u32(1)?;
    enc.list_begin()?;
    enc.str("inner")?;
    enc.list_end()?;
    enc.list_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut list = dec.list()?;

    assert_eq!(list.next()?.map(|mut d| d.u32()).transpose()?, Some(1));
    let mut inner = list.next()?.expect("inner list");
    let mut inner = inner.list()?;
    assert_eq!(inner.next()?.expect("item").str()?, "inner");
    assert!(inner.next()?.is_none());
    assert!(list.next()?.is_none());
    Ok(())
}

#[test]
fn test_dict_pairs() -> Result<()> {
    let mut enc = Encoder::new();
    enc.dict_begin()?;
    enc.s32(1)?;
    enc.str("one")?;
    enc.s32(2)?;
    enc.str("two")?;
    enc.dict_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut dict = dec.dict()?;

    let (mut k, mut v) = dict.next()?.expect("first entry");
    assert_eq!((k.s32()?, v.str()?), (1, "one"));
    let (mut k, mut v) = dict.next()?.expect("second entry");
    assert_eq!((k.s32()?, v.str()?), (2, "two"));
    assert!(dict.next()?.is_none());
    Ok(())
}

#[test]
fn test_record_fields_and_skip() -> Result<()> {
    let mut enc = Encoder::new();
    enc.record_begin()?;
    enc.variant_begin("service")?;
    enc.str("KRPC")?;
    enc.variant_end()?;
    enc.variant_begin("unknown")?;
    enc.list_begin()?;
    enc.u64(7)?;
    enc.list_end()?;
    enc.variant_end()?;
    enc.variant_begin("id")?;
    enc.u64(42)?;
    enc.variant_end()?;
    enc.record_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut fields = dec.record()?;

    let mut service = None;
    let mut id = None;
    while let Some((name, mut val)) = fields.next()? {
        match name {
            "service" => service = Some(val.str()?),
            "id" => id = Some(val.u64()?),
            _ => val.skip()?,
        }
    }
    assert_eq!(service, Some("KRPC"));
    assert_eq!(id, Some(42));
    Ok(())
}

#[test]
fn test_option_some_and_raw_splice() -> Result<()> {
    let mut arg = Encoder::new();
    arg.str("pre-encoded")?;
    let arg = arg.into_bytes()?;

    let mut enc = Encoder::new();
    enc.option_some_begin()?;
    enc.raw(&arg)?;
    enc.option_some_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut inner = dec.option()?.expect("some");
    assert_eq!(inner.raw()?, arg.as_slice());
    Ok(())
}

// ============================================================================
//  STRUCTURAL VIOLATIONS
// ============================================================================

#[test]
fn test_strict_option_too_many() {
    let mut enc = Encoder::new();
    enc.option_some_begin().unwrap();
    enc.u8(1).unwrap();
    assert_eq!(enc.u8(2), Err(Error::TooManyItems(Scope::Option)));
}

#[test]
fn test_strict_variant_empty() {
    let mut enc = Encoder::new();
    enc.variant_begin("empty").unwrap();
    assert_eq!(enc.variant_end(), Err(Error::EmptyAdt(Scope::Variant)));
}

#[test]
fn test_strict_record_rejects_scalars() {
    let mut enc = Encoder::new();
    enc.record_begin().unwrap();
    assert_eq!(enc.u32(1), Err(Error::InvalidRecordEntry));
}

#[test]
fn test_strict_dict_odd_count() {
    let mut enc = Encoder::new();
    enc.dict_begin().unwrap();
    enc.str("key").unwrap();
    assert_eq!(enc.dict_end(), Err(Error::UnpairedDictEntry));
}

#[test]
fn test_scope_mismatch_and_underflow() {
    let mut enc = Encoder::new();
    assert_eq!(enc.list_end(), Err(Error::ScopeUnderflow));
    enc.list_begin().unwrap();
    assert_eq!(
        enc.set_end(),
        Err(Error::ScopeMismatch { expected: Scope::Set, actual: Scope::List })
    );
    assert_eq!(enc.into_bytes(), Err(Error::ScopeStillOpen));
}

// ============================================================================
//  MALFORMED INPUT
// ============================================================================

#[test]
fn test_fail_invalid_tag() {
    let mut dec = Decoder::new(&[0xFF]);
    assert_eq!(dec.skip(), Err(Error::InvalidTag(0xFF)));
}

#[test]
fn test_fail_tag_mismatch_names_expected() {
    let mut enc = Encoder::new();
    enc.u32(5).unwrap();
    let bytes = enc.into_bytes().unwrap();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.u64(), Err(Error::TagMismatch { expected: Tag::U64, found: Tag::U32 }));
}

#[test]
fn test_fail_invalid_utf8() {
    let bytes = [Tag::String as u8, 2, 0, 0, 0, 0xC3, 0x28];
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.str(), Err(Error::InvalidUtf8));
}

#[test]
fn test_fail_truncated_list_item_is_error() {
    let mut enc = Encoder::new();
    enc.list_begin().unwrap();
    enc.u64(1).unwrap();
    enc.list_end().unwrap();
    let mut bytes = enc.into_bytes().unwrap();
    // shrink the declared body so the u64 is cut in half
    bytes[1] = 5;
    bytes.truncate(10);

    let mut dec = Decoder::new(&bytes);
    let mut list = dec.list().unwrap();
    assert_eq!(list.next().unwrap_err(), Error::UnexpectedEnd);
}

#[test]
fn test_every_prefix_of_a_record_fails() {
    let mut enc = Encoder::new();
    enc.record_begin().unwrap();
    enc.variant_begin("name").unwrap();
    enc.str("value").unwrap();
    enc.variant_end().unwrap();
    enc.record_end().unwrap();
    let bytes = enc.into_bytes().unwrap();

    for cut in 0..bytes.len() {
        let mut dec = Decoder::new(&bytes[..cut]);
        let result = dec.record().and_then(|mut r| {
            while let Some((_, mut v)) = r.next()? {
                v.str()?;
            }
            Ok(())
        });
        assert!(result.is_err(), "prefix of length {} decoded", cut);
    }
}

#[test]
fn test_trailing_bytes_detected() {
    let mut enc = Encoder::new();
    enc.u8(1).unwrap();
    enc.u8(2).unwrap();
    let bytes = enc.into_bytes().unwrap();

    let mut dec = Decoder::new(&bytes);
    dec.u8().unwrap();
    assert_eq!(dec.finish(), Err(Error::TrailingBytes(2)));
}

proptest! {
    #[test]
    fn prop_truncated_scalars_never_decode(v in any::<u64>(), cut in 0usize..9) {
        let mut enc = Encoder::new();
        enc.u64(v).unwrap();
        let bytes = enc.into_bytes().unwrap();
        let mut dec = Decoder::new(&bytes[..cut]);
        prop_assert!(dec.u64().is_err());
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let mut dec = Decoder::new(&bytes);
        while dec.remaining() > 0 {
            if dec.skip().is_err() {
                break;
            }
        }
    }
}
