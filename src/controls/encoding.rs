//! Shared BER-encoding helpers for the custom controls this tool defines
//! that `ldap3` itself doesn't implement. Mirrors the pattern used in
//! `ldap3`'s own `controls_impl::paged_results`/`assertion` modules: build a
//! `Tag` tree with `ldap3::asn1`, then `write::encode_into` it into a
//! byte buffer to use as a control's opaque value.

use bytes::BytesMut;

use ldap3::asn1::{write, ASNTag, Boolean, Enumerated, Integer, OctetString, Sequence, Tag};

pub fn encode_sequence(inner: Vec<Tag>) -> Vec<u8> {
    let tag = Tag::Sequence(Sequence {
        inner,
        ..Default::default()
    })
    .into_structure();
    let mut buf = BytesMut::new();
    write::encode_into(&mut buf, tag).expect("encoded control value");
    Vec::from(&buf[..])
}

pub fn octet_string(bytes: impl Into<Vec<u8>>) -> Tag {
    Tag::OctetString(OctetString {
        inner: bytes.into(),
        ..Default::default()
    })
}

pub fn integer(value: i64) -> Tag {
    Tag::Integer(Integer {
        inner: value,
        ..Default::default()
    })
}

pub fn boolean(value: bool) -> Tag {
    Tag::Boolean(Boolean {
        inner: value,
        ..Default::default()
    })
}

pub fn enumerated(value: i64) -> Tag {
    Tag::Enumerated(Enumerated {
        inner: value,
        ..Default::default()
    })
}

pub fn sequence(inner: Vec<Tag>) -> Tag {
    Tag::Sequence(Sequence {
        inner,
        ..Default::default()
    })
}
