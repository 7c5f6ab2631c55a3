use std::io::Cursor;

use ldapmodify::ldif::{ChangeRecord, LdifReader, ModOp, NextRecord, TrailingSpacePolicy};

fn read_all(text: &str, default_add: bool) -> Vec<ChangeRecord> {
    let mut reader = LdifReader::new(Cursor::new(text.as_bytes()), TrailingSpacePolicy::Strip, default_add);
    let mut records = Vec::new();
    loop {
        match reader.next_record().expect("no I/O error from an in-memory cursor") {
            NextRecord::Record(r) => records.push(r),
            NextRecord::ParseError { message, .. } => panic!("unexpected parse error: {}", message),
            NextRecord::EndOfStream => break,
        }
    }
    records
}

#[test]
fn reads_a_mixed_change_stream() {
    let text = "\
dn: uid=alice,dc=example,dc=com
changetype: add
objectClass: top
objectClass: person
uid: alice
cn: Alice Example

dn: uid=alice,dc=example,dc=com
changetype: modify
replace: cn
cn: Alice A. Example
-

dn: uid=bob,dc=example,dc=com
changetype: modrdn
newrdn: uid=robert
deleteoldrdn: 1
newsuperior: ou=people,dc=example,dc=com

dn: uid=carol,dc=example,dc=com
changetype: delete
";
    let records = read_all(text, false);
    assert_eq!(records.len(), 4);

    match &records[0] {
        ChangeRecord::Add { dn, attributes, .. } => {
            assert_eq!(dn, "uid=alice,dc=example,dc=com");
            assert_eq!(attributes.iter().find(|(n, _)| n == "objectClass").unwrap().1.len(), 2);
        }
        other => panic!("expected add, got {:?}", other),
    }

    match &records[1] {
        ChangeRecord::Modify { modifications, .. } => {
            assert_eq!(modifications.len(), 1);
            assert_eq!(modifications[0].op, ModOp::Replace);
            assert_eq!(modifications[0].values, vec!["Alice A. Example".to_string()]);
        }
        other => panic!("expected modify, got {:?}", other),
    }

    match &records[2] {
        ChangeRecord::ModifyDn {
            new_rdn,
            delete_old_rdn,
            new_superior,
            ..
        } => {
            assert_eq!(new_rdn, "uid=robert");
            assert!(delete_old_rdn);
            assert_eq!(new_superior.as_deref(), Some("ou=people,dc=example,dc=com"));
        }
        other => panic!("expected modrdn, got {:?}", other),
    }

    assert!(matches!(records[3], ChangeRecord::Delete { .. }));
}

#[test]
fn a_record_missing_changetype_is_a_recoverable_parse_error_without_default_add() {
    let mut reader = LdifReader::new(
        Cursor::new("dn: uid=a,dc=example,dc=com\nobjectClass: top\n".as_bytes()),
        TrailingSpacePolicy::Strip,
        false,
    );
    match reader.next_record().unwrap() {
        NextRecord::ParseError { may_continue, .. } => assert!(may_continue),
        other => panic!("expected a parse error, got {}", describe(&other)),
    }
}

#[test]
fn reading_continues_after_a_recoverable_parse_error() {
    let text = "dn: uid=a,dc=x\nobjectClass: top\n\ndn: uid=b,dc=x\nchangetype: delete\n";
    let mut reader = LdifReader::new(Cursor::new(text.as_bytes()), TrailingSpacePolicy::Strip, false);
    assert!(matches!(reader.next_record().unwrap(), NextRecord::ParseError { .. }));
    match reader.next_record().unwrap() {
        NextRecord::Record(ChangeRecord::Delete { dn, .. }) => assert_eq!(dn, "uid=b,dc=x"),
        other => panic!("expected the second record to parse, got {}", describe(&other)),
    }
}

fn describe(n: &NextRecord) -> &'static str {
    match n {
        NextRecord::Record(_) => "Record",
        NextRecord::ParseError { .. } => "ParseError",
        NextRecord::EndOfStream => "EndOfStream",
    }
}
