//! Minimal LDIF change-record stream (RFC 2849).
//!
//! `spec.md` §1 lists the LDIF parser and writer as an external
//! collaborator, out of scope for the engine proper; this module supplies
//! just enough of it — a lazy iterator of `ChangeRecord`s plus the small
//! amount of record-to-text rendering the reject sink (C4) needs — to drive
//! the engine end to end. It does not attempt full RFC 2849 coverage (URL
//! attribute references, `version:` directives beyond 1, non-UTF-8
//! encodings other than the configured one).

use std::io::{self, BufRead};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{Result, ToolError};

/// One LDAP modification inside a `Modify` change record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modification {
    pub op: ModOp,
    pub attribute: String,
    pub values: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Delete,
    Replace,
    Increment,
}

/// A request-control line attached to a change record (`spec.md` §6: "optional
/// per-record control lines").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordControl {
    pub oid: String,
    pub critical: bool,
    pub value: Option<Vec<u8>>,
}

/// `spec.md` §3's `ChangeRecord`, a tagged value with exactly one variant
/// active per record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeRecord {
    Add {
        dn: String,
        attributes: Vec<(String, Vec<String>)>,
        controls: Vec<RecordControl>,
    },
    Delete {
        dn: String,
        controls: Vec<RecordControl>,
    },
    Modify {
        dn: String,
        modifications: Vec<Modification>,
        controls: Vec<RecordControl>,
    },
    ModifyDn {
        dn: String,
        new_rdn: String,
        delete_old_rdn: bool,
        new_superior: Option<String>,
        controls: Vec<RecordControl>,
    },
}

impl ChangeRecord {
    pub fn dn(&self) -> &str {
        match self {
            ChangeRecord::Add { dn, .. }
            | ChangeRecord::Delete { dn, .. }
            | ChangeRecord::Modify { dn, .. }
            | ChangeRecord::ModifyDn { dn, .. } => dn,
        }
    }

    pub fn controls(&self) -> &[RecordControl] {
        match self {
            ChangeRecord::Add { controls, .. }
            | ChangeRecord::Delete { controls, .. }
            | ChangeRecord::Modify { controls, .. }
            | ChangeRecord::ModifyDn { controls, .. } => controls,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ChangeRecord::Add { .. } => "add",
            ChangeRecord::Delete { .. } => "delete",
            ChangeRecord::Modify { .. } => "modify",
            ChangeRecord::ModifyDn { .. } => "modrdn",
        }
    }

    /// Render back to LDIF lines, for the reject sink (`spec.md` §4.4).
    pub fn to_ldif_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("dn: {}", self.dn())];
        lines.push(format!("changetype: {}", self.kind_name()));
        match self {
            ChangeRecord::Add { attributes, .. } => {
                for (name, values) in attributes {
                    for v in values {
                        lines.push(format!("{}: {}", name, v));
                    }
                }
            }
            ChangeRecord::Delete { .. } => {}
            ChangeRecord::Modify { modifications, .. } => {
                for m in modifications {
                    let verb = match m.op {
                        ModOp::Add => "add",
                        ModOp::Delete => "delete",
                        ModOp::Replace => "replace",
                        ModOp::Increment => "increment",
                    };
                    lines.push(format!("{}: {}", verb, m.attribute));
                    for v in &m.values {
                        lines.push(format!("{}: {}", m.attribute, v));
                    }
                    lines.push("-".to_owned());
                }
            }
            ChangeRecord::ModifyDn {
                new_rdn,
                delete_old_rdn,
                new_superior,
                ..
            } => {
                lines.push(format!("newrdn: {}", new_rdn));
                lines.push(format!("deleteoldrdn: {}", if *delete_old_rdn { 1 } else { 0 }));
                if let Some(sup) = new_superior {
                    lines.push(format!("newsuperior: {}", sup));
                }
            }
        }
        lines
    }
}

/// How trailing whitespace on attribute value lines is handled
/// (`spec.md` §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrailingSpacePolicy {
    Reject,
    Strip,
    Retain,
}

/// Outcome of pulling one record from the stream.
pub enum NextRecord {
    Record(ChangeRecord),
    /// A record failed to parse; `may_continue` mirrors `spec.md` §4.8's
    /// `mayContinueReading` (true unless the malformation is unrecoverable,
    /// e.g. a truncated final record).
    ParseError { line: usize, message: String, may_continue: bool },
    EndOfStream,
}

/// Reads change records out of one or more LDIF sources, one blank-line
/// delimited paragraph at a time.
pub struct LdifReader<R> {
    lines: io::Lines<R>,
    line_no: usize,
    pending: Option<String>,
    trailing_space: TrailingSpacePolicy,
    default_add: bool,
}

impl<R: BufRead> LdifReader<R> {
    pub fn new(reader: R, trailing_space: TrailingSpacePolicy, default_add: bool) -> LdifReader<R> {
        LdifReader {
            lines: reader.lines(),
            line_no: 0,
            pending: None,
            trailing_space,
            default_add,
        }
    }

    fn next_raw_line(&mut self) -> io::Result<Option<String>> {
        if let Some(l) = self.pending.take() {
            return Ok(Some(l));
        }
        match self.lines.next() {
            Some(Ok(l)) => {
                self.line_no += 1;
                Ok(Some(l))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Reads one LDIF paragraph (a run of non-blank, possibly-folded lines)
    /// terminated by a blank line or end of input.
    fn read_paragraph(&mut self) -> io::Result<Option<Vec<String>>> {
        let mut unfolded: Vec<String> = Vec::new();
        loop {
            let raw = match self.next_raw_line()? {
                Some(l) => l,
                None => break,
            };
            if raw.is_empty() {
                if unfolded.is_empty() {
                    continue;
                }
                break;
            }
            if raw.starts_with(' ') && !unfolded.is_empty() {
                let last = unfolded.last_mut().expect("non-empty");
                last.push_str(&raw[1..]);
            } else if raw.starts_with('#') {
                continue;
            } else {
                unfolded.push(raw);
            }
        }
        if unfolded.is_empty() {
            Ok(None)
        } else {
            Ok(Some(unfolded))
        }
    }

    fn apply_trailing_space(&self, value: String) -> Result<String> {
        let trimmed_len = value.trim_end_matches(' ').len();
        if trimmed_len == value.len() {
            return Ok(value);
        }
        match self.trailing_space {
            TrailingSpacePolicy::Retain => Ok(value),
            TrailingSpacePolicy::Strip => Ok(value[..trimmed_len].to_owned()),
            TrailingSpacePolicy::Reject => Err(ToolError::Ldif {
                line: self.line_no,
                message: "attribute value has disallowed trailing whitespace".into(),
            }),
        }
    }

    fn decode_value(&self, line: &str) -> Result<(String, String)> {
        // attr:: base64   or   attr: plain   or   attr:< url (unsupported)
        let colon = line.find(':').ok_or_else(|| ToolError::Ldif {
            line: self.line_no,
            message: format!("malformed attribute line: {}", line),
        })?;
        let name = line[..colon].to_owned();
        let rest = &line[colon + 1..];
        if let Some(b64) = rest.strip_prefix(':') {
            let b64 = b64.trim_start();
            let bytes = BASE64.decode(b64).map_err(|e| ToolError::Ldif {
                line: self.line_no,
                message: format!("invalid base64 value for {}: {}", name, e),
            })?;
            let value = String::from_utf8(bytes).map_err(|e| ToolError::Ldif {
                line: self.line_no,
                message: format!("non-UTF-8 base64 value for {}: {}", name, e),
            })?;
            Ok((name, value))
        } else if rest.starts_with('<') {
            Err(ToolError::Ldif {
                line: self.line_no,
                message: "URL attribute references are not supported".into(),
            })
        } else {
            let value = rest.strip_prefix(' ').unwrap_or(rest).to_owned();
            let value = self.apply_trailing_space(value)?;
            Ok((name, value))
        }
    }

    fn parse_paragraph(&mut self, lines: Vec<String>) -> Result<ChangeRecord> {
        let mut iter = lines.into_iter().peekable();
        let dn_line = iter.next().ok_or_else(|| ToolError::Ldif {
            line: self.line_no,
            message: "empty record".into(),
        })?;
        let (dn_attr, dn) = self.decode_value(&dn_line)?;
        if dn_attr != "dn" {
            return Err(ToolError::Ldif {
                line: self.line_no,
                message: format!("expected 'dn:', found '{}:'", dn_attr),
            });
        }

        let mut controls = Vec::new();
        let mut changetype: Option<String> = None;
        while let Some(peek) = iter.peek() {
            if peek.starts_with("control:") {
                let line = iter.next().expect("peeked");
                controls.push(self.parse_control_line(&line)?);
            } else if peek.starts_with("changetype:") {
                let (_, ct) = self.decode_value(&iter.next().expect("peeked"))?;
                changetype = Some(ct);
                break;
            } else {
                break;
            }
        }

        let changetype = match changetype {
            Some(ct) => ct,
            None if self.default_add => "add".to_owned(),
            None => {
                return Err(ToolError::Ldif {
                    line: self.line_no,
                    message: "record has no changetype and --defaultAdd was not given".into(),
                })
            }
        };

        match changetype.as_str() {
            "add" => {
                let mut attributes: Vec<(String, Vec<String>)> = Vec::new();
                for line in iter {
                    let (name, value) = self.decode_value(&line)?;
                    match attributes.iter_mut().find(|(n, _)| n == &name) {
                        Some((_, values)) => values.push(value),
                        None => attributes.push((name, vec![value])),
                    }
                }
                Ok(ChangeRecord::Add { dn, attributes, controls })
            }
            "delete" => Ok(ChangeRecord::Delete { dn, controls }),
            "modify" => {
                let modifications = self.parse_modifications(iter)?;
                Ok(ChangeRecord::Modify {
                    dn,
                    modifications,
                    controls,
                })
            }
            "modrdn" | "moddn" => {
                let mut new_rdn = None;
                let mut delete_old_rdn = true;
                let mut new_superior = None;
                for line in iter {
                    let (name, value) = self.decode_value(&line)?;
                    match name.as_str() {
                        "newrdn" => new_rdn = Some(value),
                        "deleteoldrdn" => delete_old_rdn = value.trim() == "1",
                        "newsuperior" => new_superior = Some(value),
                        _ => {}
                    }
                }
                let new_rdn = new_rdn.ok_or_else(|| ToolError::Ldif {
                    line: self.line_no,
                    message: "modrdn record missing newrdn".into(),
                })?;
                Ok(ChangeRecord::ModifyDn {
                    dn,
                    new_rdn,
                    delete_old_rdn,
                    new_superior,
                    controls,
                })
            }
            other => Err(ToolError::Ldif {
                line: self.line_no,
                message: format!("unrecognized changetype: {}", other),
            }),
        }
    }

    fn parse_control_line(&self, line: &str) -> Result<RecordControl> {
        let rest = line.strip_prefix("control:").expect("checked").trim_start();
        let mut parts = rest.splitn(3, ' ');
        let oid = parts.next().unwrap_or("").to_owned();
        let mut critical = false;
        let mut value = None;
        if let Some(next) = parts.next() {
            if next == "true" || next == "false" {
                critical = next == "true";
                if let Some(v) = parts.next() {
                    value = Some(v.as_bytes().to_vec());
                }
            } else {
                value = Some(next.as_bytes().to_vec());
            }
        }
        Ok(RecordControl { oid, critical, value })
    }

    fn parse_modifications(
        &mut self,
        iter: impl Iterator<Item = String>,
    ) -> Result<Vec<Modification>> {
        let mut mods = Vec::new();
        let mut current: Option<Modification> = None;
        for line in iter {
            if line == "-" {
                if let Some(m) = current.take() {
                    mods.push(m);
                }
                continue;
            }
            let (name, value) = self.decode_value(&line)?;
            match name.as_str() {
                "add" | "delete" | "replace" | "increment" => {
                    let op = match name.as_str() {
                        "add" => ModOp::Add,
                        "delete" => ModOp::Delete,
                        "replace" => ModOp::Replace,
                        _ => ModOp::Increment,
                    };
                    current = Some(Modification {
                        op,
                        attribute: value,
                        values: Vec::new(),
                    });
                }
                _ => {
                    if let Some(m) = current.as_mut() {
                        m.values.push(value);
                    } else {
                        return Err(ToolError::Ldif {
                            line: self.line_no,
                            message: format!("value for '{}' outside of an add/delete/replace/increment block", name),
                        });
                    }
                }
            }
        }
        if let Some(m) = current.take() {
            mods.push(m);
        }
        Ok(mods)
    }

    /// Pulls the next record out of the stream. Never returns an `Err`
    /// directly for parse failures — those are surfaced as
    /// `NextRecord::ParseError` so the engine can decide whether to
    /// continue, per `spec.md` §4.8 step 2. I/O failures reading the
    /// underlying source are still propagated as `Err`.
    pub fn next_record(&mut self) -> Result<NextRecord> {
        let paragraph = match self.read_paragraph() {
            Ok(Some(p)) => p,
            Ok(None) => return Ok(NextRecord::EndOfStream),
            Err(e) => return Err(ToolError::Io(e)),
        };
        let start_line = self.line_no;
        match self.parse_paragraph(paragraph) {
            Ok(record) => Ok(NextRecord::Record(record)),
            Err(ToolError::Ldif { line, message }) => Ok(NextRecord::ParseError {
                line,
                message,
                may_continue: true,
            }),
            Err(other) => {
                let _ = start_line;
                Err(other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> LdifReader<Cursor<&[u8]>> {
        LdifReader::new(Cursor::new(text.as_bytes()), TrailingSpacePolicy::Strip, false)
    }

    #[test]
    fn parses_a_single_add_record() {
        let mut r = reader("dn: uid=a,dc=x\nchangetype: add\nobjectClass: top\nuid: a\n");
        match r.next_record().unwrap() {
            NextRecord::Record(ChangeRecord::Add { dn, attributes, .. }) => {
                assert_eq!(dn, "uid=a,dc=x");
                assert_eq!(attributes.len(), 2);
            }
            other => panic!("expected Add, got {:?}", summarize(&other)),
        }
        assert!(matches!(r.next_record().unwrap(), NextRecord::EndOfStream));
    }

    #[test]
    fn parses_modify_with_multiple_mod_blocks() {
        let text = "dn: uid=a,dc=x\nchangetype: modify\nadd: mail\nmail: a@x.com\n-\nreplace: cn\ncn: A Name\n-\n";
        let mut r = reader(text);
        match r.next_record().unwrap() {
            NextRecord::Record(ChangeRecord::Modify { modifications, .. }) => {
                assert_eq!(modifications.len(), 2);
                assert_eq!(modifications[0].op, ModOp::Add);
                assert_eq!(modifications[1].op, ModOp::Replace);
            }
            other => panic!("expected Modify, got {:?}", summarize(&other)),
        }
    }

    #[test]
    fn parses_modrdn_record() {
        let text = "dn: uid=a,dc=x\nchangetype: modrdn\nnewrdn: uid=b\ndeleteoldrdn: 1\n";
        let mut r = reader(text);
        match r.next_record().unwrap() {
            NextRecord::Record(ChangeRecord::ModifyDn {
                new_rdn, delete_old_rdn, ..
            }) => {
                assert_eq!(new_rdn, "uid=b");
                assert!(delete_old_rdn);
            }
            other => panic!("expected ModifyDn, got {:?}", summarize(&other)),
        }
    }

    #[test]
    fn folded_continuation_lines_are_unwrapped() {
        let text = "dn: uid=a,dc=x\nchangetype: add\ndescription: long line that\n continues here\n";
        let mut r = reader(text);
        match r.next_record().unwrap() {
            NextRecord::Record(ChangeRecord::Add { attributes, .. }) => {
                assert_eq!(attributes[0].1[0], "long line that continues here");
            }
            other => panic!("unexpected {:?}", summarize(&other)),
        }
    }

    #[test]
    fn missing_changetype_without_default_add_is_a_recoverable_parse_error() {
        let mut r = reader("dn: uid=a,dc=x\nobjectClass: top\n");
        match r.next_record().unwrap() {
            NextRecord::ParseError { may_continue, .. } => assert!(may_continue),
            other => panic!("expected ParseError, got {:?}", summarize(&other)),
        }
    }

    #[test]
    fn default_add_treats_bare_entries_as_adds() {
        let mut r = LdifReader::new(
            Cursor::new("dn: uid=a,dc=x\nobjectClass: top\n".as_bytes()),
            TrailingSpacePolicy::Strip,
            true,
        );
        assert!(matches!(
            r.next_record().unwrap(),
            NextRecord::Record(ChangeRecord::Add { .. })
        ));
    }

    #[test]
    fn base64_values_are_decoded() {
        let mut r = reader("dn: uid=a,dc=x\nchangetype: add\ncn:: QWxpY2U=\n");
        match r.next_record().unwrap() {
            NextRecord::Record(ChangeRecord::Add { attributes, .. }) => {
                assert_eq!(attributes[0].1[0], "Alice");
            }
            other => panic!("unexpected {:?}", summarize(&other)),
        }
    }

    fn summarize(n: &NextRecord) -> &'static str {
        match n {
            NextRecord::Record(_) => "Record",
            NextRecord::ParseError { .. } => "ParseError",
            NextRecord::EndOfStream => "EndOfStream",
        }
    }
}
