//! Batch header parsing and validation.
//!
//! The header is a JSON array of `{ "name", "size", "type" }` objects. The
//! parser accepts what existing senders produce:
//! - Field names are matched ASCII case-insensitively (`Name`, `SIZE`, ...)
//! - Trailing commas before `]` or `}` are accepted
//! - Unknown fields are ignored
//!
//! Validation is all-or-nothing: the first bad entry rejects the batch
//! before any file bytes are read.

use serde_json::{Map, Value};

use crate::error::TransferError;

/// Maximum accepted size of a single file (100 MiB).
pub const MAX_FILE_SIZE: usize = 100 * 1024 * 1024;

/// Declared type that is stored as UTF-8 text.
const TEXT_TYPE: &str = "text/plain";

/// A header entry as sent on the wire, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub name: Option<String>,
    pub size: i64,
    pub content_type: Option<String>,
}

/// A validated entry: sanitized name and bounded size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    pub size: usize,
    pub content_type: Option<String>,
}

impl FileMetadata {
    /// True when the declared media type is `text/plain` (parameters ignored).
    pub fn is_text(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|t| t.split(';').next())
            .map(|media| media.trim().eq_ignore_ascii_case(TEXT_TYPE))
            .unwrap_or(false)
    }
}

/// Parse header text into raw entries.
///
/// An empty array or a JSON `null` is rejected as "no files specified".
pub fn parse(text: &str) -> Result<Vec<RawEntry>, TransferError> {
    let cleaned = strip_trailing_commas(text);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| TransferError::InvalidHeaderFormat(e.to_string()))?;

    let items = match value {
        Value::Null => return Err(no_files()),
        Value::Array(items) => items,
        other => {
            return Err(TransferError::InvalidHeaderFormat(format!(
                "expected an array of files, got {}",
                json_type(&other)
            )))
        }
    };

    if items.is_empty() {
        return Err(no_files());
    }

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Object(fields) => RawEntry::from_fields(fields),
            other => Err(TransferError::InvalidHeaderFormat(format!(
                "entry {idx} is {}, expected an object",
                json_type(&other)
            ))),
        })
        .collect()
}

/// Validate every entry, returning the sanitized metadata in header order.
pub fn validate(entries: Vec<RawEntry>) -> Result<Vec<FileMetadata>, TransferError> {
    entries
        .into_iter()
        .map(|entry| {
            let name = sanitize_file_name(entry.name.as_deref().unwrap_or(""))?;
            let size = match usize::try_from(entry.size) {
                Ok(size) if size > 0 && size <= MAX_FILE_SIZE => size,
                _ => {
                    return Err(TransferError::InvalidFileSize {
                        name,
                        size: entry.size,
                    })
                }
            };
            Ok(FileMetadata {
                name,
                size,
                content_type: entry.content_type,
            })
        })
        .collect()
}

/// Reduce a wire-supplied name to its final path component.
///
/// Both `/` and `\` count as separators regardless of platform.
pub fn sanitize_file_name(name: &str) -> Result<String, TransferError> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");

    if base.trim().is_empty() || base == "." || base == ".." || base.contains('\0') {
        return Err(TransferError::InvalidFileName(name.to_string()));
    }
    Ok(base.to_string())
}

impl RawEntry {
    fn from_fields(fields: Map<String, Value>) -> Result<Self, TransferError> {
        let mut entry = RawEntry::default();

        for (key, value) in fields {
            if key.eq_ignore_ascii_case("name") {
                entry.name = optional_string(&key, value)?;
            } else if key.eq_ignore_ascii_case("size") {
                entry.size = match value {
                    Value::Null => 0,
                    Value::Number(n) => n.as_i64().ok_or_else(|| {
                        TransferError::InvalidHeaderFormat(format!(
                            "size {n} is not a 64-bit integer"
                        ))
                    })?,
                    other => {
                        return Err(TransferError::InvalidHeaderFormat(format!(
                            "size must be an integer, got {}",
                            json_type(&other)
                        )))
                    }
                };
            } else if key.eq_ignore_ascii_case("type") {
                entry.content_type = optional_string(&key, value)?;
            }
        }

        Ok(entry)
    }
}

fn optional_string(key: &str, value: Value) -> Result<Option<String>, TransferError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(TransferError::InvalidHeaderFormat(format!(
            "{key} must be a string, got {}",
            json_type(&other)
        ))),
    }
}

fn no_files() -> TransferError {
    TransferError::InvalidHeaderFormat("no files specified".to_string())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Drop commas that directly precede `]` or `}` outside string literals.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = text[idx + 1..].trim_start().chars().next();
                if !matches!(next, Some(']') | Some('}')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parse_and_validate(text: &str) -> Result<Vec<FileMetadata>, TransferError> {
        validate(parse(text)?)
    }

    #[test]
    fn test_parse_single_entry() {
        let files = parse_and_validate(r#"[{"name":"a.txt","size":5,"type":"text/plain"}]"#)
            .unwrap();
        assert_eq!(
            files,
            vec![FileMetadata {
                name: "a.txt".to_string(),
                size: 5,
                content_type: Some("text/plain".to_string()),
            }]
        );
        assert!(files[0].is_text());
    }

    #[test]
    fn test_parse_case_insensitive_fields() {
        let files = parse_and_validate(
            r#"[{"Name":"car.jpg","Size":1024,"Type":"image/jpeg"},
                {"NAME":"plate.txt","SIZE":9,"tYpE":"text/plain"}]"#,
        )
        .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "car.jpg");
        assert_eq!(files[0].size, 1024);
        assert!(!files[0].is_text());
        assert_eq!(files[1].name, "plate.txt");
        assert!(files[1].is_text());
    }

    #[test]
    fn test_parse_trailing_commas() {
        let files = parse_and_validate(
            "[ {\"name\": \"a,].bin\", \"size\": 3, \"type\": \"x\", }, \n ]",
        )
        .unwrap();
        assert_eq!(files[0].name, "a,].bin");
        assert_eq!(files[0].size, 3);
    }

    #[test]
    fn test_strip_keeps_commas_inside_strings() {
        assert_eq!(strip_trailing_commas(r#"["a,]", "b\",}",]"#), r#"["a,]", "b\",}"]"#);
        assert_eq!(strip_trailing_commas("[1,2,3]"), "[1,2,3]");
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let files =
            parse_and_validate(r#"[{"name":"a","size":1,"type":"b","checksum":"ff"}]"#).unwrap();
        assert_eq!(files[0].name, "a");
    }

    #[test]
    fn test_empty_and_null_rejected() {
        for text in ["[]", "null", " [ ] "] {
            match parse(text) {
                Err(TransferError::InvalidHeaderFormat(msg)) => {
                    assert_eq!(msg, "no files specified")
                }
                other => panic!("unexpected for {text}: {:?}", other),
            }
        }
    }

    #[test]
    fn test_malformed_rejected() {
        for text in [
            "",
            "not json",
            "{\"name\":\"a\"}",
            "[1]",
            "[null]",
            r#"[{"name":"a","size":"5"}]"#,
            r#"[{"name":"a","size":1.5}]"#,
            r#"[{"name":7,"size":5}]"#,
            r#"[{"name":"a","size":5,"type":[]}]"#,
        ] {
            let err = parse(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidHeaderFormat, "input {text:?}");
        }
    }

    #[test]
    fn test_size_bounds() {
        let max = MAX_FILE_SIZE as i64;
        for size in [0, -1, max + 1, i64::MAX] {
            let entry = RawEntry {
                name: Some("x.bin".to_string()),
                size,
                content_type: None,
            };
            match validate(vec![entry]) {
                Err(TransferError::InvalidFileSize { name, size: got }) => {
                    assert_eq!(name, "x.bin");
                    assert_eq!(got, size);
                }
                other => panic!("unexpected for {size}: {:?}", other),
            }
        }

        let entry = RawEntry {
            name: Some("x.bin".to_string()),
            size: max,
            content_type: None,
        };
        assert_eq!(validate(vec![entry]).unwrap()[0].size, MAX_FILE_SIZE);
    }

    #[test]
    fn test_missing_size_is_invalid_size() {
        let err = parse_and_validate(r#"[{"name":"a.bin"}]"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFileSize);
    }

    #[test]
    fn test_missing_name_is_invalid_name() {
        let err = parse_and_validate(r#"[{"size":4,"type":"image/png"}]"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFileName);
    }

    #[test]
    fn test_validation_stops_at_first_bad_entry() {
        let err = parse_and_validate(
            r#"[{"name":"ok.bin","size":1},{"name":"big.bin","size":0},{"name":"","size":1}]"#,
        )
        .unwrap_err();
        match err {
            TransferError::InvalidFileSize { name, .. } => assert_eq!(name, "big.bin"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("/abs/path/img.jpg").unwrap(), "img.jpg");
        assert_eq!(sanitize_file_name(r"C:\captures\car.jpg").unwrap(), "car.jpg");
        assert_eq!(sanitize_file_name("plain.txt").unwrap(), "plain.txt");
        assert_eq!(sanitize_file_name("with space.txt").unwrap(), "with space.txt");

        for bad in ["", "   ", "dir/", "a/..", ".", "..", "a\\", "nul\0.txt"] {
            let err = sanitize_file_name(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFileName, "input {bad:?}");
        }
    }

    #[test]
    fn test_is_text() {
        let mut meta = FileMetadata {
            name: "a".to_string(),
            size: 1,
            content_type: Some("TEXT/PLAIN; charset=utf-8".to_string()),
        };
        assert!(meta.is_text());

        meta.content_type = Some("text/html".to_string());
        assert!(!meta.is_text());

        meta.content_type = None;
        assert!(!meta.is_text());
    }
}
