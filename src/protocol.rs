//! Text wire format spoken with the worker farm.
//!
//! - handshake: `w1,w2,w3,` (comma separated, trailing comma optional)
//! - request: `<job id>,<size>\n`, a non-positive size means unknown
//! - completion: `F<job id>\n`
//! - assignment: `<server>,<job id>,<size>\n`

use crate::error::{DispatchError, Result};
use crate::scheduler::{Assignment, Event, JobRequest, JobSize};

/// Asks the farm to print every server's status.
pub const STATUS_REQUEST: &str = "printAll\n";

const COMPLETION_TAG: char = 'F';

/// Parse the worker list sent once at connection start.
pub fn parse_handshake(bytes: &[u8]) -> Result<Vec<String>> {
    let text = String::from_utf8_lossy(bytes);
    let names: Vec<String> = text
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect();

    if names.is_empty() {
        return Err(DispatchError::Handshake(format!(
            "no worker names in {:?}",
            text
        )));
    }
    Ok(names)
}

/// Parse one record (without its trailing newline).
pub fn parse_record(line: &str) -> Result<Event> {
    let line = line.trim_end_matches('\r');
    let malformed = |reason: &str| DispatchError::MalformedRecord {
        record: line.to_string(),
        reason: reason.to_string(),
    };

    if let Some((id, rest)) = line.split_once(',') {
        let id = id.trim();
        if id.is_empty() {
            return Err(malformed("empty job id"));
        }
        let size_token = rest.split(',').next().unwrap_or_default().trim();
        let declared: i64 = size_token
            .parse()
            .map_err(|_| malformed("size is not an integer"))?;
        return Ok(Event::Request(JobRequest::with_raw(
            id,
            JobSize::from_declared(declared),
            line,
        )));
    }

    match line.strip_prefix(COMPLETION_TAG) {
        Some(id) if !id.trim().is_empty() => Ok(Event::Completed(id.trim().to_string())),
        Some(_) => Err(malformed("completion without job id")),
        None => Err(malformed("neither a request nor a completion")),
    }
}

/// Parse a batch of lines, dropping malformed records with a warning.
pub fn parse_batch<I, S>(lines: I) -> Vec<Event>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| match parse_record(line.as_ref()) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed record");
                None
            }
        })
        .collect()
}

/// Concatenate assignments into a single outbound payload.
pub fn encode_assignments(assignments: &[Assignment]) -> String {
    assignments.iter().map(Assignment::to_line).collect()
}

/// Reassembles newline-terminated records from arbitrary read chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every record it completed. Blank lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);

        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        complete
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_with_trailing_comma() {
        assert_eq!(
            parse_handshake(b"localhost:2222,localhost:2223,").unwrap(),
            vec!["localhost:2222", "localhost:2223"]
        );
        assert_eq!(parse_handshake(b"w1,w2\n").unwrap(), vec!["w1", "w2"]);
    }

    #[test]
    fn empty_handshake_fails() {
        assert!(matches!(
            parse_handshake(b",\n"),
            Err(DispatchError::Handshake(_))
        ));
    }

    #[test]
    fn parses_requests() {
        match parse_record("file-1,120").unwrap() {
            Event::Request(req) => {
                assert_eq!(req.id, "file-1");
                assert_eq!(req.size, JobSize::Known(120));
                assert_eq!(req.raw, "file-1,120");
            }
            other => panic!("expected request, got {:?}", other),
        }

        match parse_record("file-2,-1\r").unwrap() {
            Event::Request(req) => {
                assert_eq!(req.size, JobSize::Unknown);
                assert_eq!(req.raw, "file-2,-1");
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn request_ids_may_start_with_tag() {
        match parse_record("Foo,10").unwrap() {
            Event::Request(req) => assert_eq!(req.id, "Foo"),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn parses_completions() {
        assert_eq!(
            parse_record("Ffile-1").unwrap(),
            Event::Completed("file-1".to_string())
        );
    }

    #[test]
    fn rejects_malformed_records() {
        assert!(parse_record("file-1,big").is_err());
        assert!(parse_record(",10").is_err());
        assert!(parse_record("F").is_err());
        assert!(parse_record("garbage").is_err());
    }

    #[test]
    fn batch_skips_bad_lines() {
        let events = parse_batch(["a,10", "nonsense", "Fb"]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], Event::Completed("b".to_string()));
    }

    #[test]
    fn line_buffer_reassembles_split_records() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"a,1").is_empty());
        assert_eq!(buf.push(b"0\nFb\nc,"), vec!["a,10", "Fb"]);
        assert_eq!(buf.push(b"-1\n\n"), vec!["c,-1"]);
        assert!(buf.push(b"\n").is_empty());
    }

    #[test]
    fn encodes_assignments_in_order() {
        let assignments = vec![
            Assignment {
                server_id: "w1".to_string(),
                request: JobRequest::with_raw("a", JobSize::Known(10), "a,10"),
            },
            Assignment {
                server_id: "w2".to_string(),
                request: JobRequest::with_raw("b", JobSize::Unknown, "b,-1"),
            },
        ];
        assert_eq!(encode_assignments(&assignments), "w1,a,10\nw2,b,-1\n");
        assert_eq!(encode_assignments(&[]), "");
    }
}
