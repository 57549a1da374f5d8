/* 📖 # Why implement the SSE reader over BufRead?

The feed is consumed synchronously: the transport hands out the response body as
a blocking reader and frames are produced one at a time as lines arrive. Parsing
line by line over BufRead means a frame is delivered as soon as its terminating
blank line is read, without buffering the (endless) stream.

Only the parts of the event-stream format that the backend uses or that proxies
may inject are interpreted: `event`, `data`, `id`, `retry` and `:` comments.

A line that is not UTF-8 or longer than MAX_LINE_BYTES spoils the frame it
belongs to. That frame is counted and skipped and reading goes on; only I/O
errors end the iteration.
*/

use std::io::{BufRead, Read};
use std::time::Duration;

use tracing::warn;

use injector_base::{InjectorError, InjectorResult};

/// Longest line accepted, without its terminator.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// One dispatched event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

/// How the stream body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// `text/event-stream`: fields terminated by a blank line
    EventStream,
    /// One JSON document per line
    JsonLines,
}

impl FrameMode {
    /// Pick the mode from a response media type. Unknown types are treated as event streams.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some("application/x-ndjson") | Some("application/jsonl") => Self::JsonLines,
            _ => Self::EventStream,
        }
    }
}

enum Line<'a> {
    Text(&'a str),
    Malformed(&'static str),
}

/// Iterator of frames read from a byte stream.
pub struct SseReader<R> {
    reader: R,
    mode: FrameMode,
    line: Vec<u8>,
    dropped: usize,
    retry: Option<u64>,
    finished: bool,
}

impl<R: BufRead> SseReader<R> {
    pub fn new(reader: R, mode: FrameMode) -> Self {
        Self {
            reader,
            mode,
            line: Vec::new(),
            dropped: 0,
            retry: None,
            finished: false,
        }
    }

    /// Number of frames skipped because of unreadable lines.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// The last reconnection time the server asked for with `retry:`.
    pub fn retry(&self) -> Option<Duration> {
        self.retry.map(Duration::from_millis)
    }

    /// Read one line without its terminator. `None` at end of stream.
    fn read_line(&mut self) -> InjectorResult<Option<Line<'_>>> {
        self.line.clear();
        let read = (&mut self.reader)
            .take(MAX_LINE_BYTES as u64 + 1)
            .read_until(b'\n', &mut self.line)
            .map_err(read_error)?;
        if read == 0 {
            return Ok(None);
        }
        let terminated = self.line.last() == Some(&b'\n');
        if !terminated && self.line.len() > MAX_LINE_BYTES {
            self.skip_rest_of_line()?;
            return Ok(Some(Line::Malformed("line too long")));
        }
        let bytes = self.line.as_slice();
        let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(Some(Line::Text(text))),
            Err(_) => Ok(Some(Line::Malformed("invalid UTF-8"))),
        }
    }

    fn skip_rest_of_line(&mut self) -> InjectorResult<()> {
        loop {
            let (consumed, done) = {
                let buf = self.reader.fill_buf().map_err(read_error)?;
                match buf.iter().position(|b| *b == b'\n') {
                    Some(index) => (index + 1, true),
                    None => (buf.len(), buf.is_empty()),
                }
            };
            self.reader.consume(consumed);
            if done {
                return Ok(());
            }
        }
    }

    fn drop_frame(&mut self, reason: &'static str) {
        self.dropped += 1;
        warn!(reason, dropped = self.dropped, "dropping unreadable event stream frame");
    }

    fn next_json_line(&mut self) -> InjectorResult<Option<SseFrame>> {
        loop {
            let line = match self.read_line()? {
                None => return Ok(None),
                Some(Line::Malformed(reason)) => {
                    self.drop_frame(reason);
                    continue;
                }
                Some(Line::Text(line)) => line.trim(),
            };
            if !line.is_empty() {
                return Ok(Some(SseFrame {
                    data: line.to_string(),
                    ..SseFrame::default()
                }));
            }
        }
    }

    fn next_event(&mut self) -> InjectorResult<Option<SseFrame>> {
        let mut frame = SseFrame::default();
        let mut data_lines: Vec<String> = Vec::new();
        let mut spoiled: Option<&'static str> = None;
        loop {
            let line = match self.read_line()? {
                None => {
                    if let Some(reason) = spoiled {
                        self.drop_frame(reason);
                        return Ok(None);
                    }
                    // An unterminated frame at end of stream is still delivered.
                    return Ok(finish(frame, data_lines));
                }
                Some(Line::Malformed(reason)) => {
                    spoiled = Some(reason);
                    continue;
                }
                Some(Line::Text(line)) => line,
            };
            if line.is_empty() {
                if let Some(reason) = spoiled.take() {
                    self.drop_frame(reason);
                    frame = SseFrame::default();
                    data_lines.clear();
                    continue;
                }
                match finish(std::mem::take(&mut frame), std::mem::take(&mut data_lines)) {
                    Some(frame) => return Ok(Some(frame)),
                    None => continue,
                }
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => frame.event = Some(value.to_string()),
                "data" => data_lines.push(value.to_string()),
                "id" => frame.id = Some(value.to_string()),
                "retry" => {
                    frame.retry = value.parse().ok();
                    if frame.retry.is_some() {
                        self.retry = frame.retry;
                    }
                }
                _ => {}
            }
        }
    }
}

fn read_error(e: std::io::Error) -> Box<InjectorError> {
    Box::new(InjectorError::message(format!("Failed to read event stream: {}", e)))
}

/// Frames without data lines are not dispatched.
fn finish(mut frame: SseFrame, data_lines: Vec<String>) -> Option<SseFrame> {
    if data_lines.is_empty() {
        return None;
    }
    frame.data = data_lines.join("\n");
    Some(frame)
}

impl<R: BufRead> Iterator for SseReader<R> {
    type Item = InjectorResult<SseFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = match self.mode {
            FrameMode::EventStream => self.next_event(),
            FrameMode::JsonLines => self.next_json_line(),
        };
        match result {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use std::io::{BufReader, Cursor, Read};

    fn frames(text: &str) -> Vec<SseFrame> {
        SseReader::new(Cursor::new(text.to_string()), FrameMode::EventStream)
            .collect::<InjectorResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_backend_stream() {
        let text = "event: connected\ndata: {\"status\":\"connected\",\"channel\":\"project_list\"}\n\n\
                    event: ping\ndata: {}\n\n\
                    event: create\ndata: {\"type\":\"create\"}\n\n";
        let parsed = frames(text);
        expect![[r#"
            [
                SseFrame {
                    event: Some(
                        "connected",
                    ),
                    data: "{\"status\":\"connected\",\"channel\":\"project_list\"}",
                    id: None,
                    retry: None,
                },
                SseFrame {
                    event: Some(
                        "ping",
                    ),
                    data: "{}",
                    id: None,
                    retry: None,
                },
                SseFrame {
                    event: Some(
                        "create",
                    ),
                    data: "{\"type\":\"create\"}",
                    id: None,
                    retry: None,
                },
            ]
        "#]]
        .assert_debug_eq(&parsed);
    }

    #[test]
    fn test_multiline_data_comments_and_crlf() {
        let parsed = frames(": keep-alive comment\r\nid: 7\r\nretry: 1500\r\ndata: line one\r\ndata:line two\r\n\r\n");
        assert_eq!(
            parsed,
            vec![SseFrame {
                event: None,
                data: "line one\nline two".to_string(),
                id: Some("7".to_string()),
                retry: Some(1500),
            }]
        );
    }

    #[test]
    fn test_frames_without_data_are_skipped() {
        let parsed = frames("event: ping\n\n\n\nevent: update\ndata: x\n\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].event.as_deref(), Some("update"));
    }

    #[test]
    fn test_unterminated_final_frame_is_delivered() {
        let parsed = frames("event: delete\ndata: {}");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].data, "{}");
    }

    #[test]
    fn test_json_lines_mode() {
        let reader = SseReader::new(
            Cursor::new("{\"a\":1}\n\n  {\"b\":2}  \n"),
            FrameMode::JsonLines,
        );
        let parsed: Vec<String> = reader.map(|frame| frame.unwrap().data).collect();
        assert_eq!(parsed, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_frame_mode_from_content_type() {
        assert_eq!(
            FrameMode::from_content_type(Some("application/x-ndjson")),
            FrameMode::JsonLines
        );
        assert_eq!(
            FrameMode::from_content_type(Some("text/event-stream")),
            FrameMode::EventStream
        );
        assert_eq!(FrameMode::from_content_type(None), FrameMode::EventStream);
    }

    #[test]
    fn test_invalid_utf8_spoils_only_its_frame() {
        let mut bytes = b"event: create\ndata: \xff\xfe\n\n".to_vec();
        bytes.extend_from_slice(b"event: update\ndata: ok\n\n");
        let mut reader = SseReader::new(Cursor::new(bytes), FrameMode::EventStream);
        let frame = reader.next().unwrap().unwrap();
        assert_eq!(frame.event.as_deref(), Some("update"));
        assert_eq!(frame.data, "ok");
        assert!(reader.next().is_none());
        assert_eq!(reader.dropped(), 1);
    }

    #[test]
    fn test_overlong_line_is_skipped() {
        let text = format!(
            "data: {}\n\ndata: after\n\n",
            "x".repeat(MAX_LINE_BYTES + 10)
        );
        let mut reader = SseReader::new(Cursor::new(text), FrameMode::EventStream);
        let data: Vec<String> = reader.by_ref().map(|frame| frame.unwrap().data).collect();
        assert_eq!(data, vec!["after"]);
        assert_eq!(reader.dropped(), 1);
    }

    #[test]
    fn test_line_at_limit_is_accepted() {
        let value = "y".repeat(MAX_LINE_BYTES - "data: ".len());
        let parsed = frames(&format!("data: {}\n\n", value));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].data, value);
    }

    #[test]
    fn test_bad_json_line_is_skipped() {
        let mut bytes = b"{\"a\":\xc3}\n".to_vec();
        bytes.extend_from_slice(b"{\"b\":2}\n");
        let mut reader = SseReader::new(Cursor::new(bytes), FrameMode::JsonLines);
        let data: Vec<String> = reader.by_ref().map(|frame| frame.unwrap().data).collect();
        assert_eq!(data, vec!["{\"b\":2}"]);
        assert_eq!(reader.dropped(), 1);
    }

    #[test]
    fn test_retry_hint_outlives_its_frame() {
        let mut reader = SseReader::new(
            Cursor::new("retry: 2500\n\ndata: x\n\nretry: soon\ndata: y\n\n"),
            FrameMode::EventStream,
        );
        assert_eq!(reader.retry(), None);
        assert_eq!(reader.next().unwrap().unwrap().data, "x");
        assert_eq!(reader.retry(), Some(std::time::Duration::from_millis(2500)));
        let frame = reader.next().unwrap().unwrap();
        assert_eq!(frame.retry, None);
        assert_eq!(reader.retry(), Some(std::time::Duration::from_millis(2500)));
    }

    #[test]
    fn test_read_error_ends_iteration() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            }
        }
        let mut reader = SseReader::new(BufReader::new(Broken), FrameMode::EventStream);
        let first = reader.next().unwrap();
        assert!(first.unwrap_err().to_string().contains("reset"));
        assert!(reader.next().is_none());
    }
}
