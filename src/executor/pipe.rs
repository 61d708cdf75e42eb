//! Draining child process pipes on reader threads.
//!
//! stdout is captured for the caller (drivers parse it), stderr is streamed
//! to the log as it arrives.

use std::io::{BufRead, BufReader, Read};

/// Extracts a human-readable message from a panic payload.
///
/// The returned `&str` borrows from the payload, so it is valid as long as
/// the `err` reference is valid.
pub(crate) fn panic_message(err: &(dyn std::any::Any + Send)) -> &str {
    err.downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Reads a pipe to the end and returns its contents.
///
/// Every line is also logged at TRACE level. Binary data uses lossy UTF-8
/// conversion. An I/O error stops reading and returns what was read so far;
/// command success is determined by exit status, not by the pipe.
pub(super) fn capture_pipe<R: Read>(pipe: Option<R>) -> String {
    let Some(pipe) = pipe else {
        tracing::error!("stdout pipe was None (unexpected: Stdio::piped() was set)");
        return String::new();
    };

    let mut reader = BufReader::new(pipe);
    let mut captured = Vec::new();
    let mut line_buf = Vec::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = trim_line(&line_buf);
                tracing::trace!(stream = "stdout", "{}", line);
                captured.extend_from_slice(&line_buf);
            }
            Err(e) => {
                tracing::error!(stream = "stdout", error = %e, "I/O error, stopping read");
                break;
            }
        }
    }

    String::from_utf8_lossy(&captured).into_owned()
}

/// Reads a pipe and logs each line at WARN level in real time.
pub(super) fn log_pipe<R: Read>(pipe: Option<R>) {
    let Some(pipe) = pipe else {
        tracing::error!("stderr pipe was None (unexpected: Stdio::piped() was set)");
        return;
    };

    let mut reader = BufReader::new(pipe);
    let mut line_buf = Vec::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break,
            Ok(_) => tracing::warn!(stream = "stderr", "{}", trim_line(&line_buf)),
            Err(e) => {
                tracing::error!(stream = "stderr", error = %e, "I/O error, stopping read");
                break;
            }
        }
    }
}

/// Strips the line terminator, handling CRLF.
fn trim_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_str() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
    }

    #[test]
    fn test_panic_message_string() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("formatted boom"));
        assert_eq!(panic_message(&*payload), "formatted boom");
    }

    #[test]
    fn test_panic_message_unknown() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[test]
    fn test_capture_pipe_keeps_all_lines() {
        let input: &[u8] = b"Running\r\nOff\n";
        assert_eq!(capture_pipe(Some(input)), "Running\r\nOff\n");
    }

    #[test]
    fn test_capture_pipe_none_is_empty() {
        assert_eq!(capture_pipe::<&[u8]>(None), "");
    }

    #[test]
    fn test_trim_line_handles_crlf() {
        assert_eq!(trim_line(b"value\r\n"), "value");
        assert_eq!(trim_line(b"value"), "value");
    }
}
