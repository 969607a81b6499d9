//! Bounded assembly of inbound bytes into lines.
//!
//! A line ends at a newline or NUL byte. Lines longer than the configured
//! capacity are reported once and then skipped up to their terminator, so a
//! partially received oversize line never reaches consumers.

use thiserror::Error;

/// An inbound line exceeded the assembler's capacity and was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("line exceeds {capacity} bytes")]
pub(crate) struct LineOverflow {
    pub(crate) capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Filling,
    Complete,
    Discarding,
}

#[derive(Debug)]
pub(crate) struct LineAssembler {
    buffer: Vec<u8>,
    capacity: usize,
    phase: Phase,
}

impl LineAssembler {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            phase: Phase::Filling,
        }
    }

    /// Appends a byte, returning the completed line when `byte` terminates it.
    ///
    /// The returned slice excludes the terminator and is valid until the next
    /// call to `push`.
    pub(crate) fn push(&mut self, byte: u8) -> Result<Option<&[u8]>, LineOverflow> {
        if self.phase == Phase::Complete {
            self.buffer.clear();
            self.phase = Phase::Filling;
        }

        if is_terminator(byte) {
            return Ok(match self.phase {
                Phase::Discarding => {
                    self.phase = Phase::Filling;
                    None
                }
                Phase::Filling | Phase::Complete => {
                    self.phase = Phase::Complete;
                    Some(self.buffer.as_slice())
                }
            });
        }

        match self.phase {
            Phase::Discarding => Ok(None),
            Phase::Filling | Phase::Complete if self.buffer.len() >= self.capacity => {
                self.phase = Phase::Discarding;
                self.buffer.clear();
                Err(LineOverflow {
                    capacity: self.capacity,
                })
            }
            Phase::Filling | Phase::Complete => {
                self.buffer.push(byte);
                Ok(None)
            }
        }
    }

    /// Drops any partial line, e.g. after the stream is lost mid-line.
    pub(crate) fn reset(&mut self) {
        self.buffer.clear();
        self.phase = Phase::Filling;
    }
}

const fn is_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut LineAssembler, bytes: &[u8]) -> Vec<Result<Vec<u8>, LineOverflow>> {
        let mut events = Vec::new();
        for &byte in bytes {
            match assembler.push(byte) {
                Ok(Some(line)) => events.push(Ok(line.to_vec())),
                Ok(None) => {}
                Err(overflow) => events.push(Err(overflow)),
            }
        }
        events
    }

    #[test]
    fn splits_on_newline_and_nul() {
        let mut assembler = LineAssembler::new(16);
        let events = feed(&mut assembler, b"one\ntwo\0three\n");
        assert_eq!(
            events,
            vec![Ok(b"one".to_vec()), Ok(b"two".to_vec()), Ok(b"three".to_vec())]
        );
    }

    #[test]
    fn empty_lines_are_delivered() {
        let mut assembler = LineAssembler::new(4);
        let events = feed(&mut assembler, b"\n");
        assert_eq!(events, vec![Ok(Vec::new())]);
    }

    #[test]
    fn oversize_line_is_reported_once_and_skipped() {
        let mut assembler = LineAssembler::new(4);
        let events = feed(&mut assembler, b"abcdefgh\nok\n");
        assert_eq!(
            events,
            vec![Err(LineOverflow { capacity: 4 }), Ok(b"ok".to_vec())]
        );
    }

    #[test]
    fn line_of_exact_capacity_fits() {
        let mut assembler = LineAssembler::new(4);
        let events = feed(&mut assembler, b"abcd\n");
        assert_eq!(events, vec![Ok(b"abcd".to_vec())]);
    }

    #[test]
    fn reset_discards_partial_line() {
        let mut assembler = LineAssembler::new(8);
        assert!(feed(&mut assembler, b"part").is_empty());
        assembler.reset();
        let events = feed(&mut assembler, b"next\n");
        assert_eq!(events, vec![Ok(b"next".to_vec())]);
    }
}
