// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Assembles a file name written one byte at a time into the FILENAME
/// register. A zero byte terminates the name; the next byte starts over.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct FilenameLatch {
    #[serde(skip)]
    bytes: Vec<u8>,
    latched: bool,
    valid: bool,
}

impl FilenameLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. Returns the completed name when `byte` is the terminator.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        if self.latched {
            self.reset();
        }
        if byte != 0 {
            self.bytes.push(byte);
            return None;
        }
        self.latched = true;
        let name = String::from_utf8_lossy(&self.bytes).into_owned();
        tracing::debug!("File name latched: {:?}", name);
        Some(name)
    }

    /// Record the backend's verdict on the latched name.
    pub fn resolve(&mut self, valid: bool) {
        self.valid = self.latched && valid;
    }

    pub fn reset(&mut self) {
        self.bytes.clear();
        self.latched = false;
        self.valid = false;
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_completes_name() {
        let mut latch = FilenameLatch::new();
        assert_eq!(latch.push(b'a'), None);
        assert_eq!(latch.push(b'b'), None);
        assert!(!latch.is_latched());
        assert_eq!(latch.push(0).as_deref(), Some("ab"));
        assert!(latch.is_latched());
        assert_eq!(latch.len(), 2);
    }

    #[test]
    fn test_byte_after_latch_starts_new_name() {
        let mut latch = FilenameLatch::new();
        latch.push(b'a');
        latch.push(0);
        latch.resolve(true);
        assert!(latch.is_valid());

        assert_eq!(latch.push(b'x'), None);
        assert!(!latch.is_latched());
        assert!(!latch.is_valid());
        assert_eq!(latch.push(0).as_deref(), Some("x"));
    }

    #[test]
    fn test_empty_name_and_unlatched_resolve() {
        let mut latch = FilenameLatch::new();
        latch.resolve(true);
        assert!(!latch.is_valid());
        assert_eq!(latch.push(0).as_deref(), Some(""));
        assert!(latch.is_empty());
    }
}
