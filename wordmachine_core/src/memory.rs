pub mod memory {
    use crate::error::error::MachineError;
    use crate::isa::isa::{WORD_BYTES, Word};

    pub const MEMORY_LIMIT: usize = 0x100000;

    /// Byte-addressable memory backing a single machine.
    ///
    /// The arena starts as the loaded program image and grows with zeros
    /// whenever an access touches bytes past its current end, so a dump
    /// shows exactly the range the program has used. Growth stops at
    /// MEMORY_LIMIT; accesses beyond it are errors rather than silent
    /// wraparound.
    ///
    /// Words are stored big-endian and need not be aligned.
    #[derive(Debug, Clone, Default)]
    pub struct Memory {
        bytes: Vec<u8>,
    }

    impl Memory {
        pub fn new() -> Memory {
            Memory { bytes: Vec::new() }
        }

        pub fn with_image(image: &[u8]) -> Result<Memory, MachineError> {
            if image.len() > MEMORY_LIMIT {
                return Err(MachineError::ProgramTooLarge { len: image.len() });
            }
            Ok(Memory { bytes: image.to_vec() })
        }

        pub fn len(&self) -> usize {
            self.bytes.len()
        }

        pub fn is_empty(&self) -> bool {
            self.bytes.is_empty()
        }

        pub fn as_bytes(&self) -> &[u8] {
            &self.bytes
        }

        // grow so that [addr, addr + len) is backed, bounds-checked against the limit.
        fn touch(&mut self, addr: Word, len: usize) -> Result<usize, MachineError> {
            let start = addr as usize;
            let end = start
                .checked_add(len)
                .ok_or(MachineError::AddressOutOfRange { addr, limit: MEMORY_LIMIT })?;
            if end > MEMORY_LIMIT {
                return Err(MachineError::AddressOutOfRange { addr, limit: MEMORY_LIMIT });
            }
            if end > self.bytes.len() {
                self.bytes.resize(end, 0);
            }
            Ok(start)
        }

        pub fn read(&mut self, addr: Word, len: usize) -> Result<Vec<u8>, MachineError> {
            let start = self.touch(addr, len)?;
            Ok(self.bytes[start..start + len].to_vec())
        }

        pub fn write(&mut self, addr: Word, data: &[u8]) -> Result<(), MachineError> {
            let start = self.touch(addr, data.len())?;
            self.bytes[start..start + data.len()].copy_from_slice(data);
            Ok(())
        }

        pub fn get_word(&mut self, addr: Word) -> Result<Word, MachineError> {
            let start = self.touch(addr, WORD_BYTES as usize)?;
            let mut buf = [0u8; WORD_BYTES as usize];
            buf.copy_from_slice(&self.bytes[start..start + WORD_BYTES as usize]);
            Ok(Word::from_be_bytes(buf))
        }

        pub fn set_word(&mut self, addr: Word, value: Word) -> Result<(), MachineError> {
            self.write(addr, &value.to_be_bytes())
        }

        /// Word-sized view for dumps; a trailing partial word is zero padded.
        pub fn words(&self) -> Vec<(Word, Word)> {
            self.bytes
                .chunks(WORD_BYTES as usize)
                .enumerate()
                .map(|(idx, chunk)| {
                    let mut buf = [0u8; WORD_BYTES as usize];
                    buf[..chunk.len()].copy_from_slice(chunk);
                    ((idx as Word) * WORD_BYTES, Word::from_be_bytes(buf))
                })
                .collect()
        }
    }
}
