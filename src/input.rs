use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;
use avstream::io::Chunk;

/// Unified input reader for files and stdin ("-").
pub struct InputReader {
    reader: Box<dyn Read>,
    is_pipe: bool,
}

impl InputReader {
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let is_pipe = input_path.as_ref().to_string_lossy() == "-";

        let reader: Box<dyn Read> = if is_pipe {
            Box::new(io::stdin().lock())
        } else {
            let file = File::open(input_path)?;
            Box::new(BufReader::new(file))
        };

        Ok(Self { reader, is_pipe })
    }

    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Reads the input in chunks of at most `chunk_size` bytes.
    /// The callback returns Ok(false) to stop early.
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(Chunk) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size.max(1)];

        loop {
            let bytes_read = self.reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            if !callback(Chunk::from(&buffer[..bytes_read]))? {
                break;
            }
        }

        Ok(())
    }
}
