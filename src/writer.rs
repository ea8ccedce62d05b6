use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Buffered destination for the CLI: a file, or stdout when no path is given.
pub struct OutputWriter {
    inner: BufWriter<Box<dyn Write + Send>>,
    written: u64,
}

impl OutputWriter {
    pub fn create(path: Option<&Path>) -> io::Result<Self> {
        let raw: Box<dyn Write + Send> = match path {
            Some(path) => Box::new(File::create(path)?),
            None => Box::new(io::stdout()),
        };
        Ok(Self::new(raw))
    }

    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        OutputWriter {
            inner: BufWriter::with_capacity(1 << 20, writer),
            written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flushes buffered output and returns the total byte count.
    pub fn finish(mut self) -> io::Result<u64> {
        self.inner.flush()?;
        Ok(self.written)
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
