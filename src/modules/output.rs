use serde::Serialize;
use std::io::{self, Write};

/// Streams records into a JSON array as they are visited. The opening
/// bracket is deferred until the first record so an empty walk prints `[]`.
pub struct RecordWriter<W: Write> {
    out: W,
    pretty: bool,
    count: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W, pretty: bool) -> Self {
        RecordWriter {
            out,
            pretty,
            count: 0,
        }
    }

    pub fn push<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        let separator = match (self.count, self.pretty) {
            (0, false) => "[",
            (0, true) => "[\n",
            (_, false) => ",",
            (_, true) => ",\n",
        };
        self.out.write_all(separator.as_bytes())?;

        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, record)?;
        } else {
            serde_json::to_writer(&mut self.out, record)?;
        }

        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Closes the array and hands back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        let closing = match (self.count, self.pretty) {
            (0, _) => "[]\n",
            (_, false) => "]\n",
            (_, true) => "\n]\n",
        };
        self.out.write_all(closing.as_bytes())?;
        self.out.flush()?;
        Ok(self.out)
    }
}
