use std::io::{self, Read};

const BYTES_PER_SAMPLE: usize = 2;

/// Pulls interleaved little-endian `i16` samples from a byte stream.
#[derive(Debug)]
pub struct PcmReader<R> {
    inner: R,
    bytes: Vec<u8>,
    samples_read: u64,
}

impl<R: Read> PcmReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes: Vec::new(),
            samples_read: 0,
        }
    }

    /// Total number of samples delivered so far.
    pub fn samples_read(&self) -> u64 {
        self.samples_read
    }

    /// Fills `buf` from the stream and returns how many samples were read.
    ///
    /// A count below `buf.len()` means the input is exhausted; a trailing odd
    /// byte is dropped. Interrupted reads are retried, every other error is
    /// returned as is.
    pub fn read(&mut self, buf: &mut [i16]) -> io::Result<usize> {
        let wanted = buf.len() * BYTES_PER_SAMPLE;
        if self.bytes.len() < wanted {
            self.bytes.resize(wanted, 0);
        }

        let mut filled = 0;
        while filled < wanted {
            match self.inner.read(&mut self.bytes[filled..wanted]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        let count = filled / BYTES_PER_SAMPLE;
        for (sample, bytes) in buf
            .iter_mut()
            .zip(self.bytes[..count * BYTES_PER_SAMPLE].chunks_exact(BYTES_PER_SAMPLE))
        {
            *sample = i16::from_le_bytes([bytes[0], bytes[1]]);
        }
        self.samples_read += count as u64;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn encode(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Hands out one byte per call and can fail after a given number of bytes.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        fail_at: Option<usize>,
        interrupted: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            if Some(self.pos) == self.fail_at {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
            }
            if self.pos >= self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn reads_full_buffers() {
        let mut reader = PcmReader::new(Cursor::new(encode(&[1, -2, 300, i16::MIN, i16::MAX])));
        let mut buf = [0i16; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, -2, 300, i16::MIN]);

        let mut rest = [0i16; 4];
        assert_eq!(reader.read(&mut rest).unwrap(), 1);
        assert_eq!(rest[0], i16::MAX);
        assert_eq!(reader.samples_read(), 5);

        assert_eq!(reader.read(&mut rest).unwrap(), 0);
    }

    #[test]
    fn drops_a_trailing_odd_byte() {
        let mut bytes = encode(&[7, 8]);
        bytes.push(0xff);
        let mut reader = PcmReader::new(Cursor::new(bytes));
        let mut buf = [0i16; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[7, 8]);
    }

    #[test]
    fn assembles_samples_from_tiny_reads() {
        let data = encode(&[0x1234, -0x1234]);
        let mut reader = PcmReader::new(Trickle {
            data,
            pos: 0,
            fail_at: None,
            interrupted: false,
        });
        let mut buf = [0i16; 2];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [0x1234, -0x1234]);
    }

    #[test]
    fn surfaces_read_errors() {
        let mut reader = PcmReader::new(Trickle {
            data: encode(&[1, 2, 3, 4]),
            pos: 0,
            fail_at: Some(3),
            interrupted: false,
        });
        let mut buf = [0i16; 4];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
