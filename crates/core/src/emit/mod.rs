use std::io::{self, Write};

use serde::Serialize;

use crate::{FrameResult, OutputFormat};

/// Writes finished frames, and optionally the band cutoffs, to a sink.
///
/// With one output channel the two halves of a stereo frame are averaged
/// band by band; a mono frame is written as is.
#[derive(Debug)]
pub struct BarWriter<W> {
    inner: W,
    format: OutputFormat,
    channels_out: usize,
    line: Vec<i64>,
}

#[derive(Serialize)]
struct CutoffLine<'a> {
    cutoffs: &'a [i64],
}

impl<W: Write> BarWriter<W> {
    pub fn new(inner: W, format: OutputFormat, channels_out: usize) -> Self {
        Self {
            inner,
            format,
            channels_out: channels_out.max(1),
            line: Vec::new(),
        }
    }

    /// Writes one line of cutoff frequencies, repeated for every output
    /// channel.
    pub fn write_cutoffs(&mut self, cutoffs: &[f64]) -> io::Result<()> {
        self.line.clear();
        for _ in 0..self.channels_out {
            self.line.extend(cutoffs.iter().map(|&hz| hz as i64));
        }
        match self.format {
            OutputFormat::Text => write_text_line(&mut self.inner, &self.line),
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.inner, &CutoffLine { cutoffs: &self.line })?;
                writeln!(self.inner)
            }
        }
    }

    pub fn write_frame(&mut self, frame: &FrameResult) -> io::Result<()> {
        self.line.clear();
        if self.channels_out == 1 && frame.channels() == 2 {
            self.line.extend(
                frame
                    .channel(0)
                    .iter()
                    .zip(frame.channel(1))
                    .map(|(left, right)| ((left + right) / 2.0) as i64),
            );
        } else {
            self.line.extend(frame.bars().iter().map(|&bar| bar as i64));
        }
        match self.format {
            OutputFormat::Text => write_text_line(&mut self.inner, &self.line),
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.inner, &self.line)?;
                writeln!(self.inner)
            }
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn write_text_line<W: Write>(out: &mut W, values: &[i64]) -> io::Result<()> {
    for value in values {
        write!(out, "{value:4} ")?;
    }
    writeln!(out)
}
