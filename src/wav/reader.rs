use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::header::WavHeader;
use crate::encoder::PcmBuffer;
use crate::error::{Result, TranscodeError};

/// One block of PCM read from the data region
pub type PcmChunk = PcmBuffer;

/// An opened, validated PCM16 WAV file
#[derive(Debug)]
pub struct WavReader {
    path: PathBuf,
    file: BufReader<File>,
    header: WavHeader,
}

impl WavReader {
    /// Open `path` and parse its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                return Err(TranscodeError::InputNotFound(format!(
                    "{} is not a regular file",
                    path.display()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TranscodeError::InputNotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut file = BufReader::new(File::open(&path)?);
        let header = WavHeader::parse(&mut file, metadata.len())?;

        tracing::debug!(
            path = %path.display(),
            sample_rate = header.sample_rate,
            channels = header.channel_count,
            data_offset = header.data_offset,
            data_length = header.data_length,
            "WAV header parsed"
        );

        Ok(Self { path, file, header })
    }

    pub fn header(&self) -> &WavHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume the reader and yield the data region in chunks of at most
    /// `chunk_bytes`, rounded down to whole sample frames.
    pub fn into_chunks(mut self, chunk_bytes: usize) -> Result<PcmChunks> {
        let block_align = self.header.block_align();
        let chunk_bytes = (chunk_bytes / block_align).max(1) * block_align;
        self.file
            .seek(SeekFrom::Start(self.header.data_offset as u64))?;

        Ok(PcmChunks {
            file: self.file,
            remaining: self.header.data_length as u64,
            chunk_bytes,
            block_align,
            done: false,
        })
    }
}

/// Lazy, finite sequence of PCM chunks. Not restartable.
#[derive(Debug)]
pub struct PcmChunks {
    file: BufReader<File>,
    remaining: u64,
    chunk_bytes: usize,
    block_align: usize,
    done: bool,
}

impl PcmChunks {
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    fn read_next(&mut self) -> Result<Option<PcmChunk>> {
        let want = (self.chunk_bytes as u64).min(self.remaining) as usize;
        if want == 0 {
            return Ok(None);
        }

        let mut chunk = PcmBuffer::with_capacity(self.chunk_bytes);
        let got = chunk.fill_from(&mut (&mut self.file).take(want as u64), want)?;
        self.remaining -= got as u64;
        if got < want {
            // file shrank underneath us
            self.remaining = 0;
        }

        let whole = got - got % self.block_align;
        if whole != got {
            tracing::debug!(dropped = got - whole, "discarding trailing partial sample frame");
            chunk.truncate(whole);
        }
        if chunk.is_empty() {
            return Ok(None);
        }
        Ok(Some(chunk))
    }
}

impl Iterator for PcmChunks {
    type Item = Result<PcmChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for PcmChunks {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures;

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = WavReader::open(dir.path().join("nope.wav")).unwrap_err();
        assert!(matches!(err, TranscodeError::InputNotFound(_)));
    }

    #[test]
    fn test_directory_is_not_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = WavReader::open(dir.path()).unwrap_err();
        assert!(matches!(err, TranscodeError::InputNotFound(_)));
    }

    #[test]
    fn test_chunks_cover_data_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        fixtures::write_sine_wav(&path, 16000, 1, 5000);

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.header().data_length, 10000);

        let chunks: Vec<_> = reader
            .into_chunks(2048)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 5);
        assert!(chunks[..4].iter().all(|c| c.len() == 2048));
        assert_eq!(chunks[4].len(), 10000 - 4 * 2048);
        assert!(chunks.iter().all(|c| c.capacity() == 2048));
    }

    #[test]
    fn test_chunk_size_rounds_to_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        fixtures::write_sine_wav(&path, 16000, 2, 100);

        let chunks = WavReader::open(&path).unwrap().into_chunks(1023).unwrap();
        assert_eq!(chunks.chunk_bytes(), 1020);
    }

    #[test]
    fn test_empty_data_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        fixtures::write_sine_wav(&path, 16000, 1, 0);

        let mut chunks = WavReader::open(&path).unwrap().into_chunks(2048).unwrap();
        assert!(chunks.next().is_none());
        assert!(chunks.next().is_none());
    }

    #[test]
    fn test_odd_trailing_byte_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.wav");
        fixtures::write_raw_wav(&path, 1, 16000, 16, &[1, 0, 2, 0, 3]);

        let chunks: Vec<_> = WavReader::open(&path)
            .unwrap()
            .into_chunks(2048)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_bytes(), &[1, 0, 2, 0]);
    }
}
