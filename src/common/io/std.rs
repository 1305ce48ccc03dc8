//! Common I/O code using sync I/O.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::Context;
use flate2::{write::GzEncoder, Compression};

/// Returns whether the path looks like a gzip or bgzip file.
pub fn is_gz<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    [Some(Some("gz")), Some(Some("bgz"))].contains(&path.as_ref().extension().map(|s| s.to_str()))
}

/// Output writer, either plain or gzip compressed.
///
/// Must be finished with `FinishWrite::finish_write` so that errors on writing the gzip
/// trailer or on flushing the buffer are not lost when dropping.
pub enum MaybeGzWriter {
    Plain(Box<dyn Write>),
    Gz(GzEncoder<BufWriter<File>>),
}

impl Write for MaybeGzWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            MaybeGzWriter::Plain(writer) => writer.write(buf),
            MaybeGzWriter::Gz(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            MaybeGzWriter::Plain(writer) => writer.flush(),
            MaybeGzWriter::Gz(writer) => writer.flush(),
        }
    }
}

/// Writers that need an explicit, fallible finalization after the last write.
pub trait FinishWrite: Write {
    fn finish_write(self) -> Result<(), anyhow::Error>;
}

impl FinishWrite for MaybeGzWriter {
    fn finish_write(self) -> Result<(), anyhow::Error> {
        match self {
            MaybeGzWriter::Plain(mut writer) => writer.flush()?,
            MaybeGzWriter::Gz(writer) => writer
                .finish()
                .and_then(|mut inner| inner.flush())
                .map_err(|e| anyhow::anyhow!("could not finish gzip output: {}", e))?,
        }
        Ok(())
    }
}

impl FinishWrite for Vec<u8> {
    fn finish_write(self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

impl<W: Write + ?Sized> FinishWrite for &mut W {
    fn finish_write(self) -> Result<(), anyhow::Error> {
        Ok(self.flush()?)
    }
}

/// Transparently open a file with gzip encoder for writing.
///
/// # Arguments
///
/// * `path` - A path to the file to open.
pub fn open_write_maybe_gz<P>(path: P) -> Result<MaybeGzWriter, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())
        .with_context(|| format!("could not create {}", path.as_ref().display()))?;
    if is_gz(path.as_ref()) {
        tracing::trace!("Opening {:?} as gzip for writing", path.as_ref());
        let bufwriter = BufWriter::new(file);
        let encoder = GzEncoder::new(bufwriter, Compression::default());
        Ok(MaybeGzWriter::Gz(encoder))
    } else {
        tracing::trace!("Opening {:?} as plain text for writing", path.as_ref());
        Ok(MaybeGzWriter::Plain(Box::new(BufWriter::new(file))))
    }
}

/// Open the report output: the given file, or standard output if there is none.
pub fn open_output(path: Option<&Path>) -> Result<MaybeGzWriter, anyhow::Error> {
    match path {
        Some(path) => {
            tracing::info!("Writing output to '{}'", path.display());
            open_write_maybe_gz(path)
        }
        None => Ok(MaybeGzWriter::Plain(Box::new(BufWriter::new(
            std::io::stdout(),
        )))),
    }
}

#[cfg(test)]
mod test {
    use std::io::{BufReader, Read, Write};

    use flate2::bufread::{GzDecoder, MultiGzDecoder};
    use pretty_assertions::assert_eq;

    use super::FinishWrite;

    #[rstest::rstest]
    #[case("report.csv", false)]
    #[case("report.csv.gz", true)]
    #[case("report.csv.bgz", true)]
    #[case("report", false)]
    fn is_gz(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(super::is_gz(path), expected);
    }

    #[rstest::rstest]
    #[case("report.csv")]
    #[case("report.csv.gz")]
    fn open_write_maybe_gz(#[case] filename: &str) -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let tmp_file_path = tmp_dir.join(filename);

        {
            let mut writer = super::open_output(Some(tmp_file_path.as_path()))?;
            for i in 1..3000 {
                writer.write_all(format!("{}\n", i).as_bytes())?;
            }

            writer.finish_write()?;
        }

        let file = std::fs::File::open(&tmp_file_path)?;
        let mut text = String::new();
        if super::is_gz(&tmp_file_path) {
            MultiGzDecoder::new(BufReader::new(file)).read_to_string(&mut text)?;
        } else {
            BufReader::new(file).read_to_string(&mut text)?;
        }
        assert_eq!(text.lines().count(), 2999);
        assert_eq!(text.lines().last(), Some("2999"));

        Ok(())
    }

    #[test]
    fn finish_write_completes_gzip_member() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let tmp_file_path = tmp_dir.join("report.csv.gz");

        let mut writer = super::open_write_maybe_gz(&tmp_file_path)?;
        writer.write_all(b"Sample,Type\n")?;
        writer.finish_write()?;

        // The trailer is written and checked by the single-member decoder.
        let file = std::fs::File::open(&tmp_file_path)?;
        let mut text = String::new();
        GzDecoder::new(BufReader::new(file)).read_to_string(&mut text)?;
        assert_eq!(text, "Sample,Type\n");

        Ok(())
    }

    #[test]
    fn finish_write_borrowed_buffer() -> Result<(), anyhow::Error> {
        let mut buf = Vec::new();
        {
            let writer = &mut buf;
            writer.write_all(b"x")?;
            writer.finish_write()?;
        }
        assert_eq!(buf, b"x".to_vec());

        Ok(())
    }

    #[test]
    fn open_write_missing_directory() {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("does/not/exist.csv");

        assert!(super::open_write_maybe_gz(path).is_err());
    }
}
