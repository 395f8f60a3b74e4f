//! Input sources: whole files, stdin (`-`), and a followed file.

use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use fs_err::File;
use tracing::{debug, info};

const STDIN_ARG: &str = "-";
const TAIL_CHUNK: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Stdin,
    File(PathBuf),
}

impl Input {
    pub fn from_arg(arg: &Path) -> Self {
        if arg.as_os_str() == STDIN_ARG {
            Input::Stdin
        } else {
            Input::File(arg.to_path_buf())
        }
    }

    pub fn label(&self) -> String {
        match self {
            Input::Stdin => "<stdin>".to_string(),
            Input::File(path) => path.display().to_string(),
        }
    }

    pub fn open(&self) -> Result<Box<dyn BufRead>, String> {
        match self {
            Input::Stdin => Ok(Box::new(io::stdin().lock())),
            Input::File(path) => {
                let file = File::open(path).map_err(|err| format!("Failed to open input: {}", err))?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

/// Native `tail -F`: starts at the last N lines, then yields lines as they
/// are appended. A truncated or replaced file is reopened from the start.
pub struct Follower {
    path: PathBuf,
    reader: BufReader<File>,
    position: u64,
    identity: Option<u64>,
    partial: Vec<u8>,
}

impl Follower {
    pub fn open(path: &Path, lines: usize) -> Result<Self, String> {
        let mut file = File::open(path).map_err(|err| format!("Failed to open followed file: {}", err))?;
        let identity = file_identity(&file.metadata().map_err(|err| format!("Failed to stat followed file: {}", err))?);
        let position = tail_offset(&mut file, lines)
            .map_err(|err| format!("Failed to seek followed file: {}", err))?;
        file.seek(SeekFrom::Start(position))
            .map_err(|err| format!("Failed to seek followed file: {}", err))?;
        info!(path = %path.display(), lines, "Following file");

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            position,
            identity,
            partial: Vec::new(),
        })
    }

    /// One complete line if available. Never blocks; a line still being
    /// written is held back until its newline arrives.
    pub fn next_line(&mut self) -> Result<Option<String>, String> {
        let mut buf = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut buf)
            .map_err(|err| format!("Failed to read followed file: {}", err))?;

        if read > 0 {
            self.position += read as u64;
            self.partial.extend_from_slice(&buf);
            if self.partial.ends_with(b"\n") {
                let line = std::mem::take(&mut self.partial);
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            return Ok(None);
        }

        if self.replaced() {
            self.reopen()?;
        }
        Ok(None)
    }

    /// Feeds lines to `on_line` forever, sleeping `poll` whenever the file
    /// has nothing new. Only returns on error.
    pub fn run(
        &mut self,
        poll: Duration,
        mut on_line: impl FnMut(&str) -> Result<(), String>,
    ) -> Result<(), String> {
        loop {
            match self.next_line()? {
                Some(line) => on_line(&line)?,
                None => thread::sleep(poll),
            }
        }
    }

    fn replaced(&self) -> bool {
        // A missing file is a rotation in progress; keep the old handle.
        match fs_err::metadata(&self.path) {
            Ok(meta) => meta.len() < self.position || file_identity(&meta) != self.identity,
            Err(_) => false,
        }
    }

    fn reopen(&mut self) -> Result<(), String> {
        let file = File::open(&self.path).map_err(|err| format!("Failed to reopen followed file: {}", err))?;
        self.identity = file
            .metadata()
            .map(|meta| file_identity(&meta))
            .map_err(|err| format!("Failed to stat followed file: {}", err))?;
        self.reader = BufReader::new(file);
        self.position = 0;
        self.partial.clear();
        debug!(path = %self.path.display(), "Followed file was replaced or truncated, reading from start");
        Ok(())
    }
}

#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}

/// Byte offset where the last `lines` lines of `file` begin. A trailing
/// newline at end of file does not count as an extra empty line.
fn tail_offset<F: Read + Seek>(file: &mut F, lines: usize) -> io::Result<u64> {
    let len = file.seek(SeekFrom::End(0))?;
    if lines == 0 {
        return Ok(len);
    }

    let mut buf = [0u8; TAIL_CHUNK];
    let mut pos = len;
    let mut seen = 0;
    while pos > 0 {
        let chunk = pos.min(TAIL_CHUNK as u64) as usize;
        pos -= chunk as u64;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut buf[..chunk])?;

        for i in (0..chunk).rev() {
            let at = pos + i as u64;
            if buf[i] != b'\n' || at + 1 == len {
                continue;
            }
            seen += 1;
            if seen == lines {
                return Ok(at + 1);
            }
        }
    }
    Ok(0)
}
