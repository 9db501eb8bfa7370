use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use flate2::read::MultiGzDecoder;
use regex::Regex;
use tracing::warn;

use crate::config::{DecompressorKind, ResolvedConfig};
use crate::error::HarvestError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Everything the tool printed, for log messages.
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .iter()
            .filter(|text| !text.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Fixity tool seam. Processes are started with an explicit argument vector, never
/// through a shell; their text output is interpreted by [`parse_md5_output`].
pub trait FixityTool: Send + Sync {
    fn checksum_output(&self, path: &Path) -> Result<ToolOutput, HarvestError>;
}

pub trait Decompressor: Send + Sync {
    /// Decompresses `archive` into `destination_dir`. Failures show up as stderr text.
    fn decompress(&self, archive: &Path, destination_dir: &Path)
    -> Result<ToolOutput, HarvestError>;
}

impl<T: Decompressor + ?Sized> Decompressor for Box<T> {
    fn decompress(
        &self,
        archive: &Path,
        destination_dir: &Path,
    ) -> Result<ToolOutput, HarvestError> {
        (**self).decompress(archive, destination_dir)
    }
}

#[derive(Debug, Clone)]
pub struct Md5Deep {
    program: PathBuf,
}

impl Md5Deep {
    pub fn new(program: &str) -> Self {
        Self {
            program: resolve_program(program),
        }
    }
}

impl FixityTool for Md5Deep {
    fn checksum_output(&self, path: &Path) -> Result<ToolOutput, HarvestError> {
        run_tool(&self.program, &[path.as_os_str().to_string_lossy().to_string()])
    }
}

#[derive(Debug, Clone)]
pub struct SevenZip {
    program: PathBuf,
}

impl SevenZip {
    pub fn new(program: &str) -> Self {
        Self {
            program: resolve_program(program),
        }
    }
}

impl Decompressor for SevenZip {
    fn decompress(
        &self,
        archive: &Path,
        destination_dir: &Path,
    ) -> Result<ToolOutput, HarvestError> {
        let args = vec![
            "e".to_string(),
            archive.to_string_lossy().to_string(),
            format!("-o{}", destination_dir.to_string_lossy()),
            "-y".to_string(),
        ];
        run_tool(&self.program, &args)
    }
}

/// In-process gzip decompression. WARC files are multi-member gzip streams.
#[derive(Debug, Clone, Default)]
pub struct GzipDecompressor;

impl Decompressor for GzipDecompressor {
    fn decompress(
        &self,
        archive: &Path,
        destination_dir: &Path,
    ) -> Result<ToolOutput, HarvestError> {
        let name = archive
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = destination_dir.join(decompressed_name(&name));
        if target == archive {
            return Ok(ToolOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("{name} is not a gzip archive"),
            });
        }
        match gunzip(archive, &target) {
            Ok(bytes) => Ok(ToolOutput {
                success: true,
                stdout: format!("{bytes} bytes written to {}", target.display()),
                stderr: String::new(),
            }),
            Err(err) => {
                if let Err(remove_err) = fs::remove_file(&target) {
                    warn!(path = %target.display(), error = %remove_err, "could not remove partial output");
                }
                Ok(ToolOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: err.to_string(),
                })
            }
        }
    }
}

fn gunzip(archive: &Path, target: &Path) -> io::Result<u64> {
    let mut decoder = MultiGzDecoder::new(File::open(archive)?);
    let mut output = File::create(target)?;
    io::copy(&mut decoder, &mut output)
}

pub fn decompressor_for(config: &ResolvedConfig) -> Box<dyn Decompressor> {
    match config.decompressor {
        DecompressorKind::SevenZip => Box::new(SevenZip::new(&config.seven_zip)),
        DecompressorKind::Gzip => Box::new(GzipDecompressor),
    }
}

fn run_tool(program: &Path, args: &[String]) -> Result<ToolOutput, HarvestError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| HarvestError::ToolLaunch {
            tool: program.display().to_string(),
            message: err.to_string(),
        })?;
    Ok(ToolOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

fn resolve_program(program: &str) -> PathBuf {
    let candidate = PathBuf::from(program);
    if candidate.components().count() > 1 {
        return candidate;
    }
    find_in_path(program).unwrap_or(candidate)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

fn md5_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*([0-9a-fA-F]{32})\s+\S").expect("valid md5 regex"))
}

/// Pulls the checksum out of md5deep-style output (`<md5>  <path>`). Any other
/// shape, including empty output, is unparseable.
pub fn parse_md5_output(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| md5_pattern().captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// `name.warc.gz` -> `name.warc`
pub fn decompressed_name(filename: &str) -> String {
    filename
        .strip_suffix(".gz")
        .unwrap_or(filename)
        .to_string()
}

/// Output file some 7-Zip builds leave behind instead of the decompressed WARC.
pub fn open_sentinel(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".open");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn parses_md5deep_line() {
        let output = "0CC175B9C0F1B6A831C399E269772661  /data/a.warc.gz\n";
        assert_eq!(
            parse_md5_output(output).as_deref(),
            Some("0cc175b9c0f1b6a831c399e269772661")
        );
    }

    #[test]
    fn rejects_unexpected_output() {
        assert_eq!(parse_md5_output(""), None);
        assert_eq!(parse_md5_output("md5deep: No such file or directory"), None);
        assert_eq!(parse_md5_output("0cc175b9c0f1b6a8  short"), None);
    }

    #[test]
    fn names_and_sentinel() {
        assert_eq!(decompressed_name("a.warc.gz"), "a.warc");
        assert_eq!(decompressed_name("a.warc"), "a.warc");
        assert_eq!(
            open_sentinel(Path::new("/x/a.warc.gz")),
            PathBuf::from("/x/a.warc.gz.open")
        );
    }

    #[test]
    fn gzip_decompressor_handles_multi_member_files() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("a.warc.gz");
        let mut bytes = Vec::new();
        for part in [&b"WARC/1.0 first\n"[..], &b"WARC/1.0 second\n"[..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part).unwrap();
            bytes.extend(encoder.finish().unwrap());
        }
        fs::write(&archive, bytes).unwrap();

        let output = GzipDecompressor.decompress(&archive, temp.path()).unwrap();
        assert!(output.stderr.is_empty());
        assert_eq!(
            fs::read_to_string(temp.path().join("a.warc")).unwrap(),
            "WARC/1.0 first\nWARC/1.0 second\n"
        );
    }

    #[test]
    fn gzip_decompressor_reports_corrupt_input() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("bad.warc.gz");
        fs::write(&archive, b"not gzip").unwrap();
        let output = GzipDecompressor.decompress(&archive, temp.path()).unwrap();
        assert!(!output.stderr.is_empty());
        assert!(!temp.path().join("bad.warc").exists());
    }

    #[test]
    fn gzip_decompressor_leaves_uncompressed_input_alone() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("a.warc");
        fs::write(&archive, b"WARC/1.0 plain\n").unwrap();

        let output = GzipDecompressor.decompress(&archive, temp.path()).unwrap();
        assert!(!output.success);
        assert_eq!(output.stderr, "a.warc is not a gzip archive");
        assert_eq!(fs::read(&archive).unwrap(), b"WARC/1.0 plain\n");
    }
}
