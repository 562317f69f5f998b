use std::fs;
use std::path::{Path, PathBuf};

use crosslink_io::{batch_sheets, write_json, write_workbook};
use crosslink_protocol::{ExportFormat, ExportInfo};
use crosslink_recon::Batch;

use crate::error::ServiceError;

/// Writes batch artifacts into one directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn export(&self, batch: &Batch, format: ExportFormat) -> Result<ExportInfo, ServiceError> {
        let bytes = match format {
            ExportFormat::Xlsx => write_workbook(&batch_sheets(batch))?,
            ExportFormat::Json => write_json(batch)?,
        };

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ServiceError::Io { path, source }
        };
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let file_name = format!(
            "{}_{}.{}",
            slug(&batch.batch_name),
            batch.batch_id,
            format.extension()
        );
        let path = self.dir.join(&file_name);
        // Write next to the target then rename so readers never see a partial file.
        let partial = self.dir.join(format!(".{file_name}.part"));
        fs::write(&partial, &bytes).map_err(io_err(&partial))?;
        fs::rename(&partial, &path).map_err(io_err(&path))?;

        let absolute = fs::canonicalize(&path).map_err(io_err(&path))?;
        log::info!("exported batch {} to {} ({} bytes)", batch.batch_id, absolute.display(), bytes.len());
        Ok(ExportInfo {
            file_name,
            file_link: file_url(&absolute),
        })
    }
}

/// File-system-safe rendition of a batch name.
fn slug(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "batch".to_string()
    } else {
        slug
    }
}

/// `file://` URL for an absolute path. Every byte outside the RFC 3986
/// unreserved set is percent-encoded, apart from `/` and a drive colon.
fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut url = String::from("file://");
    if !raw.starts_with('/') {
        url.push('/');
    }
    let drive = has_drive_letter(&raw);
    for (i, byte) in raw.bytes().enumerate() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                url.push(byte as char)
            }
            b':' if drive && i == 1 => url.push(':'),
            _ => url.push_str(&format!("%{byte:02X}")),
        }
    }
    url
}

fn has_drive_letter(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_replaces_unsafe_chars() {
        assert_eq!(slug("Q3 payouts/2024"), "Q3_payouts_2024");
        assert_eq!(slug("   "), "batch");
    }

    #[test]
    fn file_url_escapes() {
        assert_eq!(file_url(Path::new("/tmp/my exports/a.xlsx")), "file:///tmp/my%20exports/a.xlsx");
        assert_eq!(file_url(Path::new("C:\\out\\a.xlsx")), "file:///C:/out/a.xlsx");
    }

    #[test]
    fn file_url_encodes_reserved_and_non_ascii() {
        assert_eq!(
            file_url(Path::new("/srv/café #1/a?b&c=d;e[1]:f.xlsx")),
            "file:///srv/caf%C3%A9%20%231/a%3Fb%26c%3Dd%3Be%5B1%5D%3Af.xlsx"
        );
        assert_eq!(file_url(Path::new("/tmp/100%/ä.json")), "file:///tmp/100%25/%C3%A4.json");
    }
}
