use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use std::{
    fs::{self, File},
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    time::Duration,
};
use tar::Archive;
use xz2::read::XzDecoder;

use crate::{
    checksum::{compute_digest, ensure_digest},
    error::BuildError,
};

#[derive(Debug)]
pub enum DownloadResult {
    /// A cached file failed verification and was downloaded again
    Replaced(PathBuf),
    /// File was downloaded for the first time
    Created(PathBuf),
    /// File was found in cache
    Cached(PathBuf),
}

impl DownloadResult {
    pub fn path(&self) -> &Path {
        match self {
            DownloadResult::Replaced(p) | DownloadResult::Created(p) | DownloadResult::Cached(p) => p,
        }
    }
}

/// The filename component of `uri`, ignoring any query string.
pub fn archive_filename(uri: impl AsRef<str>) -> Result<String> {
    let uri = uri.as_ref();
    let url = Url::parse(uri).context(format!("`{uri}` is not a valid URL"))?;
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            BuildError::configuration(format!("couldn't derive a filename from URL: {uri}")).into()
        })
}

/// Deterministic cache location of the artifact behind `uri`.
pub fn cache_path(download_dir: impl AsRef<Path>, uri: impl AsRef<str>) -> Result<PathBuf> {
    Ok(download_dir.as_ref().join(archive_filename(uri)?))
}

const ARCHIVE_SUFFIXES: [&str; 8] = [
    ".tar.xz", ".txz", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tbz", ".tar",
];

/// `binutils-2.42.tar.xz` -> `binutils-2.42`.
pub fn archive_stem(filename: impl AsRef<str>) -> String {
    let filename = filename.as_ref();
    ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| filename.strip_suffix(suffix))
        .unwrap_or(filename)
        .to_string()
}

/// Make sure a valid copy of `uri` sits at `destination`.
///
/// An existing file is reused when verification is skipped or its digest matches; a mismatching
/// one is deleted and downloaded again. Zero-length files are never trusted.
pub fn fetch(
    uri: impl AsRef<str>,
    destination: impl AsRef<Path>,
    expected: Option<&str>,
    skip_verification: bool,
) -> Result<DownloadResult> {
    let uri = uri.as_ref();
    let destination = destination.as_ref();
    log::info!("=> fetching {uri}");

    let mut existed = false;
    if let Ok(meta) = fs::metadata(destination) {
        existed = true;
        if meta.len() == 0 {
            log::warn!("{} is empty, fetching it again", destination.display());
        } else if skip_verification || expected.is_none() {
            log::info!("   file already fetched");
            return Ok(DownloadResult::Cached(destination.to_path_buf()));
        } else if let Some(expected) = expected {
            let calculated = compute_digest(destination)?;
            if calculated.eq_ignore_ascii_case(expected.trim()) {
                log::info!("   file already fetched");
                return Ok(DownloadResult::Cached(destination.to_path_buf()));
            }
            log::warn!("SHA256 doesn't match, file will be fetched again");
            log::warn!("  Expected  : {expected}");
            log::warn!("  Calculated: {calculated}");
        }
        fs::remove_file(destination).context(format!("removing {}", destination.display()))?;
    }

    download(uri, destination)?;

    if existed {
        Ok(DownloadResult::Replaced(destination.to_path_buf()))
    } else {
        Ok(DownloadResult::Created(destination.to_path_buf()))
    }
}

/// Download `uri` to `destination`.
///
/// The content is streamed into a temporary file next to `destination` and only moved into place
/// once complete.
pub fn download(uri: impl AsRef<str>, destination: impl AsRef<Path>) -> Result<()> {
    let uri = uri.as_ref();
    let destination = destination.as_ref();
    let url = Url::parse(uri).context(format!("`{uri}` is not a valid URL"))?;

    let dir = destination
        .parent()
        .context(format!("{} has no parent", destination.display()))?;
    fs::create_dir_all(dir).context(format!("creating {}", dir.display()))?;
    let mut partial = tempfile::NamedTempFile::new_in(dir).context("creating .download file")?;

    match url.scheme() {
        "file" => {
            let source = url
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("`{uri}` is not a local path"))?;
            let mut src = File::open(&source).context(format!("opening {}", source.display()))?;
            io::copy(&mut src, partial.as_file_mut())
                .context(format!("copying {}", source.display()))?;
        }
        "http" | "https" => {
            let response = reqwest::blocking::Client::builder()
                .user_agent("curl/8.5.0")
                .build()?
                .get(url.clone())
                .send()
                .context(format!("sending GET request to {}", uri))?
                .error_for_status()
                .context(format!("non-success status from {}", uri))?;

            let style = ProgressStyle::with_template(
                "{msg:.dim} {bar:30.green/dim} {binary_bytes:>7}/{binary_total_bytes:7}",
            )?
            .progress_chars("--");

            let pb = match response.content_length() {
                Some(size) => ProgressBar::new(size),
                None => ProgressBar::new_spinner(),
            };
            pb.set_style(style);
            pb.set_message(archive_filename(uri)?);

            let mut source = pb.wrap_read(response);
            io::copy(&mut source, partial.as_file_mut())
                .context(format!("writing {}", destination.display()))?;
            pb.finish();
        }
        scheme => {
            return Err(BuildError::configuration(format!(
                "unsupported URL scheme `{scheme}` in {uri}"
            ))
            .into());
        }
    }

    partial
        .persist(destination)
        .context("moving .download file")?;
    Ok(())
}

fn decoder_for(archive: &Path, reader: impl Read + 'static) -> Result<Box<dyn Read>> {
    let filename = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let decoder: Box<dyn Read> = if filename.ends_with(".tar.xz") || filename.ends_with(".txz") {
        Box::new(XzDecoder::new(reader))
    } else if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
        Box::new(GzDecoder::new(reader))
    } else if filename.ends_with(".tar.bz2")
        || filename.ends_with(".tbz2")
        || filename.ends_with(".tbz")
    {
        Box::new(bzip2::read::BzDecoder::new(reader))
    } else if filename.ends_with(".tar") {
        Box::new(reader)
    } else {
        return Err(BuildError::configuration(format!(
            "unknown archive format: {}",
            archive.display()
        ))
        .into());
    };
    Ok(decoder)
}

/// Extract `archive` into `target`.
///
/// Unless verification is skipped, the digest is checked right before extraction and a mismatch
/// aborts before any entry is written. Entries whose destination already exists are left alone,
/// so an interrupted extraction can be resumed.
pub fn unpack(
    archive: impl AsRef<Path>,
    target: impl AsRef<Path>,
    expected: Option<&str>,
    skip_verification: bool,
) -> Result<()> {
    let archive = archive.as_ref();
    let target = target.as_ref();
    log::info!("=> extracting {}", archive.display());

    if !skip_verification {
        ensure_digest(archive, expected)?;
    }

    fs::create_dir_all(target).context(format!(
        "creating destination directory {}",
        target.display()
    ))?;

    let file = File::open(archive).context(format!("opening {}", archive.display()))?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.dim} {msg:.dim}")?);
    pb.enable_steady_tick(Duration::from_millis(100));

    // stream-decompress and extract
    let reader = pb.wrap_read(BufReader::new(file));
    let mut archive_reader = Archive::new(decoder_for(archive, reader)?);

    let mut skipped = 0usize;
    for entry_res in archive_reader.entries().context("reading .tar entries")? {
        let mut entry = entry_res.context("reading a .tar entry")?;
        let path = entry.path().context("reading entry path")?.into_owned();
        pb.set_message(path.display().to_string());

        if fs::symlink_metadata(target.join(&path)).is_ok() {
            skipped += 1;
            continue;
        }
        entry
            .unpack_in(target)
            .context(format!("extracting {}", path.display()))?;
    }

    pb.finish_and_clear();
    if skipped > 0 {
        log::debug!("{skipped} entries already extracted");
    }

    Ok(())
}
