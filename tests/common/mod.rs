#![allow(dead_code)]

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Result;
use flate2::{Compression, write::GzEncoder};
use reqwest::Url;

/// Write `<dir>/<stem>.tar.gz` holding `files` under a top-level `<stem>/` directory, the way
/// release tarballs are laid out.
pub fn make_archive(dir: &Path, stem: &str, files: &[(&str, &str)]) -> Result<PathBuf> {
    let path = dir.join(format!("{stem}.tar.gz"));
    let encoder = GzEncoder::new(File::create(&path)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, format!("{stem}/{name}"), content.as_bytes())?;
    }

    builder.into_inner()?.finish()?;
    Ok(path)
}

pub fn file_uri(path: &Path) -> String {
    Url::from_file_path(path)
        .expect("absolute path")
        .to_string()
}
