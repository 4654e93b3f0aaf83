//! Builds a zip archive of a directory and streams it back to the client.
//!
//! The `zip` crate's `ZipWriter` needs a `Write + Seek` sink to patch local
//! file headers after the fact, so we can't write directly into a plain
//! byte channel the way a fully streaming encoder would. Instead we build
//! the archive into a `NamedTempFile` on a blocking thread (grounded in the
//! teacher's own use of `tempfile::NamedTempFile` for atomic writes in
//! `kvdir.rs`), then hand the finished file to the async response body as a
//! `ReaderStream` - the HTTP response is still a streamed, chunked body from
//! the client's point of view.

use std::path::PathBuf;

use bytes::Bytes;
use chrono::{Datelike, Timelike};
use tokio_stream::Stream;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::path_lock::DirReadGuard;
use crate::stream_io::GuardedStream;

type ZipBody = GuardedStream<(DirReadGuard, tempfile::NamedTempFile), ReaderStream<tokio::fs::File>>;

pub async fn build_zip_stream(
    guard: DirReadGuard,
    dir_path: PathBuf,
) -> Result<impl Stream<Item = std::io::Result<Bytes>>, AppError> {
    let now = chrono::Local::now();
    let mtime = zip::DateTime::from_date_and_time(
        now.year().max(1980) as u16,
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
    )
    .unwrap_or_default();

    let tmp = tokio::task::spawn_blocking(move || -> Result<tempfile::NamedTempFile, AppError> {
        let tmp = tempfile::NamedTempFile::new()?;
        {
            let writer = tmp.reopen()?;
            let mut zip = zip::ZipWriter::new(writer);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .last_modified_time(mtime)
                .unix_permissions(0o600);

            for entry in walkdir::WalkDir::new(&dir_path) {
                let entry = entry.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry.path().strip_prefix(&dir_path).unwrap();
                let name = rel.to_string_lossy().replace('\\', "/");
                zip.start_file(name, options)?;
                let mut f = std::fs::File::open(entry.path())?;
                std::io::copy(&mut f, &mut zip)?;
            }
            zip.finish()?;
        }
        Ok(tmp)
    })
    .await??;

    let file = tokio::fs::File::from_std(tmp.reopen()?);
    let body: ZipBody = GuardedStream::new((guard, tmp), ReaderStream::new(file));
    Ok(body)
}
