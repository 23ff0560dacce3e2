use std::path::{Path, PathBuf};
use std::time::Instant;

use bytes::Bytes;
use reqwest::{Client, Response};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::BufWriter;
use url::Url;

use crate::archive::error::ArchiveError;
use crate::archive::types::{basename, ArchiveRecord, ExposureFiles, SearchQuery};
use crate::md5_utils::{md5_matches, Md5Writer};

pub const SEARCH_LIMIT: u32 = 100;

pub struct ArchiveClient {
    http: Client,
    base_url: Url,
}

impl ArchiveClient {
    pub fn new(base_url: &str) -> Result<Self, ArchiveError> {
        let raw = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(&raw)?,
        })
    }

    fn search_url(&self) -> Result<Url, ArchiveError> {
        let mut url = self.base_url.join("api/adv_search/fasearch/")?;
        url.query_pairs_mut()
            .append_pair("limit", &SEARCH_LIMIT.to_string());
        Ok(url)
    }

    /// Files whose original name contains `rawname`
    pub async fn search(&self, rawname: &str) -> Result<Vec<ArchiveRecord>, ArchiveError> {
        let response = self
            .http
            .post(self.search_url()?)
            .json(&SearchQuery::by_rawname(rawname))
            .send()
            .await?
            .error_for_status()?;

        let rows: Vec<Value> = response.json().await?;
        parse_search_rows(rows)
    }

    /// Fetch `url` into `dest`, checking the MD5 when one is known
    ///
    /// Bytes go to a temporary file next to `dest` which is renamed only
    /// after the checksum matched. On any failure the temporary file is
    /// removed.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        expected_md5: Option<&str>,
    ) -> Result<u64, ArchiveError> {
        let tmp = dest.with_extension("part");
        let response = self.http.get(url).send().await?.error_for_status()?;

        let result: Result<u64, ArchiveError> = async {
            let (written, actual) = write_part(response, &tmp).await?;
            if let Some(expected) = expected_md5 {
                if !md5_matches(&actual, expected) {
                    return Err(ArchiveError::ChecksumMismatch {
                        path: dest.display().to_string(),
                        expected: expected.to_string(),
                        actual,
                    });
                }
            }
            tokio::fs::rename(&tmp, dest)
                .await
                .map_err(io_error(dest))?;
            Ok(written)
        }
        .await;

        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(&tmp).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to remove {}: {}", tmp.display(), e);
                }
            }
        }
        result
    }

    /// Search for `rawname` and download its flux, mask and weight files
    ///
    /// Files are saved in `outdir` under the basenames given in `files`.
    pub async fn fetch_exposure(
        &self,
        rawname: &str,
        files: &ExposureFiles,
        outdir: &Path,
    ) -> Result<Vec<PathBuf>, ArchiveError> {
        let t0 = Instant::now();
        log::info!("Downloading data for exposure RAWNAME = {}", rawname);

        let records = self.search(rawname).await?;
        log::debug!("{} archive files match {}", records.len(), rawname);

        let mut saved = Vec::new();
        for (kind, file) in files.iter() {
            let record = select_by_basename(&records, file)?;
            let dest = outdir.join(basename(file));
            log::info!("Downloading {} = {} url = {}", kind, file, record.url);

            let bytes = self
                .download(&record.url, &dest, record.md5sum.as_deref())
                .await?;
            log::info!("Saved {} ({} bytes)", dest.display(), bytes);
            saved.push(dest);
        }

        log::info!("dt = {:.3} sec", t0.elapsed().as_secs_f64());
        Ok(saved)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError {
    let path = path.display().to_string();
    move |source| ArchiveError::Io { path, source }
}

/// Stream the response body into `tmp`, returning its size and MD5
async fn write_part(mut response: Response, tmp: &Path) -> Result<(u64, String), ArchiveError> {
    let file = File::create(tmp).await.map_err(io_error(tmp))?;
    let mut writer = Md5Writer::new(BufWriter::new(file));

    while let Some(chunk) = response.chunk().await? {
        write_chunk(&mut writer, &chunk)
            .await
            .map_err(io_error(tmp))?;
    }
    let written = writer.bytes_written();
    let actual = writer.finish().await.map_err(io_error(tmp))?;
    Ok((written, actual))
}

async fn write_chunk(
    writer: &mut Md5Writer<BufWriter<File>>,
    chunk: &Bytes,
) -> std::io::Result<()> {
    writer.write_all(chunk).await
}

/// Drop the metadata header row and decode the remaining records
pub fn parse_search_rows(rows: Vec<Value>) -> Result<Vec<ArchiveRecord>, ArchiveError> {
    rows.into_iter()
        .skip(1)
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| ArchiveError::MalformedResponse(format!("bad record: {}", e)))
        })
        .collect()
}

/// First record whose archive file name has the same basename as `wanted`
pub fn select_by_basename<'a>(
    records: &'a [ArchiveRecord],
    wanted: &str,
) -> Result<&'a ArchiveRecord, ArchiveError> {
    let wanted = basename(wanted);
    records
        .iter()
        .find(|r| r.basename() == wanted)
        .ok_or_else(|| ArchiveError::NotFound(wanted.to_string()))
}
