use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output fields requested from the search endpoint
pub const OUTFIELDS: [&str; 4] = ["original_filename", "archive_filename", "md5sum", "url"];

/// One file matching a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    #[serde(default)]
    pub original_filename: Option<String>,
    pub archive_filename: String,
    #[serde(default)]
    pub md5sum: Option<String>,
    pub url: String,
}

impl ArchiveRecord {
    /// File name part of `archive_filename`
    pub fn basename(&self) -> &str {
        basename(&self.archive_filename)
    }
}

pub fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

/// Search document for the advanced search endpoint
#[derive(Debug, Serialize)]
pub struct SearchQuery {
    pub outfields: Vec<String>,
    pub search: Vec<(String, String, String)>,
}

impl SearchQuery {
    /// Case-insensitive substring match on the original file name
    pub fn by_rawname(rawname: &str) -> Self {
        Self {
            outfields: OUTFIELDS.iter().map(|f| f.to_string()).collect(),
            search: vec![(
                "original_filename".to_string(),
                rawname.to_string(),
                "icontains".to_string(),
            )],
        }
    }
}

/// The three products of one exposure
#[derive(Debug, Clone)]
pub struct ExposureFiles {
    pub flux: String,
    pub mask: String,
    pub weight: String,
}

impl ExposureFiles {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("fluxfile", self.flux.as_str()),
            ("maskfile", self.mask.as_str()),
            ("wtfile", self.weight.as_str()),
        ]
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_serializes_as_nested_arrays() {
        let q = SearchQuery::by_rawname("c4d_1308_ori");
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(
            v["search"],
            serde_json::json!([["original_filename", "c4d_1308_ori", "icontains"]])
        );
        assert_eq!(v["outfields"][3], "url");
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/net/archive/pipe/c4d_ooi.fits.fz"), "c4d_ooi.fits.fz");
        assert_eq!(basename("c4d_ooi.fits.fz"), "c4d_ooi.fits.fz");
    }
}
