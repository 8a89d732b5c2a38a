use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use cid::Cid;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use std::fmt;

use crate::error::JobError;

/// Publisher identity: the logical table a job's data belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pub {
    pub namespace: String,
    pub relation: String,
}

impl Pub {
    pub fn new(namespace: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: relation.into(),
        }
    }

    /// Derive the publisher from an uploaded object path.
    ///
    /// Paths look like `namespace/relation/export-...parquet`; anything with
    /// fewer than three segments is rejected.
    pub fn from_object_name(name: &str) -> Result<Self, JobError> {
        let parts: Vec<&str> = name.split('/').collect();
        if parts.len() < 3 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(JobError::InvalidObjectName(name.to_string()));
        }

        Ok(Self::new(parts[0], parts[1]))
    }

    /// Publisher key as recorded by the ledger contract.
    pub fn ledger_key(&self) -> String {
        format!("{}.{}", self.namespace, self.relation)
    }
}

impl fmt::Display for Pub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.relation)
    }
}

/// Binary CID of an uploaded artifact, as stored by the job store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentAddress(Vec<u8>);

impl ContentAddress {
    /// Parse the textual form returned by the archival network.
    pub fn parse(text: &str) -> Result<Self, JobError> {
        let cid = Cid::try_from(text)
            .map_err(|e| JobError::InvalidContentAddress(format!("{}: {}", text, e)))?;
        Ok(Self(cid.to_bytes()))
    }

    /// Wrap bytes read back from storage. Validity is checked lazily.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Canonical text form used to query the status service.
    pub fn to_cid_string(&self) -> Result<String, JobError> {
        Cid::try_from(self.0.as_slice())
            .map(|cid| cid.to_string())
            .map_err(|e| JobError::InvalidContentAddress(format!("0x{}: {}", hex::encode(&self.0), e)))
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_cid_string() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

impl Serialize for ContentAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Cache metadata attached to an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub path: String,
    pub duration_minutes: i64,
}

/// A job as handed over by the upload path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub content_address: ContentAddress,
    pub publisher: Pub,
    /// Producer-supplied logical time, unix seconds
    pub source_timestamp: Option<i64>,
    pub cache: Option<CacheSettings>,
}

impl NewJob {
    pub fn from_upload(
        cid: &str,
        object_name: &str,
        source_timestamp: Option<i64>,
        cache: Option<CacheSettings>,
    ) -> Result<Self, JobError> {
        Ok(Self {
            content_address: ContentAddress::parse(cid)?,
            publisher: Pub::from_object_name(object_name)?,
            source_timestamp,
            cache,
        })
    }

    /// Cache expiry: source timestamp (or `now` when absent) plus the cache
    /// duration. `None` unless a positive duration was supplied.
    pub fn cache_expiry(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, JobError> {
        let Some(cache) = self.cache.as_ref().filter(|c| c.duration_minutes > 0) else {
            return Ok(None);
        };
        let origin = match self.source_timestamp {
            Some(ts) => Utc
                .timestamp_opt(ts, 0)
                .single()
                .ok_or_else(|| JobError::InvalidCacheWindow(format!("source timestamp {} out of range", ts)))?,
            None => now,
        };
        TimeDelta::try_minutes(cache.duration_minutes)
            .and_then(|duration| origin.checked_add_signed(duration))
            .map(Some)
            .ok_or_else(|| {
                JobError::InvalidCacheWindow(format!(
                    "{} minutes after {} is out of range",
                    cache.duration_minutes, origin
                ))
            })
    }

    pub fn cache_path(&self) -> Option<&str> {
        self.cache
            .as_ref()
            .filter(|c| c.duration_minutes > 0)
            .map(|c| c.path.as_str())
    }
}

/// Job awaiting (or past) ledger confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub publisher: Pub,
    pub content_address: ContentAddress,
    pub source_timestamp: Option<i64>,
    pub cache_expiry: Option<DateTime<Utc>>,
    /// `None` while unsettled
    pub settled_at: Option<DateTime<Utc>>,
}

/// Row shape of the unsettled-jobs query.
#[derive(Debug, FromRow)]
pub struct JobRow {
    pub namespace: String,
    pub relation: String,
    pub cid: Vec<u8>,
    pub timestamp: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub activated: Option<DateTime<Utc>>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            publisher: Pub::new(row.namespace, row.relation),
            content_address: ContentAddress::from_bytes(row.cid),
            source_timestamp: row.timestamp,
            cache_expiry: row.expires_at,
            settled_at: row.activated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_CID: &str = "bafkreifzjut3te2nhyekklss27nh3k72ysco7y32koao5eei66wof36n5e";

    #[test]
    fn test_pub_from_object_name() {
        let name = "esfbmltndstj/ksvraapqfiyf/export17860a3b03221a1b0000000000000001-n901064813195493377.0.parquet";
        let publisher = Pub::from_object_name(name).unwrap();
        assert_eq!(publisher, Pub::new("esfbmltndstj", "ksvraapqfiyf"));
        assert_eq!(publisher.ledger_key(), "esfbmltndstj.ksvraapqfiyf");

        assert!(Pub::from_object_name("invalid_filename_format.parquet").is_err());
        assert!(Pub::from_object_name("ns/file.parquet").is_err());
        assert!(Pub::from_object_name("/rel/file.parquet").is_err());
    }

    #[test]
    fn test_content_address_text_form() {
        let address = ContentAddress::parse(HELLO_CID).unwrap();
        assert_eq!(
            hex::encode(address.as_bytes()),
            "01551220b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(address.to_cid_string().unwrap(), HELLO_CID);
        assert_eq!(address.to_string(), HELLO_CID);

        assert!(ContentAddress::parse("not-a-cid").is_err());

        let garbage = ContentAddress::from_bytes(b"cidA".to_vec());
        assert!(garbage.to_cid_string().is_err());
        assert_eq!(garbage.to_string(), "0x63696441");
    }

    #[test]
    fn test_cache_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut job = NewJob::from_upload(HELLO_CID, "ns/rel/file.parquet", None, None).unwrap();
        assert_eq!(job.cache_expiry(now).unwrap(), None);

        job.cache = Some(CacheSettings {
            path: "ns/rel/file.parquet".into(),
            duration_minutes: 30,
        });
        assert_eq!(job.cache_expiry(now).unwrap(), Some(now + TimeDelta::minutes(30)));
        assert_eq!(job.cache_path(), Some("ns/rel/file.parquet"));

        let source = Utc.with_ymd_and_hms(2023, 9, 26, 8, 0, 0).unwrap();
        job.source_timestamp = Some(source.timestamp());
        assert_eq!(job.cache_expiry(now).unwrap(), Some(source + TimeDelta::minutes(30)));

        job.cache = Some(CacheSettings {
            path: "ignored".into(),
            duration_minutes: 0,
        });
        assert_eq!(job.cache_expiry(now).unwrap(), None);
        assert_eq!(job.cache_path(), None);
    }

    #[test]
    fn test_cache_expiry_out_of_range() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut job = NewJob::from_upload(HELLO_CID, "ns/rel/file.parquet", None, None).unwrap();

        job.cache = Some(CacheSettings {
            path: "ns/rel/file.parquet".into(),
            duration_minutes: i64::MAX,
        });
        assert!(matches!(job.cache_expiry(now), Err(JobError::InvalidCacheWindow(_))));

        job.cache = Some(CacheSettings {
            path: "ns/rel/file.parquet".into(),
            duration_minutes: 30,
        });
        job.source_timestamp = Some(i64::MAX);
        assert!(matches!(job.cache_expiry(now), Err(JobError::InvalidCacheWindow(_))));

        // No cache window means the timestamp is never consulted.
        job.cache = None;
        assert_eq!(job.cache_expiry(now).unwrap(), None);
    }
}
