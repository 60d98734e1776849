use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::CacheState;
use crate::error::{EngineError, Result};
use crate::model::Rule;
use crate::util::{now_utc_string, write_json_atomic};

pub const RULE_CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCacheFile {
    pub schema_version: u32,
    pub content_hash: String,
    pub generated_at: String,
    pub rule_count: usize,
    pub rules: Vec<Rule>,
}

#[derive(Serialize)]
struct RuleCacheRecord<'a> {
    schema_version: u32,
    content_hash: &'a str,
    generated_at: String,
    rule_count: usize,
    rules: &'a [Rule],
}

pub fn write_rule_cache(path: &Path, content_hash: &str, rules: &[Rule]) -> Result<()> {
    let record = RuleCacheRecord {
        schema_version: RULE_CACHE_SCHEMA_VERSION,
        content_hash,
        generated_at: now_utc_string(),
        rule_count: rules.len(),
        rules,
    };
    write_json_atomic(path, &record)?;

    info!(
        path = %path.display(),
        rules = rules.len(),
        content_hash = %content_hash,
        "published rule cache"
    );
    Ok(())
}

/// Rules cached for `content_hash`. A file that does not parse, or whose
/// count disagrees with its rule list, is `CacheCorrupt`.
pub fn load_rule_cache(path: &Path, content_hash: &str) -> Result<CacheState<Vec<Rule>>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(CacheState::Missing),
        Err(err) => return Err(EngineError::io(path, err)),
    };

    let file = serde_json::from_slice::<RuleCacheFile>(&data)
        .map_err(|err| EngineError::corrupt(path, err.to_string()))?;

    if file.rule_count != file.rules.len() {
        return Err(EngineError::corrupt(
            path,
            format!(
                "rule_count {} but {} rules stored",
                file.rule_count,
                file.rules.len()
            ),
        ));
    }
    if file.schema_version != RULE_CACHE_SCHEMA_VERSION {
        return Ok(CacheState::Stale(format!(
            "schema version {} (expected {RULE_CACHE_SCHEMA_VERSION})",
            file.schema_version
        )));
    }
    if file.content_hash != content_hash {
        warn!(
            path = %path.display(),
            cached = %file.content_hash,
            current = %content_hash,
            "rule cache is stale"
        );
        return Ok(CacheState::Stale("document content hash changed".to_string()));
    }

    Ok(CacheState::Fresh(file.rules))
}
