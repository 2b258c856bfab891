//! Build-identity qualifiers.
//!
//! A qualifier is `<root-branch>-<YYYYMMDD-HHMMSS>`: the branch of the root
//! repository plus the maximum commit author date across the whole fleet,
//! formatted fixed-width in UTC so lexicographic order matches chronological
//! order. Computing a qualifier never mutates anything; only the
//! change-detection record file is ever written.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::fleet::Fleet;

/// Default location of the persisted qualifier record.
pub const DEFAULT_RECORD_FILE: &str = ".qualifier";

/// Qualifier from the fleet's latest commit author date.
///
/// Pure function of fleet state: two calls with no intervening mutation
/// return identical strings.
pub fn compute_qualifier(fleet: &Fleet) -> Result<String> {
    let timestamp = latest_commit_date(fleet)?;
    Ok(format_qualifier(&fleet.root().current_branch()?, timestamp))
}

/// Qualifier stamped with the current wall-clock time instead of the last
/// commit instant. Distinguishes repeated builds at the same commit.
pub fn compute_now_qualifier(fleet: &Fleet) -> Result<String> {
    Ok(format_qualifier(&fleet.root().current_branch()?, Utc::now()))
}

/// Compare the current qualifier against the record at `record_path`.
///
/// An absent record counts as changed. When the qualifier differs, the
/// record is overwritten with the new value, so an unchanged fleet yields
/// `changed = false` on the next call (at-most-once transition).
pub fn has_changed(fleet: &Fleet, record_path: &Path) -> Result<(bool, String)> {
    let qualifier = compute_qualifier(fleet)?;
    let previous = match fs::read_to_string(record_path) {
        Ok(s) => Some(s.trim().to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let changed = previous.as_deref() != Some(qualifier.as_str());
    if changed {
        fs::write(record_path, &qualifier)?;
    }
    Ok((changed, qualifier))
}

fn latest_commit_date(fleet: &Fleet) -> Result<DateTime<Utc>> {
    let mut latest: Option<DateTime<Utc>> = None;
    for repo in fleet.iter_all() {
        let head = repo.head_commit()?;
        if latest.map_or(true, |l| head.author_date > l) {
            latest = Some(head.author_date);
        }
    }
    // iter_all always yields the root.
    Ok(latest.unwrap_or_else(Utc::now))
}

fn format_qualifier(branch: &str, timestamp: DateTime<Utc>) -> String {
    format!("{branch}-{}", timestamp.format("%Y%m%d-%H%M%S"))
}
