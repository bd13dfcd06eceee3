//! Directory listing parsers (spec.md §4.5).
//!
//! Three independent, pure-function parsers — UNIX `ls -l`, DOS/IIS
//! `dir`, and MLSx (RFC 3659) — each producing the matching tagged
//! `DirectoryEntry` variant. The façade (`client.rs::get_dir_list`)
//! decides which parser to run based on the listing method actually
//! used; no per-line format sniffing happens here. A malformed line is
//! reported as a `ListingParseError` alongside its raw text; the rest of
//! the listing still parses.

use crate::types::{
    DirectoryEntry, DirectoryListing, DosEntry, EntryCommon, EntryKind, ListingParseError,
    MlsxEntry, MlsxTypeSentinel, UnixEntry,
};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use regex::Regex;
use std::collections::HashMap;

fn is_dot_entry(name: &str) -> bool {
    name == "." || name == ".."
}

fn push_result(
    listing: &mut DirectoryListing,
    line: &str,
    result: Result<Option<DirectoryEntry>, String>,
) {
    match result {
        Ok(Some(entry)) if !is_dot_entry(entry.name()) => listing.entries.push(entry),
        Ok(_) => {}
        Err(message) => listing.errors.push(ListingParseError {
            line: line.to_string(),
            message,
        }),
    }
}

// ─── MLSx parser ──────────────────────────────────────────────────────

pub fn parse_mlsx_listing(raw: &str) -> DirectoryListing {
    let mut listing = DirectoryListing::default();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        push_result(&mut listing, line, parse_mlsx_line(line.trim()));
    }
    listing
}

fn parse_mlsx_line(line: &str) -> Result<Option<DirectoryEntry>, String> {
    let (facts_str, name) = if let Some(pos) = line.find("; ") {
        (&line[..pos + 1], line[pos + 2..].to_string())
    } else if let Some(pos) = line.rfind(' ') {
        (&line[..pos], line[pos + 1..].to_string())
    } else {
        return Err(format!("no filename separator in MLSx line: {}", line));
    };

    if name.is_empty() {
        return Err(format!("empty filename in MLSx line: {}", line));
    }

    let mut facts: HashMap<String, String> = HashMap::new();
    for segment in facts_str.split(';') {
        let segment = segment.trim();
        if let Some((k, v)) = segment.split_once('=') {
            facts.insert(k.to_lowercase(), v.to_string());
        }
    }

    let type_value = facts.get("type").map(|s| s.to_lowercase());
    let (kind, sentinel) = match type_value.as_deref() {
        Some("cdir") => (EntryKind::Dir, MlsxTypeSentinel::CurrentDir),
        Some("pdir") => (EntryKind::Dir, MlsxTypeSentinel::ParentDir),
        Some("dir") => (EntryKind::Dir, MlsxTypeSentinel::Entry),
        Some("file") => (EntryKind::File, MlsxTypeSentinel::Entry),
        Some(other) if other.contains("symlink") || other.contains("slink") => {
            (EntryKind::Symlink, MlsxTypeSentinel::Entry)
        }
        Some(_) => (EntryKind::Other, MlsxTypeSentinel::Entry),
        None => return Err(format!("missing 'type' fact in MLSx line: {}", line)),
    };

    let size = facts.get("size").and_then(|v| v.parse::<u64>().ok());
    let modified = facts.get("modify").and_then(|v| parse_mlsx_time(v));

    Ok(Some(DirectoryEntry::Mlsx(MlsxEntry {
        common: EntryCommon {
            name,
            parent_path: None,
            size,
            modified,
            kind,
            raw: line.to_string(),
        },
        sentinel,
        facts,
    })))
}

/// `YYYYMMDDHHMMSS[.fraction]`, UTC.
fn parse_mlsx_time(s: &str) -> Option<DateTime<Utc>> {
    let base = if s.len() >= 14 { &s[..14] } else { s };
    NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

// ─── UNIX parser ──────────────────────────────────────────────────────

pub fn parse_unix_listing(raw: &str) -> DirectoryListing {
    let mut listing = DirectoryListing::default();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        push_result(&mut listing, line, parse_unix_line(line.trim()));
    }
    listing
}

fn unix_regex() -> Regex {
    Regex::new(
        r"(?x)
        ^([dlcbps-][rwxsStT-]{9})\s+     # permissions
        (\d+)\s+                          # link count
        (\S+)\s+                          # owner
        (\S+)\s+                          # group
        (\d+)\s+                          # size
        (\w{3}\s+\d{1,2}\s+[\d:]+)\s+    # date
        (.+)$                              # filename (possibly with -> target)
        ",
    )
    .expect("static unix listing regex")
}

fn parse_unix_line(line: &str) -> Result<Option<DirectoryEntry>, String> {
    let caps = unix_regex()
        .captures(line)
        .ok_or_else(|| format!("line does not match UNIX listing format: {}", line))?;

    let perms = caps.get(1).unwrap().as_str();
    let link_count = caps.get(2).unwrap().as_str().parse::<u32>().unwrap_or(0);
    let owner = caps.get(3).unwrap().as_str().to_string();
    let group = caps.get(4).unwrap().as_str().to_string();
    let size = caps.get(5).unwrap().as_str().parse::<u64>().unwrap_or(0);
    let date_str = caps.get(6).unwrap().as_str();
    let name_raw = caps.get(7).unwrap().as_str();

    let kind = match perms.as_bytes().first() {
        Some(b'd') => EntryKind::Dir,
        Some(b'l') => EntryKind::Symlink,
        Some(b'-') => EntryKind::File,
        _ => EntryKind::Other,
    };

    let (name, link_target) = if kind == EntryKind::Symlink {
        match name_raw.find(" -> ") {
            Some(pos) => (
                name_raw[..pos].to_string(),
                Some(name_raw[pos + 4..].to_string()),
            ),
            None => (name_raw.to_string(), None),
        }
    } else {
        (name_raw.to_string(), None)
    };

    let modified = parse_unix_date(date_str);

    Ok(Some(DirectoryEntry::Unix(UnixEntry {
        common: EntryCommon {
            name,
            parent_path: None,
            size: Some(size),
            modified,
            kind,
            raw: line.to_string(),
        },
        permissions: perms.to_string(),
        link_count,
        owner,
        group,
        link_target,
    })))
}

/// `Jan  1 12:00` (current/previous year implied) or `Jan  1  2025`.
fn parse_unix_date(s: &str) -> Option<DateTime<Utc>> {
    let normalised: String = s.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Ok(dt) = NaiveDateTime::parse_from_str(
        &format!("{} {}", Utc::now().format("%Y"), normalised),
        "%Y %b %d %H:%M",
    ) {
        // An `HH:MM` entry carries no year, so `ls` assumes the current
        // one — but that guess reads more than ~6 months into the future
        // for anything from roughly July through December when parsed
        // early in the following year. Roll it back a year in that case.
        let dt = if dt > Utc::now().naive_utc() + ChronoDuration::days(180) {
            NaiveDate::from_ymd_opt(dt.year() - 1, dt.month(), dt.day())
                .and_then(|d| d.and_hms_opt(dt.hour(), dt.minute(), 0))
                .unwrap_or(dt)
        } else {
            dt
        };
        return Some(Utc.from_utc_datetime(&dt));
    }

    if let Ok(date) = NaiveDate::parse_from_str(&normalised, "%b %d %Y") {
        let dt = date.and_time(NaiveTime::from_hms_opt(0, 0, 0)?);
        return Some(Utc.from_utc_datetime(&dt));
    }

    None
}

// ─── DOS parser ───────────────────────────────────────────────────────

pub fn parse_dos_listing(raw: &str) -> DirectoryListing {
    let mut listing = DirectoryListing::default();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        push_result(&mut listing, line, parse_dos_line(line.trim()));
    }
    listing
}

fn dos_regex() -> Regex {
    Regex::new(
        r"(?x)
        ^(\d{2}-\d{2}-\d{2})\s+          # date
        (\d{1,2}:\d{2}(?:AM|PM)?)\s+     # time
        (<DIR>|\d+)\s+                    # size or <DIR>
        (.+)$                              # filename
        ",
    )
    .expect("static dos listing regex")
}

fn parse_dos_line(line: &str) -> Result<Option<DirectoryEntry>, String> {
    let caps = dos_regex()
        .captures(line)
        .ok_or_else(|| format!("line does not match DOS listing format: {}", line))?;

    let date_str = caps.get(1).unwrap().as_str();
    let time_str = caps.get(2).unwrap().as_str();
    let size_or_dir = caps.get(3).unwrap().as_str();
    let name = caps.get(4).unwrap().as_str().to_string();

    let (kind, size) = if size_or_dir == "<DIR>" {
        (EntryKind::Dir, None)
    } else {
        (EntryKind::File, size_or_dir.parse::<u64>().ok())
    };

    let modified = parse_dos_date(date_str, time_str);

    Ok(Some(DirectoryEntry::Dos(DosEntry {
        common: EntryCommon {
            name,
            parent_path: None,
            size,
            modified,
            kind,
            raw: line.to_string(),
        },
    })))
}

fn parse_dos_date(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let combined = format!("{} {}", date, time);
    if let Ok(dt) = NaiveDateTime::parse_from_str(&combined, "%m-%d-%y %I:%M%p") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&combined, "%m-%d-%y %H:%M") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_file() {
        let line = "-rw-r--r--   1 user group  1234 Jan  1 12:00 readme.txt";
        let listing = parse_unix_listing(line);
        assert!(listing.errors.is_empty());
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].name(), "readme.txt");
        assert_eq!(listing.entries[0].kind(), EntryKind::File);
        assert_eq!(listing.entries[0].common().size, Some(1234));
    }

    #[test]
    fn unix_dir() {
        let line = "drwxr-xr-x   2 root root  4096 Mar  1 09:30 subdir";
        let listing = parse_unix_listing(line);
        assert_eq!(listing.entries[0].kind(), EntryKind::Dir);
    }

    #[test]
    fn unix_symlink() {
        let line = "lrwxrwxrwx   1 root root    22 Jan  5 08:00 link -> /var/target";
        let listing = parse_unix_listing(line);
        assert_eq!(listing.entries[0].kind(), EntryKind::Symlink);
        match &listing.entries[0] {
            DirectoryEntry::Unix(e) => assert_eq!(e.link_target.as_deref(), Some("/var/target")),
            _ => panic!("expected Unix entry"),
        }
    }

    #[test]
    fn unix_listing_keeps_malformed_lines_as_errors() {
        let raw = "not a listing line\n-rw-r--r--   1 u g  12 Jan  2 2020 a.txt";
        let listing = parse_unix_listing(raw);
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.errors.len(), 1);
        assert_eq!(listing.errors[0].line, "not a listing line");
    }

    #[test]
    fn mlsx_file_with_facts() {
        let line = "type=file;size=1830;modify=19940916055648;perm=r; hatch.c";
        let listing = parse_mlsx_listing(line);
        assert_eq!(listing.entries.len(), 1);
        match &listing.entries[0] {
            DirectoryEntry::Mlsx(e) => {
                assert_eq!(e.common.name, "hatch.c");
                assert_eq!(e.common.kind, EntryKind::File);
                assert_eq!(e.common.size, Some(1830));
                assert_eq!(
                    e.common.modified,
                    Some(Utc.with_ymd_and_hms(1994, 9, 16, 5, 56, 48).unwrap())
                );
                assert_eq!(e.facts.get("perm").map(String::as_str), Some("r"));
            }
            _ => panic!("expected Mlsx entry"),
        }
    }

    #[test]
    fn mlsx_filters_dot_entries() {
        let raw = "type=cdir;; .\ntype=pdir;; ..\ntype=file;size=10;; real.txt";
        let listing = parse_mlsx_listing(raw);
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].name(), "real.txt");
    }

    #[test]
    fn dos_directory_entry() {
        let line = "01-01-26  12:00AM      <DIR> My Documents";
        let listing = parse_dos_listing(line);
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].kind(), EntryKind::Dir);
        assert_eq!(listing.entries[0].name(), "My Documents");
    }
}
