//! Directory-listing parser tables (spec.md §4.4/§8): UNIX, DOS, and
//! MLSx listing lines parsed into the tagged `DirectoryEntry` shapes.

use chrono::Datelike;
use ftps_client::parser::{parse_dos_listing, parse_mlsx_listing, parse_unix_listing};
use ftps_client::{DirectoryEntry, EntryKind};

#[test]
fn unix_listing_scenario_from_spec_yields_four_entries() {
    let raw = "-rw-r--r-- 1 u g 12 Jan 2 2020 a.txt\r\n".repeat(4);
    let listing = parse_unix_listing(&raw);

    assert!(listing.errors.is_empty());
    assert_eq!(listing.entries.len(), 4);
    for entry in &listing.entries {
        assert_eq!(entry.name(), "a.txt");
        assert_eq!(entry.kind(), EntryKind::File);
        assert_eq!(entry.common().size, Some(12));
        match entry {
            DirectoryEntry::Unix(e) => {
                assert_eq!(e.owner, "u");
                assert_eq!(e.group, "g");
                assert_eq!(e.permissions, "-rw-r--r--");
            }
            other => panic!("expected a Unix entry, got {other:?}"),
        }
    }
}

#[test]
fn unix_listing_directory_and_symlink_kinds() {
    let raw = "drwxr-xr-x 3 u g 4096 Mar 5 2021 sub\r\n\
               lrwxrwxrwx 1 u g 7 Mar 5 2021 link -> target\r\n";
    let listing = parse_unix_listing(raw);
    assert_eq!(listing.entries.len(), 2);

    match &listing.entries[0] {
        DirectoryEntry::Unix(e) => assert_eq!(e.common.kind, EntryKind::Dir),
        other => panic!("expected a Unix entry, got {other:?}"),
    }
    match &listing.entries[1] {
        DirectoryEntry::Unix(e) => {
            assert_eq!(e.common.kind, EntryKind::Symlink);
            assert_eq!(e.link_target.as_deref(), Some("target"));
        }
        other => panic!("expected a Unix entry, got {other:?}"),
    }
}

#[test]
fn unix_listing_keeps_malformed_lines_as_errors_not_a_hard_failure() {
    let raw = "-rw-r--r-- 1 u g 12 Jan 2 2020 a.txt\r\nthis is not a listing line\r\n";
    let listing = parse_unix_listing(raw);
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.errors.len(), 1);
    assert_eq!(listing.errors[0].line, "this is not a listing line");
}

#[test]
fn dos_listing_parses_directory_and_file() {
    let raw = "03-05-21  10:30AM       <DIR>          sub\r\n\
               03-05-21  10:31AM             1830 hatch.c\r\n";
    let listing = parse_dos_listing(raw);
    assert_eq!(listing.entries.len(), 2);

    match &listing.entries[0] {
        DirectoryEntry::Dos(e) => {
            assert_eq!(e.common.name, "sub");
            assert_eq!(e.common.kind, EntryKind::Dir);
            assert_eq!(e.common.size, None);
        }
        other => panic!("expected a Dos entry, got {other:?}"),
    }
    match &listing.entries[1] {
        DirectoryEntry::Dos(e) => {
            assert_eq!(e.common.name, "hatch.c");
            assert_eq!(e.common.kind, EntryKind::File);
            assert_eq!(e.common.size, Some(1830));
        }
        other => panic!("expected a Dos entry, got {other:?}"),
    }
}

/// Literal spec.md §8 scenario 4: `type=file;size=1830;modify=19940916055648;perm=r; hatch.c`
#[test]
fn mlsx_listing_scenario_from_spec() {
    let raw = "type=file;size=1830;modify=19940916055648;perm=r; hatch.c\r\n";
    let listing = parse_mlsx_listing(raw);

    assert!(listing.errors.is_empty());
    assert_eq!(listing.entries.len(), 1);
    match &listing.entries[0] {
        DirectoryEntry::Mlsx(e) => {
            assert_eq!(e.common.name, "hatch.c");
            assert_eq!(e.common.kind, EntryKind::File);
            assert_eq!(e.common.size, Some(1830));
            let modified = e.common.modified.expect("modify fact should parse");
            assert_eq!(modified.year(), 1994);
            assert_eq!(modified.month(), 9);
            assert_eq!(modified.day(), 16);
            assert_eq!(e.facts.get("perm").map(String::as_str), Some("r"));
        }
        other => panic!("expected a Mlsx entry, got {other:?}"),
    }
}

#[test]
fn mlsx_listing_filters_dot_and_dot_dot_entries() {
    let raw = "type=cdir;perm=el; .\r\ntype=pdir;perm=el; ..\r\ntype=file;size=1; a\r\n";
    let listing = parse_mlsx_listing(raw);
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.entries[0].name(), "a");
}
