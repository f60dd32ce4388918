mod helpers;

use helpers::{memo_database, TestResult};
use palmsync_lib::pdb::{
    CategoryTable, Database, DatabaseEntries, DbAttrs, DbTimestamp, RecordAttrs, Resource,
};
use palmsync_lib::wire::TypeTag;
use palmsync_lib::SyncError;

#[test]
fn memo_database_round_trips_field_by_field() -> TestResult {
    let original = memo_database();
    let raw = original.emit()?;
    let reparsed = Database::parse(&raw)?;
    assert_eq!(reparsed.header, original.header);
    assert_eq!(reparsed.app_info, original.app_info);
    assert_eq!(reparsed.sort_info, original.sort_info);
    assert_eq!(reparsed.entries, original.entries);
    Ok(())
}

#[test]
fn category_table_survives_the_app_info_block() -> TestResult {
    let original = memo_database();
    let raw = original.emit()?;
    let reparsed = Database::parse(&raw)?;
    let block = reparsed.app_info.ok_or("MemoDB must carry an AppInfo block")?;
    let table = CategoryTable::parse(&block)?;
    assert_eq!(table.categories.len(), 2);
    assert_eq!(table.categories[0].name, "Unfiled");
    assert_eq!(table.categories[1].name, "Personal");
    assert_eq!(table.categories[1].id, 1);
    Ok(())
}

#[test]
fn record_payload_extents_follow_the_offsets() -> TestResult {
    let original = memo_database();
    let raw = original.emit()?;
    let reparsed = Database::parse(&raw)?;
    let DatabaseEntries::Records(records) = &reparsed.entries else {
        return Err("MemoDB is a record database".into());
    };
    for (n, record) in records.iter().enumerate() {
        assert_eq!(record.payload, format!("Memo #{n}").into_bytes());
    }
    Ok(())
}

#[test]
fn resource_database_round_trips() -> TestResult {
    let mut original = memo_database();
    original.header.name = "System Patch".into();
    original.header.attributes |= DbAttrs::RES_DB;
    original.app_info = None;
    original.entries = DatabaseEntries::Resources(vec![
        Resource { type_tag: TypeTag::new(*b"code"), id: 0, payload: vec![1, 2, 3] },
        Resource { type_tag: TypeTag::new(*b"boot"), id: 1, payload: vec![4, 5] },
    ]);
    let raw = original.emit()?;
    let reparsed = Database::parse(&raw)?;
    assert_eq!(reparsed, original);
    Ok(())
}

#[test]
fn emit_rejects_overlong_names() {
    let mut db = memo_database();
    db.header.name = "a".repeat(40);
    assert!(matches!(db.emit(), Err(SyncError::Validation(_))));
}

#[test]
fn parse_rejects_chained_metadata_lists() -> TestResult {
    let raw = memo_database().emit()?;
    let mut corrupted = raw.clone();
    corrupted[72] = 1; // next-list id must be zero
    assert!(matches!(Database::parse(&corrupted), Err(SyncError::Framing { .. })));
    Ok(())
}

#[test]
fn parse_rejects_decreasing_offsets() -> TestResult {
    let raw = memo_database().emit()?;
    let mut corrupted = raw.clone();
    // Second record entry starts at 72 (header) + 6 (list header) + 8.
    // Its offset field is the first 4 bytes; point it before the first one.
    let entry = 72 + 6 + 8;
    corrupted[entry..entry + 4].copy_from_slice(&100u32.to_be_bytes());
    assert!(matches!(Database::parse(&corrupted), Err(SyncError::Framing { .. })));
    Ok(())
}

// --- timestamps ----------------------------------------------------------

#[test]
fn mac_convention_timestamps_round_trip_unsigned() -> TestResult {
    // 2020-ish in seconds since 1904: top bit set.
    let stamp = DbTimestamp::Mac(0xDA60_0000);
    let raw = stamp.to_raw()?;
    assert!(raw & 0x8000_0000 != 0);
    assert_eq!(DbTimestamp::from_raw(raw), stamp);
    Ok(())
}

#[test]
fn unix_convention_timestamps_round_trip_signed() -> TestResult {
    // 1995 in seconds since 1970: top bit clear, read as the signed epoch.
    let stamp = DbTimestamp::Unix(800_000_000);
    let raw = stamp.to_raw()?;
    assert!(raw & 0x8000_0000 == 0);
    assert_eq!(DbTimestamp::from_raw(raw), stamp);
    Ok(())
}

#[test]
fn zero_is_the_canonical_epoch() -> TestResult {
    assert_eq!(DbTimestamp::from_raw(0), DbTimestamp::EPOCH);
    assert_eq!(DbTimestamp::EPOCH.to_raw()?, 0);
    Ok(())
}

#[test]
fn both_conventions_agree_on_unix_seconds() {
    let unix = DbTimestamp::Unix(1_000_000_000);
    let mac = DbTimestamp::Mac(1_000_000_000 + 2_082_844_800);
    assert_eq!(unix.unix_seconds(), mac.unix_seconds());
}

#[test]
fn negative_unix_values_cannot_be_emitted() {
    assert!(DbTimestamp::Unix(-5).to_raw().is_err());
}

// --- record attribute byte -----------------------------------------------

#[test]
fn live_records_keep_their_category() {
    let attrs = RecordAttrs::Live { category: 7, dirty: true, secret: false };
    let byte = attrs.to_byte();
    assert_eq!(byte, 0x47);
    assert_eq!(RecordAttrs::from_byte(byte), attrs);
}

#[test]
fn dead_records_keep_archive_and_lose_category() {
    let attrs = RecordAttrs::Dead { archive: true, delete: true, busy: false, secret: true };
    let byte = attrs.to_byte();
    assert_eq!(byte, 0x98);
    let decoded = RecordAttrs::from_byte(byte);
    assert_eq!(decoded, attrs);
    assert_eq!(decoded.category(), 0);
    assert!(decoded.is_archived());
}

#[test]
fn busy_alone_selects_the_dead_layout() {
    let decoded = RecordAttrs::from_byte(0x28);
    assert_eq!(
        decoded,
        RecordAttrs::Dead { archive: true, delete: false, busy: true, secret: false }
    );
}

#[test]
fn attribute_byte_round_trips_through_a_container() -> TestResult {
    let mut db = memo_database();
    let DatabaseEntries::Records(records) = &mut db.entries else {
        return Err("record database expected".into());
    };
    records[0].attributes = RecordAttrs::Dead { archive: true, delete: true, busy: false, secret: false };
    records[1].attributes = RecordAttrs::Live { category: 15, dirty: true, secret: true };
    let reparsed = Database::parse(&db.emit()?)?;
    let DatabaseEntries::Records(records) = &reparsed.entries else {
        return Err("record database expected".into());
    };
    assert!(records[0].attributes.is_deleted() && records[0].attributes.is_archived());
    assert_eq!(records[1].attributes.category(), 15);
    Ok(())
}

#[test]
fn record_ids_wider_than_24_bits_are_rejected() {
    let mut db = memo_database();
    let DatabaseEntries::Records(records) = &mut db.entries else {
        unreachable!("fixture is a record database");
    };
    records[0].unique_id = 0x0100_0000;
    assert!(matches!(db.emit(), Err(SyncError::Validation(_))));
}

#[test]
fn empty_database_round_trips() -> TestResult {
    let mut db = memo_database();
    db.app_info = None;
    db.entries = DatabaseEntries::Records(Vec::new());
    let reparsed = Database::parse(&db.emit()?)?;
    assert_eq!(reparsed, db);
    Ok(())
}
