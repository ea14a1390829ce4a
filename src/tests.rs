use super::*;
use chrono::NaiveDate;
use futures::TryStreamExt;
use tempfile::tempdir;

fn people() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::numeric("ID", 5, 0),
        FieldDescriptor::character("NAME", 30),
        FieldDescriptor::logical("ACTIVE")
    ]
}

#[tokio::test]
async fn test_create_append_scan() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.dbf");
    let mut table = Table::create(&path, people(), &Options::default()).await.unwrap();
    table.append_many(&[Record::new().with("ID", 1).with("NAME", "Alice").with("ACTIVE", true)]).await.unwrap();

    let mut table = Table::open(&path, &Options::default()).await.unwrap();
    assert_eq!(table.records_count(), 1);
    let rows: Vec<RecordEntry> = table.scan().try_collect().await.unwrap();
    assert_eq!(rows.len(), 1);
    match &rows[0] {
        RecordEntry::Active(record) => {
            assert_eq!(record["ID"], Value::Number(1.0));
            assert_eq!(record["NAME"], Value::Text("Alice".to_owned()));
            assert_eq!(record["ACTIVE"], Value::Logical(true));
            assert_eq!(record.iter().map(|(name, _)| name).collect::<Vec<_>>(), vec!["ID", "NAME", "ACTIVE"]);
        },
        RecordEntry::Deleted(_) => panic!("record should not be deleted")
    }
}

#[tokio::test]
async fn test_file_layout_matches_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.dbf");
    let mut table = Table::create(&path, people(), &Options::default()).await.unwrap();
    let batch: Vec<Record> = (1..=3).map(|i| Record::new().with("ID", i)).collect();
    table.append_many(&batch).await.unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let record_len = u16::from_le_bytes([bytes[10], bytes[11]]) as usize;
    let records = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    assert_eq!(header_len, 32 + 32 * 3 + 1);
    assert_eq!(record_len, 1 + 5 + 30 + 1);
    assert_eq!(records, 3);
    assert_eq!(bytes.len(), header_len + records * record_len + 1);
    assert_eq!(bytes[header_len - 1], header::HEADER_TERMINATOR);
    assert_eq!(bytes[bytes.len() - 1], header::EOF_MARKER);
}

#[tokio::test]
async fn test_reads_legacy_blank_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.dbf");
    let fields = vec![
        FieldDescriptor::numeric("QTY", 4, 0),
        FieldDescriptor::date("DUE"),
        FieldDescriptor::logical("OK")
    ];
    let meta = Header::new(Version::DBaseIIIPlus, fields, NaiveDate::from_ymd_opt(1999, 12, 31).unwrap());
    let mut bytes = meta.to_bytes().unwrap();
    bytes[4] = 3;
    bytes.extend_from_slice(b"     20240230?");
    bytes.extend_from_slice(b"    7        T");
    bytes.extend_from_slice(b"   -220240229f");
    bytes.push(header::EOF_MARKER);
    std::fs::write(&path, bytes).unwrap();

    let mut table = Table::open(&path, &Options::default()).await.unwrap();
    assert_eq!(table.last_update(), NaiveDate::from_ymd_opt(1999, 12, 31));
    let rows: Vec<Record> = table.scan().map_ok(RecordEntry::into_record).try_collect().await.unwrap();

    assert_eq!(rows[0]["QTY"], Value::Null);
    assert_eq!(rows[0]["DUE"], Value::Null);
    assert_eq!(rows[0]["OK"], Value::Null);

    assert_eq!(rows[1]["QTY"], Value::Number(7.0));
    assert_eq!(rows[1]["DUE"], Value::Null);
    assert_eq!(rows[1]["OK"], Value::Logical(true));

    assert_eq!(rows[2]["QTY"], Value::Number(-2.0));
    assert_eq!(rows[2]["DUE"], Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    assert_eq!(rows[2]["OK"], Value::Logical(false));
}

#[tokio::test]
async fn test_every_writable_type_survives_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("types.dbf");
    let fields = vec![
        FieldDescriptor::character("NAME", 12),
        FieldDescriptor::numeric("PRICE", 10, 2),
        FieldDescriptor::new("RATIO", FieldType::Float, 12).with_decimal_places(3),
        FieldDescriptor::logical("PAID"),
        FieldDescriptor::date("BORN"),
        FieldDescriptor::new("COUNT", FieldType::Integer, 4),
        FieldDescriptor::new("SEEN", FieldType::DateTime, 8),
        FieldDescriptor::new("WEIGHT", FieldType::Double, 8),
        FieldDescriptor::new("FLAGS", FieldType::NullFlags, 2)
    ];
    let seen = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap().and_hms_milli_opt(12, 30, 15, 250).unwrap();
    let record = Record::new()
        .with("NAME", "Widget")
        .with("PRICE", -1234.5)
        .with("RATIO", 3.25)
        .with("PAID", false)
        .with("BORN", NaiveDate::from_ymd_opt(1987, 6, 5).unwrap())
        .with("COUNT", -42)
        .with("SEEN", seen)
        .with("WEIGHT", 0.125)
        .with("FLAGS", vec![0x01u8, 0xFF]);

    let options = Options::default().with_file_version(Version::VisualFoxPro);
    let mut table = Table::create(&path, fields, &options).await.unwrap();
    table.append_many(&[record.clone(), Record::new()]).await.unwrap();

    table.rewind();
    let rows: Vec<Record> = table.scan().map_ok(RecordEntry::into_record).try_collect().await.unwrap();
    assert_eq!(rows[0], record);
    assert_eq!(rows[1]["NAME"], Value::from(""));
    assert_eq!(rows[1]["PRICE"], Value::Null);
    assert_eq!(rows[1]["BORN"], Value::Null);
    assert_eq!(rows[1]["SEEN"], Value::Null);
}

#[tokio::test]
async fn test_field_sizes_are_bounded_at_create() {
    let dir = tempdir().unwrap();
    let options = Options::default();

    let too_wide = Table::create(dir.path().join("a.dbf"), vec![FieldDescriptor::character("C", 256)], &options).await;
    assert!(matches!(too_wide, Err(DbfError::DescriptorInvalid { .. })));

    let logical = Table::create(dir.path().join("b.dbf"), vec![FieldDescriptor::logical("L")], &options).await;
    assert_eq!(logical.unwrap().record_len(), 2);

    let wide_logical = vec![FieldDescriptor::new("L", FieldType::Logical, 2)];
    let result = Table::create(dir.path().join("c.dbf"), wide_logical, &options).await;
    assert!(matches!(result, Err(DbfError::DescriptorInvalid { .. })));

    let memo = vec![FieldDescriptor::new("NOTE", FieldType::Memo, 10)];
    let result = Table::create(dir.path().join("d.dbf"), memo, &options.clone().with_file_version(Version::DBaseIIIPlusMemos)).await;
    assert!(matches!(result, Err(DbfError::DescriptorInvalid { .. }) | Err(DbfError::UnsupportedFieldType { .. })));
}

#[tokio::test]
async fn test_extended_decimals_need_dbase_iv_memo_tables() {
    let dir = tempdir().unwrap();
    let fields = || vec![FieldDescriptor::numeric("AMOUNT", 20, 18)];

    let plain = Table::create(dir.path().join("plain.dbf"), fields(), &Options::default()).await;
    assert!(matches!(plain, Err(DbfError::DescriptorInvalid { .. })));

    let options = Options::default().with_file_version(Version::DBaseIVMemos);
    let extended = Table::create(dir.path().join("extended.dbf"), fields(), &options).await.unwrap();
    assert_eq!(extended.fields()[0].decimal_places, 18);
    assert!(extended.memo_path().is_some());
}

#[tokio::test]
async fn test_loose_mode_tolerates_record_length_slack() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.dbf");
    Table::create(&path, people(), &Options::default()).await.unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[10..12].copy_from_slice(&40u16.to_le_bytes());
    std::fs::write(&path, bytes).unwrap();

    let strict = Table::open(&path, &Options::default()).await;
    assert!(matches!(strict, Err(DbfError::DescriptorMalformed(_))));

    let mut loose = Table::open(&path, &Options::default().read_mode(ReadMode::Loose)).await.unwrap();
    assert_eq!(loose.record_len(), 40);
    loose.append_many(&[Record::new().with("ID", 9).with("NAME", "Slack")]).await.unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, loose.header_len() + 40 + 1);

    loose.rewind();
    let rows: Vec<RecordEntry> = loose.scan().try_collect().await.unwrap();
    assert_eq!(rows[0].record()["NAME"], Value::from("Slack"));
}

#[tokio::test]
async fn test_structure_and_field_policies_are_independent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.dbf");
    let mut table = Table::create(&path, people(), &Options::default()).await.unwrap();
    table.append_many(&[Record::new().with("ID", 1).with("NAME", "x")]).await.unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0] = 0x04;
    bytes[32 + 11] = b'Q';
    std::fs::write(&path, bytes).unwrap();

    let structure_only = Tolerance { structure: Policy::Tolerate, field_types: Policy::Reject };
    let mut table = Table::open(&path, &Options::default().with_tolerance(structure_only)).await.unwrap();
    assert!(matches!(table.read_next(1).await, Err(DbfError::UnsupportedFieldType { .. })));

    let fields_only = Tolerance { structure: Policy::Reject, field_types: Policy::Tolerate };
    let result = Table::open(&path, &Options::default().with_tolerance(fields_only)).await;
    assert!(matches!(result, Err(DbfError::FormatVersionUnsupported { version: 0x04 })));
}

#[test]
fn test_get_encoding() {
    assert_eq!(get_encoding("tis-620").unwrap().name(), "windows-874");
    assert!(matches!(get_encoding("klingon"), Err(DbfError::InvalidConfiguration(_))));
}
