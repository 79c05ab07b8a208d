// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{TimeZone, Utc};
use kassenbuch::webdav::{
    build_backup_filename, candidate_collections, parse_backup_filename, parse_propfind,
};

#[test]
fn filename_round_trip() {
    let name = build_backup_filename("aabbccdd", "11223344", 1_700_000_000);
    assert_eq!(name, "KassenbuchBackup_useraabbccdd_device11223344_1700000000.json");
    let (user, device, ts) = parse_backup_filename(&name).unwrap();
    assert_eq!(user, "aabbccdd");
    assert_eq!(device, "11223344");
    assert_eq!(ts, 1_700_000_000);
}

#[test]
fn foreign_filenames_are_rejected() {
    assert!(parse_backup_filename("notes.txt").is_none());
    assert!(parse_backup_filename("KassenbuchBackup_useraabbccdd.json").is_none());
    // Uppercase hex is not produced by this app.
    assert!(
        parse_backup_filename("KassenbuchBackup_userAABBCCDD_device11223344_1700000000.json")
            .is_none()
    );
    // Trailing garbage after the extension.
    assert!(
        parse_backup_filename("KassenbuchBackup_useraabbccdd_device11223344_1700000000.json.bak")
            .is_none()
    );
}

#[test]
fn propfind_parsing_is_namespace_agnostic() {
    let xml = r#"<?xml version="1.0"?>
    <D:multistatus xmlns:D="DAV:">
      <D:response>
        <D:href>/remote.php/dav/files/u/backups/</D:href>
        <D:propstat><D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop></D:propstat>
      </D:response>
      <D:response>
        <D:href>/remote.php/dav/files/u/backups/KassenbuchBackup_useraabbccdd_device11223344_1700000000.json</D:href>
        <D:propstat><D:prop>
          <D:getlastmodified>Tue, 14 Nov 2023 22:13:20 GMT</D:getlastmodified>
          <D:getcontentlength>2048</D:getcontentlength>
          <D:resourcetype/>
        </D:prop></D:propstat>
      </D:response>
      <D:response>
        <D:href>/remote.php/dav/files/u/backups/unrelated.json</D:href>
        <D:propstat><D:prop><D:resourcetype/></D:prop></D:propstat>
      </D:response>
    </D:multistatus>"#;

    let entries = parse_propfind(xml);
    assert_eq!(entries.len(), 1);
    let e = &entries[0];
    assert_eq!(e.user_id, "aabbccdd");
    assert_eq!(e.device_id, "11223344");
    assert_eq!(e.timestamp, 1_700_000_000);
    assert_eq!(e.size, Some(2048));
    assert_eq!(
        e.last_modified,
        Some(Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap())
    );
}

#[test]
fn propfind_handles_unprefixed_tags() {
    let xml = r#"<multistatus xmlns="DAV:">
      <response>
        <href>/dav/KassenbuchBackup_userdeadbeef_devicecafef00d_1650000000.json</href>
        <propstat><prop><getcontentlength>10</getcontentlength></prop></propstat>
      </response>
    </multistatus>"#;
    let entries = parse_propfind(xml);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, "deadbeef");
    assert_eq!(entries[0].last_modified, None);
}

#[test]
fn unparsable_last_modified_becomes_none() {
    let xml = r#"<d:multistatus xmlns:d="DAV:">
      <d:response>
        <d:href>/KassenbuchBackup_useraabbccdd_device11223344_1700000000.json</d:href>
        <d:propstat><d:prop>
          <d:getlastmodified>sometime last week</d:getlastmodified>
        </d:prop></d:propstat>
      </d:response>
    </d:multistatus>"#;
    let entries = parse_propfind(xml);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].last_modified, None);
}

#[test]
fn candidate_chain_walks_parent_and_root() {
    let candidates = candidate_collections(
        "https://dav.example.com/backups/KassenbuchBackup_useraabbccdd_device11223344_1.json",
    );
    assert_eq!(
        candidates,
        vec![
            "https://dav.example.com/backups/KassenbuchBackup_useraabbccdd_device11223344_1.json"
                .to_string(),
            "https://dav.example.com/backups".to_string(),
            "https://dav.example.com/".to_string(),
        ]
    );

    let plain = candidate_collections("https://dav.example.com/backups/");
    assert_eq!(
        plain,
        vec![
            "https://dav.example.com/backups/".to_string(),
            "https://dav.example.com/".to_string(),
        ]
    );
}
