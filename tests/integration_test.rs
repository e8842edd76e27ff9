use bulkstore::{BulkStorage, HeaderError, StorageError};
use std::io::Cursor;
use tempfile::NamedTempFile;

#[tokio::test]
async fn e3_reopen_preserves_blobs_across_sync_close_open() {
    let (private_pem, public_pem) = BulkStorage::gen_key("integration-pass").unwrap();
    let public_key = bulkstore::crypto::load_public_key(&public_pem).unwrap();
    let tmp = NamedTempFile::new().unwrap();

    let uuid_s1;
    {
        let mut storage = BulkStorage::create_default(tmp.path(), &public_key)
            .await
            .unwrap();
        let r1 = storage.add(Cursor::new(b"S1 contents".to_vec())).await.unwrap();
        storage.add(Cursor::new(b"S2 contents".to_vec())).await.unwrap();
        storage.add(Cursor::new(b"S3 contents".to_vec())).await.unwrap();
        uuid_s1 = r1.uuid;

        storage.sync(&public_key).await.unwrap();
        storage.close().await.unwrap();
    }

    let mut reopened = BulkStorage::open(tmp.path(), &private_pem, "integration-pass")
        .await
        .unwrap();
    assert_eq!(reopened.records().len(), 3);
    let bytes = reopened.get(uuid_s1).await.unwrap().unwrap();
    assert_eq!(bytes, b"S1 contents".to_vec());
}

#[tokio::test]
async fn e7_bad_magic_is_incompatible_file() {
    let (_private_pem, public_pem) = BulkStorage::gen_key("pass").unwrap();
    let public_key = bulkstore::crypto::load_public_key(&public_pem).unwrap();
    let tmp = NamedTempFile::new().unwrap();

    {
        let mut storage = BulkStorage::create_default(tmp.path(), &public_key)
            .await
            .unwrap();
        storage.close().await.unwrap();
    }

    // Corrupt the magic bytes directly on disk.
    let mut bytes = std::fs::read(tmp.path()).unwrap();
    bytes[0] = b'X';
    std::fs::write(tmp.path(), bytes).unwrap();

    let (private_pem, _) = BulkStorage::gen_key("pass").unwrap();
    let err = BulkStorage::open(tmp.path(), &private_pem, "pass")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::IncompatibleFile(_)));
}

#[tokio::test]
async fn reopen_fails_with_wrong_passphrase() {
    let (private_pem, public_pem) = BulkStorage::gen_key("correct-pass").unwrap();
    let public_key = bulkstore::crypto::load_public_key(&public_pem).unwrap();
    let tmp = NamedTempFile::new().unwrap();
    {
        let mut storage = BulkStorage::create_default(tmp.path(), &public_key)
            .await
            .unwrap();
        storage.close().await.unwrap();
    }

    let err = BulkStorage::open(tmp.path(), &private_pem, "wrong-pass")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::CryptoFailure(_)));
}

#[tokio::test]
async fn header_round_trip_survives_arbitrary_toc_start() {
    let (private_pem, public_pem) = BulkStorage::gen_key("header-pass").unwrap();
    let public_key = bulkstore::crypto::load_public_key(&public_pem).unwrap();
    let private_key = bulkstore::crypto::load_private_key(&private_pem, "header-pass").unwrap();

    let header = bulkstore::Header::new([11u8; 32], [22u8; 16], 999_999);
    let bin = header.to_binary(&public_key).unwrap();
    let back = bulkstore::Header::from_bytes(&bin, &private_key).unwrap();
    assert_eq!(back.toc_info.toc_start, 999_999);

    let mut bad_version = bin;
    bad_version[5] = b'9';
    assert!(matches!(
        bulkstore::Header::from_bytes(&bad_version, &private_key),
        Err(HeaderError::UnsupportedVersion(_))
    ));
}
