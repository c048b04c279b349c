use bytes::Bytes;
use memsync::{FileId, ServiceAccountKey, SyncAction};
use memsync_drive::{
    oauth2::{GetToken, Scope, ServiceAccount},
    storage::{gdrive::UPLOAD_CHUNK_SZ, CreateFile, FindFiles, UpdateFile},
    SyncHandle,
};

use crate::{
    stubs::drive_server::{http_client, ChunkPut, DriveServer, StaticToken, STATIC_TOKEN},
    utils::TempDir,
};

const TARGET: &str = "memory.json";
const TEST_KEY_PEM: &str = include_str!("../data/test_key.pem");

fn service_account(server: &DriveServer) -> ServiceAccount {
    let json = serde_json::json!({
        "type": "service_account",
        "client_email": "memsync@test.iam.gserviceaccount.com",
        "private_key": TEST_KEY_PEM,
        "private_key_id": "test-key-1",
        "token_uri": server.token_uri(),
    });
    let key = ServiceAccountKey::from_json(&json.to_string()).unwrap();
    ServiceAccount::new(key, Some(http_client())).unwrap()
}

fn payload(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

#[tokio::test]
async fn list_follows_next_page_token() {
    crate::init_log();
    let server = DriveServer::start().await;
    server.set_page_size(2);
    let ids: Vec<FileId> = (0..5)
        .map(|i| server.insert(TARGET, None, false, &format!("{i}")))
        .collect();
    server.insert("other.json", None, false, "[]");
    let drive = server.drive(StaticToken);

    let files = drive.find_files(TARGET, None).await.unwrap();
    let found: Vec<FileId> = files.into_iter().map(|f| f.id).collect();
    assert_eq!(found, ids);

    let queries = server.list_queries();
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[0].get("pageToken"), None);
    assert_eq!(queries[1].get("pageToken").map(String::as_str), Some("2"));
    assert_eq!(queries[2].get("pageToken").map(String::as_str), Some("4"));
    for q in &queries {
        assert_eq!(
            q.get("q").map(String::as_str),
            Some("name = 'memory.json' and trashed = false")
        );
        assert_eq!(q.get("orderBy").map(String::as_str), Some("createdTime"));
    }
    assert!(server.bearers().iter().all(|b| b == STATIC_TOKEN));
}

#[tokio::test]
async fn list_skips_trashed_and_scopes_folder() {
    crate::init_log();
    let server = DriveServer::start().await;
    server.insert(TARGET, Some("notes"), true, "trashed");
    let live = server.insert(TARGET, Some("notes"), false, "live");
    let drive = server.drive(StaticToken);

    let folder = FileId::from("notes");
    let files = drive.find_files(TARGET, Some(&folder)).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, live);
    assert_eq!(files[0].name, TARGET);
    assert_eq!(files[0].parents, vec![folder]);

    let q = server.list_queries()[0].get("q").cloned().unwrap();
    assert!(q.ends_with(" and 'notes' in parents"), "{q}");
}

#[tokio::test]
async fn create_sends_metadata_then_content() {
    crate::init_log();
    let server = DriveServer::start().await;
    let drive = server.drive(StaticToken);
    let folder = FileId::from("notes");

    let file = drive
        .create_file(TARGET, Some(&folder), Bytes::from_static(b"[]"))
        .await
        .unwrap();
    assert_eq!(file.name, TARGET);
    assert_eq!(file.parents, vec![folder]);

    let stored = server.file(&file.id).unwrap();
    assert_eq!(stored.content, b"[]");
    assert_eq!(
        server.metadata(),
        vec![serde_json::json!({
            "name": TARGET,
            "mimeType": "application/json",
            "parents": ["notes"],
        })]
    );
    assert_eq!(
        server.puts(),
        vec![ChunkPut {
            content_range: None,
            len: 2
        }]
    );
}

#[tokio::test]
async fn update_overwrites_content() {
    crate::init_log();
    let server = DriveServer::start().await;
    let id = server.insert(TARGET, None, false, "[]");
    let drive = server.drive(StaticToken);

    let content = Bytes::from_static(b"[{\"entry\": \"x\"}]");
    let file = drive.update_file(&id, content.clone()).await.unwrap();
    assert_eq!(file.id, id);

    assert_eq!(server.file(&id).unwrap().content, content.to_vec());
    assert_eq!(server.file_count(), 1);
    // PATCH opens the session without metadata
    assert!(server.metadata().is_empty());
}

#[tokio::test]
async fn update_missing_file() {
    crate::init_log();
    let server = DriveServer::start().await;
    let drive = server.drive(StaticToken);

    let err = drive
        .update_file(&FileId::from("gone"), Bytes::from_static(b"[]"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(server.puts().is_empty());
}

#[tokio::test]
async fn large_upload_is_chunked() {
    crate::init_log();
    let server = DriveServer::start().await;
    let drive = server.drive(StaticToken);
    let len = 2 * UPLOAD_CHUNK_SZ + 100;
    let data = payload(len);

    let file = drive.create_file(TARGET, None, data.clone()).await.unwrap();

    assert_eq!(server.file(&file.id).unwrap().content, data.to_vec());
    let c = UPLOAD_CHUNK_SZ;
    assert_eq!(
        server.puts(),
        vec![
            ChunkPut {
                content_range: Some(format!("bytes 0-{}/{len}", c - 1)),
                len: c,
            },
            ChunkPut {
                content_range: Some(format!("bytes {c}-{}/{len}", 2 * c - 1)),
                len: c,
            },
            ChunkPut {
                content_range: Some(format!("bytes {}-{}/{len}", 2 * c, len - 1)),
                len: 100,
            },
        ]
    );
}

#[tokio::test]
async fn upload_resumes_from_stored_range() {
    crate::init_log();
    let server = DriveServer::start().await;
    server.store_at_most(1000);
    let drive = server.drive(StaticToken);
    let data = payload(2500);

    let file = drive.create_file(TARGET, None, data.clone()).await.unwrap();

    assert_eq!(server.file(&file.id).unwrap().content, data.to_vec());
    assert_eq!(
        server.puts(),
        vec![
            ChunkPut {
                content_range: None,
                len: 2500,
            },
            ChunkPut {
                content_range: Some("bytes 1000-2499/2500".into()),
                len: 1500,
            },
            ChunkPut {
                content_range: Some("bytes 2000-2499/2500".into()),
                len: 500,
            },
        ]
    );
}

#[tokio::test]
async fn stalled_upload_fails() {
    crate::init_log();
    let server = DriveServer::start().await;
    server.store_at_most(0);
    let drive = server.drive(StaticToken);

    let err = drive
        .create_file(TARGET, None, payload(10))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(308));
    assert_eq!(server.puts().len(), 1);
    assert_eq!(server.file_count(), 0);
}

#[tokio::test]
async fn error_status_is_kept() {
    crate::init_log();
    let server = DriveServer::start().await;
    server.fail_with(403, "rate limit exceeded");
    let drive = server.drive(StaticToken);

    let err = drive
        .create_file(TARGET, None, Bytes::from_static(b"[]"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert!(err.to_string().contains("rate limit exceeded"), "{err}");

    let err = drive.find_files(TARGET, None).await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert!(matches!(err, memsync::Error::Remote { .. }));
}

#[tokio::test]
async fn check_access_reads_about() {
    crate::init_log();
    let server = DriveServer::start().await;
    let drive = server.drive(StaticToken);

    let about = drive.check_access().await.unwrap();
    assert_eq!(about.user.display_name, "Memsync Test");
    assert_eq!(
        about.user.email_address.as_deref(),
        Some("memsync@test.iam.gserviceaccount.com")
    );
    assert_eq!(about.storage_quota.usage, Some(1073741824));
    assert!(about.storage_quota.describe_usage().is_some());
}

#[tokio::test]
async fn service_account_token_is_cached() {
    crate::init_log();
    let server = DriveServer::start().await;
    let auth = service_account(&server);

    let scopes = vec![Scope::new("https://www.googleapis.com/auth/drive".into())];
    let first = auth.get_token(scopes.clone()).await.unwrap();
    let second = auth.get_token(scopes).await.unwrap();
    assert_eq!(first.secret(), "token-1");
    assert_eq!(second.secret(), "token-1");
    assert_eq!(server.token_forms().len(), 1);

    let other = vec![Scope::new("https://www.googleapis.com/auth/drive.metadata.readonly".into())];
    let third = auth.get_token(other).await.unwrap();
    assert_eq!(third.secret(), "token-2");

    let forms = server.token_forms();
    assert_eq!(forms.len(), 2);
    let assertion = forms[0].get("assertion").unwrap();
    assert_eq!(assertion.split('.').count(), 3);
}

#[tokio::test]
async fn drive_requests_reuse_service_account_token() {
    crate::init_log();
    let server = DriveServer::start().await;
    let drive = server.drive(service_account(&server));

    drive.find_files(TARGET, None).await.unwrap();
    drive.find_files(TARGET, None).await.unwrap();
    drive
        .create_file(TARGET, None, Bytes::from_static(b"[]"))
        .await
        .unwrap();

    // listing and uploading use different scopes, each fetched once
    assert_eq!(server.token_forms().len(), 2);
    assert_eq!(
        server.bearers(),
        vec!["token-1", "token-1", "token-2", "token-2"]
    );
}

#[tokio::test]
async fn mirror_over_http() {
    crate::init_log();
    let server = DriveServer::start().await;
    let handle = SyncHandle::configure(server.drive(StaticToken), TARGET, None).unwrap();
    let dir = TempDir::new();
    let store = dir.store().await;

    store.append("buy milk").await.unwrap();
    let res = handle.sync(store.path()).await.unwrap();
    assert_eq!(res.action(), Some(SyncAction::Created));
    let id = res.remote_id().unwrap().clone();

    store.append("call bob").await.unwrap();
    let res = handle.sync(store.path()).await.unwrap();
    assert_eq!(res.action(), Some(SyncAction::Updated));
    assert_eq!(res.remote_id(), Some(&id));

    let local = tokio::fs::read(store.path()).await.unwrap();
    assert_eq!(server.file(&id).unwrap().content, local);
    assert_eq!(server.file_count(), 1);
}
