//! Integration tests for the sync engine against the model server.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata_core::StoreConfig;
use strata_sync_engine::{
    HttpTransport, LoopbackClient, LoopbackServer, Operation, ProgressEvent, SyncConfig,
    SyncEngine, SyncError, SyncState,
};
use strata_sync_server::ModelServer;
use strata_testkit::scenarios::{
    filled, foo_project, project_with_results, FOO_RESULT_A, FOO_RESULT_A_SIZE, FOO_RESULT_B,
};
use strata_testkit::trees::{assert_snapshot_matches, read_tree_excluding};
use strata_testkit::{memory_store, SyncFixture, TestProject, LOOPBACK_URL};

/// Counts requests before handing them to the model server.
struct CountingServer {
    inner: Arc<ModelServer>,
    posts: AtomicUsize,
}

impl LoopbackServer for CountingServer {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        self.inner.handle_post(path, body)
    }
}

#[test]
fn import_then_incremental_commit() {
    let fixture = SyncFixture::new();
    let project = foo_project();

    // 1. First commit uploads everything
    let first = fixture
        .engine
        .import_project(project.root_file(), "foo", "initial import", true)
        .unwrap();
    assert_eq!(first.version, "1");
    assert_eq!(
        first.uploaded,
        vec![
            PathBuf::from("foo.main"),
            PathBuf::from("foo/Result/a.txt"),
            PathBuf::from("foo/Result/b.txt"),
        ]
    );
    assert!(first.deleted.is_empty());
    assert_snapshot_matches(project.dir(), &project.cache_dir(), "1");
    // Two entities per file.
    assert_eq!(fixture.backend.document_count("foo"), 6);

    // 2. Same-size edit of a.txt, b.txt removed
    project.write(FOO_RESULT_A, &filled(b'A', FOO_RESULT_A_SIZE));
    project.touch(FOO_RESULT_A);
    project.remove(FOO_RESULT_B);

    let plan = fixture
        .engine
        .pending_changes(project.root_file(), "foo", true)
        .unwrap();
    assert_eq!(plan.uploads, vec![PathBuf::from(FOO_RESULT_A)]);
    assert_eq!(plan.deleted, vec!["Files/foo/Result/b.txt".to_string()]);

    let second = fixture
        .engine
        .commit_project(project.root_file(), "foo", "edit results", true)
        .unwrap();
    assert_eq!(second.version, "2");
    assert_eq!(second.uploaded, plan.uploads);
    assert_eq!(second.deleted, plan.deleted);
    assert_eq!(fixture.backend.document_count("foo"), 8);

    let status = fixture
        .engine
        .open_project(project.root_file(), "foo")
        .unwrap();
    assert_eq!(status.version, "2");

    let versions = fixture.engine.list_versions("foo").unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].file_count, 3);
    assert_eq!(versions[1].file_count, 2);
    assert_eq!(versions[1].message, "edit results");
}

#[test]
fn unmodified_project_has_empty_plan() {
    let fixture = SyncFixture::new();
    let project = foo_project();
    fixture
        .engine
        .import_project(project.root_file(), "foo", "initial import", true)
        .unwrap();

    let plan = fixture
        .engine
        .pending_changes(project.root_file(), "foo", true)
        .unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.considered.len(), 3);

    // A touched file with equal bytes is not uploaded either.
    project.touch(FOO_RESULT_A);
    let plan = fixture
        .engine
        .pending_changes(project.root_file(), "foo", true)
        .unwrap();
    assert!(plan.is_empty());
}

#[test]
fn excluding_results_reports_them_deleted() {
    let fixture = SyncFixture::new();
    let project = foo_project();
    fixture
        .engine
        .import_project(project.root_file(), "foo", "initial import", true)
        .unwrap();

    let plan = fixture
        .engine
        .pending_changes(project.root_file(), "foo", false)
        .unwrap();
    assert!(plan.uploads.is_empty());
    assert_eq!(
        plan.deleted,
        vec![
            "Files/foo/Result/a.txt".to_string(),
            "Files/foo/Result/b.txt".to_string(),
        ]
    );
}

#[test]
fn cached_get_needs_no_service() {
    let (backend, store) = memory_store();
    let model = Arc::new(ModelServer::with_backend(Default::default(), backend).unwrap());
    let counting = Arc::new(CountingServer {
        inner: model,
        posts: AtomicUsize::new(0),
    });
    let transport = HttpTransport::new(LOOPBACK_URL, LoopbackClient::new(Arc::clone(&counting)));
    let engine = SyncEngine::new(SyncConfig::new(LOOPBACK_URL), store, transport);

    let project = foo_project();
    engine
        .import_project(project.root_file(), "foo", "initial import", true)
        .unwrap();
    let original = read_tree_excluding(project.dir(), &project.cache_dir());

    project.write(FOO_RESULT_A, b"changed contents of a");
    project.touch(FOO_RESULT_A);
    project.remove(FOO_RESULT_B);
    engine
        .commit_project(project.root_file(), "foo", "second", true)
        .unwrap();

    let before = counting.posts.load(Ordering::SeqCst);
    let outcome = engine.get_project(project.root_file(), "foo", "1").unwrap();
    assert!(outcome.from_cache);
    assert_eq!(outcome.files, 3);
    assert_eq!(counting.posts.load(Ordering::SeqCst), before);
    assert_eq!(
        read_tree_excluding(project.dir(), &project.cache_dir()),
        original
    );
    assert_eq!(
        engine.current_version(project.root_file(), "foo").unwrap(),
        "1"
    );
    assert_eq!(engine.stats().cache_hits, 1);
}

#[test]
fn fresh_clone_downloads_version() {
    let fixture = SyncFixture::new();
    let project = foo_project();
    fixture
        .engine
        .import_project(project.root_file(), "foo", "initial import", true)
        .unwrap();
    project.write(FOO_RESULT_A, b"second contents");
    project.touch(FOO_RESULT_A);
    fixture
        .engine
        .commit_project(project.root_file(), "foo", "second", true)
        .unwrap();

    let clone = TestProject::empty("foo");
    let other = fixture.second_client();
    let outcome = other.get_project(clone.root_file(), "foo", "2").unwrap();
    assert!(!outcome.from_cache);
    assert_eq!(outcome.files, 3);
    assert_eq!(
        read_tree_excluding(clone.dir(), &clone.cache_dir()),
        read_tree_excluding(project.dir(), &project.cache_dir())
    );
    assert_snapshot_matches(clone.dir(), &clone.cache_dir(), "2");

    // The clone is now under version control and can commit.
    let status = other.open_project(clone.root_file(), "foo").unwrap();
    assert_eq!(status.version, "2");
    assert!(other
        .pending_changes(clone.root_file(), "foo", true)
        .unwrap()
        .is_empty());
}

#[test]
fn unknown_version_fails_restore() {
    let fixture = SyncFixture::new();
    let project = foo_project();
    fixture
        .engine
        .import_project(project.root_file(), "foo", "initial import", true)
        .unwrap();

    let clone = TestProject::empty("foo");
    let result = fixture.engine.get_project(clone.root_file(), "foo", "7");
    assert!(matches!(result, Err(SyncError::RestoreFailed { .. })));
    assert!(!clone.cache_dir().join("7").exists());
    assert_eq!(fixture.engine.state(), SyncState::Idle);

    let last = fixture.progress.events().pop().unwrap();
    assert!(matches!(last, ProgressEvent::Error(Operation::Get, _)));
}

#[test]
fn foreign_cache_is_rejected() {
    let fixture = SyncFixture::new();
    let project = foo_project();
    fixture
        .engine
        .import_project(project.root_file(), "foo", "initial import", true)
        .unwrap();

    let result = fixture
        .engine
        .commit_project(project.root_file(), "bar", "wrong project", true);
    assert!(matches!(result, Err(SyncError::CacheConsistency { .. })));
    let result = fixture.engine.get_project(project.root_file(), "bar", "1");
    assert!(matches!(result, Err(SyncError::CacheConsistency { .. })));
    // Nothing was touched.
    assert!(project.exists(FOO_RESULT_B));
}

#[test]
fn progress_is_monotonic() {
    let fixture = SyncFixture::new();
    let project = project_with_results("bar", 6, 32);
    fixture
        .engine
        .import_project(project.root_file(), "bar", "initial import", true)
        .unwrap();

    let percentages = fixture.progress.percentages(Operation::Import);
    assert_eq!(percentages.first(), Some(&0));
    assert_eq!(percentages.last(), Some(&100));
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]));
    assert!(matches!(
        fixture.progress.events().last(),
        Some(ProgressEvent::Success(Operation::Import, _))
    ));
}

#[test]
fn write_queue_batches_uploads() {
    let project = project_with_results("bar", 5, 100);
    let fixture = SyncFixture::new();
    fixture
        .engine
        .import_project(project.root_file(), "bar", "one batch", true)
        .unwrap();
    assert_eq!(fixture.backend.stats().insert_batches, 1);
    assert!(!fixture.engine.store().is_queue_writing());

    let project = project_with_results("bar", 5, 100);
    let small = SyncFixture::with_config(
        SyncConfig::new(LOOPBACK_URL),
        StoreConfig::new().flush_threshold(64),
    );
    small
        .engine
        .import_project(project.root_file(), "bar", "many batches", true)
        .unwrap();
    assert!(small.backend.stats().insert_batches > 1);
    assert_eq!(small.engine.store().pending_writes(), 0);
    assert_eq!(small.backend.document_count("bar"), 12);
}

mod properties {
    use super::*;
    use proptest::prelude::*;
    use std::time::{Duration, SystemTime};
    use strata_testkit::{result_tree_strategy, PropTestConfig};

    proptest! {
        #![proptest_config(PropTestConfig::filesystem().to_proptest_config())]

        #[test]
        fn clone_reproduces_any_result_tree(files in result_tree_strategy(8)) {
            let fixture = SyncFixture::new();
            let project = TestProject::new("bar");
            let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
            for (path, bytes) in &files {
                project.write_with_mtime(&format!("bar/Result/{path}"), bytes, stamp);
            }

            let outcome = fixture
                .engine
                .import_project(project.root_file(), "bar", "generated", true)
                .unwrap();
            prop_assert_eq!(outcome.uploaded.len(), files.len() + 1);
            prop_assert!(fixture
                .engine
                .pending_changes(project.root_file(), "bar", true)
                .unwrap()
                .is_empty());

            let clone = TestProject::empty("bar");
            let restored = fixture
                .second_client()
                .get_project(clone.root_file(), "bar", &outcome.version)
                .unwrap();
            prop_assert_eq!(restored.files, files.len() + 1);
            prop_assert_eq!(
                read_tree_excluding(clone.dir(), &clone.cache_dir()),
                read_tree_excluding(project.dir(), &project.cache_dir())
            );
        }
    }
}
