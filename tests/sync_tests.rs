//! End-to-end sync runs against an in-memory team and an in-memory index.

use chrono::{DateTime, TimeZone, Utc};
use dropdex::engine::db_ops::{
    ApplyOutcome, Phase, begin_generation, enqueue, identity_counts, item_count, load_checkpoint,
    load_item, open_db_in_memory, queue_len,
};
use dropdex::pipeline::{refetch_item, run_content_sync, run_identity_sync};
use dropdex::source::MemorySource;
use dropdex::{Descriptor, FolderEntry, Grant, Group, GroupMember, Opts, Reader, TeamMember};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
}

fn member(id: &str, name: &str, email: &str) -> TeamMember {
    TeamMember {
        id: id.to_string(),
        display_name: name.to_string(),
        email: Some(email.to_string()),
    }
}

/// Alice: /Docs (with /Docs/b.txt unless `drop_b`) and /a.txt. Bob: shared /Team.
fn team(drop_b: bool) -> MemorySource {
    let docs = if drop_b {
        vec![vec![]]
    } else {
        vec![vec![FolderEntry::file("b.txt", "/Docs/b.txt", ts(2), 5)]]
    };
    MemorySource::new()
        .with_members(vec![
            vec![member("dbmid:a", "Alice", "alice@example.com")],
            vec![member("dbmid:b", "Bob", "bob@example.com")],
        ])
        .with_folder(
            "dbmid:a",
            "",
            vec![vec![
                FolderEntry::folder("Docs", "/Docs", None),
                FolderEntry::file("a.txt", "/a.txt", ts(1), 5),
            ]],
        )
        .with_folder("dbmid:a", "/Docs", docs)
        .with_file_members("dbmid:a", "/a.txt", vec![vec![Grant::User("dbmid:a".into())]])
        .with_file_members(
            "dbmid:a",
            "/Docs/b.txt",
            vec![vec![
                Grant::User("dbmid:a".into()),
                Grant::Group("Engineering".into()),
            ]],
        )
        .with_file("dbmid:a", "/a.txt", "text/plain", b"hello")
        .with_file("dbmid:a", "/Docs/b.txt", "text/plain", b"world")
        .with_folder(
            "dbmid:b",
            "",
            vec![vec![FolderEntry::folder("Team", "/Team", Some("sf1"))]],
        )
        .with_container_members(
            "sf1",
            vec![
                vec![Grant::User("dbmid:b".into())],
                vec![Grant::Group("Engineering".into())],
            ],
        )
}

fn opts() -> Opts {
    Opts {
        workers: 2,
        batch_size: 2,
        ..Opts::default()
    }
}

const ALL_KEYS: [&str; 6] = [
    "Alice",
    "Alice/Docs",
    "Alice/a.txt",
    "Alice/Docs/b.txt",
    "Bob",
    "Bob/Team",
];

// --- content sync ---

#[test]
fn test_full_sync_indexes_every_node() {
    let src = Arc::new(team(false));
    let mut conn = open_db_in_memory().unwrap();
    let stats = run_content_sync(src.clone(), &mut conn, &opts(), None).unwrap();

    assert_eq!(stats.roots, 2);
    assert_eq!(stats.added, 6);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.remaining, 0);
    assert_eq!(item_count(&conn).unwrap(), 6);
    for key in ALL_KEYS {
        assert!(load_item(&conn, key).unwrap().is_some(), "missing {key}");
    }

    let cp = load_checkpoint(&conn).unwrap();
    assert_eq!(cp.generation, 1);
    assert_eq!(cp.phase, Phase::Idle);
    assert_eq!(queue_len(&conn).unwrap(), 0);

    let file = load_item(&conn, "Alice/Docs/b.txt").unwrap().unwrap();
    assert_eq!(file.content.as_deref(), Some(&b"world"[..]));
    assert_eq!(
        file.acl,
        vec![
            Reader::User("dbmid:a".into()),
            Reader::Group("Engineering".into())
        ]
    );
    let shared = load_item(&conn, "Bob/Team").unwrap().unwrap();
    assert_eq!(
        shared.acl,
        vec![
            Reader::User("dbmid:b".into()),
            Reader::Group("Engineering".into())
        ]
    );
}

#[test]
fn test_second_sync_is_unchanged() {
    let src = Arc::new(team(false));
    let mut conn = open_db_in_memory().unwrap();
    run_content_sync(src.clone(), &mut conn, &opts(), None).unwrap();
    let stats = run_content_sync(src.clone(), &mut conn, &opts(), None).unwrap();

    assert_eq!(stats.added, 0);
    assert_eq!(stats.unchanged, 6);
    assert_eq!(stats.swept, 0);
    assert_eq!(load_checkpoint(&conn).unwrap().generation, 2);
}

#[test]
fn test_removed_file_is_swept() {
    let mut conn = open_db_in_memory().unwrap();
    run_content_sync(Arc::new(team(false)), &mut conn, &opts(), None).unwrap();
    let stats = run_content_sync(Arc::new(team(true)), &mut conn, &opts(), None).unwrap();

    assert_eq!(stats.swept, 1);
    assert_eq!(stats.unchanged, 5);
    assert!(load_item(&conn, "Alice/Docs/b.txt").unwrap().is_none());
    assert_eq!(item_count(&conn).unwrap(), 5);
}

#[test]
fn test_allow_list_limits_roots() {
    let src = Arc::new(team(false));
    let mut conn = open_db_in_memory().unwrap();
    let opts = Opts {
        allow_list: ["dbmid:b".to_string()].into_iter().collect::<HashSet<_>>(),
        ..opts()
    };
    let stats = run_content_sync(src, &mut conn, &opts, None).unwrap();
    assert_eq!(stats.roots, 1);
    assert_eq!(stats.added, 2);
    assert!(load_item(&conn, "Alice").unwrap().is_none());
}

#[test]
fn test_failure_keeps_generation_open_then_resumes() {
    let src = Arc::new(team(false));
    src.fail_on("list_file_members:dbmid:a:/a.txt");
    let mut conn = open_db_in_memory().unwrap();
    let opts = Opts {
        max_attempts: 2,
        ..opts()
    };

    let stats = run_content_sync(src.clone(), &mut conn, &opts, None).unwrap();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.remaining, 1);
    assert_eq!(stats.added, 5);
    let cp = load_checkpoint(&conn).unwrap();
    assert_eq!(cp.phase, Phase::Traversing);
    assert_eq!(cp.generation, 1);

    src.heal("list_file_members:dbmid:a:/a.txt");
    let stats = run_content_sync(src.clone(), &mut conn, &opts, None).unwrap();
    assert_eq!(stats.roots, 0);
    assert_eq!(stats.added, 1);
    assert_eq!(stats.remaining, 0);
    let cp = load_checkpoint(&conn).unwrap();
    assert_eq!(cp.phase, Phase::Idle);
    assert_eq!(cp.generation, 1);
    assert_eq!(item_count(&conn).unwrap(), 6);
}

#[test]
fn test_failed_folder_blocks_sweep() {
    let mut conn = open_db_in_memory().unwrap();
    run_content_sync(Arc::new(team(false)), &mut conn, &opts(), None).unwrap();

    let src = Arc::new(team(false));
    src.fail_on("list_folder:dbmid:a:/Docs");
    let opts = Opts {
        max_attempts: 1,
        ..opts()
    };
    let stats = run_content_sync(src, &mut conn, &opts, None).unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.swept, 0);
    assert_eq!(item_count(&conn).unwrap(), 6);
    let untouched = load_item(&conn, "Alice/Docs/b.txt").unwrap().unwrap();
    assert_eq!(untouched.generation, 1);
}

/// Alice's root lists every name in `listed`; only the names in `stored` can be downloaded.
fn alice(listed: &[&str], stored: &[&str]) -> MemorySource {
    let entries = listed
        .iter()
        .map(|name| FolderEntry::file(name, &format!("/{name}"), ts(1), 2))
        .collect();
    let mut src = MemorySource::new()
        .with_members(vec![vec![member("dbmid:a", "Alice", "alice@example.com")]])
        .with_folder("dbmid:a", "", vec![entries]);
    for name in stored {
        src = src.with_file("dbmid:a", &format!("/{name}"), "text/plain", b"hi");
    }
    src
}

#[test]
fn test_vanished_file_does_not_block_later_syncs() {
    let mut conn = open_db_in_memory().unwrap();
    let stats = run_content_sync(
        Arc::new(alice(&["gone.txt"], &[])),
        &mut conn,
        &opts(),
        None,
    )
    .unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.remaining, 0);
    let cp = load_checkpoint(&conn).unwrap();
    assert_eq!(cp.phase, Phase::Idle);
    assert_eq!(cp.generation, 1);
    assert!(load_item(&conn, "Alice/gone.txt").unwrap().is_none());

    let src = Arc::new(alice(&["gone.txt", "new.txt"], &["new.txt"]));
    let stats = run_content_sync(src, &mut conn, &opts(), None).unwrap();
    assert_eq!(stats.roots, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(load_checkpoint(&conn).unwrap().generation, 2);
    assert!(load_item(&conn, "Alice/new.txt").unwrap().is_some());
}

#[test]
fn test_skipped_file_keeps_previous_copy_until_unlisted() {
    let mut conn = open_db_in_memory().unwrap();
    run_content_sync(
        Arc::new(alice(&["a.txt"], &["a.txt"])),
        &mut conn,
        &opts(),
        None,
    )
    .unwrap();

    let stats = run_content_sync(Arc::new(alice(&["a.txt"], &[])), &mut conn, &opts(), None)
        .unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.swept, 0);
    let kept = load_item(&conn, "Alice/a.txt").unwrap().unwrap();
    assert_eq!(kept.generation, 2);

    let stats = run_content_sync(Arc::new(alice(&[], &[])), &mut conn, &opts(), None).unwrap();
    assert_eq!(stats.swept, 1);
    assert!(load_item(&conn, "Alice/a.txt").unwrap().is_none());
}

#[test]
fn test_resumes_are_bounded() {
    let src = Arc::new(team(false));
    src.fail_on("list_folder:dbmid:b:");
    let mut conn = open_db_in_memory().unwrap();
    let opts = Opts {
        max_attempts: 1,
        max_resumes: 1,
        ..opts()
    };

    run_content_sync(src.clone(), &mut conn, &opts, None).unwrap();
    let stats = run_content_sync(src.clone(), &mut conn, &opts, None).unwrap();
    assert_eq!(stats.roots, 0);
    assert_eq!(load_checkpoint(&conn).unwrap().resumes, 1);

    let stats = run_content_sync(src.clone(), &mut conn, &opts, None).unwrap();
    assert_eq!(stats.roots, 2);
    let cp = load_checkpoint(&conn).unwrap();
    assert_eq!(cp.generation, 2);
    assert_eq!(cp.phase, Phase::Traversing);

    src.heal("list_folder:dbmid:b:");
    let stats = run_content_sync(src, &mut conn, &opts, None).unwrap();
    assert_eq!(stats.remaining, 0);
    let cp = load_checkpoint(&conn).unwrap();
    assert_eq!(cp.generation, 2);
    assert_eq!(cp.phase, Phase::Idle);
    assert_eq!(item_count(&conn).unwrap(), 6);
}

#[test]
fn test_restart_discards_open_generation() {
    let src = Arc::new(team(false));
    src.fail_on("list_folder:dbmid:b:");
    let mut conn = open_db_in_memory().unwrap();
    let failing = Opts {
        max_attempts: 1,
        ..opts()
    };
    run_content_sync(src.clone(), &mut conn, &failing, None).unwrap();
    assert_eq!(load_checkpoint(&conn).unwrap().phase, Phase::Traversing);

    src.heal("list_folder:dbmid:b:");
    let restart = Opts {
        restart: true,
        ..opts()
    };
    let stats = run_content_sync(src, &mut conn, &restart, None).unwrap();
    assert_eq!(stats.roots, 2);
    let cp = load_checkpoint(&conn).unwrap();
    assert_eq!(cp.generation, 2);
    assert_eq!(cp.phase, Phase::Idle);
    assert_eq!(item_count(&conn).unwrap(), 6);
}

#[test]
fn test_cancelled_sync_resumes() {
    let src = Arc::new(team(false));
    let mut conn = open_db_in_memory().unwrap();
    let cancel = Arc::new(AtomicBool::new(true));
    assert!(run_content_sync(src.clone(), &mut conn, &opts(), Some(cancel)).is_err());
    assert_eq!(load_checkpoint(&conn).unwrap().phase, Phase::Traversing);
    assert_eq!(queue_len(&conn).unwrap(), 2);

    let stats = run_content_sync(src, &mut conn, &opts(), None).unwrap();
    assert_eq!(stats.roots, 0);
    assert_eq!(stats.added, 6);
    assert_eq!(load_checkpoint(&conn).unwrap().generation, 1);
}

#[test]
fn test_undecodable_queue_entry_deletes_item() {
    let src = Arc::new(team(false));
    let mut conn = open_db_in_memory().unwrap();
    run_content_sync(src.clone(), &mut conn, &opts(), None).unwrap();

    begin_generation(&mut conn).unwrap();
    let junk = Descriptor {
        key: "Alice/a.txt".to_string(),
        payload: b"\xffjunk".to_vec(),
    };
    enqueue(&conn, &junk, 0).unwrap();
    let stats = run_content_sync(src, &mut conn, &opts(), None).unwrap();
    assert_eq!(stats.deleted, 1);
    assert!(load_item(&conn, "Alice/a.txt").unwrap().is_none());
}

// --- single item refetch ---

#[test]
fn test_refetch_item() {
    let mut conn = open_db_in_memory().unwrap();
    run_content_sync(Arc::new(team(false)), &mut conn, &opts(), None).unwrap();

    let same = team(false);
    assert_eq!(
        refetch_item(&same, &conn, "Alice/a.txt", &opts()).unwrap(),
        ApplyOutcome::Unchanged
    );

    let changed = team(false).with_file("dbmid:a", "/a.txt", "text/plain", b"hello again");
    assert_eq!(
        refetch_item(&changed, &conn, "Alice/a.txt", &opts()).unwrap(),
        ApplyOutcome::Modified
    );
    let item = load_item(&conn, "Alice/a.txt").unwrap().unwrap();
    assert_eq!(item.content.as_deref(), Some(&b"hello again"[..]));
    assert_eq!(item.generation, 1);

    assert!(refetch_item(&same, &conn, "Alice/missing.txt", &opts()).is_err());
}

// --- identity sync ---

#[test]
fn test_identity_sync_replaces_tables() {
    let src = team(false)
        .with_groups(vec![vec![Group {
            id: "g1".into(),
            name: "Engineering".into(),
        }]])
        .with_group_members(
            "g1",
            vec![vec![
                GroupMember {
                    member_id: "dbmid:a".into(),
                    email: Some("alice@example.com".into()),
                },
                GroupMember {
                    member_id: "dbmid:b".into(),
                    email: None,
                },
            ]],
        );
    let mut conn = open_db_in_memory().unwrap();
    let stats = run_identity_sync(&src, &mut conn).unwrap();
    assert_eq!(stats.users, 2);
    assert_eq!(stats.groups, 1);
    assert_eq!(stats.memberships, 1);
    assert_eq!(identity_counts(&conn).unwrap(), (2, 1, 1));
}

#[test]
fn test_identity_sync_failure_keeps_previous_tables() {
    let src = team(false).with_groups(vec![vec![Group {
        id: "g1".into(),
        name: "Engineering".into(),
    }]]);
    let mut conn = open_db_in_memory().unwrap();
    run_identity_sync(&src, &mut conn).unwrap();

    src.fail_on("list_group_members:g1");
    assert!(run_identity_sync(&src, &mut conn).is_err());
    assert_eq!(identity_counts(&conn).unwrap(), (2, 1, 0));
}
