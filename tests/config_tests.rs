//! Config file and credential loading.

use dropdex::ConfigError;
use dropdex::source::MemorySource;
use dropdex::utils::config::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_ATTEMPTS};
use dropdex::utils::{Settings, load_credentials};
use std::path::{Path, PathBuf};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dropdex_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

// --- dropdex.toml ---

#[test]
fn test_settings_from_toml() {
    let s = Settings::from_toml_str(
        r#"
[dropbox]
credential_file = "creds.json"
team_member_ids = ["dbmid:a", " dbmid:b ", ""]

[settings]
db_path = "index.db"
workers = 8
dedupe_acl = true
max_content_bytes = 1024
"#,
        Path::new("/etc/dropdex"),
    )
    .unwrap();
    assert_eq!(
        s.credential_path().unwrap(),
        PathBuf::from("/etc/dropdex/creds.json")
    );
    assert_eq!(s.opts.allow_list.len(), 2);
    assert!(s.opts.allow_list.contains("dbmid:b"));
    assert_eq!(s.opts.db_path, Some(PathBuf::from("/etc/dropdex/index.db")));
    assert_eq!(s.opts.workers, 8);
    assert!(s.opts.acl_policy.dedupe);
    assert_eq!(s.opts.max_content_bytes, 1024);
    assert_eq!(s.opts.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(s.opts.max_attempts, DEFAULT_MAX_ATTEMPTS);
}

#[test]
fn test_empty_credential_file_rejected() {
    let s = Settings::from_toml_str("[dropbox]\ncredential_file = \"  \"\n", Path::new(".")).unwrap();
    assert!(matches!(
        s.credential_path(),
        Err(ConfigError::MissingCredentialFile)
    ));
    let s = Settings::from_toml_str("", Path::new(".")).unwrap();
    assert!(matches!(
        s.credential_path(),
        Err(ConfigError::MissingCredentialFile)
    ));
}

#[test]
fn test_unknown_config_key_rejected() {
    assert!(Settings::from_toml_str("[settings]\nthreads = 4\n", Path::new(".")).is_err());
}

#[test]
fn test_missing_config_file() {
    let dir = scratch_dir("missing_config");
    let path = dir.join("dropdex.toml");
    assert!(matches!(
        Settings::load(&path),
        Err(ConfigError::Unreadable { .. })
    ));
    let defaults = Settings::load_or_default(&path).unwrap();
    assert_eq!(defaults.dir, dir);
    assert!(defaults.opts.allow_list.is_empty());
}

// --- credentials ---

#[test]
fn test_credentials_with_access_token() {
    let dir = scratch_dir("creds_ok");
    std::fs::write(dir.join("creds.json"), r#"{"access_token":"sl.abc"}"#).unwrap();
    let creds = load_credentials(&dir.join("creds.json"), &dir).unwrap();
    assert!(creds.usable_access_token().is_some());
}

#[test]
fn test_expired_token_needs_refresh_details() {
    let dir = scratch_dir("creds_expired");
    std::fs::write(
        dir.join("expired.json"),
        r#"{"access_token":"sl.old","expires_at":1000}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("refreshable.json"),
        r#"{"access_token":"sl.old","expires_at":1000,"refresh_token":"r","app_key":"k"}"#,
    )
    .unwrap();

    if std::env::var("DROPDEX_ACCESS_TOKEN").is_err() {
        assert!(matches!(
            load_credentials(&dir.join("expired.json"), &dir),
            Err(ConfigError::NoAccessToken)
        ));
        let creds = load_credentials(&dir.join("refreshable.json"), &dir).unwrap();
        assert!(creds.usable_access_token().is_none());
    }
}

#[test]
fn test_bad_credential_file() {
    let dir = scratch_dir("creds_bad");
    std::fs::write(dir.join("bad.json"), "not json").unwrap();
    assert!(matches!(
        load_credentials(&dir.join("bad.json"), &dir),
        Err(ConfigError::Invalid { .. })
    ));
    assert!(matches!(
        load_credentials(&dir.join("absent.json"), &dir),
        Err(ConfigError::Unreadable { .. })
    ));
    assert!(matches!(
        load_credentials(Path::new(""), &dir),
        Err(ConfigError::MissingCredentialFile)
    ));
}

#[test]
fn test_credentials_next_to_relative_config() {
    let dir = PathBuf::from(format!("dropdex_relative_cfg_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("dropdex.toml"),
        "[dropbox]\ncredential_file = \"creds.json\"\n",
    )
    .unwrap();
    std::fs::write(dir.join("creds.json"), r#"{"access_token":"sl.abc"}"#).unwrap();

    let settings = Settings::load(&dir.join("dropdex.toml")).unwrap();
    let path = settings.credential_path().unwrap();
    assert_eq!(path, dir.join("creds.json"));
    let loaded = load_credentials(&path, &settings.dir);
    std::fs::remove_dir_all(&dir).unwrap();
    assert!(loaded.unwrap().usable_access_token().is_some());
}

// --- fixtures ---

#[test]
fn test_fixture_file_loads() {
    let dir = scratch_dir("fixture");
    let path = dir.join("team.json");
    std::fs::write(
        &path,
        r#"{
  "members": [[{"id": "dbmid:a", "display_name": "Alice", "email": "alice@example.com"}]],
  "folders": {"dbmid:a:": [[{"kind": "file", "name": "a.txt", "path": "/a.txt",
                              "downloadable": true, "server_modified": "2024-01-01T12:00:00Z", "size": 2}]]},
  "file_members": {"dbmid:a:/a.txt": [[{"user": "dbmid:a"}]]},
  "files": {"dbmid:a:/a.txt": {"content_type": "text/plain", "text": "hi"}}
}"#,
    )
    .unwrap();
    let src = MemorySource::from_fixture_file(&path).unwrap();
    let e = dropdex::engine::list_principals(&src, &Default::default()).unwrap();
    assert_eq!(e.roots.len(), 1);
    assert_eq!(e.roots[0].key, "Alice");
}
