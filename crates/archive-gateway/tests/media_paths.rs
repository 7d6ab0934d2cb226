//! `GET /media/images/<name>` and `GET /media/events/<name>` must never
//! let a requested name escape the configured media directory.

use archive_gateway::http::media::safe_join;

#[test]
fn plain_name_joins_under_the_directory() {
    let path = safe_join("/var/archive/media/images", "cat.png").unwrap();
    assert_eq!(path, std::path::Path::new("/var/archive/media/images/cat.png"));
}

#[test]
fn rejects_parent_directory_traversal() {
    assert!(safe_join("/var/archive/media/images", "../../etc/passwd").is_err());
}

#[test]
fn rejects_embedded_separators() {
    assert!(safe_join("/var/archive/media/images", "a/b.png").is_err());
    assert!(safe_join("/var/archive/media/images", "a\\b.png").is_err());
}

#[test]
fn rejects_empty_name() {
    assert!(safe_join("/var/archive/media/images", "").is_err());
}

#[test]
fn rejects_bare_dotdot() {
    assert!(safe_join("/var/archive/media/images", "..").is_err());
}
