//! Metadata store contract tests.

use std::path::{Path, PathBuf};

use local_image_search::storage::sqlite::MetadataStore;

fn open_store(tmp: &tempfile::TempDir) -> MetadataStore {
    MetadataStore::open(&tmp.path().join("metadata.db")).expect("open")
}

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

#[test]
fn add_then_get_roundtrips() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp);
    let path = PathBuf::from("/pics/dog.jpg");

    store
        .add_image(
            &path,
            &tags(&["dog", "park"]),
            &[0.5, -0.25],
            Some("2026-08-01T10:00:00"),
        )
        .unwrap();

    let record = store.get_image(&path).unwrap().expect("present");
    assert_eq!(record.path, path);
    assert_eq!(record.tags, tags(&["dog", "park"]));
    assert_eq!(record.embedding, vec![0.5, -0.25]);
    assert_eq!(record.indexed_at, "2026-08-01T10:00:00");

    assert!(store.get_image(Path::new("/pics/cat.jpg")).unwrap().is_none());
}

#[test]
fn upsert_replaces_not_merges() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp);
    let path = PathBuf::from("/pics/dog.jpg");

    store
        .add_image(&path, &tags(&["dog"]), &[1.0], None)
        .unwrap();
    store
        .add_image(&path, &tags(&["puppy", "grass"]), &[0.0, 1.0], None)
        .unwrap();

    assert_eq!(store.image_count().unwrap(), 1);
    let record = store.get_image(&path).unwrap().unwrap();
    assert_eq!(record.tags, tags(&["puppy", "grass"]));
    assert_eq!(record.embedding, vec![0.0, 1.0]);
}

#[test]
fn default_timestamp_is_filled_in() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp);
    let path = PathBuf::from("/pics/dog.jpg");

    store.add_image(&path, &tags(&["dog"]), &[1.0], None).unwrap();
    let record = store.get_image(&path).unwrap().unwrap();
    assert_eq!(record.indexed_at.len(), "2026-01-02T03:04:05".len());
}

#[test]
fn folder_query_does_not_match_sibling_prefix() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp);

    store
        .add_image(Path::new("/base/Photos/a.jpg"), &tags(&["a"]), &[1.0], None)
        .unwrap();
    store
        .add_image(
            Path::new("/base/PhotosNew/b.jpg"),
            &tags(&["b"]),
            &[1.0],
            None,
        )
        .unwrap();
    store
        .add_image(
            Path::new("/base/Photos/nested/c.jpg"),
            &tags(&["c"]),
            &[1.0],
            None,
        )
        .unwrap();

    let mut paths: Vec<String> = store
        .get_images_in_folder(Path::new("/base/Photos"))
        .unwrap()
        .into_iter()
        .map(|r| r.path.to_string_lossy().into_owned())
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["/base/Photos/a.jpg", "/base/Photos/nested/c.jpg"]);
}

#[test]
fn folder_query_matches_exact_path_degenerate_case() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp);

    store
        .add_image(Path::new("/base/oddly-a-file"), &tags(&["x"]), &[1.0], None)
        .unwrap();

    let hits = store
        .get_images_in_folder(Path::new("/base/oddly-a-file"))
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn tag_search_is_substring_and_case_sensitive() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp);

    store
        .add_image(
            Path::new("/pics/a.jpg"),
            &tags(&["mountain", "lake"]),
            &[1.0],
            None,
        )
        .unwrap();
    store
        .add_image(Path::new("/pics/b.jpg"), &tags(&["ocean"]), &[1.0], None)
        .unwrap();

    assert_eq!(store.search_by_tag("mount").unwrap().len(), 1);
    assert_eq!(store.search_by_tag("lake").unwrap().len(), 1);
    assert!(store.search_by_tag("Mountain").unwrap().is_empty());
    assert!(store.search_by_tag("forest").unwrap().is_empty());
    // LIKE wildcards in the query are literal characters.
    assert!(store.search_by_tag("%").unwrap().is_empty());
}

#[test]
fn update_tags_replaces_the_set() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp);
    let path = PathBuf::from("/pics/a.jpg");

    store
        .add_image(&path, &tags(&["old", "stale"]), &[1.0], None)
        .unwrap();
    store.update_tags(&path, &tags(&["fresh"])).unwrap();

    let record = store.get_image(&path).unwrap().unwrap();
    assert_eq!(record.tags, tags(&["fresh"]));
    // The embedding and timestamp are untouched by a tag edit.
    assert_eq!(record.embedding, vec![1.0]);
    assert!(!record.indexed_at.is_empty());
}

#[test]
fn remove_is_idempotent() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp);
    let path = PathBuf::from("/pics/a.jpg");

    store.add_image(&path, &tags(&["a"]), &[1.0], None).unwrap();
    store.remove_image(&path).unwrap();
    store.remove_image(&path).unwrap();
    store.remove_image(Path::new("/pics/never.jpg")).unwrap();
    assert_eq!(store.image_count().unwrap(), 0);
}

#[test]
fn get_all_images_lists_everything() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp);

    for i in 0..3 {
        store
            .add_image(
                Path::new(&format!("/pics/{i}.jpg")),
                &tags(&["t"]),
                &[1.0],
                None,
            )
            .unwrap();
    }
    assert_eq!(store.get_all_images().unwrap().len(), 3);
}
