//! Search engine tests over a real indexed folder (hash backend).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use local_image_search::app::AppContext;
use local_image_search::search::merge_hybrid;

fn open_ctx(tmp: &tempfile::TempDir) -> Arc<AppContext> {
    Arc::new(AppContext::open(&tmp.path().join("data")).expect("open context"))
}

fn indexed_folder(tmp: &tempfile::TempDir, ctx: &AppContext) -> PathBuf {
    let folder = tmp.path().join("photos");
    fs::create_dir_all(&folder).unwrap();
    for name in ["mountain_lake.jpg", "ocean_wave.png", "city_night.gif"] {
        fs::write(folder.join(name), format!("image-bytes:{name}")).unwrap();
    }
    assert!(ctx.sync.start_indexing(&folder));
    folder
}

#[test]
fn tag_search_finds_caption_tags() {
    let tmp = tempfile::TempDir::new().unwrap();
    let ctx = open_ctx(&tmp);
    let folder = indexed_folder(&tmp, &ctx);

    let hits = ctx.search.search_by_tag("mountain").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, folder.join("mountain_lake.jpg"));
    assert!(hits[0].tags.contains(&"mountain".to_string()));
    assert!(!hits[0].indexed_at.is_empty());

    assert!(ctx.search.search_by_tag("forest").unwrap().is_empty());
}

#[test]
fn semantic_search_returns_identity_only_hits() {
    let tmp = tempfile::TempDir::new().unwrap();
    let ctx = open_ctx(&tmp);
    let folder = indexed_folder(&tmp, &ctx);

    let hits = ctx.search.search_semantic("mountain lake", 2).unwrap();
    assert_eq!(hits.len(), 2);

    let indexed: HashSet<PathBuf> = ["mountain_lake.jpg", "ocean_wave.png", "city_night.gif"]
        .iter()
        .map(|n| folder.join(n))
        .collect();
    for hit in &hits {
        assert!(indexed.contains(&hit.path));
        assert!(hit.tags.is_empty());
        assert!(hit.indexed_at.is_empty());
    }
}

#[test]
fn semantic_search_may_return_fewer_than_top_k() {
    let tmp = tempfile::TempDir::new().unwrap();
    let ctx = open_ctx(&tmp);
    indexed_folder(&tmp, &ctx);

    let hits = ctx.search.search_semantic("anything at all", 50).unwrap();
    assert_eq!(hits.len(), 3);
}

#[test]
fn semantic_search_rejects_zero_top_k() {
    let tmp = tempfile::TempDir::new().unwrap();
    let ctx = open_ctx(&tmp);
    indexed_folder(&tmp, &ctx);

    assert!(ctx.search.search_semantic("anything", 0).is_err());
}

#[test]
fn hybrid_keeps_lists_separate_and_merge_dedups_with_tag_priority() {
    let tmp = tempfile::TempDir::new().unwrap();
    let ctx = open_ctx(&tmp);
    let folder = indexed_folder(&tmp, &ctx);

    // top_k = 3 guarantees the semantic list also contains the tag hit,
    // exercising the dedup path.
    let hybrid = ctx.search.search_hybrid("snow peaks", "mountain", 3).unwrap();
    assert_eq!(hybrid.tag_results.len(), 1);
    assert_eq!(hybrid.semantic_results.len(), 3);

    let merged = merge_hybrid(&hybrid);
    assert_eq!(merged.len(), 3);
    assert_eq!(merged[0].path, folder.join("mountain_lake.jpg"));
    // The overlapping path surfaces once, with tag-derived metadata.
    assert!(!merged[0].tags.is_empty());
    let unique: HashSet<&Path> = merged.iter().map(|r| r.path.as_path()).collect();
    assert_eq!(unique.len(), merged.len());
}

#[test]
fn searches_on_an_empty_index_are_empty() {
    let tmp = tempfile::TempDir::new().unwrap();
    let ctx = open_ctx(&tmp);

    assert!(ctx.search.search_by_tag("anything").unwrap().is_empty());
    assert!(ctx.search.search_semantic("anything", 5).unwrap().is_empty());
}
