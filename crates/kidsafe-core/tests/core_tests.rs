use std::fs;
use std::io::Write;
use tempfile::TempDir;

use kidsafe_core::data_processor::{ChunkingConfig, DataProcessor};

#[test]
fn build_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let file_path = tmp.path().join("guide.txt");
    let mut f = fs::File::create(&file_path).unwrap();
    writeln!(f, "Short text").unwrap();

    let processor = DataProcessor::default();
    let corpus = processor.build(&file_path).expect("build");

    assert_eq!(corpus.len(), 1, "one small paragraph becomes one chunk");
    let chunk = &corpus.chunks()[0];
    assert_eq!(chunk.content, "Short text");
    assert_eq!(chunk.id, "guide:0");
    assert_eq!(chunk.page, 1);
}

#[test]
fn form_feeds_split_pages_and_chunk_ids_are_global() {
    let tmp = TempDir::new().unwrap();
    let file_path = tmp.path().join("labeling.txt");
    let page_one = "Added sugars must be declared.\n\nHigh fructose corn syrup is an added sugar.";
    let page_two = "Color additives such as Red 40 must be listed by name.";
    fs::write(&file_path, format!("{page_one}\u{c}\u{c}{page_two}")).unwrap();

    let processor = DataProcessor::new(ChunkingConfig::new(50, 10).unwrap());
    let corpus = processor.build(&file_path).expect("build");

    assert_eq!(corpus.pages().len(), 2, "blank page between form feeds is dropped");
    assert_eq!(corpus.pages()[1].page, 3);
    let ids: Vec<&str> = corpus.chunks().iter().map(|c| c.id.as_str()).collect();
    for (i, id) in ids.iter().enumerate() { assert_eq!(*id, format!("labeling:{i}")); }
    assert!(corpus.chunks().iter().any(|c| c.page == 3 && c.content.contains("Red 40")));
    for c in corpus.chunks() { assert!(c.content.chars().count() <= 50); }
    assert!(corpus.get("labeling:0").is_some());
}

#[test]
fn empty_document_builds_empty_corpus() {
    let tmp = TempDir::new().unwrap();
    let file_path = tmp.path().join("empty.txt");
    fs::write(&file_path, "   \n\n  ").unwrap();
    let corpus = DataProcessor::default().build(&file_path).expect("build");
    assert!(corpus.is_empty());
}

#[test]
fn missing_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    assert!(DataProcessor::default().build(&tmp.path().join("nope.txt")).is_err());
}
