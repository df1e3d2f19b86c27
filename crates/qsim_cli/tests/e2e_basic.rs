use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn bin() -> Command {
    let path = assert_cmd::cargo::cargo_bin!("qsim");
    Command::new(path)
}

fn write_txt(dir: &Path, name: &str, paragraphs: &[&str]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, paragraphs.join("\n")).unwrap();
    path
}

fn write_docx(dir: &Path, name: &str, paragraphs: &[&str]) -> PathBuf {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    );

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("word/document.xml", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(xml.as_bytes()).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn json_stdout(assert: &assert_cmd::assert::Assert) -> Value {
    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&output).unwrap()
}

#[test]
fn groups_similar_questions_across_papers() {
    let dir = TempDir::new().unwrap();
    let a = write_txt(dir.path(), "a.txt", &["What is gravity?", "The sky is blue."]);
    let b = write_txt(dir.path(), "b.txt", &["Explain gravity.", "The sky is blue."]);

    let assert = bin()
        .args(["analyze", "--extension", "txt", "--threshold", "0.4", "--format", "json"])
        .arg(&a)
        .arg(&b)
        .assert()
        .success();

    let json = json_stdout(&assert);
    let groups = json.as_object().unwrap();
    assert_eq!(groups.len(), 1);
    let matches = json["What is gravity? (Paper 1)"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["question"], "Explain gravity.");
    assert_eq!(matches[0]["source"], "Paper 2");
    assert!(matches[0]["score"].as_f64().unwrap() >= 0.4);
}

#[test]
fn reads_docx_papers_and_renders_text_report() {
    let dir = TempDir::new().unwrap();
    let a = write_docx(dir.path(), "paper1.docx", &["Define momentum.", "Good luck!"]);
    let b = write_docx(
        dir.path(),
        "paper2.docx",
        &["Define momentum.", "What is momentum?"],
    );

    bin()
        .args(["analyze", "--threshold", "0.4"])
        .arg(&a)
        .arg(&b)
        .assert()
        .success()
        .stdout(predicate::str::contains("Similar Questions Report"))
        .stdout(predicate::str::contains(
            "Reference Question - Define momentum. (Paper 1)",
        ))
        .stdout(predicate::str::contains(
            "1. What is momentum? (Paper 2) (Question Matches 41%)",
        ));
}

#[test]
fn directories_are_expanded() {
    let dir = TempDir::new().unwrap();
    write_txt(dir.path(), "1.txt", &["Why do leaves fall?"]);
    write_txt(dir.path(), "2.txt", &["Why do leaves fall in autumn?"]);

    let assert = bin()
        .args(["analyze", "--extension", "txt", "--format", "json", "--with-summary"])
        .arg(dir.path())
        .assert()
        .success();

    let json = json_stdout(&assert);
    assert_eq!(json["papers"].as_array().unwrap().len(), 2);
    assert_eq!(json["question_count"], 2);
    assert!(json["groups"]["Why do leaves fall? (Paper 1)"].is_array());
}

#[test]
fn single_document_is_a_client_error() {
    let dir = TempDir::new().unwrap();
    let a = write_txt(dir.path(), "a.txt", &["What is gravity?"]);

    bin()
        .args(["analyze", "--extension", "txt"])
        .arg(&a)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("at least two documents required"));
}

#[test]
fn unrecognised_files_only_is_a_client_error() {
    let dir = TempDir::new().unwrap();
    let a = write_txt(dir.path(), "a.txt", &["What is gravity?"]);
    let b = write_txt(dir.path(), "b.txt", &["Explain gravity."]);

    bin()
        .arg("analyze")
        .arg(&a)
        .arg(&b)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no valid documents"));
}

#[test]
fn papers_without_questions_give_an_empty_mapping() {
    let dir = TempDir::new().unwrap();
    let a = write_txt(dir.path(), "a.txt", &["The sky is blue."]);
    let b = write_txt(dir.path(), "b.txt", &["Grass is green."]);

    let assert = bin()
        .args(["analyze", "--extension", "txt", "--format", "json"])
        .arg(&a)
        .arg(&b)
        .assert()
        .success();

    assert_eq!(json_stdout(&assert), Value::Object(Default::default()));
}

#[test]
fn report_can_be_written_to_a_file() {
    let dir = TempDir::new().unwrap();
    let a = write_txt(dir.path(), "a.txt", &["What is gravity?"]);
    let b = write_txt(dir.path(), "b.txt", &["Explain gravity."]);
    let out = dir.path().join("report.json");

    bin()
        .args(["analyze", "--extension", "txt", "--threshold", "0.4", "--format", "json"])
        .arg(&a)
        .arg(&b)
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("groups=1"));

    let json: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert!(json["What is gravity? (Paper 1)"].is_array());
}

#[test]
fn invalid_threshold_is_rejected() {
    let dir = TempDir::new().unwrap();
    let a = write_txt(dir.path(), "a.txt", &["Why?"]);
    let b = write_txt(dir.path(), "b.txt", &["How?"]);

    bin()
        .args(["analyze", "--extension", "txt", "--threshold", "1.5"])
        .arg(&a)
        .arg(&b)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("threshold"));
}

#[test]
fn missing_config_file_is_a_client_error() {
    let dir = TempDir::new().unwrap();
    let a = write_txt(dir.path(), "a.txt", &["Why?"]);
    let b = write_txt(dir.path(), "b.txt", &["How?"]);

    bin()
        .arg("--config")
        .arg(dir.path().join("missing.json"))
        .args(["analyze", "--extension", "txt"])
        .arg(&a)
        .arg(&b)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing.json"));
}

#[test]
fn extract_lists_questions_with_rules() {
    let dir = TempDir::new().unwrap();
    let a = write_txt(
        dir.path(),
        "a.txt",
        &["What is gravity?", "Explain gravity.", "The sky is blue.", "How plants grow"],
    );

    bin()
        .args(["extract", "--explain"])
        .arg(&a)
        .assert()
        .success()
        .stdout(
            "[suffix] What is gravity?\n[keyword] Explain gravity.\n[interrogative] How plants grow\n",
        );

    bin()
        .args(["extract", "--case", "sensitive"])
        .arg(&a)
        .assert()
        .success()
        .stdout("What is gravity?\n");
}
