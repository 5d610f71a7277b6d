use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use assert_matches::assert_matches;

use ebible_corpus::error::CorpusError;
use ebible_corpus::project::{Project, materialize};

fn write_zip(path: &Path, files: &[(&str, &str)]) {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    fs::write(path, cursor.into_inner()).unwrap();
}

fn names(project: &Project) -> Vec<String> {
    project
        .documents
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn materialize_strips_book_numbers() {
    let temp = tempfile::tempdir().unwrap();
    let archive = temp.path().join("gup--2024-05-01.zip");
    write_zip(
        &archive,
        &[
            ("02-GENgup.usfm", "\\id GEN\n"),
            ("70-MATgup.usfm", "\\id MAT\n"),
            ("copr.htm", "<p>license</p>"),
        ],
    );
    let project_dir = temp.path().join("projects").join("gup");

    let project = materialize(&archive, &project_dir).unwrap();

    assert_eq!(names(&project), ["GENgup.usfm", "MATgup.usfm"]);
    assert!(project_dir.join("copr.htm").exists());
}

#[test]
fn rematerialize_replaces_previous_contents() {
    let temp = tempfile::tempdir().unwrap();
    let project_dir = temp.path().join("projects").join("gup");
    let first = temp.path().join("first.zip");
    let second = temp.path().join("second.zip");
    write_zip(&first, &[("GENgup.usfm", "\\id GEN\n"), ("EXOgup.usfm", "\\id EXO\n")]);
    write_zip(&second, &[("MATgup.usfm", "\\id MAT\n")]);

    materialize(&first, &project_dir).unwrap();
    let project = materialize(&second, &project_dir).unwrap();

    assert_eq!(names(&project), ["MATgup.usfm"]);
    assert!(!project_dir.join("GENgup.usfm").exists());
}

#[test]
fn failed_materialization_leaves_old_project_intact() {
    let temp = tempfile::tempdir().unwrap();
    let project_dir = temp.path().join("projects").join("gup");
    let good = temp.path().join("good.zip");
    let no_sources = temp.path().join("no-sources.zip");
    let garbage = temp.path().join("garbage.zip");
    write_zip(&good, &[("GENgup.usfm", "\\id GEN\n")]);
    write_zip(&no_sources, &[("readme.txt", "nothing here")]);
    fs::write(&garbage, b"not a zip").unwrap();

    materialize(&good, &project_dir).unwrap();

    let err = materialize(&no_sources, &project_dir).unwrap_err();
    assert_matches!(err, CorpusError::Materialization { .. });
    let err = materialize(&garbage, &project_dir).unwrap_err();
    assert_matches!(err, CorpusError::Materialization { .. });

    let project = Project::open(&project_dir).unwrap();
    assert_eq!(names(&project), ["GENgup.usfm"]);
    let leftovers: Vec<_> = fs::read_dir(project_dir.parent().unwrap())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, ["gup"]);
}
