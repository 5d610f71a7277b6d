use regex::Regex;

use ebible_corpus::catalog::{Catalog, CatalogFilter, ExclusionReason, TranslationRecord};
use ebible_corpus::domain::TranslationId;

const HEADER: &str =
    "languageCode,translationId,title,Redistributable,OTverses,NTverses,DCverses,downloadable";

fn record(id: &str, verses: u32, downloadable: bool, redistributable: bool) -> TranslationRecord {
    TranslationRecord {
        id: id.parse().unwrap(),
        language_code: "gup".to_string(),
        verse_count: verses,
        downloadable,
        redistributable,
        title: None,
    }
}

fn filter() -> CatalogFilter {
    CatalogFilter {
        min_verses: 400,
        include: None,
        allow_non_redistributable: false,
        exclude: Vec::new(),
    }
}

fn ids(records: &[TranslationRecord]) -> Vec<&str> {
    records.iter().map(|record| record.id.as_str()).collect()
}

#[test]
fn filter_pattern_is_anchored_by_the_caller() {
    let records = [
        record("gup", 7957, true, true),
        record("gupk", 7957, true, true),
    ];
    let mut filter = filter();
    filter.include = Some(Regex::new("gup$").unwrap());

    let outcome = filter.apply(&records);

    assert_eq!(ids(&outcome.selected), ["gup"]);
    assert_eq!(outcome.unmatched, 1);
    assert!(outcome.excluded.is_empty());
}

#[test]
fn non_redistributable_needs_override() {
    let records = [record("engnrsv", 31000, true, false)];

    let outcome = filter().apply(&records);
    assert!(outcome.selected.is_empty());
    assert_eq!(outcome.excluded[0].reason, ExclusionReason::NotRedistributable);

    let mut permissive = filter();
    permissive.allow_non_redistributable = true;
    let outcome = permissive.apply(&records);
    assert_eq!(ids(&outcome.selected), ["engnrsv"]);
}

#[test]
fn override_does_not_bypass_other_exclusions() {
    let records = [
        record("short", 120, true, false),
        record("locked", 31000, false, false),
    ];
    let mut permissive = filter();
    permissive.allow_non_redistributable = true;

    let outcome = permissive.apply(&records);

    assert!(outcome.selected.is_empty());
    assert_eq!(
        outcome.excluded[0].reason,
        ExclusionReason::TooFewVerses {
            verses: 120,
            minimum: 400
        }
    );
    assert_eq!(outcome.excluded[1].reason, ExclusionReason::NotDownloadable);
}

#[test]
fn duplicate_ids_keep_last_occurrence_and_position() {
    let records = [
        record("aaa", 100, true, true),
        record("bbb", 31000, true, true),
        record("aaa", 31000, true, true),
    ];

    let outcome = filter().apply(&records);

    assert_eq!(ids(&outcome.selected), ["bbb", "aaa"]);
    assert!(outcome.excluded.is_empty());
}

#[test]
fn configured_exclusions_come_first() {
    let records = [record("engkjv", 31102, true, true)];
    let mut filter = filter();
    filter.exclude = vec!["engkjv".parse::<TranslationId>().unwrap()];

    let outcome = filter.apply(&records);

    assert_eq!(outcome.excluded[0].reason, ExclusionReason::Configured);
}

#[test]
fn malformed_rows_are_skipped_with_their_line_number() {
    let csv = format!(
        "{HEADER}\n\
         gup,gup,Gupapuyngu,True,0,7957,0,True\n\
         gup,,Missing id,True,0,7957,0,True\n\
         eng,engbad,Bad count,True,lots,,,True\n\
         eng,engkjv,King James,False,23145,7957,0,True\n"
    );

    let catalog = Catalog::parse(csv.as_bytes()).unwrap();

    assert_eq!(ids(&catalog.records), ["gup", "engkjv"]);
    let rows: Vec<usize> = catalog.rejected.iter().map(|row| row.row).collect();
    assert_eq!(rows, [3, 4]);
    assert!(!catalog.records[1].redistributable);
}

#[test]
fn parsed_catalog_feeds_the_filter_in_order() {
    let csv = format!(
        "{HEADER}\n\
         gup,gupk,Kriol,True,0,7957,0,True\n\
         gup,gup,Gupapuyngu,True,0,7957,0,True\n\
         xyz,xyzshort,Fragment,True,0,12,0,True\n"
    );
    let catalog = Catalog::parse(csv.as_bytes()).unwrap();

    let outcome = filter().apply(&catalog.records);

    assert_eq!(ids(&outcome.selected), ["gupk", "gup"]);
    assert_eq!(outcome.excluded.len(), 1);
    assert_eq!(outcome.excluded[0].id.as_str(), "xyzshort");
}
