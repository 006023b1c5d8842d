//! End-to-end runs over the sample catalogue, ledger and exemplar dump.

mod common;

use catmassage::formats::Format;
use catmassage::marcxml::{COLLECTION_FOOTER, COLLECTION_HEADER};
use catmassage::router::Subset;
use catmassage::{massage_files, MassageConfig, MassageError, OutputLayout};
use common::{content, item_values, output_bytes, read_iso2709, read_marcxml, Fixture};
use std::fs;

#[test]
fn test_sample_catalogue() {
    let fixture = Fixture::sample();
    let (layout, report) = fixture.run("out", &MassageConfig::default());

    assert_eq!(report.records_read, 4);
    assert_eq!(report.records_dropped, 1);
    assert_eq!(report.records_written, 3);
    assert_eq!(report.items_written, 9);
    assert_eq!(report.items_discarded, 1);
    assert_eq!(report.issues_written, 0);

    let records = read_iso2709(&layout.catalogue());
    let titles: Vec<_> = records
        .iter()
        .map(|r| r.get_control_field("001").unwrap_or(""))
        .collect();
    assert_eq!(titles, vec!["0379371", "1245593", "0192529"]);

    let first = &records[0];
    assert_eq!(first.leader.record_status, 'c');
    assert_eq!(item_values(first, 'p'), vec!["03010379371001", "03010379371002"]);
    assert_eq!(item_values(first, 'a'), vec!["ukjent", "hutl"]);
    assert_eq!(item_values(first, 'c'), vec!["Miljøhylla", "Miljøhylla"]);
    assert_eq!(item_values(first, 'l'), vec!["8", "14"]);
    assert_eq!(item_values(first, 'o'), vec!["641.3 Gra", "641.3 Gra"]);
    assert_eq!(first.get_field("942").unwrap().get_subfield('y'), Some("BOK"));

    let second = &records[1];
    assert_eq!(
        item_values(second, 'a'),
        vec!["hutl", "hutl", "hutl", "ffur", "fmaj", "fbol", "fnyd"]
    );
    assert_eq!(
        item_values(second, 'y'),
        vec!["BOK", "BOK", "DAGSLAAN", "BOK", "BOK", "BOK", "BOK"]
    );
    assert_eq!(item_values(second, 'c'), vec!["BEDRE LIV", "Livsstil"]);
    assert!(item_values(second, 'o').is_empty());
    let notes = second.get_fields("521").unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].get_subfield('a'), Some("Aldersgrense 18"));

    let third = &records[2];
    assert!(third.get_fields("952").is_none());
    assert_eq!(third.get_field("942").unwrap().get_subfield('y'), Some("LYDBOK"));
}

#[test]
fn test_items_free_view_matches_main_without_items() {
    let fixture = Fixture::sample();
    let (layout, _) = fixture.run("out", &MassageConfig::default());

    let main = read_iso2709(&layout.catalogue());
    let items_free = read_marcxml(&layout.items_free());
    assert_eq!(main.len(), items_free.len());

    for (mut record, free) in main.into_iter().zip(&items_free) {
        record.remove_fields_by_tag("952");
        assert_eq!(content(&record), content(free));
        assert!(free.get_field("942").is_some());
    }
}

#[test]
fn test_side_outputs() {
    let fixture = Fixture::sample();
    let (layout, report) = fixture.run("out", &MassageConfig::default());

    let branches = fs::read_to_string(layout.branches()).unwrap();
    assert_eq!(
        branches,
        "INSERT IGNORE INTO branches\n  (branchcode, branchname)\nVALUES\n  \
         (\"fbol\",\"Bøler\"),\n  \
         (\"ffur\",\"Furuset\"),\n  \
         (\"fmaj\",\"Majorstuen\"),\n  \
         (\"fnyd\",\"Nydalen\"),\n  \
         (\"hutl\",\"Hovedbiblioteket\"),\n  \
         (\"ukjent\",\"Ukjent avdeling\"),\n  \
         (\"xyz\",\"missing label\");\n"
    );
    assert_eq!(report.registry.misses().collect::<Vec<_>>(), vec![("xyz", 1)]);

    assert_eq!(
        fs::read_to_string(layout.issues()).unwrap(),
        "START TRANSACTION;\nCOMMIT;\n"
    );
    assert!(fs::read_to_string(layout.item_types())
        .unwrap()
        .starts_with("INSERT IGNORE INTO itemtypes"));
    assert!(fs::read_to_string(layout.authorised_values())
        .unwrap()
        .starts_with("INSERT IGNORE INTO authorised_values"));

    for subset in Subset::ALL {
        assert_eq!(
            fs::read_to_string(layout.subset(subset)).unwrap(),
            format!("{COLLECTION_HEADER}{COLLECTION_FOOTER}")
        );
    }
}

#[test]
fn test_runs_are_idempotent() {
    let fixture = Fixture::sample();
    let (first, _) = fixture.run("first", &MassageConfig::default());
    let (second, _) = fixture.run("second", &MassageConfig::default());

    let first = output_bytes(&first);
    assert_eq!(first.len(), 8);
    assert_eq!(first, output_bytes(&second));
}

#[test]
fn test_worker_pool_writes_identical_files() {
    let fixture = Fixture::sample();
    let (sequential, _) = fixture.run("sequential", &MassageConfig::default());
    let config = MassageConfig {
        workers: 3,
        channel_capacity: 1,
        ..MassageConfig::default()
    };
    let (pool, report) = fixture.run("pool", &config);

    assert_eq!(report.records_written, 3);
    assert_eq!(output_bytes(&sequential), output_bytes(&pool));
}

#[test]
fn test_skip_and_limit() {
    let fixture = Fixture::sample();

    let config = MassageConfig {
        skip: 1,
        ..MassageConfig::default()
    };
    let (layout, report) = fixture.run("skip", &config);
    assert_eq!(report.records_skipped, 1);
    let titles: Vec<_> = read_iso2709(&layout.catalogue())
        .iter()
        .map(|r| r.get_control_field("001").unwrap_or("").to_string())
        .collect();
    assert_eq!(titles, vec!["1245593", "0192529"]);
    assert!(!fs::read_to_string(layout.branches()).unwrap().contains("xyz"));

    let config = MassageConfig {
        limit: Some(1),
        ..MassageConfig::default()
    };
    let (layout, report) = fixture.run("limit", &config);
    assert_eq!(report.records_written, 1);
    assert_eq!(read_iso2709(&layout.catalogue()).len(), 1);
    assert_eq!(read_marcxml(&layout.items_free()).len(), 1);
}

#[test]
fn test_marcxml_catalogue_is_sniffed() {
    let fixture = Fixture::sample();
    let (layout, _) = fixture.run("out", &MassageConfig::default());

    let mut rerun = Fixture::new("", &common::ledger(), Some(common::EXEMPLARS));
    fs::copy(layout.items_free(), &rerun.inputs.catalogue).unwrap();
    let (again, _) = rerun.run("again", &MassageConfig::default());

    let before: Vec<_> = read_iso2709(&layout.catalogue()).iter().map(content).collect();
    let after: Vec<_> = read_iso2709(&again.catalogue()).iter().map(content).collect();
    assert_eq!(before, after);

    rerun.inputs.format = Some(Format::LineMarc);
    let (misread, report) = rerun.run("misread", &MassageConfig::default());
    assert_eq!(report.records_written, 0);
    assert!(read_iso2709(&misread.catalogue()).is_empty());
}

#[test]
fn test_oversized_record_is_left_out_of_every_output() {
    let mut ledger: String = (1..=2_000)
        .map(|n| common::copy("5", &n.to_string(), "hutl", "m", "", "3"))
        .collect();
    ledger.push_str(&common::copy("6", "1", "fmaj", "", "", "1"));
    let catalogue = "*000     n\n*0010000005\n*24510$aStor\n^\n\
                     *000     n\n*0010000006\n*24510$aLiten\n^\n";
    let fixture = Fixture::new(catalogue, &ledger, None);

    for (name, workers) in [("sequential", 1), ("pool", 3)] {
        let config = MassageConfig {
            workers,
            ..MassageConfig::default()
        };
        let (layout, report) = fixture.run(name, &config);

        assert_eq!(report.records_unencodable, 1);
        assert_eq!(report.records_written, 1);
        assert_eq!(report.items_written, 1);

        let main = read_iso2709(&layout.catalogue());
        let items_free = read_marcxml(&layout.items_free());
        assert_eq!(main.len(), 1);
        assert_eq!(items_free.len(), 1);
        assert_eq!(main[0].get_control_field("001"), Some("0000006"));
        assert_eq!(items_free[0].get_control_field("001"), Some("0000006"));

        let branches = fs::read_to_string(layout.branches()).unwrap();
        assert!(branches.contains("fmaj"));
        assert!(!branches.contains("hutl"));
    }
}

#[test]
fn test_missing_ledger_is_fatal() {
    let mut fixture = Fixture::sample();
    fixture.inputs.ledger = fixture.dir.path().join("missing.txt");
    let layout = OutputLayout::new(fixture.dir.path().join("out"));
    let err = massage_files(&fixture.inputs, &layout, &MassageConfig::default()).unwrap_err();
    assert!(matches!(err, MassageError::IoError(_)));
}
